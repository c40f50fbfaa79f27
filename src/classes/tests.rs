use super::*;
use crate::engine::headless::HeadlessEngine;
use crate::variant::{Vec2, Vec3};

fn node<C: EngineClass>(class: &str) -> (C, Arc<Bridge>, Arc<HeadlessEngine>) {
    let (bridge, engine) = Bridge::headless();
    let ptr = engine.create(class);
    (C::from_raw(RawObject::new(ptr, Arc::clone(&bridge))), bridge, engine)
}

#[test]
fn test_class_constants() {
    assert_eq!(Node2D::NAME, "Node2D");
    assert_eq!(Node2D::PARENT, Some("Node"));
    assert_eq!(Object::PARENT, None);
    assert!(!Node::TOOL_CAPABLE);
    assert!(EditorPlugin::TOOL_CAPABLE);
    assert!(Script::TOOL_CAPABLE);
    assert!(ScriptLanguage::TOOL_CAPABLE);
}

#[test]
fn test_virtual_slots_root_first() {
    let slots = virtual_slots::<Node2D>();
    let names: Vec<_> = slots.iter().map(|slot| slot.name).collect();
    assert_eq!(
        names,
        vec![
            "_notification",
            "_to_string",
            "_ready",
            "_process",
            "_physics_process",
            "_enter_tree",
            "_exit_tree",
        ]
    );
    let process = slots.iter().find(|s| s.name == "_process").unwrap();
    assert_eq!(process.params, &[VariantType::Float]);
}

#[test]
fn test_node_name_round_trip() {
    let (node, bridge, _engine) = node::<Node>("Node");
    node.set_name("Player");
    assert_eq!(node.get_name(), "Player");
    // Temporary strings were released
    assert_eq!(bridge.handles().live_count(), 0);
}

#[test]
fn test_add_child_and_lookup() {
    let (root, bridge, engine) = node::<Node>("Node");
    let child = Node3D::from_raw(RawObject::new(engine.create("Node3D"), Arc::clone(&bridge)));
    child.as_node().set_name("Body");
    root.add_child(&child, false);

    assert_eq!(root.get_child_count(false), 1);
    let found = root.get_node_or_null("Body").expect("child by path");
    assert_eq!(found.object(), child.object());
    assert_eq!(found.get_parent().map(|p| p.object()), Some(root.object()));
    assert!(root.get_node_or_null("Missing").is_none());
    assert_eq!(root.get_child(0, false).map(|c| c.object()), Some(child.object()));
    assert!(root.get_child(3, false).is_none());
}

#[test]
fn test_internal_child_hidden_from_count() {
    let (root, bridge, engine) = node::<Node>("Node");
    let hidden = Node::from_raw(RawObject::new(engine.create("Node"), Arc::clone(&bridge)));
    root.add_child(&hidden, true);
    assert_eq!(root.get_child_count(false), 0);
    assert_eq!(root.get_child_count(true), 1);
}

#[test]
fn test_class_queries() {
    let (node, _bridge, _engine) = node::<Node2D>("Node2D");
    assert_eq!(node.as_node().get_class(), "Node2D");
    assert!(node.as_node().is_class("Node"));
    assert!(!node.as_node().is_class("Node3D"));
    assert!(node.as_object().cast::<Node>().is_some());
    assert!(node.as_object().cast::<Resource>().is_none());
}

#[test]
fn test_positions() {
    let (node2d, _bridge, _engine) = node::<Node2D>("Node2D");
    node2d.set_position(Vec2::new(3.0, -1.0));
    assert_eq!(node2d.get_position(), Vec2::new(3.0, -1.0));

    let (node3d, _bridge, _engine) = node::<Node3D>("Node3D");
    assert_eq!(node3d.get_position(), Vec3::ZERO);
    node3d.set_position(Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(node3d.get_position(), Vec3::new(1.0, 2.0, 3.0));
}

#[test]
fn test_method_binds_are_cached() {
    let (node, bridge, _engine) = node::<Node>("Node");
    node.get_child_count(false);
    let first = bridge.method_bind("Node", "get_child_count", 0).unwrap();
    let second = bridge.method_bind("Node", "get_child_count", 0).unwrap();
    assert_eq!(first.bind, second.bind);
}

#[test]
fn test_object_free() {
    let (node, _bridge, engine) = node::<Node>("Node");
    let ptr = node.object();
    node.as_object().free();
    assert!(!engine.is_alive(ptr));
}

use super::*;
use crate::register::ClassBuilder;

#[test]
fn test_child_starts_unbound() {
    let child = Child::<Node>::default();
    assert!(!child.is_bound());
    assert!(child.get().is_none());
    assert_eq!(format!("{child:?}"), "Child(None)");
}

struct Lamp {
    lit: bool,
}

impl ExtensionClass for Lamp {
    type Base = Node3D;

    fn init(_base: Node3D) -> Self {
        Lamp { lit: false }
    }
}

struct Hud {
    panel: Child<Node>,
    gizmo: Child<Node3D>,
    lamp: Child<Instance<Lamp>>,
    readies: i64,
}

impl ExtensionClass for Hud {
    type Base = Node;

    fn init(_base: Node) -> Self {
        Hud {
            panel: Child::default(),
            gizmo: Child::default(),
            lamp: Child::default(),
            readies: 0,
        }
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder
            .child("Panel", |h| &mut h.panel)
            .internal_child("Gizmo", |h| &mut h.gizmo)
            .child("Lamp", |h| &mut h.lamp)
            .on_ready(|h: &mut Hud| {
                assert!(h.panel.is_bound() && h.gizmo.is_bound() && h.lamp.is_bound());
                h.readies += 1;
            });
    }
}

fn hud_bridge() -> (Arc<Bridge>, Arc<crate::engine::headless::HeadlessEngine>) {
    let (bridge, engine) = Bridge::headless();
    bridge.register::<Lamp>(vec![]);
    bridge.register::<Hud>(vec![]);
    (bridge, engine)
}

#[test]
fn test_children_bound_before_ready() {
    let (bridge, engine) = hud_bridge();
    let hud = engine.create("Hud");
    let panel = engine.create("Node");
    engine.set_name(panel, "Panel");
    engine.add_child(hud, panel);

    engine.notify_ready(hud);

    let instance = bridge.instance::<Hud>(hud).unwrap();
    let value = instance.bind();
    assert_eq!(value.readies, 1);
    // Existing child reused
    assert_eq!(value.panel.get().map(|n| n.object()), Some(panel));

    // Missing ones created under the field name
    let gizmo = value.gizmo.get().unwrap().object();
    assert_eq!(engine.name(gizmo).as_deref(), Some("Gizmo"));
    assert!(engine.is_internal_child(hud, gizmo));

    let lamp = value.lamp.get().unwrap();
    assert_eq!(engine.parent(lamp.object()), Some(hud));
    assert!(!engine.is_internal_child(hud, lamp.object()));
    assert!(!lamp.bind().lit);
    assert_eq!(engine.children(hud).len(), 3);
}

#[test]
fn test_children_bound_once() {
    let (bridge, engine) = hud_bridge();
    let hud = engine.create("Hud");
    engine.call_virtual(hud, "_ready", &[]);
    engine.call_virtual(hud, "_ready", &[]);

    assert_eq!(engine.children(hud).len(), 3);
    assert_eq!(bridge.instance::<Hud>(hud).unwrap().bind().readies, 2);
}

#[test]
fn test_children_released_on_free() {
    let (bridge, engine) = hud_bridge();
    let hud = engine.create("Hud");
    engine.notify_ready(hud);
    assert_eq!(bridge.stats().instances, 2);

    engine.free(hud);
    assert_eq!(bridge.stats().instances, 0);
    assert_eq!(engine.live_objects(), 0);
}

struct Cockpit {
    screen: Child<Node2D>,
}

impl ExtensionClass for Cockpit {
    type Base = Node;

    fn init(_base: Node) -> Self {
        Cockpit {
            screen: Child::default(),
        }
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder.child("Screen", |c| &mut c.screen);
    }
}

#[test]
#[should_panic(expected = "is a `Node3D`, declared as `Node2D`")]
fn test_child_class_mismatch_panics() {
    let (bridge, engine) = Bridge::headless();
    bridge.register::<Cockpit>(vec![]);
    let cockpit = engine.create("Cockpit");
    let screen = engine.create("Node3D");
    engine.set_name(screen, "Screen");
    engine.add_child(cockpit, screen);
    engine.notify_ready(cockpit);
}

#[test]
fn test_subclass_satisfies_declared_class() {
    let (bridge, engine) = Bridge::headless();
    bridge.register::<Hud>(vec![]);
    bridge.register::<Lamp>(vec![]);
    let hud = engine.create("Hud");
    // A Node2D is a Node
    let panel = engine.create("Node2D");
    engine.set_name(panel, "Panel");
    engine.add_child(hud, panel);
    engine.notify_ready(hud);
    let instance = bridge.instance::<Hud>(hud).unwrap();
    assert_eq!(instance.bind().panel.get().map(|n| n.object()), Some(panel));
}

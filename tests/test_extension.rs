mod common;

use common::{bridge, bridge_with, Level1, Player, Toolbox};
use extbridge::engine::{MethodFlags, PropertyHint};
use extbridge::variant::RawVariant;
use extbridge::{
    BridgeConfig, EngineClass, EngineInterface, InitLevel, RegistrationError, Variant, VariantType,
};
use std::fs;

#[test]
fn test_player_registration() {
    let (bridge, engine) = bridge();
    bridge.register::<Player>(vec![]);

    assert_eq!(bridge.classes(), vec!["Player".to_string()]);
    let class = engine.registered_class("Player").unwrap();
    assert_eq!(class.info.parent, "Node2D");
    assert_eq!(
        class.groups,
        vec![
            ("Movement".to_string(), String::new()),
            ("Health".to_string(), String::new()),
        ]
    );
    assert_eq!(
        class.property("speed").unwrap().hint,
        PropertyHint::Range {
            min: 0.0,
            max: 20.0,
            step: 0.5
        }
    );
    assert_eq!(class.property("lives").unwrap().variant_type, VariantType::Int);

    let hurt = class.method("hurt").unwrap();
    assert_eq!(hurt.ret, VariantType::Int);
    assert!(!hurt.flags.contains(MethodFlags::STATIC));
    assert_eq!(class.method("score").unwrap().params, vec![VariantType::String]);
    assert!(class.method("process").is_none());

    assert!(class.signal("died").unwrap().params.is_empty());
    let scored = class.signal("scored").unwrap();
    assert_eq!(scored.params, vec![VariantType::String]);
    assert_eq!(scored.doc.as_deref(), Some("Sent from any thread"));
}

#[test]
fn test_duplicate_class_name_rejected() {
    let (bridge, engine) = bridge();
    bridge.register::<Player>(vec![]);
    let err = bridge.try_register::<Player>(vec![]).unwrap_err();
    assert_eq!(err, RegistrationError::DuplicateClass("Player".to_string()));
    assert_eq!(engine.registered_classes(), vec!["Player".to_string()]);
}

#[test]
fn test_process_and_method_dispatch() {
    let (bridge, engine) = bridge();
    bridge.register::<Player>(vec![]);
    let player = bridge.instantiate::<Player>();

    engine.process(player.object(), 0.5);
    assert_eq!(player.bind().distance, 2.0);

    for expected in [2, 1, 0] {
        let lives = engine.call_method(player.object(), "hurt", &[]).unwrap();
        assert_eq!(lives.as_int(), expected);
    }
    let emissions = engine.take_emissions();
    assert_eq!(emissions.len(), 1);
    assert_eq!(emissions[0].signal, "died");
    assert_eq!(emissions[0].object, player.object());
    assert!(emissions[0].args.is_empty());
}

#[test]
fn test_property_round_trip_through_engine() {
    let (bridge, engine) = bridge();
    bridge.register::<Player>(vec![]);
    let player = bridge.instantiate::<Player>();

    assert!(engine.set_property(player.object(), "speed", &RawVariant::from_float(7.5)));
    let speed = engine.get_property(player.object(), "speed").unwrap();
    assert_eq!(speed.as_float(), 7.5);
    // Ints widen into float properties
    assert!(engine.set_property(player.object(), "speed", &RawVariant::from_int(2)));
    assert_eq!(player.bind().speed, 2.0);
    assert!(engine.get_property(player.object(), "stamina").is_none());
}

#[test]
fn test_missing_child_created_before_ready() {
    let (bridge, engine) = bridge();
    bridge.register::<Level1>(vec![]);
    let level = engine.create("Level");

    engine.notify_ready(level);

    let children = engine.children(level);
    assert_eq!(children.len(), 1);
    assert_eq!(engine.name(children[0]).as_deref(), Some("Foo"));
    assert_eq!(engine.object_class(children[0]).as_deref(), Some("Node"));

    let instance = bridge.instance::<Level1>(level).unwrap();
    let value = instance.bind();
    assert_eq!(value.children_at_ready, 1);
    assert_eq!(value.foo.get().map(|n| n.object()), Some(children[0]));
    drop(value);

    // A second ready does not create another child
    engine.call_virtual(level, "_ready", &[]);
    assert_eq!(engine.children(level).len(), 1);
}

#[test]
fn test_init_levels() {
    let (bridge, engine) = bridge();
    bridge.declare::<Player>(vec![]);
    bridge.declare::<Toolbox>(vec![]);
    assert!(bridge.classes().is_empty());

    bridge.initialize(InitLevel::Core);
    assert!(bridge.classes().is_empty());
    bridge.initialize(InitLevel::Scene);
    assert_eq!(bridge.classes(), vec!["Player".to_string()]);
    bridge.initialize(InitLevel::Editor);
    assert_eq!(
        bridge.classes(),
        vec!["Player".to_string(), "Toolbox".to_string()]
    );
    assert!(engine.registered_class("Toolbox").unwrap().info.tool);

    let player = bridge.instantiate::<Player>();
    bridge.deinitialize(InitLevel::Scene);
    assert!(!player.is_alive());
    assert!(!engine.is_alive(player.object()));
    assert_eq!(bridge.classes(), vec!["Toolbox".to_string()]);
    assert_eq!(engine.registered_classes(), vec!["Toolbox".to_string()]);

    bridge.deinitialize(InitLevel::Editor);
    assert!(bridge.classes().is_empty());
    assert!(engine.errors().is_empty());
}

#[test]
fn test_unregister_unknown_class() {
    let (bridge, _engine) = bridge();
    assert_eq!(
        bridge.unregister("Ghost"),
        Err(RegistrationError::NotRegistered("Ghost".to_string()))
    );
}

#[test]
fn test_tool_virtual_override() {
    let (bridge, engine) = bridge();
    bridge.register::<Toolbox>(vec![]);
    let toolbox = engine.create("Toolbox");
    let raw = engine
        .call_virtual(toolbox, "_get_plugin_name", &[])
        .expect("override");
    assert_eq!(
        Variant::from_owned_raw(raw, bridge.handles()),
        Variant::String("Toolbox".to_string())
    );
    assert_eq!(engine.live_resources(), 0);
}

#[test]
fn test_stats() {
    let (bridge, engine) = bridge();
    bridge.register::<Player>(vec![]);
    bridge.register::<Level1>(vec![]);
    let a = engine.create("Player");
    let _b = engine.create("Player");
    engine.call_method(a, "hurt", &[]).unwrap();

    let stats = bridge.stats();
    assert_eq!(stats.classes, 2);
    assert_eq!(stats.instances, 2);
    assert_eq!(stats.forwarders, 2);
    assert_eq!(stats.calls, 1);
    assert_eq!(stats.handles, 0);

    engine.free(a);
    let stats = bridge.stats();
    assert_eq!(stats.instances, 1);
    assert_eq!(stats.forwarders, 1);
}

// ============================================================================
// Documentation sidecar
// ============================================================================

const SIDECAR: &str = r#"
[Player]
description = "The hero"

[Player.members]
speed = "Overridden by the builder"
lives = "Remaining attempts"
hurt = "Lose one life"
"#;

fn editor_config(path: std::path::PathBuf) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.editor = Some(true);
    config.docs.path = Some(path);
    config
}

#[test]
fn test_docs_sidecar_merged_under_editor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("game.docs.toml");
    fs::write(&path, SIDECAR).unwrap();

    let (bridge, engine) = bridge_with(editor_config(path));
    assert!(bridge.is_editor());
    assert_eq!(bridge.docs().description("Player"), Some("The hero"));
    bridge.register::<Player>(vec![]);

    let class = engine.registered_class("Player").unwrap();
    assert_eq!(class.info.doc.as_deref(), Some("The hero"));
    assert_eq!(
        class.property("speed").unwrap().doc.as_deref(),
        Some("Units per second")
    );
    assert_eq!(
        class.property("lives").unwrap().doc.as_deref(),
        Some("Remaining attempts")
    );
    assert_eq!(
        class.method("hurt").unwrap().doc.as_deref(),
        Some("Lose one life")
    );
}

#[test]
fn test_docs_sidecar_ignored_outside_editor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("game.docs.toml");
    fs::write(&path, SIDECAR).unwrap();

    let mut config = editor_config(path);
    config.editor = Some(false);
    let (bridge, _engine) = bridge_with(config);
    assert!(bridge.docs().is_empty());
}

#[test]
fn test_docs_sidecar_missing_or_broken() {
    let dir = tempfile::tempdir().unwrap();

    let (bridge, engine) = bridge_with(editor_config(dir.path().join("absent.toml")));
    assert!(bridge.docs().is_empty());
    assert!(engine.errors().is_empty());

    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[Player\n").unwrap();
    let (bridge, engine) = bridge_with(editor_config(broken));
    assert!(bridge.docs().is_empty());
    assert_eq!(engine.errors().len(), 1);
    // The bridge keeps working
    bridge.register::<Player>(vec![]);
}

#[test]
fn test_config_file_drives_bridge() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("extbridge.toml");
    fs::write(
        &path,
        r#"
extension = "arena"
editor = true

[handles]
track = true

[signals]
thread_prefix = "arena-signal"
"#,
    )
    .unwrap();

    assert_eq!(BridgeConfig::discover(dir.path()), Some(path.clone()));
    let config = BridgeConfig::load(&path).unwrap();
    assert_eq!(config.docs_path(), std::path::PathBuf::from("arena.docs.toml"));

    let (bridge, _engine) = bridge_with(config);
    assert!(bridge.is_editor());
    assert!(bridge.handles().is_tracking());
    assert_eq!(bridge.config().signals.thread_prefix, "arena-signal");
}

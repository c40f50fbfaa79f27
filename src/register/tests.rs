use super::naming::{is_constructor_name, is_valid_class_name, type_short_name};
use super::virtuals::{HostMethod, VirtualTable};
use super::*;
use crate::bridge::Bridge;
use crate::classes::{virtual_slots, EditorPlugin, Node, Node2D};
use crate::engine::{EngineInterface, MethodFlags, ObjectPtr, PropertyHint, VirtualId};
use crate::error::{CallError, RegistrationError};
use crate::handle::HandleRegistry;
use crate::engine::headless::HeadlessEngine;
use crate::variant::{RawVariant, Signal, Variant, VariantType};
use std::io::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Naming
// ============================================================================

#[test]
fn test_host_method_names() {
    assert_eq!(host_method_name("_process"), "Process");
    assert_eq!(host_method_name("_physics_process"), "PhysicsProcess");
    assert_eq!(host_method_name("_get_plugin_name"), "GetPluginName");
    assert_eq!(host_method_name("seek"), "SeekTo");
    assert_eq!(host_method_name("_type_string"), "TypeToString");
}

#[test]
fn test_case_conversion() {
    assert_eq!(pascal_case("make_visible"), "MakeVisible");
    assert_eq!(pascal_case("__double__"), "Double");
    assert_eq!(snake_case("SeekTo"), "seek_to");
    assert_eq!(snake_case("HTTPRequest"), "http_request");
    assert_eq!(snake_case("Vector2Length"), "vector2_length");
    assert_eq!(snake_case("already_snake"), "already_snake");
}

#[test]
fn test_name_predicates() {
    assert!(is_valid_class_name("Player"));
    assert!(is_valid_class_name("_Hidden2D"));
    assert!(!is_valid_class_name("2D"));
    assert!(!is_valid_class_name("Bad Name"));
    assert!(!is_valid_class_name(""));

    assert!(is_constructor_name("new"));
    assert!(is_constructor_name("new_with_speed"));
    assert!(is_constructor_name("New"));
    assert!(is_constructor_name("NewFromSave"));
    assert!(!is_constructor_name("newer"));
    assert!(!is_constructor_name("Newt"));
    assert!(!is_constructor_name("renew"));

    assert_eq!(type_short_name("game::actors::Player"), "Player");
    assert_eq!(type_short_name("game::Pool<game::Bullet>"), "Pool");
}

// ============================================================================
// Levels
// ============================================================================

struct Walker;

impl ExtensionClass for Walker {
    type Base = Node2D;

    fn init(_base: Node2D) -> Self {
        Walker
    }
}

struct Inspector;

impl ExtensionClass for Inspector {
    type Base = EditorPlugin;

    fn init(_base: EditorPlugin) -> Self {
        Inspector
    }
}

struct Gizmo;

impl ExtensionClass for Gizmo {
    type Base = Node;
    const TOOL: bool = true;

    fn class_name() -> String {
        "EditorGizmo".to_string()
    }

    fn init(_base: Node) -> Self {
        Gizmo
    }
}

#[test]
fn test_init_levels() {
    assert_eq!(InitLevel::from_u32(2), Some(InitLevel::Scene));
    assert_eq!(InitLevel::from_u32(7), None);
    assert_eq!(InitLevel::Editor.as_u32(), 3);
    assert!(InitLevel::Core < InitLevel::Editor);

    assert_eq!(init_level::<Walker>(), InitLevel::Scene);
    assert!(is_tool::<Inspector>());
    assert_eq!(init_level::<Inspector>(), InitLevel::Editor);
    assert_eq!(init_level::<Gizmo>(), InitLevel::Editor);
    assert_eq!(Walker::class_name(), "Walker");
    assert_eq!(Gizmo::class_name(), "EditorGizmo");
}

// ============================================================================
// Virtual table
// ============================================================================

#[test]
fn test_virtual_table_overrides() {
    let slots = virtual_slots::<Node>();
    let methods = [
        HostMethod {
            host: "Process",
            params: &[VariantType::Float],
        },
        HostMethod {
            host: "Jump",
            params: &[],
        },
    ];
    let (table, overrides) = VirtualTable::build("Walker", &slots, &methods, false).unwrap();
    assert_eq!(overrides, vec![true, false]);
    assert_eq!(table.len(), 1);
    assert_eq!(table.resolve("_process"), Some(VirtualId(0)));
    assert_eq!(table.resolve("_ready"), None);
    assert_eq!(table.get(VirtualId(0)).unwrap().method, Some(0));
}

#[test]
fn test_virtual_table_ready_binds_children() {
    let slots = virtual_slots::<Node>();
    let (table, _) = VirtualTable::build("Walker", &slots, &[], true).unwrap();
    let id = table.resolve("_ready").expect("ready entry");
    let entry = table.get(id).unwrap();
    assert!(entry.binds_children);
    assert_eq!(entry.method, None);
}

#[test]
fn test_virtual_arity_checked() {
    let slots = virtual_slots::<Node>();
    let methods = [HostMethod {
        host: "Process",
        params: &[],
    }];
    let err = VirtualTable::build("Walker", &slots, &methods, false).unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::VirtualArity {
            expected: 1,
            found: 0,
            ..
        }
    ));
}

#[test]
fn test_virtual_param_types() {
    let slots = virtual_slots::<Node>();
    // The engine passes an int; a float parameter accepts it
    let widened = [HostMethod {
        host: "Notification",
        params: &[VariantType::Float],
    }];
    assert!(VirtualTable::build("Walker", &slots, &widened, false).is_ok());

    let any = [HostMethod {
        host: "Process",
        params: &[VariantType::Nil],
    }];
    assert!(VirtualTable::build("Walker", &slots, &any, false).is_ok());

    let narrowed = [HostMethod {
        host: "Process",
        params: &[VariantType::Int],
    }];
    let err = VirtualTable::build("Walker", &slots, &narrowed, false).unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::VirtualParamType {
            index: 0,
            expected: VariantType::Float,
            found: VariantType::Int,
            ..
        }
    ));
}

// ============================================================================
// Documentation
// ============================================================================

const SIDECAR: &str = r#"
[Player]
description = "Controllable character"

[Player.members]
speed = "Units per second"
"#;

#[test]
fn test_doc_index_parse() {
    let index = DocIndex::parse(SIDECAR, Path::new("game.docs.toml")).unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index.description("Player"), Some("Controllable character"));
    assert_eq!(index.member("Player", "speed"), Some("Units per second"));
    assert_eq!(index.member("Player", "jump"), None);
    assert_eq!(index.description("Enemy"), None);
}

#[test]
fn test_doc_index_rejects_malformed() {
    let err = DocIndex::parse("[Player\n", Path::new("bad.toml")).unwrap_err();
    assert!(err.to_string().contains("bad.toml"));
}

#[test]
fn test_doc_index_load() {
    let dir = tempfile::tempdir().unwrap();
    let missing = DocIndex::load(&dir.path().join("absent.docs.toml")).unwrap();
    assert!(missing.is_empty());

    let path = dir.path().join("game.docs.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(SIDECAR.as_bytes()).unwrap();
    let index = DocIndex::load(&path).unwrap();
    assert_eq!(index.description("Player"), Some("Controllable character"));
}

#[test]
fn test_doc_load_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.docs.toml");
    std::fs::write(&path, "not = [valid").unwrap();
    let engine = HeadlessEngine::new();
    let index = DocIndex::load_or_report(&path, &engine);
    assert!(index.is_empty());
    assert_eq!(engine.errors().len(), 1);
}

#[test]
fn test_class_docs_merge() {
    let own = ClassDocs::default().member("speed", "Own text");
    let sidecar = ClassDocs::new("From sidecar")
        .member("speed", "Sidecar text")
        .member("jump", "Sidecar jump");
    let merged = own.or(&sidecar);
    assert_eq!(merged.description.as_deref(), Some("From sidecar"));
    assert_eq!(merged.members["speed"], "Own text");
    assert_eq!(merged.members["jump"], "Sidecar jump");
}

// ============================================================================
// Signal channels
// ============================================================================

#[test]
fn test_unbound_channel_rejects_sends() {
    let mut channel = SignalChannel::<(i64,)>::default();
    assert!(!channel.is_open());
    assert!(!channel.send((1,)));
    channel.close();
    assert!(channel.sender().is_none());
}

#[test]
fn test_forwarder_drains_on_stop() {
    let engine = Arc::new(HeadlessEngine::new());
    let registry = HandleRegistry::new(Arc::clone(&engine) as Arc<dyn EngineInterface>, true);
    let object = engine.create("Node");
    let signal = Signal::bound(object, "tick", registry);
    let running = Arc::new(AtomicUsize::new(0));

    let (sender, receiver) = flume::unbounded::<(i64,)>();
    let forwarder = Forwarder::spawn(
        "test-signal:Node.tick".to_string(),
        receiver,
        signal,
        Arc::clone(&running),
    )
    .unwrap();
    assert_eq!(forwarder.signal(), "tick");

    let mut channel = SignalChannel::default();
    channel.open(sender);
    for n in 1..=3 {
        assert!(channel.send((n,)));
    }
    forwarder.stop();

    assert_eq!(running.load(Ordering::Acquire), 0);
    let ticks: Vec<_> = engine
        .take_emissions()
        .into_iter()
        .map(|e| e.args)
        .collect();
    assert_eq!(
        ticks,
        vec![
            vec![Variant::Int(1)],
            vec![Variant::Int(2)],
            vec![Variant::Int(3)],
        ]
    );
}

#[test]
fn test_forwarder_exits_when_senders_drop() {
    let running = Arc::new(AtomicUsize::new(0));
    let (sender, receiver) = flume::unbounded::<()>();
    let forwarder = Forwarder::spawn(
        "test-signal:Node.idle".to_string(),
        receiver,
        Signal::new(ObjectPtr::NULL, "idle"),
        Arc::clone(&running),
    )
    .unwrap();
    drop(sender);
    forwarder.stop();
    assert_eq!(running.load(Ordering::Acquire), 0);
}

// ============================================================================
// Registration through a bridge
// ============================================================================

struct Mover {
    speed: f64,
    ticks: i64,
    moved: Signal,
}

impl ExtensionClass for Mover {
    type Base = Node2D;

    fn init(_base: Node2D) -> Self {
        Mover {
            speed: 2.0,
            ticks: 0,
            moved: Signal::default(),
        }
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder.docs("Moves along a path");
        builder
            .property("speed", |m| &m.speed, |m| &mut m.speed)
            .group("Motion")
            .range(0.0, 10.0, 0.5)
            .doc("Units per second");
        builder.method("Process", |m: &mut Mover, _delta: f64| {
            m.ticks += 1;
        });
        builder.method("GetTicks", |m: &Mover| m.ticks);
        builder
            .method("Boost", |m: &mut Mover, by: f64| {
                m.speed += by;
                m.speed
            })
            .rename("apply_boost");
        builder.static_method("MaxSpeed", || 10.0f64);
        builder.constant("LANES", 3);
        builder.signal::<(f64,)>("moved", |m| &mut m.moved);
    }
}

#[test]
fn test_registered_metadata() {
    let (bridge, engine) = Bridge::headless();
    bridge.register::<Mover>(vec![Extra::constants([("GEARS", 5)])]);

    let class = engine.registered_class("Mover").expect("registered");
    assert_eq!(class.info.parent, "Node2D");
    assert!(!class.info.tool);
    assert_eq!(class.info.doc.as_deref(), Some("Moves along a path"));

    let speed = class.property("speed").unwrap();
    assert_eq!(speed.variant_type, VariantType::Float);
    assert_eq!(
        speed.hint,
        PropertyHint::Range {
            min: 0.0,
            max: 10.0,
            step: 0.5
        }
    );
    assert_eq!(speed.doc.as_deref(), Some("Units per second"));
    assert_eq!(class.groups, vec![("Motion".to_string(), String::new())]);

    assert!(class.method("get_ticks").is_some());
    assert!(class.method("apply_boost").is_some());
    // Overrides are not exported
    assert!(class.method("process").is_none());
    let max = class.method("max_speed").unwrap();
    assert!(max.flags.contains(MethodFlags::STATIC));
    assert_eq!(max.ret, VariantType::Float);

    assert_eq!(class.constant("LANES"), Some(3));
    assert_eq!(class.constant("GEARS"), Some(5));
    assert_eq!(class.signal("moved").unwrap().params, vec![VariantType::Float]);
}

#[test]
fn test_dispatch_and_property_access() {
    let (bridge, engine) = Bridge::headless();
    bridge.register::<Mover>(vec![]);
    let object = engine.create("Mover");

    engine.process(object, 0.016);
    engine.process(object, 0.016);
    let ticks = engine.call_method(object, "get_ticks", &[]).unwrap();
    assert_eq!(ticks.as_int(), 2);

    let boosted = engine
        .call_method(object, "apply_boost", &[RawVariant::from_int(3)])
        .unwrap();
    assert_eq!(boosted.as_float(), 5.0);
    assert_eq!(engine.get_property(object, "speed").unwrap().as_float(), 5.0);

    assert!(engine.set_property(object, "speed", &RawVariant::from_float(1.5)));
    assert!(!engine.set_property(object, "speed", &RawVariant::from_bool(true)));
    assert!(!engine.set_property(object, "grip", &RawVariant::from_float(1.0)));
    assert_eq!(bridge.instance::<Mover>(object).unwrap().bind().speed, 1.5);

    let max = engine.call_static("Mover", "max_speed", &[]).unwrap();
    assert_eq!(max.as_float(), 10.0);
    assert!(bridge.stats().calls >= 5);
}

#[test]
fn test_call_errors() {
    let (bridge, engine) = Bridge::headless();
    bridge.register::<Mover>(vec![]);
    let object = engine.create("Mover");

    assert!(matches!(
        engine.call_method(object, "fly", &[]),
        Err(CallError::NoSuchMethod { .. })
    ));
    assert!(matches!(
        engine.call_static("Mover", "get_ticks", &[]),
        Err(CallError::NotStatic { .. })
    ));
    assert!(matches!(
        engine.call_method(object, "get_ticks", &[RawVariant::from_int(1)]),
        Err(CallError::ArgCountMismatch {
            expected: 0,
            got: 1,
            ..
        })
    ));
    assert!(matches!(
        engine.call_method(object, "apply_boost", &[RawVariant::from_bool(true)]),
        Err(CallError::InvalidArgument { index: 0, .. })
    ));
}

#[test]
fn test_virtual_errors_are_reported() {
    let (bridge, engine) = Bridge::headless();
    bridge.register::<Mover>(vec![]);
    let object = engine.create("Mover");

    let ret = engine
        .call_virtual(object, "_process", &[RawVariant::from_bool(true)])
        .expect("override");
    assert_eq!(ret.variant_type(), VariantType::Nil);
    let errors = engine.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Mover::Process"));
    assert_eq!(bridge.instance::<Mover>(object).unwrap().bind().ticks, 0);
}

struct Clashing;

impl ExtensionClass for Clashing {
    type Base = Node;

    fn init(_base: Node) -> Self {
        Clashing
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder.method("Speed", |_: &Clashing| 1i64);
        builder.static_method("speed", || 2i64);
    }
}

struct SignalProperty {
    hit: Signal,
}

impl ExtensionClass for SignalProperty {
    type Base = Node;

    fn init(_base: Node) -> Self {
        SignalProperty {
            hit: Signal::default(),
        }
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder.property("hit", |s| &s.hit, |s| &mut s.hit);
    }
}

struct BadName;

impl ExtensionClass for BadName {
    type Base = Node;

    fn class_name() -> String {
        "Bad Name".to_string()
    }

    fn init(_base: Node) -> Self {
        BadName
    }
}

struct Stiff;

impl ExtensionClass for Stiff {
    type Base = Node;

    fn init(_base: Node) -> Self {
        Stiff
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder.method("Ready", |_: &mut Stiff, _extra: i64| {});
    }
}

#[test]
fn test_registration_errors() {
    let (bridge, engine) = Bridge::headless();

    assert!(matches!(
        bridge.try_register::<Clashing>(vec![]),
        Err(RegistrationError::DuplicateMember { member, .. }) if member == "speed"
    ));
    assert!(matches!(
        bridge.try_register::<SignalProperty>(vec![]),
        Err(RegistrationError::InvalidProperty { .. })
    ));
    assert!(matches!(
        bridge.try_register::<BadName>(vec![]),
        Err(RegistrationError::InvalidName(_))
    ));
    assert!(matches!(
        bridge.try_register::<Stiff>(vec![]),
        Err(RegistrationError::VirtualArity { .. })
    ));
    assert!(bridge.classes().is_empty());
    assert!(engine.registered_classes().is_empty());
}

#[test]
fn test_duplicate_class_rejected() {
    let (bridge, _engine) = Bridge::headless();
    bridge.register::<Walker>(vec![]);
    assert_eq!(
        bridge.try_register::<Walker>(vec![]),
        Err(RegistrationError::DuplicateClass("Walker".to_string()))
    );
}

#[test]
#[should_panic(expected = "already registered")]
fn test_register_panics_on_error() {
    let (bridge, _engine) = Bridge::headless();
    bridge.register::<Walker>(vec![]);
    bridge.register::<Walker>(vec![]);
}

// ============================================================================
// Constructors and static extras
// ============================================================================

struct Spawner {
    level: i64,
}

impl ExtensionClass for Spawner {
    type Base = Node;

    fn init(_base: Node) -> Self {
        Spawner { level: 1 }
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder.method("GetLevel", |s: &Spawner| s.level);
    }
}

#[test]
fn test_designated_constructor() {
    let (bridge, engine) = Bridge::headless();
    bridge.register::<Spawner>(vec![
        Extra::function("new", |_base: Node| Spawner { level: 9 }),
        Extra::function("elite", |_base: Node| Spawner { level: 50 }).doc("Hard mode"),
        Extra::function("Clamp", |level: i64| level.clamp(1, 99)),
    ]);

    // Engine construction goes through the designated constructor
    let object = engine.create("Spawner");
    assert_eq!(bridge.instance::<Spawner>(object).unwrap().bind().level, 9);

    // Other constructor-shaped functions become static factories
    let raw = engine.call_static("Spawner", "elite", &[]).unwrap();
    let elite = bridge.instance::<Spawner>(raw.as_object()).expect("elite instance");
    assert_eq!(elite.bind().level, 50);
    assert!(matches!(
        engine.call_static("Spawner", "elite", &[RawVariant::from_int(1)]),
        Err(CallError::ArgCountMismatch { expected: 0, .. })
    ));

    let clamped = engine
        .call_static("Spawner", "clamp", &[RawVariant::from_int(500)])
        .unwrap();
    assert_eq!(clamped.as_int(), 99);

    let class = engine.registered_class("Spawner").unwrap();
    let elite = class.method("elite").unwrap();
    assert_eq!(elite.ret, VariantType::Object);
    assert_eq!(elite.doc.as_deref(), Some("Hard mode"));
    assert!(class.method("new").is_none());
}

#[test]
fn test_second_designated_constructor_rejected() {
    let (bridge, _engine) = Bridge::headless();
    let result = bridge.try_register::<Spawner>(vec![
        Extra::function("new", |_base: Node| Spawner { level: 2 }),
        Extra::function("NewRandom", |_base: Node| Spawner { level: 3 }),
    ]);
    assert!(matches!(
        result,
        Err(RegistrationError::DuplicateMember { .. })
    ));
}

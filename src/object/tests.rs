use super::*;
use crate::bridge::Bridge;
use crate::classes::{EngineClass, Node};
use crate::engine::ObjectPtr;
use crate::register::{ClassBuilder, ExtensionClass};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Marker {
    object: ObjectPtr,
    class: &'static str,
}

impl InstanceBinding for Marker {
    fn object(&self) -> ObjectPtr {
        self.object
    }

    fn class_name(&self) -> &str {
        self.class
    }

    fn is_alive(&self) -> bool {
        true
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn marker(addr: usize, class: &'static str) -> Arc<dyn InstanceBinding> {
    Arc::new(Marker {
        object: ObjectPtr::from_addr(addr),
        class,
    })
}

#[test]
fn test_identity_store_load_delete() {
    let map = IdentityMap::new();
    let object = ObjectPtr::from_addr(0x10);
    assert!(map.store(object, marker(0x10, "Player")).is_none());
    assert!(map.contains(object));
    assert_eq!(map.load(object).unwrap().class_name(), "Player");
    assert!(map.load_as::<Marker>(object).is_some());

    let replaced = map.store(object, marker(0x10, "Enemy")).unwrap();
    assert_eq!(replaced.class_name(), "Player");
    assert_eq!(map.len(), 1);

    let removed = map.delete(object).unwrap();
    assert_eq!(removed.object(), object);
    assert!(map.is_empty());
    assert!(map.load(object).is_none());
    assert!(map.delete(object).is_none());
}

#[test]
fn test_identity_objects_of_class() {
    let map = IdentityMap::new();
    map.store(ObjectPtr::from_addr(0x10), marker(0x10, "Player"));
    map.store(ObjectPtr::from_addr(0x20), marker(0x20, "Enemy"));
    map.store(ObjectPtr::from_addr(0x30), marker(0x30, "Player"));
    let mut players = map.objects_of("Player");
    players.sort();
    assert_eq!(
        players,
        vec![ObjectPtr::from_addr(0x10), ObjectPtr::from_addr(0x30)]
    );
}

#[test]
fn test_identity_concurrent_writers() {
    let map = Arc::new(IdentityMap::new());
    let writers: Vec<_> = (0..4)
        .map(|t| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                for i in 0..100 {
                    let addr = 0x1000 + (t * 100 + i) * 0x10;
                    map.store(ObjectPtr::from_addr(addr), marker(addr, "Bullet"));
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    assert_eq!(map.len(), 400);
    assert_eq!(map.objects_of("Bullet").len(), 400);
}

struct Counter {
    hits: i64,
}

impl ExtensionClass for Counter {
    type Base = Node;

    fn init(_base: Node) -> Self {
        Counter { hits: 0 }
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder.property("hits", |c| &c.hits, |c| &mut c.hits);
        builder.method("Hit", |c: &mut Counter| {
            c.hits += 1;
            c.hits
        });
    }
}

#[test]
fn test_instance_handles() {
    let (bridge, engine) = Bridge::headless();
    bridge.register::<Counter>(vec![]);
    let counter = bridge.instantiate::<Counter>();
    assert_eq!(counter.class_name(), "Counter");
    assert_eq!(counter.base().object(), counter.object());
    assert!(counter.is_alive());

    engine.call_method(counter.object(), "hit", &[]).unwrap();
    assert_eq!(counter.bind().hits, 1);

    let same = bridge.instance::<Counter>(counter.object()).unwrap();
    assert_eq!(same, counter);
    assert_eq!(bridge.stats().instances, 1);
}

#[test]
fn test_try_bind_while_borrowed() {
    let (bridge, _engine) = Bridge::headless();
    bridge.register::<Counter>(vec![]);
    let counter = bridge.instantiate::<Counter>();
    let guard = counter.bind();
    assert!(counter.try_bind().is_none());
    drop(guard);
    assert!(counter.try_bind().is_some());
}

#[test]
#[should_panic(expected = "re-entrant bind")]
fn test_reentrant_bind_panics() {
    let (bridge, _engine) = Bridge::headless();
    bridge.register::<Counter>(vec![]);
    let counter = bridge.instantiate::<Counter>();
    let _outer = counter.bind();
    let _inner = counter.bind();
}

#[test]
fn test_freed_instance_is_dead() {
    let (bridge, engine) = Bridge::headless();
    bridge.register::<Counter>(vec![]);
    let counter = bridge.instantiate::<Counter>();
    let object = counter.object();

    engine.free(object);
    assert!(!counter.is_alive());
    assert!(counter.try_bind().is_none());
    assert!(bridge.instance::<Counter>(object).is_none());
    assert!(bridge.identity().is_empty());
}

#[test]
#[should_panic(expected = "used after free")]
fn test_bind_after_free_panics() {
    let (bridge, engine) = Bridge::headless();
    bridge.register::<Counter>(vec![]);
    let counter = bridge.instantiate::<Counter>();
    engine.free(counter.object());
    let _value = counter.bind();
}

struct Lantern {
    snuffed: Option<Arc<AtomicBool>>,
}

impl ExtensionClass for Lantern {
    type Base = Node;

    fn init(_base: Node) -> Self {
        Lantern { snuffed: None }
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder.on_free(|l: &mut Lantern| {
            if let Some(flag) = &l.snuffed {
                flag.store(true, Ordering::SeqCst);
            }
        });
    }
}

fn lantern() -> (
    Arc<Bridge>,
    Arc<crate::engine::headless::HeadlessEngine>,
    Instance<Lantern>,
    Arc<AtomicBool>,
) {
    let (bridge, engine) = Bridge::headless();
    bridge.register::<Lantern>(vec![]);
    let lantern = bridge.instantiate::<Lantern>();
    let snuffed = Arc::new(AtomicBool::new(false));
    lantern.bind().snuffed = Some(Arc::clone(&snuffed));
    (bridge, engine, lantern, snuffed)
}

#[test]
fn test_free_while_borrowed_defers_teardown() {
    let (bridge, engine, lantern, snuffed) = lantern();
    {
        let _guard = lantern.bind();
        engine.free(lantern.object());
        assert!(!lantern.is_alive());
        assert!(!snuffed.load(Ordering::SeqCst));
    }
    // Teardown ran when the borrow ended
    assert!(snuffed.load(Ordering::SeqCst));
    assert!(lantern.try_bind().is_none());
    assert!(engine.errors().is_empty());
    assert!(bridge.identity().is_empty());
}

#[test]
fn test_free_from_other_thread_waits_for_borrow() {
    let (_bridge, engine, lantern, snuffed) = lantern();
    let object = lantern.object();
    let guard = lantern.bind();

    let freer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.free(object))
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!snuffed.load(Ordering::SeqCst));
    drop(guard);

    freer.join().unwrap();
    assert!(snuffed.load(Ordering::SeqCst));
    assert!(!lantern.is_alive());
    assert!(engine.errors().is_empty());
}

#[test]
fn test_bind_from_other_thread_waits() {
    let (bridge, engine) = Bridge::headless();
    bridge.register::<Counter>(vec![]);
    let counter = bridge.instantiate::<Counter>();
    let object = counter.object();
    let mut guard = counter.bind();

    let reader = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.get_property(object, "hits").map(|hits| hits.as_int()))
    };
    thread::sleep(Duration::from_millis(50));
    guard.hits = 5;
    drop(guard);

    assert_eq!(reader.join().unwrap(), Some(5));
}

use super::*;
use crate::engine::headless::HeadlessEngine;
use crate::engine::{EngineInterface, ObjectPtr};
use crate::variant::{RawVariant, VariantType};
use std::sync::Arc;

fn registry(track: bool) -> (HandleRegistry, Arc<HeadlessEngine>) {
    let engine = Arc::new(HeadlessEngine::new());
    let registry = HandleRegistry::new(Arc::clone(&engine) as Arc<dyn EngineInterface>, track);
    (registry, engine)
}

#[test]
fn test_ownership_classes() {
    assert_eq!(HandleKind::String.ownership(), Ownership::Half);
    assert_eq!(HandleKind::Callable.ownership(), Ownership::Pair);
    assert_eq!(HandleKind::Variant.ownership(), Ownership::Trio);
    assert_eq!(HandleKind::PackedColorArray.ownership(), Ownership::Solo);
    assert_eq!(HandleKind::Signal.words(), 2);
    assert_eq!(HandleKind::Variant.words(), 3);
    assert_eq!(HandleKind::PackedVector3Array.element_size(), Some(12));
    assert_eq!(HandleKind::String.element_size(), None);
}

#[test]
fn test_variant_kind_mapping() {
    assert_eq!(
        HandleKind::of_variant(VariantType::Dictionary),
        Some(HandleKind::Dictionary)
    );
    assert_eq!(HandleKind::of_variant(VariantType::Int), None);
    assert_eq!(HandleKind::of_variant(VariantType::Object), None);
    assert_eq!(
        HandleKind::PackedStringArray.variant_type(),
        VariantType::PackedStringArray
    );
}

#[test]
fn test_drop_releases_once() {
    let (registry, engine) = registry(true);
    {
        let text = registry.string("hello");
        assert_eq!(registry.read_string(text.get()), "hello");
        assert_eq!(registry.live_count(), 1);
    }
    assert_eq!(registry.live_count(), 0);
    assert_eq!(engine.live_resources(), 0);
    let stats = registry.stats();
    assert_eq!(stats.pinned, 1);
    assert_eq!(stats.released, 1);
}

#[test]
fn test_half_clone_takes_reference() {
    let (registry, engine) = registry(true);
    let text = registry.string("shared");
    let copy = text.clone();
    assert_eq!(registry.live_count(), 2);
    text.end();
    assert_eq!(registry.read_string(copy.get()), "shared");
    drop(copy);
    assert_eq!(engine.live_resources(), 0);
}

#[test]
fn test_into_raw_transfers_ownership() {
    let (registry, engine) = registry(true);
    let packed = registry.packed(HandleKind::PackedInt64Array, &[1i64, 2, 3]);
    let raw = packed.into_raw();
    assert_eq!(registry.live_count(), 0);
    // Engine still owns it
    assert_eq!(
        registry.read_packed::<i64>(HandleKind::PackedInt64Array, raw),
        vec![1, 2, 3]
    );
    engine.release(HandleKind::PackedInt64Array, &[raw]);
    assert_eq!(engine.live_resources(), 0);
}

#[test]
fn test_cycle_releases_previous() {
    let (registry, engine) = registry(true);
    let mut packed = registry.packed_strings(&["a".to_string()]);
    let next = engine.packed_strings_new(&["b".to_string(), "c".to_string()]);
    packed.cycle(next);
    assert_eq!(engine.live_resources(), 1);
    assert_eq!(
        registry.read_packed_strings(packed.get()),
        vec!["b".to_string(), "c".to_string()]
    );
}

#[test]
#[should_panic(expected = "double free")]
fn test_double_release_panics_when_tracking() {
    let (registry, engine) = registry(true);
    let raw = engine.string_new("once");
    let text = registry.pin_half(HandleKind::String, raw);
    text.end();
    registry.release_raw(HandleKind::String, &[raw]);
}

#[test]
#[should_panic(expected = "use after free")]
fn test_read_after_release_panics_when_tracking() {
    let (registry, engine) = registry(true);
    let raw = engine.string_new("gone");
    let text = registry.pin_half(HandleKind::String, raw);
    let alias = text.clone();
    text.end();
    alias.end();
    registry.assert_live(HandleKind::String, &[raw]);
}

#[test]
fn test_concurrent_clone_and_release_keep_count() {
    let (registry, engine) = registry(true);
    let text = registry.string("shared across threads");
    let raw = text.get();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..250 {
                    let copy = text.clone();
                    assert!(registry.is_live(HandleKind::String, &[raw]));
                    drop(copy);
                }
            });
        }
    });

    // The original reference survives every concurrent release
    assert_eq!(registry.live_count(), 1);
    registry.assert_live(HandleKind::String, &[raw]);
    text.end();
    assert_eq!(registry.live_count(), 0);
    assert_eq!(engine.live_resources(), 0);
    assert_eq!(registry.stats().released, 1001);
}

#[test]
fn test_untracked_registry_counts_nothing_live() {
    let (registry, engine) = registry(false);
    let text = registry.string("untracked");
    assert!(!registry.is_tracking());
    assert_eq!(registry.live_count(), 0);
    drop(text);
    assert_eq!(engine.live_resources(), 0);
}

#[test]
fn test_pair_callable() {
    let (registry, engine) = registry(true);
    let callable = registry.callable(Box::new(|_: &[RawVariant]| RawVariant::from_bool(true)));
    let ret = engine.callable_call(callable.get(), &[]);
    assert!(ret.as_bool());
    drop(callable);
    assert_eq!(engine.live_resources(), 0);
}

#[test]
fn test_signal_pair_owns_name() {
    let (registry, engine) = registry(true);
    let object = engine.create("Node");
    let signal = registry.signal(object, "died");
    let [word, name] = signal.get();
    assert_eq!(ObjectPtr::from_addr(word), object);
    assert_eq!(registry.read_string(name), "died");
    drop(signal);
    assert_eq!(engine.live_resources(), 0);
}

#[test]
fn test_trio_owns_payload() {
    let (registry, engine) = registry(true);
    let array = engine.array_new(&[RawVariant::from_int(1)]);
    let trio = registry.pin_trio(RawVariant::from_handle(VariantType::Array, array));
    assert_eq!(trio.get().variant_type(), VariantType::Array);
    assert_eq!(registry.live_count(), 1);
    drop(trio);
    assert_eq!(engine.live_resources(), 0);

    let inline = registry.pin_trio(RawVariant::from_int(5));
    assert_eq!(registry.live_count(), 0);
    assert_eq!(inline.into_raw().as_int(), 5);
}

#[test]
fn test_handle_key_pads_words() {
    let key = HandleKey::new(HandleKind::String, &[7]);
    assert_eq!(key.words, [7, 0]);
}

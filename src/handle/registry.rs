//! Handle registry - ownership tracking for engine resources
//!
//! Every owned handle passes through [`HandleRegistry::track`] when pinned and
//! [`HandleRegistry::release_raw`] when released. With tracking enabled the
//! registry keeps a concurrent multiset of live handles, which turns a second
//! release or a read of a released handle into an immediate panic instead of
//! engine heap corruption.

use bytemuck::Pod;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::kind::{HandleKind, Ownership};
use super::owned::{Half, Pair, Solo, Trio};
use crate::engine::{CallableFn, EngineInterface, ObjectPtr};
use crate::logging::{log_handle_pin, log_handle_release};
use crate::variant::RawVariant;

/// Identity of a live handle: kind plus up to two words
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandleKey {
    pub kind: HandleKind,
    pub words: [usize; 2],
}

impl HandleKey {
    pub fn new(kind: HandleKind, words: &[usize]) -> Self {
        let mut key = [0usize; 2];
        for (dst, src) in key.iter_mut().zip(words) {
            *dst = *src;
        }
        Self { kind, words: key }
    }
}

/// Counters for diagnostics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandleStats {
    pub pinned: u64,
    pub released: u64,
    /// Tracked live handles (0 when tracking is off)
    pub live: usize,
}

struct RegistryInner {
    engine: Arc<dyn EngineInterface>,
    live: Option<DashMap<HandleKey, u32>>,
    pinned: AtomicU64,
    released: AtomicU64,
}

/// Shared ownership registry; cheap to clone
#[derive(Clone)]
pub struct HandleRegistry {
    inner: Arc<RegistryInner>,
}

impl HandleRegistry {
    pub fn new(engine: Arc<dyn EngineInterface>, track: bool) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                engine,
                live: track.then(|| DashMap::with_capacity(256)),
                pinned: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    #[inline]
    pub fn engine(&self) -> &Arc<dyn EngineInterface> {
        &self.inner.engine
    }

    #[inline]
    pub fn is_tracking(&self) -> bool {
        self.inner.live.is_some()
    }

    // ------------------------------------------------------------------
    // Raw bookkeeping
    // ------------------------------------------------------------------

    /// Record that the host now owns one reference to `words`
    pub fn track(&self, kind: HandleKind, words: &[usize]) {
        if let Some(live) = &self.inner.live {
            *live.entry(HandleKey::new(kind, words)).or_insert(0) += 1;
        }
        self.inner.pinned.fetch_add(1, Ordering::Relaxed);
        log_handle_pin(kind, words.first().copied().unwrap_or(0));
    }

    /// Drop one tracked reference; `false` when none was live
    fn untrack(&self, kind: HandleKind, words: &[usize]) -> bool {
        let Some(live) = &self.inner.live else {
            return true;
        };
        match live.entry(HandleKey::new(kind, words)) {
            Entry::Occupied(mut entry) => {
                if *entry.get() <= 1 {
                    entry.remove();
                } else {
                    *entry.get_mut() -= 1;
                }
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Whether the host holds a live reference to `words`
    pub fn is_live(&self, kind: HandleKind, words: &[usize]) -> bool {
        match &self.inner.live {
            Some(live) => live.contains_key(&HandleKey::new(kind, words)),
            None => true,
        }
    }

    /// Panic if a tracked handle is no longer live
    #[inline]
    pub fn assert_live(&self, kind: HandleKind, words: &[usize]) {
        if !self.is_live(kind, words) {
            panic!("use after free: {kind:?} handle {words:#x?} is not live");
        }
    }

    /// Release one host reference to `words`
    ///
    /// # Panics
    /// With tracking enabled, when the host holds no live reference.
    pub fn release_raw(&self, kind: HandleKind, words: &[usize]) {
        if !self.untrack(kind, words) {
            panic!("double free: {kind:?} handle {words:#x?} released twice");
        }
        self.inner.engine.release(kind, words);
        self.inner.released.fetch_add(1, Ordering::Relaxed);
        log_handle_release(kind, words.first().copied().unwrap_or(0));
    }

    /// Take an extra engine reference and track it
    pub fn reference_raw(&self, kind: HandleKind, words: &[usize]) {
        debug_assert!(
            kind.ownership().is_shared() || kind.ownership() == Ownership::Pair,
            "{kind:?} handles cannot be shared"
        );
        self.inner.engine.reference(kind, words);
        self.track(kind, words);
    }

    /// Stop tracking without releasing: ownership moved to the engine
    pub fn forget(&self, kind: HandleKind, words: &[usize]) {
        if !self.untrack(kind, words) {
            panic!("use after free: {kind:?} handle {words:#x?} transferred after release");
        }
    }

    // ------------------------------------------------------------------
    // Pinning (take ownership of a transferred handle)
    // ------------------------------------------------------------------

    pub fn pin_solo(&self, kind: HandleKind, raw: usize) -> Solo {
        debug_assert_eq!(kind.ownership(), Ownership::Solo);
        Solo::adopt(self.clone(), kind, raw)
    }

    pub fn pin_half(&self, kind: HandleKind, raw: usize) -> Half {
        debug_assert_eq!(kind.ownership(), Ownership::Half);
        Half::adopt(self.clone(), kind, raw)
    }

    pub fn pin_pair(&self, kind: HandleKind, words: [usize; 2]) -> Pair {
        debug_assert_eq!(kind.ownership(), Ownership::Pair);
        Pair::adopt(self.clone(), kind, words)
    }

    pub fn pin_trio(&self, raw: RawVariant) -> Trio {
        Trio::adopt(self.clone(), raw)
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    pub fn string(&self, text: &str) -> Half {
        let raw = self.inner.engine.string_new(text);
        self.pin_half(HandleKind::String, raw)
    }

    pub fn packed<T: Pod>(&self, kind: HandleKind, items: &[T]) -> Solo {
        debug_assert_eq!(kind.element_size(), Some(std::mem::size_of::<T>()));
        let raw = self
            .inner
            .engine
            .packed_new(kind, bytemuck::cast_slice(items));
        self.pin_solo(kind, raw)
    }

    pub fn packed_strings(&self, items: &[String]) -> Solo {
        let raw = self.inner.engine.packed_strings_new(items);
        self.pin_solo(HandleKind::PackedStringArray, raw)
    }

    pub fn array(&self, items: &[RawVariant]) -> Half {
        let raw = self.inner.engine.array_new(items);
        self.pin_half(HandleKind::Array, raw)
    }

    pub fn dictionary(&self, entries: &[(RawVariant, RawVariant)]) -> Half {
        let raw = self.inner.engine.dictionary_new(entries);
        self.pin_half(HandleKind::Dictionary, raw)
    }

    pub fn callable(&self, call: CallableFn) -> Pair {
        let words = self.inner.engine.callable_new(call);
        self.pin_pair(HandleKind::Callable, words)
    }

    /// Signal handle: the object word plus an owned name string
    pub fn signal(&self, object: ObjectPtr, name: &str) -> Pair {
        let name = self.inner.engine.string_new(name);
        self.pin_pair(HandleKind::Signal, [object.addr(), name])
    }

    // ------------------------------------------------------------------
    // Peeking (read without taking ownership)
    // ------------------------------------------------------------------

    pub fn read_string(&self, raw: usize) -> String {
        self.inner.engine.string_read(raw)
    }

    pub fn read_packed<T: Pod>(&self, kind: HandleKind, raw: usize) -> Vec<T> {
        let bytes = self.inner.engine.packed_read(kind, raw);
        bytemuck::pod_collect_to_vec(&bytes)
    }

    pub fn read_packed_strings(&self, raw: usize) -> Vec<String> {
        self.inner.engine.packed_strings_read(raw)
    }

    pub fn read_array(&self, raw: usize) -> Vec<RawVariant> {
        self.inner.engine.array_read(raw)
    }

    pub fn read_dictionary(&self, raw: usize) -> Vec<(RawVariant, RawVariant)> {
        self.inner.engine.dictionary_read(raw)
    }

    pub fn stats(&self) -> HandleStats {
        HandleStats {
            pinned: self.inner.pinned.load(Ordering::Relaxed),
            released: self.inner.released.load(Ordering::Relaxed),
            live: self.live_count(),
        }
    }

    /// Number of live tracked references
    pub fn live_count(&self) -> usize {
        self.inner
            .live
            .as_ref()
            .map(|live| live.iter().map(|entry| *entry.value() as usize).sum())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("tracking", &self.is_tracking())
            .field("stats", &self.stats())
            .finish()
    }
}

//! Owned handle wrappers, one type per ownership class
//!
//! Each wrapper releases its handle exactly once: on [`Drop`], on an explicit
//! `end`, or never when ownership is handed back to the engine with
//! `into_raw`. Only [`Half`] is `Clone`, and cloning takes a new engine
//! reference.

use std::fmt;

use super::kind::HandleKind;
use super::registry::HandleRegistry;
use crate::variant::RawVariant;

/// Shared release-once core of every wrapper
pub(crate) struct Slot {
    kind: HandleKind,
    words: [usize; 2],
    registry: HandleRegistry,
    live: bool,
}

impl Slot {
    fn adopt(registry: HandleRegistry, kind: HandleKind, words: [usize; 2]) -> Self {
        let slot = Self {
            kind,
            words,
            registry,
            live: true,
        };
        slot.registry.track(kind, slot.words());
        slot
    }

    #[inline]
    fn width(&self) -> usize {
        self.kind.words().min(2)
    }

    #[inline]
    fn words(&self) -> &[usize] {
        &self.words[..self.width()]
    }

    fn get(&self) -> [usize; 2] {
        if !self.live {
            panic!("use after free: {:?} handle read after end", self.kind);
        }
        self.registry.assert_live(self.kind, self.words());
        self.words
    }

    fn end(&mut self) {
        if std::mem::replace(&mut self.live, false) {
            self.registry.release_raw(self.kind, &self.words[..self.width()]);
        }
    }

    fn take(&mut self) -> [usize; 2] {
        if std::mem::replace(&mut self.live, false) {
            self.registry.forget(self.kind, &self.words[..self.width()]);
        }
        self.words
    }

    fn cycle(&mut self, words: [usize; 2]) {
        self.end();
        self.words = words;
        self.live = true;
        self.registry.track(self.kind, &self.words[..self.width()]);
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.end();
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:#x?}", self.kind, self.words())?;
        if !self.live {
            write!(f, ", released")?;
        }
        write!(f, ")")
    }
}

/// Unique one-word handle (packed arrays)
#[derive(Debug)]
pub struct Solo(Slot);

impl Solo {
    pub(super) fn adopt(registry: HandleRegistry, kind: HandleKind, raw: usize) -> Self {
        Solo(Slot::adopt(registry, kind, [raw, 0]))
    }

    #[inline]
    pub fn kind(&self) -> HandleKind {
        self.0.kind
    }

    /// Borrow the raw handle
    pub fn get(&self) -> usize {
        self.0.get()[0]
    }

    /// Release now
    pub fn end(mut self) {
        self.0.end();
    }

    /// Hand ownership to the engine
    pub fn into_raw(mut self) -> usize {
        self.0.take()[0]
    }

    /// Replace the handle, releasing the old one
    pub fn cycle(&mut self, raw: usize) {
        self.0.cycle([raw, 0]);
    }
}

/// Engine reference-counted one-word handle (string, array, dictionary)
#[derive(Debug)]
pub struct Half(Slot);

impl Half {
    pub(super) fn adopt(registry: HandleRegistry, kind: HandleKind, raw: usize) -> Self {
        Half(Slot::adopt(registry, kind, [raw, 0]))
    }

    #[inline]
    pub fn kind(&self) -> HandleKind {
        self.0.kind
    }

    pub fn get(&self) -> usize {
        self.0.get()[0]
    }

    pub fn end(mut self) {
        self.0.end();
    }

    pub fn into_raw(mut self) -> usize {
        self.0.take()[0]
    }

    pub fn cycle(&mut self, raw: usize) {
        self.0.cycle([raw, 0]);
    }

    /// The registry this handle reports to
    pub fn registry(&self) -> &HandleRegistry {
        &self.0.registry
    }
}

impl Clone for Half {
    fn clone(&self) -> Self {
        let raw = self.get();
        self.0.registry.reference_raw(self.0.kind, &[raw]);
        Half(Slot {
            kind: self.0.kind,
            words: [raw, 0],
            registry: self.0.registry.clone(),
            live: true,
        })
    }
}

/// Two-word handle whose halves are released together (callable, signal)
#[derive(Debug)]
pub struct Pair(Slot);

impl Pair {
    pub(super) fn adopt(registry: HandleRegistry, kind: HandleKind, words: [usize; 2]) -> Self {
        Pair(Slot::adopt(registry, kind, words))
    }

    #[inline]
    pub fn kind(&self) -> HandleKind {
        self.0.kind
    }

    pub fn get(&self) -> [usize; 2] {
        self.0.get()
    }

    pub fn end(mut self) {
        self.0.end();
    }

    pub fn into_raw(mut self) -> [usize; 2] {
        self.0.take()
    }

    pub fn cycle(&mut self, words: [usize; 2]) {
        self.0.cycle(words);
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.0.registry
    }
}

/// Owned three-word variant; owns whatever handle its payload carries
#[derive(Debug)]
pub struct Trio {
    raw: RawVariant,
    payload: Option<Slot>,
    registry: HandleRegistry,
}

impl Trio {
    pub(super) fn adopt(registry: HandleRegistry, raw: RawVariant) -> Self {
        let payload = raw
            .payload()
            .map(|(kind, words)| Slot::adopt(registry.clone(), kind, words));
        Trio {
            raw,
            payload,
            registry,
        }
    }

    /// Borrow the raw variant
    pub fn get(&self) -> &RawVariant {
        if let Some(slot) = &self.payload {
            slot.get();
        }
        &self.raw
    }

    pub fn end(mut self) {
        if let Some(slot) = &mut self.payload {
            slot.end();
        }
    }

    /// Hand ownership of the variant (and its payload) to the engine
    pub fn into_raw(mut self) -> RawVariant {
        if let Some(slot) = &mut self.payload {
            slot.take();
        }
        self.raw
    }

    /// Replace the variant, releasing the old payload
    pub fn cycle(&mut self, raw: RawVariant) {
        if let Some(mut old) = self.payload.take() {
            old.end();
        }
        self.raw = raw;
        self.payload = raw
            .payload()
            .map(|(kind, words)| Slot::adopt(self.registry.clone(), kind, words));
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }
}

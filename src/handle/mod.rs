//! Pointer/handle ownership registry
//!
//! Design: Engine resources (strings, arrays, dictionaries, packed arrays,
//! callables, signals, variants) are opaque handles that must be released
//! exactly once. Ownership is encoded in the wrapper type:
//! - [`Solo`]: unique one-word handle
//! - [`Pair`]: two words released together
//! - [`Half`]: engine ref-counted; `Clone` takes a reference
//! - [`Trio`]: three-word variant owning its payload handle
//!
//! A handle the engine *transfers* is pinned into one of these wrappers and
//! released by the host. A handle the host merely *peeks* at (the `read_*`
//! functions) is never released. With tracking enabled, double release and
//! use after release panic.

mod kind;
mod owned;
mod registry;

pub use kind::{HandleKind, Ownership};
pub use owned::{Half, Pair, Solo, Trio};
pub use registry::{HandleKey, HandleRegistry, HandleStats};

#[cfg(test)]
mod tests;

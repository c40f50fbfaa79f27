//! Object identity - engine handles to live host instances
//!
//! Design:
//! - [`IdentityMap`]: concurrent `ObjectPtr -> binding` table (`dashmap`)
//! - [`InstanceCell`]: one live host value plus the engine object it backs
//! - [`Instance`]: shared, typed handle to an instance cell
//!
//! The identity map holds type-erased [`InstanceBinding`]s so one map can serve
//! every registered class; typed access downcasts through `Any`.

mod identity;
mod instance;

pub use identity::{IdentityMap, InstanceBinding};
pub use instance::{Instance, InstanceCell, InstanceGuard};
pub(crate) use instance::Retired;

#[cfg(test)]
mod tests;

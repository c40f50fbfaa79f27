//! Class registration and virtual dispatch
//!
//! Design: A host type implements [`ExtensionClass`] and declares its members
//! on a [`ClassBuilder`]. Registration turns the builder into an immutable
//! class record:
//! - properties with group and range hints, exported methods, static methods,
//!   constants, signals, child fields
//! - a virtual table built from the base class's declared slots; host methods
//!   named after a slot (`_process` -> `Process`) override it, and their
//!   signatures are checked once, at registration
//! - documentation merged from the builder, extras and the editor sidecar
//!
//! The record implements the engine's inbound [`ClassCallbacks`]
//! (construct, free, virtual lookup and dispatch, property access, method
//! calls) and reaches the rest of the bridge through a weak reference.
//!
//! Lifecycle: declared -> registered -> instance constructed -> instance
//! ready -> instance freed -> unregistered.
//!
//! [`ClassCallbacks`]: crate::engine::ClassCallbacks

mod builder;
mod class;
mod docs;
mod extras;
mod method;
mod naming;
mod record;
mod signals;
mod virtuals;

pub use builder::{ClassBuilder, MemberDoc, MethodBuilder, PropertyBuilder};
pub use class::{init_level, is_tool, ExtensionClass, InitLevel};
pub use docs::{ClassDocs, DocIndex};
pub use extras::{Extra, Function};
pub use method::{
    Ctor, Exclusive, FunctionKind, IntoFunction, IntoMethod, IntoStatic, Shared, SignalArgs,
    Signature, Static,
};
pub use naming::{host_method_name, pascal_case, snake_case};
pub use signals::{Forwarder, SignalChannel};

pub(crate) use record::{ClassOps, ClassRecord};

#[cfg(test)]
mod tests;

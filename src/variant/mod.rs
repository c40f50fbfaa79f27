//! Variant marshalling - dynamic engine values <-> static host types
//!
//! Design:
//! - [`Variant`]: owned host-side tagged union
//! - [`RawVariant`]: three-word FFI encoding (tag + two payload words)
//! - `convert`: compile-time `ToVariant`/`FromVariant` conversions
//! - `marshal`: `Variant` <-> `RawVariant` through the handle registry
//! - `dynamic`: serde-driven shape inspection with dictionary fallback
//!
//! Host -> variant picks the kind from the static type; variant -> host picks
//! the most convenient host type for the runtime tag ([`Variant::into_host`]).

mod convert;
mod dynamic;
mod marshal;
mod raw;
mod types;

pub use convert::{FromVariant, ToVariant, VariantElement, VariantTyped};
pub use dynamic::to_variant_dynamic;
pub use raw::RawVariant;
pub use types::{Callable, Color, Dictionary, HostFn, Signal, Variant, VariantType};

pub use glam::{Vec2, Vec3, Vec4};

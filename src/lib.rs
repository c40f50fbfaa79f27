//! extbridge - runtime bridge between a native game engine's C extension API
//! and Rust host classes
//!
//! Design: Layers, bottom up:
//! 1. [`frame`]: typed call frames for outbound `ptrcall`s
//! 2. [`handle`]: ownership wrappers for engine resource handles
//! 3. [`variant`]: dynamic engine values <-> static host types
//! 4. [`object`]: identity map from engine objects to host instances
//! 5. [`register`]: class registration and virtual dispatch
//! 6. [`scene`]: child node binding at ready time
//!
//! [`engine`] is the seam to the engine itself (C ABI adapter or the
//! in-process headless engine), [`classes`] wraps engine classes, and
//! [`Bridge`] ties one engine to all registries.
//!
//! A shared library exposes its classes with [`export_extension!`]:
//!
//! ```ignore
//! fn register(bridge: &extbridge::Bridge) {
//!     bridge.declare::<Player>(vec![]);
//! }
//!
//! extbridge::export_extension!(register);
//! ```

pub mod bridge;
pub mod classes;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod handle;
pub mod logging;
pub mod object;
pub mod register;
pub mod scene;
pub mod variant;

pub use bridge::{Bridge, BridgeScope, BridgeStats};
pub use classes::{
    AsNode, AsNode2D, AsNode3D, AsObject, AsRefCounted, AsResource, EditorPlugin, EngineClass,
    Node, Node2D, Node3D, Object, RefCounted, Resource, Script, ScriptLanguage,
};
pub use config::BridgeConfig;
pub use engine::{EngineInterface, ObjectPtr};
pub use error::{BridgeError, CallError, ConvertError, RegistrationError, Result};
pub use object::Instance;
pub use register::{
    ClassBuilder, ClassDocs, Extra, ExtensionClass, InitLevel, SignalArgs, SignalChannel,
};
pub use scene::Child;
pub use variant::{
    Callable, Color, Dictionary, FromVariant, Signal, ToVariant, Variant, VariantType, Vec2,
    Vec3, Vec4,
};

/// Define the C entry point the engine loads the extension through
///
/// `$registrar` is a `fn(&Bridge)` that registers or declares classes. It
/// runs once, when the engine hands over its interface table.
#[macro_export]
macro_rules! export_extension {
    ($registrar:path) => {
        /// # Safety
        /// Called by the engine with valid, live interface and init tables.
        #[no_mangle]
        pub unsafe extern "C" fn extbridge_init(
            interface: *const $crate::engine::ffi::ExtensionInterface,
            init: *mut $crate::engine::ffi::InitializationInfo,
        ) -> u8 {
            $crate::engine::ffi::init(interface, init, $registrar)
        }
    };
}

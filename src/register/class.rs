//! Host class trait and initialization levels

use serde::{Deserialize, Serialize};

use super::builder::ClassBuilder;
use super::naming::type_short_name;
use crate::classes::EngineClass;

/// Engine initialization stage at which a class is registered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitLevel {
    Core,
    Servers,
    Scene,
    Editor,
}

impl InitLevel {
    pub const ALL: [InitLevel; 4] = [
        InitLevel::Core,
        InitLevel::Servers,
        InitLevel::Scene,
        InitLevel::Editor,
    ];

    /// Engine ABI value
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_u32() == value)
    }
}

/// Host type exposed to the engine as a class
///
/// ```ignore
/// struct Player { speed: f64 }
///
/// impl ExtensionClass for Player {
///     type Base = Node2D;
///
///     fn init(_base: Node2D) -> Self {
///         Player { speed: 4.0 }
///     }
///
///     fn register(builder: &mut ClassBuilder<Self>) {
///         builder.property("speed", |p| &p.speed, |p| &mut p.speed);
///         builder.method("Process", |p: &mut Player, delta: f64| { /* ... */ });
///     }
/// }
/// ```
pub trait ExtensionClass: Sized + Send + 'static {
    /// Engine class this one extends
    type Base: EngineClass;

    /// Run inside the editor even when the base is not tool-capable
    const TOOL: bool = false;

    /// Engine-visible class name; the Rust type name by default
    fn class_name() -> String {
        type_short_name(std::any::type_name::<Self>()).to_string()
    }

    /// Fresh host value for a newly constructed engine object
    fn init(base: Self::Base) -> Self;

    /// Declare properties, methods, signals and children
    fn register(builder: &mut ClassBuilder<Self>) {
        let _ = builder;
    }
}

/// Tool classes run in the editor and register at [`InitLevel::Editor`]
pub fn is_tool<T: ExtensionClass>() -> bool {
    T::TOOL || <T::Base as EngineClass>::TOOL_CAPABLE
}

/// Level a declared class registers at
pub fn init_level<T: ExtensionClass>() -> InitLevel {
    if is_tool::<T>() {
        InitLevel::Editor
    } else {
        InitLevel::Scene
    }
}

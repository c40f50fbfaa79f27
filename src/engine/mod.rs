//! Engine seam - everything the bridge needs from the host engine
//!
//! Design: The engine is reached through one object-safe trait,
//! [`EngineInterface`]. Two implementations ship with the crate:
//! - [`ffi::FfiEngine`]: adapter over the engine's `#[repr(C)]` function table
//! - [`headless::HeadlessEngine`]: in-process engine used by tests and tools
//!
//! Inbound traffic (engine -> host) arrives through [`ClassCallbacks`], one
//! object per registered class.
//!
//! Handles are word-sized (`usize`), so their width follows the target.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

use crate::error::CallError;
use crate::handle::HandleKind;
use crate::variant::{RawVariant, VariantType};

pub mod ffi;
pub mod headless;


/// Opaque engine object handle
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
pub struct ObjectPtr(usize);

impl ObjectPtr {
    pub const NULL: ObjectPtr = ObjectPtr(0);

    #[inline]
    pub const fn from_addr(addr: usize) -> Self {
        ObjectPtr(addr)
    }

    #[inline]
    pub const fn addr(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn as_mut_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    #[inline]
    pub fn from_mut_ptr(ptr: *mut c_void) -> Self {
        ObjectPtr(ptr as usize)
    }
}

impl fmt::Display for ObjectPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Bound-method invocation entry point: `(bind, object, args, ret)`
///
/// `args` points at an array of argument addresses; `ret` at storage sized
/// for the declared return type. The call is synchronous.
pub type PtrCallFn = unsafe extern "C" fn(
    bind: *const c_void,
    object: *mut c_void,
    args: *const *const c_void,
    ret: *mut c_void,
);

/// Resolved engine method
#[derive(Clone, Copy, Debug)]
pub struct MethodBind {
    /// Engine-side identifier passed back on every call
    pub bind: usize,
    pub call: PtrCallFn,
}

/// Engine-side implementation of a host callable
pub type CallableFn = Box<dyn Fn(&[RawVariant]) -> RawVariant + Send + Sync>;

/// Index into a class's virtual table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VirtualId(pub u32);

bitflags! {
    /// Method registration flags
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MethodFlags: u32 {
        const NORMAL = 1;
        const EDITOR = 1 << 1;
        const CONST = 1 << 2;
        const VIRTUAL = 1 << 3;
        const STATIC = 1 << 5;
    }
}

bitflags! {
    /// Property usage flags
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PropertyUsage: u32 {
        const STORAGE = 1 << 1;
        const EDITOR = 1 << 2;
        const GROUP = 1 << 6;
        const DEFAULT = Self::STORAGE.bits() | Self::EDITOR.bits();
    }
}

/// Editor hint attached to a property
#[derive(Clone, Debug, Default, PartialEq)]
pub enum PropertyHint {
    #[default]
    None,
    Range {
        min: f64,
        max: f64,
        step: f64,
    },
}

impl PropertyHint {
    /// Engine hint string (`"min,max,step"` for ranges)
    pub fn hint_string(&self) -> String {
        match self {
            PropertyHint::None => String::new(),
            PropertyHint::Range { min, max, step } => format!("{min},{max},{step}"),
        }
    }
}

/// Property metadata handed to the engine
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyInfo {
    pub name: String,
    pub variant_type: VariantType,
    pub hint: PropertyHint,
    pub usage: PropertyUsage,
    pub doc: Option<String>,
}

/// Method metadata handed to the engine
#[derive(Clone, Debug, PartialEq)]
pub struct MethodInfo {
    pub name: String,
    pub params: Vec<VariantType>,
    pub ret: VariantType,
    pub flags: MethodFlags,
    pub doc: Option<String>,
}

/// Signal metadata handed to the engine
#[derive(Clone, Debug, PartialEq)]
pub struct SignalInfo {
    pub name: String,
    pub params: Vec<VariantType>,
    pub doc: Option<String>,
}

/// Class descriptor handed to the engine at registration
#[derive(Clone)]
pub struct ClassInfo {
    pub name: String,
    pub parent: String,
    pub tool: bool,
    pub doc: Option<String>,
    pub callbacks: Arc<dyn ClassCallbacks>,
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("tool", &self.tool)
            .finish_non_exhaustive()
    }
}

/// Inbound entry points the engine invokes for a registered class
///
/// Returned `RawVariant`s transfer ownership to the engine; argument slices
/// are only borrowed for the duration of the call.
pub trait ClassCallbacks: Send + Sync {
    /// Construct the parent engine object and attach a fresh host value
    fn create_instance(&self) -> ObjectPtr;

    /// Tear down the host side of `object`
    fn free_instance(&self, object: ObjectPtr);

    /// Resolve an engine virtual method name
    fn get_virtual(&self, name: &str) -> Option<VirtualId>;

    fn call_virtual(&self, object: ObjectPtr, id: VirtualId, args: &[RawVariant]) -> RawVariant;

    fn get_property(&self, object: ObjectPtr, name: &str) -> Option<RawVariant>;

    fn set_property(&self, object: ObjectPtr, name: &str, value: &RawVariant) -> bool;

    /// Invoke a registered method; `object` is `None` for static methods
    fn call_method(
        &self,
        object: Option<ObjectPtr>,
        method: &str,
        args: &[RawVariant],
    ) -> Result<RawVariant, CallError>;
}

/// Everything the bridge asks of the engine
///
/// Resource functions follow one ownership rule: `*_new` returns a handle the
/// caller owns, `*_read` only peeks. Raw variants passed into `array_new` and
/// `dictionary_new` are copied by the engine.
pub trait EngineInterface: Send + Sync {
    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    fn class_exists(&self, class: &str) -> bool;

    /// `true` when `class` is `ancestor` or derives from it
    fn is_parent_class(&self, class: &str, ancestor: &str) -> bool;

    /// Construct an object; null when the class is unknown
    fn construct_object(&self, class: &str) -> ObjectPtr;

    fn destroy_object(&self, object: ObjectPtr);

    fn object_class(&self, object: ObjectPtr) -> Option<String>;

    /// Mark `object` as an instance of the extension class `class`
    fn attach_instance(&self, object: ObjectPtr, class: &str);

    fn method_bind(&self, class: &str, method: &str, hash: i64) -> Option<MethodBind>;

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    fn string_new(&self, text: &str) -> usize;

    fn string_read(&self, handle: usize) -> String;

    /// Packed array of plain elements, passed as raw bytes
    fn packed_new(&self, kind: HandleKind, bytes: &[u8]) -> usize;

    fn packed_read(&self, kind: HandleKind, handle: usize) -> Vec<u8>;

    fn packed_strings_new(&self, items: &[String]) -> usize;

    fn packed_strings_read(&self, handle: usize) -> Vec<String>;

    fn array_new(&self, items: &[RawVariant]) -> usize;

    fn array_read(&self, handle: usize) -> Vec<RawVariant>;

    fn dictionary_new(&self, entries: &[(RawVariant, RawVariant)]) -> usize;

    fn dictionary_read(&self, handle: usize) -> Vec<(RawVariant, RawVariant)>;

    fn callable_new(&self, call: CallableFn) -> [usize; 2];

    /// Invoke a callable; the result is owned by the caller
    fn callable_call(&self, callable: [usize; 2], args: &[RawVariant]) -> RawVariant;

    /// Take an additional reference (shared kinds only)
    fn reference(&self, kind: HandleKind, words: &[usize]);

    fn release(&self, kind: HandleKind, words: &[usize]);

    // ------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------

    fn emit_signal(&self, object: ObjectPtr, signal: &str, args: &[RawVariant]);

    // ------------------------------------------------------------------
    // Class database
    // ------------------------------------------------------------------

    fn register_class(&self, info: ClassInfo);

    fn register_property(&self, class: &str, property: PropertyInfo);

    fn register_property_group(&self, class: &str, group: &str, prefix: &str);

    fn register_signal(&self, class: &str, signal: SignalInfo);

    fn register_method(&self, class: &str, method: MethodInfo);

    fn register_constant(&self, class: &str, name: &str, value: i64);

    fn unregister_class(&self, class: &str);

    // ------------------------------------------------------------------
    // Environment
    // ------------------------------------------------------------------

    fn is_editor(&self) -> bool;

    /// Engine error channel
    fn report_error(&self, message: &str);
}

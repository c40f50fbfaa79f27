//! Engine class wrappers
//!
//! Design: Each engine class is a thin `RawObject` newtype implementing
//! [`EngineClass`]. Upcasting goes through one trait per tier (`AsObject`,
//! `AsRefCounted`, `AsResource`, `AsNode`, `AsNode2D`, `AsNode3D`),
//! implemented explicitly along every wrapper's ancestry chain.
//!
//! Wrapper methods resolve a method bind once per `(class, method)` through
//! the bridge cache and invoke it with a [`CallFrame`].

use std::fmt;
use std::sync::Arc;

use crate::bridge::Bridge;
use crate::engine::{MethodBind, ObjectPtr};
use crate::frame::{CallFrame, FrameValue};
use crate::logging::log_ffi_call;
use crate::variant::VariantType;

/// Engine virtual method a class may override
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VirtualSlot {
    /// Engine name, e.g. `_process`
    pub name: &'static str,
    pub params: &'static [VariantType],
    pub ret: VariantType,
}

impl VirtualSlot {
    pub const fn new(
        name: &'static str,
        params: &'static [VariantType],
        ret: VariantType,
    ) -> Self {
        Self { name, params, ret }
    }
}

/// Engine object handle plus the bridge it lives in
#[derive(Clone)]
pub struct RawObject {
    ptr: ObjectPtr,
    bridge: Arc<Bridge>,
}

impl RawObject {
    pub fn new(ptr: ObjectPtr, bridge: Arc<Bridge>) -> Self {
        Self { ptr, bridge }
    }

    #[inline]
    pub fn ptr(&self) -> ObjectPtr {
        self.ptr
    }

    #[inline]
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    fn method(&self, class: &'static str, method: &'static str, hash: i64) -> MethodBind {
        match self.bridge.method_bind(class, method, hash) {
            Some(bind) => bind,
            None => panic!("engine does not provide `{class}::{method}`"),
        }
    }

    /// Invoke `class::method` on this object and read an `R` result
    ///
    /// # Safety
    /// The frame's arguments and `R` must match the engine method's signature.
    pub(crate) unsafe fn ptrcall<R: FrameValue>(
        &self,
        class: &'static str,
        method: &'static str,
        hash: i64,
        frame: CallFrame,
    ) -> R {
        let bind = self.method(class, method, hash);
        log_ffi_call(class, method, frame.arg_count());
        frame.call(bind, self.ptr)
    }

    /// # Safety
    /// The frame's arguments must match the engine method's signature.
    pub(crate) unsafe fn ptrcall_void(
        &self,
        class: &'static str,
        method: &'static str,
        hash: i64,
        frame: CallFrame,
    ) {
        let bind = self.method(class, method, hash);
        log_ffi_call(class, method, frame.arg_count());
        frame.call_void(bind, self.ptr);
    }
}

impl PartialEq for RawObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr && Arc::ptr_eq(&self.bridge, &other.bridge)
    }
}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawObject({})", self.ptr)
    }
}

/// Statically known engine class
pub trait EngineClass: Clone + Send + Sync + 'static {
    const NAME: &'static str;

    /// Parent engine class; `None` for the root
    const PARENT: Option<&'static str>;

    /// Instances of subclasses run inside the editor
    const TOOL_CAPABLE: bool;

    /// Virtual slots declared along the ancestry, root first
    fn virtuals(out: &mut Vec<VirtualSlot>);

    fn from_raw(raw: RawObject) -> Self;

    fn raw(&self) -> &RawObject;

    #[inline]
    fn object(&self) -> ObjectPtr {
        self.raw().ptr()
    }
}

/// Every virtual slot of `C`, root first
pub fn virtual_slots<C: EngineClass>() -> Vec<VirtualSlot> {
    let mut out = Vec::new();
    C::virtuals(&mut out);
    out
}

pub trait AsObject {
    fn as_object(&self) -> Object;
}

pub trait AsRefCounted: AsObject {
    fn as_ref_counted(&self) -> RefCounted;
}

pub trait AsResource: AsRefCounted {
    fn as_resource(&self) -> Resource;
}

pub trait AsNode: AsObject {
    fn as_node(&self) -> Node;
}

pub trait AsNode2D: AsNode {
    fn as_node_2d(&self) -> Node2D;
}

pub trait AsNode3D: AsNode {
    fn as_node_3d(&self) -> Node3D;
}

/// Declare a wrapper deriving from `$parent`
macro_rules! engine_class {
    (
        $(#[$meta:meta])*
        $name:ident : $parent:ident,
        tool = $tool:expr,
        virtuals = [$($slot:expr),* $(,)?]
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name(RawObject);

        impl EngineClass for $name {
            const NAME: &'static str = stringify!($name);
            const PARENT: Option<&'static str> = Some(<$parent as EngineClass>::NAME);
            const TOOL_CAPABLE: bool = $tool || <$parent as EngineClass>::TOOL_CAPABLE;

            fn virtuals(out: &mut Vec<VirtualSlot>) {
                <$parent as EngineClass>::virtuals(out);
                out.extend_from_slice(&[$($slot),*]);
            }

            fn from_raw(raw: RawObject) -> Self {
                Self(raw)
            }

            fn raw(&self) -> &RawObject {
                &self.0
            }
        }
    };
}

/// Implement tier traits for a wrapper: `upcast!(Node2D: AsObject::as_object -> Object, ...)`
macro_rules! upcast {
    ($name:ty : $($tier:ident :: $method:ident -> $target:ident),+ $(,)?) => {
        $(
            impl $tier for $name {
                fn $method(&self) -> $target {
                    $target::from_raw(self.raw().clone())
                }
            }
        )+
    };
}

pub(crate) use engine_class;
pub(crate) use upcast;

mod node;
mod object;

pub use node::{EditorPlugin, Node, Node2D, Node3D};
pub use object::{Object, RefCounted, Resource, Script, ScriptLanguage};

#[cfg(test)]
mod tests;

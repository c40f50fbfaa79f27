//! Object, RefCounted, Resource, Script, ScriptLanguage

use super::{
    engine_class, upcast, AsObject, AsRefCounted, AsResource, EngineClass, RawObject, VirtualSlot,
};
use crate::frame::CallFrame;
use crate::handle::HandleKind;
use crate::variant::VariantType;

/// Engine method hashes
mod hash {
    pub const GET_CLASS: i64 = 201670096;
    pub const IS_CLASS: i64 = 3927539163;
}

/// Root of the engine class hierarchy
#[derive(Clone, Debug, PartialEq)]
pub struct Object(RawObject);

impl EngineClass for Object {
    const NAME: &'static str = "Object";
    const PARENT: Option<&'static str> = None;
    const TOOL_CAPABLE: bool = false;

    fn virtuals(out: &mut Vec<VirtualSlot>) {
        out.extend_from_slice(&[
            VirtualSlot::new("_notification", &[VariantType::Int], VariantType::Nil),
            VirtualSlot::new("_to_string", &[], VariantType::String),
        ]);
    }

    fn from_raw(raw: RawObject) -> Self {
        Self(raw)
    }

    fn raw(&self) -> &RawObject {
        &self.0
    }
}

impl Object {
    /// Runtime class name; extension classes report their own name
    pub fn get_class(&self) -> String {
        let raw: usize =
            unsafe { self.0.ptrcall("Object", "get_class", hash::GET_CLASS, CallFrame::new()) };
        let handles = self.0.bridge().handles();
        let name = handles.pin_half(HandleKind::String, raw);
        handles.read_string(name.get())
    }

    /// `true` when the object is `class` or inherits from it
    pub fn is_class(&self, class: &str) -> bool {
        let handles = self.0.bridge().handles();
        let name = handles.string(class);
        let mut frame = CallFrame::new();
        frame.push(name.get());
        unsafe { self.0.ptrcall("Object", "is_class", hash::IS_CLASS, frame) }
    }

    /// Downcast when the runtime class allows it
    pub fn cast<C: EngineClass>(&self) -> Option<C> {
        self.is_class(C::NAME)
            .then(|| C::from_raw(self.0.clone()))
    }

    /// Destroy the engine object; extension instances are freed first
    pub fn free(self) {
        self.0.bridge().engine().destroy_object(self.0.ptr());
    }
}

upcast!(Object: AsObject::as_object -> Object);

engine_class! {
    /// Engine reference-counted object
    RefCounted: Object,
    tool = false,
    virtuals = []
}

upcast!(RefCounted:
    AsObject::as_object -> Object,
    AsRefCounted::as_ref_counted -> RefCounted,
);

engine_class! {
    /// Serializable engine resource
    Resource: RefCounted,
    tool = false,
    virtuals = [VirtualSlot::new("_setup_local_to_scene", &[], VariantType::Nil)]
}

upcast!(Resource:
    AsObject::as_object -> Object,
    AsRefCounted::as_ref_counted -> RefCounted,
    AsResource::as_resource -> Resource,
);

engine_class! {
    /// Script resource; extensions deriving from it run in the editor
    Script: Resource,
    tool = true,
    virtuals = [
        VirtualSlot::new("_can_instantiate", &[], VariantType::Bool),
        VirtualSlot::new("_get_source_code", &[], VariantType::String),
        VirtualSlot::new("_set_source_code", &[VariantType::String], VariantType::Nil),
    ]
}

upcast!(Script:
    AsObject::as_object -> Object,
    AsRefCounted::as_ref_counted -> RefCounted,
    AsResource::as_resource -> Resource,
);

engine_class! {
    /// Scripting language provider
    ScriptLanguage: Object,
    tool = true,
    virtuals = [
        VirtualSlot::new("_get_name", &[], VariantType::String),
        VirtualSlot::new("_get_extension", &[], VariantType::String),
        VirtualSlot::new("_type_string", &[VariantType::Int], VariantType::String),
    ]
}

upcast!(ScriptLanguage: AsObject::as_object -> Object);

//! Headless engine - an in-process engine for tests and tooling
//!
//! Design: All engine state lives behind one `parking_lot::Mutex`. The lock is
//! never held while calling back into host code (class callbacks, callables),
//! so host code is free to re-enter the engine from inside a callback.
//!
//! - Objects: a table keyed by fake addresses, with a parent/child tree
//! - Resources: a ref-counted heap; `*_new` starts at one reference
//! - Method binds: boxed descriptors served through one `extern "C"` trampoline
//! - Class database: registered extension classes with their metadata
//! - Drivers: ready/process notifications, property and method calls

use bytemuck::Pod;
use glam::{Vec2, Vec3, Vec4};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::{Arc, Weak};

use super::{
    CallableFn, ClassCallbacks, ClassInfo, EngineInterface, MethodBind, MethodInfo, ObjectPtr,
    PropertyInfo, SignalInfo,
};
use crate::error::CallError;
use crate::handle::{HandleKind, Ownership};
use crate::logging::{debug, warn};
use crate::variant::{Color, Dictionary, RawVariant, Signal, Variant, VariantType};

/// Engine classes the headless engine knows out of the box, with parents
const BUILTIN_CLASSES: &[(&str, Option<&str>)] = &[
    ("Object", None),
    ("RefCounted", Some("Object")),
    ("Resource", Some("RefCounted")),
    ("Script", Some("Resource")),
    ("ScriptLanguage", Some("Object")),
    ("Node", Some("Object")),
    ("Node2D", Some("Node")),
    ("Node3D", Some("Node")),
    ("EditorPlugin", Some("Node")),
];

const FIRST_OBJECT: usize = 0x1000;
const OBJECT_STRIDE: usize = 0x10;

/// Extension class as recorded by the class database
#[derive(Clone, Debug)]
pub struct RegisteredClass {
    pub info: ClassInfo,
    pub properties: Vec<PropertyInfo>,
    /// `(group, prefix)` in registration order
    pub groups: Vec<(String, String)>,
    pub signals: Vec<SignalInfo>,
    pub methods: Vec<MethodInfo>,
    pub constants: Vec<(String, i64)>,
}

impl RegisteredClass {
    fn new(info: ClassInfo) -> Self {
        Self {
            info,
            properties: Vec::new(),
            groups: Vec::new(),
            signals: Vec::new(),
            methods: Vec::new(),
            constants: Vec::new(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyInfo> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn signal(&self, name: &str) -> Option<&SignalInfo> {
        self.signals.iter().find(|s| s.name == name)
    }

    pub fn constant(&self, name: &str) -> Option<i64> {
        self.constants
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

/// One recorded signal emission
#[derive(Clone, Debug, PartialEq)]
pub struct Emission {
    pub object: ObjectPtr,
    pub signal: String,
    pub args: Vec<Variant>,
}

struct ClassEntry {
    parent: Option<String>,
    extension: Option<RegisteredClass>,
}

struct ObjectRecord {
    class: String,
    extension: Option<String>,
    name: String,
    parent: Option<usize>,
    /// `(child, internal)` in insertion order
    children: Vec<(usize, bool)>,
    ready: bool,
    position2d: Vec2,
    position3d: Vec3,
}

enum ResourceData {
    String(String),
    Packed(HandleKind, Vec<u8>),
    Strings(Vec<String>),
    Array(Vec<RawVariant>),
    Dictionary(Vec<(RawVariant, RawVariant)>),
    Callable(Arc<CallableFn>),
}

struct Resource {
    refs: u32,
    data: ResourceData,
}

/// Callables whose last reference was dropped; freed outside the lock
type Garbage = Vec<Arc<CallableFn>>;

struct State {
    classes: HashMap<String, ClassEntry>,
    objects: HashMap<usize, ObjectRecord>,
    resources: HashMap<usize, Resource>,
    next_object: usize,
    next_resource: usize,
    emissions: Vec<Emission>,
    errors: Vec<String>,
    editor: bool,
}

impl State {
    fn new() -> Self {
        let classes = BUILTIN_CLASSES
            .iter()
            .map(|(name, parent)| {
                (
                    name.to_string(),
                    ClassEntry {
                        parent: parent.map(str::to_string),
                        extension: None,
                    },
                )
            })
            .collect();
        Self {
            classes,
            objects: HashMap::new(),
            resources: HashMap::new(),
            next_object: FIRST_OBJECT,
            next_resource: 1,
            emissions: Vec::new(),
            errors: Vec::new(),
            editor: false,
        }
    }

    fn fault(&mut self, message: String) {
        warn!(target: "ffi", "headless engine: {message}");
        self.errors.push(message);
    }

    // ------------------------------------------------------------------
    // Classes
    // ------------------------------------------------------------------

    fn is_a(&self, class: &str, ancestor: &str) -> bool {
        let mut current = Some(class);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self
                .classes
                .get(name)
                .and_then(|entry| entry.parent.as_deref());
        }
        false
    }

    fn callbacks(&self, class: &str) -> Option<Arc<dyn ClassCallbacks>> {
        self.classes
            .get(class)?
            .extension
            .as_ref()
            .map(|ext| Arc::clone(&ext.info.callbacks))
    }

    fn extension_mut(&mut self, class: &str) -> Option<&mut RegisteredClass> {
        if !self.classes.get(class).is_some_and(|e| e.extension.is_some()) {
            self.fault(format!("class `{class}` is not an extension class"));
            return None;
        }
        self.classes.get_mut(class).and_then(|e| e.extension.as_mut())
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    fn alloc_object(&mut self, class: &str) -> ObjectPtr {
        let id = self.next_object;
        self.next_object += OBJECT_STRIDE;
        self.objects.insert(
            id,
            ObjectRecord {
                class: class.to_string(),
                extension: None,
                name: class.to_string(),
                parent: None,
                children: Vec::new(),
                ready: false,
                position2d: Vec2::ZERO,
                position3d: Vec3::ZERO,
            },
        );
        ObjectPtr::from_addr(id)
    }

    fn object_class(&self, id: usize) -> Option<String> {
        let record = self.objects.get(&id)?;
        Some(record.extension.clone().unwrap_or_else(|| record.class.clone()))
    }

    fn object_callbacks(&self, id: usize) -> Option<Arc<dyn ClassCallbacks>> {
        let class = self.objects.get(&id)?.extension.as_deref()?;
        self.callbacks(class)
    }

    fn is_node(&self, id: usize) -> bool {
        self.objects
            .get(&id)
            .is_some_and(|record| self.is_a(&record.class, "Node"))
    }

    fn unique_name(&self, parent: usize, wanted: &str, exclude: usize) -> String {
        let taken = |name: &str| {
            self.objects.get(&parent).is_some_and(|record| {
                record.children.iter().any(|(child, _)| {
                    *child != exclude && self.objects.get(child).is_some_and(|c| c.name == name)
                })
            })
        };
        if !taken(wanted) {
            return wanted.to_string();
        }
        (2..)
            .map(|n| format!("{wanted}{n}"))
            .find(|name| !taken(name))
            .unwrap_or_else(|| wanted.to_string())
    }

    fn detach(&mut self, child: usize) {
        let Some(parent) = self.objects.get_mut(&child).and_then(|r| r.parent.take()) else {
            return;
        };
        if let Some(record) = self.objects.get_mut(&parent) {
            record.children.retain(|(id, _)| *id != child);
        }
    }

    fn add_child(&mut self, parent: usize, child: usize, internal: bool) {
        if !self.is_node(parent) || !self.is_node(child) {
            self.fault(format!("add_child({parent:#x}, {child:#x}): not a node"));
            return;
        }
        if parent == child {
            self.fault(format!("add_child({parent:#x}): node cannot be its own child"));
            return;
        }
        self.detach(child);
        let name = self.objects[&child].name.clone();
        let name = self.unique_name(parent, &name, child);
        if let Some(record) = self.objects.get_mut(&child) {
            record.name = name;
            record.parent = Some(parent);
        }
        if let Some(record) = self.objects.get_mut(&parent) {
            record.children.push((child, internal));
        }
    }

    fn rename(&mut self, id: usize, name: String) {
        let name = match self.objects.get(&id).and_then(|r| r.parent) {
            Some(parent) => self.unique_name(parent, &name, id),
            None => name,
        };
        match self.objects.get_mut(&id) {
            Some(record) => record.name = name,
            None => self.fault(format!("set_name on unknown object {id:#x}")),
        }
    }

    fn child_ids(&self, id: usize, include_internal: bool) -> Vec<usize> {
        self.objects
            .get(&id)
            .map(|record| {
                record
                    .children
                    .iter()
                    .filter(|(_, internal)| include_internal || !internal)
                    .map(|(child, _)| *child)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn find_child(&self, parent: usize, name: &str) -> Option<usize> {
        self.child_ids(parent, true)
            .into_iter()
            .find(|child| self.objects.get(child).is_some_and(|r| r.name == name))
    }

    fn find_path(&self, from: usize, path: &str) -> Option<usize> {
        if path.is_empty() {
            return None;
        }
        path.split('/').try_fold(from, |node, segment| match segment {
            "" | "." => Some(node),
            ".." => self.objects.get(&node)?.parent,
            name => self.find_child(node, name),
        })
    }

    /// Subtree of `root`; children before parents when `post_order`
    fn subtree(&self, root: usize, post_order: bool, out: &mut Vec<usize>) {
        if !self.objects.contains_key(&root) {
            return;
        }
        if !post_order {
            out.push(root);
        }
        for child in self.child_ids(root, true) {
            self.subtree(child, post_order, out);
        }
        if post_order {
            out.push(root);
        }
    }

    fn dump(&self, id: usize) -> Value {
        let Some(record) = self.objects.get(&id) else {
            return Value::Null;
        };
        let children: Vec<Value> = record
            .children
            .iter()
            .map(|(child, internal)| {
                let mut value = self.dump(*child);
                if *internal {
                    value["internal"] = Value::Bool(true);
                }
                value
            })
            .collect();
        json!({
            "name": record.name,
            "class": record.extension.as_deref().unwrap_or(&record.class),
            "children": children,
        })
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    fn alloc(&mut self, data: ResourceData) -> usize {
        let id = self.next_resource;
        self.next_resource += 1;
        self.resources.insert(id, Resource { refs: 1, data });
        id
    }

    /// Resource id behind a handle; signals keep theirs in the second word
    fn resource_id(kind: HandleKind, words: &[usize]) -> usize {
        match kind {
            HandleKind::Signal => words.get(1).copied().unwrap_or(0),
            _ => words.first().copied().unwrap_or(0),
        }
    }

    fn reference(&mut self, kind: HandleKind, words: &[usize]) {
        let id = Self::resource_id(kind, words);
        match self.resources.get_mut(&id) {
            Some(resource) => resource.refs += 1,
            None => self.fault(format!("reference to unknown {kind:?} handle {id:#x}")),
        }
    }

    fn release(&mut self, kind: HandleKind, words: &[usize], garbage: &mut Garbage) {
        let id = Self::resource_id(kind, words);
        let Some(resource) = self.resources.get_mut(&id) else {
            self.fault(format!("release of unknown {kind:?} handle {id:#x}"));
            return;
        };
        resource.refs -= 1;
        if resource.refs > 0 {
            return;
        }
        let Some(resource) = self.resources.remove(&id) else {
            return;
        };
        match resource.data {
            ResourceData::Array(items) => {
                for item in &items {
                    self.release_raw(item, garbage);
                }
            }
            ResourceData::Dictionary(entries) => {
                for (key, value) in &entries {
                    self.release_raw(key, garbage);
                    self.release_raw(value, garbage);
                }
            }
            ResourceData::Callable(call) => garbage.push(call),
            _ => {}
        }
    }

    fn release_raw(&mut self, raw: &RawVariant, garbage: &mut Garbage) {
        if let Some((kind, words)) = raw.payload() {
            self.release(kind, &words[..kind.words()], garbage);
        }
    }

    /// Copy a variant into engine storage: shared kinds gain a reference,
    /// unique kinds are duplicated
    fn copy_raw(&mut self, raw: &RawVariant) -> RawVariant {
        let Some((kind, words)) = raw.payload() else {
            return *raw;
        };
        if kind.ownership() != Ownership::Solo {
            self.reference(kind, &words[..kind.words()]);
            return *raw;
        }
        let data = match self.resources.get(&words[0]).map(|r| &r.data) {
            Some(ResourceData::Packed(kind, bytes)) => ResourceData::Packed(*kind, bytes.clone()),
            Some(ResourceData::Strings(items)) => ResourceData::Strings(items.clone()),
            _ => {
                self.fault(format!("copy of unknown {kind:?} handle {:#x}", words[0]));
                return RawVariant::NIL;
            }
        };
        RawVariant::from_handle(kind.variant_type(), self.alloc(data))
    }

    fn string(&mut self, handle: usize) -> String {
        match self.resources.get(&handle).map(|r| &r.data) {
            Some(ResourceData::String(text)) => text.clone(),
            _ => {
                self.fault(format!("read of unknown string handle {handle:#x}"));
                String::new()
            }
        }
    }

    fn packed_bytes(&mut self, handle: usize) -> Vec<u8> {
        match self.resources.get(&handle).map(|r| &r.data) {
            Some(ResourceData::Packed(_, bytes)) => bytes.clone(),
            _ => {
                self.fault(format!("read of unknown packed handle {handle:#x}"));
                Vec::new()
            }
        }
    }

    fn packed<T: Pod>(&mut self, handle: usize) -> Vec<T> {
        bytemuck::pod_collect_to_vec(&self.packed_bytes(handle))
    }

    /// Engine-side view of a variant, for the emission log
    fn decode(&mut self, raw: &RawVariant) -> Variant {
        let handle = raw.handle();
        match raw.variant_type() {
            VariantType::Nil => Variant::Nil,
            VariantType::Bool => Variant::Bool(raw.as_bool()),
            VariantType::Int => Variant::Int(raw.as_int()),
            VariantType::Float => Variant::Float(raw.as_float()),
            VariantType::Vector2 => Variant::Vector2(raw.as_vector2()),
            VariantType::Vector3 => Variant::Vector3(raw.as_vector3()),
            VariantType::Vector4 => Variant::Vector4(raw.as_vector4()),
            VariantType::Color => Variant::Color(raw.as_color()),
            VariantType::Object => Variant::Object(raw.as_object()),
            VariantType::String => Variant::String(self.string(handle)),
            VariantType::Array => {
                let items = match self.resources.get(&handle).map(|r| &r.data) {
                    Some(ResourceData::Array(items)) => items.clone(),
                    _ => Vec::new(),
                };
                Variant::Array(items.iter().map(|item| self.decode(item)).collect())
            }
            VariantType::Dictionary => {
                let entries = match self.resources.get(&handle).map(|r| &r.data) {
                    Some(ResourceData::Dictionary(entries)) => entries.clone(),
                    _ => Vec::new(),
                };
                Variant::Dictionary(
                    entries
                        .iter()
                        .map(|(k, v)| (self.decode(k), self.decode(v)))
                        .collect::<Dictionary>(),
                )
            }
            // The closure cannot be handed back without a host registry
            VariantType::Callable => Variant::Nil,
            VariantType::Signal => {
                let [object, name] = raw.pair();
                let name = self.string(name);
                Variant::Signal(Signal::new(ObjectPtr::from_addr(object), name))
            }
            VariantType::PackedByteArray => Variant::PackedByteArray(self.packed(handle)),
            VariantType::PackedInt32Array => Variant::PackedInt32Array(self.packed(handle)),
            VariantType::PackedInt64Array => Variant::PackedInt64Array(self.packed(handle)),
            VariantType::PackedFloat32Array => Variant::PackedFloat32Array(self.packed(handle)),
            VariantType::PackedFloat64Array => Variant::PackedFloat64Array(self.packed(handle)),
            VariantType::PackedVector2Array => Variant::PackedVector2Array(self.packed(handle)),
            VariantType::PackedVector3Array => Variant::PackedVector3Array(self.packed(handle)),
            VariantType::PackedVector4Array => {
                Variant::PackedVector4Array(self.packed::<Vec4>(handle))
            }
            VariantType::PackedColorArray => Variant::PackedColorArray(self.packed::<Color>(handle)),
            VariantType::PackedStringArray => {
                match self.resources.get(&handle).map(|r| &r.data) {
                    Some(ResourceData::Strings(items)) => Variant::PackedStringArray(items.clone()),
                    _ => Variant::PackedStringArray(Vec::new()),
                }
            }
        }
    }
}

// ============================================================================
// Built-in methods served through method binds
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Builtin {
    GetClass,
    IsClass,
    GetName,
    SetName,
    AddChild,
    GetChildCount,
    GetChild,
    GetNodeOrNull,
    GetParent,
    GetPosition2D,
    SetPosition2D,
    GetPosition3D,
    SetPosition3D,
}

/// `(declaring class, method, builtin)`
const BUILTIN_METHODS: &[(&str, &str, Builtin)] = &[
    ("Object", "get_class", Builtin::GetClass),
    ("Object", "is_class", Builtin::IsClass),
    ("Node", "get_name", Builtin::GetName),
    ("Node", "set_name", Builtin::SetName),
    ("Node", "add_child", Builtin::AddChild),
    ("Node", "get_child_count", Builtin::GetChildCount),
    ("Node", "get_child", Builtin::GetChild),
    ("Node", "get_node_or_null", Builtin::GetNodeOrNull),
    ("Node", "get_parent", Builtin::GetParent),
    ("Node2D", "get_position", Builtin::GetPosition2D),
    ("Node2D", "set_position", Builtin::SetPosition2D),
    ("Node3D", "get_position", Builtin::GetPosition3D),
    ("Node3D", "set_position", Builtin::SetPosition3D),
];

unsafe fn arg<T: Pod>(args: *const *const c_void, index: usize) -> T {
    std::ptr::read_unaligned(*args.add(index) as *const T)
}

unsafe fn put<T: Pod>(ret: *mut c_void, value: T) {
    if !ret.is_null() {
        std::ptr::write_unaligned(ret as *mut T, value);
    }
}

impl Builtin {
    unsafe fn invoke(
        self,
        state: &mut State,
        object: usize,
        args: *const *const c_void,
        ret: *mut c_void,
    ) {
        if !state.objects.contains_key(&object) {
            state.fault(format!("{self:?} called on unknown object {object:#x}"));
            return;
        }
        match self {
            Builtin::GetClass => {
                let class = state.object_class(object).unwrap_or_default();
                let handle = state.alloc(ResourceData::String(class));
                put(ret, handle);
            }
            Builtin::IsClass => {
                let name = state.string(arg(args, 0));
                let is = state
                    .object_class(object)
                    .is_some_and(|class| state.is_a(&class, &name));
                put(ret, is as u8);
            }
            Builtin::GetName => {
                let name = state.objects[&object].name.clone();
                let handle = state.alloc(ResourceData::String(name));
                put(ret, handle);
            }
            Builtin::SetName => {
                let name = state.string(arg(args, 0));
                state.rename(object, name);
            }
            Builtin::AddChild => {
                let child: ObjectPtr = arg(args, 0);
                let internal = arg::<u8>(args, 1) != 0;
                state.add_child(object, child.addr(), internal);
            }
            Builtin::GetChildCount => {
                let include_internal = arg::<u8>(args, 0) != 0;
                put(ret, state.child_ids(object, include_internal).len() as i64);
            }
            Builtin::GetChild => {
                let index: i64 = arg(args, 0);
                let include_internal = arg::<u8>(args, 1) != 0;
                let child = usize::try_from(index)
                    .ok()
                    .and_then(|i| state.child_ids(object, include_internal).get(i).copied())
                    .unwrap_or(0);
                put(ret, ObjectPtr::from_addr(child));
            }
            Builtin::GetNodeOrNull => {
                let path = state.string(arg(args, 0));
                let found = state.find_path(object, &path).unwrap_or(0);
                put(ret, ObjectPtr::from_addr(found));
            }
            Builtin::GetParent => {
                let parent = state.objects[&object].parent.unwrap_or(0);
                put(ret, ObjectPtr::from_addr(parent));
            }
            Builtin::GetPosition2D => put(ret, state.objects[&object].position2d),
            Builtin::SetPosition2D => {
                let position: Vec2 = arg(args, 0);
                if let Some(record) = state.objects.get_mut(&object) {
                    record.position2d = position;
                }
            }
            Builtin::GetPosition3D => put(ret, state.objects[&object].position3d),
            Builtin::SetPosition3D => {
                let position: Vec3 = arg(args, 0);
                if let Some(record) = state.objects.get_mut(&object) {
                    record.position3d = position;
                }
            }
        }
    }
}

/// Target of a headless method bind
struct HeadlessBind {
    state: Weak<Mutex<State>>,
    builtin: Builtin,
}

unsafe extern "C" fn headless_ptrcall(
    bind: *const c_void,
    object: *mut c_void,
    args: *const *const c_void,
    ret: *mut c_void,
) {
    let bind = &*(bind as *const HeadlessBind);
    let Some(state) = bind.state.upgrade() else {
        return;
    };
    let mut state = state.lock();
    bind.builtin.invoke(&mut state, object as usize, args, ret);
}

// ============================================================================
// Engine
// ============================================================================

/// In-process engine implementation
pub struct HeadlessEngine {
    state: Arc<Mutex<State>>,
    binds: Mutex<HashMap<(String, String), Box<HeadlessBind>>>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::new())),
            binds: Mutex::new(HashMap::new()),
        }
    }

    /// Run with editor tooling active
    pub fn set_editor(&self, editor: bool) {
        self.state.lock().editor = editor;
    }

    /// Release a raw variant the caller owns
    pub fn drop_raw(&self, raw: RawVariant) {
        let mut garbage = Garbage::new();
        self.state.lock().release_raw(&raw, &mut garbage);
        // Dropped after the lock: a callable may own host values
        drop(garbage);
    }

    // ------------------------------------------------------------------
    // Scene tree
    // ------------------------------------------------------------------

    /// Construct an object of `class` (builtin or extension)
    pub fn create(&self, class: &str) -> ObjectPtr {
        self.construct_object(class)
    }

    pub fn add_child(&self, parent: ObjectPtr, child: ObjectPtr) {
        self.state.lock().add_child(parent.addr(), child.addr(), false);
    }

    pub fn add_internal_child(&self, parent: ObjectPtr, child: ObjectPtr) {
        self.state.lock().add_child(parent.addr(), child.addr(), true);
    }

    pub fn set_name(&self, object: ObjectPtr, name: &str) {
        self.state.lock().rename(object.addr(), name.to_string());
    }

    pub fn name(&self, object: ObjectPtr) -> Option<String> {
        self.state
            .lock()
            .objects
            .get(&object.addr())
            .map(|r| r.name.clone())
    }

    /// All children, internal ones included
    pub fn children(&self, object: ObjectPtr) -> Vec<ObjectPtr> {
        self.state
            .lock()
            .child_ids(object.addr(), true)
            .into_iter()
            .map(ObjectPtr::from_addr)
            .collect()
    }

    pub fn is_internal_child(&self, parent: ObjectPtr, child: ObjectPtr) -> bool {
        self.state
            .lock()
            .objects
            .get(&parent.addr())
            .is_some_and(|r| r.children.contains(&(child.addr(), true)))
    }

    pub fn find_child(&self, parent: ObjectPtr, name: &str) -> Option<ObjectPtr> {
        self.state
            .lock()
            .find_child(parent.addr(), name)
            .map(ObjectPtr::from_addr)
    }

    pub fn parent(&self, object: ObjectPtr) -> Option<ObjectPtr> {
        self.state
            .lock()
            .objects
            .get(&object.addr())
            .and_then(|r| r.parent)
            .map(ObjectPtr::from_addr)
    }

    pub fn is_alive(&self, object: ObjectPtr) -> bool {
        self.state.lock().objects.contains_key(&object.addr())
    }

    pub fn live_objects(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// JSON snapshot of a subtree: `{name, class, children, internal?}`
    pub fn dump_tree(&self, root: ObjectPtr) -> Value {
        self.state.lock().dump(root.addr())
    }

    /// Destroy an object and its subtree
    pub fn free(&self, object: ObjectPtr) {
        self.destroy_object(object);
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    fn callbacks_for(&self, object: ObjectPtr) -> Option<Arc<dyn ClassCallbacks>> {
        self.state.lock().object_callbacks(object.addr())
    }

    /// Deliver ready to every node of the subtree, children first
    ///
    /// Nodes added while readying are readied in a following pass.
    pub fn notify_ready(&self, root: ObjectPtr) {
        loop {
            let pending = {
                let mut state = self.state.lock();
                let mut order = Vec::new();
                state.subtree(root.addr(), true, &mut order);
                order.retain(|id| state.objects.get(id).is_some_and(|r| !r.ready));
                for id in &order {
                    if let Some(record) = state.objects.get_mut(id) {
                        record.ready = true;
                    }
                }
                order
            };
            if pending.is_empty() {
                break;
            }
            for id in pending {
                if let Some(ret) = self.call_virtual(ObjectPtr::from_addr(id), "_ready", &[]) {
                    self.drop_raw(ret);
                }
            }
        }
    }

    /// Deliver one process tick to the subtree, parents first
    pub fn process(&self, root: ObjectPtr, delta: f64) {
        let order = {
            let state = self.state.lock();
            let mut order = Vec::new();
            state.subtree(root.addr(), false, &mut order);
            order
        };
        let delta = RawVariant::from_float(delta);
        for id in order {
            if let Some(ret) = self.call_virtual(ObjectPtr::from_addr(id), "_process", &[delta]) {
                self.drop_raw(ret);
            }
        }
    }

    // ------------------------------------------------------------------
    // Inbound calls (returned variants are owned by the caller)
    // ------------------------------------------------------------------

    /// Call an engine virtual on an extension instance; `None` when the
    /// class does not override it
    pub fn call_virtual(
        &self,
        object: ObjectPtr,
        name: &str,
        args: &[RawVariant],
    ) -> Option<RawVariant> {
        let callbacks = self.callbacks_for(object)?;
        let id = callbacks.get_virtual(name)?;
        Some(callbacks.call_virtual(object, id, args))
    }

    pub fn get_property(&self, object: ObjectPtr, name: &str) -> Option<RawVariant> {
        self.callbacks_for(object)?.get_property(object, name)
    }

    pub fn set_property(&self, object: ObjectPtr, name: &str, value: &RawVariant) -> bool {
        self.callbacks_for(object)
            .is_some_and(|callbacks| callbacks.set_property(object, name, value))
    }

    pub fn call_method(
        &self,
        object: ObjectPtr,
        method: &str,
        args: &[RawVariant],
    ) -> Result<RawVariant, CallError> {
        let callbacks = self
            .callbacks_for(object)
            .ok_or(CallError::NoInstance(object.addr()))?;
        callbacks.call_method(Some(object), method, args)
    }

    pub fn call_static(
        &self,
        class: &str,
        method: &str,
        args: &[RawVariant],
    ) -> Result<RawVariant, CallError> {
        let callbacks =
            self.state
                .lock()
                .callbacks(class)
                .ok_or_else(|| CallError::NoSuchMethod {
                    class: class.to_string(),
                    method: method.to_string(),
                })?;
        callbacks.call_method(None, method, args)
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn registered_class(&self, name: &str) -> Option<RegisteredClass> {
        self.state
            .lock()
            .classes
            .get(name)
            .and_then(|entry| entry.extension.clone())
    }

    pub fn registered_classes(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut names: Vec<String> = state
            .classes
            .iter()
            .filter(|(_, entry)| entry.extension.is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn emissions(&self) -> Vec<Emission> {
        self.state.lock().emissions.clone()
    }

    pub fn take_emissions(&self) -> Vec<Emission> {
        std::mem::take(&mut self.state.lock().emissions)
    }

    /// Messages from `report_error` and engine-side faults
    pub fn errors(&self) -> Vec<String> {
        self.state.lock().errors.clone()
    }

    /// Resources not yet released
    pub fn live_resources(&self) -> usize {
        self.state.lock().resources.len()
    }
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HeadlessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("HeadlessEngine")
            .field("objects", &state.objects.len())
            .field("resources", &state.resources.len())
            .field("errors", &state.errors.len())
            .finish()
    }
}

impl EngineInterface for HeadlessEngine {
    fn class_exists(&self, class: &str) -> bool {
        self.state.lock().classes.contains_key(class)
    }

    fn is_parent_class(&self, class: &str, ancestor: &str) -> bool {
        self.state.lock().is_a(class, ancestor)
    }

    fn construct_object(&self, class: &str) -> ObjectPtr {
        let callbacks = {
            let mut state = self.state.lock();
            if !state.classes.contains_key(class) {
                state.fault(format!("construct of unknown class `{class}`"));
                return ObjectPtr::NULL;
            }
            match state.callbacks(class) {
                Some(callbacks) => callbacks,
                None => return state.alloc_object(class),
            }
        };
        callbacks.create_instance()
    }

    fn destroy_object(&self, object: ObjectPtr) {
        let order = {
            let mut state = self.state.lock();
            if !state.objects.contains_key(&object.addr()) {
                state.fault(format!("destroy of unknown object {object}"));
                return;
            }
            let mut order = Vec::new();
            state.subtree(object.addr(), true, &mut order);
            order
        };
        for id in order {
            let ptr = ObjectPtr::from_addr(id);
            if let Some(callbacks) = self.callbacks_for(ptr) {
                callbacks.free_instance(ptr);
            }
            let mut state = self.state.lock();
            state.detach(id);
            state.objects.remove(&id);
        }
        debug!(target: "ffi", object = %object, "headless object destroyed");
    }

    fn object_class(&self, object: ObjectPtr) -> Option<String> {
        self.state.lock().object_class(object.addr())
    }

    fn attach_instance(&self, object: ObjectPtr, class: &str) {
        let mut state = self.state.lock();
        match state.objects.get_mut(&object.addr()) {
            Some(record) => record.extension = Some(class.to_string()),
            None => state.fault(format!("attach `{class}` to unknown object {object}")),
        }
    }

    fn method_bind(&self, class: &str, method: &str, _hash: i64) -> Option<MethodBind> {
        let builtin = {
            let state = self.state.lock();
            BUILTIN_METHODS
                .iter()
                .find(|(owner, name, _)| *name == method && state.is_a(class, owner))
                .map(|(_, _, builtin)| *builtin)?
        };
        let mut binds = self.binds.lock();
        let bind = binds
            .entry((class.to_string(), method.to_string()))
            .or_insert_with(|| {
                Box::new(HeadlessBind {
                    state: Arc::downgrade(&self.state),
                    builtin,
                })
            });
        Some(MethodBind {
            bind: &**bind as *const HeadlessBind as usize,
            call: headless_ptrcall,
        })
    }

    fn string_new(&self, text: &str) -> usize {
        self.state
            .lock()
            .alloc(ResourceData::String(text.to_string()))
    }

    fn string_read(&self, handle: usize) -> String {
        self.state.lock().string(handle)
    }

    fn packed_new(&self, kind: HandleKind, bytes: &[u8]) -> usize {
        self.state
            .lock()
            .alloc(ResourceData::Packed(kind, bytes.to_vec()))
    }

    fn packed_read(&self, _kind: HandleKind, handle: usize) -> Vec<u8> {
        self.state.lock().packed_bytes(handle)
    }

    fn packed_strings_new(&self, items: &[String]) -> usize {
        self.state.lock().alloc(ResourceData::Strings(items.to_vec()))
    }

    fn packed_strings_read(&self, handle: usize) -> Vec<String> {
        let mut state = self.state.lock();
        match state.resources.get(&handle).map(|r| &r.data) {
            Some(ResourceData::Strings(items)) => items.clone(),
            _ => {
                state.fault(format!("read of unknown string array handle {handle:#x}"));
                Vec::new()
            }
        }
    }

    fn array_new(&self, items: &[RawVariant]) -> usize {
        let mut state = self.state.lock();
        let items = items.iter().map(|item| state.copy_raw(item)).collect();
        state.alloc(ResourceData::Array(items))
    }

    fn array_read(&self, handle: usize) -> Vec<RawVariant> {
        let mut state = self.state.lock();
        match state.resources.get(&handle).map(|r| &r.data) {
            Some(ResourceData::Array(items)) => items.clone(),
            _ => {
                state.fault(format!("read of unknown array handle {handle:#x}"));
                Vec::new()
            }
        }
    }

    fn dictionary_new(&self, entries: &[(RawVariant, RawVariant)]) -> usize {
        let mut state = self.state.lock();
        let entries = entries
            .iter()
            .map(|(k, v)| (state.copy_raw(k), state.copy_raw(v)))
            .collect();
        state.alloc(ResourceData::Dictionary(entries))
    }

    fn dictionary_read(&self, handle: usize) -> Vec<(RawVariant, RawVariant)> {
        let mut state = self.state.lock();
        match state.resources.get(&handle).map(|r| &r.data) {
            Some(ResourceData::Dictionary(entries)) => entries.clone(),
            _ => {
                state.fault(format!("read of unknown dictionary handle {handle:#x}"));
                Vec::new()
            }
        }
    }

    fn callable_new(&self, call: CallableFn) -> [usize; 2] {
        let id = self
            .state
            .lock()
            .alloc(ResourceData::Callable(Arc::new(call)));
        [id, 0]
    }

    fn callable_call(&self, callable: [usize; 2], args: &[RawVariant]) -> RawVariant {
        let call = {
            let mut state = self.state.lock();
            match state.resources.get(&callable[0]).map(|r| &r.data) {
                Some(ResourceData::Callable(call)) => Arc::clone(call),
                _ => {
                    state.fault(format!("call of unknown callable {:#x}", callable[0]));
                    return RawVariant::NIL;
                }
            }
        };
        call(args)
    }

    fn reference(&self, kind: HandleKind, words: &[usize]) {
        self.state.lock().reference(kind, words);
    }

    fn release(&self, kind: HandleKind, words: &[usize]) {
        let mut garbage = Garbage::new();
        self.state.lock().release(kind, words, &mut garbage);
        drop(garbage);
    }

    fn emit_signal(&self, object: ObjectPtr, signal: &str, args: &[RawVariant]) {
        let mut state = self.state.lock();
        let args = args.iter().map(|arg| state.decode(arg)).collect();
        state.emissions.push(Emission {
            object,
            signal: signal.to_string(),
            args,
        });
    }

    fn register_class(&self, info: ClassInfo) {
        let mut state = self.state.lock();
        if state.classes.contains_key(&info.name) {
            state.fault(format!("class `{}` registered twice", info.name));
            return;
        }
        state.classes.insert(
            info.name.clone(),
            ClassEntry {
                parent: Some(info.parent.clone()),
                extension: Some(RegisteredClass::new(info)),
            },
        );
    }

    fn register_property(&self, class: &str, property: PropertyInfo) {
        if let Some(ext) = self.state.lock().extension_mut(class) {
            ext.properties.push(property);
        }
    }

    fn register_property_group(&self, class: &str, group: &str, prefix: &str) {
        if let Some(ext) = self.state.lock().extension_mut(class) {
            ext.groups.push((group.to_string(), prefix.to_string()));
        }
    }

    fn register_signal(&self, class: &str, signal: SignalInfo) {
        if let Some(ext) = self.state.lock().extension_mut(class) {
            ext.signals.push(signal);
        }
    }

    fn register_method(&self, class: &str, method: MethodInfo) {
        if let Some(ext) = self.state.lock().extension_mut(class) {
            ext.methods.push(method);
        }
    }

    fn register_constant(&self, class: &str, name: &str, value: i64) {
        if let Some(ext) = self.state.lock().extension_mut(class) {
            ext.constants.push((name.to_string(), value));
        }
    }

    fn unregister_class(&self, class: &str) {
        let removed = {
            let mut state = self.state.lock();
            match state.classes.get(class).map(|e| e.extension.is_some()) {
                Some(true) => state.classes.remove(class),
                _ => {
                    state.fault(format!("unregister of unknown class `{class}`"));
                    None
                }
            }
        };
        drop(removed);
    }

    fn is_editor(&self) -> bool {
        self.state.lock().editor
    }

    fn report_error(&self, message: &str) {
        self.state.lock().errors.push(message.to_string());
    }
}

//! C ABI adapter
//!
//! Design: The engine hands the extension one `#[repr(C)]` table of function
//! pointers, [`ExtensionInterface`]. [`FfiEngine`] implements
//! [`EngineInterface`] on top of it, so the rest of the crate never touches a
//! raw pointer. Inbound calls come back through [`ClassCreationInfo`], whose
//! `extern "C"` trampolines recover the class's [`ClassCallbacks`] from the
//! userdata pointer.
//!
//! Panics never cross the boundary: every trampoline runs under
//! [`ffi_guard`], which logs the panic and aborts.
//!
//! Strings cross as [`StrView`] (borrowed, not NUL-terminated). Resource
//! handles cross as words; `tag` arguments are variant type tags.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

use super::{
    CallableFn, ClassCallbacks, ClassInfo, EngineInterface, MethodBind, MethodInfo, ObjectPtr,
    PropertyHint, PropertyInfo, PtrCallFn, SignalInfo, VirtualId,
};
use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::error::CallError;
use crate::handle::HandleKind;
use crate::logging::{error, info, init_logging};
use crate::register::InitLevel;
use crate::variant::{RawVariant, VariantType};

/// Borrowed UTF-8 text
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct StrView {
    pub ptr: *const u8,
    pub len: usize,
}

impl StrView {
    pub const EMPTY: StrView = StrView {
        ptr: std::ptr::null(),
        len: 0,
    };

    pub fn new(text: &str) -> Self {
        Self {
            ptr: text.as_ptr(),
            len: text.len(),
        }
    }

    fn from_option(text: Option<&String>) -> Self {
        text.map_or(Self::EMPTY, |text| Self::new(text))
    }

    /// # Safety
    /// `ptr` must be null or valid for `len` bytes for the returned lifetime.
    pub unsafe fn to_str<'a>(self) -> Cow<'a, str> {
        if self.ptr.is_null() || self.len == 0 {
            return Cow::Borrowed("");
        }
        String::from_utf8_lossy(std::slice::from_raw_parts(self.ptr, self.len))
    }
}

/// Callable body: `(userdata, args, argc, ret)`
pub type CallableCallFn = unsafe extern "C" fn(
    userdata: *mut c_void,
    args: *const RawVariant,
    argc: usize,
    ret: *mut RawVariant,
);

pub type CallableFreeFn = unsafe extern "C" fn(userdata: *mut c_void);

/// Function table the engine passes to [`init`]
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ExtensionInterface {
    pub class_exists: unsafe extern "C" fn(class: StrView) -> u8,
    pub is_parent_class: unsafe extern "C" fn(class: StrView, ancestor: StrView) -> u8,
    pub construct_object: unsafe extern "C" fn(class: StrView) -> *mut c_void,
    pub destroy_object: unsafe extern "C" fn(object: *mut c_void),
    /// Owned string handle, 0 when the object is unknown
    pub object_class: unsafe extern "C" fn(object: *mut c_void) -> usize,
    pub attach_instance: unsafe extern "C" fn(object: *mut c_void, class: StrView),
    /// Null when the method does not exist
    pub method_bind: unsafe extern "C" fn(class: StrView, method: StrView, hash: i64) -> *const c_void,
    pub ptrcall: PtrCallFn,

    pub string_new: unsafe extern "C" fn(text: StrView) -> usize,
    pub string_len: unsafe extern "C" fn(handle: usize) -> usize,
    /// Copy up to `cap` bytes; returns the number written
    pub string_copy: unsafe extern "C" fn(handle: usize, out: *mut u8, cap: usize) -> usize,

    pub packed_new: unsafe extern "C" fn(tag: u32, bytes: *const u8, len: usize) -> usize,
    /// Size in bytes
    pub packed_size: unsafe extern "C" fn(tag: u32, handle: usize) -> usize,
    pub packed_copy: unsafe extern "C" fn(tag: u32, handle: usize, out: *mut u8, cap: usize) -> usize,
    pub packed_strings_new: unsafe extern "C" fn(items: *const StrView, len: usize) -> usize,
    pub packed_strings_len: unsafe extern "C" fn(handle: usize) -> usize,
    /// Owned string handle for element `index`
    pub packed_strings_get: unsafe extern "C" fn(handle: usize, index: usize) -> usize,

    pub array_new: unsafe extern "C" fn(items: *const RawVariant, len: usize) -> usize,
    pub array_len: unsafe extern "C" fn(handle: usize) -> usize,
    /// Borrowed element
    pub array_get: unsafe extern "C" fn(handle: usize, index: usize) -> RawVariant,
    pub dictionary_new: unsafe extern "C" fn(
        keys: *const RawVariant,
        values: *const RawVariant,
        len: usize,
    ) -> usize,
    pub dictionary_len: unsafe extern "C" fn(handle: usize) -> usize,
    /// Borrowed entry `index`, in insertion order
    pub dictionary_get: unsafe extern "C" fn(
        handle: usize,
        index: usize,
        key: *mut RawVariant,
        value: *mut RawVariant,
    ),

    pub callable_new: unsafe extern "C" fn(
        userdata: *mut c_void,
        call: CallableCallFn,
        free: CallableFreeFn,
        out: *mut usize,
    ),
    pub callable_call: unsafe extern "C" fn(
        callable: *const usize,
        args: *const RawVariant,
        argc: usize,
    ) -> RawVariant,
    pub reference: unsafe extern "C" fn(tag: u32, words: *const usize, len: usize),
    pub release: unsafe extern "C" fn(tag: u32, words: *const usize, len: usize),

    pub emit_signal: unsafe extern "C" fn(
        object: *mut c_void,
        signal: StrView,
        args: *const RawVariant,
        argc: usize,
    ),

    pub register_class: unsafe extern "C" fn(info: *const ClassCreationInfo),
    pub register_property: unsafe extern "C" fn(class: StrView, info: *const PropertyDesc),
    pub register_property_group: unsafe extern "C" fn(class: StrView, group: StrView, prefix: StrView),
    pub register_signal: unsafe extern "C" fn(class: StrView, info: *const SignalDesc),
    pub register_method: unsafe extern "C" fn(class: StrView, info: *const MethodDesc),
    pub register_constant: unsafe extern "C" fn(class: StrView, name: StrView, value: i64),
    pub unregister_class: unsafe extern "C" fn(class: StrView),

    pub is_editor: unsafe extern "C" fn() -> u8,
    pub report_error: unsafe extern "C" fn(message: StrView),
}

#[repr(C)]
pub struct PropertyDesc {
    pub name: StrView,
    pub variant_type: u32,
    /// 0 = none, 1 = range
    pub hint: u32,
    pub hint_string: StrView,
    pub usage: u32,
    pub doc: StrView,
}

#[repr(C)]
pub struct MethodDesc {
    pub name: StrView,
    pub params: *const u32,
    pub param_count: usize,
    pub ret: u32,
    pub flags: u32,
    pub doc: StrView,
}

#[repr(C)]
pub struct SignalDesc {
    pub name: StrView,
    pub params: *const u32,
    pub param_count: usize,
    pub doc: StrView,
}

/// Result of an inbound method call
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallStatus {
    pub code: u32,
    /// Argument index for `INVALID_ARGUMENT`
    pub argument: u32,
    /// Expected count for `ARG_COUNT`
    pub expected: u32,
}

impl CallStatus {
    pub const OK: u32 = 0;
    pub const INVALID_METHOD: u32 = 1;
    pub const INVALID_ARGUMENT: u32 = 2;
    pub const ARG_COUNT: u32 = 3;
    pub const NO_INSTANCE: u32 = 4;

    pub fn from_error(err: &CallError) -> Self {
        match err {
            CallError::NoSuchMethod { .. } | CallError::NotStatic { .. } => Self {
                code: Self::INVALID_METHOD,
                ..Self::default()
            },
            CallError::InvalidArgument { index, .. } => Self {
                code: Self::INVALID_ARGUMENT,
                argument: *index as u32,
                expected: 0,
            },
            CallError::ArgCountMismatch { expected, .. } => Self {
                code: Self::ARG_COUNT,
                argument: 0,
                expected: *expected as u32,
            },
            CallError::NoInstance(_) => Self {
                code: Self::NO_INSTANCE,
                ..Self::default()
            },
        }
    }
}

/// Returned by `get_virtual` for names the class does not override
pub const NO_VIRTUAL: u32 = u32::MAX;

/// Class descriptor passed to `register_class`; `userdata` comes back as the
/// first argument of every callback
#[repr(C)]
pub struct ClassCreationInfo {
    pub name: StrView,
    pub parent: StrView,
    pub tool: u8,
    pub doc: StrView,
    pub userdata: *mut c_void,
    pub create: unsafe extern "C" fn(userdata: *mut c_void) -> *mut c_void,
    pub free: unsafe extern "C" fn(userdata: *mut c_void, object: *mut c_void),
    pub get_virtual: unsafe extern "C" fn(userdata: *mut c_void, name: StrView) -> u32,
    pub call_virtual: unsafe extern "C" fn(
        userdata: *mut c_void,
        object: *mut c_void,
        id: u32,
        args: *const RawVariant,
        argc: usize,
        ret: *mut RawVariant,
    ),
    pub get_property: unsafe extern "C" fn(
        userdata: *mut c_void,
        object: *mut c_void,
        name: StrView,
        ret: *mut RawVariant,
    ) -> u8,
    pub set_property: unsafe extern "C" fn(
        userdata: *mut c_void,
        object: *mut c_void,
        name: StrView,
        value: *const RawVariant,
    ) -> u8,
    /// `object` is null for static methods
    pub call_method: unsafe extern "C" fn(
        userdata: *mut c_void,
        object: *mut c_void,
        method: StrView,
        args: *const RawVariant,
        argc: usize,
        ret: *mut RawVariant,
        status: *mut CallStatus,
    ),
}

/// Engine lifecycle hooks, filled in by [`init`]
#[repr(C)]
pub struct InitializationInfo {
    pub minimum_level: u32,
    pub initialize: Option<unsafe extern "C" fn(level: u32)>,
    pub deinitialize: Option<unsafe extern "C" fn(level: u32)>,
}

type Callbacks = Arc<dyn ClassCallbacks>;

/// [`EngineInterface`] over the engine's function table
pub struct FfiEngine {
    table: ExtensionInterface,
    /// Userdata boxes handed out at class registration, by class name
    classes: Mutex<HashMap<String, Box<Callbacks>>>,
}

impl FfiEngine {
    pub fn new(table: ExtensionInterface) -> Self {
        Self {
            table,
            classes: Mutex::new(HashMap::new()),
        }
    }

    fn tag(kind: HandleKind) -> u32 {
        kind.variant_type().tag()
    }

    fn read_string(&self, handle: usize) -> String {
        // SAFETY: the table functions are valid for the bridge's lifetime and
        // `buf` has room for `len` bytes.
        unsafe {
            let len = (self.table.string_len)(handle);
            let mut buf = vec![0u8; len];
            let written = (self.table.string_copy)(handle, buf.as_mut_ptr(), len);
            buf.truncate(written);
            String::from_utf8_lossy(&buf).into_owned()
        }
    }
}

unsafe fn slice<'a, T>(ptr: *const T, len: usize) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len)
    }
}

fn type_tags(types: &[VariantType]) -> Vec<u32> {
    types.iter().map(|ty| ty.tag()).collect()
}

// SAFETY (whole impl): every table entry is a valid engine function for the
// lifetime of the process, and every pointer passed in outlives the call.
impl EngineInterface for FfiEngine {
    fn class_exists(&self, class: &str) -> bool {
        unsafe { (self.table.class_exists)(StrView::new(class)) != 0 }
    }

    fn is_parent_class(&self, class: &str, ancestor: &str) -> bool {
        unsafe { (self.table.is_parent_class)(StrView::new(class), StrView::new(ancestor)) != 0 }
    }

    fn construct_object(&self, class: &str) -> ObjectPtr {
        ObjectPtr::from_mut_ptr(unsafe { (self.table.construct_object)(StrView::new(class)) })
    }

    fn destroy_object(&self, object: ObjectPtr) {
        unsafe { (self.table.destroy_object)(object.as_mut_ptr()) }
    }

    fn object_class(&self, object: ObjectPtr) -> Option<String> {
        let handle = unsafe { (self.table.object_class)(object.as_mut_ptr()) };
        if handle == 0 {
            return None;
        }
        let name = self.read_string(handle);
        self.release(HandleKind::String, &[handle]);
        Some(name)
    }

    fn attach_instance(&self, object: ObjectPtr, class: &str) {
        unsafe { (self.table.attach_instance)(object.as_mut_ptr(), StrView::new(class)) }
    }

    fn method_bind(&self, class: &str, method: &str, hash: i64) -> Option<MethodBind> {
        let bind =
            unsafe { (self.table.method_bind)(StrView::new(class), StrView::new(method), hash) };
        (!bind.is_null()).then(|| MethodBind {
            bind: bind as usize,
            call: self.table.ptrcall,
        })
    }

    fn string_new(&self, text: &str) -> usize {
        unsafe { (self.table.string_new)(StrView::new(text)) }
    }

    fn string_read(&self, handle: usize) -> String {
        self.read_string(handle)
    }

    fn packed_new(&self, kind: HandleKind, bytes: &[u8]) -> usize {
        unsafe { (self.table.packed_new)(Self::tag(kind), bytes.as_ptr(), bytes.len()) }
    }

    fn packed_read(&self, kind: HandleKind, handle: usize) -> Vec<u8> {
        let tag = Self::tag(kind);
        unsafe {
            let size = (self.table.packed_size)(tag, handle);
            let mut buf = vec![0u8; size];
            let written = (self.table.packed_copy)(tag, handle, buf.as_mut_ptr(), size);
            buf.truncate(written);
            buf
        }
    }

    fn packed_strings_new(&self, items: &[String]) -> usize {
        let views: Vec<StrView> = items.iter().map(|item| StrView::new(item)).collect();
        unsafe { (self.table.packed_strings_new)(views.as_ptr(), views.len()) }
    }

    fn packed_strings_read(&self, handle: usize) -> Vec<String> {
        let len = unsafe { (self.table.packed_strings_len)(handle) };
        (0..len)
            .map(|index| {
                let item = unsafe { (self.table.packed_strings_get)(handle, index) };
                let text = self.read_string(item);
                self.release(HandleKind::String, &[item]);
                text
            })
            .collect()
    }

    fn array_new(&self, items: &[RawVariant]) -> usize {
        unsafe { (self.table.array_new)(items.as_ptr(), items.len()) }
    }

    fn array_read(&self, handle: usize) -> Vec<RawVariant> {
        let len = unsafe { (self.table.array_len)(handle) };
        (0..len)
            .map(|index| unsafe { (self.table.array_get)(handle, index) })
            .collect()
    }

    fn dictionary_new(&self, entries: &[(RawVariant, RawVariant)]) -> usize {
        let (keys, values): (Vec<RawVariant>, Vec<RawVariant>) = entries.iter().copied().unzip();
        unsafe { (self.table.dictionary_new)(keys.as_ptr(), values.as_ptr(), entries.len()) }
    }

    fn dictionary_read(&self, handle: usize) -> Vec<(RawVariant, RawVariant)> {
        let len = unsafe { (self.table.dictionary_len)(handle) };
        (0..len)
            .map(|index| {
                let mut key = RawVariant::NIL;
                let mut value = RawVariant::NIL;
                unsafe { (self.table.dictionary_get)(handle, index, &mut key, &mut value) };
                (key, value)
            })
            .collect()
    }

    fn callable_new(&self, call: CallableFn) -> [usize; 2] {
        let userdata = Box::into_raw(Box::new(call)) as *mut c_void;
        let mut out = [0usize; 2];
        unsafe {
            (self.table.callable_new)(userdata, callable_call, callable_free, out.as_mut_ptr())
        };
        out
    }

    fn callable_call(&self, callable: [usize; 2], args: &[RawVariant]) -> RawVariant {
        unsafe { (self.table.callable_call)(callable.as_ptr(), args.as_ptr(), args.len()) }
    }

    fn reference(&self, kind: HandleKind, words: &[usize]) {
        unsafe { (self.table.reference)(Self::tag(kind), words.as_ptr(), words.len()) }
    }

    fn release(&self, kind: HandleKind, words: &[usize]) {
        unsafe { (self.table.release)(Self::tag(kind), words.as_ptr(), words.len()) }
    }

    fn emit_signal(&self, object: ObjectPtr, signal: &str, args: &[RawVariant]) {
        unsafe {
            (self.table.emit_signal)(
                object.as_mut_ptr(),
                StrView::new(signal),
                args.as_ptr(),
                args.len(),
            )
        }
    }

    fn register_class(&self, info: ClassInfo) {
        let boxed: Box<Callbacks> = Box::new(info.callbacks);
        let userdata = &*boxed as *const Callbacks as *mut c_void;
        // The box's heap slot stays put when the map reallocates
        self.classes.lock().insert(info.name.clone(), boxed);

        let creation = ClassCreationInfo {
            name: StrView::new(&info.name),
            parent: StrView::new(&info.parent),
            tool: info.tool as u8,
            doc: StrView::from_option(info.doc.as_ref()),
            userdata,
            create: class_create,
            free: class_free,
            get_virtual: class_get_virtual,
            call_virtual: class_call_virtual,
            get_property: class_get_property,
            set_property: class_set_property,
            call_method: class_call_method,
        };
        unsafe { (self.table.register_class)(&creation) }
    }

    fn register_property(&self, class: &str, property: PropertyInfo) {
        let hint_string = property.hint.hint_string();
        let desc = PropertyDesc {
            name: StrView::new(&property.name),
            variant_type: property.variant_type.tag(),
            hint: match property.hint {
                PropertyHint::None => 0,
                PropertyHint::Range { .. } => 1,
            },
            hint_string: StrView::new(&hint_string),
            usage: property.usage.bits(),
            doc: StrView::from_option(property.doc.as_ref()),
        };
        unsafe { (self.table.register_property)(StrView::new(class), &desc) }
    }

    fn register_property_group(&self, class: &str, group: &str, prefix: &str) {
        unsafe {
            (self.table.register_property_group)(
                StrView::new(class),
                StrView::new(group),
                StrView::new(prefix),
            )
        }
    }

    fn register_signal(&self, class: &str, signal: SignalInfo) {
        let params = type_tags(&signal.params);
        let desc = SignalDesc {
            name: StrView::new(&signal.name),
            params: params.as_ptr(),
            param_count: params.len(),
            doc: StrView::from_option(signal.doc.as_ref()),
        };
        unsafe { (self.table.register_signal)(StrView::new(class), &desc) }
    }

    fn register_method(&self, class: &str, method: MethodInfo) {
        let params = type_tags(&method.params);
        let desc = MethodDesc {
            name: StrView::new(&method.name),
            params: params.as_ptr(),
            param_count: params.len(),
            ret: method.ret.tag(),
            flags: method.flags.bits(),
            doc: StrView::from_option(method.doc.as_ref()),
        };
        unsafe { (self.table.register_method)(StrView::new(class), &desc) }
    }

    fn register_constant(&self, class: &str, name: &str, value: i64) {
        unsafe { (self.table.register_constant)(StrView::new(class), StrView::new(name), value) }
    }

    fn unregister_class(&self, class: &str) {
        unsafe { (self.table.unregister_class)(StrView::new(class)) };
        self.classes.lock().remove(class);
    }

    fn is_editor(&self) -> bool {
        unsafe { (self.table.is_editor)() != 0 }
    }

    fn report_error(&self, message: &str) {
        unsafe { (self.table.report_error)(StrView::new(message)) }
    }
}

// ============================================================================
// Inbound trampolines
// ============================================================================

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run `f`, aborting the process if it panics
pub fn ffi_guard<R>(callback: &'static str, f: impl FnOnce() -> R) -> R {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(target: "ffi", callback, %message, "panic in engine callback");
            std::process::abort();
        }
    }
}

/// # Safety
/// `userdata` must come from [`FfiEngine::register_class`] and the class
/// must still be registered.
unsafe fn callbacks<'a>(userdata: *mut c_void) -> &'a Callbacks {
    &*(userdata as *const Callbacks)
}

unsafe extern "C" fn class_create(userdata: *mut c_void) -> *mut c_void {
    ffi_guard("create", || callbacks(userdata).create_instance().as_mut_ptr())
}

unsafe extern "C" fn class_free(userdata: *mut c_void, object: *mut c_void) {
    ffi_guard("free", || {
        callbacks(userdata).free_instance(ObjectPtr::from_mut_ptr(object))
    })
}

unsafe extern "C" fn class_get_virtual(userdata: *mut c_void, name: StrView) -> u32 {
    ffi_guard("get_virtual", || {
        callbacks(userdata)
            .get_virtual(&name.to_str())
            .map_or(NO_VIRTUAL, |id| id.0)
    })
}

unsafe extern "C" fn class_call_virtual(
    userdata: *mut c_void,
    object: *mut c_void,
    id: u32,
    args: *const RawVariant,
    argc: usize,
    ret: *mut RawVariant,
) {
    ffi_guard("call_virtual", || {
        let result = callbacks(userdata).call_virtual(
            ObjectPtr::from_mut_ptr(object),
            VirtualId(id),
            slice(args, argc),
        );
        if !ret.is_null() {
            *ret = result;
        }
    })
}

unsafe extern "C" fn class_get_property(
    userdata: *mut c_void,
    object: *mut c_void,
    name: StrView,
    ret: *mut RawVariant,
) -> u8 {
    ffi_guard("get_property", || {
        match callbacks(userdata).get_property(ObjectPtr::from_mut_ptr(object), &name.to_str()) {
            Some(value) if !ret.is_null() => {
                *ret = value;
                1
            }
            _ => 0,
        }
    })
}

unsafe extern "C" fn class_set_property(
    userdata: *mut c_void,
    object: *mut c_void,
    name: StrView,
    value: *const RawVariant,
) -> u8 {
    ffi_guard("set_property", || {
        if value.is_null() {
            return 0;
        }
        callbacks(userdata).set_property(ObjectPtr::from_mut_ptr(object), &name.to_str(), &*value)
            as u8
    })
}

unsafe extern "C" fn class_call_method(
    userdata: *mut c_void,
    object: *mut c_void,
    method: StrView,
    args: *const RawVariant,
    argc: usize,
    ret: *mut RawVariant,
    status: *mut CallStatus,
) {
    ffi_guard("call_method", || {
        let object = (!object.is_null()).then(|| ObjectPtr::from_mut_ptr(object));
        let result = callbacks(userdata).call_method(object, &method.to_str(), slice(args, argc));
        let outcome = match result {
            Ok(value) => {
                if !ret.is_null() {
                    *ret = value;
                }
                CallStatus::default()
            }
            Err(err) => CallStatus::from_error(&err),
        };
        if !status.is_null() {
            *status = outcome;
        }
    })
}

unsafe extern "C" fn callable_call(
    userdata: *mut c_void,
    args: *const RawVariant,
    argc: usize,
    ret: *mut RawVariant,
) {
    ffi_guard("callable", || {
        let call = &*(userdata as *const CallableFn);
        let result = call(slice(args, argc));
        if !ret.is_null() {
            *ret = result;
        }
    })
}

unsafe extern "C" fn callable_free(userdata: *mut c_void) {
    ffi_guard("callable_free", || {
        drop(Box::from_raw(userdata as *mut CallableFn));
    })
}

// ============================================================================
// Entry point
// ============================================================================

static BRIDGE: OnceCell<Arc<Bridge>> = OnceCell::new();
static LOG_GUARD: Mutex<Option<WorkerGuard>> = parking_lot::const_mutex(None);

/// The process-wide bridge, once [`init`] has run
pub fn bridge() -> Option<&'static Arc<Bridge>> {
    BRIDGE.get()
}

/// Extension entry point; see [`crate::export_extension!`]
///
/// Returns 1 on success, 0 when the engine passed null tables.
///
/// # Safety
/// `interface` must point at a fully populated table whose functions stay
/// valid for the life of the process; `init` must be writable.
pub unsafe fn init(
    interface: *const ExtensionInterface,
    init: *mut InitializationInfo,
    registrar: fn(&Bridge),
) -> u8 {
    if interface.is_null() || init.is_null() {
        return 0;
    }
    let table = *interface;
    ffi_guard("init", || {
        let config = BridgeConfig::from_env();
        if let Some(guard) = init_logging(config.log_config()) {
            *LOG_GUARD.lock() = Some(guard);
        }
        let mut fresh = false;
        let bridge = BRIDGE.get_or_init(|| {
            fresh = true;
            Bridge::new(Arc::new(FfiEngine::new(table)), config)
        });
        if fresh {
            registrar(bridge);
        }
        info!(target: "ffi", extension = %bridge.config().extension, "extension loaded");

        *init = InitializationInfo {
            minimum_level: InitLevel::Core.as_u32(),
            initialize: Some(initialize_level),
            deinitialize: Some(deinitialize_level),
        };
        1
    })
}

unsafe extern "C" fn initialize_level(level: u32) {
    ffi_guard("initialize", || {
        if let (Some(bridge), Some(level)) = (BRIDGE.get(), InitLevel::from_u32(level)) {
            bridge.initialize(level);
        }
    })
}

unsafe extern "C" fn deinitialize_level(level: u32) {
    ffi_guard("deinitialize", || {
        let level = InitLevel::from_u32(level);
        if let (Some(bridge), Some(level)) = (BRIDGE.get(), level) {
            bridge.deinitialize(level);
        }
        if level == Some(InitLevel::Core) {
            // Flush buffered log lines before the library is unloaded
            LOG_GUARD.lock().take();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder;

    impl ClassCallbacks for Recorder {
        fn create_instance(&self) -> ObjectPtr {
            ObjectPtr::from_addr(0x40)
        }

        fn free_instance(&self, _object: ObjectPtr) {}

        fn get_virtual(&self, name: &str) -> Option<VirtualId> {
            (name == "_ready").then_some(VirtualId(3))
        }

        fn call_virtual(&self, object: ObjectPtr, id: VirtualId, args: &[RawVariant]) -> RawVariant {
            RawVariant::from_int(object.addr() as i64 + id.0 as i64 + args.len() as i64)
        }

        fn get_property(&self, _object: ObjectPtr, name: &str) -> Option<RawVariant> {
            (name == "speed").then(|| RawVariant::from_float(2.5))
        }

        fn set_property(&self, _object: ObjectPtr, name: &str, _value: &RawVariant) -> bool {
            name == "speed"
        }

        fn call_method(
            &self,
            object: Option<ObjectPtr>,
            method: &str,
            args: &[RawVariant],
        ) -> Result<RawVariant, CallError> {
            match (object, method) {
                (None, "Twice") => Ok(RawVariant::from_int(2 * args.len() as i64)),
                (Some(_), _) => Err(CallError::ArgCountMismatch {
                    method: method.to_string(),
                    expected: 2,
                    got: args.len(),
                }),
                (None, _) => Err(CallError::NoSuchMethod {
                    class: "Recorder".to_string(),
                    method: method.to_string(),
                }),
            }
        }
    }

    fn userdata(callbacks: &Callbacks) -> *mut c_void {
        callbacks as *const Callbacks as *mut c_void
    }

    #[test]
    fn test_str_view() {
        let text = String::from("Player");
        let view = StrView::new(&text);
        assert_eq!(unsafe { view.to_str() }, "Player");
        assert_eq!(unsafe { StrView::EMPTY.to_str() }, "");
    }

    #[test]
    fn test_call_status_codes() {
        let status = CallStatus::from_error(&CallError::InvalidArgument {
            method: "Jump".to_string(),
            index: 1,
            source: crate::error::ConvertError::NullObject,
        });
        assert_eq!(status.code, CallStatus::INVALID_ARGUMENT);
        assert_eq!(status.argument, 1);

        let status = CallStatus::from_error(&CallError::NoInstance(0x10));
        assert_eq!(status.code, CallStatus::NO_INSTANCE);
    }

    #[test]
    fn test_trampolines_route_to_callbacks() {
        let callbacks: Callbacks = Arc::new(Recorder);
        let data = userdata(&callbacks);
        unsafe {
            assert_eq!(class_create(data) as usize, 0x40);
            assert_eq!(class_get_virtual(data, StrView::new("_ready")), 3);
            assert_eq!(class_get_virtual(data, StrView::new("_process")), NO_VIRTUAL);

            let args = [RawVariant::from_bool(true)];
            let mut ret = RawVariant::NIL;
            class_call_virtual(data, 0x40 as *mut c_void, 3, args.as_ptr(), 1, &mut ret);
            assert_eq!(ret, RawVariant::from_int(0x40 + 3 + 1));

            let mut ret = RawVariant::NIL;
            assert_eq!(class_get_property(data, 0x40 as *mut c_void, StrView::new("speed"), &mut ret), 1);
            assert_eq!(ret, RawVariant::from_float(2.5));
            assert_eq!(
                class_set_property(data, 0x40 as *mut c_void, StrView::new("hp"), &ret),
                0
            );
        }
    }

    #[test]
    fn test_static_call_status() {
        let callbacks: Callbacks = Arc::new(Recorder);
        let data = userdata(&callbacks);
        let args = [RawVariant::NIL, RawVariant::NIL];
        let mut ret = RawVariant::NIL;
        let mut status = CallStatus::default();
        unsafe {
            class_call_method(
                data,
                std::ptr::null_mut(),
                StrView::new("Twice"),
                args.as_ptr(),
                2,
                &mut ret,
                &mut status,
            );
        }
        assert_eq!(status.code, CallStatus::OK);
        assert_eq!(ret, RawVariant::from_int(4));

        unsafe {
            class_call_method(
                data,
                0x40 as *mut c_void,
                StrView::new("Jump"),
                args.as_ptr(),
                1,
                &mut ret,
                &mut status,
            );
        }
        assert_eq!(status.code, CallStatus::ARG_COUNT);
        assert_eq!(status.expected, 2);
    }

    #[test]
    fn test_callable_trampoline() {
        let call: CallableFn = Box::new(|args: &[RawVariant]| RawVariant::from_int(args.len() as i64));
        let data = Box::into_raw(Box::new(call)) as *mut c_void;
        let args = [RawVariant::NIL; 3];
        let mut ret = RawVariant::NIL;
        unsafe {
            callable_call(data, args.as_ptr(), args.len(), &mut ret);
            callable_free(data);
        }
        assert_eq!(ret, RawVariant::from_int(3));
    }
}

//! Host-side variant representation

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::engine::ObjectPtr;
use crate::handle::{HandleRegistry, Pair};

/// Runtime tag of a variant; discriminants match the engine ABI
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariantType {
    #[default]
    Nil = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    String = 4,
    Vector2 = 5,
    Vector3 = 9,
    Vector4 = 12,
    Color = 20,
    Object = 24,
    Callable = 25,
    Signal = 26,
    Dictionary = 27,
    Array = 28,
    PackedByteArray = 29,
    PackedInt32Array = 30,
    PackedInt64Array = 31,
    PackedFloat32Array = 32,
    PackedFloat64Array = 33,
    PackedStringArray = 34,
    PackedVector2Array = 35,
    PackedVector3Array = 36,
    PackedColorArray = 37,
    PackedVector4Array = 38,
}

impl VariantType {
    pub(crate) const ALL: [VariantType; 24] = [
        VariantType::Nil,
        VariantType::Bool,
        VariantType::Int,
        VariantType::Float,
        VariantType::String,
        VariantType::Vector2,
        VariantType::Vector3,
        VariantType::Vector4,
        VariantType::Color,
        VariantType::Object,
        VariantType::Callable,
        VariantType::Signal,
        VariantType::Dictionary,
        VariantType::Array,
        VariantType::PackedByteArray,
        VariantType::PackedInt32Array,
        VariantType::PackedInt64Array,
        VariantType::PackedFloat32Array,
        VariantType::PackedFloat64Array,
        VariantType::PackedStringArray,
        VariantType::PackedVector2Array,
        VariantType::PackedVector3Array,
        VariantType::PackedColorArray,
        VariantType::PackedVector4Array,
    ];

    #[inline]
    pub const fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.tag() == tag)
    }

    pub const fn name(self) -> &'static str {
        use VariantType::*;
        match self {
            Nil => "Nil",
            Bool => "bool",
            Int => "int",
            Float => "float",
            String => "String",
            Vector2 => "Vector2",
            Vector3 => "Vector3",
            Vector4 => "Vector4",
            Color => "Color",
            Object => "Object",
            Callable => "Callable",
            Signal => "Signal",
            Dictionary => "Dictionary",
            Array => "Array",
            PackedByteArray => "PackedByteArray",
            PackedInt32Array => "PackedInt32Array",
            PackedInt64Array => "PackedInt64Array",
            PackedFloat32Array => "PackedFloat32Array",
            PackedFloat64Array => "PackedFloat64Array",
            PackedStringArray => "PackedStringArray",
            PackedVector2Array => "PackedVector2Array",
            PackedVector3Array => "PackedVector3Array",
            PackedColorArray => "PackedColorArray",
            PackedVector4Array => "PackedVector4Array",
        }
    }

    /// Name of the host type a value of this kind converts to by default
    pub const fn host_type_name(self) -> &'static str {
        use VariantType::*;
        match self {
            Nil => "()",
            Bool => "bool",
            Int => "i64",
            Float => "f64",
            String => "String",
            Vector2 => "Vec2",
            Vector3 => "Vec3",
            Vector4 => "Vec4",
            Color => "Color",
            Object => "ObjectPtr",
            Callable => "Callable",
            Signal => "Signal",
            Dictionary => "Dictionary",
            Array => "Vec<Variant>",
            PackedByteArray => "Vec<u8>",
            PackedInt32Array => "Vec<i32>",
            PackedInt64Array => "Vec<i64>",
            PackedFloat32Array => "Vec<f32>",
            PackedFloat64Array => "Vec<f64>",
            PackedStringArray => "Vec<String>",
            PackedVector2Array => "Vec<Vec2>",
            PackedVector3Array => "Vec<Vec3>",
            PackedColorArray => "Vec<Color>",
            PackedVector4Array => "Vec<Vec4>",
        }
    }

    pub const fn is_packed(self) -> bool {
        self.tag() >= VariantType::PackedByteArray.tag()
    }

    /// `Nil` in a signature means "any variant"
    #[inline]
    pub const fn is_any(self) -> bool {
        matches!(self, VariantType::Nil)
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// RGBA color, 32-bit float channels
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }
}

/// Insertion-ordered key/value container
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dictionary {
    entries: Vec<(Variant, Variant)>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the previous value
    pub fn insert(&mut self, key: impl Into<Variant>, value: impl Into<Variant>) -> Option<Variant> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &Variant) -> Option<&Variant> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Lookup by string key
    pub fn get_str(&self, key: &str) -> Option<&Variant> {
        self.entries
            .iter()
            .find(|(k, _)| matches!(k, Variant::String(s) if s == key))
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &Variant) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variant, &Variant)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Variant> {
        self.entries.iter().map(|(k, _)| k)
    }
}

impl FromIterator<(Variant, Variant)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (Variant, Variant)>>(iter: I) -> Self {
        let mut dict = Dictionary::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

impl IntoIterator for Dictionary {
    type Item = (Variant, Variant);
    type IntoIter = std::vec::IntoIter<(Variant, Variant)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Host function exposed as a callable
pub type HostFn = dyn Fn(&[Variant]) -> Variant + Send + Sync;

/// Callable value: a host closure, or a live engine callable
#[derive(Clone)]
pub enum Callable {
    /// Not yet handed to the engine
    Host(Arc<HostFn>),
    /// Engine callable; the pair is released when the last clone drops
    Engine(Arc<Pair>),
}

impl Callable {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[Variant]) -> Variant + Send + Sync + 'static,
    {
        Callable::Host(Arc::new(f))
    }

    /// Invoke synchronously
    pub fn call(&self, args: &[Variant]) -> Variant {
        match self {
            Callable::Host(f) => f(args),
            Callable::Engine(pair) => {
                let registry = pair.registry();
                let owned: Vec<_> = args.iter().map(|a| a.to_raw(registry)).collect();
                let raws: Vec<_> = owned.iter().map(|t| *t.get()).collect();
                let result = registry.engine().callable_call(pair.get(), &raws);
                let result = registry.pin_trio(result);
                Variant::from_raw(result.get(), registry)
            }
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Callable::Host(a), Callable::Host(b)) => Arc::ptr_eq(a, b),
            (Callable::Engine(a), Callable::Engine(b)) => a.get() == b.get(),
            _ => false,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Host(_) => f.write_str("Callable::Host(..)"),
            Callable::Engine(pair) => write!(f, "Callable::Engine({pair:?})"),
        }
    }
}

/// Signal on an engine object
#[derive(Clone)]
pub struct Signal {
    object: ObjectPtr,
    name: String,
    registry: Option<HandleRegistry>,
}

impl Signal {
    /// Unbound signal value (marshalling only)
    pub fn new(object: ObjectPtr, name: impl Into<String>) -> Self {
        Self {
            object,
            name: name.into(),
            registry: None,
        }
    }

    /// Signal that can emit through `registry`'s engine
    pub fn bound(object: ObjectPtr, name: impl Into<String>, registry: HandleRegistry) -> Self {
        Self {
            object,
            name: name.into(),
            registry: Some(registry),
        }
    }

    #[inline]
    pub fn object(&self) -> ObjectPtr {
        self.object
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_bound(&self) -> bool {
        self.registry.is_some() && !self.object.is_null()
    }

    /// Emit with already-converted arguments
    pub fn emit_variants(&self, args: &[Variant]) {
        let Some(registry) = &self.registry else {
            crate::logging::warn!(target: "signals", signal = %self.name, "emit on unbound signal ignored");
            return;
        };
        let owned: Vec<_> = args.iter().map(|a| a.to_raw(registry)).collect();
        let raws: Vec<_> = owned.iter().map(|t| *t.get()).collect();
        registry.engine().emit_signal(self.object, &self.name, &raws);
    }

    /// Emit a typed argument tuple
    pub fn emit<A: crate::register::SignalArgs>(&self, args: A) {
        self.emit_variants(&args.into_variants());
    }
}

impl Default for Signal {
    fn default() -> Self {
        Signal::new(ObjectPtr::NULL, String::new())
    }
}

impl PartialEq for Signal {
    fn eq(&self, other: &Self) -> bool {
        self.object == other.object && self.name == other.name
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("object", &self.object)
            .field("name", &self.name)
            .field("bound", &self.registry.is_some())
            .finish()
    }
}

/// Dynamically typed engine value
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Variant {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Vector2(Vec2),
    Vector3(Vec3),
    Vector4(Vec4),
    Color(Color),
    Object(ObjectPtr),
    Callable(Callable),
    Signal(Signal),
    Dictionary(Dictionary),
    Array(Vec<Variant>),
    PackedByteArray(Vec<u8>),
    PackedInt32Array(Vec<i32>),
    PackedInt64Array(Vec<i64>),
    PackedFloat32Array(Vec<f32>),
    PackedFloat64Array(Vec<f64>),
    PackedStringArray(Vec<String>),
    PackedVector2Array(Vec<Vec2>),
    PackedVector3Array(Vec<Vec3>),
    PackedVector4Array(Vec<Vec4>),
    PackedColorArray(Vec<Color>),
}

impl Variant {
    pub fn get_type(&self) -> VariantType {
        match self {
            Variant::Nil => VariantType::Nil,
            Variant::Bool(_) => VariantType::Bool,
            Variant::Int(_) => VariantType::Int,
            Variant::Float(_) => VariantType::Float,
            Variant::String(_) => VariantType::String,
            Variant::Vector2(_) => VariantType::Vector2,
            Variant::Vector3(_) => VariantType::Vector3,
            Variant::Vector4(_) => VariantType::Vector4,
            Variant::Color(_) => VariantType::Color,
            Variant::Object(_) => VariantType::Object,
            Variant::Callable(_) => VariantType::Callable,
            Variant::Signal(_) => VariantType::Signal,
            Variant::Dictionary(_) => VariantType::Dictionary,
            Variant::Array(_) => VariantType::Array,
            Variant::PackedByteArray(_) => VariantType::PackedByteArray,
            Variant::PackedInt32Array(_) => VariantType::PackedInt32Array,
            Variant::PackedInt64Array(_) => VariantType::PackedInt64Array,
            Variant::PackedFloat32Array(_) => VariantType::PackedFloat32Array,
            Variant::PackedFloat64Array(_) => VariantType::PackedFloat64Array,
            Variant::PackedStringArray(_) => VariantType::PackedStringArray,
            Variant::PackedVector2Array(_) => VariantType::PackedVector2Array,
            Variant::PackedVector3Array(_) => VariantType::PackedVector3Array,
            Variant::PackedVector4Array(_) => VariantType::PackedVector4Array,
            Variant::PackedColorArray(_) => VariantType::PackedColorArray,
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Variant::Nil)
    }

    /// Convert into the most convenient host type for its runtime tag
    ///
    /// nil -> `()`, int -> `i64`, float -> `f64`, object -> [`ObjectPtr`],
    /// array -> `Vec<Variant>`, packed kinds -> `Vec<element>`.
    pub fn into_host(self) -> Box<dyn Any + Send + Sync> {
        match self {
            Variant::Nil => Box::new(()),
            Variant::Bool(v) => Box::new(v),
            Variant::Int(v) => Box::new(v),
            Variant::Float(v) => Box::new(v),
            Variant::String(v) => Box::new(v),
            Variant::Vector2(v) => Box::new(v),
            Variant::Vector3(v) => Box::new(v),
            Variant::Vector4(v) => Box::new(v),
            Variant::Color(v) => Box::new(v),
            Variant::Object(v) => Box::new(v),
            Variant::Callable(v) => Box::new(v),
            Variant::Signal(v) => Box::new(v),
            Variant::Dictionary(v) => Box::new(v),
            Variant::Array(v) => Box::new(v),
            Variant::PackedByteArray(v) => Box::new(v),
            Variant::PackedInt32Array(v) => Box::new(v),
            Variant::PackedInt64Array(v) => Box::new(v),
            Variant::PackedFloat32Array(v) => Box::new(v),
            Variant::PackedFloat64Array(v) => Box::new(v),
            Variant::PackedStringArray(v) => Box::new(v),
            Variant::PackedVector2Array(v) => Box::new(v),
            Variant::PackedVector3Array(v) => Box::new(v),
            Variant::PackedVector4Array(v) => Box::new(v),
            Variant::PackedColorArray(v) => Box::new(v),
        }
    }
}

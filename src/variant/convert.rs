//! Static conversions between host types and [`Variant`]
//!
//! `ToVariant`/`FromVariant` are the compile-time path used by registered
//! methods, properties and signals. `VariantTyped` supplies the static kind
//! for class metadata. Slices pick a packed kind through [`VariantElement`]
//! and fall back to a generic array for everything else.
//!
//! Engine class wrappers and `Instance<T>` decode against the bridge entered
//! on the current thread (see [`Bridge::enter`]); encoding only needs the
//! object pointer.

use glam::{Vec2, Vec3, Vec4};
use num_traits::NumCast;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

use super::types::{Callable, Color, Dictionary, Signal, Variant, VariantType};
use crate::bridge::Bridge;
use crate::classes::{
    EditorPlugin, EngineClass, Node, Node2D, Node3D, Object, RawObject, RefCounted, Resource,
    Script, ScriptLanguage,
};
use crate::engine::ObjectPtr;
use crate::error::ConvertError;
use crate::object::Instance;
use crate::register::ExtensionClass;

/// Host value that can be expressed as a variant
pub trait ToVariant {
    fn to_variant(&self) -> Variant;
}

/// Host value that can be recovered from a variant
pub trait FromVariant: Sized {
    fn from_variant(variant: &Variant) -> Result<Self, ConvertError>;
}

/// Static variant kind of a host type; `Nil` stands for "any"
pub trait VariantTyped {
    const VARIANT_TYPE: VariantType;
}

/// Element type of a host slice
pub trait VariantElement: Sized {
    /// Kind a `Vec<Self>` marshals to
    const ARRAY_TYPE: VariantType;

    fn pack(items: &[Self]) -> Variant;

    fn unpack(variant: &Variant) -> Result<Vec<Self>, ConvertError>;
}

#[inline]
fn mismatch(expected: VariantType, found: &Variant) -> ConvertError {
    ConvertError::TypeMismatch {
        expected,
        found: found.get_type(),
    }
}

// ============================================================================
// Identity and unit
// ============================================================================

impl ToVariant for Variant {
    fn to_variant(&self) -> Variant {
        self.clone()
    }
}

impl FromVariant for Variant {
    fn from_variant(variant: &Variant) -> Result<Self, ConvertError> {
        Ok(variant.clone())
    }
}

impl VariantTyped for Variant {
    const VARIANT_TYPE: VariantType = VariantType::Nil;
}

impl ToVariant for () {
    fn to_variant(&self) -> Variant {
        Variant::Nil
    }
}

impl FromVariant for () {
    fn from_variant(_: &Variant) -> Result<Self, ConvertError> {
        Ok(())
    }
}

impl VariantTyped for () {
    const VARIANT_TYPE: VariantType = VariantType::Nil;
}

// ============================================================================
// Scalars
// ============================================================================

impl ToVariant for bool {
    fn to_variant(&self) -> Variant {
        Variant::Bool(*self)
    }
}

impl FromVariant for bool {
    fn from_variant(variant: &Variant) -> Result<Self, ConvertError> {
        match variant {
            Variant::Bool(b) => Ok(*b),
            other => Err(mismatch(VariantType::Bool, other)),
        }
    }
}

impl VariantTyped for bool {
    const VARIANT_TYPE: VariantType = VariantType::Bool;
}

fn int_from_variant<T: NumCast>(variant: &Variant, target: &'static str) -> Result<T, ConvertError> {
    match variant {
        Variant::Int(i) => <T as NumCast>::from(*i).ok_or_else(|| ConvertError::OutOfRange {
            value: i.to_string(),
            target,
        }),
        other => Err(mismatch(VariantType::Int, other)),
    }
}

macro_rules! impl_int {
    ($($t:ty),* $(,)?) => {$(
        impl FromVariant for $t {
            fn from_variant(variant: &Variant) -> Result<Self, ConvertError> {
                int_from_variant(variant, stringify!($t))
            }
        }

        impl VariantTyped for $t {
            const VARIANT_TYPE: VariantType = VariantType::Int;
        }
    )*};
}

impl_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! impl_int_to_variant {
    ($($t:ty),* $(,)?) => {$(
        impl ToVariant for $t {
            fn to_variant(&self) -> Variant {
                Variant::Int(<i64 as From<$t>>::from(*self))
            }
        }

        impl From<$t> for Variant {
            fn from(value: $t) -> Self {
                Variant::Int(<i64 as From<$t>>::from(value))
            }
        }
    )*};
}

impl_int_to_variant!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! impl_float {
    ($($t:ty),* $(,)?) => {$(
        impl ToVariant for $t {
            fn to_variant(&self) -> Variant {
                Variant::Float(<f64 as From<$t>>::from(*self))
            }
        }

        impl From<$t> for Variant {
            fn from(value: $t) -> Self {
                Variant::Float(<f64 as From<$t>>::from(value))
            }
        }

        impl FromVariant for $t {
            fn from_variant(variant: &Variant) -> Result<Self, ConvertError> {
                let wide = match variant {
                    Variant::Float(f) => *f,
                    // Integers widen to floats, matching the engine's implicit cast
                    Variant::Int(i) => *i as f64,
                    other => return Err(mismatch(VariantType::Float, other)),
                };
                <$t as NumCast>::from(wide).ok_or_else(|| ConvertError::OutOfRange {
                    value: wide.to_string(),
                    target: stringify!($t),
                })
            }
        }

        impl VariantTyped for $t {
            const VARIANT_TYPE: VariantType = VariantType::Float;
        }
    )*};
}

impl_float!(f32, f64);

// ============================================================================
// Strings
// ============================================================================

impl ToVariant for String {
    fn to_variant(&self) -> Variant {
        Variant::String(self.clone())
    }
}

impl ToVariant for str {
    fn to_variant(&self) -> Variant {
        Variant::String(self.to_owned())
    }
}

impl ToVariant for &str {
    fn to_variant(&self) -> Variant {
        Variant::String((*self).to_owned())
    }
}

impl FromVariant for String {
    fn from_variant(variant: &Variant) -> Result<Self, ConvertError> {
        match variant {
            Variant::String(s) => Ok(s.clone()),
            other => Err(mismatch(VariantType::String, other)),
        }
    }
}

impl VariantTyped for String {
    const VARIANT_TYPE: VariantType = VariantType::String;
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_owned())
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

// ============================================================================
// Plain-data kinds: math types, object handles, containers
// ============================================================================

macro_rules! impl_plain {
    ($($t:ty => $kind:ident),* $(,)?) => {$(
        impl ToVariant for $t {
            fn to_variant(&self) -> Variant {
                Variant::$kind(self.clone())
            }
        }

        impl FromVariant for $t {
            fn from_variant(variant: &Variant) -> Result<Self, ConvertError> {
                match variant {
                    Variant::$kind(v) => Ok(v.clone()),
                    other => Err(mismatch(VariantType::$kind, other)),
                }
            }
        }

        impl VariantTyped for $t {
            const VARIANT_TYPE: VariantType = VariantType::$kind;
        }

        impl From<$t> for Variant {
            fn from(value: $t) -> Self {
                Variant::$kind(value)
            }
        }
    )*};
}

impl_plain!(
    Vec2 => Vector2,
    Vec3 => Vector3,
    Vec4 => Vector4,
    Color => Color,
    Dictionary => Dictionary,
    Callable => Callable,
    Signal => Signal,
);

impl ToVariant for ObjectPtr {
    fn to_variant(&self) -> Variant {
        Variant::Object(*self)
    }
}

impl FromVariant for ObjectPtr {
    fn from_variant(variant: &Variant) -> Result<Self, ConvertError> {
        match variant {
            Variant::Object(ptr) => Ok(*ptr),
            Variant::Nil => Ok(ObjectPtr::NULL),
            other => Err(mismatch(VariantType::Object, other)),
        }
    }
}

impl VariantTyped for ObjectPtr {
    const VARIANT_TYPE: VariantType = VariantType::Object;
}

impl From<ObjectPtr> for Variant {
    fn from(value: ObjectPtr) -> Self {
        Variant::Object(value)
    }
}

// ============================================================================
// Engine objects and extension instances
// ============================================================================

/// Object behind `variant`, checked to be a `class` or a subclass of it
fn live_object(variant: &Variant, class: &str) -> Result<(Arc<Bridge>, ObjectPtr), ConvertError> {
    let object = match variant {
        Variant::Object(object) if !object.is_null() => *object,
        Variant::Object(_) | Variant::Nil => return Err(ConvertError::NullObject),
        other => return Err(mismatch(VariantType::Object, other)),
    };
    let bridge = Bridge::current().ok_or(ConvertError::NoBridge)?;
    let engine = bridge.engine();
    let Some(found) = engine.object_class(object) else {
        return Err(ConvertError::UnknownObject(object.addr()));
    };
    if !engine.is_parent_class(&found, class) {
        return Err(ConvertError::ClassMismatch {
            expected: class.to_string(),
            found,
        });
    }
    Ok((bridge, object))
}

macro_rules! impl_engine_object {
    ($($t:ident),* $(,)?) => {$(
        impl ToVariant for $t {
            fn to_variant(&self) -> Variant {
                Variant::Object(self.object())
            }
        }

        impl FromVariant for $t {
            fn from_variant(variant: &Variant) -> Result<Self, ConvertError> {
                let (bridge, object) = live_object(variant, <$t as EngineClass>::NAME)?;
                Ok(<$t as EngineClass>::from_raw(RawObject::new(object, bridge)))
            }
        }

        impl VariantTyped for $t {
            const VARIANT_TYPE: VariantType = VariantType::Object;
        }

        impl From<$t> for Variant {
            fn from(value: $t) -> Self {
                Variant::Object(value.object())
            }
        }
    )*};
}

impl_engine_object!(
    Object,
    RefCounted,
    Resource,
    Node,
    Node2D,
    Node3D,
    EditorPlugin,
    Script,
    ScriptLanguage,
);

impl<T: ExtensionClass> ToVariant for Instance<T> {
    fn to_variant(&self) -> Variant {
        Variant::Object(self.object())
    }
}

impl<T: ExtensionClass> FromVariant for Instance<T> {
    fn from_variant(variant: &Variant) -> Result<Self, ConvertError> {
        let (bridge, object) = live_object(variant, &T::class_name())?;
        bridge
            .instance::<T>(object)
            .ok_or(ConvertError::UnknownObject(object.addr()))
    }
}

impl<T: ExtensionClass> VariantTyped for Instance<T> {
    const VARIANT_TYPE: VariantType = VariantType::Object;
}

impl From<Vec<Variant>> for Variant {
    fn from(value: Vec<Variant>) -> Self {
        Variant::Array(value)
    }
}

// ============================================================================
// Options
// ============================================================================

impl<T: ToVariant> ToVariant for Option<T> {
    fn to_variant(&self) -> Variant {
        match self {
            Some(value) => value.to_variant(),
            None => Variant::Nil,
        }
    }
}

impl<T: FromVariant> FromVariant for Option<T> {
    fn from_variant(variant: &Variant) -> Result<Self, ConvertError> {
        match variant {
            Variant::Nil => Ok(None),
            other => T::from_variant(other).map(Some),
        }
    }
}

impl<T: VariantTyped> VariantTyped for Option<T> {
    const VARIANT_TYPE: VariantType = T::VARIANT_TYPE;
}

// ============================================================================
// Slices
// ============================================================================

macro_rules! impl_packed_element {
    ($($t:ty => $kind:ident),* $(,)?) => {$(
        impl VariantElement for $t {
            const ARRAY_TYPE: VariantType = VariantType::$kind;

            fn pack(items: &[Self]) -> Variant {
                Variant::$kind(items.to_vec())
            }

            fn unpack(variant: &Variant) -> Result<Vec<Self>, ConvertError> {
                match variant {
                    Variant::$kind(items) => Ok(items.clone()),
                    Variant::Array(items) => items.iter().map(<$t>::from_variant).collect(),
                    other => Err(mismatch(VariantType::$kind, other)),
                }
            }
        }
    )*};
}

impl_packed_element!(
    u8 => PackedByteArray,
    i32 => PackedInt32Array,
    i64 => PackedInt64Array,
    f32 => PackedFloat32Array,
    f64 => PackedFloat64Array,
    String => PackedStringArray,
    Vec2 => PackedVector2Array,
    Vec3 => PackedVector3Array,
    Vec4 => PackedVector4Array,
    Color => PackedColorArray,
);

macro_rules! impl_array_element {
    ($($t:ty),* $(,)?) => {$(
        impl VariantElement for $t {
            const ARRAY_TYPE: VariantType = VariantType::Array;

            fn pack(items: &[Self]) -> Variant {
                Variant::Array(items.iter().map(ToVariant::to_variant).collect())
            }

            fn unpack(variant: &Variant) -> Result<Vec<Self>, ConvertError> {
                match variant {
                    Variant::Array(items) => items.iter().map(<$t>::from_variant).collect(),
                    other => Err(mismatch(VariantType::Array, other)),
                }
            }
        }
    )*};
}

impl_array_element!(
    Variant, bool, i8, i16, u16, u32, ObjectPtr, Dictionary, Callable, Signal, Object,
    RefCounted, Resource, Node, Node2D, Node3D, EditorPlugin, Script, ScriptLanguage
);

impl<T: VariantElement> VariantElement for Vec<T> {
    const ARRAY_TYPE: VariantType = VariantType::Array;

    fn pack(items: &[Self]) -> Variant {
        Variant::Array(items.iter().map(|inner| T::pack(inner)).collect())
    }

    fn unpack(variant: &Variant) -> Result<Vec<Self>, ConvertError> {
        match variant {
            Variant::Array(items) => items.iter().map(T::unpack).collect(),
            other => Err(mismatch(VariantType::Array, other)),
        }
    }
}

impl<T: VariantElement> ToVariant for Vec<T> {
    fn to_variant(&self) -> Variant {
        T::pack(self)
    }
}

impl<T: VariantElement> ToVariant for [T] {
    fn to_variant(&self) -> Variant {
        T::pack(self)
    }
}

impl<T: VariantElement> FromVariant for Vec<T> {
    fn from_variant(variant: &Variant) -> Result<Self, ConvertError> {
        T::unpack(variant)
    }
}

impl<T: VariantElement> VariantTyped for Vec<T> {
    const VARIANT_TYPE: VariantType = T::ARRAY_TYPE;
}

// ============================================================================
// Maps
// ============================================================================

impl<K: ToVariant, V: ToVariant, S> ToVariant for HashMap<K, V, S> {
    fn to_variant(&self) -> Variant {
        Variant::Dictionary(
            self.iter()
                .map(|(k, v)| (k.to_variant(), v.to_variant()))
                .collect(),
        )
    }
}

impl<K, V, S> FromVariant for HashMap<K, V, S>
where
    K: FromVariant + Eq + Hash,
    V: FromVariant,
    S: std::hash::BuildHasher + Default,
{
    fn from_variant(variant: &Variant) -> Result<Self, ConvertError> {
        match variant {
            Variant::Dictionary(dict) => dict
                .iter()
                .map(|(k, v)| Ok((K::from_variant(k)?, V::from_variant(v)?)))
                .collect(),
            other => Err(mismatch(VariantType::Dictionary, other)),
        }
    }
}

impl<K, V, S> VariantTyped for HashMap<K, V, S> {
    const VARIANT_TYPE: VariantType = VariantType::Dictionary;
}

impl<K: ToVariant, V: ToVariant> ToVariant for BTreeMap<K, V> {
    fn to_variant(&self) -> Variant {
        Variant::Dictionary(
            self.iter()
                .map(|(k, v)| (k.to_variant(), v.to_variant()))
                .collect(),
        )
    }
}

impl<K: FromVariant + Ord, V: FromVariant> FromVariant for BTreeMap<K, V> {
    fn from_variant(variant: &Variant) -> Result<Self, ConvertError> {
        match variant {
            Variant::Dictionary(dict) => dict
                .iter()
                .map(|(k, v)| Ok((K::from_variant(k)?, V::from_variant(v)?)))
                .collect(),
            other => Err(mismatch(VariantType::Dictionary, other)),
        }
    }
}

impl<K, V> VariantTyped for BTreeMap<K, V> {
    const VARIANT_TYPE: VariantType = VariantType::Dictionary;
}

//! Marshalling between [`Variant`] and [`RawVariant`]
//!
//! Outbound values allocate engine resources through the handle registry and
//! come back as an owned [`Trio`]. Inbound values are only peeked: the engine
//! keeps ownership of whatever the raw variant points at.

use glam::{Vec2, Vec3, Vec4};
use std::sync::Arc;

use super::raw::RawVariant;
use super::types::{Callable, Color, Dictionary, Signal, Variant, VariantType};
use crate::handle::{HandleKind, HandleRegistry, Trio};

impl Variant {
    /// Encode for the engine; the returned [`Trio`] owns any allocated handle
    pub fn to_raw(&self, registry: &HandleRegistry) -> Trio {
        registry.pin_trio(self.encode(registry))
    }

    /// Encode and hand ownership to the engine
    pub fn into_engine(&self, registry: &HandleRegistry) -> RawVariant {
        self.to_raw(registry).into_raw()
    }

    /// Build a raw variant whose payload handle (if any) is untracked
    fn encode(&self, registry: &HandleRegistry) -> RawVariant {
        match self {
            Variant::Nil => RawVariant::NIL,
            Variant::Bool(v) => RawVariant::from_bool(*v),
            Variant::Int(v) => RawVariant::from_int(*v),
            Variant::Float(v) => RawVariant::from_float(*v),
            Variant::Vector2(v) => RawVariant::from_vector2(*v),
            Variant::Vector3(v) => RawVariant::from_vector3(*v),
            Variant::Vector4(v) => RawVariant::from_vector4(*v),
            Variant::Color(v) => RawVariant::from_color(*v),
            Variant::Object(v) => RawVariant::from_object(*v),
            Variant::String(s) => {
                RawVariant::from_handle(VariantType::String, registry.string(s).into_raw())
            }
            Variant::Array(items) => {
                let owned: Vec<Trio> = items.iter().map(|item| item.to_raw(registry)).collect();
                let raws: Vec<RawVariant> = owned.iter().map(|t| *t.get()).collect();
                RawVariant::from_handle(VariantType::Array, registry.array(&raws).into_raw())
            }
            Variant::Dictionary(dict) => {
                let owned: Vec<(Trio, Trio)> = dict
                    .iter()
                    .map(|(k, v)| (k.to_raw(registry), v.to_raw(registry)))
                    .collect();
                let raws: Vec<(RawVariant, RawVariant)> =
                    owned.iter().map(|(k, v)| (*k.get(), *v.get())).collect();
                RawVariant::from_handle(
                    VariantType::Dictionary,
                    registry.dictionary(&raws).into_raw(),
                )
            }
            Variant::Callable(callable) => encode_callable(callable, registry),
            Variant::Signal(signal) => RawVariant::from_pair(
                VariantType::Signal,
                registry.signal(signal.object(), signal.name()).into_raw(),
            ),
            Variant::PackedByteArray(v) => packed(registry, HandleKind::PackedByteArray, v),
            Variant::PackedInt32Array(v) => packed(registry, HandleKind::PackedInt32Array, v),
            Variant::PackedInt64Array(v) => packed(registry, HandleKind::PackedInt64Array, v),
            Variant::PackedFloat32Array(v) => packed(registry, HandleKind::PackedFloat32Array, v),
            Variant::PackedFloat64Array(v) => packed(registry, HandleKind::PackedFloat64Array, v),
            Variant::PackedVector2Array(v) => packed(registry, HandleKind::PackedVector2Array, v),
            Variant::PackedVector3Array(v) => packed(registry, HandleKind::PackedVector3Array, v),
            Variant::PackedVector4Array(v) => packed(registry, HandleKind::PackedVector4Array, v),
            Variant::PackedColorArray(v) => packed(registry, HandleKind::PackedColorArray, v),
            Variant::PackedStringArray(v) => RawVariant::from_handle(
                VariantType::PackedStringArray,
                registry.packed_strings(v).into_raw(),
            ),
        }
    }

    /// Decode a borrowed raw variant into an owned host value
    pub fn from_raw(raw: &RawVariant, registry: &HandleRegistry) -> Variant {
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
            VariantType::String => Variant::String(registry.read_string(raw.handle())),
            VariantType::Array => Variant::Array(
                registry
                    .read_array(raw.handle())
                    .iter()
                    .map(|item| Variant::from_raw(item, registry))
                    .collect(),
            ),
            VariantType::Dictionary => Variant::Dictionary(
                registry
                    .read_dictionary(raw.handle())
                    .iter()
                    .map(|(k, v)| (Variant::from_raw(k, registry), Variant::from_raw(v, registry)))
                    .collect::<Dictionary>(),
            ),
            VariantType::Callable => {
                // Keep the callable alive for as long as the host value lives
                let words = raw.pair();
                registry.engine().reference(HandleKind::Callable, &words);
                let pair = registry.pin_pair(HandleKind::Callable, words);
                Variant::Callable(Callable::Engine(Arc::new(pair)))
            }
            VariantType::Signal => {
                let [object, name] = raw.pair();
                Variant::Signal(Signal::bound(
                    crate::engine::ObjectPtr::from_addr(object),
                    registry.read_string(name),
                    registry.clone(),
                ))
            }
            VariantType::PackedByteArray => Variant::PackedByteArray(
                registry.read_packed::<u8>(HandleKind::PackedByteArray, raw.handle()),
            ),
            VariantType::PackedInt32Array => Variant::PackedInt32Array(
                registry.read_packed::<i32>(HandleKind::PackedInt32Array, raw.handle()),
            ),
            VariantType::PackedInt64Array => Variant::PackedInt64Array(
                registry.read_packed::<i64>(HandleKind::PackedInt64Array, raw.handle()),
            ),
            VariantType::PackedFloat32Array => Variant::PackedFloat32Array(
                registry.read_packed::<f32>(HandleKind::PackedFloat32Array, raw.handle()),
            ),
            VariantType::PackedFloat64Array => Variant::PackedFloat64Array(
                registry.read_packed::<f64>(HandleKind::PackedFloat64Array, raw.handle()),
            ),
            VariantType::PackedStringArray => {
                Variant::PackedStringArray(registry.read_packed_strings(raw.handle()))
            }
            VariantType::PackedVector2Array => Variant::PackedVector2Array(
                registry.read_packed::<Vec2>(HandleKind::PackedVector2Array, raw.handle()),
            ),
            VariantType::PackedVector3Array => Variant::PackedVector3Array(
                registry.read_packed::<Vec3>(HandleKind::PackedVector3Array, raw.handle()),
            ),
            VariantType::PackedVector4Array => Variant::PackedVector4Array(
                registry.read_packed::<Vec4>(HandleKind::PackedVector4Array, raw.handle()),
            ),
            VariantType::PackedColorArray => Variant::PackedColorArray(
                registry.read_packed::<Color>(HandleKind::PackedColorArray, raw.handle()),
            ),
        }
    }

    /// Decode a raw variant the engine transferred to the host, releasing it
    pub fn from_owned_raw(raw: RawVariant, registry: &HandleRegistry) -> Variant {
        let owned = registry.pin_trio(raw);
        Variant::from_raw(owned.get(), registry)
    }
}

fn packed<T: bytemuck::Pod>(registry: &HandleRegistry, kind: HandleKind, items: &[T]) -> RawVariant {
    RawVariant::from_handle(kind.variant_type(), registry.packed(kind, items).into_raw())
}

fn encode_callable(callable: &Callable, registry: &HandleRegistry) -> RawVariant {
    match callable {
        Callable::Host(f) => {
            let f = Arc::clone(f);
            let inner = registry.clone();
            let pair = registry.callable(Box::new(move |args: &[RawVariant]| {
                let args: Vec<Variant> = args
                    .iter()
                    .map(|arg| Variant::from_raw(arg, &inner))
                    .collect();
                f(&args).into_engine(&inner)
            }));
            RawVariant::from_pair(VariantType::Callable, pair.into_raw())
        }
        Callable::Engine(pair) => {
            let words = pair.get();
            registry.engine().reference(HandleKind::Callable, &words);
            RawVariant::from_pair(VariantType::Callable, words)
        }
    }
}

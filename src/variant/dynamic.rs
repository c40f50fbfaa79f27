//! Shape inspection: any `Serialize` value to a [`Variant`]
//!
//! Used where no static conversion exists. The serializer follows the shape of
//! the value: sequences whose elements all share one packable kind become the
//! matching packed array, known math structs become vectors and colors, and
//! any other struct becomes a dictionary keyed by field name.

use serde::ser::{self, Serialize};

use super::types::{Color, Dictionary, Variant};
use crate::error::ConvertError;
use glam::{Vec2, Vec3, Vec4};

/// Convert by inspecting the value's shape
pub fn to_variant_dynamic<T: Serialize + ?Sized>(value: &T) -> Result<Variant, ConvertError> {
    value.serialize(ShapeSerializer).map(|shaped| shaped.value)
}

/// Which packed element kind a value could join
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Hint {
    Byte,
    Int32,
    Int64,
    Float32,
    Float64,
    Str,
    Vector2,
    Vector3,
    Vector4,
    Color,
    Other,
}

struct Shaped {
    value: Variant,
    hint: Hint,
}

impl Shaped {
    fn new(value: Variant, hint: Hint) -> Self {
        Self { value, hint }
    }

    fn other(value: Variant) -> Self {
        Self::new(value, Hint::Other)
    }
}

struct ShapeSerializer;

impl ser::Serializer for ShapeSerializer {
    type Ok = Shaped;
    type Error = ConvertError;
    type SerializeSeq = SeqShape;
    type SerializeTuple = SeqShape;
    type SerializeTupleStruct = TupleStructShape;
    type SerializeTupleVariant = TupleVariantShape;
    type SerializeMap = MapShape;
    type SerializeStruct = StructShape;
    type SerializeStructVariant = StructVariantShape;

    fn serialize_bool(self, v: bool) -> Result<Shaped, ConvertError> {
        Ok(Shaped::other(Variant::Bool(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<Shaped, ConvertError> {
        Ok(Shaped::other(Variant::Int(v.into())))
    }

    fn serialize_i16(self, v: i16) -> Result<Shaped, ConvertError> {
        Ok(Shaped::other(Variant::Int(v.into())))
    }

    fn serialize_i32(self, v: i32) -> Result<Shaped, ConvertError> {
        Ok(Shaped::new(Variant::Int(v.into()), Hint::Int32))
    }

    fn serialize_i64(self, v: i64) -> Result<Shaped, ConvertError> {
        Ok(Shaped::new(Variant::Int(v), Hint::Int64))
    }

    fn serialize_u8(self, v: u8) -> Result<Shaped, ConvertError> {
        Ok(Shaped::new(Variant::Int(v.into()), Hint::Byte))
    }

    fn serialize_u16(self, v: u16) -> Result<Shaped, ConvertError> {
        Ok(Shaped::other(Variant::Int(v.into())))
    }

    fn serialize_u32(self, v: u32) -> Result<Shaped, ConvertError> {
        Ok(Shaped::other(Variant::Int(v.into())))
    }

    fn serialize_u64(self, v: u64) -> Result<Shaped, ConvertError> {
        i64::try_from(v)
            .map(|i| Shaped::new(Variant::Int(i), Hint::Int64))
            .map_err(|_| ConvertError::OutOfRange {
                value: v.to_string(),
                target: "i64",
            })
    }

    fn serialize_f32(self, v: f32) -> Result<Shaped, ConvertError> {
        Ok(Shaped::new(Variant::Float(v.into()), Hint::Float32))
    }

    fn serialize_f64(self, v: f64) -> Result<Shaped, ConvertError> {
        Ok(Shaped::new(Variant::Float(v), Hint::Float64))
    }

    fn serialize_char(self, v: char) -> Result<Shaped, ConvertError> {
        Ok(Shaped::other(Variant::String(v.to_string())))
    }

    fn serialize_str(self, v: &str) -> Result<Shaped, ConvertError> {
        Ok(Shaped::new(Variant::String(v.to_owned()), Hint::Str))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Shaped, ConvertError> {
        Ok(Shaped::other(Variant::PackedByteArray(v.to_vec())))
    }

    fn serialize_none(self) -> Result<Shaped, ConvertError> {
        Ok(Shaped::other(Variant::Nil))
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Shaped, ConvertError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Shaped, ConvertError> {
        Ok(Shaped::other(Variant::Nil))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Shaped, ConvertError> {
        Ok(Shaped::other(Variant::Nil))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Shaped, ConvertError> {
        Ok(Shaped::other(Variant::String(variant.to_owned())))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Shaped, ConvertError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Shaped, ConvertError> {
        let mut dict = Dictionary::new();
        dict.insert(variant, to_variant_dynamic(value)?);
        Ok(Shaped::other(Variant::Dictionary(dict)))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqShape, ConvertError> {
        Ok(SeqShape::with_capacity(len.unwrap_or(0)))
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqShape, ConvertError> {
        Ok(SeqShape::with_capacity(len))
    }

    fn serialize_tuple_struct(
        self,
        name: &'static str,
        len: usize,
    ) -> Result<TupleStructShape, ConvertError> {
        Ok(TupleStructShape {
            name,
            seq: SeqShape::with_capacity(len),
        })
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<TupleVariantShape, ConvertError> {
        Ok(TupleVariantShape {
            variant,
            seq: SeqShape::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapShape, ConvertError> {
        Ok(MapShape {
            dict: Dictionary::new(),
            key: None,
        })
    }

    fn serialize_struct(self, name: &'static str, len: usize) -> Result<StructShape, ConvertError> {
        Ok(StructShape {
            name,
            fields: Vec::with_capacity(len),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<StructVariantShape, ConvertError> {
        Ok(StructVariantShape {
            variant,
            fields: StructShape {
                name: variant,
                fields: Vec::with_capacity(len),
            },
        })
    }
}

// ============================================================================
// Sequences
// ============================================================================

struct SeqShape {
    items: Vec<Shaped>,
}

impl SeqShape {
    fn with_capacity(len: usize) -> Self {
        Self {
            items: Vec::with_capacity(len),
        }
    }

    fn push<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ConvertError> {
        self.items.push(value.serialize(ShapeSerializer)?);
        Ok(())
    }

    /// Hint shared by every element, if any
    fn common_hint(&self) -> Option<Hint> {
        let first = self.items.first()?.hint;
        self.items
            .iter()
            .all(|item| item.hint == first)
            .then_some(first)
    }

    fn finish(self) -> Shaped {
        let hint = self.common_hint().unwrap_or(Hint::Other);
        let values = self.items.into_iter().map(|item| item.value);
        let packed = match hint {
            Hint::Byte => Variant::PackedByteArray(values.filter_map(int).map(|i| i as u8).collect()),
            Hint::Int32 => Variant::PackedInt32Array(values.filter_map(int).map(|i| i as i32).collect()),
            Hint::Int64 => Variant::PackedInt64Array(values.filter_map(int).collect()),
            Hint::Float32 => {
                Variant::PackedFloat32Array(values.filter_map(float).map(|f| f as f32).collect())
            }
            Hint::Float64 => Variant::PackedFloat64Array(values.filter_map(float).collect()),
            Hint::Str => Variant::PackedStringArray(
                values
                    .filter_map(|v| match v {
                        Variant::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            Hint::Vector2 => Variant::PackedVector2Array(
                values
                    .filter_map(|v| match v {
                        Variant::Vector2(v) => Some(v),
                        _ => None,
                    })
                    .collect(),
            ),
            Hint::Vector3 => Variant::PackedVector3Array(
                values
                    .filter_map(|v| match v {
                        Variant::Vector3(v) => Some(v),
                        _ => None,
                    })
                    .collect(),
            ),
            Hint::Vector4 => Variant::PackedVector4Array(
                values
                    .filter_map(|v| match v {
                        Variant::Vector4(v) => Some(v),
                        _ => None,
                    })
                    .collect(),
            ),
            Hint::Color => Variant::PackedColorArray(
                values
                    .filter_map(|v| match v {
                        Variant::Color(c) => Some(c),
                        _ => None,
                    })
                    .collect(),
            ),
            Hint::Other => Variant::Array(values.collect()),
        };
        Shaped::other(packed)
    }

    /// Plain `f32` components, when every element is one
    fn f32_components(&self) -> Option<Vec<f32>> {
        self.items
            .iter()
            .map(|item| match (item.hint, &item.value) {
                (Hint::Float32, Variant::Float(f)) => Some(*f as f32),
                _ => None,
            })
            .collect()
    }
}

fn int(v: Variant) -> Option<i64> {
    match v {
        Variant::Int(i) => Some(i),
        _ => None,
    }
}

fn float(v: Variant) -> Option<f64> {
    match v {
        Variant::Float(f) => Some(f),
        _ => None,
    }
}

impl ser::SerializeSeq for SeqShape {
    type Ok = Shaped;
    type Error = ConvertError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ConvertError> {
        self.push(value)
    }

    fn end(self) -> Result<Shaped, ConvertError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for SeqShape {
    type Ok = Shaped;
    type Error = ConvertError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ConvertError> {
        self.push(value)
    }

    fn end(self) -> Result<Shaped, ConvertError> {
        Ok(self.finish())
    }
}

struct TupleStructShape {
    name: &'static str,
    seq: SeqShape,
}

impl ser::SerializeTupleStruct for TupleStructShape {
    type Ok = Shaped;
    type Error = ConvertError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ConvertError> {
        self.seq.push(value)
    }

    fn end(self) -> Result<Shaped, ConvertError> {
        // Math types serialize as tuple structs of f32 components
        let vector = match (self.name, self.seq.f32_components().as_deref()) {
            ("Vec2", Some(&[x, y])) => Some(Shaped::new(
                Variant::Vector2(Vec2::new(x, y)),
                Hint::Vector2,
            )),
            ("Vec3", Some(&[x, y, z])) => Some(Shaped::new(
                Variant::Vector3(Vec3::new(x, y, z)),
                Hint::Vector3,
            )),
            ("Vec4", Some(&[x, y, z, w])) => Some(Shaped::new(
                Variant::Vector4(Vec4::new(x, y, z, w)),
                Hint::Vector4,
            )),
            _ => None,
        };
        Ok(vector.unwrap_or_else(|| self.seq.finish()))
    }
}

struct TupleVariantShape {
    variant: &'static str,
    seq: SeqShape,
}

impl ser::SerializeTupleVariant for TupleVariantShape {
    type Ok = Shaped;
    type Error = ConvertError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ConvertError> {
        self.seq.push(value)
    }

    fn end(self) -> Result<Shaped, ConvertError> {
        let mut dict = Dictionary::new();
        dict.insert(self.variant, self.seq.finish().value);
        Ok(Shaped::other(Variant::Dictionary(dict)))
    }
}

// ============================================================================
// Maps and structs
// ============================================================================

struct MapShape {
    dict: Dictionary,
    key: Option<Variant>,
}

impl ser::SerializeMap for MapShape {
    type Ok = Shaped;
    type Error = ConvertError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), ConvertError> {
        self.key = Some(to_variant_dynamic(key)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ConvertError> {
        let key = self
            .key
            .take()
            .ok_or_else(|| ConvertError::Custom("map value without a key".into()))?;
        self.dict.insert(key, to_variant_dynamic(value)?);
        Ok(())
    }

    fn end(self) -> Result<Shaped, ConvertError> {
        Ok(Shaped::other(Variant::Dictionary(self.dict)))
    }
}

struct StructShape {
    name: &'static str,
    fields: Vec<(&'static str, Shaped)>,
}

impl StructShape {
    fn color(&self) -> Option<Color> {
        let channel = |name: &str| {
            self.fields.iter().find_map(|(key, shaped)| match (&shaped.value, *key == name) {
                (Variant::Float(f), true) => Some(*f as f32),
                _ => None,
            })
        };
        (self.name == "Color" && self.fields.len() == 4).then_some(())?;
        Some(Color::rgba(
            channel("r")?,
            channel("g")?,
            channel("b")?,
            channel("a")?,
        ))
    }

    fn into_dictionary(self) -> Dictionary {
        self.fields
            .into_iter()
            .map(|(key, shaped)| (Variant::String(key.to_owned()), shaped.value))
            .collect()
    }
}

impl ser::SerializeStruct for StructShape {
    type Ok = Shaped;
    type Error = ConvertError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ConvertError> {
        self.fields.push((key, value.serialize(ShapeSerializer)?));
        Ok(())
    }

    fn end(self) -> Result<Shaped, ConvertError> {
        if let Some(color) = self.color() {
            return Ok(Shaped::new(Variant::Color(color), Hint::Color));
        }
        // Unrecognized structs become generic keyed containers
        Ok(Shaped::other(Variant::Dictionary(self.into_dictionary())))
    }
}

struct StructVariantShape {
    variant: &'static str,
    fields: StructShape,
}

impl ser::SerializeStructVariant for StructVariantShape {
    type Ok = Shaped;
    type Error = ConvertError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ConvertError> {
        ser::SerializeStruct::serialize_field(&mut self.fields, key, value)
    }

    fn end(self) -> Result<Shaped, ConvertError> {
        let mut dict = Dictionary::new();
        dict.insert(self.variant, Variant::Dictionary(self.fields.into_dictionary()));
        Ok(Shaped::other(Variant::Dictionary(dict)))
    }
}

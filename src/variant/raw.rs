//! FFI variant encoding: a tag word plus two payload words

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use std::fmt;

use super::types::{Color, VariantType};
use crate::engine::ObjectPtr;
use crate::handle::HandleKind;

/// Variant as it crosses the engine boundary
///
/// Inline kinds keep their bits in `data`; handle kinds keep one handle word
/// (`data[0]`) or a pair (`data[0]`, `data[1]`). A `RawVariant` is plain data:
/// ownership of the payload handle is tracked by [`crate::handle::Trio`].
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct RawVariant {
    tag: u32,
    _pad: u32,
    data: [u64; 2],
}

impl RawVariant {
    pub const NIL: RawVariant = RawVariant {
        tag: 0,
        _pad: 0,
        data: [0; 2],
    };

    #[inline]
    fn with(ty: VariantType, data: [u64; 2]) -> Self {
        Self {
            tag: ty.tag(),
            _pad: 0,
            data,
        }
    }

    fn with_bytes<T: Pod>(ty: VariantType, value: T) -> Self {
        let mut buf = [0u8; 16];
        let bytes = bytemuck::bytes_of(&value);
        buf[..bytes.len()].copy_from_slice(bytes);
        Self::with(ty, bytemuck::cast(buf))
    }

    fn read_bytes<T: Pod>(&self) -> T {
        let buf: [u8; 16] = bytemuck::cast(self.data);
        bytemuck::pod_read_unaligned(&buf[..std::mem::size_of::<T>()])
    }

    pub fn from_bool(value: bool) -> Self {
        Self::with(VariantType::Bool, [value as u64, 0])
    }

    pub fn from_int(value: i64) -> Self {
        Self::with(VariantType::Int, [value as u64, 0])
    }

    pub fn from_float(value: f64) -> Self {
        Self::with(VariantType::Float, [value.to_bits(), 0])
    }

    pub fn from_vector2(value: Vec2) -> Self {
        Self::with_bytes(VariantType::Vector2, value)
    }

    pub fn from_vector3(value: Vec3) -> Self {
        Self::with_bytes(VariantType::Vector3, value)
    }

    pub fn from_vector4(value: Vec4) -> Self {
        Self::with_bytes(VariantType::Vector4, value)
    }

    pub fn from_color(value: Color) -> Self {
        Self::with_bytes(VariantType::Color, value)
    }

    pub fn from_object(value: ObjectPtr) -> Self {
        Self::with(VariantType::Object, [value.addr() as u64, 0])
    }

    /// Variant carrying a one-word handle
    pub fn from_handle(ty: VariantType, handle: usize) -> Self {
        debug_assert!(HandleKind::of_variant(ty).is_some_and(|k| k.words() == 1));
        Self::with(ty, [handle as u64, 0])
    }

    /// Variant carrying a two-word handle
    pub fn from_pair(ty: VariantType, words: [usize; 2]) -> Self {
        debug_assert!(HandleKind::of_variant(ty).is_some_and(|k| k.words() == 2));
        Self::with(ty, [words[0] as u64, words[1] as u64])
    }

    /// Runtime tag; unknown tags read as nil
    pub fn variant_type(&self) -> VariantType {
        VariantType::from_tag(self.tag).unwrap_or(VariantType::Nil)
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        self.variant_type() == VariantType::Nil
    }

    pub fn as_bool(&self) -> bool {
        self.data[0] != 0
    }

    pub fn as_int(&self) -> i64 {
        self.data[0] as i64
    }

    pub fn as_float(&self) -> f64 {
        f64::from_bits(self.data[0])
    }

    pub fn as_vector2(&self) -> Vec2 {
        self.read_bytes()
    }

    pub fn as_vector3(&self) -> Vec3 {
        self.read_bytes()
    }

    pub fn as_vector4(&self) -> Vec4 {
        self.read_bytes()
    }

    pub fn as_color(&self) -> Color {
        self.read_bytes()
    }

    pub fn as_object(&self) -> ObjectPtr {
        ObjectPtr::from_addr(self.data[0] as usize)
    }

    pub fn handle(&self) -> usize {
        self.data[0] as usize
    }

    pub fn pair(&self) -> [usize; 2] {
        [self.data[0] as usize, self.data[1] as usize]
    }

    /// Handle carried by the payload, if the kind owns one
    pub fn payload(&self) -> Option<(HandleKind, [usize; 2])> {
        let kind = HandleKind::of_variant(self.variant_type())?;
        let words = match kind.words() {
            2 => self.pair(),
            _ => [self.handle(), 0],
        };
        Some((kind, words))
    }
}

impl Default for RawVariant {
    fn default() -> Self {
        Self::NIL
    }
}

impl fmt::Debug for RawVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RawVariant({}, {:#x}, {:#x})",
            self.variant_type(),
            self.data[0],
            self.data[1]
        )
    }
}

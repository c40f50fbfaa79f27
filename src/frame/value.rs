//! Frame values - host types with a fixed engine ABI representation

use bytemuck::Pod;
use glam::{Vec2, Vec3, Vec4};

use crate::engine::ObjectPtr;
use crate::variant::{Color, RawVariant};

/// Host type that crosses a call frame as plain bytes
///
/// `Abi` is the exact bit pattern the engine reads or writes; its size and
/// alignment decide the slot layout.
pub trait FrameValue: Sized {
    type Abi: Pod;

    fn into_abi(self) -> Self::Abi;

    fn from_abi(abi: Self::Abi) -> Self;
}

macro_rules! impl_identity {
    ($($t:ty),* $(,)?) => {$(
        impl FrameValue for $t {
            type Abi = $t;

            #[inline]
            fn into_abi(self) -> $t {
                self
            }

            #[inline]
            fn from_abi(abi: $t) -> Self {
                abi
            }
        }
    )*};
}

impl_identity!(
    u8, u32, u64, i32, i64, f32, f64, usize, ObjectPtr, Vec2, Vec3, Vec4, Color, RawVariant,
    [usize; 2],
);

/// Engine booleans are one byte
impl FrameValue for bool {
    type Abi = u8;

    #[inline]
    fn into_abi(self) -> u8 {
        self as u8
    }

    #[inline]
    fn from_abi(abi: u8) -> Self {
        abi != 0
    }
}

/// Size of a frame value's slot
#[inline]
pub const fn slot_size<T: FrameValue>() -> usize {
    std::mem::size_of::<T::Abi>()
}

/// Alignment of a frame value's slot
#[inline]
pub const fn slot_align<T: FrameValue>() -> usize {
    std::mem::align_of::<T::Abi>()
}

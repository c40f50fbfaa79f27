//! Call frame - argument buffer, return slot and invocation

use bytemuck::{Pod, Zeroable};
use smallvec::SmallVec;
use std::ffi::c_void;
use std::fmt;

use super::value::{slot_align, slot_size, FrameValue};
use crate::engine::{MethodBind, ObjectPtr};
use crate::logging::trace;

/// Largest alignment a slot may require
pub const MAX_ALIGN: usize = 16;

/// 16-byte aligned storage unit
#[repr(C, align(16))]
#[derive(Clone, Copy)]
struct Block([u8; MAX_ALIGN]);

// SAFETY: a byte array with no padding; any bit pattern is valid
unsafe impl Zeroable for Block {}
unsafe impl Pod for Block {}

const EMPTY: Block = Block([0; MAX_ALIGN]);

/// Storage with room for `bytes`, aligned to `MAX_ALIGN`
#[derive(Default)]
struct Buffer {
    blocks: SmallVec<[Block; 4]>,
}

impl Buffer {
    fn reserve(&mut self, bytes: usize) {
        let blocks = bytes.div_ceil(MAX_ALIGN);
        if self.blocks.len() < blocks {
            self.blocks.resize(blocks, EMPTY);
        }
    }

    fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.blocks)
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.blocks)
    }

    fn as_ptr(&self) -> *const u8 {
        self.blocks.as_ptr() as *const u8
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        self.blocks.as_mut_ptr() as *mut u8
    }
}

/// Typed arguments and a typed return slot for one bound-method call
///
/// Arguments are laid out back to back in one contiguous buffer, each at its
/// type's natural alignment. The engine receives an array of argument
/// addresses plus the return slot address. All storage is owned by the frame
/// and freed when it drops, on every exit path.
#[derive(Default)]
pub struct CallFrame {
    args: Buffer,
    len: usize,
    offsets: SmallVec<[usize; 8]>,
    ret: Buffer,
    ret_size: Option<usize>,
}

impl CallFrame {
    /// Create an empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an argument
    pub fn push<T: FrameValue>(&mut self, value: T) -> &mut Self {
        let size = slot_size::<T>();
        let align = slot_align::<T>();
        assert!(align <= MAX_ALIGN, "frame slot alignment {align} exceeds {MAX_ALIGN}");

        let offset = (self.len + align - 1) & !(align - 1);
        self.args.reserve(offset + size);

        let abi = value.into_abi();
        self.args.bytes_mut()[offset..offset + size].copy_from_slice(bytemuck::bytes_of(&abi));
        self.offsets.push(offset);
        self.len = offset + size;
        self
    }

    /// Number of pushed arguments
    #[inline]
    pub fn arg_count(&self) -> usize {
        self.offsets.len()
    }

    /// Bytes used by arguments, including alignment padding
    #[inline]
    pub fn arg_bytes(&self) -> usize {
        self.len
    }

    /// Read back a pushed argument
    pub fn arg<T: FrameValue>(&self, index: usize) -> Option<T> {
        let offset = *self.offsets.get(index)?;
        let size = slot_size::<T>();
        let bytes = self.args.bytes().get(offset..offset + size)?;
        Some(T::from_abi(bytemuck::pod_read_unaligned(bytes)))
    }

    /// Allocate a zeroed return slot for `T`
    pub fn ret<T: FrameValue>(&mut self) -> &mut Self {
        let size = slot_size::<T>();
        assert!(slot_align::<T>() <= MAX_ALIGN);
        self.ret.blocks.clear();
        self.ret.reserve(size.max(1));
        self.ret_size = Some(size);
        self
    }

    /// Invoke `bind` on `object` with the pushed arguments
    ///
    /// # Safety
    /// The caller must ensure:
    /// - `bind` is a live method bind
    /// - pushed argument types match the method's declared parameters
    /// - the return slot (if any) matches the declared return type
    pub unsafe fn invoke(&mut self, bind: MethodBind, object: ObjectPtr) {
        let base = self.args.as_ptr();
        let addresses: SmallVec<[*const c_void; 8]> = self
            .offsets
            .iter()
            .map(|&offset| base.add(offset) as *const c_void)
            .collect();

        let ret = if self.ret_size.is_some() {
            self.ret.as_mut_ptr() as *mut c_void
        } else {
            std::ptr::null_mut()
        };

        trace!(
            target: "ffi",
            bind = format_args!("{:#x}", bind.bind),
            object = %object,
            args = addresses.len(),
            "invoke"
        );

        (bind.call)(
            bind.bind as *const c_void,
            object.as_mut_ptr(),
            addresses.as_ptr(),
            ret,
        );
    }

    /// Read the return slot as `T`
    ///
    /// # Panics
    /// When no return slot was allocated, or it was sized for another type.
    pub fn read<T: FrameValue>(&self) -> T {
        let size = slot_size::<T>();
        match self.ret_size {
            Some(allocated) if allocated == size => {}
            Some(allocated) => panic!(
                "return slot holds {allocated} bytes, read as {size}-byte {}",
                std::any::type_name::<T>()
            ),
            None => panic!("no return slot allocated"),
        }
        T::from_abi(bytemuck::pod_read_unaligned(&self.ret.bytes()[..size]))
    }

    /// Invoke and read a `R` result
    ///
    /// # Safety
    /// Same contract as [`CallFrame::invoke`].
    pub unsafe fn call<R: FrameValue>(mut self, bind: MethodBind, object: ObjectPtr) -> R {
        self.ret::<R>();
        self.invoke(bind, object);
        self.read()
    }

    /// Invoke a method without a return value
    ///
    /// # Safety
    /// Same contract as [`CallFrame::invoke`].
    pub unsafe fn call_void(mut self, bind: MethodBind, object: ObjectPtr) {
        self.invoke(bind, object);
    }

    /// Release the frame's storage now
    pub fn free(self) {}
}

impl fmt::Debug for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallFrame")
            .field("args", &self.offsets.len())
            .field("bytes", &self.len)
            .field("ret_size", &self.ret_size)
            .finish()
    }
}

//! Call-frame transport for bound-method calls
//!
//! Design: A [`CallFrame`] is a stack-discipline buffer. Arguments are pushed
//! in order with their native size and alignment, a return slot is allocated
//! for the expected result type, the engine's ptrcall entry point is invoked,
//! and the result is read back. The frame owns all of its storage.
//!
//! Callers are trusted: a mismatch between pushed types and the engine
//! method's signature is a contract violation at the boundary.

mod call;
mod value;

pub use call::{CallFrame, MAX_ALIGN};
pub use value::{slot_align, slot_size, FrameValue};

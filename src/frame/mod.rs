//! Printer command frames: an ordered list of operands encoded into one contiguous byte sequence.

pub mod commands;
pub mod encode;
pub mod operand;

pub use encode::{encode, format_elapsed_ms, operands_from_json, FrameBuilder};
pub use operand::Operand;

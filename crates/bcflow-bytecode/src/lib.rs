//! # bcflow bytecode
//!
//! Typed instruction records consumed by the dataflow builder.
//!
//! ## Design Principles
//!
//! - **Decoded, not raw**: instructions arrive from an external decoder as
//!   an opcode name, an optional argument and a byte offset
//! - **Closed vocabulary**: every CPython 3.11 opcode is an [`Opcode`] variant,
//!   unknown names are rejected at decode time
//! - **Offset-indexed**: [`InstructionTable`] maps byte offsets to instructions
//! - **Serializable**: records round-trip through serde

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod instruction;
pub mod opcode;
pub mod table;

pub use error::{BytecodeError, Result};
pub use instruction::{ArgValue, BinaryOperator, Constant, InPlaceOperator, Instruction};
pub use opcode::Opcode;
pub use table::InstructionTable;

/// Width in bytes of one instruction word (opcode + oparg).
pub const INSTRUCTION_WIDTH: u32 = 2;

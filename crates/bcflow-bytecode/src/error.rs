//! Bytecode errors

use thiserror::Error;

/// Errors that can occur while building instruction records
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BytecodeError {
    /// Opcode name not present in the opcode table
    #[error("Unknown opcode: {0}")]
    UnknownOpcode(String),

    /// Numeric opcode not present in the opcode table
    #[error("Invalid opcode: {0}")]
    InvalidOpcode(u8),

    /// Two instructions claim the same byte offset
    #[error("Duplicate instruction at offset {0}")]
    DuplicateOffset(u32),
}

/// Result type for bytecode operations
pub type Result<T> = std::result::Result<T, BytecodeError>;

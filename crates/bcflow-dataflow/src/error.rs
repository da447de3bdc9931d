//! Build errors

use bcflow_bytecode::Opcode;
use thiserror::Error;

use crate::scfg::BlockLabel;
use crate::verify::VerifyError;

/// Errors that abort a dataflow build.
///
/// A failed block fails the whole tree; partial trees are never returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Opcode has no translation rule
    #[error("unsupported instruction at offset {offset}: {opcode}")]
    UnsupportedInstruction {
        /// Offending opcode
        opcode: Opcode,
        /// Byte offset of the instruction
        offset: u32,
    },

    /// A rule needs an operand the decoder did not supply (or supplied malformed)
    #[error("missing operand for {opcode} at offset {offset}")]
    MissingOperand {
        /// Opcode whose operand is missing
        opcode: Opcode,
        /// Byte offset of the instruction
        offset: u32,
    },

    /// Operand present but out of range for the opcode
    #[error("invalid operand {value} for {opcode} at offset {offset}")]
    InvalidOperand {
        /// Opcode whose operand is out of range
        opcode: Opcode,
        /// Byte offset of the instruction
        offset: u32,
        /// Operand as decoded
        value: i64,
    },

    /// A converted block broke a graph invariant
    #[error("block {label} failed verification: {source}")]
    Verify {
        /// Block label
        label: BlockLabel,
        /// What was wrong
        #[source]
        source: VerifyError,
    },
}

impl BuildError {
    /// Byte offset the error points at, if any
    pub fn offset(&self) -> Option<u32> {
        match self {
            Self::UnsupportedInstruction { offset, .. }
            | Self::MissingOperand { offset, .. }
            | Self::InvalidOperand { offset, .. } => Some(*offset),
            Self::Verify { .. } => None,
        }
    }
}

/// Result type for dataflow builds
pub type BuildResult<T> = Result<T, BuildError>;

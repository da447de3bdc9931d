//! Offset-indexed instruction table

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};
use crate::instruction::Instruction;

/// All instructions of one code object, keyed by byte offset.
///
/// Shared read-only by every block conversion. Serializes as a plain list of
/// instructions in offset order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Instruction>", into = "Vec<Instruction>")]
pub struct InstructionTable {
    by_offset: BTreeMap<u32, Instruction>,
}

impl InstructionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table, rejecting duplicate offsets
    pub fn from_instructions(instructions: impl IntoIterator<Item = Instruction>) -> Result<Self> {
        let mut table = Self::new();
        for instruction in instructions {
            table.insert(instruction)?;
        }
        Ok(table)
    }

    /// Insert one instruction
    pub fn insert(&mut self, instruction: Instruction) -> Result<()> {
        let offset = instruction.offset;
        if self.by_offset.contains_key(&offset) {
            return Err(BytecodeError::DuplicateOffset(offset));
        }
        self.by_offset.insert(offset, instruction);
        Ok(())
    }

    /// Instruction at `offset`
    #[inline]
    pub fn get(&self, offset: u32) -> Option<&Instruction> {
        self.by_offset.get(&offset)
    }

    /// Instructions with offsets in `begin..end`, in offset order
    pub fn range(&self, begin: u32, end: u32) -> impl Iterator<Item = &Instruction> {
        // An inverted range would panic inside BTreeMap.
        let end = end.max(begin);
        self.by_offset.range(begin..end).map(|(_, inst)| inst)
    }

    /// All instructions, in offset order
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.by_offset.values()
    }

    /// Number of instructions
    #[inline]
    pub fn len(&self) -> usize {
        self.by_offset.len()
    }

    /// Whether the table is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_offset.is_empty()
    }
}

impl TryFrom<Vec<Instruction>> for InstructionTable {
    type Error = BytecodeError;

    fn try_from(instructions: Vec<Instruction>) -> Result<Self> {
        Self::from_instructions(instructions)
    }
}

impl From<InstructionTable> for Vec<Instruction> {
    fn from(table: InstructionTable) -> Self {
        table.by_offset.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    fn table() -> InstructionTable {
        InstructionTable::from_instructions([
            Instruction::new(Opcode::Resume, 0),
            Instruction::new(Opcode::LoadConst, 2).with_arg(1),
            Instruction::new(Opcode::ReturnValue, 4),
            Instruction::new(Opcode::Nop, 6),
        ])
        .unwrap()
    }

    #[test]
    fn lookup_by_offset() {
        let table = table();
        assert_eq!(table.len(), 4);
        assert_eq!(table.get(2).map(|i| i.opcode), Some(Opcode::LoadConst));
        assert!(table.get(3).is_none());
    }

    #[test]
    fn range_is_half_open() {
        let table = table();
        let offsets: Vec<u32> = table.range(2, 6).map(|i| i.offset).collect();
        assert_eq!(offsets, vec![2, 4]);
        assert_eq!(table.range(6, 2).count(), 0);
        assert_eq!(table.range(0, 100).count(), 4);
    }

    #[test]
    fn duplicate_offset_rejected() {
        let err = InstructionTable::from_instructions([
            Instruction::new(Opcode::Nop, 0),
            Instruction::new(Opcode::Resume, 0),
        ])
        .unwrap_err();
        assert_eq!(err, BytecodeError::DuplicateOffset(0));
    }

    #[test]
    fn serializes_as_list() {
        let table = table();
        let json = serde_json::to_string(&table).unwrap();
        assert!(json.starts_with('['));
        let back: InstructionTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}

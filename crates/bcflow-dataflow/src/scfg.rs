//! Structured control-flow tree.
//!
//! The restructuring pass hands the builder a tree of labeled blocks: leaf
//! bytecode blocks, region wrappers owning a nested tree, and synthetic
//! control blocks introduced by restructuring. The tree is generic over its
//! leaf type so that the converted tree has the same shape with
//! [`DdgBlock`](crate::DdgBlock) leaves.

use std::collections::BTreeMap;
use std::fmt;

use bcflow_bytecode::{Instruction, InstructionTable};
use serde::{Deserialize, Serialize};

/// Block label, unique within one tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockLabel(pub String);

impl BlockLabel {
    /// Create a label.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Label text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockLabel {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// A leaf block of raw instructions: offsets `begin..end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytecodeBlock {
    /// Label.
    pub label: BlockLabel,
    /// First instruction offset.
    pub begin: u32,
    /// Offset one past the last instruction.
    pub end: u32,
    /// Successor labels.
    #[serde(default)]
    pub jump_targets: Vec<BlockLabel>,
    /// Successors reached through a loop back-edge.
    #[serde(default)]
    pub backedges: Vec<BlockLabel>,
}

impl BytecodeBlock {
    /// Instructions of this block, in offset order.
    pub fn instructions<'t>(
        &self,
        table: &'t InstructionTable,
    ) -> impl Iterator<Item = &'t Instruction> + use<'t> {
        table.range(self.begin, self.end)
    }
}

/// Region flavour assigned by the restructurer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    /// Loop body with a single back-edge.
    Loop,
    /// Head of a branch region.
    Head,
    /// One arm of a branch.
    Branch,
    /// Join after a branch.
    Tail,
    /// Top-level grouping.
    Meta,
}

/// A region wrapping a nested tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionBlock<L> {
    /// Label.
    pub label: BlockLabel,
    /// Region flavour.
    pub kind: RegionKind,
    /// Entry block of the subregion.
    #[serde(default)]
    pub header: Option<BlockLabel>,
    /// Block through which control leaves the subregion.
    #[serde(default)]
    pub exiting: Option<BlockLabel>,
    /// Successor labels.
    #[serde(default)]
    pub jump_targets: Vec<BlockLabel>,
    /// Successors reached through a loop back-edge.
    #[serde(default)]
    pub backedges: Vec<BlockLabel>,
    /// Nested tree.
    pub subregion: Scfg<L>,
}

impl<L> RegionBlock<L> {
    /// Same region metadata around a different subtree.
    pub fn with_subregion<M>(&self, subregion: Scfg<M>) -> RegionBlock<M> {
        RegionBlock {
            label: self.label.clone(),
            kind: self.kind,
            header: self.header.clone(),
            exiting: self.exiting.clone(),
            jump_targets: self.jump_targets.clone(),
            backedges: self.backedges.clone(),
            subregion,
        }
    }
}

/// Control block synthesized by restructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntheticKind {
    /// Assigns control variables.
    Assignment,
    /// Loop or branch dispatch head.
    Head,
    /// Region exit.
    Exit,
    /// Common tail.
    Tail,
    /// Single return point.
    Return,
    /// Loop latch deciding between back-edge and exit.
    ExitingLatch,
    /// Dispatch on an exit variable.
    ExitBranch,
    /// Fill-in block with no behaviour.
    Fill,
}

/// A synthetic control block. Carried through conversion unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticBlock {
    /// Label.
    pub label: BlockLabel,
    /// Flavour.
    pub kind: SyntheticKind,
    /// Successor labels.
    #[serde(default)]
    pub jump_targets: Vec<BlockLabel>,
    /// Successors reached through a loop back-edge.
    #[serde(default)]
    pub backedges: Vec<BlockLabel>,
    /// Control variable dispatched on.
    #[serde(default)]
    pub variable: Option<String>,
    /// Control variable assignments.
    #[serde(default)]
    pub assignments: BTreeMap<String, i64>,
    /// Control variable value to successor, as `(value, label)` pairs.
    #[serde(default)]
    pub branch_value_table: Vec<(i64, BlockLabel)>,
}

/// One node of the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScfgBlock<L> {
    /// Leaf block.
    Basic(L),
    /// Region with a nested tree.
    Region(RegionBlock<L>),
    /// Restructuring artifact.
    Synthetic(SyntheticBlock),
}

/// Metadata shared by every leaf type.
pub trait LabeledBlock {
    /// Label.
    fn label(&self) -> &BlockLabel;
    /// Successor labels.
    fn jump_targets(&self) -> &[BlockLabel];
    /// Back-edge successors.
    fn backedges(&self) -> &[BlockLabel];
}

impl LabeledBlock for BytecodeBlock {
    fn label(&self) -> &BlockLabel {
        &self.label
    }

    fn jump_targets(&self) -> &[BlockLabel] {
        &self.jump_targets
    }

    fn backedges(&self) -> &[BlockLabel] {
        &self.backedges
    }
}

impl<L: LabeledBlock> ScfgBlock<L> {
    /// Label of the node.
    pub fn label(&self) -> &BlockLabel {
        match self {
            Self::Basic(leaf) => leaf.label(),
            Self::Region(region) => &region.label,
            Self::Synthetic(block) => &block.label,
        }
    }

    /// Successor labels of the node.
    pub fn jump_targets(&self) -> &[BlockLabel] {
        match self {
            Self::Basic(leaf) => leaf.jump_targets(),
            Self::Region(region) => &region.jump_targets,
            Self::Synthetic(block) => &block.jump_targets,
        }
    }

    /// Back-edge successors of the node.
    pub fn backedges(&self) -> &[BlockLabel] {
        match self {
            Self::Basic(leaf) => leaf.backedges(),
            Self::Region(region) => &region.backedges,
            Self::Synthetic(block) => &block.backedges,
        }
    }
}

/// A structured control-flow tree level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scfg<L> {
    blocks: Vec<ScfgBlock<L>>,
}

impl<L> Default for Scfg<L> {
    fn default() -> Self {
        Self { blocks: Vec::new() }
    }
}

impl<L> Scfg<L> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree level from its blocks, in order.
    pub fn from_blocks(blocks: Vec<ScfgBlock<L>>) -> Self {
        Self { blocks }
    }

    /// Append a block.
    pub fn add_block(&mut self, block: ScfgBlock<L>) {
        self.blocks.push(block);
    }

    /// Blocks of this level, in insertion order.
    #[inline]
    pub fn blocks(&self) -> &[ScfgBlock<L>] {
        &self.blocks
    }

    /// Number of blocks at this level.
    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether this level has no blocks.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Leaves of the whole tree, depth first.
    pub fn leaves(&self) -> Vec<&L> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a L>) {
        for block in &self.blocks {
            match block {
                ScfgBlock::Basic(leaf) => out.push(leaf),
                ScfgBlock::Region(region) => region.subregion.collect_leaves(out),
                ScfgBlock::Synthetic(_) => {}
            }
        }
    }

    /// Depth of region nesting below this level.
    pub fn depth(&self) -> usize {
        self.blocks
            .iter()
            .map(|block| match block {
                ScfgBlock::Region(region) => 1 + region.subregion.depth(),
                _ => 0,
            })
            .max()
            .unwrap_or(0)
    }
}

impl<L: LabeledBlock> Scfg<L> {
    /// Block labeled `label` at this level.
    pub fn get(&self, label: &BlockLabel) -> Option<&ScfgBlock<L>> {
        self.blocks.iter().find(|block| block.label() == label)
    }
}

/// Instruction table plus its restructured tree: the unit the builder consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ByteFlow {
    /// All instructions of the code object.
    pub instructions: InstructionTable,
    /// Restructured control flow.
    pub scfg: Scfg<BytecodeBlock>,
}

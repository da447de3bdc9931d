//! Region-tree conversion driver.
//!
//! Rebuilds the structured tree level by level: bytecode leaves become
//! [`DdgBlock`]s, regions recurse into their subtree, synthetic blocks are
//! copied. Blocks never read each other's state, so the blocks of one level
//! may be converted on the rayon pool; the level is reassembled in its
//! original order on the calling thread.

use bcflow_bytecode::InstructionTable;
use rayon::prelude::*;
use tracing::debug;

use crate::block::DdgBlock;
use crate::config::BuilderConfig;
use crate::error::{BuildError, BuildResult};
use crate::graph::OpKind;
use crate::rules;
use crate::scfg::{ByteFlow, BytecodeBlock, LabeledBlock, Scfg, ScfgBlock};
use crate::simulator::StackSimulator;
use crate::verify::verify_block;

/// Convert one leaf block.
pub fn convert_block(block: &BytecodeBlock, table: &InstructionTable) -> BuildResult<DdgBlock> {
    let mut sim = StackSimulator::new();
    let mut count = 0usize;
    for instruction in block.instructions(table) {
        rules::translate(&mut sim, instruction)?;
        count += 1;
    }

    let ddg = DdgBlock::from_simulator(
        block.label.clone(),
        block.jump_targets.clone(),
        block.backedges.clone(),
        sim,
    );
    debug!(
        target: "bcflow::dataflow",
        label = %block.label,
        instructions = count,
        ops = ddg.graph().len(),
        in_stack = ddg.in_stackvars().len(),
        in_vars = ddg.in_vars().len(),
        out_stack = ddg.out_stackvars().len(),
        "converted block"
    );
    Ok(ddg)
}

/// Convert a whole tree.
pub fn convert_scfg(
    scfg: &Scfg<BytecodeBlock>,
    table: &InstructionTable,
    config: &BuilderConfig,
) -> BuildResult<Scfg<DdgBlock>> {
    let convert = |block: &ScfgBlock<BytecodeBlock>| convert_node(block, table, config);
    let blocks = if config.parallel {
        scfg.blocks()
            .par_iter()
            .map(convert)
            .collect::<BuildResult<Vec<_>>>()?
    } else {
        scfg.blocks()
            .iter()
            .map(convert)
            .collect::<BuildResult<Vec<_>>>()?
    };
    Ok(Scfg::from_blocks(blocks))
}

fn convert_node(
    block: &ScfgBlock<BytecodeBlock>,
    table: &InstructionTable,
    config: &BuilderConfig,
) -> BuildResult<ScfgBlock<DdgBlock>> {
    match block {
        ScfgBlock::Basic(leaf) => {
            let ddg = convert_block(leaf, table)?;
            check_block(ddg, config).map(ScfgBlock::Basic)
        }
        ScfgBlock::Region(region) => {
            let subregion = convert_scfg(&region.subregion, table, config)?;
            debug!(
                target: "bcflow::dataflow",
                label = %region.label,
                kind = ?region.kind,
                blocks = subregion.len(),
                "converted region"
            );
            Ok(ScfgBlock::Region(region.with_subregion(subregion)))
        }
        ScfgBlock::Synthetic(synthetic) => Ok(ScfgBlock::Synthetic(synthetic.clone())),
    }
}

/// Run the verifier on a converted block when `config` asks for it.
fn check_block(block: DdgBlock, config: &BuilderConfig) -> BuildResult<DdgBlock> {
    if config.verify {
        verify_block(&block).map_err(|source| BuildError::Verify {
            label: block.label().clone(),
            source,
        })?;
    }
    Ok(block)
}

/// Whether every instruction reachable from the tree has a translation rule.
///
/// Cheap pre-check; [`convert_scfg`] reports the first offender precisely.
pub fn can_translate(scfg: &Scfg<BytecodeBlock>, table: &InstructionTable) -> bool {
    scfg.leaves().into_iter().all(|block| {
        block
            .instructions(table)
            .all(|instruction| rules::is_supported_opcode(instruction.opcode))
    })
}

/// Builds dataflow trees with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct DataflowBuilder {
    config: BuilderConfig,
}

impl DataflowBuilder {
    /// Create a builder.
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    #[inline]
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Convert a byte-flow bundle.
    pub fn build(&self, flow: &ByteFlow) -> BuildResult<Scfg<DdgBlock>> {
        let rvsdg = convert_scfg(&flow.scfg, &flow.instructions, &self.config)?;
        debug!(
            target: "bcflow::dataflow",
            blocks = rvsdg.leaves().len(),
            depth = rvsdg.depth(),
            parallel = self.config.parallel,
            "dataflow build complete"
        );
        Ok(rvsdg)
    }
}

/// Convert a byte-flow bundle with `config`.
pub fn build_dataflow(flow: &ByteFlow, config: &BuilderConfig) -> BuildResult<Scfg<DdgBlock>> {
    DataflowBuilder::new(*config).build(flow)
}

/// Summary counts over a converted tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Converted leaf blocks.
    pub blocks: usize,
    /// Ops across all blocks, synthetic ones included.
    pub ops: usize,
    /// Stack placeholders across all blocks.
    pub incoming_stack: usize,
    /// Variable placeholders across all blocks.
    pub incoming_vars: usize,
    /// Effect-producing ops across all blocks.
    pub effects: usize,
}

impl BuildStats {
    /// Tally a converted tree.
    pub fn collect(rvsdg: &Scfg<DdgBlock>) -> Self {
        rvsdg
            .leaves()
            .into_iter()
            .fold(Self::default(), |mut stats, block| {
                let graph = block.graph();
                stats.blocks += 1;
                stats.ops += graph.len();
                stats.incoming_stack += block.in_stackvars().len();
                stats.incoming_vars += block.in_vars().len();
                stats.effects += graph
                    .ops()
                    .iter()
                    .filter(|op| op.kind() != OpKind::Start && op.effect_output().is_some())
                    .count();
                stats
            })
    }
}

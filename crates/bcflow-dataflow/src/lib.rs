//! # bcflow dataflow
//!
//! Front end of the JIT: turns a restructured, stack-based bytecode function
//! into a tree of per-block dataflow graphs.
//!
//! ## Pipeline
//!
//! 1. The driver walks the structured control-flow tree
//! 2. Each bytecode leaf is simulated instruction by instruction on an
//!    abstract operand stack and variable map
//! 3. Translation rules emit ops and thread the effect token
//! 4. The final simulator state is frozen into a [`DdgBlock`]
//!
//! Values a block reads before defining them (stack underflow, unbound
//! variables, the entry effect) become `incoming` placeholders; connecting
//! them across blocks is left to later passes.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod block;
pub mod config;
pub mod driver;
pub mod error;
pub mod graph;
pub mod rules;
pub mod scfg;
pub mod simulator;
pub mod verify;

pub use block::DdgBlock;
pub use config::BuilderConfig;
pub use driver::{
    BuildStats, DataflowBuilder, build_dataflow, can_translate, convert_block, convert_scfg,
};
pub use error::{BuildError, BuildResult};
pub use graph::{DataflowGraph, Op, OpBuilder, OpId, OpKind, Output, ValueState};
pub use scfg::{
    BlockLabel, ByteFlow, BytecodeBlock, LabeledBlock, RegionBlock, RegionKind, Scfg, ScfgBlock,
    SyntheticBlock, SyntheticKind,
};
pub use simulator::StackSimulator;
pub use verify::{VerifyError, verify_block};

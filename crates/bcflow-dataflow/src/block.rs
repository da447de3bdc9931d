//! Per-block dataflow container.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::graph::{DataflowGraph, ValueState};
use crate::scfg::{BlockLabel, LabeledBlock};
use crate::simulator::StackSimulator;

/// A basic block after conversion.
///
/// Captures the block's graph together with its boundary: the effect token,
/// operand-stack slots and variable bindings it consumes on entry and leaves
/// on exit. Entry values are outputs of synthetic `start` / `incoming` ops.
/// Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct DdgBlock {
    label: BlockLabel,
    jump_targets: Vec<BlockLabel>,
    backedges: Vec<BlockLabel>,
    graph: DataflowGraph,
    in_effect: ValueState,
    out_effect: ValueState,
    in_stackvars: Box<[ValueState]>,
    out_stackvars: Box<[ValueState]>,
    in_vars: BTreeMap<String, ValueState>,
    out_vars: BTreeMap<String, ValueState>,
}

impl DdgBlock {
    /// Freeze a simulator that has consumed every instruction of the block.
    pub fn from_simulator(
        label: BlockLabel,
        jump_targets: Vec<BlockLabel>,
        backedges: Vec<BlockLabel>,
        simulator: StackSimulator,
    ) -> Self {
        let parts = simulator.into_parts();
        Self {
            label,
            jump_targets,
            backedges,
            graph: parts.graph,
            in_effect: parts.in_effect,
            out_effect: parts.out_effect,
            in_stackvars: parts.in_stack.into_boxed_slice(),
            out_stackvars: parts.out_stack.into_boxed_slice(),
            in_vars: parts.in_vars,
            out_vars: parts.out_vars,
        }
    }

    /// The block's ops.
    #[inline]
    pub fn graph(&self) -> &DataflowGraph {
        &self.graph
    }

    /// Effect token on entry.
    #[inline]
    pub fn in_effect(&self) -> ValueState {
        self.in_effect
    }

    /// Effect token on exit.
    #[inline]
    pub fn out_effect(&self) -> ValueState {
        self.out_effect
    }

    /// Stack slots expected on entry; slot 0 is the first one popped.
    #[inline]
    pub fn in_stackvars(&self) -> &[ValueState] {
        &self.in_stackvars
    }

    /// Stack left on exit, bottom to top.
    #[inline]
    pub fn out_stackvars(&self) -> &[ValueState] {
        &self.out_stackvars
    }

    /// Variables read before being written in this block.
    #[inline]
    pub fn in_vars(&self) -> &BTreeMap<String, ValueState> {
        &self.in_vars
    }

    /// Variable bindings on exit.
    #[inline]
    pub fn out_vars(&self) -> &BTreeMap<String, ValueState> {
        &self.out_vars
    }

    /// Effect tokens from entry to exit, entry excluded.
    ///
    /// Follows each effect-producing op's `env` input back from the exit
    /// token. Stops early if the chain is broken; use
    /// [`verify_block`](crate::verify_block) to detect that.
    pub fn effect_chain(&self) -> Vec<ValueState> {
        let mut chain = Vec::new();
        let mut current = self.out_effect;
        while current != self.in_effect {
            chain.push(current);
            match self
                .graph
                .producer(current)
                .and_then(|op| op.input("env"))
            {
                Some(previous) if previous.op() < current.op() => current = previous,
                _ => break,
            }
        }
        chain.reverse();
        chain
    }
}

impl LabeledBlock for DdgBlock {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OpKind;

    #[test]
    fn freezes_simulator_boundary() {
        let mut sim = StackSimulator::new();
        let top = sim.pop();
        let x = sim.load("x");
        sim.push(x);
        sim.push(top);
        sim.store("y", top);

        let block = DdgBlock::from_simulator(
            "b0".into(),
            vec!["b1".into()],
            Vec::new(),
            sim,
        );

        assert_eq!(block.label().as_str(), "b0");
        assert_eq!(block.jump_targets(), &[BlockLabel::new("b1")]);
        assert!(block.backedges().is_empty());
        assert_eq!(block.in_stackvars(), &[top]);
        assert_eq!(block.out_stackvars(), &[x, top]);
        assert_eq!(block.in_vars().get("x"), Some(&x));
        assert_eq!(block.out_vars().get("y"), Some(&top));
        assert_eq!(block.in_effect(), block.out_effect());
        assert!(block.effect_chain().is_empty());
    }

    #[test]
    fn effect_chain_follows_env_inputs() {
        let mut sim = StackSimulator::new();
        let mut tokens = Vec::new();
        for _ in 0..3 {
            let env = sim.effect();
            let mut op = sim.graph_mut().begin(OpKind::Return, None);
            op.bind_input("env", env);
            let next = op.declare_effect("env");
            op.finish();
            sim.replace_effect(next);
            tokens.push(next);
        }

        let block = DdgBlock::from_simulator("b".into(), Vec::new(), Vec::new(), sim);
        assert_eq!(block.effect_chain(), tokens);
    }
}

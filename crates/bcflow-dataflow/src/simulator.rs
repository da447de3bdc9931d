//! Abstract stack/variable state for one block.

use std::collections::BTreeMap;

use tracing::trace;

use crate::graph::{DataflowGraph, OpKind, ValueState};

/// Per-block abstract interpreter state.
///
/// Starts with a single `start` op whose output is the entry effect token.
/// Reads past the locally known state (popping an empty stack, loading an
/// unbound variable) materialize `incoming` placeholder ops standing for
/// values a predecessor block must supply.
#[derive(Debug, Clone)]
pub struct StackSimulator {
    graph: DataflowGraph,
    stack: Vec<ValueState>,
    varmap: BTreeMap<String, ValueState>,
    effect: ValueState,
    in_effect: ValueState,
    incoming_stack: Vec<ValueState>,
    incoming_vars: BTreeMap<String, ValueState>,
}

impl Default for StackSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl StackSimulator {
    /// Fresh state: a `start` op, empty stack, no bindings.
    pub fn new() -> Self {
        let mut graph = DataflowGraph::new();
        let mut start = graph.begin(OpKind::Start, None);
        let env = start.declare_effect("env");
        start.finish();
        Self {
            graph,
            stack: Vec::new(),
            varmap: BTreeMap::new(),
            effect: env,
            in_effect: env,
            incoming_stack: Vec::new(),
            incoming_vars: BTreeMap::new(),
        }
    }

    /// Push onto the operand stack.
    #[inline]
    pub fn push(&mut self, value: ValueState) {
        self.stack.push(value);
    }

    /// Pop the operand stack, materializing `stack[K]` on underflow.
    pub fn pop(&mut self) -> ValueState {
        if let Some(value) = self.stack.pop() {
            return value;
        }
        let slot = self.incoming_stack.len();
        let mut op = self.graph.begin(OpKind::StackIncoming, None);
        let value = op.declare_output(format!("stack[{slot}]"));
        op.finish();
        self.incoming_stack.push(value);
        trace!(target: "bcflow::dataflow", slot, %value, "stack underflow");
        value
    }

    /// Current binding of `name`, materializing an incoming variable on miss.
    pub fn load(&mut self, name: &str) -> ValueState {
        if let Some(value) = self.varmap.get(name) {
            return *value;
        }
        let mut op = self.graph.begin(OpKind::VarIncoming, None);
        let value = op.declare_output(name);
        op.finish();
        self.incoming_vars.insert(name.to_string(), value);
        self.varmap.insert(name.to_string(), value);
        trace!(target: "bcflow::dataflow", name, %value, "incoming variable");
        value
    }

    /// Bind `name` to `value`; last write wins.
    #[inline]
    pub fn store(&mut self, name: impl Into<String>, value: ValueState) {
        self.varmap.insert(name.into(), value);
    }

    /// Make `effect` the current effect token.
    ///
    /// # Panics
    ///
    /// If `effect` is not an effect output of this block's graph. Translation
    /// rules only ever pass freshly declared effect outputs.
    pub fn replace_effect(&mut self, effect: ValueState) {
        assert!(
            self.graph.is_effect(effect),
            "replace_effect called with non-effect value {effect}"
        );
        self.effect = effect;
    }

    /// Current effect token.
    #[inline]
    pub fn effect(&self) -> ValueState {
        self.effect
    }

    /// Entry effect token.
    #[inline]
    pub fn in_effect(&self) -> ValueState {
        self.in_effect
    }

    /// Operand stack, bottom to top.
    #[inline]
    pub fn stack(&self) -> &[ValueState] {
        &self.stack
    }

    /// Variable bindings.
    #[inline]
    pub fn vars(&self) -> &BTreeMap<String, ValueState> {
        &self.varmap
    }

    /// Stack placeholders in materialization order.
    #[inline]
    pub fn incoming_stack(&self) -> &[ValueState] {
        &self.incoming_stack
    }

    /// Variable placeholders.
    #[inline]
    pub fn incoming_vars(&self) -> &BTreeMap<String, ValueState> {
        &self.incoming_vars
    }

    /// Graph built so far.
    #[inline]
    pub fn graph(&self) -> &DataflowGraph {
        &self.graph
    }

    #[inline]
    pub(crate) fn graph_mut(&mut self) -> &mut DataflowGraph {
        &mut self.graph
    }

    pub(crate) fn into_parts(self) -> SimulatorParts {
        SimulatorParts {
            graph: self.graph,
            in_effect: self.in_effect,
            out_effect: self.effect,
            in_stack: self.incoming_stack,
            out_stack: self.stack,
            in_vars: self.incoming_vars,
            out_vars: self.varmap,
        }
    }
}

/// Final simulator state, moved into a block container.
pub(crate) struct SimulatorParts {
    pub graph: DataflowGraph,
    pub in_effect: ValueState,
    pub out_effect: ValueState,
    pub in_stack: Vec<ValueState>,
    pub out_stack: Vec<ValueState>,
    pub in_vars: BTreeMap<String, ValueState>,
    pub out_vars: BTreeMap<String, ValueState>,
}

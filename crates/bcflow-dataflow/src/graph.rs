//! Value/operation graph model.
//!
//! Every block owns one [`DataflowGraph`]: an append-only arena of [`Op`]
//! nodes. A value is a [`ValueState`], the pair `(producing op, output index)`,
//! so a value's producer is fixed the moment the handle exists.
//!
//! Nodes are built through [`OpBuilder`], which holds the arena mutably until
//! [`OpBuilder::finish`]. No other node can be created (and therefore no other
//! node can consume this node's outputs) while a node is under construction,
//! which keeps the graph acyclic: inputs can only name values of nodes that
//! were finished earlier.

use std::fmt;
use std::ops::Index;

use bcflow_bytecode::Instruction;
use serde::Serialize;
use smallvec::SmallVec;

// =============================================================================
// Handles
// =============================================================================

/// Stable index of an [`Op`] in its block's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OpId(u32);

impl OpId {
    /// Get the raw index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Get the index as usize.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// "The N-th output of op P".
///
/// Two handles are the same value iff they name the same output of the same
/// op. Handles are only meaningful against the graph that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ValueState {
    op: OpId,
    index: u32,
}

impl ValueState {
    /// Producing op.
    #[inline]
    pub const fn op(self) -> OpId {
        self.op
    }

    /// Position among the producer's outputs.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }
}

impl fmt::Display for ValueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.op, self.index)
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Operation vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OpKind {
    /// Run start; its only output is the block's entry effect token.
    Start,
    /// Operand-stack slot supplied by a predecessor block.
    StackIncoming,
    /// Variable binding supplied by a predecessor block.
    VarIncoming,
    /// Global name lookup.
    Global,
    /// Literal constant.
    Const,
    /// Local variable store.
    Store,
    /// Function call.
    Call,
    /// `iter(obj)`.
    GetIter,
    /// Iterator step.
    ForIter,
    /// Binary operator.
    BinaryOp,
    /// Function return.
    Return,
}

impl OpKind {
    /// Opcode name used in diagnostics and serialized graphs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::StackIncoming => "stack.incoming",
            Self::VarIncoming => "var.incoming",
            Self::Global => "global",
            Self::Const => "const",
            Self::Store => "store",
            Self::Call => "call",
            Self::GetIter => "getiter",
            Self::ForIter => "foriter",
            Self::BinaryOp => "binaryop",
            Self::Return => "ret",
        }
    }

    /// Whether the op stands in for something outside the instruction stream.
    #[inline]
    pub const fn is_synthetic(self) -> bool {
        matches!(self, Self::Start | Self::StackIncoming | Self::VarIncoming)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A declared output port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Output {
    /// Port name.
    pub name: String,
    /// Ordering token rather than data.
    pub is_effect: bool,
}

/// One node of the dataflow graph.
#[derive(Debug, Clone, Serialize)]
pub struct Op {
    id: OpId,
    kind: OpKind,
    origin: Option<Instruction>,
    inputs: SmallVec<[(String, ValueState); 4]>,
    outputs: SmallVec<[Output; 2]>,
}

impl Op {
    /// Arena index.
    #[inline]
    pub fn id(&self) -> OpId {
        self.id
    }

    /// Operation kind.
    #[inline]
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// Instruction this op was translated from; `None` for synthetic ops.
    #[inline]
    pub fn origin(&self) -> Option<&Instruction> {
        self.origin.as_ref()
    }

    /// Inputs in binding order.
    pub fn inputs(&self) -> impl Iterator<Item = (&str, ValueState)> {
        self.inputs.iter().map(|(name, vs)| (name.as_str(), *vs))
    }

    /// Input bound under `name`.
    pub fn input(&self, name: &str) -> Option<ValueState> {
        self.inputs
            .iter()
            .find(|(input, _)| input == name)
            .map(|(_, vs)| *vs)
    }

    /// Output ports in declaration order.
    #[inline]
    pub fn output_ports(&self) -> &[Output] {
        &self.outputs
    }

    /// Output handles in declaration order.
    pub fn outputs(&self) -> impl Iterator<Item = (&str, ValueState)> {
        let id = self.id;
        self.outputs.iter().enumerate().map(move |(index, port)| {
            (
                port.name.as_str(),
                ValueState {
                    op: id,
                    index: index as u32,
                },
            )
        })
    }

    /// Output declared under `name`.
    pub fn output(&self, name: &str) -> Option<ValueState> {
        self.outputs().find(|(port, _)| *port == name).map(|(_, vs)| vs)
    }

    /// The effect token this op produces, if any.
    pub fn effect_output(&self) -> Option<ValueState> {
        self.outputs
            .iter()
            .position(|port| port.is_effect)
            .map(|index| ValueState {
                op: self.id,
                index: index as u32,
            })
    }
}

// =============================================================================
// Graph
// =============================================================================

/// Append-only arena of ops for one block.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct DataflowGraph {
    ops: Vec<Op>,
}

impl DataflowGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start constructing a new op.
    ///
    /// The op receives the next arena index; it only becomes visible once
    /// [`OpBuilder::finish`] is called.
    pub fn begin(&mut self, kind: OpKind, origin: Option<&Instruction>) -> OpBuilder<'_> {
        let id = OpId(self.ops.len() as u32);
        OpBuilder {
            graph: self,
            op: Op {
                id,
                kind,
                origin: origin.cloned(),
                inputs: SmallVec::new(),
                outputs: SmallVec::new(),
            },
        }
    }

    /// Op by id.
    #[inline]
    pub fn get(&self, id: OpId) -> Option<&Op> {
        self.ops.get(id.as_usize())
    }

    /// Op producing `value`.
    #[inline]
    pub fn producer(&self, value: ValueState) -> Option<&Op> {
        self.get(value.op)
    }

    /// Output port behind `value`.
    pub fn output(&self, value: ValueState) -> Option<&Output> {
        self.producer(value)
            .and_then(|op| op.outputs.get(value.index as usize))
    }

    /// Whether `value` is an effect token of this graph.
    pub fn is_effect(&self, value: ValueState) -> bool {
        self.output(value).is_some_and(|port| port.is_effect)
    }

    /// Port name of `value`.
    pub fn name_of(&self, value: ValueState) -> Option<&str> {
        self.output(value).map(|port| port.name.as_str())
    }

    /// All ops in creation order.
    #[inline]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Ops of one kind, in creation order.
    pub fn ops_of(&self, kind: OpKind) -> impl Iterator<Item = &Op> {
        self.ops.iter().filter(move |op| op.kind == kind)
    }

    /// Number of ops.
    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the graph has no ops.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Index<OpId> for DataflowGraph {
    type Output = Op;

    #[inline]
    fn index(&self, id: OpId) -> &Op {
        &self.ops[id.as_usize()]
    }
}

/// An op under construction.
///
/// Holds the graph mutably: no other op can be created until this one is
/// finished.
#[must_use = "an op is only added to the graph by `finish`"]
pub struct OpBuilder<'g> {
    graph: &'g mut DataflowGraph,
    op: Op,
}

impl OpBuilder<'_> {
    /// Id the op will have once finished.
    #[inline]
    pub fn id(&self) -> OpId {
        self.op.id
    }

    /// Record that the op consumes `value` under `name`.
    pub fn bind_input(&mut self, name: impl Into<String>, value: ValueState) -> &mut Self {
        self.op.inputs.push((name.into(), value));
        self
    }

    /// Declare the next data output.
    ///
    /// Declaring the same name twice on one op is a caller error.
    pub fn declare_output(&mut self, name: impl Into<String>) -> ValueState {
        self.declare(name.into(), false)
    }

    /// Declare the next output as an effect token.
    pub fn declare_effect(&mut self, name: impl Into<String>) -> ValueState {
        self.declare(name.into(), true)
    }

    fn declare(&mut self, name: String, is_effect: bool) -> ValueState {
        debug_assert!(
            self.op.outputs.iter().all(|port| port.name != name),
            "output `{name}` declared twice on {}",
            self.op.kind
        );
        let index = self.op.outputs.len() as u32;
        self.op.outputs.push(Output { name, is_effect });
        ValueState {
            op: self.op.id,
            index,
        }
    }

    /// Append the op to the graph.
    pub fn finish(self) -> OpId {
        let id = self.op.id;
        self.graph.ops.push(self.op);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bcflow_bytecode::Opcode;

    #[test]
    fn outputs_get_increasing_indices() {
        let mut graph = DataflowGraph::new();
        let mut op = graph.begin(OpKind::Call, None);
        let env = op.declare_effect("env");
        let ret = op.declare_output("ret");
        let id = op.finish();

        assert_eq!(env.op(), id);
        assert_eq!(ret.op(), id);
        assert_eq!(env.index(), 0);
        assert_eq!(ret.index(), 1);
        assert!(graph.is_effect(env));
        assert!(!graph.is_effect(ret));
        assert_eq!(graph.name_of(ret), Some("ret"));
        assert_eq!(graph[id].effect_output(), Some(env));
    }

    #[test]
    fn ids_follow_creation_order() {
        let mut graph = DataflowGraph::new();
        let mut first = graph.begin(OpKind::Const, None);
        let a = first.declare_output("out");
        first.finish();

        let mut second = graph.begin(OpKind::GetIter, None);
        second.bind_input("obj", a);
        let iter = second.declare_output("iter");
        let second_id = second.finish();

        assert_eq!(graph.len(), 2);
        assert!(a.op() < second_id);
        assert_eq!(graph[second_id].input("obj"), Some(a));
        assert_eq!(graph[second_id].output("iter"), Some(iter));
        assert_eq!(graph.producer(iter).map(Op::kind), Some(OpKind::GetIter));
    }

    #[test]
    fn unfinished_op_is_not_visible() {
        let mut graph = DataflowGraph::new();
        let mut op = graph.begin(OpKind::Const, None);
        let out = op.declare_output("out");
        drop(op);

        assert!(graph.is_empty());
        assert!(graph.output(out).is_none());
    }

    #[test]
    fn origin_is_kept_for_translated_ops() {
        let inst = Instruction::new(Opcode::LoadConst, 4).with_arg(0);
        let mut graph = DataflowGraph::new();
        let mut op = graph.begin(OpKind::Const, Some(&inst));
        op.declare_output("out");
        let id = op.finish();

        assert_eq!(graph[id].origin().map(|i| i.offset), Some(4));
        assert_eq!(graph[id].kind().to_string(), "const");
        assert!(!graph[id].kind().is_synthetic());
        assert!(OpKind::StackIncoming.is_synthetic());
    }

    #[test]
    fn value_state_display() {
        let mut graph = DataflowGraph::new();
        let mut op = graph.begin(OpKind::Start, None);
        let env = op.declare_effect("env");
        op.finish();
        assert_eq!(env.to_string(), "#0.0");
    }
}

//! Structural checks for converted blocks.
//!
//! The builder maintains these invariants by construction; the verifier
//! re-checks them on a finished [`DdgBlock`]:
//!
//! - every handle resolves to exactly one declared output
//! - every input names an op created earlier (so the graph is a DAG)
//! - the effect tokens form one linear chain from entry to exit
//! - each entry placeholder is a distinct `incoming` op

use std::collections::BTreeSet;

use thiserror::Error;

use crate::block::DdgBlock;
use crate::graph::{DataflowGraph, OpId, OpKind, ValueState};

/// An invariant violation in a converted block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Handle does not name a declared output.
    #[error("value {value} does not name a declared output")]
    DanglingValue {
        /// The handle
        value: ValueState,
    },

    /// Op stored at the wrong arena slot.
    #[error("op {found} stored at slot {slot}")]
    MisplacedOp {
        /// Arena slot
        slot: usize,
        /// Id the op carries
        found: OpId,
    },

    /// Two outputs of one op share a name.
    #[error("op {op} declares output `{name}` twice")]
    DuplicateOutput {
        /// The op
        op: OpId,
        /// Repeated name
        name: String,
    },

    /// Input reads a value not produced by an earlier op.
    #[error("op {op} input `{input}` reads {value}, which is not produced by an earlier op")]
    ForwardReference {
        /// Consuming op
        op: OpId,
        /// Input name
        input: String,
        /// Value read
        value: ValueState,
    },

    /// The `start` op is missing, repeated, or not the entry token's producer.
    #[error("entry effect {value} is not the sole output of the block's start op")]
    BadEntryEffect {
        /// Entry effect token
        value: ValueState,
    },

    /// An effect consumer read something other than the current token.
    #[error("op {op} reads effect {found}, expected current token {expected}")]
    BrokenEffectChain {
        /// Consuming op
        op: OpId,
        /// Token in effect at that point
        expected: ValueState,
        /// Token actually read
        found: ValueState,
    },

    /// Exit token is not the end of the chain.
    #[error("exit effect {found} is not the end of the effect chain ({expected})")]
    DetachedExitEffect {
        /// Last token of the chain
        expected: ValueState,
        /// Recorded exit token
        found: ValueState,
    },

    /// Entry stack slot is not a distinct `stack[K]` placeholder.
    #[error("entry stack slot {slot} ({value}) is not a distinct stack placeholder")]
    BadStackPlaceholder {
        /// Slot position
        slot: usize,
        /// Recorded value
        value: ValueState,
    },

    /// Entry variable is not a matching `var.incoming` placeholder.
    #[error("entry variable `{name}` ({value}) is not a matching variable placeholder")]
    BadVariablePlaceholder {
        /// Variable name
        name: String,
        /// Recorded value
        value: ValueState,
    },

    /// Placeholder ops exist that the boundary does not record.
    #[error("{kind} ops: {found} in graph, {recorded} recorded on the block boundary")]
    UnrecordedPlaceholder {
        /// Placeholder kind
        kind: OpKind,
        /// Count in the graph
        found: usize,
        /// Count on the boundary
        recorded: usize,
    },
}

fn resolve(graph: &DataflowGraph, value: ValueState) -> Result<(), VerifyError> {
    match graph.output(value) {
        Some(_) => Ok(()),
        None => Err(VerifyError::DanglingValue { value }),
    }
}

/// Check a converted block's invariants.
pub fn verify_block(block: &DdgBlock) -> Result<(), VerifyError> {
    let graph = block.graph();
    check_ops(graph)?;
    check_boundary_handles(block)?;
    check_effect_chain(block)?;
    check_placeholders(block)
}

fn check_ops(graph: &DataflowGraph) -> Result<(), VerifyError> {
    for (slot, op) in graph.ops().iter().enumerate() {
        if op.id().as_usize() != slot {
            return Err(VerifyError::MisplacedOp {
                slot,
                found: op.id(),
            });
        }

        let mut names = BTreeSet::new();
        for port in op.output_ports() {
            if !names.insert(port.name.as_str()) {
                return Err(VerifyError::DuplicateOutput {
                    op: op.id(),
                    name: port.name.clone(),
                });
            }
        }

        for (input, value) in op.inputs() {
            if value.op() >= op.id() || graph.output(value).is_none() {
                return Err(VerifyError::ForwardReference {
                    op: op.id(),
                    input: input.to_string(),
                    value,
                });
            }
        }
    }
    Ok(())
}

fn check_boundary_handles(block: &DdgBlock) -> Result<(), VerifyError> {
    let graph = block.graph();
    resolve(graph, block.in_effect())?;
    resolve(graph, block.out_effect())?;
    block
        .in_stackvars()
        .iter()
        .chain(block.out_stackvars())
        .chain(block.in_vars().values())
        .chain(block.out_vars().values())
        .try_for_each(|value| resolve(graph, *value))
}

fn check_effect_chain(block: &DdgBlock) -> Result<(), VerifyError> {
    let graph = block.graph();
    let entry = block.in_effect();

    let starts: Vec<&_> = graph.ops_of(OpKind::Start).collect();
    let entry_ok = starts.len() == 1
        && starts[0].id() == entry.op()
        && starts[0].output_ports().len() == 1
        && graph.is_effect(entry);
    if !entry_ok {
        return Err(VerifyError::BadEntryEffect { value: entry });
    }

    let mut current = entry;
    for op in graph.ops().iter().filter(|op| op.kind() != OpKind::Start) {
        let reads = op.input("env");
        let produces = op.effect_output();

        if let Some(found) = reads {
            if found != current {
                return Err(VerifyError::BrokenEffectChain {
                    op: op.id(),
                    expected: current,
                    found,
                });
            }
        }

        if let Some(next) = produces {
            // A producer must also consume the token it replaces.
            if reads.is_none() {
                return Err(VerifyError::BrokenEffectChain {
                    op: op.id(),
                    expected: current,
                    found: next,
                });
            }
            current = next;
        }
    }

    if current != block.out_effect() {
        return Err(VerifyError::DetachedExitEffect {
            expected: current,
            found: block.out_effect(),
        });
    }
    Ok(())
}

fn check_placeholders(block: &DdgBlock) -> Result<(), VerifyError> {
    let graph = block.graph();

    let mut seen = BTreeSet::new();
    for (slot, value) in block.in_stackvars().iter().enumerate() {
        let ok = graph.producer(*value).is_some_and(|op| {
            op.kind() == OpKind::StackIncoming && op.output_ports().len() == 1
        }) && graph.name_of(*value) == Some(format!("stack[{slot}]").as_str())
            && seen.insert(value.op());
        if !ok {
            return Err(VerifyError::BadStackPlaceholder {
                slot,
                value: *value,
            });
        }
    }

    for (name, value) in block.in_vars() {
        let ok = graph
            .producer(*value)
            .is_some_and(|op| op.kind() == OpKind::VarIncoming)
            && graph.name_of(*value) == Some(name.as_str());
        if !ok {
            return Err(VerifyError::BadVariablePlaceholder {
                name: name.clone(),
                value: *value,
            });
        }
    }

    for (kind, recorded) in [
        (OpKind::StackIncoming, block.in_stackvars().len()),
        (OpKind::VarIncoming, block.in_vars().len()),
    ] {
        let found = graph.ops_of(kind).count();
        if found != recorded {
            return Err(VerifyError::UnrecordedPlaceholder {
                kind,
                found,
                recorded,
            });
        }
    }
    Ok(())
}

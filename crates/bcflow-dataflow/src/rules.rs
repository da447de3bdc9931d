//! Instruction translation rules.
//!
//! One rule per supported opcode. Each rule pops/pushes through the
//! [`StackSimulator`], allocates at most one op, and threads the effect token
//! when the instruction is side-effecting. Rules always take their stack
//! operands before opening the op they feed, so every input names an op
//! finished earlier.
//!
//! Anything outside the supported set fails with
//! [`BuildError::UnsupportedInstruction`].

use bcflow_bytecode::{Instruction, Opcode};
use tracing::trace;

use crate::error::{BuildError, BuildResult};
use crate::graph::OpKind;
use crate::simulator::StackSimulator;

/// Opcodes with a translation rule.
pub const SUPPORTED_OPCODES: &[Opcode] = &[
    Opcode::Resume,
    Opcode::LoadGlobal,
    Opcode::LoadConst,
    Opcode::StoreFast,
    Opcode::LoadFast,
    Opcode::Precall,
    Opcode::Call,
    Opcode::GetIter,
    Opcode::ForIter,
    Opcode::BinaryOp,
    Opcode::ReturnValue,
    Opcode::JumpBackward,
];

/// Largest `CALL` argument count accepted: one oparg byte.
pub const MAX_CALL_ARGS: usize = u8::MAX as usize;

/// Whether `opcode` has a translation rule.
#[inline]
pub fn is_supported_opcode(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Resume
            | Opcode::LoadGlobal
            | Opcode::LoadConst
            | Opcode::StoreFast
            | Opcode::LoadFast
            | Opcode::Precall
            | Opcode::Call
            | Opcode::GetIter
            | Opcode::ForIter
            | Opcode::BinaryOp
            | Opcode::ReturnValue
            | Opcode::JumpBackward
    )
}

fn unsupported(instruction: &Instruction) -> BuildError {
    BuildError::UnsupportedInstruction {
        opcode: instruction.opcode,
        offset: instruction.offset,
    }
}

fn missing_operand(instruction: &Instruction) -> BuildError {
    BuildError::MissingOperand {
        opcode: instruction.opcode,
        offset: instruction.offset,
    }
}

fn name_operand(instruction: &Instruction) -> BuildResult<&str> {
    instruction.name().ok_or_else(|| missing_operand(instruction))
}

fn count_operand(instruction: &Instruction, max: usize) -> BuildResult<usize> {
    let value = instruction
        .int_arg()
        .ok_or_else(|| missing_operand(instruction))?;
    usize::try_from(value)
        .ok()
        .filter(|count| *count <= max)
        .ok_or(BuildError::InvalidOperand {
            opcode: instruction.opcode,
            offset: instruction.offset,
            value,
        })
}

/// Translate one instruction into `sim`.
pub fn translate(sim: &mut StackSimulator, instruction: &Instruction) -> BuildResult<()> {
    trace!(
        target: "bcflow::dataflow",
        offset = instruction.offset,
        opcode = %instruction.opcode,
        depth = sim.stack().len(),
        "translate"
    );

    match instruction.opcode {
        // Markers: frame entry, call setup, loop latch. Control flow is
        // already encoded in the region tree.
        Opcode::Resume | Opcode::Precall | Opcode::JumpBackward => {}
        Opcode::LoadGlobal => load_global(sim, instruction),
        Opcode::LoadConst => load_const(sim, instruction),
        Opcode::StoreFast => store_fast(sim, instruction)?,
        Opcode::LoadFast => load_fast(sim, instruction)?,
        Opcode::Call => call(sim, instruction)?,
        Opcode::GetIter => get_iter(sim, instruction),
        Opcode::ForIter => for_iter(sim, instruction),
        Opcode::BinaryOp => binary_op(sim, instruction),
        Opcode::ReturnValue => return_value(sim, instruction),
        _ => return Err(unsupported(instruction)),
    }

    Ok(())
}

fn load_global(sim: &mut StackSimulator, instruction: &Instruction) {
    let env = sim.effect();
    let mut op = sim.graph_mut().begin(OpKind::Global, Some(instruction));
    op.bind_input("env", env);
    op.declare_output("value");
    let out = op.declare_output("out");
    op.finish();
    sim.push(out);
}

fn load_const(sim: &mut StackSimulator, instruction: &Instruction) {
    let mut op = sim.graph_mut().begin(OpKind::Const, Some(instruction));
    let out = op.declare_output("out");
    op.finish();
    sim.push(out);
}

fn store_fast(sim: &mut StackSimulator, instruction: &Instruction) -> BuildResult<()> {
    let name = name_operand(instruction)?;
    let tos = sim.pop();
    let mut op = sim.graph_mut().begin(OpKind::Store, Some(instruction));
    op.bind_input("value", tos);
    let stored = op.declare_output(name);
    op.finish();
    sim.store(name, stored);
    Ok(())
}

fn load_fast(sim: &mut StackSimulator, instruction: &Instruction) -> BuildResult<()> {
    let name = name_operand(instruction)?;
    let value = sim.load(name);
    sim.push(value);
    Ok(())
}

fn call(sim: &mut StackSimulator, instruction: &Instruction) -> BuildResult<()> {
    let argc = count_operand(instruction, MAX_CALL_ARGS)?;
    let callee = sim.pop();
    // One argument beyond `argc` sits under the callee; it is popped first
    // and ends up last in source order.
    let mut args = vec![sim.pop()];
    for _ in 0..argc {
        args.push(sim.pop());
    }
    args.reverse();

    let env = sim.effect();
    let mut op = sim.graph_mut().begin(OpKind::Call, Some(instruction));
    op.bind_input("env", env);
    op.bind_input("callee", callee);
    for (i, arg) in args.into_iter().enumerate() {
        op.bind_input(format!("arg.{i}"), arg);
    }
    let effect = op.declare_effect("env");
    let ret = op.declare_output("ret");
    op.finish();

    sim.replace_effect(effect);
    sim.push(ret);
    Ok(())
}

fn get_iter(sim: &mut StackSimulator, instruction: &Instruction) {
    let tos = sim.pop();
    let mut op = sim.graph_mut().begin(OpKind::GetIter, Some(instruction));
    op.bind_input("obj", tos);
    let iter = op.declare_output("iter");
    op.finish();
    sim.push(iter);
}

fn for_iter(sim: &mut StackSimulator, instruction: &Instruction) {
    let tos = sim.pop();
    let mut op = sim.graph_mut().begin(OpKind::ForIter, Some(instruction));
    op.bind_input("iter", tos);
    let indvar = op.declare_output("indvar");
    op.finish();
    sim.push(indvar);
}

fn binary_op(sim: &mut StackSimulator, instruction: &Instruction) {
    let rhs = sim.pop();
    let lhs = sim.pop();
    trace!(
        target: "bcflow::dataflow",
        operator = instruction.binary_operator().map_or("?", |op| op.symbol()),
        %lhs,
        %rhs,
        "binary op"
    );
    let env = sim.effect();
    let mut op = sim.graph_mut().begin(OpKind::BinaryOp, Some(instruction));
    op.bind_input("env", env);
    op.bind_input("lhs", lhs);
    op.bind_input("rhs", rhs);
    let effect = op.declare_effect("env");
    let out = op.declare_output("out");
    op.finish();
    sim.replace_effect(effect);
    sim.push(out);
}

fn return_value(sim: &mut StackSimulator, instruction: &Instruction) {
    let tos = sim.pop();
    let env = sim.effect();
    let mut op = sim.graph_mut().begin(OpKind::Return, Some(instruction));
    op.bind_input("env", env);
    op.bind_input("retval", tos);
    let effect = op.declare_effect("env");
    op.finish();
    sim.replace_effect(effect);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bcflow_bytecode::{ArgValue, Constant};

    fn run(instructions: &[Instruction]) -> StackSimulator {
        let mut sim = StackSimulator::new();
        for inst in instructions {
            translate(&mut sim, inst).expect("instruction should translate");
        }
        sim
    }

    fn name(opcode: Opcode, offset: u32, name: &str) -> Instruction {
        Instruction::new(opcode, offset)
            .with_arg(0)
            .with_argval(ArgValue::Name(name.into()))
    }

    fn konst(offset: u32, value: i64) -> Instruction {
        Instruction::new(Opcode::LoadConst, offset)
            .with_arg(0)
            .with_argval(ArgValue::Const(Constant::Int(value)))
    }

    #[test]
    fn supported_table_matches_predicate() {
        for op in Opcode::ALL {
            assert_eq!(
                SUPPORTED_OPCODES.contains(op),
                is_supported_opcode(*op),
                "{op}"
            );
        }
    }

    #[test]
    fn markers_are_noops() {
        let sim = run(&[
            Instruction::new(Opcode::Resume, 0).with_arg(0),
            Instruction::new(Opcode::Precall, 2).with_arg(0),
            Instruction::new(Opcode::JumpBackward, 4).with_argval(ArgValue::Target(0)),
        ]);
        assert_eq!(sim.graph().len(), 1);
        assert!(sim.stack().is_empty());
        assert_eq!(sim.effect(), sim.in_effect());
    }

    #[test]
    fn load_global_reads_effect_without_replacing_it() {
        let sim = run(&[name(Opcode::LoadGlobal, 2, "print")]);
        let top = sim.stack()[0];
        let op = sim.graph().producer(top).unwrap();

        assert_eq!(op.kind(), OpKind::Global);
        assert_eq!(op.input("env"), Some(sim.in_effect()));
        let names: Vec<&str> = op.outputs().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["value", "out"]);
        assert_eq!(sim.graph().name_of(top), Some("out"));
        assert_eq!(sim.effect(), sim.in_effect());
    }

    #[test]
    fn store_fast_declares_output_named_after_variable() {
        let sim = run(&[konst(0, 1), name(Opcode::StoreFast, 2, "x")]);
        let x = sim.vars()["x"];
        let op = sim.graph().producer(x).unwrap();

        assert_eq!(op.kind(), OpKind::Store);
        assert_eq!(sim.graph().name_of(x), Some("x"));
        assert_eq!(
            op.input("value").and_then(|v| sim.graph().producer(v)).map(|p| p.kind()),
            Some(OpKind::Const)
        );
        assert!(sim.stack().is_empty());
    }

    #[test]
    fn load_fast_creates_no_node() {
        let sim = run(&[
            konst(0, 1),
            name(Opcode::StoreFast, 2, "x"),
            name(Opcode::LoadFast, 4, "x"),
        ]);
        assert_eq!(sim.graph().len(), 3);
        assert_eq!(sim.stack(), &[sim.vars()["x"]]);
    }

    #[test]
    fn call_pops_callee_extra_and_argc_arguments() {
        let mut sim = StackSimulator::new();
        let values: Vec<_> = (0..4)
            .map(|i| {
                translate(&mut sim, &konst(i * 2, i64::from(i))).unwrap();
                sim.stack()[i as usize]
            })
            .collect();
        translate(&mut sim, &Instruction::new(Opcode::Call, 8).with_arg(2)).unwrap();

        let ret = sim.stack()[0];
        assert_eq!(sim.stack().len(), 1);
        let op = sim.graph().producer(ret).unwrap();
        let inputs: Vec<(&str, _)> = op.inputs().collect();
        assert_eq!(
            inputs,
            vec![
                ("env", sim.in_effect()),
                ("callee", values[3]),
                ("arg.0", values[0]),
                ("arg.1", values[1]),
                ("arg.2", values[2]),
            ]
        );
        assert_eq!(op.effect_output(), Some(sim.effect()));
        assert_eq!(sim.graph().name_of(ret), Some("ret"));
    }

    #[test]
    fn binary_op_pops_rhs_first() {
        let sim = run(&[
            konst(0, 1),
            konst(2, 2),
            Instruction::new(Opcode::BinaryOp, 4).with_arg(10),
        ]);
        let out = sim.stack()[0];
        let op = sim.graph().producer(out).unwrap();
        let lhs = op.input("lhs").unwrap();
        let rhs = op.input("rhs").unwrap();

        assert!(lhs.op() < rhs.op());
        assert_eq!(op.input("env"), Some(sim.in_effect()));
        assert_eq!(op.effect_output(), Some(sim.effect()));
        assert_eq!(
            op.origin().and_then(Instruction::binary_operator).map(|o| o.symbol()),
            Some("-")
        );
    }

    #[test]
    fn iterator_rules_chain() {
        let sim = run(&[
            name(Opcode::LoadGlobal, 0, "range"),
            Instruction::new(Opcode::GetIter, 2),
            Instruction::new(Opcode::ForIter, 4).with_argval(ArgValue::Target(20)),
        ]);
        let indvar = sim.stack()[0];
        let foriter = sim.graph().producer(indvar).unwrap();
        let iter = foriter.input("iter").unwrap();
        let getiter = sim.graph().producer(iter).unwrap();

        assert_eq!(foriter.kind(), OpKind::ForIter);
        assert_eq!(sim.graph().name_of(indvar), Some("indvar"));
        assert_eq!(getiter.kind(), OpKind::GetIter);
        assert!(getiter.input("obj").is_some());
    }

    #[test]
    fn return_value_threads_effect_and_pushes_nothing() {
        let sim = run(&[konst(0, 0), Instruction::new(Opcode::ReturnValue, 2)]);
        assert!(sim.stack().is_empty());
        let ret = sim.graph().producer(sim.effect()).unwrap();
        assert_eq!(ret.kind(), OpKind::Return);
        assert_eq!(ret.input("env"), Some(sim.in_effect()));
        assert!(ret.input("retval").is_some());
    }

    #[test]
    fn unsupported_opcode_reports_name_and_offset() {
        let mut sim = StackSimulator::new();
        let err = translate(&mut sim, &Instruction::new(Opcode::PopTop, 14)).unwrap_err();
        assert_eq!(
            err,
            BuildError::UnsupportedInstruction {
                opcode: Opcode::PopTop,
                offset: 14
            }
        );
        assert_eq!(err.to_string(), "unsupported instruction at offset 14: POP_TOP");
    }

    #[test]
    fn missing_operands_are_reported() {
        let mut sim = StackSimulator::new();
        let err = translate(&mut sim, &Instruction::new(Opcode::StoreFast, 6)).unwrap_err();
        assert_eq!(
            err,
            BuildError::MissingOperand {
                opcode: Opcode::StoreFast,
                offset: 6
            }
        );
        let err = translate(&mut sim, &Instruction::new(Opcode::Call, 8)).unwrap_err();
        assert_eq!(err.offset(), Some(8));
    }

    #[test]
    fn oversized_call_count_is_rejected() {
        for (instruction, value) in [
            (
                Instruction::new(Opcode::Call, 10).with_argval(ArgValue::Int(i64::MAX)),
                i64::MAX,
            ),
            (
                Instruction::new(Opcode::Call, 10).with_arg(u32::MAX),
                i64::from(u32::MAX),
            ),
            (
                Instruction::new(Opcode::Call, 10).with_argval(ArgValue::Int(-1)),
                -1,
            ),
            (Instruction::new(Opcode::Call, 10).with_arg(256), 256),
        ] {
            let mut sim = StackSimulator::new();
            let err = translate(&mut sim, &instruction).unwrap_err();
            assert_eq!(
                err,
                BuildError::InvalidOperand {
                    opcode: Opcode::Call,
                    offset: 10,
                    value
                }
            );
            // Rejected before touching the stack.
            assert_eq!(sim.graph().len(), 1);
        }
    }

    #[test]
    fn largest_call_count_is_accepted() {
        let sim = run(&[Instruction::new(Opcode::Call, 0).with_arg(MAX_CALL_ARGS as u32)]);
        let call = sim.graph().producer(sim.effect()).unwrap();
        assert_eq!(sim.incoming_stack().len(), MAX_CALL_ARGS + 2);
        assert!(call.input(&format!("arg.{MAX_CALL_ARGS}")).is_some());
    }
}

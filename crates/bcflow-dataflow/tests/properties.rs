//! Property tests: random straight-line blocks over the supported opcodes.

use bcflow_bytecode::{ArgValue, Constant, INSTRUCTION_WIDTH, Instruction, InstructionTable, Opcode};
use bcflow_dataflow::{BytecodeBlock, DdgBlock, OpKind, StackSimulator, convert_block, verify_block};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Marker(Opcode),
    LoadGlobal(&'static str),
    LoadConst(i64),
    StoreFast(&'static str),
    LoadFast(&'static str),
    Call(u32),
    GetIter,
    ForIter,
    BinaryOp(u32),
    ReturnValue,
}

const NAMES: &[&str] = &["a", "b", "c", "d"];

impl Step {
    fn instruction(&self, offset: u32) -> Instruction {
        let named = |opcode, name: &str| {
            Instruction::new(opcode, offset)
                .with_arg(0)
                .with_argval(ArgValue::Name(name.into()))
        };
        match self {
            Step::Marker(opcode) => Instruction::new(*opcode, offset).with_arg(0),
            Step::LoadGlobal(name) => named(Opcode::LoadGlobal, name),
            Step::LoadConst(value) => Instruction::new(Opcode::LoadConst, offset)
                .with_arg(0)
                .with_argval(ArgValue::Const(Constant::Int(*value))),
            Step::StoreFast(name) => named(Opcode::StoreFast, name),
            Step::LoadFast(name) => named(Opcode::LoadFast, name),
            Step::Call(argc) => Instruction::new(Opcode::Call, offset).with_arg(*argc),
            Step::GetIter => Instruction::new(Opcode::GetIter, offset),
            Step::ForIter => Instruction::new(Opcode::ForIter, offset)
                .with_argval(ArgValue::Target(offset + 100)),
            Step::BinaryOp(arg) => Instruction::new(Opcode::BinaryOp, offset).with_arg(*arg),
            Step::ReturnValue => Instruction::new(Opcode::ReturnValue, offset),
        }
    }

    /// Values popped and pushed.
    fn stack_effect(&self) -> (usize, usize) {
        match self {
            Step::Marker(_) => (0, 0),
            Step::LoadGlobal(_) | Step::LoadConst(_) | Step::LoadFast(_) => (0, 1),
            Step::StoreFast(_) | Step::ReturnValue => (1, 0),
            Step::Call(argc) => (*argc as usize + 2, 1),
            Step::GetIter | Step::ForIter => (1, 1),
            Step::BinaryOp(_) => (2, 1),
        }
    }

    fn has_effect(&self) -> bool {
        matches!(self, Step::Call(_) | Step::BinaryOp(_) | Step::ReturnValue)
    }
}

fn step() -> impl Strategy<Value = Step> {
    let name = prop::sample::select(NAMES);
    prop_oneof![
        prop::sample::select(vec![Opcode::Resume, Opcode::Precall, Opcode::JumpBackward])
            .prop_map(Step::Marker),
        name.clone().prop_map(Step::LoadGlobal),
        any::<i64>().prop_map(Step::LoadConst),
        name.clone().prop_map(Step::StoreFast),
        name.prop_map(Step::LoadFast),
        (0u32..4).prop_map(Step::Call),
        Just(Step::GetIter),
        Just(Step::ForIter),
        (0u32..26).prop_map(Step::BinaryOp),
        Just(Step::ReturnValue),
    ]
}

fn convert(steps: &[Step]) -> DdgBlock {
    let table = InstructionTable::from_instructions(
        steps
            .iter()
            .enumerate()
            .map(|(i, step)| step.instruction(i as u32 * INSTRUCTION_WIDTH)),
    )
    .unwrap();
    let block = BytecodeBlock {
        label: "random".into(),
        begin: 0,
        end: steps.len() as u32 * INSTRUCTION_WIDTH,
        jump_targets: Vec::new(),
        backedges: Vec::new(),
    };
    convert_block(&block, &table).unwrap()
}

/// Expected (underflow count, final depth).
fn stack_model(steps: &[Step]) -> (usize, usize) {
    let mut depth = 0usize;
    let mut underflow = 0usize;
    for step in steps {
        let (pops, pushes) = step.stack_effect();
        for _ in 0..pops {
            if depth == 0 {
                underflow += 1;
            } else {
                depth -= 1;
            }
        }
        depth += pushes;
    }
    (underflow, depth)
}

proptest! {
    #[test]
    fn random_blocks_verify(steps in prop::collection::vec(step(), 0..40)) {
        let block = convert(&steps);
        prop_assert_eq!(verify_block(&block), Ok(()));
    }

    #[test]
    fn placeholders_match_underflow(steps in prop::collection::vec(step(), 0..40)) {
        let block = convert(&steps);
        let (underflow, depth) = stack_model(&steps);
        prop_assert_eq!(block.in_stackvars().len(), underflow);
        prop_assert_eq!(block.out_stackvars().len(), depth);
        prop_assert_eq!(block.graph().ops_of(OpKind::StackIncoming).count(), underflow);
    }

    #[test]
    fn effect_chain_follows_effectful_instructions(steps in prop::collection::vec(step(), 0..40)) {
        let block = convert(&steps);
        let expected = steps.iter().filter(|step| step.has_effect()).count();
        let chain = block.effect_chain();
        prop_assert_eq!(chain.len(), expected);
        if expected == 0 {
            prop_assert_eq!(block.out_effect(), block.in_effect());
        } else {
            prop_assert_eq!(chain.last().copied(), Some(block.out_effect()));
        }
    }

    #[test]
    fn inputs_reference_earlier_ops(steps in prop::collection::vec(step(), 0..40)) {
        let block = convert(&steps);
        for op in block.graph().ops() {
            for (_, value) in op.inputs() {
                prop_assert!(value.op() < op.id());
            }
        }
    }

    #[test]
    fn variable_placeholders_are_loads_before_stores(steps in prop::collection::vec(step(), 0..40)) {
        let block = convert(&steps);
        let mut stored = std::collections::BTreeSet::new();
        let mut expected = std::collections::BTreeSet::new();
        for step in &steps {
            match step {
                Step::StoreFast(name) => {
                    stored.insert(*name);
                }
                Step::LoadFast(name) if !stored.contains(name) => {
                    expected.insert(*name);
                }
                _ => {}
            }
        }
        let found: std::collections::BTreeSet<&str> =
            block.in_vars().keys().map(String::as_str).collect();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn repeated_load_is_idempotent(name in prop::sample::select(NAMES), times in 1usize..6) {
        let mut sim = StackSimulator::new();
        let first = sim.load(name);
        for _ in 1..times {
            prop_assert_eq!(sim.load(name), first);
        }
        prop_assert_eq!(sim.graph().len(), 2);
        prop_assert_eq!(sim.incoming_vars().len(), 1);
    }
}

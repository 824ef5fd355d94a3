//! SSA edge arity: every branch must supply exactly as many arguments as
//! its target block declares parameters, and the entry block's parameter
//! count must match the function's. Checked both against the fixed
//! Fibonacci scenario and, generally, against relay-shaped control flow of
//! varying depth.

use crate::function::InstructionIndex;
use crate::program::ProgramFragment;
use crate::ssa::{construct, SsaBranch, SsaFunction};
use crate::tests::fibonacci;
use crate::value::Value;

/// Every `(target_block, argument_count)` pair a function's branches wire
/// up, read off its already-built SSA form.
fn edges(ssa: &SsaFunction) -> Vec<(usize, usize)> {
    ssa.blocks
        .iter()
        .flat_map(|block| match &block.branch {
            SsaBranch::Unreachable | SsaBranch::Return { .. } => vec![],
            SsaBranch::Unconditional { block, arguments } => vec![(*block, arguments.len())],
            SsaBranch::Conditional {
                true_block,
                true_arguments,
                false_block,
                false_arguments,
                ..
            } => vec![
                (*true_block, true_arguments.len()),
                (*false_block, false_arguments.len()),
            ],
        })
        .collect()
}

fn assert_edge_arity_holds(ssa: &SsaFunction) {
    for (target, argument_count) in edges(ssa) {
        assert_eq!(
            argument_count,
            ssa.blocks[target].parameters.len(),
            "block{target} declares {} parameters but an edge supplied {argument_count} arguments",
            ssa.blocks[target].parameters.len()
        );
    }
}

#[test]
fn every_edge_arity_matches_its_targets_parameter_count() {
    let (program, fib_id) = fibonacci::build();
    let function = program.function(fib_id);
    let ssa = construct(function);

    assert_eq!(ssa.parameter_count, 1);
    assert_eq!(ssa.blocks[0].parameters.len(), 1);
    assert_edge_arity_holds(&ssa);
}

/// `1..=6` Dups before a conditional branch, each leaf needing only the
/// function's one declared return value: deepens the entry block's exit
/// stack by a random amount beyond what either successor consumes, the
/// shape `slice_to_arity` exists to trim.
#[derive(Clone, Copy, Debug)]
struct RelayDepth(u8);

impl quickcheck::Arbitrary for RelayDepth {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        RelayDepth(1 + u8::arbitrary(g) % 6)
    }
}

fn build_relay(depth: u8) -> SsaFunction {
    let mut program = ProgramFragment::<fibonacci::FibSet>::new();
    let id = program.declare("relay", 1, 1);
    let f = program.function_mut(id);

    for _ in 0..depth {
        f.append::<fibonacci::Dup>(&[]);
    }
    let branch = f.append_jump_if_placeholder();
    f.append_return();

    let taken = InstructionIndex(f.len());
    f.set_value(branch, 0, Value::new(taken - branch.start)).unwrap();
    f.append_return();

    construct(f)
}

#[quickcheck_macros::quickcheck]
fn relay_depth_never_breaks_edge_arity(depth: RelayDepth) -> bool {
    let ssa = build_relay(depth.0);
    edges(&ssa)
        .into_iter()
        .all(|(target, argument_count)| argument_count == ssa.blocks[target].parameters.len())
}

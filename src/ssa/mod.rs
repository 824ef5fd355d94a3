//! Conversion of a function's flat instruction stream into basic blocks
//! of static single assignment form.
//!
//! The algorithm mirrors the source project's `StackToSsaConverter`:
//! discover block boundaries from jump targets, walk each block
//! simulating the value stack symbolically (lazily inventing block
//! parameters whenever a block demands more stack depth than it
//! produced itself), and synthesize each block's terminator from
//! whichever of `Jump`/`JumpIf`/`JumpIfNot`/`Return` ended it, or an
//! implicit fallthrough `Unconditional` edge if none did.

pub mod coalesce;

use std::fmt;

use crate::function::Function;
use crate::instruction::{Arity, InstructionSet, InstructionSpecification, OpCode};
use crate::value::Value;

/// A function-unique virtual register introduced either as a block
/// parameter or as an instruction's output.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SsaRegister(pub u64);

impl fmt::Display for SsaRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Either a compile-time-known value or a virtual register.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum SsaValue {
    Immediate(Value),
    Register(SsaRegister),
}

impl SsaValue {
    pub fn is_register(&self) -> bool {
        matches!(self, SsaValue::Register(_))
    }
}

impl fmt::Display for SsaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsaValue::Immediate(v) => write!(f, "{v:?}"),
            SsaValue::Register(r) => write!(f, "{r}"),
        }
    }
}

/// A single instruction in SSA form. `arguments` lays out this
/// instruction's immediates, then its stack inputs, then its freshly
/// introduced output registers, in that order; `immediate_count` and
/// `output_count` mark the boundaries.
#[derive(Clone, Debug)]
pub struct SsaInstruction {
    pub opcode: OpCode,
    pub immediate_count: usize,
    pub output_count: usize,
    pub arguments: Vec<SsaValue>,
}

impl SsaInstruction {
    pub fn immediates(&self) -> &[SsaValue] {
        &self.arguments[..self.immediate_count]
    }

    pub fn inputs(&self) -> &[SsaValue] {
        &self.arguments[self.immediate_count..self.arguments.len() - self.output_count]
    }

    pub fn outputs(&self) -> &[SsaValue] {
        &self.arguments[self.arguments.len() - self.output_count..]
    }
}

/// How a basic block hands control to its successor(s).
#[derive(Clone, Debug)]
pub enum SsaBranch {
    /// Execution can never reach the block's end (reserved for future
    /// use by instructions that always diverge; no construction path
    /// currently produces this).
    Unreachable,
    Unconditional {
        block: usize,
        arguments: Vec<SsaValue>,
    },
    Conditional {
        condition: SsaValue,
        true_block: usize,
        true_arguments: Vec<SsaValue>,
        false_block: usize,
        false_arguments: Vec<SsaValue>,
    },
    Return {
        arguments: Vec<SsaValue>,
    },
}

#[derive(Clone, Debug)]
pub struct SsaBasicBlock {
    pub parameters: Vec<SsaRegister>,
    pub instructions: Vec<SsaInstruction>,
    pub branch: SsaBranch,
}

impl fmt::Display for SsaBasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        writeln!(f, "):")?;
        for inst in &self.instructions {
            write!(f, "  opcode#{}(", inst.opcode.0)?;
            for (i, a) in inst.arguments.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{a}")?;
            }
            writeln!(f, ")")?;
        }
        match &self.branch {
            SsaBranch::Unreachable => writeln!(f, "  unreachable"),
            SsaBranch::Unconditional { block, arguments } => {
                writeln!(f, "  jump block{block}({})", display_list(arguments))
            }
            SsaBranch::Conditional {
                condition,
                true_block,
                true_arguments,
                false_block,
                false_arguments,
            } => writeln!(
                f,
                "  branch {condition} ? block{true_block}({}) : block{false_block}({})",
                display_list(true_arguments),
                display_list(false_arguments)
            ),
            SsaBranch::Return { arguments } => writeln!(f, "  return {}", display_list(arguments)),
        }
    }
}

fn display_list(values: &[SsaValue]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A function's full SSA representation: one basic block per entry,
/// block 0 is always the entry block.
#[derive(Clone, Debug)]
pub struct SsaFunction {
    pub parameter_count: u32,
    pub return_count: u32,
    pub blocks: Vec<SsaBasicBlock>,
}

impl fmt::Display for SsaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            write!(f, "block{i}")?;
            block.fmt(f)?;
        }
        Ok(())
    }
}

struct SymbolicStack {
    values: Vec<SsaValue>,
    block_parameters: Vec<SsaRegister>,
}

impl SymbolicStack {
    fn new() -> Self {
        SymbolicStack {
            values: Vec::new(),
            block_parameters: Vec::new(),
        }
    }

    fn ensure_size(&mut self, n: usize, registers: &mut u64) {
        while self.values.len() < n {
            let r = SsaRegister(*registers);
            *registers += 1;
            self.block_parameters.insert(0, r);
            self.values.insert(0, SsaValue::Register(r));
        }
    }

    fn take_top(&mut self, n: usize, registers: &mut u64, consume: bool) -> Vec<SsaValue> {
        self.ensure_size(n, registers);
        let start = self.values.len() - n;
        if consume {
            self.values.split_off(start)
        } else {
            self.values[start..].to_vec()
        }
    }

    fn push_fresh(&mut self, n: usize, registers: &mut u64) -> Vec<SsaRegister> {
        let outputs: Vec<SsaRegister> = (0..n)
            .map(|_| {
                let r = SsaRegister(*registers);
                *registers += 1;
                r
            })
            .collect();
        self.values
            .extend(outputs.iter().map(|r| SsaValue::Register(*r)));
        outputs
    }
}

fn block_boundaries<Set: InstructionSet>(cells: &[Value]) -> Vec<usize> {
    let metadata = Set::metadata();
    let mut boundaries = vec![0usize, cells.len()];
    let mut ip = 0usize;
    while ip < cells.len() {
        let opcode = cells[ip].as_type::<OpCode>();
        let meta = &metadata[opcode.0 as usize];
        if matches!(opcode, OpCode::JUMP | OpCode::JUMP_IF | OpCode::JUMP_IF_NOT) {
            let after = ip + 1 + meta.immediate_value_count;
            let offset = cells[ip + 1].as_type::<isize>();
            let target = (ip as isize + offset) as usize;
            boundaries.push(after);
            boundaries.push(target);
            ip = after;
        } else if opcode == OpCode::RETURN {
            ip += 1;
        } else {
            ip += 1 + meta.immediate_value_count;
        }
    }
    boundaries.sort_unstable();
    boundaries.dedup();
    boundaries
}

fn block_index_of(boundaries: &[usize], offset: usize) -> usize {
    boundaries
        .binary_search(&offset)
        .expect("jump target does not land on a block boundary")
}

/// Truncates `arguments` to its last `arity` elements, the deepest-first
/// slice a target block with `arity` parameters actually consumes. A
/// block's own exit stack can run deeper than any one successor needs
/// (unconsumed values still in scope at the branch point); this is the
/// second pass `SsaFunction::Initialize` runs once every block's
/// parameter count is known, here applied after all blocks are built
/// rather than eagerly, since a branch's target may not have been walked
/// yet when the branch itself is constructed.
fn slice_to_arity(arguments: &mut Vec<SsaValue>, arity: usize) {
    debug_assert!(
        arguments.len() >= arity,
        "branch supplies {} value(s) but its target declares {arity} parameter(s)",
        arguments.len()
    );
    let start = arguments.len().saturating_sub(arity);
    arguments.drain(..start);
}

/// Builds the SSA representation of `function`.
pub fn construct<Set: InstructionSet>(function: &Function<Set>) -> SsaFunction {
    let cells = function.cells();
    let metadata = Set::metadata();
    let boundaries = block_boundaries::<Set>(cells);
    let mut registers = 0u64;
    let mut blocks = Vec::with_capacity(boundaries.len().saturating_sub(1));

    for w in boundaries.windows(2) {
        let (start, end) = (w[0], w[1]);
        let mut stack = SymbolicStack::new();
        let mut instructions = Vec::new();
        let mut ip = start;
        let branch = loop {
            if ip >= end {
                // Fell off the end of the block without hitting a
                // terminator: an implicit fallthrough edge to the next
                // block, handing over whatever the stack holds so far.
                // The next block's own lazy parameter growth settles how
                // much of it it actually needs.
                let target_block = block_index_of(&boundaries, end);
                break SsaBranch::Unconditional {
                    block: target_block,
                    arguments: stack.values.clone(),
                };
            }
            let opcode = cells[ip].as_type::<OpCode>();
            match opcode {
                OpCode::RETURN => {
                    let args = stack.take_top(function.return_count() as usize, &mut registers, true);
                    break SsaBranch::Return { arguments: args };
                }
                OpCode::JUMP => {
                    let offset = cells[ip + 1].as_type::<isize>();
                    let target = (ip as isize + offset) as usize;
                    let target_block = block_index_of(&boundaries, target);
                    let args = stack.values.clone();
                    break SsaBranch::Unconditional {
                        block: target_block,
                        arguments: args,
                    };
                }
                OpCode::JUMP_IF | OpCode::JUMP_IF_NOT => {
                    let condition = stack.take_top(1, &mut registers, true)[0];
                    let offset = cells[ip + 1].as_type::<isize>();
                    let taken_target = (ip as isize + offset) as usize;
                    let taken_block = block_index_of(&boundaries, taken_target);
                    let fallthrough_block = block_index_of(&boundaries, ip + 2);
                    let args = stack.values.clone();
                    let (true_block, false_block) = if opcode == OpCode::JUMP_IF {
                        (taken_block, fallthrough_block)
                    } else {
                        (fallthrough_block, taken_block)
                    };
                    break SsaBranch::Conditional {
                        condition,
                        true_block,
                        true_arguments: args.clone(),
                        false_block,
                        false_arguments: args,
                    };
                }
                OpCode::CALL => {
                    // Call's own arity isn't `metadata[CALL]`'s Dynamic
                    // arity (that describes the callee, resolved only at
                    // interpretation time) but the spec cell's own
                    // parameters/returns, plus the callee itself as an
                    // extra consumed input.
                    let spec = cells[ip + 1].as_type::<InstructionSpecification>();
                    let n_in = spec.parameters as usize + 1;
                    let n_out = spec.returns as usize;
                    let inputs = stack.take_top(n_in, &mut registers, true);
                    let outputs = stack.push_fresh(n_out, &mut registers);
                    let mut arguments = vec![SsaValue::Immediate(cells[ip + 1])];
                    arguments.extend(inputs);
                    arguments.extend(outputs.into_iter().map(SsaValue::Register));
                    instructions.push(SsaInstruction {
                        opcode,
                        immediate_count: 1,
                        output_count: n_out,
                        arguments,
                    });
                    ip += 2;
                }
                _ => {
                    let meta = &metadata[opcode.0 as usize];
                    let is_dynamic = meta.parameter_count == Arity::Dynamic;
                    let spec = is_dynamic.then(|| cells[ip + 1].as_type::<InstructionSpecification>());
                    let n_in = match meta.parameter_count {
                        Arity::Fixed(n) => n,
                        Arity::Dynamic => spec.unwrap().parameters as usize,
                        Arity::MatchesFunctionReturns => unreachable!(),
                    };
                    let n_out = match meta.return_count {
                        Arity::Fixed(n) => n,
                        Arity::Dynamic => spec.unwrap().returns as usize,
                        Arity::MatchesFunctionReturns => unreachable!(),
                    };
                    let immediates: Vec<SsaValue> = cells[ip + 1..ip + 1 + meta.immediate_value_count]
                        .iter()
                        .map(|v| SsaValue::Immediate(*v))
                        .collect();
                    let inputs = stack.take_top(n_in, &mut registers, meta.consumes_input);
                    let outputs = stack.push_fresh(n_out, &mut registers);
                    let mut arguments = immediates.clone();
                    arguments.extend(inputs);
                    arguments.extend(outputs.into_iter().map(SsaValue::Register));
                    instructions.push(SsaInstruction {
                        opcode,
                        immediate_count: immediates.len(),
                        output_count: n_out,
                        arguments,
                    });
                    ip += 1 + meta.immediate_value_count;
                }
            }
        };
        blocks.push(SsaBasicBlock {
            parameters: stack.block_parameters,
            instructions,
            branch,
        });
    }

    let parameter_counts: Vec<usize> = blocks.iter().map(|b| b.parameters.len()).collect();
    for block in &mut blocks {
        match &mut block.branch {
            SsaBranch::Unreachable | SsaBranch::Return { .. } => {}
            SsaBranch::Unconditional { block: target, arguments } => {
                slice_to_arity(arguments, parameter_counts[*target]);
            }
            SsaBranch::Conditional {
                true_block,
                true_arguments,
                false_block,
                false_arguments,
                ..
            } => {
                slice_to_arity(true_arguments, parameter_counts[*true_block]);
                slice_to_arity(false_arguments, parameter_counts[*false_block]);
            }
        }
    }

    SsaFunction {
        parameter_count: function.parameter_count(),
        return_count: function.return_count(),
        blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Arity, Instruction};
    use crate::instruction_set;
    use crate::program::ProgramFragment;

    struct Add;
    impl Instruction for Add {
        const NAME: &'static str = "add";
        const PARAMETERS: Arity = Arity::Fixed(2);
        const RETURNS: Arity = Arity::Fixed(1);
        const IMMEDIATES: usize = 0;
        fn execute(_: &mut (), input: &[Value], output: &mut [Value], _: &[Value]) {
            output[0] = Value::new(input[0].as_type::<i64>() + input[1].as_type::<i64>());
        }
    }

    /// Reads its one input without removing it and pushes a copy on top.
    struct Dup;
    impl Instruction for Dup {
        const NAME: &'static str = "dup";
        const PARAMETERS: Arity = Arity::Fixed(1);
        const RETURNS: Arity = Arity::Fixed(1);
        const IMMEDIATES: usize = 0;
        const CONSUMES_INPUT: bool = false;
        fn execute(_: &mut (), input: &[Value], output: &mut [Value], _: &[Value]) {
            output[0] = input[0];
        }
    }

    instruction_set! { pub enum Arith { Add, Dup } }

    #[test]
    fn straight_line_function_is_a_single_block() {
        let mut program = ProgramFragment::<Arith>::new();
        let id = program.declare("sum", 2, 1);
        let f = program.function_mut(id);
        f.append::<Add>(&[]);
        f.append_return();

        let ssa = construct(f);
        assert_eq!(ssa.blocks.len(), 1);
        assert_eq!(ssa.blocks[0].parameters.len(), 2);
        assert_eq!(ssa.blocks[0].instructions.len(), 1);
        assert!(matches!(ssa.blocks[0].branch, SsaBranch::Return { .. }));
    }

    #[test]
    fn conditional_jump_splits_into_three_blocks_with_sliced_branch_arguments() {
        let mut program = ProgramFragment::<Arith>::new();
        let id = program.declare("cond", 1, 1);
        let f = program.function_mut(id);
        // Two Dups leave the entry block's exit stack two deep (the
        // parameter plus one duplicate) while each leaf only declares one
        // parameter: the branch must slice the extra value away rather
        // than handing both down.
        f.append::<Dup>(&[]);
        f.append::<Dup>(&[]);
        let jump = f.append_jump_if_placeholder();
        f.append_return();
        let target = crate::function::InstructionIndex(f.len());
        f.set_value(jump, 0, Value::new(target - jump.start)).unwrap();
        f.append_return();

        // [dup, dup, jump_if, return, return]: the jump block, its
        // fallthrough return, and its taken-branch return each land in
        // their own block since the taken target and the fallthrough
        // point differ.
        let ssa = construct(f);
        assert_eq!(ssa.blocks.len(), 3);
        match &ssa.blocks[0].branch {
            SsaBranch::Conditional {
                true_arguments,
                false_arguments,
                ..
            } => {
                assert_eq!(true_arguments.len(), 1);
                assert_eq!(false_arguments.len(), 1);
            }
            other => panic!("expected a conditional terminator, got {other:?}"),
        }
        assert!(matches!(ssa.blocks[1].branch, SsaBranch::Return { ref arguments } if arguments.len() == 1));
        assert!(matches!(ssa.blocks[2].branch, SsaBranch::Return { ref arguments } if arguments.len() == 1));
    }
}

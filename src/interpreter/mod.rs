//! The explicit dispatch loop.
//!
//! The source project threads control from one instruction's handler
//! directly into the next via a tail call, relying on guaranteed
//! tail-call elimination. Rust makes no such guarantee, so dispatch here
//! is realized the idiomatic way instead: a single `loop` over a few
//! mutable locals (`current`, `ip`, the value stack, the call stack)
//! that decodes one instruction, matches on its opcode, and loops.

pub(crate) mod frame;

use crate::error::{ContractResult, ContractViolation};
use crate::instruction::{Arity, InstructionSpecification, OpCode};
use crate::program::{FunctionId, ProgramFragment};
use crate::value::Value;

use frame::Frame;

/// The value stack instructions read their inputs from and write their
/// outputs to. Backed by a `Vec`, which already gives us the
/// doubling-on-demand growth the source project's value stack implements
/// by hand; we still log growth under `tracing` so it stays an
/// observable event the way the source project's reallocation path is.
#[derive(Default)]
pub struct ValueStack {
    values: Vec<Value>,
}

impl ValueStack {
    pub fn new() -> Self {
        ValueStack { values: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ValueStack {
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    pub fn push(&mut self, v: Value) {
        self.reserve(1);
        self.values.push(v);
    }

    pub fn pop(&mut self) -> ContractResult<Value> {
        match self.values.pop() {
            Some(v) => Ok(v),
            #[cfg(feature = "harden")]
            None => Err(ContractViolation::ValueStackUnderflow),
            #[cfg(not(feature = "harden"))]
            None => {
                debug_assert!(false, "value stack underflow");
                // Without `harden` this precondition is the caller's to
                // uphold; in a release build violating it is undefined
                // rather than a reported error.
                unsafe { core::hint::unreachable_unchecked() }
            }
        }
    }

    fn reserve(&mut self, additional: usize) {
        let before = self.values.capacity();
        self.values.reserve(additional);
        if self.values.capacity() != before {
            tracing::debug!(
                from = before,
                to = self.values.capacity(),
                "value stack grew"
            );
        }
    }
}

/// Evaluates functions declared in a [`ProgramFragment`].
pub struct Interpreter<'p, Set: crate::instruction::InstructionSet> {
    program: &'p ProgramFragment<Set>,
}

impl<'p, Set: crate::instruction::InstructionSet> Interpreter<'p, Set> {
    pub fn new(program: &'p ProgramFragment<Set>) -> Self {
        Interpreter { program }
    }

    /// Invokes `entry`, reading its parameters from and writing its
    /// returns to `stack`'s top. The stack must already hold at least
    /// `entry`'s declared parameter count.
    #[tracing::instrument(skip(self, stack), fields(function = %self.program.function(entry).name()))]
    pub fn invoke(&self, entry: FunctionId, stack: &mut ValueStack) -> ContractResult<()> {
        let metadata = Set::metadata();

        let mut call_stack: Vec<Frame> = vec![Frame::landing_pad()];
        let mut current = entry;
        let mut ip: usize = 0;
        self.program.function(current).fire_breakpoint_if_any();

        loop {
            let function = self.program.function(current);
            let opcode = function.cell(crate::function::InstructionIndex(ip)).as_type::<OpCode>();

            #[cfg(feature = "trace")]
            tracing::trace!(function = function.name(), ip, opcode = opcode.0, "dispatch");

            match opcode {
                OpCode::CALL => {
                    let callee = stack.pop()?.as_type::<FunctionId>();
                    call_stack.push(Frame {
                        return_function: Some(current),
                        return_index: ip + 2,
                        state: frame::StateTable::default(),
                    });
                    current = callee;
                    ip = 0;
                    self.program.function(current).fire_breakpoint_if_any();
                }
                OpCode::JUMP => {
                    let offset = function
                        .cell(crate::function::InstructionIndex(ip + 1))
                        .as_type::<isize>();
                    ip = (ip as isize + offset) as usize;
                }
                OpCode::JUMP_IF => {
                    let condition = stack.pop()?.as_type::<bool>();
                    if condition {
                        let offset = function
                            .cell(crate::function::InstructionIndex(ip + 1))
                            .as_type::<isize>();
                        ip = (ip as isize + offset) as usize;
                    } else {
                        ip += 2;
                    }
                }
                OpCode::JUMP_IF_NOT => {
                    let condition = stack.pop()?.as_type::<bool>();
                    if !condition {
                        let offset = function
                            .cell(crate::function::InstructionIndex(ip + 1))
                            .as_type::<isize>();
                        ip = (ip as isize + offset) as usize;
                    } else {
                        ip += 2;
                    }
                }
                OpCode::RETURN => {
                    let popped = call_stack.pop().ok_or(ContractViolation::CallStackUnderflow)?;
                    match popped.return_function {
                        Some(f) => {
                            current = f;
                            ip = popped.return_index;
                        }
                        None => return Ok(()),
                    }
                }
                _ => {
                    let meta = metadata
                        .get(opcode.0 as usize)
                        .ok_or(ContractViolation::UnknownOpcode { opcode: opcode.0 })?;

                    let spec_cell = usize::from(meta.parameter_count == Arity::Dynamic);
                    let spec = spec_cell.then(|| {
                        function
                            .cell(crate::function::InstructionIndex(ip + 1))
                            .as_type::<InstructionSpecification>()
                    });

                    let parameters = match meta.parameter_count {
                        Arity::Fixed(n) => n,
                        Arity::Dynamic => spec.unwrap().parameters as usize,
                        Arity::MatchesFunctionReturns => unreachable!("only Return uses this"),
                    };
                    let returns = match meta.return_count {
                        Arity::Fixed(n) => n,
                        Arity::Dynamic => spec.unwrap().returns as usize,
                        Arity::MatchesFunctionReturns => unreachable!("only Return uses this"),
                    };

                    let stack_len = stack.len();
                    let input_start = stack_len
                        .checked_sub(parameters)
                        .ok_or(ContractViolation::ValueStackUnderflow)?;
                    let input: Vec<Value> = stack.values[input_start..].to_vec();

                    let mut output = vec![Value::uninitialized(); returns];
                    let user_immediates = &function.cells()[ip + 1 + spec_cell..ip + 1 + meta.immediate_value_count];

                    let top_frame = call_stack
                        .last_mut()
                        .ok_or(ContractViolation::CallStackUnderflow)?;
                    let state = top_frame.state.slot(meta.state_type, meta.new_state);
                    (meta.call)(state, &input, &mut output, user_immediates);

                    if meta.consumes_input {
                        stack.values.truncate(input_start);
                    }
                    stack.reserve(output.len());
                    stack.values.extend(output);

                    ip += 1 + meta.immediate_value_count;
                }
            }
        }
    }
}

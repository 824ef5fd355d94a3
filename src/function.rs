//! Append-only instruction streams.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::ops::{Add, Sub};

use crate::error::{ContractResult, ContractViolation};
use crate::instruction::{InstructionSet, InstructionSpecification, OpCode, OpCodeOf};
use crate::value::Value;

/// An offset into a [`Function`]'s cell stream.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct InstructionIndex(pub usize);

impl Add<usize> for InstructionIndex {
    type Output = InstructionIndex;
    fn add(self, rhs: usize) -> InstructionIndex {
        InstructionIndex(self.0 + rhs)
    }
}

impl Sub<usize> for InstructionIndex {
    type Output = InstructionIndex;
    fn sub(self, rhs: usize) -> InstructionIndex {
        InstructionIndex(self.0 - rhs)
    }
}

impl Sub<InstructionIndex> for InstructionIndex {
    type Output = isize;
    fn sub(self, rhs: InstructionIndex) -> isize {
        self.0 as isize - rhs.0 as isize
    }
}

/// The span of cells (opcode plus immediates) a single `append*` call
/// wrote, returned so the caller can later patch a placeholder via
/// [`Function::set_value`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Interval {
    pub start: InstructionIndex,
    pub end: InstructionIndex,
}

impl Interval {
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Breakpoint {
    callback: RefCell<Box<dyn FnMut()>>,
}

/// An append-only buffer of `Value` cells: one opcode cell per
/// instruction followed by that instruction's immediate cells, assembled
/// in order and never rewritten except through [`Function::set_value`]
/// to patch a previously-reserved placeholder (forward jump targets).
pub struct Function<Set: InstructionSet> {
    name: String,
    parameter_count: u32,
    return_count: u32,
    cells: Vec<Value>,
    breakpoint: Option<Breakpoint>,
    _set: PhantomData<Set>,
}

impl<Set: InstructionSet> Function<Set> {
    pub(crate) fn new(name: impl Into<String>, parameter_count: u32, return_count: u32) -> Self {
        Function {
            name: name.into(),
            parameter_count,
            return_count,
            cells: Vec::new(),
            breakpoint: None,
            _set: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_count(&self) -> u32 {
        self.parameter_count
    }

    pub fn return_count(&self) -> u32 {
        self.return_count
    }

    /// Number of cells in the instruction stream (opcodes and
    /// immediates together, not instruction count).
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[Value] {
        &self.cells
    }

    pub fn cell(&self, index: InstructionIndex) -> Value {
        self.cells[index.0]
    }

    pub(crate) fn set_cells(&mut self, cells: Vec<Value>) {
        self.cells = cells;
    }

    /// Appends a user instruction with fixed arity. Use
    /// [`Function::append_dynamic`] for an instruction declaring
    /// `Arity::Dynamic` parameters/returns.
    pub fn append<I>(&mut self, immediates: &[Value]) -> Interval
    where
        I: OpCodeOf<Set>,
    {
        debug_assert_eq!(
            immediates.len(),
            I::IMMEDIATES,
            "wrong number of immediates for {}",
            I::NAME
        );
        self.append_opcode(I::OPCODE, immediates)
    }

    /// Appends a dynamic-arity user instruction, prefixing `immediates`
    /// with the `InstructionSpecification` cell the calling convention
    /// requires.
    pub fn append_dynamic<I>(&mut self, spec: InstructionSpecification, immediates: &[Value]) -> Interval
    where
        I: OpCodeOf<Set>,
    {
        let mut all = Vec::with_capacity(1 + immediates.len());
        all.push(Value::new(spec));
        all.extend_from_slice(immediates);
        self.append_opcode(I::OPCODE, &all)
    }

    /// Appends an instruction with `count` uninitialized immediate
    /// cells, to be filled in later via [`Function::set_value`].
    pub fn append_with_placeholders<I>(&mut self, count: usize) -> Interval
    where
        I: OpCodeOf<Set>,
    {
        let placeholders = vec![Value::uninitialized(); count];
        self.append_opcode(I::OPCODE, &placeholders)
    }

    pub fn append_call(&mut self, spec: InstructionSpecification) -> Interval {
        self.append_opcode(OpCode::CALL, &[Value::new(spec)])
    }

    pub fn append_jump(&mut self, offset: isize) -> Interval {
        self.append_opcode(OpCode::JUMP, &[Value::new(offset)])
    }

    pub fn append_jump_placeholder(&mut self) -> Interval {
        self.append_opcode(OpCode::JUMP, &[Value::uninitialized()])
    }

    pub fn append_jump_if(&mut self, offset: isize) -> Interval {
        self.append_opcode(OpCode::JUMP_IF, &[Value::new(offset)])
    }

    pub fn append_jump_if_placeholder(&mut self) -> Interval {
        self.append_opcode(OpCode::JUMP_IF, &[Value::uninitialized()])
    }

    pub fn append_jump_if_not(&mut self, offset: isize) -> Interval {
        self.append_opcode(OpCode::JUMP_IF_NOT, &[Value::new(offset)])
    }

    pub fn append_jump_if_not_placeholder(&mut self) -> Interval {
        self.append_opcode(OpCode::JUMP_IF_NOT, &[Value::uninitialized()])
    }

    pub fn append_return(&mut self) -> Interval {
        self.append_opcode(OpCode::RETURN, &[])
    }

    /// Appends a raw cell with no surrounding opcode bookkeeping. Low
    /// level; most callers want one of the typed `append*` methods.
    pub fn raw_append(&mut self, v: Value) {
        self.cells.push(v);
    }

    fn append_opcode(&mut self, opcode: OpCode, immediates: &[Value]) -> Interval {
        let start = InstructionIndex(self.cells.len());
        self.cells.push(Value::new(opcode));
        self.cells.extend_from_slice(immediates);
        Interval {
            start,
            end: InstructionIndex(self.cells.len()),
        }
    }

    /// Overwrites the `k`th cell after `interval.start`'s opcode (i.e.
    /// the `k`th immediate of the instruction `interval` spans) with
    /// `v`. Used to patch forward-jump offsets once the target is known.
    pub fn set_value(&mut self, interval: Interval, k: usize, v: Value) -> ContractResult<()> {
        let index = interval.start.0 + 1 + k;
        if index >= interval.end.0 {
            debug_assert!(false, "set_value index out of bounds");
            #[cfg(feature = "harden")]
            return Err(ContractViolation::SetValueOutOfBounds {
                index: k,
                span: interval.len(),
            });
            #[cfg(not(feature = "harden"))]
            // Without `harden` this precondition is the caller's to
            // uphold; in a release build violating it is undefined.
            unsafe {
                *self.cells.get_unchecked_mut(index) = v;
                return Ok(());
            }
        }
        self.cells[index] = v;
        Ok(())
    }

    pub(crate) fn has_breakpoint(&self) -> bool {
        self.breakpoint.is_some()
    }

    pub(crate) fn set_breakpoint(&mut self, callback: Box<dyn FnMut()>) -> ContractResult<()> {
        if self.breakpoint.is_some() {
            return Err(ContractViolation::DuplicateBreakpoint {
                name: self.name.clone(),
            });
        }
        self.breakpoint = Some(Breakpoint {
            callback: RefCell::new(callback),
        });
        Ok(())
    }

    pub(crate) fn remove_breakpoint(&mut self) {
        self.breakpoint = None;
    }

    pub(crate) fn fire_breakpoint_if_any(&self) {
        if let Some(bp) = &self.breakpoint {
            (bp.callback.borrow_mut())();
        }
    }
}

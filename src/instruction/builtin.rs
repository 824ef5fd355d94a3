//! The five built-in instruction kinds every instruction set carries:
//! `Call`, `Jump`, `JumpIf`, `JumpIfNot` and `Return`. Unlike user
//! instructions these are not routed through [`super::Instruction`] —
//! their control-flow effects (redirecting the instruction pointer,
//! pushing or popping a call frame) can't be expressed by a function
//! that only sees a stack slice, so the interpreter special-cases their
//! opcodes directly. They still occupy metadata table entries, at fixed
//! opcodes `0..=4`, so serialization and SSA construction can treat every
//! opcode uniformly.

use std::any::TypeId;

use super::{Arity, InstructionMetadata, InstructionSpecification};
use crate::serialize::{varint, ByteSink, ByteSource, DeserializeContext, SerializeContext};
use crate::value::Value;

fn never_called(
    _: &mut dyn std::any::Any,
    _: &[Value],
    _: &mut [Value],
    _: &[Value],
) {
    unreachable!("builtin instructions are dispatched directly by the interpreter")
}

fn write_specification(immediates: &[Value], ctx: &mut SerializeContext) -> bool {
    let spec = immediates[0].as_type::<InstructionSpecification>();
    varint::write_u64(ctx.writer, spec.parameters as u64)
        && varint::write_u64(ctx.writer, spec.returns as u64)
}

fn read_specification(count: usize, ctx: &mut DeserializeContext) -> Option<Vec<Value>> {
    debug_assert_eq!(count, 1);
    let parameters = varint::read_u64(ctx.reader)? as u32;
    let returns = varint::read_u64(ctx.reader)? as u32;
    Some(vec![Value::new(InstructionSpecification {
        parameters,
        returns,
    })])
}

fn write_offset(immediates: &[Value], ctx: &mut SerializeContext) -> bool {
    varint::write_i64(ctx.writer, immediates[0].as_type::<isize>() as i64)
}

fn read_offset(count: usize, ctx: &mut DeserializeContext) -> Option<Vec<Value>> {
    debug_assert_eq!(count, 1);
    let offset = varint::read_i64(ctx.reader)?;
    Some(vec![Value::new(offset as isize)])
}

fn write_nothing(immediates: &[Value], _ctx: &mut SerializeContext) -> bool {
    debug_assert!(immediates.is_empty());
    true
}

fn read_nothing(count: usize, _ctx: &mut DeserializeContext) -> Option<Vec<Value>> {
    debug_assert_eq!(count, 0);
    Some(Vec::new())
}

// Zero-sized markers giving each builtin its own `kind` TypeId. The
// builtins have no `Instruction` impl of their own to borrow a TypeId
// from (they share `state_type: TypeId::of::<()>()`, which would
// otherwise make every builtin look like a duplicate of the others to
// `instruction_set!`'s dedup pass), so they get one each here instead.
struct CallKind;
struct JumpKind;
struct JumpIfKind;
struct JumpIfNotKind;
struct ReturnKind;

/// Returns the five builtins' metadata, in `Call, Jump, JumpIf,
/// JumpIfNot, Return` order, matching [`super::OpCode`]'s fixed
/// assignment.
pub(crate) fn metadata_table() -> Vec<InstructionMetadata> {
    vec![
        InstructionMetadata {
            name: "call",
            immediate_value_count: 1,
            parameter_count: Arity::Dynamic,
            return_count: Arity::Dynamic,
            consumes_input: true,
            kind: TypeId::of::<CallKind>(),
            state_type: TypeId::of::<()>(),
            new_state: || Box::new(()),
            call: never_called,
            write_immediates: write_specification,
            read_immediates: read_specification,
            identify: None,
        },
        InstructionMetadata {
            name: "jump",
            immediate_value_count: 1,
            parameter_count: Arity::Fixed(0),
            return_count: Arity::Fixed(0),
            consumes_input: false,
            kind: TypeId::of::<JumpKind>(),
            state_type: TypeId::of::<()>(),
            new_state: || Box::new(()),
            call: never_called,
            write_immediates: write_offset,
            read_immediates: read_offset,
            identify: None,
        },
        InstructionMetadata {
            name: "jump_if",
            immediate_value_count: 1,
            parameter_count: Arity::Fixed(1),
            return_count: Arity::Fixed(0),
            consumes_input: true,
            kind: TypeId::of::<JumpIfKind>(),
            state_type: TypeId::of::<()>(),
            new_state: || Box::new(()),
            call: never_called,
            write_immediates: write_offset,
            read_immediates: read_offset,
            identify: None,
        },
        InstructionMetadata {
            name: "jump_if_not",
            immediate_value_count: 1,
            parameter_count: Arity::Fixed(1),
            return_count: Arity::Fixed(0),
            consumes_input: true,
            kind: TypeId::of::<JumpIfNotKind>(),
            state_type: TypeId::of::<()>(),
            new_state: || Box::new(()),
            call: never_called,
            write_immediates: write_offset,
            read_immediates: read_offset,
            identify: None,
        },
        InstructionMetadata {
            name: "return",
            immediate_value_count: 0,
            parameter_count: Arity::MatchesFunctionReturns,
            return_count: Arity::Fixed(0),
            consumes_input: true,
            kind: TypeId::of::<ReturnKind>(),
            state_type: TypeId::of::<()>(),
            new_state: || Box::new(()),
            call: never_called,
            write_immediates: write_nothing,
            read_immediates: read_nothing,
            identify: None,
        },
    ]
}

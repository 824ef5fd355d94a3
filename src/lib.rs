//! opvm: a library for defining, assembling, executing, serializing and
//! analyzing custom stack-machine bytecodes.
//!
//! A concrete virtual machine is built by implementing
//! [`instruction::Instruction`] for each operation it needs and closing
//! them into an [`instruction::InstructionSet`] with
//! [`instruction_set!`]. Programs are assembled into
//! [`program::ProgramFragment`]s one [`function::Function`] at a time,
//! run with [`interpreter::Interpreter`], serialized to and from bytes
//! with [`serialize`], inspected function-entry-by-function-entry with
//! [`debug::Debugger`], and lowered to static single assignment form
//! with [`ssa`].
#![warn(missing_docs)]
#![deny(unused_must_use)]

// Re-exported so `instruction_set!` can expand to `$crate::paste::paste!`
// and resolve correctly from a caller's crate, without requiring every
// caller to list `paste` as a dependency of their own.
#[doc(hidden)]
pub use paste;

pub mod debug;
pub mod error;
pub mod function;
pub mod instruction;
pub mod interpreter;
pub mod program;
pub mod serialize;
pub mod ssa;
pub mod value;

#[cfg(test)]
mod tests;

pub use error::{ContractResult, ContractViolation, DeserializeError};
pub use function::{Function, InstructionIndex, Interval};
pub use instruction::{Arity, Instruction, InstructionMetadata, InstructionSet, OpCode, OpCodeOf};
pub use interpreter::{Interpreter, ValueStack};
pub use program::{FunctionId, ProgramFragment};
pub use value::Value;

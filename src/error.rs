//! Error taxonomy.
//!
//! `opvm` distinguishes caller-bug violations of the library's contract
//! from ordinary I/O and malformed-input failures, mirroring the
//! hardened/unhardened split of the configuration this crate is built
//! against: under the `harden` feature every contract violation below is
//! detected and reported; without it the same call sites fall back to a
//! `debug_assert!`, and violating them in a release build is undefined
//! behavior rather than a reported error.

use derive_more::Display;

/// A violation of a precondition the caller is responsible for upholding
/// (an empty-stack pop, a mistyped `Value` read, an out-of-bounds
/// `set_value`, and so on). Constructing one of these and returning it
/// only happens when the `harden` feature is enabled; see the crate's
/// module docs.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    /// Attempted to pop a value from an empty value stack.
    #[display(fmt = "value stack underflow")]
    ValueStackUnderflow,
    /// Attempted to pop a frame below the landing pad.
    #[display(fmt = "call stack underflow")]
    CallStackUnderflow,
    /// `Function::set_value` targeted a cell outside the instruction's
    /// reserved immediates.
    #[display(fmt = "set_value index {index} out of bounds for instruction spanning {span} cells")]
    SetValueOutOfBounds {
        /// The offset that was requested.
        index: usize,
        /// The number of cells reserved for the instruction.
        span: usize,
    },
    /// A breakpoint was requested for a function that already has one.
    #[display(fmt = "function {name:?} already has a breakpoint installed")]
    DuplicateBreakpoint {
        /// The function's declared name.
        name: String,
    },
    /// A jump or call targeted an opcode outside an instruction set's
    /// metadata table.
    #[display(fmt = "unknown opcode {opcode}")]
    UnknownOpcode {
        /// The out-of-range opcode value.
        opcode: u16,
    },
    /// A function reference embedded in an instruction stream (e.g. the
    /// callee immediate of a `Call`, or a program-wide cross-function
    /// reference encountered while deserializing) named a function the
    /// program fragment does not declare.
    #[display(fmt = "reference to undeclared function {name:?}")]
    UnknownFunction {
        /// The name that failed to resolve.
        name: String,
    },
}

impl std::error::Error for ContractViolation {}

/// Failures while reading a serialized program. Unlike
/// [`ContractViolation`], these are always returned to the caller: a
/// malformed or truncated byte stream is an ordinary I/O condition, not a
/// caller bug.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum DeserializeError {
    /// The byte stream ended before a field could be fully read.
    #[display(fmt = "unexpected end of input while reading {context}")]
    UnexpectedEof {
        /// What the reader was attempting to read when input ran out.
        context: &'static str,
    },
    /// A function name referenced by an immediate was not among the
    /// functions declared earlier in the stream.
    #[display(fmt = "reference to undeclared function {name:?}")]
    UnknownFunction {
        /// The unresolved name.
        name: String,
    },
    /// A cell decoded to an opcode outside the instruction set's table.
    #[display(fmt = "opcode {opcode} is not a member of this instruction set")]
    InvalidOpcode {
        /// The out-of-range opcode value.
        opcode: u16,
    },
    /// A function body's declared length did not match the number of
    /// bytes actually consumed while decoding its instructions.
    #[display(
        fmt = "function {name:?} declared a body of {declared} bytes but {consumed} were read"
    )]
    BodyLengthMismatch {
        /// The function whose body was malformed.
        name: String,
        /// The length prefix read from the stream.
        declared: usize,
        /// The number of bytes actually consumed decoding instructions.
        consumed: usize,
    },
}

impl std::error::Error for DeserializeError {}

/// Shorthand for fallible operations guarded by the `harden` feature.
pub type ContractResult<T> = Result<T, ContractViolation>;

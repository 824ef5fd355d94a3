//! Instruction signatures, metadata and the closed instruction-set
//! construction macro.
//!
//! A concrete instruction set cannot be discovered by reflection the way
//! the source project's C++ can inspect a handler's parameter list at
//! compile time; here every instruction implements [`Instruction`]
//! explicitly, declaring its own arity, immediate count and calling
//! convention as associated items, and [`instruction_set!`] assembles a
//! closed, ordered table of them the way [`fuel_asm`'s `impl_instructions!`]
//! assembles an opcode enum.
//!
//! [`fuel_asm`'s `impl_instructions!`]: https://docs.rs/fuel-asm

pub mod builtin;

use std::any::{Any, TypeId};

use crate::serialize::{ByteSink, ByteSource, DeserializeContext, SerializeContext};
use crate::ssa::{SsaRegister, SsaValue};
use crate::value::Value;

/// How many `Value`s an instruction consumes from, or produces onto, the
/// value stack.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Arity {
    /// A compile-time-fixed number of values.
    Fixed(usize),
    /// Determined at append/dispatch time by an
    /// [`InstructionSpecification`] immediate, the first cell following
    /// the opcode.
    Dynamic,
    /// Valid only for the `Return` builtin: determined by the enclosing
    /// function's declared return count rather than by anything in the
    /// instruction stream.
    MatchesFunctionReturns,
}

/// The `{parameters, returns}` pair a dynamic-arity instruction (`Call`,
/// or any user instruction declaring `Arity::Dynamic`) carries as its
/// first immediate. Small enough to live in a single `Value` cell.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[repr(C)]
pub struct InstructionSpecification {
    /// Number of values the instruction consumes from the stack.
    pub parameters: u32,
    /// Number of values the instruction produces onto the stack.
    pub returns: u32,
}

/// An instruction's signature and name independent of the function-state
/// handler machinery generated per concrete `Instruction` by
/// [`metadata_of`]; the fields here are what the interpreter, serializer
/// and SSA builder consult at runtime.
pub struct InstructionMetadata {
    /// Name used in diagnostics and SSA pretty-printing.
    pub name: &'static str,
    /// Number of immediate cells following the opcode cell (not counting
    /// the `InstructionSpecification` cell itself, for dynamic-arity
    /// instructions, which is always exactly one additional cell).
    pub immediate_value_count: usize,
    pub parameter_count: Arity,
    pub return_count: Arity,
    /// Whether the instruction consumes its stack inputs (they are
    /// removed from the stack) as opposed to merely reading them in
    /// place and appending its outputs above them.
    pub consumes_input: bool,
    /// `TypeId` of the instruction kind itself (not its `FunctionState`).
    /// Two entries with the same `kind` are the same instruction reached
    /// through two different paths — by a direct listing and by
    /// flattening a nested set that also lists it, say — and
    /// [`instruction_set!`]'s table-building collapses them to one.
    pub kind: TypeId,
    /// `TypeId` of this instruction's `FunctionState`, used to find its
    /// slot in a frame's state table.
    pub state_type: TypeId,
    /// Default-constructs a boxed `FunctionState` for this instruction.
    pub new_state: fn() -> Box<dyn Any>,
    /// Invokes the instruction given its state slot and value-stack
    /// input/output/immediate spans. Unused (and never called) for the
    /// five builtins, which the interpreter special-cases directly.
    pub call: fn(&mut dyn Any, input: &[Value], output: &mut [Value], immediates: &[Value]),
    /// Serializes this instruction's immediates. Defaults to raw 8-byte
    /// little-endian cells; an instruction whose immediates include a
    /// function reference, or whose declared types compress better than
    /// a flat 8 bytes, overrides this.
    pub write_immediates: fn(&[Value], &mut SerializeContext) -> bool,
    /// The inverse of `write_immediates`.
    pub read_immediates: fn(usize, &mut DeserializeContext) -> Option<Vec<Value>>,
    /// Optional register-coalescing hook; see [`crate::ssa::coalesce`].
    pub identify:
        Option<fn(output_count: usize, arguments: &[SsaValue]) -> Vec<(SsaRegister, SsaValue)>>,
}

/// An opaque opcode: the index of an instruction kind within an
/// [`InstructionSet`]'s metadata table. The five builtins always occupy
/// opcodes `0..=4`, in `Call, Jump, JumpIf, JumpIfNot, Return` order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct OpCode(pub u16);

impl OpCode {
    pub const CALL: OpCode = OpCode(0);
    pub const JUMP: OpCode = OpCode(1);
    pub const JUMP_IF: OpCode = OpCode(2);
    pub const JUMP_IF_NOT: OpCode = OpCode(3);
    pub const RETURN: OpCode = OpCode(4);
    pub(crate) const BUILTIN_COUNT: u16 = 5;

    pub fn is_builtin(self) -> bool {
        self.0 < Self::BUILTIN_COUNT
    }
}

/// A single instruction kind. Implemented by the user for every
/// non-builtin operation their virtual machine needs; assembled into a
/// closed set with [`instruction_set!`].
///
/// `FunctionState` is per-invocation storage this instruction kind may
/// read and write across dispatches within the same call frame (a
/// program counter for a generator-like instruction, an accumulator,
/// etc). Stateless instructions use `()`.
pub trait Instruction: 'static {
    /// Per-invocation state this instruction's dispatches share within a
    /// single call frame. Defaults are looked up by type, so two
    /// instructions sharing a `FunctionState` type share the same slot.
    type FunctionState: Default + 'static = ();

    const NAME: &'static str;
    const PARAMETERS: Arity;
    const RETURNS: Arity;
    const IMMEDIATES: usize;
    const CONSUMES_INPUT: bool = true;

    /// Optional register-coalescing hook: given an SSA instruction's
    /// output count and argument list, returns `(register, replacement)`
    /// pairs asserting that an output register is in fact always equal
    /// to one of the instruction's arguments (see
    /// [`crate::ssa::coalesce`]).
    const IDENTIFY: Option<fn(usize, &[SsaValue]) -> Vec<(SsaRegister, SsaValue)>> = None;

    fn execute(
        state: &mut Self::FunctionState,
        input: &[Value],
        output: &mut [Value],
        immediates: &[Value],
    );

    /// Serializes this instruction's immediates. The default encodes each
    /// as a raw little-endian 8-byte cell; override for compact
    /// variable-width encodings or immediates that reference other
    /// functions by name.
    fn write_immediates(immediates: &[Value], ctx: &mut SerializeContext) -> bool {
        immediates
            .iter()
            .all(|v| ctx.writer.write_bytes(&v.raw_value().to_le_bytes()))
    }

    /// The inverse of [`Instruction::write_immediates`].
    fn read_immediates(count: usize, ctx: &mut DeserializeContext) -> Option<Vec<Value>> {
        (0..count)
            .map(|_| {
                let bytes = ctx.reader.read_bytes(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                Some(Value::from_raw_value(u64::from_le_bytes(buf)))
            })
            .collect()
    }
}

fn execute_shim<I: Instruction>(
    state: &mut dyn Any,
    input: &[Value],
    output: &mut [Value],
    immediates: &[Value],
) {
    let state = state
        .downcast_mut::<I::FunctionState>()
        .expect("function-state slot type mismatch");
    I::execute(state, input, output, immediates);
}

/// Builds the runtime metadata record for a user instruction kind. Used
/// by [`instruction_set!`]; exported so hand-written `InstructionSet`
/// impls can use it too.
pub fn metadata_of<I: Instruction>() -> InstructionMetadata {
    // A dynamic-arity instruction's calling convention prepends one
    // `InstructionSpecification` cell ahead of its declared immediates;
    // `I::IMMEDIATES` counts only the latter.
    let spec_cell = usize::from(I::PARAMETERS == Arity::Dynamic);
    InstructionMetadata {
        name: I::NAME,
        immediate_value_count: I::IMMEDIATES + spec_cell,
        parameter_count: I::PARAMETERS,
        return_count: I::RETURNS,
        consumes_input: I::CONSUMES_INPUT,
        kind: TypeId::of::<I>(),
        state_type: TypeId::of::<I::FunctionState>(),
        new_state: || Box::<I::FunctionState>::default(),
        call: execute_shim::<I>,
        write_immediates: I::write_immediates,
        read_immediates: I::read_immediates,
        identify: I::IDENTIFY,
    }
}

/// A closed, ordered, deduplicated instruction set: the five builtins
/// followed by the user-defined instruction kinds passed to
/// [`instruction_set!`].
pub trait InstructionSet: 'static {
    /// Metadata for every opcode, builtins first.
    fn metadata() -> &'static [InstructionMetadata];
}

/// Associates a user instruction kind with the opcode it was assigned
/// within a particular [`InstructionSet`]. Implemented by
/// [`instruction_set!`]; never implemented for the five builtins, which
/// are addressed through [`OpCode::CALL`] and friends instead.
pub trait OpCodeOf<Set: InstructionSet>: Instruction {
    const OPCODE: OpCode;
}

/// Declares a closed instruction set.
///
/// ```ignore
/// instruction_set! {
///     pub enum Arithmetic { Add, Sub, Mul }
/// }
/// ```
///
/// generates a zero-sized `Arithmetic` type implementing [`InstructionSet`]
/// whose metadata table holds the five builtins followed by `Add`, `Sub`,
/// `Mul` in declaration order, plus an [`OpCodeOf`] impl assigning each a
/// stable opcode.
///
/// A set can also be built by flattening one or more previously declared
/// sets in, recursively pulling in their own (already deduplicated)
/// members ahead of any locally listed ones:
///
/// ```ignore
/// instruction_set! {
///     pub enum Combined { Extra } flattening Arithmetic, Logic
/// }
/// ```
///
/// Flattening reaches for a set's member list through a companion
/// `macro_rules!` this macro generates alongside the set itself — not
/// `#[macro_export]`ed, so it follows ordinary item scoping: bring it
/// into scope with `use` (or name it through its module path) the same
/// way you would the set's own type before flattening it into another
/// one. The same concrete instruction type reachable from two different
/// flattened-in sets collapses to a single metadata entry, the way two
/// paths to the same type would if both were listed directly; it is
/// still a conflicting-impl compile error to flatten (or list) the same
/// type into one set twice, since each `OpCodeOf<Set>` impl needs a
/// single, unambiguous opcode.
#[macro_export]
macro_rules! instruction_set {
    // Flattening form.
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($local:ty),* $(,)? } flattening $($inner:ident),+ $(,)?) => {
        $crate::instruction_set!(@collect_nested $(#[$meta])* $vis $name [$($local),*] [] ; $($inner),+);
    };

    // Plain form.
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($inst:ty),* $(,)? }) => {
        $crate::instruction_set!(@body $(#[$meta])* $vis $name; $($inst),*);
    };

    // Pulls the next nested set's member list in through its companion
    // macro and recurses onto whatever nested sets remain.
    (@collect_nested $(#[$meta:meta])* $vis:vis $name:ident [$($local:ty),*] [$($gathered:ty),*] ; $head:ident $(, $tail:ident)*) => {
        $crate::paste::paste! {
            [<__opvm_members_ $head>]!(
                $crate::instruction_set! (@collect_nested_continue $(#[$meta])* $vis $name [$($local),*] [$($gathered),*] ; $($tail),* ;)
            );
        }
    };
    (@collect_nested $(#[$meta:meta])* $vis:vis $name:ident [$($local:ty),*] [$($gathered:ty),*] ; ) => {
        $crate::instruction_set!(@body $(#[$meta])* $vis $name; $($gathered,)* $($local),*);
    };

    // Receives a nested set's flattened member list (appended by its
    // companion macro) and folds it into `gathered` before continuing
    // with any nested sets still to pull in.
    (@collect_nested_continue $(#[$meta:meta])* $vis:vis $name:ident [$($local:ty),*] [$($gathered:ty),*] ; $($tail:ident),* ; $($new:ty),*) => {
        $crate::instruction_set!(@collect_nested $(#[$meta])* $vis $name [$($local),*] [$($gathered,)* $($new),*] ; $($tail),*);
    };

    (@body $(#[$meta:meta])* $vis:vis $name:ident; $($inst:ty),* $(,)?) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug)]
        $vis struct $name;

        impl $crate::instruction::InstructionSet for $name {
            fn metadata() -> &'static [$crate::instruction::InstructionMetadata] {
                static TABLE: ::std::sync::OnceLock<::std::vec::Vec<$crate::instruction::InstructionMetadata>> =
                    ::std::sync::OnceLock::new();
                TABLE.get_or_init(|| {
                    let mut table = $crate::instruction::builtin::metadata_table();
                    $(
                        let next = $crate::instruction::metadata_of::<$inst>();
                        if !table.iter().any(|m| m.kind == next.kind) {
                            table.push(next);
                        }
                    )*
                    table
                })
            }
        }

        $crate::instruction_set!(@opcodes $name; 5u16; $($inst),*);

        // Exposes this set's member list to a later `instruction_set!`
        // invocation flattening it in; see the `flattening` form above.
        $crate::paste::paste! {
            #[allow(unused_macros)]
            macro_rules! [<__opvm_members_ $name>] {
                ($callback:path ! ($($prefix:tt)*)) => {
                    $callback!($($prefix)* $($inst),*);
                };
            }
        }
    };

    (@opcodes $name:ident; $next:expr; ) => {};
    (@opcodes $name:ident; $next:expr; $head:ty $(, $tail:ty)*) => {
        impl $crate::instruction::OpCodeOf<$name> for $head {
            const OPCODE: $crate::instruction::OpCode = $crate::instruction::OpCode($next);
        }
        $crate::instruction_set!(@opcodes $name; $next + 1; $($tail),*);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl Instruction for Noop {
        const NAME: &'static str = "noop";
        const PARAMETERS: Arity = Arity::Fixed(0);
        const RETURNS: Arity = Arity::Fixed(0);
        const IMMEDIATES: usize = 0;
        fn execute(_: &mut (), _: &[Value], _: &mut [Value], _: &[Value]) {}
    }

    crate::instruction_set! {
        pub enum Toy { Noop }
    }

    #[test]
    fn builtins_occupy_the_first_five_opcodes() {
        let table = Toy::metadata();
        assert_eq!(table.len(), 6);
        assert_eq!(table[0].name, "call");
        assert_eq!(table[4].name, "return");
        assert_eq!(table[5].name, "noop");
    }

    #[test]
    fn user_instruction_gets_a_stable_opcode() {
        assert_eq!(<Noop as OpCodeOf<Toy>>::OPCODE, OpCode(5));
    }

    crate::instruction_set! {
        pub enum Extended { } flattening Toy
    }

    #[test]
    fn flattening_pulls_in_the_inner_sets_members() {
        let table = Extended::metadata();
        assert_eq!(table.len(), 6);
        assert_eq!(table[5].name, "noop");
        assert_eq!(<Noop as OpCodeOf<Extended>>::OPCODE, OpCode(5));
    }

    #[test]
    fn duplicate_opcode_kinds_collapse_to_one_metadata_entry() {
        // `metadata_of::<Noop>()` called twice describes the same `kind`
        // both times — what `instruction_set!`'s table builder would see
        // for a type reachable through two flattened-in paths (a case
        // that can't be driven end-to-end through the macro itself: a
        // genuine duplicate listing is also a conflicting `OpCodeOf` impl,
        // a compile error, so this exercises the builder's own
        // already-present check directly).
        let mut table = builtin::metadata_table();
        let first = metadata_of::<Noop>();
        if !table.iter().any(|m| m.kind == first.kind) {
            table.push(first);
        }
        let before = table.len();

        let second = metadata_of::<Noop>();
        if !table.iter().any(|m| m.kind == second.kind) {
            table.push(second);
        }
        assert_eq!(table.len(), before, "a second entry with the same kind must not grow the table");
    }
}

//! Function-entry breakpoints.
//!
//! The source project implements a breakpoint by moving a function's
//! body aside and installing a one-instruction replacement that invokes
//! the registered callback before tail-jumping into the saved body —
//! necessary there because the only way to intercept a threaded-dispatch
//! call is to substitute what gets tail-called into. This interpreter
//! already inspects a function's metadata before dispatching its first
//! instruction (rather than blindly jumping through a handler pointer),
//! so the same externally-observable contract — the callback fires
//! exactly once per invocation, before the function's first instruction,
//! without disturbing the call/return protocol — is realized more
//! directly: [`Function`] just remembers an optional callback and the
//! interpreter fires it on entry.

use crate::error::ContractResult;
use crate::function::Function;
use crate::instruction::InstructionSet;
use crate::program::ProgramFragment;

/// Installs and removes function-entry breakpoints on a
/// [`ProgramFragment`].
pub struct Debugger<'p, Set: InstructionSet> {
    program: &'p mut ProgramFragment<Set>,
}

impl<'p, Set: InstructionSet> Debugger<'p, Set> {
    pub fn new(program: &'p mut ProgramFragment<Set>) -> Self {
        Debugger { program }
    }

    /// Registers `callback` to run every time `name` is invoked, before
    /// its first instruction dispatches. Fails if `name` already has a
    /// breakpoint, or does not exist.
    pub fn set_function_breakpoint(
        &mut self,
        name: &str,
        callback: impl FnMut() + 'static,
    ) -> ContractResult<()> {
        let function = self.program.function_named_mut(name)?;
        function.set_breakpoint(Box::new(callback))?;
        tracing::debug!(function = name, "breakpoint installed");
        Ok(())
    }

    /// Removes `name`'s breakpoint, if any.
    pub fn remove_function_breakpoint(&mut self, name: &str) -> ContractResult<()> {
        let function: &mut Function<Set> = self.program.function_named_mut(name)?;
        function.remove_breakpoint();
        tracing::debug!(function = name, "breakpoint removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Arity, Instruction};
    use crate::instruction_set;
    use crate::interpreter::{Interpreter, ValueStack};
    use crate::value::Value;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Noop;
    impl Instruction for Noop {
        const NAME: &'static str = "noop";
        const PARAMETERS: Arity = Arity::Fixed(0);
        const RETURNS: Arity = Arity::Fixed(0);
        const IMMEDIATES: usize = 0;
        fn execute(_: &mut (), _: &[Value], _: &mut [Value], _: &[Value]) {}
    }
    instruction_set! { pub enum Toy { Noop } }

    #[test]
    fn breakpoint_fires_once_per_invocation() {
        let mut program = ProgramFragment::<Toy>::new();
        let f = program.declare("f", 0, 0);
        program.function_mut(f).append_return();

        let hits = Rc::new(RefCell::new(0));
        let hits_clone = hits.clone();
        Debugger::new(&mut program)
            .set_function_breakpoint("f", move || *hits_clone.borrow_mut() += 1)
            .unwrap();

        let interpreter = Interpreter::new(&program);
        let mut stack = ValueStack::new();
        interpreter.invoke(f, &mut stack).unwrap();
        interpreter.invoke(f, &mut stack).unwrap();

        assert_eq!(*hits.borrow(), 2);
    }

    #[test]
    fn duplicate_breakpoint_is_rejected() {
        let mut program = ProgramFragment::<Toy>::new();
        program.declare("f", 0, 0);
        program.function_mut(program.id_of("f").unwrap()).append_return();
        let mut debugger = Debugger::new(&mut program);
        debugger.set_function_breakpoint("f", || {}).unwrap();
        assert!(debugger.set_function_breakpoint("f", || {}).is_err());
    }
}

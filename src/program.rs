//! A collection of named, mutually-referenceable functions sharing one
//! instruction set.

use hashbrown::HashMap;

use crate::error::{ContractResult, ContractViolation};
use crate::function::Function;
use crate::instruction::InstructionSet;

/// A stable identifier for a function within a [`ProgramFragment`].
/// Indices are assigned in declaration order and never reused, so they
/// remain valid across serialization round-trips and survive functions
/// referencing each other (directly or mutually) recursively.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct FunctionId(pub(crate) u32);

/// A named collection of functions, all built against the same
/// [`InstructionSet`], that may call each other. The unit of
/// serialization, interpretation and debugging.
pub struct ProgramFragment<Set: InstructionSet> {
    functions: Vec<Function<Set>>,
    by_name: HashMap<String, FunctionId>,
}

impl<Set: InstructionSet> Default for ProgramFragment<Set> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Set: InstructionSet> ProgramFragment<Set> {
    pub fn new() -> Self {
        ProgramFragment {
            functions: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Declares a new function taking `parameters` values and returning
    /// `returns` values, and returns its stable id. Its body starts
    /// empty; append instructions to it via [`ProgramFragment::function_mut`].
    pub fn declare(&mut self, name: impl Into<String>, parameters: u32, returns: u32) -> FunctionId {
        let name = name.into();
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(Function::new(name.clone(), parameters, returns));
        self.by_name.insert(name, id);
        id
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn function(&self, id: FunctionId) -> &Function<Set> {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function<Set> {
        &mut self.functions[id.0 as usize]
    }

    pub fn id_of(&self, name: &str) -> ContractResult<FunctionId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ContractViolation::UnknownFunction {
                name: name.to_owned(),
            })
    }

    pub fn function_named(&self, name: &str) -> ContractResult<&Function<Set>> {
        self.id_of(name).map(|id| self.function(id))
    }

    pub fn function_named_mut(&mut self, name: &str) -> ContractResult<&mut Function<Set>> {
        let id = self.id_of(name)?;
        Ok(self.function_mut(id))
    }

    /// Iterates functions in declaration order, paired with their ids.
    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &Function<Set>)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FunctionId(i as u32), f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Arity, Instruction};
    use crate::instruction_set;
    use crate::value::Value;

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
    fn declare_and_lookup_round_trips() {
        let mut program = ProgramFragment::<Toy>::new();
        let id = program.declare("main", 0, 1);
        assert_eq!(program.id_of("main").unwrap(), id);
        assert_eq!(program.function(id).name(), "main");
    }

    #[test]
    fn unknown_function_is_a_contract_violation() {
        let program = ProgramFragment::<Toy>::new();
        assert!(matches!(
            program.id_of("nope"),
            Err(ContractViolation::UnknownFunction { .. })
        ));
    }
}

//! Debugger hook: `a` calls `b` twice, `b` calls `c` twice, `c` calls `d`
//! once. A breakpoint on `c` must fire exactly four times.

use std::cell::RefCell;
use std::rc::Rc;

use crate::debug::Debugger;
use crate::instruction::{Arity, Instruction, InstructionSpecification};
use crate::instruction_set;
use crate::interpreter::{Interpreter, ValueStack};
use crate::program::{FunctionId, ProgramFragment};
use crate::value::Value;

struct PushFunction;
impl Instruction for PushFunction {
    const NAME: &'static str = "push_function";
    const PARAMETERS: Arity = Arity::Fixed(0);
    const RETURNS: Arity = Arity::Fixed(1);
    const IMMEDIATES: usize = 1;
    fn execute(_: &mut (), _: &[Value], output: &mut [Value], immediates: &[Value]) {
        output[0] = immediates[0];
    }
}

instruction_set! {
    pub(crate) enum CallChainSet { PushFunction }
}

fn call(f: &mut crate::function::Function<CallChainSet>, callee: FunctionId) {
    f.append::<PushFunction>(&[Value::new(callee)]);
    f.append_call(InstructionSpecification {
        parameters: 0,
        returns: 0,
    });
}

#[test]
fn breakpoint_on_c_fires_once_per_call_from_either_b_invocation() {
    let mut program = ProgramFragment::<CallChainSet>::new();
    let a = program.declare("a", 0, 0);
    let b = program.declare("b", 0, 0);
    let c = program.declare("c", 0, 0);
    let d = program.declare("d", 0, 0);

    call(program.function_mut(a), b);
    call(program.function_mut(a), b);
    program.function_mut(a).append_return();

    call(program.function_mut(b), c);
    call(program.function_mut(b), c);
    program.function_mut(b).append_return();

    call(program.function_mut(c), d);
    program.function_mut(c).append_return();

    program.function_mut(d).append_return();

    let hits = Rc::new(RefCell::new(0));
    let hits_clone = hits.clone();
    Debugger::new(&mut program)
        .set_function_breakpoint("c", move || *hits_clone.borrow_mut() += 1)
        .unwrap();

    let mut stack = ValueStack::new();
    Interpreter::new(&program).invoke(a, &mut stack).unwrap();

    assert_eq!(*hits.borrow(), 4);
    assert!(stack.is_empty());
}

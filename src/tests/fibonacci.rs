//! Recursive Fibonacci: the seed scenario reused by the serialization and
//! SSA integration tests alongside the plain interpretation test below.

use crate::function::InstructionIndex;
use crate::instruction::{Arity, Instruction, InstructionSpecification};
use crate::instruction_set;
use crate::interpreter::{Interpreter, ValueStack};
use crate::program::{FunctionId, ProgramFragment};
use crate::value::Value;

/// Pushes its sole immediate, unmodified, onto the stack. Used both to
/// push integer literals and to push a `FunctionId` callee.
pub(crate) struct Const;
impl Instruction for Const {
    const NAME: &'static str = "const";
    const PARAMETERS: Arity = Arity::Fixed(0);
    const RETURNS: Arity = Arity::Fixed(1);
    const IMMEDIATES: usize = 1;
    fn execute(_: &mut (), _: &[Value], output: &mut [Value], immediates: &[Value]) {
        output[0] = immediates[0];
    }
}

pub(crate) struct Add;
impl Instruction for Add {
    const NAME: &'static str = "add";
    const PARAMETERS: Arity = Arity::Fixed(2);
    const RETURNS: Arity = Arity::Fixed(1);
    const IMMEDIATES: usize = 0;
    fn execute(_: &mut (), input: &[Value], output: &mut [Value], _: &[Value]) {
        output[0] = Value::new(input[0].as_type::<i64>() + input[1].as_type::<i64>());
    }
}

pub(crate) struct Sub;
impl Instruction for Sub {
    const NAME: &'static str = "sub";
    const PARAMETERS: Arity = Arity::Fixed(2);
    const RETURNS: Arity = Arity::Fixed(1);
    const IMMEDIATES: usize = 0;
    fn execute(_: &mut (), input: &[Value], output: &mut [Value], _: &[Value]) {
        output[0] = Value::new(input[0].as_type::<i64>() - input[1].as_type::<i64>());
    }
}

pub(crate) struct Lt;
impl Instruction for Lt {
    const NAME: &'static str = "lt";
    const PARAMETERS: Arity = Arity::Fixed(2);
    const RETURNS: Arity = Arity::Fixed(1);
    const IMMEDIATES: usize = 0;
    fn execute(_: &mut (), input: &[Value], output: &mut [Value], _: &[Value]) {
        output[0] = Value::new(input[0].as_type::<i64>() < input[1].as_type::<i64>());
    }
}

/// Reads its one input without removing it and pushes a copy on top.
pub(crate) struct Dup;
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

pub(crate) struct Swap;
impl Instruction for Swap {
    const NAME: &'static str = "swap";
    const PARAMETERS: Arity = Arity::Fixed(2);
    const RETURNS: Arity = Arity::Fixed(2);
    const IMMEDIATES: usize = 0;
    fn execute(_: &mut (), input: &[Value], output: &mut [Value], _: &[Value]) {
        output[0] = input[1];
        output[1] = input[0];
    }
}

pub(crate) struct Drop;
impl Instruction for Drop {
    const NAME: &'static str = "drop";
    const PARAMETERS: Arity = Arity::Fixed(1);
    const RETURNS: Arity = Arity::Fixed(0);
    const IMMEDIATES: usize = 0;
    fn execute(_: &mut (), _: &[Value], _: &mut [Value], _: &[Value]) {}
}

instruction_set! {
    pub(crate) enum FibSet { Const, Add, Sub, Lt, Dup, Swap, Drop }
}

/// Builds a program containing a single function `fib(n: i64) -> i64`
/// computing the Fibonacci sequence recursively.
pub(crate) fn build() -> (ProgramFragment<FibSet>, FunctionId) {
    let mut program = ProgramFragment::<FibSet>::new();
    let fib_id = program.declare("fib", 1, 1);
    let f = program.function_mut(fib_id);

    f.append::<Dup>(&[]);
    f.append::<Const>(&[Value::new(2i64)]);
    f.append::<Lt>(&[]);
    let branch = f.append_jump_if_not_placeholder();
    f.append_return();

    let else_start = InstructionIndex(f.len());
    f.set_value(branch, 0, Value::new(else_start - branch.start)).unwrap();

    f.append::<Dup>(&[]);
    f.append::<Const>(&[Value::new(1i64)]);
    f.append::<Sub>(&[]);
    f.append::<Const>(&[Value::new(fib_id)]);
    f.append_call(InstructionSpecification {
        parameters: 1,
        returns: 1,
    });
    f.append::<Swap>(&[]);
    f.append::<Dup>(&[]);
    f.append::<Const>(&[Value::new(2i64)]);
    f.append::<Sub>(&[]);
    f.append::<Const>(&[Value::new(fib_id)]);
    f.append_call(InstructionSpecification {
        parameters: 1,
        returns: 1,
    });
    f.append::<Swap>(&[]);
    f.append::<Drop>(&[]);
    f.append::<Add>(&[]);
    f.append_return();

    (program, fib_id)
}

pub(crate) fn invoke(program: &ProgramFragment<FibSet>, fib_id: FunctionId, n: i64) -> i64 {
    let mut stack = ValueStack::new();
    stack.push(Value::new(n));
    Interpreter::new(program).invoke(fib_id, &mut stack).unwrap();
    stack.as_slice()[0].as_type::<i64>()
}

#[test]
fn fib_of_fifteen_is_six_ten() {
    let (program, fib_id) = build();
    assert_eq!(invoke(&program, fib_id, 15), 610);
}

#[test]
fn fib_of_twenty_five_is_seventy_five_thousand_twenty_five() {
    let (program, fib_id) = build();
    assert_eq!(invoke(&program, fib_id, 25), 75025);
}

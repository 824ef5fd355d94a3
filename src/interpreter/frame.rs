//! Call-stack frames and per-invocation instruction state.

use std::any::{Any, TypeId};

use hashbrown::HashMap;

use crate::program::FunctionId;

/// A heterogeneous record of per-instruction-kind state, one slot per
/// distinct `FunctionState` type used by the instructions a function
/// body contains, default-constructed on first access. Stands in for
/// the source project's compile-time tuple-of-types, which Rust cannot
/// assemble without knowing every instruction kind's state type ahead of
/// time; a frame only ever touches the handful of slots its function
/// actually dispatches, so the lookup cost is in practice O(1).
#[derive(Default)]
pub struct StateTable {
    slots: HashMap<TypeId, Box<dyn Any>>,
}

impl StateTable {
    pub(crate) fn slot(&mut self, ty: TypeId, default: fn() -> Box<dyn Any>) -> &mut dyn Any {
        self.slots.entry(ty).or_insert_with(default).as_mut()
    }
}

/// One call-stack entry: where to resume the caller, and the state table
/// for the invocation currently running at the top of the stack.
pub(crate) struct Frame {
    /// `None` for the landing pad installed below the entry invocation;
    /// seeing it on `Return` ends interpretation.
    pub(crate) return_function: Option<FunctionId>,
    pub(crate) return_index: usize,
    pub(crate) state: StateTable,
}

impl Frame {
    pub(crate) fn landing_pad() -> Self {
        Frame {
            return_function: None,
            return_index: 0,
            state: StateTable::default(),
        }
    }
}

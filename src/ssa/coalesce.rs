//! Register coalescing.
//!
//! An instruction's outputs are always fresh virtual registers by
//! construction, even when the instruction's actual effect is to hand
//! back one of its own inputs unchanged (the builtin `Jump`'s implicit
//! passthrough is the extreme case, but plenty of user instructions —
//! a typed "dup", a no-op cast — have the same shape). An
//! [`crate::instruction::Instruction::IDENTIFY`] hook lets such an
//! instruction declare which of its outputs are actually equal to one
//! of its arguments; this pass collects those declarations across a
//! whole function and union-finds the registers (and any immediates
//! they turn out to be pinned to) into a single representative per
//! class, then rewrites every use.

use std::collections::{HashMap, HashSet};

use crate::instruction::InstructionSet;
use crate::ssa::{SsaBranch, SsaFunction, SsaRegister, SsaValue};

struct UnionFind {
    parent: HashMap<SsaRegister, SsaRegister>,
}

impl UnionFind {
    fn new() -> Self {
        UnionFind {
            parent: HashMap::new(),
        }
    }

    fn find(&mut self, r: SsaRegister) -> SsaRegister {
        let p = *self.parent.entry(r).or_insert(r);
        if p == r {
            r
        } else {
            let root = self.find(p);
            self.parent.insert(r, root);
            root
        }
    }

    fn union(&mut self, a: SsaRegister, b: SsaRegister) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent.insert(ra, rb);
        }
    }
}

/// A register identified as always equal to an immediate, rather than
/// to another register, pins its whole class to that immediate.
struct Pins {
    values: HashMap<SsaRegister, SsaValue>,
}

/// Runs every instruction's `IDENTIFY` hook across `function` and
/// rewrites all register uses — block parameters, instruction arguments
/// and branch arguments alike — to their coalesced representative.
/// Instructions whose every output was fully explained by `IDENTIFY` (and
/// which therefore contribute nothing beyond that identity) are dropped.
pub fn coalesce<Set: InstructionSet>(function: &mut SsaFunction) {
    let metadata = Set::metadata();
    let mut uf = UnionFind::new();
    let mut pins = Pins {
        values: HashMap::new(),
    };
    let mut identified: HashSet<SsaRegister> = HashSet::new();

    for block in &function.blocks {
        for inst in &block.instructions {
            let Some(identify) = metadata[inst.opcode.0 as usize].identify else {
                continue;
            };
            for (register, replacement) in identify(inst.output_count, &inst.arguments) {
                identified.insert(register);
                match replacement {
                    SsaValue::Register(other) => uf.union(register, other),
                    SsaValue::Immediate(v) => {
                        let root = uf.find(register);
                        pins.values.insert(root, SsaValue::Immediate(v));
                    }
                }
            }
        }
    }

    let resolve = |uf: &mut UnionFind, v: SsaValue| -> SsaValue {
        match v {
            SsaValue::Register(r) => {
                let root = uf.find(r);
                pins.values.get(&root).copied().unwrap_or(SsaValue::Register(root))
            }
            other => other,
        }
    };

    for block in &mut function.blocks {
        for p in &mut block.parameters {
            *p = uf.find(*p);
        }

        // An instruction whose outputs are every one a register that got
        // an IDENTIFY declaration contributes nothing beyond that
        // declaration once uses are rewritten to the representative;
        // snapshot which instructions qualify before their own output
        // registers are themselves rewritten below.
        let removable: Vec<bool> = block
            .instructions
            .iter()
            .map(|inst| {
                metadata[inst.opcode.0 as usize].identify.is_some()
                    && inst.output_count > 0
                    && inst
                        .outputs()
                        .iter()
                        .all(|v| matches!(v, SsaValue::Register(r) if identified.contains(r)))
            })
            .collect();

        for inst in &mut block.instructions {
            for arg in &mut inst.arguments {
                *arg = resolve(&mut uf, *arg);
            }
        }
        let mut keep = removable.into_iter();
        block.instructions.retain(|_| keep.next().unwrap_or(true));

        match &mut block.branch {
            SsaBranch::Unreachable => {}
            SsaBranch::Unconditional { arguments, .. } => {
                for a in arguments {
                    *a = resolve(&mut uf, *a);
                }
            }
            SsaBranch::Conditional {
                condition,
                true_arguments,
                false_arguments,
                ..
            } => {
                *condition = resolve(&mut uf, *condition);
                for a in true_arguments.iter_mut().chain(false_arguments.iter_mut()) {
                    *a = resolve(&mut uf, *a);
                }
            }
            SsaBranch::Return { arguments } => {
                for a in arguments {
                    *a = resolve(&mut uf, *a);
                }
            }
        }
    }
}

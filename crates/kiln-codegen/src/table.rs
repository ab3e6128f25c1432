//! Opcode-indexed evaluator dispatch.
//!
//! One table per target, built once and shared: the generic layer fills every
//! slot, then the target overlays the slots it does differently (or cannot do
//! at all). Slots keep a status alongside the function pointer so a tree can
//! be audited up front instead of faulting halfway through lowering.

use std::fmt;
use std::sync::OnceLock;

use kiln_ir::{NodeId, Opcode, Tree};

use crate::cg::{CodeGenerator, LowerError};
use crate::inst::Width;
use crate::linkage::Linkage;
use crate::reg::Reg;

/// One evaluator: lowers a single node, returning the register holding its
/// value (`None` for void nodes).
pub type Evaluator = fn(&mut CodeGenerator<'_>, NodeId) -> Option<Reg>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    Implemented,
    /// The target has no lowering (yet). The sentinel in the slot panics if
    /// reached, but [`EvaluatorTable::audit`] rejects such trees first.
    Unimplemented,
    /// The opcode belongs to a dialect this backend does not accept at all.
    Invalid,
}

#[derive(Clone, Copy)]
pub struct Entry {
    pub eval: Evaluator,
    pub status: SlotStatus,
}

fn unimplemented_sentinel(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let opcode = cg.tree().get(node).opcode();
    panic!(
        "opcode {} reached lowering without an evaluator on {}",
        opcode.name(),
        cg.target()
    );
}

fn invalid_sentinel(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let opcode = cg.tree().get(node).opcode();
    panic!(
        "invalid opcode {} reached lowering on {}",
        opcode.name(),
        cg.target()
    );
}

/// Dense `Opcode`-indexed dispatch table.
pub struct EvaluatorTable {
    entries: [Entry; Opcode::COUNT],
}

impl Default for EvaluatorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluatorTable {
    /// A table with every slot on the unimplemented sentinel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: [Entry {
                eval: unimplemented_sentinel,
                status: SlotStatus::Unimplemented,
            }; Opcode::COUNT],
        }
    }

    pub fn set(&mut self, opcode: Opcode, eval: Evaluator) {
        self.entries[opcode.index()] = Entry {
            eval,
            status: SlotStatus::Implemented,
        };
    }

    pub fn set_unimplemented(&mut self, opcode: Opcode) {
        self.entries[opcode.index()] = Entry {
            eval: unimplemented_sentinel,
            status: SlotStatus::Unimplemented,
        };
    }

    pub fn set_invalid(&mut self, opcode: Opcode) {
        self.entries[opcode.index()] = Entry {
            eval: invalid_sentinel,
            status: SlotStatus::Invalid,
        };
    }

    #[must_use]
    pub fn entry(&self, opcode: Opcode) -> Entry {
        self.entries[opcode.index()]
    }

    #[must_use]
    pub fn status(&self, opcode: Opcode) -> SlotStatus {
        self.entries[opcode.index()].status
    }

    /// Rejects a tree containing any opcode this table cannot lower, before
    /// any instruction is emitted.
    pub fn audit(&self, tree: &Tree, target: Target) -> Result<(), LowerError> {
        for i in 0..tree.len() {
            let opcode = tree.get(NodeId(i as u32)).opcode();
            match self.status(opcode) {
                SlotStatus::Implemented => {}
                SlotStatus::Unimplemented => {
                    return Err(LowerError::Unimplemented {
                        opcode: opcode.name(),
                        target,
                    })
                }
                SlotStatus::Invalid => {
                    return Err(LowerError::InvalidOpcode {
                        opcode: opcode.name(),
                        target,
                    })
                }
            }
        }
        Ok(())
    }
}

/// A lowering target. Tables are built on first use and shared for the life
/// of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    Amd64,
    I686,
}

impl Target {
    #[must_use]
    pub fn pointer_width(self) -> Width {
        match self {
            Target::Amd64 => Width::W64,
            Target::I686 => Width::W32,
        }
    }

    #[must_use]
    pub fn linkage(self) -> &'static Linkage {
        match self {
            Target::Amd64 => &Linkage::AMD64,
            Target::I686 => &Linkage::I686,
        }
    }

    #[must_use]
    pub fn table(self) -> &'static EvaluatorTable {
        static AMD64: OnceLock<EvaluatorTable> = OnceLock::new();
        static I686: OnceLock<EvaluatorTable> = OnceLock::new();
        match self {
            Target::Amd64 => AMD64.get_or_init(crate::eval::amd64::table),
            Target::I686 => I686.get_or_init(crate::eval::i686::table),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Target::Amd64 => "amd64",
            Target::I686 => "i686",
        })
    }
}

//! Tree-to-machine lowering for the kiln IR.
//!
//! A [`Target`] owns a dense opcode-indexed [`table::EvaluatorTable`]; the
//! generic evaluators in [`eval::common`] fill it and each target overlays
//! the slots it handles differently. [`lower_tree`] audits a tree against
//! the table, walks its statement list through a [`CodeGenerator`], and
//! returns a [`LoweredUnit`] the [`exec::Machine`] interpreter can run.
//!
//! Register lifetime follows the IR's use counts: evaluating a node pins a
//! register from a fixed-size pool, each consumer releases its use, and the
//! last release frees the register. There is no spilling; a tree that needs
//! more live values than the pool holds is a construction bug.

pub mod cg;
pub mod eval;
pub mod exec;
pub mod inst;
pub mod linkage;
pub mod pool;
pub mod reg;
pub mod table;

/// Allocatable register counts per file. rsp/rbp are excluded from the
/// general-purpose pool; the mask file reserves k0 for the hardware
/// all-ones encoding.
pub const GPR_POOL: usize = 14;
pub const FPR_POOL: usize = 14;
pub const VEC_POOL: usize = 14;
pub const MASK_POOL: usize = 7;

const _: () = {
    assert!(GPR_POOL <= 16);
    assert!(FPR_POOL <= 16);
    assert!(VEC_POOL <= 16);
    assert!(MASK_POOL <= 8);
};

pub use cg::{
    lower_tree, lower_tree_with, CodeGenerator, CodegenOptions, LowerError, LoweredUnit, NoHooks,
    Relocation, RuntimeHooks,
};
pub use exec::{Machine, RetKind, RunExit};
pub use inst::{Inst, TrapKind, Width};
pub use linkage::Linkage;
pub use reg::{Reg, RegKind};
pub use table::{Entry, Evaluator, EvaluatorTable, SlotStatus, Target};

//! The lowering engine: per-tree state, register lifetime, and the driver
//! that walks a [`Tree`]'s statement list through a target's evaluator table.
//!
//! Evaluation state lives here, not in the IR: `evaluated`, the cached result
//! handle, and the remaining-use count are side tables indexed by node, so
//! the same tree can be lowered for several targets. The contract every
//! evaluator follows:
//!
//! * call [`CodeGenerator::evaluate`] (or [`CodeGenerator::gen_use`]) for each
//!   child before using its value; re-evaluation of an already-evaluated node
//!   returns the cached handle and emits nothing;
//! * call [`CodeGenerator::release`] exactly once per child edge when done
//!   with the value; the handle returns to the free pool when the last
//!   consumer releases it;
//! * optionally [`CodeGenerator::steal`] a dying child's register as the
//!   destination instead of allocating a fresh one.
//!
//! Violations of the protocol (double release, using a void value) are bugs
//! in an evaluator, not conditions a caller can handle, and panic.

use std::sync::atomic::{AtomicUsize, Ordering};

use kiln_ir::{LabelId, NodeId, SymRef, Tree};
use thiserror::Error;

use crate::inst::{Inst, Label};
use crate::pool::Pool;
use crate::reg::{Reg, RegKind};
use crate::table::Target;
use crate::{FPR_POOL, GPR_POOL, MASK_POOL, VEC_POOL};

/// Knobs for a lowering run.
#[derive(Clone, Copy, Debug)]
pub struct CodegenOptions {
    /// Emit an explicit zero check before integer division and trap with
    /// [`crate::inst::TrapKind::DivByZero`] instead of relying on the
    /// hardware fault.
    pub emit_div_zero_checks: bool,
    /// Minimum case count before `switch` is considered for a jump table.
    pub jump_table_min_cases: usize,
    /// A jump table is used only when the case-value span is at most this
    /// factor times the case count; sparser switches fall back to a compare
    /// chain.
    pub jump_table_density: u32,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            emit_div_zero_checks: true,
            jump_table_min_cases: 4,
            jump_table_density: 2,
        }
    }
}

/// Host-runtime extension points invoked at fixed places in the lowering.
///
/// The default implementations do nothing; a runtime that needs, say, a
/// generational write barrier overrides [`RuntimeHooks::emit_store_barrier`]
/// and emits through the generator it is handed.
pub trait RuntimeHooks {
    /// Called after an address-typed store (`astore`/`astorei`) is emitted.
    fn emit_store_barrier(&self, _cg: &mut CodeGenerator<'_>, _node: NodeId) {}
}

/// No-op hooks; what [`lower_tree`] uses.
pub struct NoHooks;

impl RuntimeHooks for NoHooks {}

/// Why a tree was rejected before lowering started.
#[derive(Debug, Error)]
pub enum LowerError {
    #[error("opcode {opcode} has no evaluator on {target}")]
    Unimplemented { opcode: &'static str, target: Target },
    #[error("opcode {opcode} is not valid input for {target}")]
    InvalidOpcode { opcode: &'static str, target: Target },
}

/// A call site that refers to a function symbol; kept so a later link step
/// can patch the target without re-lowering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Relocation {
    /// Index of the `Call` instruction in [`LoweredUnit::insts`].
    pub inst: usize,
    pub sym: SymRef,
}

/// The product of lowering one tree.
#[derive(Debug)]
pub struct LoweredUnit {
    pub target: Target,
    pub insts: Vec<Inst>,
    /// Direct-call sites, in instruction order.
    pub relocations: Vec<Relocation>,
}

static UNITS_LOWERED: AtomicUsize = AtomicUsize::new(0);

/// Per-tree lowering state. Created by [`lower_tree`]; evaluators receive it
/// as their first argument.
pub struct CodeGenerator<'t> {
    tree: &'t Tree,
    target: Target,
    options: CodegenOptions,
    hooks: &'t dyn RuntimeHooks,
    insts: Vec<Inst>,
    evaluated: Vec<bool>,
    results: Vec<Option<Reg>>,
    uses_left: Vec<u32>,
    // Free lists per register kind, lowest index on top.
    free: [Vec<u8>; 4],
    ir_labels: Vec<Label>,
    next_label: u32,
    relocs: Pool<Relocation>,
}

impl<'t> CodeGenerator<'t> {
    fn new(
        tree: &'t Tree,
        target: Target,
        options: CodegenOptions,
        hooks: &'t dyn RuntimeHooks,
    ) -> Self {
        let n = tree.len();
        let free = [
            (0..GPR_POOL as u8).rev().collect(),
            (0..FPR_POOL as u8).rev().collect(),
            (0..VEC_POOL as u8).rev().collect(),
            (0..MASK_POOL as u8).rev().collect(),
        ];
        // IR labels take the first machine-label numbers.
        let ir_labels: Vec<Label> = (0..tree.label_count() as u32).map(Label).collect();
        Self {
            tree,
            target,
            options,
            hooks,
            insts: Vec::new(),
            evaluated: vec![false; n],
            results: vec![None; n],
            uses_left: tree.use_counts(),
            free,
            next_label: ir_labels.len() as u32,
            ir_labels,
            relocs: Pool::new(),
        }
    }

    #[must_use]
    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    #[must_use]
    pub fn target(&self) -> Target {
        self.target
    }

    #[must_use]
    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    pub fn emit(&mut self, inst: Inst) {
        self.insts.push(inst);
    }

    #[must_use]
    pub fn inst_count(&self) -> usize {
        self.insts.len()
    }

    fn fresh_label(&mut self) -> Label {
        let l = Label(self.next_label);
        self.next_label += 1;
        l
    }

    /// A new machine label, not yet bound.
    pub fn new_label(&mut self) -> Label {
        self.fresh_label()
    }

    /// Binds a machine label at the current position.
    pub fn bind(&mut self, label: Label) {
        self.insts.push(Inst::Label(label));
    }

    /// Machine label backing an IR branch target.
    #[must_use]
    pub fn ir_label(&self, label: LabelId) -> Label {
        self.ir_labels[label.index()]
    }

    /// Takes a register from `kind`'s free pool. Pool exhaustion means a tree
    /// deeper than the register file, which the lowering does not spill for.
    pub fn alloc(&mut self, kind: RegKind) -> Reg {
        let index = self.free[kind as usize]
            .pop()
            .unwrap_or_else(|| panic!("{kind:?} register pool exhausted"));
        Reg::new(kind, index)
    }

    /// Returns a register to its free pool.
    pub fn free(&mut self, reg: Reg) {
        let list = &mut self.free[reg.kind() as usize];
        debug_assert!(
            !list.contains(&(reg.index() as u8)),
            "register {reg} freed twice"
        );
        list.push(reg.index() as u8);
    }

    /// Evaluates a node, dispatching through the target's table on first
    /// visit and returning the cached handle afterwards. `None` means the
    /// node produces no value.
    pub fn evaluate(&mut self, node: NodeId) -> Option<Reg> {
        if self.evaluated[node.index()] {
            return self.results[node.index()];
        }
        let opcode = self.tree.get(node).opcode();
        tracing::trace!(node = %node, opcode = opcode.name(), "evaluate");
        let entry = self.target.table().entry(opcode);
        let result = (entry.eval)(self, node);
        self.evaluated[node.index()] = true;
        self.results[node.index()] = result;
        result
    }

    /// [`CodeGenerator::evaluate`] for value positions: panics if the node is
    /// void (or its register was already reclaimed, which is a protocol bug
    /// in the calling evaluator).
    pub fn gen_use(&mut self, node: NodeId) -> Reg {
        self.evaluate(node).unwrap_or_else(|| {
            panic!(
                "{} ({}) used as a value but produces none",
                node,
                self.tree.get(node).opcode().name()
            )
        })
    }

    /// Signals that one consumer of `node` is done. The last release frees
    /// the node's result register.
    pub fn release(&mut self, node: NodeId) {
        let i = node.index();
        assert!(
            self.uses_left[i] > 0,
            "{node} released more times than it is used"
        );
        self.uses_left[i] -= 1;
        if self.uses_left[i] == 0 {
            if let Some(reg) = self.results[i].take() {
                self.free(reg);
            }
        }
    }

    /// If this is the child's last use, takes over its register instead of
    /// going through the free pool. The caller becomes the owner and must
    /// not also [`CodeGenerator::release`] the child.
    pub fn steal(&mut self, node: NodeId) -> Option<Reg> {
        let i = node.index();
        if self.uses_left[i] == 1 {
            if let Some(reg) = self.results[i].take() {
                self.uses_left[i] = 0;
                return Some(reg);
            }
        }
        None
    }

    /// Registers currently holding live node results. Call lowering saves
    /// exactly this set around a call.
    #[must_use]
    pub fn live_regs(&self) -> Vec<Reg> {
        self.results.iter().flatten().copied().collect()
    }

    /// Records a direct-call site for later patching.
    pub fn record_relocation(&mut self, inst: usize, sym: SymRef) {
        self.relocs.insert(Relocation { inst, sym });
    }

    pub fn run_store_barrier(&mut self, node: NodeId) {
        let hooks = self.hooks;
        hooks.emit_store_barrier(self, node);
    }

    fn seal(self) -> LoweredUnit {
        let mut relocations: Vec<Relocation> = self.relocs.iter().map(|(_, &r)| r).collect();
        relocations.sort_unstable_by_key(|r| r.inst);
        LoweredUnit {
            target: self.target,
            insts: self.insts,
            relocations,
        }
    }
}

/// Lowers a tree for `target` with default options and no runtime hooks.
pub fn lower_tree(tree: &Tree, target: Target) -> Result<LoweredUnit, LowerError> {
    lower_tree_with(tree, target, CodegenOptions::default(), &NoHooks)
}

/// Lowers a tree: audits every opcode against the target's table, then walks
/// the statement list in order, binding branch labels at their root
/// positions.
pub fn lower_tree_with(
    tree: &Tree,
    target: Target,
    options: CodegenOptions,
    hooks: &dyn RuntimeHooks,
) -> Result<LoweredUnit, LowerError> {
    target.table().audit(tree, target)?;

    let mut cg = CodeGenerator::new(tree, target, options, hooks);

    // Positions in the root list each IR label is bound to.
    let mut labels_at: Vec<Vec<LabelId>> = vec![Vec::new(); tree.roots().len() + 1];
    for i in 0..tree.label_count() {
        let label = LabelId(i as u32);
        labels_at[tree.label_position(label)].push(label);
    }

    for (pos, &root) in tree.roots().iter().enumerate() {
        for &l in &labels_at[pos] {
            let label = cg.ir_label(l);
            cg.bind(label);
        }
        let _ = cg.evaluate(root);
        cg.release(root);
    }
    for &l in &labels_at[tree.roots().len()] {
        let label = cg.ir_label(l);
        cg.bind(label);
    }

    let unit = cg.seal();
    let n = UNITS_LOWERED.fetch_add(1, Ordering::Relaxed) + 1;
    tracing::debug!(
        target: "kiln::lower",
        unit = n,
        arch = %target,
        roots = tree.roots().len(),
        insts = unit.insts.len(),
        relocations = unit.relocations.len(),
        "lowered tree"
    );
    Ok(unit)
}

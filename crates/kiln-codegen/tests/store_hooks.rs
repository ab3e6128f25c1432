//! Runtime hooks fire after address stores; fences lower to fences.

use kiln_codegen::inst::{FenceKind, Inst};
use kiln_codegen::{
    lower_tree, lower_tree_with, CodeGenerator, CodegenOptions, RuntimeHooks, Target,
};
use kiln_ir::{DataType, NodeId, Opcode, Payload, Tree};

struct BarrierHooks;

impl RuntimeHooks for BarrierHooks {
    fn emit_store_barrier(&self, cg: &mut CodeGenerator<'_>, _node: NodeId) {
        cg.emit(Inst::Fence {
            kind: FenceKind::Store,
        });
    }
}

fn fence_count(insts: &[Inst]) -> usize {
    insts
        .iter()
        .filter(|i| matches!(i, Inst::Fence { .. }))
        .count()
}

fn address_store_tree() -> Tree {
    let mut t = Tree::new();
    let slot = t.symbols.data("slot", 0, DataType::Address);
    let p = t.aconst(0x40);
    let st = t.node_with(Opcode::AStore, &[p], Payload::Sym(slot));
    t.root(st);
    t
}

#[test]
fn barrier_hook_runs_after_address_stores() {
    let t = address_store_tree();
    let unit = lower_tree_with(&t, Target::Amd64, CodegenOptions::default(), &BarrierHooks).unwrap();
    assert_eq!(fence_count(&unit.insts), 1);

    // The barrier follows the store.
    let store_at = unit
        .insts
        .iter()
        .position(|i| matches!(i, Inst::Store { .. }))
        .unwrap();
    assert!(matches!(
        unit.insts[store_at + 1],
        Inst::Fence {
            kind: FenceKind::Store
        }
    ));
}

#[test]
fn barrier_hook_runs_after_indirect_address_stores() {
    let mut t = Tree::new();
    let base = t.aconst(8);
    let p = t.aconst(0x40);
    let st = t.node_with(Opcode::AStoreI, &[base, p], Payload::Offset(0));
    t.root(st);

    let unit = lower_tree_with(&t, Target::Amd64, CodegenOptions::default(), &BarrierHooks).unwrap();
    assert_eq!(fence_count(&unit.insts), 1);
}

#[test]
fn integer_stores_do_not_trigger_the_barrier() {
    let mut t = Tree::new();
    let x = t.symbols.data("x", 0, DataType::Int32);
    let v = t.iconst(1);
    let st = t.node_with(Opcode::IStore, &[v], Payload::Sym(x));
    t.root(st);

    let unit = lower_tree_with(&t, Target::Amd64, CodegenOptions::default(), &BarrierHooks).unwrap();
    assert_eq!(fence_count(&unit.insts), 0);
}

#[test]
fn default_hooks_emit_nothing() {
    let t = address_store_tree();
    let unit = lower_tree(&t, Target::Amd64).unwrap();
    assert_eq!(fence_count(&unit.insts), 0);
}

#[test]
fn fence_opcodes_lower_to_fences() {
    let mut t = Tree::new();
    for op in [Opcode::Fence, Opcode::LoadFence, Opcode::StoreFence] {
        let f = t.node(op, &[]);
        t.root(f);
    }

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let kinds: Vec<FenceKind> = unit
        .insts
        .iter()
        .filter_map(|i| match i {
            Inst::Fence { kind } => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, [FenceKind::Full, FenceKind::Load, FenceKind::Store]);
}

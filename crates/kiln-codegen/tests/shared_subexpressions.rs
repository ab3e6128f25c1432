//! A node referenced from several parents is evaluated once; later consumers
//! get the cached register.

use kiln_codegen::inst::Inst;
use kiln_codegen::reg::gpr;
use kiln_codegen::{lower_tree, Machine, RunExit, Target};
use kiln_ir::{DataType, Opcode, Payload, Tree};

#[test]
fn shared_load_is_issued_once() {
    // sum = x + x: one load, both add operands from the same register.
    let mut t = Tree::new();
    let x = t.symbols.data("x", 0, DataType::Int32);
    let xv = t.node_with(Opcode::ILoad, &[], Payload::Sym(x));
    let sum = t.node(Opcode::IAdd, &[xv, xv]);
    let ret = t.node(Opcode::IReturn, &[sum]);
    t.root(ret);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let loads = unit
        .insts
        .iter()
        .filter(|i| matches!(i, Inst::Load { .. }))
        .count();
    assert_eq!(loads, 1);

    let mut m = Machine::new(16);
    m.write_u32(0, 21);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(m.gpr_value(gpr(0)), 42);
}

#[test]
fn shared_subtree_across_statements() {
    // The same expression node feeds two stores; the arithmetic runs once.
    let mut t = Tree::new();
    let x = t.symbols.data("x", 0, DataType::Int32);
    let a = t.symbols.data("a", 4, DataType::Int32);
    let b = t.symbols.data("b", 8, DataType::Int32);
    let xv = t.node_with(Opcode::ILoad, &[], Payload::Sym(x));
    let seven = t.iconst(7);
    let scaled = t.node(Opcode::IMul, &[xv, seven]);
    let st_a = t.node_with(Opcode::IStore, &[scaled], Payload::Sym(a));
    let st_b = t.node_with(Opcode::IStore, &[scaled], Payload::Sym(b));
    t.root(st_a);
    t.root(st_b);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let muls = unit
        .insts
        .iter()
        .filter(|i| matches!(i, Inst::Alu { op: kiln_codegen::inst::AluOp::Imul, .. }))
        .count();
    assert_eq!(muls, 1);

    let mut m = Machine::new(16);
    m.write_u32(0, 6);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(m.read_u32(4), 42);
    assert_eq!(m.read_u32(8), 42);
}

#[test]
fn deep_sharing_still_fits_the_register_file() {
    // A diamond ladder: each level references the previous one twice. With
    // caching this is linear; without it the tree is exponential.
    let mut t = Tree::new();
    let mut level = t.iconst(1);
    for _ in 0..30 {
        level = t.node(Opcode::IAdd, &[level, level]);
    }
    let ret = t.node(Opcode::IReturn, &[level]);
    t.root(ret);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = Machine::new(16);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(m.gpr_value(gpr(0)), 1 << 30);
}

//! Sub-word loads extend, sub-word stores truncate.

use kiln_codegen::reg::gpr;
use kiln_codegen::{lower_tree, Machine, RunExit, Target};
use kiln_ir::{DataType, Opcode, Payload, Tree};

fn load_and_return(op: Opcode, ty: DataType, setup: impl FnOnce(&mut Machine)) -> u64 {
    let mut t = Tree::new();
    let src = t.symbols.data("src", 0, ty);
    let v = t.node_with(op, &[], Payload::Sym(src));
    let ret = t.node(Opcode::IReturn, &[v]);
    t.root(ret);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = Machine::new(16);
    setup(&mut m);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    m.gpr_value(gpr(0))
}

#[test]
fn byte_loads_extend() {
    let signed = load_and_return(Opcode::BLoad, DataType::Int8, |m| m.write_u8(0, 0x80));
    assert_eq!(signed as u32 as i32, -128);
    let unsigned = load_and_return(Opcode::BULoad, DataType::Int8, |m| m.write_u8(0, 0x80));
    assert_eq!(unsigned, 0x80);
}

#[test]
fn short_loads_extend() {
    let signed = load_and_return(Opcode::SLoad, DataType::Int16, |m| m.write_u16(0, 0x8001));
    assert_eq!(signed as u32, 0xffff_8001);
    let unsigned = load_and_return(Opcode::SULoad, DataType::Int16, |m| m.write_u16(0, 0x8001));
    assert_eq!(unsigned, 0x8001);
}

#[test]
fn byte_store_leaves_neighbours_alone() {
    let mut t = Tree::new();
    let dst = t.symbols.data("dst", 4, DataType::Int8);
    let v = t.iconst(0x1234);
    let st = t.node_with(Opcode::BStore, &[v], Payload::Sym(dst));
    t.root(st);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = Machine::new(16);
    m.write_u32(4, 0xaaaa_aaaa);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(m.read_u32(4), 0xaaaa_aa34);
}

#[test]
fn short_store_truncates() {
    let mut t = Tree::new();
    let dst = t.symbols.data("dst", 0, DataType::Int16);
    let v = t.iconst(0x0005_4321);
    let st = t.node_with(Opcode::SStore, &[v], Payload::Sym(dst));
    t.root(st);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = Machine::new(16);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(m.read_u32(0), 0x4321);
}

#[test]
fn indirect_access_applies_the_displacement() {
    // mem[base + 8] through a computed address, then back out again.
    let mut t = Tree::new();
    let base = t.aconst(4);
    let v = t.node_with(Opcode::ILoadI, &[base], Payload::Offset(8));
    let base2 = t.aconst(0);
    let st = t.node_with(Opcode::IStoreI, &[base2, v], Payload::Offset(0));
    t.root(st);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = Machine::new(32);
    m.write_u32(12, 0xdead_beef);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(m.read_u32(0), 0xdead_beef);
}

#[test]
fn wide_load_and_store() {
    let mut t = Tree::new();
    let src = t.symbols.data("src", 0, DataType::Int64);
    let dst = t.symbols.data("dst", 8, DataType::Int64);
    let v = t.node_with(Opcode::LLoad, &[], Payload::Sym(src));
    let one = t.lconst(1);
    let sum = t.node(Opcode::LAdd, &[v, one]);
    let st = t.node_with(Opcode::LStore, &[sum], Payload::Sym(dst));
    t.root(st);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = Machine::new(16);
    m.write_u64(0, 0xffff_ffff);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(m.read_u64(8), 0x1_0000_0000);
}

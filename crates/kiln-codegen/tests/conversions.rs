//! Numeric conversions and bit reinterpretation.

use kiln_codegen::reg::{fpr, gpr};
use kiln_codegen::{lower_tree, Machine, RunExit, Target};
use kiln_ir::{NodeId, Opcode, Tree};

fn run(t: &Tree) -> Machine {
    let unit = lower_tree(t, Target::Amd64).unwrap();
    let mut m = Machine::new(16);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    m
}

fn int_result(t: &mut Tree, v: NodeId) -> u64 {
    let ret = t.node(Opcode::IReturn, &[v]);
    t.root(ret);
    run(t).gpr_value(gpr(0))
}

fn long_result(t: &mut Tree, v: NodeId) -> u64 {
    let ret = t.node(Opcode::LReturn, &[v]);
    t.root(ret);
    run(t).gpr_value(gpr(0))
}

#[test]
fn int_to_float_and_back() {
    let mut t = Tree::new();
    let v = t.iconst(7);
    let f = t.node(Opcode::I2F, &[v]);
    let ret = t.node(Opcode::FReturn, &[f]);
    t.root(ret);
    assert_eq!(run(&t).fpr_f32(fpr(0)), 7.0);

    for (x, want) in [(3.9f32, 3i32), (-3.9, -3), (0.0, 0)] {
        let mut t = Tree::new();
        let f = t.fconst(x);
        let i = t.node(Opcode::F2I, &[f]);
        assert_eq!(int_result(&mut t, i) as u32 as i32, want, "f2i({x})");
    }
}

#[test]
fn float_to_int_out_of_range_yields_integer_indefinite() {
    for x in [f32::NAN, 3e9, -3e9, f32::INFINITY] {
        let mut t = Tree::new();
        let f = t.fconst(x);
        let i = t.node(Opcode::F2I, &[f]);
        assert_eq!(int_result(&mut t, i) as u32 as i32, i32::MIN, "f2i({x})");
    }
    let mut t = Tree::new();
    let d = t.dconst(f64::NAN);
    let i = t.node(Opcode::D2I, &[d]);
    assert_eq!(int_result(&mut t, i) as u32 as i32, i32::MIN);
}

#[test]
fn precision_changes() {
    let mut t = Tree::new();
    let f = t.fconst(1.5);
    let d = t.node(Opcode::F2D, &[f]);
    let ret = t.node(Opcode::DReturn, &[d]);
    t.root(ret);
    assert_eq!(run(&t).fpr_f64(fpr(0)), 1.5);

    // Narrowing rounds to the nearest representable f32.
    let mut t = Tree::new();
    let d = t.dconst(1.000_000_000_1);
    let f = t.node(Opcode::D2F, &[d]);
    let ret = t.node(Opcode::FReturn, &[f]);
    t.root(ret);
    assert_eq!(run(&t).fpr_f32(fpr(0)), 1.0);
}

#[test]
fn bit_reinterpretation_is_lossless() {
    let bits: u32 = 0x4049_0fdb;
    let mut t = Tree::new();
    let i = t.iconst(bits as i32);
    let f = t.node(Opcode::IBits2F, &[i]);
    let back = t.node(Opcode::FBits2I, &[f]);
    assert_eq!(int_result(&mut t, back) as u32, bits);

    let mut t = Tree::new();
    let d = t.dconst(1.5);
    let l = t.node(Opcode::DBits2L, &[d]);
    assert_eq!(long_result(&mut t, l), 1.5f64.to_bits());

    let mut t = Tree::new();
    let l = t.lconst((-2.0f64).to_bits() as i64);
    let d = t.node(Opcode::LBits2D, &[l]);
    let ret = t.node(Opcode::DReturn, &[d]);
    t.root(ret);
    assert_eq!(run(&t).fpr_f64(fpr(0)), -2.0);
}

#[test]
fn widening_follows_the_source_signedness() {
    let mut t = Tree::new();
    let v = t.iconst(-5);
    let l = t.node(Opcode::I2L, &[v]);
    assert_eq!(long_result(&mut t, l), (-5i64) as u64);

    let mut t = Tree::new();
    let v = t.iconst(-5);
    let l = t.node(Opcode::IU2L, &[v]);
    assert_eq!(long_result(&mut t, l), 0xffff_fffb);
}

#[test]
fn truncation_drops_the_upper_half() {
    let mut t = Tree::new();
    let v = t.lconst(0x1_0000_0002);
    let i = t.node(Opcode::L2I, &[v]);
    assert_eq!(int_result(&mut t, i), 2);
}

#[test]
fn byte_and_short_conversions() {
    let mut t = Tree::new();
    let v = t.iconst(0x1ff);
    let b = t.node(Opcode::I2B, &[v]);
    assert_eq!(int_result(&mut t, b) as u32, 0xffff_ffff);

    let mut t = Tree::new();
    let v = t.iconst(0x1ff);
    let b = t.node(Opcode::BU2I, &[v]);
    assert_eq!(int_result(&mut t, b), 0xff);

    let mut t = Tree::new();
    let v = t.iconst(0x1234_8765);
    let s = t.node(Opcode::S2I, &[v]);
    assert_eq!(int_result(&mut t, s) as u32, 0xffff_8765);

    let mut t = Tree::new();
    let v = t.iconst(0x1234_8765);
    let s = t.node(Opcode::SU2I, &[v]);
    assert_eq!(int_result(&mut t, s), 0x8765);
}

#[test]
fn byteswap() {
    let mut t = Tree::new();
    let v = t.iconst(0x1234_5678);
    let b = t.node(Opcode::IByteswap, &[v]);
    assert_eq!(int_result(&mut t, b), 0x7856_3412);

    let mut t = Tree::new();
    let v = t.lconst(0x0102_0304_0506_0708);
    let b = t.node(Opcode::LByteswap, &[v]);
    assert_eq!(long_result(&mut t, b), 0x0807_0605_0403_0201);
}

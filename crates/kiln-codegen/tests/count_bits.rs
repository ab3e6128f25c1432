//! Bit counting on both targets, including the defined-at-zero contract the
//! i686 lowering has to synthesize with branches.

use kiln_codegen::reg::gpr;
use kiln_codegen::{lower_tree, Machine, RunExit, Target};
use kiln_ir::{Opcode, Tree};

fn unary_i32(target: Target, op: Opcode, v: i32) -> u64 {
    let mut t = Tree::new();
    let x = t.iconst(v);
    let n = t.node(op, &[x]);
    let ret = t.node(Opcode::IReturn, &[n]);
    t.root(ret);

    let unit = lower_tree(&t, target).unwrap();
    let mut m = Machine::new(16);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    m.gpr_value(gpr(0))
}

fn unary_i64(op: Opcode, v: i64) -> u64 {
    let mut t = Tree::new();
    let x = t.lconst(v);
    let n = t.node(op, &[x]);
    let ret = t.node(Opcode::LReturn, &[n]);
    t.root(ret);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = Machine::new(16);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    m.gpr_value(gpr(0))
}

#[test]
fn popcnt() {
    assert_eq!(unary_i32(Target::Amd64, Opcode::IPopcnt, 0), 0);
    assert_eq!(unary_i32(Target::Amd64, Opcode::IPopcnt, 0xf0f0), 8);
    assert_eq!(unary_i32(Target::Amd64, Opcode::IPopcnt, -1), 32);
    assert_eq!(unary_i64(Opcode::LPopcnt, -1), 64);
    assert_eq!(unary_i64(Opcode::LPopcnt, 1 << 40), 1);
}

#[test]
fn zero_counts_are_defined_at_zero() {
    for target in [Target::Amd64, Target::I686] {
        assert_eq!(unary_i32(target, Opcode::IClz, 0), 32, "{target}");
        assert_eq!(unary_i32(target, Opcode::ICtz, 0), 32, "{target}");
    }
    assert_eq!(unary_i64(Opcode::LClz, 0), 64);
    assert_eq!(unary_i64(Opcode::LCtz, 0), 64);
}

#[test]
fn zero_counts_agree_across_targets() {
    for v in [1i32, 8, 0x40, i32::MIN, -1, 0x0001_0000, 3] {
        let want_clz = u64::from(v.leading_zeros());
        let want_ctz = u64::from(v.trailing_zeros());
        for target in [Target::Amd64, Target::I686] {
            assert_eq!(
                unary_i32(target, Opcode::IClz, v),
                want_clz,
                "iclz({v:#x}) on {target}"
            );
            assert_eq!(
                unary_i32(target, Opcode::ICtz, v),
                want_ctz,
                "ictz({v:#x}) on {target}"
            );
        }
    }
}

#[test]
fn wide_zero_counts() {
    assert_eq!(unary_i64(Opcode::LClz, 1), 63);
    assert_eq!(unary_i64(Opcode::LCtz, 1 << 40), 40);
    assert_eq!(unary_i64(Opcode::LClz, i64::MIN), 0);
}

#[test]
fn bit_compress_and_expand() {
    let mut t = Tree::new();
    let v = t.iconst(0xaa);
    let mask = t.iconst(0xcc);
    let n = t.node(Opcode::ICompressBits, &[v, mask]);
    let ret = t.node(Opcode::IReturn, &[n]);
    t.root(ret);
    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = Machine::new(16);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(m.gpr_value(gpr(0)), 0b1010);

    let mut t = Tree::new();
    let v = t.iconst(0b1010);
    let mask = t.iconst(0xcc);
    let n = t.node(Opcode::IExpandBits, &[v, mask]);
    let ret = t.node(Opcode::IReturn, &[n]);
    t.root(ret);
    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = Machine::new(16);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(m.gpr_value(gpr(0)), 0x88);
}

//! Lane-mask combinators and the all/any tests.

use kiln_codegen::reg::gpr;
use kiln_codegen::{lower_tree, Machine, RunExit, Target};
use kiln_ir::{NodeId, Opcode, Payload, Tree};

/// A mask that is set exactly in the lanes where the vector at `mem_off`
/// holds a positive value; the machine setup writes the wanted pattern.
fn positive_lanes(t: &mut Tree, mem_off: i32) -> NodeId {
    let base = t.aconst(0);
    let v = t.node_with(Opcode::VLoadI, &[base], Payload::Offset(mem_off));
    let zero = t.iconst(0);
    let zv = t.node(Opcode::VSplatsI, &[zero]);
    t.node(Opcode::VCmpGtI, &[v, zv])
}

fn write_pattern(m: &mut Machine, off: usize, bits: u8) {
    for i in 0..4 {
        m.write_u32(off + 4 * i, u32::from(bits >> i & 1));
    }
}

fn run_mask_expr(build: impl FnOnce(&mut Tree, NodeId, NodeId) -> NodeId, a: u8, b: u8) -> u64 {
    let mut t = Tree::new();
    let ma = positive_lanes(&mut t, 0);
    let mb = positive_lanes(&mut t, 16);
    let result = build(&mut t, ma, mb);
    let ret = t.node(Opcode::IReturn, &[result]);
    t.root(ret);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = Machine::new(48);
    write_pattern(&mut m, 0, a);
    write_pattern(&mut m, 16, b);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    m.gpr_value(gpr(0))
}

#[test]
fn any_true() {
    let any = |t: &mut Tree, ma: NodeId, _mb: NodeId| t.node(Opcode::MAnyTrue, &[ma]);
    assert_eq!(run_mask_expr(any, 0b0000, 0), 0);
    assert_eq!(run_mask_expr(any, 0b0100, 0), 1);
    assert_eq!(run_mask_expr(any, 0b1111, 0), 1);
}

#[test]
fn all_true() {
    let all = |t: &mut Tree, ma: NodeId, _mb: NodeId| t.node(Opcode::MAllTrue, &[ma]);
    assert_eq!(run_mask_expr(all, 0b1111, 0), 1);
    assert_eq!(run_mask_expr(all, 0b0111, 0), 0);
    assert_eq!(run_mask_expr(all, 0b0000, 0), 0);
}

#[test]
fn and_or_not() {
    let and_any = |t: &mut Tree, ma: NodeId, mb: NodeId| {
        let m = t.node(Opcode::MAnd, &[ma, mb]);
        t.node(Opcode::MAnyTrue, &[m])
    };
    assert_eq!(run_mask_expr(and_any, 0b1100, 0b0011), 0);
    assert_eq!(run_mask_expr(and_any, 0b1100, 0b0110), 1);

    let or_all = |t: &mut Tree, ma: NodeId, mb: NodeId| {
        let m = t.node(Opcode::MOr, &[ma, mb]);
        t.node(Opcode::MAllTrue, &[m])
    };
    assert_eq!(run_mask_expr(or_all, 0b1100, 0b0011), 1);
    assert_eq!(run_mask_expr(or_all, 0b1100, 0b0010), 0);

    let not_any = |t: &mut Tree, ma: NodeId, _mb: NodeId| {
        let m = t.node(Opcode::MNot, &[ma]);
        t.node(Opcode::MAnyTrue, &[m])
    };
    assert_eq!(run_mask_expr(not_any, 0b1111, 0), 0);
    assert_eq!(run_mask_expr(not_any, 0b1110, 0), 1);
}

#[test]
fn mask_drives_a_blend() {
    // not(a > 0) selects the fallback vector everywhere a is nonpositive.
    let mut t = Tree::new();
    let m = positive_lanes(&mut t, 0);
    let inv = t.node(Opcode::MNot, &[m]);
    let ones = t.iconst(1);
    let vt = t.node(Opcode::VSplatsI, &[ones]);
    let nines = t.iconst(9);
    let ve = t.node(Opcode::VSplatsI, &[nines]);
    let blended = t.node(Opcode::VBlendI, &[inv, vt, ve]);
    let base = t.aconst(0);
    let st = t.node_with(Opcode::VStoreI, &[base, blended], Payload::Offset(16));
    t.root(st);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = Machine::new(48);
    write_pattern(&mut m, 0, 0b0101);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    let out = [
        m.read_u32(16),
        m.read_u32(20),
        m.read_u32(24),
        m.read_u32(28),
    ];
    // Lanes 0 and 2 are positive, so their inverted-mask bit is clear and
    // they keep the fallback 9.
    assert_eq!(out, [9, 1, 9, 1]);
}

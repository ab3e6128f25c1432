//! 4x32 vector lowering on amd64: element ops, compares into masks,
//! blends, permutes, and reductions.

use kiln_codegen::reg::gpr;
use kiln_codegen::{lower_tree, Machine, RunExit, Target};
use kiln_ir::{NodeId, Opcode, Payload, Tree};

const A_OFF: i32 = 0;
const B_OFF: i32 = 16;
const OUT_OFF: i32 = 32;

fn load_vec(t: &mut Tree, off: i32) -> NodeId {
    let base = t.aconst(0);
    t.node_with(Opcode::VLoadI, &[base], Payload::Offset(off))
}

fn store_vec(t: &mut Tree, v: NodeId) {
    let base = t.aconst(0);
    let st = t.node_with(Opcode::VStoreI, &[base, v], Payload::Offset(OUT_OFF));
    t.root(st);
}

fn machine_with(a: [u32; 4], b: [u32; 4]) -> Machine {
    let mut m = Machine::new(64);
    for (i, v) in a.into_iter().enumerate() {
        m.write_u32(A_OFF as usize + 4 * i, v);
    }
    for (i, v) in b.into_iter().enumerate() {
        m.write_u32(B_OFF as usize + 4 * i, v);
    }
    m
}

fn out_lanes(m: &Machine) -> [u32; 4] {
    [
        m.read_u32(OUT_OFF as usize),
        m.read_u32(OUT_OFF as usize + 4),
        m.read_u32(OUT_OFF as usize + 8),
        m.read_u32(OUT_OFF as usize + 12),
    ]
}

fn binary(op: Opcode, a: [u32; 4], b: [u32; 4]) -> [u32; 4] {
    let mut t = Tree::new();
    let va = load_vec(&mut t, A_OFF);
    let vb = load_vec(&mut t, B_OFF);
    let n = t.node(op, &[va, vb]);
    store_vec(&mut t, n);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = machine_with(a, b);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    out_lanes(&m)
}

#[test]
fn splat_fills_every_lane() {
    let mut t = Tree::new();
    let s = t.iconst(7);
    let v = t.node(Opcode::VSplatsI, &[s]);
    store_vec(&mut t, v);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = Machine::new(64);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(out_lanes(&m), [7; 4]);
}

#[test]
fn lanewise_arithmetic() {
    assert_eq!(
        binary(Opcode::VAddI, [1, 2, 3, 4], [10, 20, 30, 40]),
        [11, 22, 33, 44]
    );
    assert_eq!(
        binary(Opcode::VSubI, [10, 20, 30, 40], [1, 2, 3, 4]),
        [9, 18, 27, 36]
    );
    assert_eq!(
        binary(Opcode::VMulI, [1, 2, 3, u32::MAX], [5, 5, 5, 2]),
        [5, 10, 15, u32::MAX - 1]
    );
    assert_eq!(
        binary(Opcode::VXorI, [0xff, 0, 1, 2], [0x0f, 0, 1, 3]),
        [0xf0, 0, 0, 1]
    );
}

#[test]
fn signed_min_max() {
    let a = [1, (-5i32) as u32, 7, 3];
    let b = [2, (-6i32) as u32, 7, (-1i32) as u32];
    assert_eq!(
        binary(Opcode::VMinI, a, b),
        [1, (-6i32) as u32, 7, (-1i32) as u32]
    );
    assert_eq!(binary(Opcode::VMaxI, a, b), [2, (-5i32) as u32, 7, 3]);
}

#[test]
fn compare_then_blend_selects_lanewise() {
    // max(a, b) spelled as blend(a > b, a, b).
    let mut t = Tree::new();
    let va = load_vec(&mut t, A_OFF);
    let vb = load_vec(&mut t, B_OFF);
    let mask = t.node(Opcode::VCmpGtI, &[va, vb]);
    let va2 = load_vec(&mut t, A_OFF);
    let vb2 = load_vec(&mut t, B_OFF);
    let blended = t.node(Opcode::VBlendI, &[mask, va2, vb2]);
    store_vec(&mut t, blended);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = machine_with(
        [5, 1, (-3i32) as u32, 9],
        [2, 8, (-1i32) as u32, 9],
    );
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(out_lanes(&m), [5, 8, (-1i32) as u32, 9]);
}

#[test]
fn masked_add_merges_unselected_lanes() {
    // Lanes where a == b get a + b; the rest keep a.
    let mut t = Tree::new();
    let va = load_vec(&mut t, A_OFF);
    let vb = load_vec(&mut t, B_OFF);
    let mask = t.node(Opcode::VCmpEqI, &[va, vb]);
    let va2 = load_vec(&mut t, A_OFF);
    let vb2 = load_vec(&mut t, B_OFF);
    let n = t.node(Opcode::VMAddI, &[va2, vb2, mask]);
    store_vec(&mut t, n);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = machine_with([4, 5, 6, 7], [4, 9, 6, 1]);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(out_lanes(&m), [8, 5, 12, 7]);
}

#[test]
fn masked_float_add_merges_unselected_lanes() {
    // Lanes where a < b get a + b; the rest keep a.
    let mut t = Tree::new();
    let base = t.aconst(0);
    let va = t.node_with(Opcode::VLoadF, &[base], Payload::Offset(A_OFF));
    let base = t.aconst(0);
    let vb = t.node_with(Opcode::VLoadF, &[base], Payload::Offset(B_OFF));
    let mask = t.node(Opcode::VCmpLtF, &[va, vb]);
    let base = t.aconst(0);
    let va2 = t.node_with(Opcode::VLoadF, &[base], Payload::Offset(A_OFF));
    let base = t.aconst(0);
    let vb2 = t.node_with(Opcode::VLoadF, &[base], Payload::Offset(B_OFF));
    let n = t.node(Opcode::VMAddF, &[va2, vb2, mask]);
    let base = t.aconst(0);
    let st = t.node_with(Opcode::VStoreF, &[base, n], Payload::Offset(OUT_OFF));
    t.root(st);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let a = [1.0f32, 4.0, -2.0, 8.0].map(f32::to_bits);
    let b = [2.0f32, 3.0, -1.0, 8.0].map(f32::to_bits);
    let mut m = machine_with(a, b);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(out_lanes(&m).map(f32::from_bits), [3.0, 4.0, -3.0, 8.0]);
}

#[test]
fn permute_rearranges_lanes() {
    let mut t = Tree::new();
    let va = load_vec(&mut t, A_OFF);
    let p = t.node_with(Opcode::VPermI, &[va], Payload::Lanes([3, 2, 1, 0]));
    store_vec(&mut t, p);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = machine_with([10, 20, 30, 40], [0; 4]);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(out_lanes(&m), [40, 30, 20, 10]);
}

#[test]
fn integer_reductions() {
    let cases: [(Opcode, [u32; 4], u32); 5] = [
        (Opcode::VReduceAddI, [1, 2, 3, 4], 10),
        (
            Opcode::VReduceMinI,
            [5, (-2i32) as u32, 9, 0],
            (-2i32) as u32,
        ),
        (Opcode::VReduceMaxI, [5, (-2i32) as u32, 9, 0], 9),
        (Opcode::VReduceXorI, [0xf0, 0x0f, 0xff, 0], 0),
        (Opcode::VReduceOrI, [1, 2, 4, 8], 0xf),
    ];
    for (op, lanes, want) in cases {
        let mut t = Tree::new();
        let v = load_vec(&mut t, A_OFF);
        let r = t.node(op, &[v]);
        let ret = t.node(Opcode::IReturn, &[r]);
        t.root(ret);

        let unit = lower_tree(&t, Target::Amd64).unwrap();
        let mut m = machine_with(lanes, [0; 4]);
        assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
        assert_eq!(m.gpr_value(gpr(0)) as u32, want, "{}", op.name());
    }
}

#[test]
fn float_lanes() {
    let a = [1.5f32, -2.0, 0.25, 8.0].map(f32::to_bits);
    let b = [0.5f32, 2.0, 0.25, 2.0].map(f32::to_bits);
    let sum = binary(Opcode::VAddF, a, b).map(f32::from_bits);
    assert_eq!(sum, [2.0, 0.0, 0.5, 10.0]);
    let quot = binary(Opcode::VDivF, a, b).map(f32::from_bits);
    assert_eq!(quot, [3.0, -1.0, 1.0, 4.0]);
}

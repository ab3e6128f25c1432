//! Division edge cases: the zero-divisor trap and INT_MIN / -1 wrapping.

use kiln_codegen::reg::gpr;
use kiln_codegen::{
    lower_tree, lower_tree_with, CodegenOptions, Machine, NoHooks, RunExit, Target, TrapKind,
};
use kiln_ir::{Opcode, Tree};

fn divide(op: Opcode, a: i32, b: i32) -> (RunExit, u64) {
    let mut t = Tree::new();
    let av = t.iconst(a);
    let bv = t.iconst(b);
    let d = t.node(op, &[av, bv]);
    let ret = t.node(Opcode::IReturn, &[d]);
    t.root(ret);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = Machine::new(16);
    let exit = m.run(&unit, &t.symbols);
    (exit, m.gpr_value(gpr(0)))
}

#[test]
fn quotient_and_remainder() {
    assert_eq!(divide(Opcode::IDiv, 7, 2), (RunExit::Return, 3));
    assert_eq!(divide(Opcode::IRem, 7, 2), (RunExit::Return, 1));
    assert_eq!(
        divide(Opcode::IDiv, -7, 2),
        (RunExit::Return, (-3i32) as u32 as u64)
    );
    assert_eq!(
        divide(Opcode::IRem, -7, 2),
        (RunExit::Return, (-1i32) as u32 as u64)
    );
}

#[test]
fn unsigned_division_ignores_the_sign_bit() {
    assert_eq!(
        divide(Opcode::IUDiv, -2, 2),
        (RunExit::Return, 0x7fff_ffff)
    );
    assert_eq!(divide(Opcode::IURem, -1, 16), (RunExit::Return, 15));
}

#[test]
fn zero_divisor_traps() {
    let (exit, _) = divide(Opcode::IDiv, 1, 0);
    assert_eq!(exit, RunExit::Trap(TrapKind::DivByZero));
    let (exit, _) = divide(Opcode::IURem, 1, 0);
    assert_eq!(exit, RunExit::Trap(TrapKind::DivByZero));
}

#[test]
fn zero_divisor_traps_without_the_emitted_check() {
    // With the guard disabled the fault comes from the divide itself.
    let mut t = Tree::new();
    let a = t.iconst(1);
    let b = t.iconst(0);
    let d = t.node(Opcode::IDiv, &[a, b]);
    let ret = t.node(Opcode::IReturn, &[d]);
    t.root(ret);

    let options = CodegenOptions {
        emit_div_zero_checks: false,
        ..CodegenOptions::default()
    };
    let unit = lower_tree_with(&t, Target::Amd64, options, &NoHooks).unwrap();
    let guarded = lower_tree(&t, Target::Amd64).unwrap();
    assert!(unit.insts.len() < guarded.insts.len());

    let mut m = Machine::new(16);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Trap(TrapKind::DivByZero));
}

#[test]
fn int_min_over_minus_one_wraps() {
    assert_eq!(
        divide(Opcode::IDiv, i32::MIN, -1),
        (RunExit::Return, i32::MIN as u32 as u64)
    );
    assert_eq!(divide(Opcode::IRem, i32::MIN, -1), (RunExit::Return, 0));
}

#[test]
fn wide_division() {
    let mut t = Tree::new();
    let a = t.lconst(i64::MIN);
    let b = t.lconst(-1);
    let d = t.node(Opcode::LDiv, &[a, b]);
    let ret = t.node(Opcode::LReturn, &[d]);
    t.root(ret);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = Machine::new(16);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(m.gpr_value(gpr(0)), i64::MIN as u64);

    let mut t = Tree::new();
    let a = t.lconst(-3);
    let b = t.lconst(16);
    let d = t.node(Opcode::LURem, &[a, b]);
    let ret = t.node(Opcode::LReturn, &[d]);
    t.root(ret);

    let unit = lower_tree(&t, Target::Amd64).unwrap();
    let mut m = Machine::new(16);
    assert_eq!(m.run(&unit, &t.symbols), RunExit::Return);
    assert_eq!(m.gpr_value(gpr(0)), ((-3i64) as u64) % 16);
}

//! Evaluators and the helpers they share.
//!
//! `common` fills a table with the lowerings that work on any x86-family
//! target; `amd64` and `i686` build their tables by overlaying it. The
//! helpers in this module are the building blocks: they own the use-count
//! protocol (evaluate children, steal or copy a destination, release) so
//! individual evaluators stay one or two lines.

pub mod amd64;
pub mod common;
pub mod i686;

use kiln_ir::{DataType, NodeId, Opcode, Payload, SymbolKind};

use crate::cg::CodeGenerator;
use crate::inst::{
    Addr, AluFOp, AluOp, CallTarget, Cond, Ext, Inst, ShiftCount, ShiftOp, TrapKind, VAluOp, Width,
};
use crate::reg::{Reg, RegKind};

/// Width a value of `ty` occupies in a general-purpose register.
#[must_use]
pub fn width_of(cg: &CodeGenerator<'_>, ty: DataType) -> Width {
    match ty {
        DataType::Int8 => Width::W8,
        DataType::Int16 => Width::W16,
        DataType::Int32 => Width::W32,
        DataType::Int64 => Width::W64,
        DataType::Address => cg.target().pointer_width(),
        other => panic!("{other} does not fit a general-purpose register"),
    }
}

#[must_use]
pub fn reg_kind_for(ty: DataType) -> RegKind {
    match ty {
        DataType::Float | DataType::Double => RegKind::Fpr,
        DataType::VectorInt32 | DataType::VectorFloat => RegKind::Vec,
        DataType::Mask => RegKind::Mask,
        DataType::Void => panic!("void has no register kind"),
        _ => RegKind::Gpr,
    }
}

/// Gets `child`'s value into a register the caller may clobber: the child's
/// own register when this is its last use, a fresh copy otherwise. Consumes
/// one use of `child` either way.
pub fn claim_gpr(cg: &mut CodeGenerator<'_>, child: NodeId, width: Width) -> Reg {
    let src = cg.gen_use(child);
    if let Some(dst) = cg.steal(child) {
        return dst;
    }
    let dst = cg.alloc(RegKind::Gpr);
    cg.emit(Inst::Mov { dst, src, width });
    cg.release(child);
    dst
}

pub fn claim_fpr(cg: &mut CodeGenerator<'_>, child: NodeId) -> Reg {
    let src = cg.gen_use(child);
    if let Some(dst) = cg.steal(child) {
        return dst;
    }
    let dst = cg.alloc(RegKind::Fpr);
    cg.emit(Inst::MovF { dst, src });
    cg.release(child);
    dst
}

pub fn claim_vec(cg: &mut CodeGenerator<'_>, child: NodeId) -> Reg {
    let src = cg.gen_use(child);
    if let Some(dst) = cg.steal(child) {
        return dst;
    }
    let dst = cg.alloc(RegKind::Vec);
    cg.emit(Inst::VMov { dst, src });
    cg.release(child);
    dst
}

pub fn claim_mask(cg: &mut CodeGenerator<'_>, child: NodeId) -> Reg {
    let src = cg.gen_use(child);
    if let Some(dst) = cg.steal(child) {
        return dst;
    }
    let dst = cg.alloc(RegKind::Mask);
    cg.emit(Inst::MaskMov { dst, src });
    cg.release(child);
    dst
}

/// Two-operand integer ALU lowering. Reuses a dying operand's register as
/// the destination; for commutative opcodes either operand qualifies.
pub fn binary_op(cg: &mut CodeGenerator<'_>, node: NodeId, op: AluOp, width: Width) -> Reg {
    let n = cg.tree().get(node);
    let (lhs, rhs) = (n.child(0), n.child(1));
    let commutative = n.opcode().is_commutative();
    let lv = cg.gen_use(lhs);
    let rv = cg.gen_use(rhs);
    if let Some(dst) = cg.steal(lhs) {
        cg.emit(Inst::Alu { op, dst, src: rv, width });
        cg.release(rhs);
        return dst;
    }
    if commutative {
        if let Some(dst) = cg.steal(rhs) {
            cg.emit(Inst::Alu { op, dst, src: lv, width });
            cg.release(lhs);
            return dst;
        }
    }
    let dst = cg.alloc(RegKind::Gpr);
    cg.emit(Inst::Mov { dst, src: lv, width });
    cg.emit(Inst::Alu { op, dst, src: rv, width });
    cg.release(lhs);
    cg.release(rhs);
    dst
}

/// Shift/rotate lowering. A constant count folds into the immediate form
/// (masked by `width - 1`, matching the hardware) without ever occupying a
/// register.
pub fn shift_op(cg: &mut CodeGenerator<'_>, node: NodeId, op: ShiftOp, width: Width) -> Reg {
    let n = cg.tree().get(node);
    let (value, count) = (n.child(0), n.child(1));
    let count_node = cg.tree().get(count);
    if let (Opcode::IConst, &Payload::Int(imm)) = (count_node.opcode(), count_node.payload()) {
        let imm = (imm as u8) & (width.bits() as u8 - 1);
        let dst = claim_gpr(cg, value, width);
        cg.emit(Inst::Shift {
            op,
            dst,
            count: ShiftCount::Imm(imm),
            width,
        });
        cg.release(count);
        return dst;
    }
    let cv = cg.gen_use(count);
    let dst = claim_gpr(cg, value, width);
    cg.emit(Inst::Shift {
        op,
        dst,
        count: ShiftCount::Reg(cv),
        width,
    });
    cg.release(count);
    dst
}

/// Integer division/remainder. With `emit_div_zero_checks` the divisor is
/// tested and a zero routes to a [`TrapKind::DivByZero`] trap; `INT_MIN / -1`
/// wraps rather than faulting.
pub fn div_op(
    cg: &mut CodeGenerator<'_>,
    node: NodeId,
    width: Width,
    signed: bool,
    rem: bool,
) -> Reg {
    let n = cg.tree().get(node);
    let (lhs, rhs) = (n.child(0), n.child(1));
    let lv = cg.gen_use(lhs);
    let rv = cg.gen_use(rhs);
    if cg.options().emit_div_zero_checks {
        let ok = cg.new_label();
        cg.emit(Inst::Test { lhs: rv, rhs: rv, width });
        cg.emit(Inst::Jcc {
            cond: Cond::Ne,
            target: ok,
        });
        cg.emit(Inst::Trap {
            kind: TrapKind::DivByZero,
        });
        cg.bind(ok);
    }
    let dst = cg.alloc(RegKind::Gpr);
    cg.emit(Inst::Div {
        dst,
        lhs: lv,
        rhs: rv,
        width,
        signed,
        rem,
    });
    cg.release(lhs);
    cg.release(rhs);
    dst
}

/// Integer compare producing 0/1.
pub fn compare_set(cg: &mut CodeGenerator<'_>, node: NodeId, cond: Cond, width: Width) -> Reg {
    let n = cg.tree().get(node);
    let (lhs, rhs) = (n.child(0), n.child(1));
    let lv = cg.gen_use(lhs);
    let rv = cg.gen_use(rhs);
    cg.emit(Inst::Cmp { lhs: lv, rhs: rv, width });
    cg.release(lhs);
    cg.release(rhs);
    let dst = cg.alloc(RegKind::Gpr);
    cg.emit(Inst::Setcc { dst, cond });
    dst
}

/// How a float compare's `setcc` result is corrected for the unordered case.
#[derive(Clone, Copy)]
pub enum ParityFix {
    /// The condition already lands on the wanted side for NaN.
    None,
    /// `eq` (ordered): also require parity clear.
    AndNotParity,
    /// `ne` (unordered): also accept parity set.
    OrParity,
}

/// Float compare via `ucomis`. `ucomis` only sets `zf/cf`-style conditions
/// usefully for "above"-family checks, so below-style ordered compares swap
/// the operands; equality needs the parity fix-up because unordered also
/// raises `zf`.
pub fn float_compare_set(
    cg: &mut CodeGenerator<'_>,
    node: NodeId,
    double: bool,
    swap: bool,
    cond: Cond,
    fix: ParityFix,
) -> Reg {
    let n = cg.tree().get(node);
    let (a, b) = (n.child(0), n.child(1));
    let av = cg.gen_use(a);
    let bv = cg.gen_use(b);
    let (lhs, rhs) = if swap { (bv, av) } else { (av, bv) };
    cg.emit(Inst::Ucomis { lhs, rhs, double });
    cg.release(a);
    cg.release(b);
    let dst = cg.alloc(RegKind::Gpr);
    cg.emit(Inst::Setcc { dst, cond });
    match fix {
        ParityFix::None => {}
        ParityFix::AndNotParity => {
            let t = cg.alloc(RegKind::Gpr);
            cg.emit(Inst::Setcc { dst: t, cond: Cond::Np });
            cg.emit(Inst::Alu {
                op: AluOp::And,
                dst,
                src: t,
                width: Width::W32,
            });
            cg.free(t);
        }
        ParityFix::OrParity => {
            let t = cg.alloc(RegKind::Gpr);
            cg.emit(Inst::Setcc { dst: t, cond: Cond::P });
            cg.emit(Inst::Alu {
                op: AluOp::Or,
                dst,
                src: t,
                width: Width::W32,
            });
            cg.free(t);
        }
    }
    dst
}

/// Fused compare-and-branch: one `cmp` + `jcc`, no boolean materialized.
pub fn compare_and_branch(cg: &mut CodeGenerator<'_>, node: NodeId, cond: Cond, width: Width) {
    let n = cg.tree().get(node);
    let (lhs, rhs) = (n.child(0), n.child(1));
    let target = cg.ir_label(n.label());
    let lv = cg.gen_use(lhs);
    let rv = cg.gen_use(rhs);
    cg.emit(Inst::Cmp { lhs: lv, rhs: rv, width });
    cg.release(lhs);
    cg.release(rhs);
    cg.emit(Inst::Jcc { cond, target });
}

/// Full call lowering shared by every call opcode.
///
/// Order matters here:
/// 1. evaluate the (optional) computed target and every argument;
/// 2. release them all; their registers keep their contents until the next
///    allocation, which does not happen before step 4's reads;
/// 3. push every register still holding a live value (the private linkage
///    makes all allocatable registers caller-saved);
/// 4. push the argument values in reverse and pop them into the linkage's
///    argument registers in order; the stack round-trip sidesteps shuffle
///    cycles when an argument already sits in another argument's slot. A
///    computed target is pushed first and popped into the linkage scratch
///    register last;
/// 5. emit the call (recording a relocation for the direct form);
/// 6. move the return value into a freshly allocated handle, which cannot
///    collide with the saved set because saved registers are still live;
/// 7. pop the saved registers in reverse.
pub fn call_sequence(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let opcode = n.opcode();
    let indirect = matches!(opcode, Opcode::ICallI | Opcode::CallI);
    let (target_child, args): (Option<NodeId>, &[NodeId]) = if indirect {
        (Some(n.child(0)), &n.children()[1..])
    } else {
        (None, n.children())
    };
    let args = args.to_vec();
    let linkage = cg.target().linkage();

    let target_val = target_child.map(|t| cg.gen_use(t));
    let mut arg_vals = Vec::with_capacity(args.len());
    for &a in &args {
        arg_vals.push(cg.gen_use(a));
    }

    // Assign linkage slots by the value's register class.
    let mut int_idx = 0;
    let mut float_idx = 0;
    let mut slots = Vec::with_capacity(args.len());
    for &v in &arg_vals {
        let slot = match v.kind() {
            RegKind::Gpr => {
                let s = linkage
                    .int_args
                    .get(int_idx)
                    .copied()
                    .unwrap_or_else(|| panic!("too many integer arguments for {}", cg.target()));
                int_idx += 1;
                s
            }
            RegKind::Fpr => {
                let s = linkage
                    .float_args
                    .get(float_idx)
                    .copied()
                    .unwrap_or_else(|| panic!("too many float arguments for {}", cg.target()));
                float_idx += 1;
                s
            }
            other => panic!("{other:?} values cannot be passed as call arguments"),
        };
        slots.push(slot);
    }

    for &a in &args {
        cg.release(a);
    }
    if let Some(t) = target_child {
        cg.release(t);
    }

    let saved = cg.live_regs();
    for &r in &saved {
        cg.emit(Inst::Push { src: r });
    }

    if let Some(tv) = target_val {
        cg.emit(Inst::Push { src: tv });
    }
    for &v in arg_vals.iter().rev() {
        cg.emit(Inst::Push { src: v });
    }
    for &slot in &slots {
        cg.emit(Inst::Pop { dst: slot });
    }
    if target_val.is_some() {
        cg.emit(Inst::Pop {
            dst: linkage.scratch,
        });
    }

    let call_target = if target_val.is_some() {
        CallTarget::Reg(linkage.scratch)
    } else {
        CallTarget::Sym(n.sym())
    };
    cg.emit(Inst::Call {
        target: call_target,
    });
    if let CallTarget::Sym(sym) = call_target {
        let site = cg.inst_count() - 1;
        cg.record_relocation(site, sym);
    }

    let result = match opcode.result_type() {
        DataType::Void => None,
        DataType::Float | DataType::Double => {
            let dst = cg.alloc(RegKind::Fpr);
            cg.emit(Inst::MovF {
                dst,
                src: linkage.float_ret,
            });
            Some(dst)
        }
        ty => {
            let dst = cg.alloc(RegKind::Gpr);
            cg.emit(Inst::Mov {
                dst,
                src: linkage.int_ret,
                width: width_of(cg, ty),
            });
            Some(dst)
        }
    };

    for &r in saved.iter().rev() {
        cg.emit(Inst::Pop { dst: r });
    }
    result
}

/// Two-operand vector lowering for operations with a direct instruction.
pub fn vector_binary_op(cg: &mut CodeGenerator<'_>, node: NodeId, op: VAluOp) -> Reg {
    vector_binary_with(cg, node, |cg, dst, src| {
        cg.emit(Inst::VAlu { op, dst, src });
    })
}

/// Two-operand vector lowering with a custom emitter, for operations a
/// target's instruction set has no single instruction for. `emit` receives
/// the claimed destination (holding the first operand) and the second
/// operand's register, and may allocate scratch registers through the
/// generator.
pub fn vector_binary_with(
    cg: &mut CodeGenerator<'_>,
    node: NodeId,
    emit: impl FnOnce(&mut CodeGenerator<'_>, Reg, Reg),
) -> Reg {
    let n = cg.tree().get(node);
    let (lhs, rhs) = (n.child(0), n.child(1));
    let _ = cg.gen_use(lhs);
    let rv = cg.gen_use(rhs);
    let dst = claim_vec(cg, lhs);
    emit(cg, dst, rv);
    cg.release(rhs);
    dst
}

/// Merge-masked vector op: `(lhs, rhs, mask)`, unselected lanes keep `lhs`'s
/// lane value.
pub fn vector_masked_op(cg: &mut CodeGenerator<'_>, node: NodeId, op: VAluOp) -> Reg {
    let n = cg.tree().get(node);
    let (lhs, rhs, mask) = (n.child(0), n.child(1), n.child(2));
    let _ = cg.gen_use(lhs);
    let rv = cg.gen_use(rhs);
    let mv = cg.gen_use(mask);
    let dst = claim_vec(cg, lhs);
    cg.emit(Inst::VAluMasked {
        op,
        dst,
        src: rv,
        mask: mv,
    });
    cg.release(rhs);
    cg.release(mask);
    dst
}

/// Scalar fold applied to an integer-vector reduction.
#[derive(Clone, Copy)]
pub enum IntFold {
    Alu(AluOp),
    Min,
    Max,
}

/// Integer-vector reduction: lanes are extracted and folded strictly left to
/// right (lane 0 first).
pub fn vector_reduce_int(cg: &mut CodeGenerator<'_>, node: NodeId, fold: IntFold) -> Reg {
    let child = cg.tree().get(node).child(0);
    let src = cg.gen_use(child);
    let dst = cg.alloc(RegKind::Gpr);
    let tmp = cg.alloc(RegKind::Gpr);
    cg.emit(Inst::VExtract {
        dst,
        src,
        lane: 0,
        elem: crate::inst::ElemKind::I32,
    });
    for lane in 1..4u8 {
        cg.emit(Inst::VExtract {
            dst: tmp,
            src,
            lane,
            elem: crate::inst::ElemKind::I32,
        });
        match fold {
            IntFold::Alu(op) => cg.emit(Inst::Alu {
                op,
                dst,
                src: tmp,
                width: Width::W32,
            }),
            IntFold::Min => {
                cg.emit(Inst::Cmp {
                    lhs: dst,
                    rhs: tmp,
                    width: Width::W32,
                });
                cg.emit(Inst::Cmov {
                    dst,
                    src: tmp,
                    cond: Cond::G,
                    width: Width::W32,
                });
            }
            IntFold::Max => {
                cg.emit(Inst::Cmp {
                    lhs: dst,
                    rhs: tmp,
                    width: Width::W32,
                });
                cg.emit(Inst::Cmov {
                    dst,
                    src: tmp,
                    cond: Cond::L,
                    width: Width::W32,
                });
            }
        }
    }
    cg.free(tmp);
    cg.release(child);
    dst
}

/// Float-vector reduction; same strict lane order. Floating-point addition
/// is not associative, so the fold order is part of the contract, not an
/// implementation detail.
pub fn vector_reduce_float(cg: &mut CodeGenerator<'_>, node: NodeId, op: AluFOp) -> Reg {
    let child = cg.tree().get(node).child(0);
    let src = cg.gen_use(child);
    let dst = cg.alloc(RegKind::Fpr);
    let tmp = cg.alloc(RegKind::Fpr);
    cg.emit(Inst::VExtract {
        dst,
        src,
        lane: 0,
        elem: crate::inst::ElemKind::F32,
    });
    for lane in 1..4u8 {
        cg.emit(Inst::VExtract {
            dst: tmp,
            src,
            lane,
            elem: crate::inst::ElemKind::F32,
        });
        cg.emit(Inst::AluF {
            op,
            dst,
            src: tmp,
            double: false,
        });
    }
    cg.free(tmp);
    cg.release(child);
    dst
}

/// Address operand for a direct (symbol-addressed) memory access.
#[must_use]
pub fn direct_addr(cg: &CodeGenerator<'_>, node: NodeId) -> Addr {
    let sym = cg.tree().get(node).sym();
    match cg.tree().symbols.get(sym).kind {
        SymbolKind::Data { offset, .. } => Addr::abs(offset as i32),
        SymbolKind::Func { .. } => panic!(
            "{} addresses function symbol {}",
            cg.tree().get(node).opcode().name(),
            sym
        ),
    }
}

/// Address operand for an indirect access: child 0 is the base address, the
/// payload the displacement. Consumes the child's use.
pub fn indirect_addr(cg: &mut CodeGenerator<'_>, node: NodeId, base_child: NodeId) -> Addr {
    let disp = cg.tree().get(node).offset();
    let base = cg.gen_use(base_child);
    cg.release(base_child);
    Addr::base(base, disp)
}

/// Loads a scalar into a fresh register with the given width/extension.
pub fn load_into(cg: &mut CodeGenerator<'_>, addr: Addr, width: Width, ext: Ext) -> Reg {
    let dst = cg.alloc(RegKind::Gpr);
    cg.emit(Inst::Load {
        dst,
        addr,
        width,
        ext,
    });
    dst
}

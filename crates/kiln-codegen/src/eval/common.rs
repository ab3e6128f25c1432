//! Evaluators shared by every x86-family target.
//!
//! [`install`] fills a table with one entry per opcode via an exhaustive
//! match, so adding an opcode without deciding its generic lowering (or
//! explicitly leaving it to the targets) fails to compile. Slots the generic
//! layer cannot lower portably (`popcnt`, `lzcnt`-style counts, BMI2 bit
//! compress/expand, vector min/max) are left unimplemented for the target
//! overlays.

use kiln_ir::{NodeId, Opcode};

use crate::cg::CodeGenerator;
use crate::eval::{
    binary_op, call_sequence, claim_fpr, claim_gpr, claim_mask, claim_vec, compare_and_branch,
    compare_set, direct_addr, div_op, float_compare_set, indirect_addr, load_into, shift_op,
    vector_binary_op, vector_masked_op, vector_reduce_float, vector_reduce_int, IntFold, ParityFix,
};
use crate::inst::{
    Addr, AluFOp, AluOp, Cond, ElemKind, Ext, FenceKind, Inst, MaskBinOp, ShiftOp, VAluOp, VCmpOp,
    Width,
};
use crate::reg::{Reg, RegKind};
use crate::table::EvaluatorTable;

/// Fills every slot of `t`: generic lowerings, unimplemented markers for the
/// slots targets must overlay, and the invalid sentinel for foreign-dialect
/// opcodes.
pub fn install(t: &mut EvaluatorTable) {
    use Opcode as O;
    for op in Opcode::ALL {
        match op {
            O::IConst | O::LConst | O::BConst | O::SConst | O::FConst | O::DConst | O::AConst => {
                t.set(op, constant)
            }

            O::BLoad
            | O::BULoad
            | O::SLoad
            | O::SULoad
            | O::ILoad
            | O::LLoad
            | O::FLoad
            | O::DLoad
            | O::ALoad => t.set(op, direct_load),
            O::BLoadI
            | O::BULoadI
            | O::SLoadI
            | O::SULoadI
            | O::ILoadI
            | O::LLoadI
            | O::FLoadI
            | O::DLoadI
            | O::ALoadI => t.set(op, indirect_load),
            O::BStore | O::SStore | O::IStore | O::LStore | O::FStore | O::DStore | O::AStore => {
                t.set(op, direct_store)
            }
            O::BStoreI
            | O::SStoreI
            | O::IStoreI
            | O::LStoreI
            | O::FStoreI
            | O::DStoreI
            | O::AStoreI => t.set(op, indirect_store),

            O::IAdd
            | O::ISub
            | O::IMul
            | O::IAnd
            | O::IOr
            | O::IXor
            | O::LAdd
            | O::LSub
            | O::LMul
            | O::LAnd
            | O::LOr
            | O::LXor => t.set(op, int_binary),
            O::IDiv | O::IUDiv | O::IRem | O::IURem | O::LDiv | O::LUDiv | O::LRem | O::LURem => {
                t.set(op, int_div)
            }
            O::INeg | O::LNeg => t.set(op, int_neg),
            O::IAbs | O::LAbs => t.set(op, int_abs),
            O::IMin | O::IMax => t.set(op, int_min_max),
            O::IShl | O::IShr | O::IUShr | O::IRol | O::LShl | O::LShr | O::LUShr | O::LRol => {
                t.set(op, shift)
            }

            O::FAdd
            | O::FSub
            | O::FMul
            | O::FDiv
            | O::DAdd
            | O::DSub
            | O::DMul
            | O::DDiv => t.set(op, float_binary),
            O::FNeg | O::FAbs | O::DNeg | O::DAbs => t.set(op, float_sign),
            O::FSqrt | O::DSqrt => t.set(op, float_sqrt),

            O::ICmpEq
            | O::ICmpNe
            | O::ICmpLt
            | O::ICmpGe
            | O::ICmpGt
            | O::ICmpLe
            | O::IUCmpLt
            | O::IUCmpGe
            | O::IUCmpGt
            | O::IUCmpLe
            | O::LCmpEq
            | O::LCmpNe
            | O::LCmpLt
            | O::LCmpGe
            | O::LCmpGt
            | O::LCmpLe
            | O::LUCmpLt
            | O::LUCmpGe => t.set(op, int_compare),
            O::FCmpEq
            | O::FCmpNe
            | O::FCmpLt
            | O::FCmpGe
            | O::FCmpGt
            | O::FCmpLe
            | O::FCmpEqU
            | O::FCmpNeU
            | O::FCmpLtU
            | O::FCmpGeU
            | O::FCmpGtU
            | O::FCmpLeU
            | O::DCmpEq
            | O::DCmpNe
            | O::DCmpLt
            | O::DCmpGe
            | O::DCmpGt
            | O::DCmpLe
            | O::DCmpEqU
            | O::DCmpNeU
            | O::DCmpLtU
            | O::DCmpGeU
            | O::DCmpGtU
            | O::DCmpLeU => t.set(op, float_compare),

            O::IfICmpEq
            | O::IfICmpNe
            | O::IfICmpLt
            | O::IfICmpGe
            | O::IfICmpGt
            | O::IfICmpLe
            | O::IfIUCmpLt
            | O::IfIUCmpGe
            | O::IfLCmpEq
            | O::IfLCmpNe
            | O::IfLCmpLt
            | O::IfLCmpGe => t.set(op, fused_branch),

            O::Goto => t.set(op, goto),
            O::IfTrue => t.set(op, if_true),
            O::Switch => t.set(op, switch),
            O::Return | O::IReturn | O::LReturn | O::FReturn | O::DReturn | O::AReturn => {
                t.set(op, ret)
            }

            O::ICall
            | O::LCall
            | O::FCall
            | O::DCall
            | O::ACall
            | O::Call
            | O::ICallI
            | O::CallI => t.set(op, call),

            O::I2L
            | O::IU2L
            | O::L2I
            | O::I2B
            | O::I2S
            | O::B2I
            | O::BU2I
            | O::S2I
            | O::SU2I => t.set(op, int_narrowing),
            O::I2F | O::I2D | O::L2D => t.set(op, int_to_float),
            O::F2I | O::D2I => t.set(op, float_to_int),
            O::F2D | O::D2F => t.set(op, float_to_float),
            O::IBits2F | O::FBits2I | O::LBits2D | O::DBits2L => t.set(op, reinterpret),

            O::ISelect | O::LSelect => t.set(op, select),
            O::IByteswap | O::LByteswap => t.set(op, byteswap),

            // Count/compress instructions differ per target generation; the
            // overlays decide.
            O::IPopcnt
            | O::LPopcnt
            | O::IClz
            | O::ICtz
            | O::LClz
            | O::LCtz
            | O::ICompressBits
            | O::IExpandBits => t.set_unimplemented(op),

            O::VSplatsI | O::VSplatsF => t.set(op, vector_splat),
            O::VLoadI | O::VLoadF => t.set(op, vector_load),
            O::VStoreI | O::VStoreF => t.set(op, vector_store),
            O::VAddI
            | O::VSubI
            | O::VMulI
            | O::VAndI
            | O::VOrI
            | O::VXorI
            | O::VAddF
            | O::VSubF
            | O::VMulF
            | O::VDivF => t.set(op, vector_binary),
            // No packed signed min/max below SSE4.1; targets overlay.
            O::VMinI | O::VMaxI => t.set_unimplemented(op),
            O::VCmpEqI | O::VCmpGtI | O::VCmpLtI | O::VCmpEqF | O::VCmpLtF => {
                t.set(op, vector_compare)
            }
            O::VReduceAddI
            | O::VReduceMinI
            | O::VReduceMaxI
            | O::VReduceAndI
            | O::VReduceOrI
            | O::VReduceXorI
            | O::VReduceAddF
            | O::VReduceMinF
            | O::VReduceMaxF => t.set(op, vector_reduce),
            O::VMAddI | O::VMSubI | O::VMAddF => t.set(op, vector_masked),
            O::VBlendI => t.set(op, vector_blend),
            O::VPermI => t.set(op, vector_permute),

            O::MAnd | O::MOr => t.set(op, mask_binary),
            O::MNot => t.set(op, mask_not),
            O::MAllTrue | O::MAnyTrue => t.set(op, mask_test),

            O::Fence | O::LoadFence | O::StoreFence => t.set(op, fence),

            // Monitor opcodes belong to a host runtime's dialect.
            O::MonEnt | O::MonExit => t.set_invalid(op),
        }
    }
}

fn constant(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    Some(match n.opcode() {
        Opcode::IConst | Opcode::BConst | Opcode::SConst => {
            let dst = cg.alloc(RegKind::Gpr);
            cg.emit(Inst::MovImm {
                dst,
                imm: n.int_value(),
                width: Width::W32,
            });
            dst
        }
        Opcode::LConst => {
            let dst = cg.alloc(RegKind::Gpr);
            cg.emit(Inst::MovImm {
                dst,
                imm: n.int_value(),
                width: Width::W64,
            });
            dst
        }
        Opcode::AConst => {
            let width = cg.target().pointer_width();
            let dst = cg.alloc(RegKind::Gpr);
            cg.emit(Inst::MovImm {
                dst,
                imm: n.int_value(),
                width,
            });
            dst
        }
        Opcode::FConst => {
            let bits = u64::from(n.float_value().to_bits());
            let dst = cg.alloc(RegKind::Fpr);
            cg.emit(Inst::MovFImmBits { dst, bits });
            dst
        }
        Opcode::DConst => {
            let bits = n.double_value().to_bits();
            let dst = cg.alloc(RegKind::Fpr);
            cg.emit(Inst::MovFImmBits { dst, bits });
            dst
        }
        op => unreachable!("{} is not a constant", op.name()),
    })
}

fn scalar_load(cg: &mut CodeGenerator<'_>, opcode: Opcode, addr: Addr) -> Reg {
    match opcode {
        Opcode::BLoad | Opcode::BLoadI => load_into(cg, addr, Width::W8, Ext::Sign),
        Opcode::BULoad | Opcode::BULoadI => load_into(cg, addr, Width::W8, Ext::Zero),
        Opcode::SLoad | Opcode::SLoadI => load_into(cg, addr, Width::W16, Ext::Sign),
        Opcode::SULoad | Opcode::SULoadI => load_into(cg, addr, Width::W16, Ext::Zero),
        Opcode::ILoad | Opcode::ILoadI => load_into(cg, addr, Width::W32, Ext::Zero),
        Opcode::LLoad | Opcode::LLoadI => load_into(cg, addr, Width::W64, Ext::Zero),
        Opcode::ALoad | Opcode::ALoadI => {
            let width = cg.target().pointer_width();
            load_into(cg, addr, width, Ext::Zero)
        }
        Opcode::FLoad | Opcode::FLoadI | Opcode::DLoad | Opcode::DLoadI => {
            let double = matches!(opcode, Opcode::DLoad | Opcode::DLoadI);
            let dst = cg.alloc(RegKind::Fpr);
            cg.emit(Inst::LoadF { dst, addr, double });
            dst
        }
        op => unreachable!("{} is not a load", op.name()),
    }
}

fn direct_load(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let addr = direct_addr(cg, node);
    let opcode = cg.tree().get(node).opcode();
    Some(scalar_load(cg, opcode, addr))
}

fn indirect_load(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let base = cg.tree().get(node).child(0);
    let addr = indirect_addr(cg, node, base);
    let opcode = cg.tree().get(node).opcode();
    Some(scalar_load(cg, opcode, addr))
}

fn scalar_store(cg: &mut CodeGenerator<'_>, opcode: Opcode, src: Reg, addr: Addr) {
    match opcode {
        Opcode::BStore | Opcode::BStoreI => cg.emit(Inst::Store {
            src,
            addr,
            width: Width::W8,
        }),
        Opcode::SStore | Opcode::SStoreI => cg.emit(Inst::Store {
            src,
            addr,
            width: Width::W16,
        }),
        Opcode::IStore | Opcode::IStoreI => cg.emit(Inst::Store {
            src,
            addr,
            width: Width::W32,
        }),
        Opcode::LStore | Opcode::LStoreI => cg.emit(Inst::Store {
            src,
            addr,
            width: Width::W64,
        }),
        Opcode::AStore | Opcode::AStoreI => {
            let width = cg.target().pointer_width();
            cg.emit(Inst::Store { src, addr, width });
        }
        Opcode::FStore | Opcode::FStoreI | Opcode::DStore | Opcode::DStoreI => {
            let double = matches!(opcode, Opcode::DStore | Opcode::DStoreI);
            cg.emit(Inst::StoreF { src, addr, double });
        }
        op => unreachable!("{} is not a store", op.name()),
    }
}

fn direct_store(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let opcode = n.opcode();
    let value = n.child(0);
    let addr = direct_addr(cg, node);
    let src = cg.gen_use(value);
    scalar_store(cg, opcode, src, addr);
    cg.release(value);
    if opcode == Opcode::AStore {
        cg.run_store_barrier(node);
    }
    None
}

fn indirect_store(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let opcode = n.opcode();
    let (addr_child, value_child) = (n.child(0), n.child(1));
    let disp = n.offset();
    let base = cg.gen_use(addr_child);
    let src = cg.gen_use(value_child);
    scalar_store(cg, opcode, src, Addr::base(base, disp));
    cg.release(addr_child);
    cg.release(value_child);
    if opcode == Opcode::AStoreI {
        cg.run_store_barrier(node);
    }
    None
}

fn int_binary(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let (op, width) = match cg.tree().get(node).opcode() {
        Opcode::IAdd => (AluOp::Add, Width::W32),
        Opcode::ISub => (AluOp::Sub, Width::W32),
        Opcode::IMul => (AluOp::Imul, Width::W32),
        Opcode::IAnd => (AluOp::And, Width::W32),
        Opcode::IOr => (AluOp::Or, Width::W32),
        Opcode::IXor => (AluOp::Xor, Width::W32),
        Opcode::LAdd => (AluOp::Add, Width::W64),
        Opcode::LSub => (AluOp::Sub, Width::W64),
        Opcode::LMul => (AluOp::Imul, Width::W64),
        Opcode::LAnd => (AluOp::And, Width::W64),
        Opcode::LOr => (AluOp::Or, Width::W64),
        Opcode::LXor => (AluOp::Xor, Width::W64),
        op => unreachable!("{} is not an integer binary opcode", op.name()),
    };
    Some(binary_op(cg, node, op, width))
}

fn int_div(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let (width, signed, rem) = match cg.tree().get(node).opcode() {
        Opcode::IDiv => (Width::W32, true, false),
        Opcode::IUDiv => (Width::W32, false, false),
        Opcode::IRem => (Width::W32, true, true),
        Opcode::IURem => (Width::W32, false, true),
        Opcode::LDiv => (Width::W64, true, false),
        Opcode::LUDiv => (Width::W64, false, false),
        Opcode::LRem => (Width::W64, true, true),
        Opcode::LURem => (Width::W64, false, true),
        op => unreachable!("{} is not a division opcode", op.name()),
    };
    Some(div_op(cg, node, width, signed, rem))
}

fn int_neg(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let width = match cg.tree().get(node).opcode() {
        Opcode::INeg => Width::W32,
        _ => Width::W64,
    };
    let child = cg.tree().get(node).child(0);
    let dst = claim_gpr(cg, child, width);
    cg.emit(Inst::Neg { dst, width });
    Some(dst)
}

fn int_abs(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let width = match cg.tree().get(node).opcode() {
        Opcode::IAbs => Width::W32,
        _ => Width::W64,
    };
    let child = cg.tree().get(node).child(0);
    let dst = claim_gpr(cg, child, width);
    let tmp = cg.alloc(RegKind::Gpr);
    cg.emit(Inst::Mov {
        dst: tmp,
        src: dst,
        width,
    });
    cg.emit(Inst::Neg { dst: tmp, width });
    cg.emit(Inst::Test {
        lhs: dst,
        rhs: dst,
        width,
    });
    cg.emit(Inst::Cmov {
        dst,
        src: tmp,
        cond: Cond::S,
        width,
    });
    cg.free(tmp);
    Some(dst)
}

fn int_min_max(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    // Take the other operand when the kept one loses the comparison.
    let cond = match n.opcode() {
        Opcode::IMin => Cond::G,
        Opcode::IMax => Cond::L,
        op => unreachable!("{} is not min/max", op.name()),
    };
    let (lhs, rhs) = (n.child(0), n.child(1));
    let _ = cg.gen_use(lhs);
    let rv = cg.gen_use(rhs);
    let dst = claim_gpr(cg, lhs, Width::W32);
    cg.emit(Inst::Cmp {
        lhs: dst,
        rhs: rv,
        width: Width::W32,
    });
    cg.emit(Inst::Cmov {
        dst,
        src: rv,
        cond,
        width: Width::W32,
    });
    cg.release(rhs);
    Some(dst)
}

fn shift(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let (op, width) = match cg.tree().get(node).opcode() {
        Opcode::IShl => (ShiftOp::Shl, Width::W32),
        Opcode::IShr => (ShiftOp::Sar, Width::W32),
        Opcode::IUShr => (ShiftOp::Shr, Width::W32),
        Opcode::IRol => (ShiftOp::Rol, Width::W32),
        Opcode::LShl => (ShiftOp::Shl, Width::W64),
        Opcode::LShr => (ShiftOp::Sar, Width::W64),
        Opcode::LUShr => (ShiftOp::Shr, Width::W64),
        Opcode::LRol => (ShiftOp::Rol, Width::W64),
        op => unreachable!("{} is not a shift", op.name()),
    };
    Some(shift_op(cg, node, op, width))
}

fn float_binary(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let (op, double) = match n.opcode() {
        Opcode::FAdd => (AluFOp::Add, false),
        Opcode::FSub => (AluFOp::Sub, false),
        Opcode::FMul => (AluFOp::Mul, false),
        Opcode::FDiv => (AluFOp::Div, false),
        Opcode::DAdd => (AluFOp::Add, true),
        Opcode::DSub => (AluFOp::Sub, true),
        Opcode::DMul => (AluFOp::Mul, true),
        Opcode::DDiv => (AluFOp::Div, true),
        op => unreachable!("{} is not float arithmetic", op.name()),
    };
    let (lhs, rhs) = (n.child(0), n.child(1));
    let _ = cg.gen_use(lhs);
    let rv = cg.gen_use(rhs);
    let dst = claim_fpr(cg, lhs);
    cg.emit(Inst::AluF {
        op,
        dst,
        src: rv,
        double,
    });
    cg.release(rhs);
    Some(dst)
}

fn float_sign(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    // Sign flips and clears are bitwise ops against a mask constant.
    let (bits, op, double) = match cg.tree().get(node).opcode() {
        Opcode::FNeg => (0x8000_0000u64, AluFOp::Xor, false),
        Opcode::FAbs => (0x7fff_ffffu64, AluFOp::And, false),
        Opcode::DNeg => (0x8000_0000_0000_0000u64, AluFOp::Xor, true),
        Opcode::DAbs => (0x7fff_ffff_ffff_ffffu64, AluFOp::And, true),
        op => unreachable!("{} is not a float sign opcode", op.name()),
    };
    let child = cg.tree().get(node).child(0);
    let dst = claim_fpr(cg, child);
    let mask = cg.alloc(RegKind::Fpr);
    cg.emit(Inst::MovFImmBits { dst: mask, bits });
    cg.emit(Inst::AluF {
        op,
        dst,
        src: mask,
        double,
    });
    cg.free(mask);
    Some(dst)
}

fn float_sqrt(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let double = n.opcode() == Opcode::DSqrt;
    let child = n.child(0);
    let src = cg.gen_use(child);
    let dst = match cg.steal(child) {
        Some(d) => d,
        None => {
            let d = cg.alloc(RegKind::Fpr);
            cg.release(child);
            d
        }
    };
    cg.emit(Inst::SqrtF { dst, src, double });
    Some(dst)
}

fn int_compare(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let (cond, width) = match cg.tree().get(node).opcode() {
        Opcode::ICmpEq => (Cond::E, Width::W32),
        Opcode::ICmpNe => (Cond::Ne, Width::W32),
        Opcode::ICmpLt => (Cond::L, Width::W32),
        Opcode::ICmpGe => (Cond::Ge, Width::W32),
        Opcode::ICmpGt => (Cond::G, Width::W32),
        Opcode::ICmpLe => (Cond::Le, Width::W32),
        Opcode::IUCmpLt => (Cond::B, Width::W32),
        Opcode::IUCmpGe => (Cond::Ae, Width::W32),
        Opcode::IUCmpGt => (Cond::A, Width::W32),
        Opcode::IUCmpLe => (Cond::Be, Width::W32),
        Opcode::LCmpEq => (Cond::E, Width::W64),
        Opcode::LCmpNe => (Cond::Ne, Width::W64),
        Opcode::LCmpLt => (Cond::L, Width::W64),
        Opcode::LCmpGe => (Cond::Ge, Width::W64),
        Opcode::LCmpGt => (Cond::G, Width::W64),
        Opcode::LCmpLe => (Cond::Le, Width::W64),
        Opcode::LUCmpLt => (Cond::B, Width::W64),
        Opcode::LUCmpGe => (Cond::Ae, Width::W64),
        op => unreachable!("{} is not an integer compare", op.name()),
    };
    Some(compare_set(cg, node, cond, width))
}

fn float_compare(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    use Opcode as O;
    let opcode = cg.tree().get(node).opcode();
    let double = matches!(
        opcode,
        O::DCmpEq
            | O::DCmpNe
            | O::DCmpLt
            | O::DCmpGe
            | O::DCmpGt
            | O::DCmpLe
            | O::DCmpEqU
            | O::DCmpNeU
            | O::DCmpLtU
            | O::DCmpGeU
            | O::DCmpGtU
            | O::DCmpLeU
    );
    // `ucomis` answers "above"-family questions directly; below-family
    // ordered compares swap operands, equality corrects for the unordered
    // flag pattern (zf=pf=cf=1) with a parity check.
    let (swap, cond, fix) = match opcode {
        O::FCmpEq | O::DCmpEq => (false, Cond::E, ParityFix::AndNotParity),
        O::FCmpNe | O::DCmpNe => (false, Cond::Ne, ParityFix::None),
        O::FCmpLt | O::DCmpLt => (true, Cond::A, ParityFix::None),
        O::FCmpLe | O::DCmpLe => (true, Cond::Ae, ParityFix::None),
        O::FCmpGt | O::DCmpGt => (false, Cond::A, ParityFix::None),
        O::FCmpGe | O::DCmpGe => (false, Cond::Ae, ParityFix::None),
        O::FCmpEqU | O::DCmpEqU => (false, Cond::E, ParityFix::None),
        O::FCmpNeU | O::DCmpNeU => (false, Cond::Ne, ParityFix::OrParity),
        O::FCmpLtU | O::DCmpLtU => (false, Cond::B, ParityFix::None),
        O::FCmpLeU | O::DCmpLeU => (false, Cond::Be, ParityFix::None),
        O::FCmpGtU | O::DCmpGtU => (true, Cond::B, ParityFix::None),
        O::FCmpGeU | O::DCmpGeU => (true, Cond::Be, ParityFix::None),
        op => unreachable!("{} is not a float compare", op.name()),
    };
    Some(float_compare_set(cg, node, double, swap, cond, fix))
}

fn fused_branch(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let (cond, width) = match cg.tree().get(node).opcode() {
        Opcode::IfICmpEq => (Cond::E, Width::W32),
        Opcode::IfICmpNe => (Cond::Ne, Width::W32),
        Opcode::IfICmpLt => (Cond::L, Width::W32),
        Opcode::IfICmpGe => (Cond::Ge, Width::W32),
        Opcode::IfICmpGt => (Cond::G, Width::W32),
        Opcode::IfICmpLe => (Cond::Le, Width::W32),
        Opcode::IfIUCmpLt => (Cond::B, Width::W32),
        Opcode::IfIUCmpGe => (Cond::Ae, Width::W32),
        Opcode::IfLCmpEq => (Cond::E, Width::W64),
        Opcode::IfLCmpNe => (Cond::Ne, Width::W64),
        Opcode::IfLCmpLt => (Cond::L, Width::W64),
        Opcode::IfLCmpGe => (Cond::Ge, Width::W64),
        op => unreachable!("{} is not a fused branch", op.name()),
    };
    compare_and_branch(cg, node, cond, width);
    None
}

fn goto(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let target = cg.ir_label(cg.tree().get(node).label());
    cg.emit(Inst::Jmp { target });
    None
}

fn if_true(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let target = cg.ir_label(n.label());
    let child = n.child(0);
    let v = cg.gen_use(child);
    cg.emit(Inst::Test {
        lhs: v,
        rhs: v,
        width: Width::W32,
    });
    cg.release(child);
    cg.emit(Inst::Jcc {
        cond: Cond::Ne,
        target,
    });
    None
}

fn switch(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let cases = n.cases();
    let child = n.child(0);
    let default = cg.ir_label(cases.default);

    let min = cases.cases.iter().map(|&(v, _)| v).min();
    let max = cases.cases.iter().map(|&(v, _)| v).max();
    if let (Some(min), Some(max)) = (min, max) {
        let span = max as i64 - min as i64 + 1;
        let dense = cases.cases.len() >= cg.options().jump_table_min_cases
            && span <= i64::from(cg.options().jump_table_density) * cases.cases.len() as i64;
        if dense {
            // Jump table: rebase the selector, bounds-check, dispatch.
            let dst = claim_gpr(cg, child, Width::W32);
            if min != 0 {
                cg.emit(Inst::AluImm {
                    op: AluOp::Sub,
                    dst,
                    imm: i64::from(min),
                    width: Width::W32,
                });
            }
            cg.emit(Inst::CmpImm {
                lhs: dst,
                imm: span,
                width: Width::W32,
            });
            cg.emit(Inst::Jcc {
                cond: Cond::Ae,
                target: default,
            });
            let mut targets = vec![default; span as usize];
            for &(v, l) in cases.cases.iter() {
                targets[(v - min) as usize] = cg.ir_label(l);
            }
            cg.emit(Inst::JmpTable {
                index: dst,
                targets: targets.into(),
            });
            cg.free(dst);
            return None;
        }
    }

    // Sparse: compare chain ending in the default.
    let v = cg.gen_use(child);
    for &(val, l) in cases.cases.iter() {
        let target = cg.ir_label(l);
        cg.emit(Inst::CmpImm {
            lhs: v,
            imm: i64::from(val),
            width: Width::W32,
        });
        cg.emit(Inst::Jcc {
            cond: Cond::E,
            target,
        });
    }
    cg.emit(Inst::Jmp { target: default });
    cg.release(child);
    None
}

fn ret(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let opcode = n.opcode();
    if opcode != Opcode::Return {
        let child = n.child(0);
        let v = cg.gen_use(child);
        let linkage = cg.target().linkage();
        match opcode {
            Opcode::IReturn => cg.emit(Inst::Mov {
                dst: linkage.int_ret,
                src: v,
                width: Width::W32,
            }),
            Opcode::LReturn => cg.emit(Inst::Mov {
                dst: linkage.int_ret,
                src: v,
                width: Width::W64,
            }),
            Opcode::AReturn => {
                let width = cg.target().pointer_width();
                cg.emit(Inst::Mov {
                    dst: linkage.int_ret,
                    src: v,
                    width,
                });
            }
            Opcode::FReturn | Opcode::DReturn => cg.emit(Inst::MovF {
                dst: linkage.float_ret,
                src: v,
            }),
            op => unreachable!("{} is not a return", op.name()),
        }
        cg.release(child);
    }
    cg.emit(Inst::Ret);
    None
}

fn call(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    call_sequence(cg, node)
}

/// Widening/narrowing moves within the general-purpose file.
fn int_narrowing(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let child = n.child(0);
    let src = cg.gen_use(child);
    let dst = match cg.steal(child) {
        Some(d) => d,
        None => {
            let d = cg.alloc(RegKind::Gpr);
            cg.release(child);
            d
        }
    };
    match n.opcode() {
        Opcode::I2L => cg.emit(Inst::MovSx {
            dst,
            src,
            from: Width::W32,
        }),
        Opcode::IU2L => cg.emit(Inst::MovZx {
            dst,
            src,
            from: Width::W32,
        }),
        // A 32-bit register write zeroes the upper half.
        Opcode::L2I => cg.emit(Inst::Mov {
            dst,
            src,
            width: Width::W32,
        }),
        Opcode::I2B | Opcode::B2I => cg.emit(Inst::MovSx {
            dst,
            src,
            from: Width::W8,
        }),
        Opcode::BU2I => cg.emit(Inst::MovZx {
            dst,
            src,
            from: Width::W8,
        }),
        Opcode::I2S | Opcode::S2I => cg.emit(Inst::MovSx {
            dst,
            src,
            from: Width::W16,
        }),
        Opcode::SU2I => cg.emit(Inst::MovZx {
            dst,
            src,
            from: Width::W16,
        }),
        op => unreachable!("{} is not an integer conversion", op.name()),
    }
    Some(dst)
}

fn int_to_float(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let (src64, double) = match n.opcode() {
        Opcode::I2F => (false, false),
        Opcode::I2D => (false, true),
        Opcode::L2D => (true, true),
        op => unreachable!("{} is not an int-to-float conversion", op.name()),
    };
    let child = n.child(0);
    let src = cg.gen_use(child);
    let dst = cg.alloc(RegKind::Fpr);
    cg.emit(Inst::CvtI2F {
        dst,
        src,
        src64,
        double,
    });
    cg.release(child);
    Some(dst)
}

fn float_to_int(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let double = n.opcode() == Opcode::D2I;
    let child = n.child(0);
    let src = cg.gen_use(child);
    let dst = cg.alloc(RegKind::Gpr);
    cg.emit(Inst::CvtF2I {
        dst,
        src,
        dst64: false,
        double,
    });
    cg.release(child);
    Some(dst)
}

fn float_to_float(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let to_double = n.opcode() == Opcode::F2D;
    let child = n.child(0);
    let src = cg.gen_use(child);
    let dst = match cg.steal(child) {
        Some(d) => d,
        None => {
            let d = cg.alloc(RegKind::Fpr);
            cg.release(child);
            d
        }
    };
    cg.emit(Inst::CvtF2F {
        dst,
        src,
        to_double,
    });
    Some(dst)
}

fn reinterpret(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let child = n.child(0);
    let src = cg.gen_use(child);
    let dst = match n.opcode() {
        Opcode::IBits2F => {
            let d = cg.alloc(RegKind::Fpr);
            cg.emit(Inst::MovGprToFpr {
                dst: d,
                src,
                w64: false,
            });
            d
        }
        Opcode::LBits2D => {
            let d = cg.alloc(RegKind::Fpr);
            cg.emit(Inst::MovGprToFpr {
                dst: d,
                src,
                w64: true,
            });
            d
        }
        Opcode::FBits2I => {
            let d = cg.alloc(RegKind::Gpr);
            cg.emit(Inst::MovFprToGpr {
                dst: d,
                src,
                w64: false,
            });
            d
        }
        Opcode::DBits2L => {
            let d = cg.alloc(RegKind::Gpr);
            cg.emit(Inst::MovFprToGpr {
                dst: d,
                src,
                w64: true,
            });
            d
        }
        op => unreachable!("{} is not a bit reinterpretation", op.name()),
    };
    cg.release(child);
    Some(dst)
}

fn select(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let width = match n.opcode() {
        Opcode::ISelect => Width::W32,
        _ => Width::W64,
    };
    let (cond, then, other) = (n.child(0), n.child(1), n.child(2));
    let cv = cg.gen_use(cond);
    let _ = cg.gen_use(then);
    let ev = cg.gen_use(other);
    let dst = claim_gpr(cg, then, width);
    cg.emit(Inst::Test {
        lhs: cv,
        rhs: cv,
        width: Width::W32,
    });
    cg.emit(Inst::Cmov {
        dst,
        src: ev,
        cond: Cond::E,
        width,
    });
    cg.release(cond);
    cg.release(other);
    Some(dst)
}

fn byteswap(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let width = match cg.tree().get(node).opcode() {
        Opcode::IByteswap => Width::W32,
        _ => Width::W64,
    };
    let child = cg.tree().get(node).child(0);
    let dst = claim_gpr(cg, child, width);
    cg.emit(Inst::Bswap { dst, width });
    Some(dst)
}

fn vector_splat(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let elem = match n.opcode() {
        Opcode::VSplatsI => ElemKind::I32,
        _ => ElemKind::F32,
    };
    let child = n.child(0);
    let src = cg.gen_use(child);
    let dst = cg.alloc(RegKind::Vec);
    cg.emit(Inst::VSplat { dst, src, elem });
    cg.release(child);
    Some(dst)
}

fn vector_load(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let base = cg.tree().get(node).child(0);
    let addr = indirect_addr(cg, node, base);
    let dst = cg.alloc(RegKind::Vec);
    cg.emit(Inst::VLoad { dst, addr });
    Some(dst)
}

fn vector_store(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let (addr_child, value_child) = (n.child(0), n.child(1));
    let disp = n.offset();
    let base = cg.gen_use(addr_child);
    let src = cg.gen_use(value_child);
    cg.emit(Inst::VStore {
        src,
        addr: Addr::base(base, disp),
    });
    cg.release(addr_child);
    cg.release(value_child);
    None
}

fn vector_binary(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let op = match cg.tree().get(node).opcode() {
        Opcode::VAddI => VAluOp::AddI,
        Opcode::VSubI => VAluOp::SubI,
        Opcode::VMulI => VAluOp::MulI,
        Opcode::VAndI => VAluOp::AndV,
        Opcode::VOrI => VAluOp::OrV,
        Opcode::VXorI => VAluOp::XorV,
        Opcode::VAddF => VAluOp::AddF,
        Opcode::VSubF => VAluOp::SubF,
        Opcode::VMulF => VAluOp::MulF,
        Opcode::VDivF => VAluOp::DivF,
        op => unreachable!("{} is not a vector binary opcode", op.name()),
    };
    Some(vector_binary_op(cg, node, op))
}

fn vector_compare(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let op = match n.opcode() {
        Opcode::VCmpEqI => VCmpOp::EqI,
        Opcode::VCmpGtI => VCmpOp::GtI,
        Opcode::VCmpLtI => VCmpOp::LtI,
        Opcode::VCmpEqF => VCmpOp::EqF,
        Opcode::VCmpLtF => VCmpOp::LtF,
        op => unreachable!("{} is not a vector compare", op.name()),
    };
    let (lhs, rhs) = (n.child(0), n.child(1));
    let lv = cg.gen_use(lhs);
    let rv = cg.gen_use(rhs);
    let dst = cg.alloc(RegKind::Mask);
    cg.emit(Inst::VCmp {
        op,
        dst,
        lhs: lv,
        rhs: rv,
    });
    cg.release(lhs);
    cg.release(rhs);
    Some(dst)
}

fn vector_reduce(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    Some(match cg.tree().get(node).opcode() {
        Opcode::VReduceAddI => vector_reduce_int(cg, node, IntFold::Alu(AluOp::Add)),
        Opcode::VReduceMinI => vector_reduce_int(cg, node, IntFold::Min),
        Opcode::VReduceMaxI => vector_reduce_int(cg, node, IntFold::Max),
        Opcode::VReduceAndI => vector_reduce_int(cg, node, IntFold::Alu(AluOp::And)),
        Opcode::VReduceOrI => vector_reduce_int(cg, node, IntFold::Alu(AluOp::Or)),
        Opcode::VReduceXorI => vector_reduce_int(cg, node, IntFold::Alu(AluOp::Xor)),
        Opcode::VReduceAddF => vector_reduce_float(cg, node, AluFOp::Add),
        Opcode::VReduceMinF => vector_reduce_float(cg, node, AluFOp::Min),
        Opcode::VReduceMaxF => vector_reduce_float(cg, node, AluFOp::Max),
        op => unreachable!("{} is not a reduction", op.name()),
    })
}

fn vector_masked(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let op = match cg.tree().get(node).opcode() {
        Opcode::VMAddI => VAluOp::AddI,
        Opcode::VMSubI => VAluOp::SubI,
        Opcode::VMAddF => VAluOp::AddF,
        op => unreachable!("{} is not a masked vector opcode", op.name()),
    };
    Some(vector_masked_op(cg, node, op))
}

fn vector_blend(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    // (mask, then, else): set lanes take `then`.
    let (mask, then, other) = (n.child(0), n.child(1), n.child(2));
    let mv = cg.gen_use(mask);
    let tv = cg.gen_use(then);
    let _ = cg.gen_use(other);
    let dst = claim_vec(cg, other);
    cg.emit(Inst::VBlend {
        dst,
        src: tv,
        mask: mv,
    });
    cg.release(mask);
    cg.release(then);
    Some(dst)
}

fn vector_permute(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let lanes = n.lanes();
    let child = n.child(0);
    let src = cg.gen_use(child);
    let dst = match cg.steal(child) {
        Some(d) => d,
        None => {
            let d = cg.alloc(RegKind::Vec);
            cg.release(child);
            d
        }
    };
    cg.emit(Inst::VPermute { dst, src, lanes });
    Some(dst)
}

fn mask_binary(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let op = match n.opcode() {
        Opcode::MAnd => MaskBinOp::And,
        Opcode::MOr => MaskBinOp::Or,
        op => unreachable!("{} is not a mask binary opcode", op.name()),
    };
    let (lhs, rhs) = (n.child(0), n.child(1));
    let _ = cg.gen_use(lhs);
    let rv = cg.gen_use(rhs);
    let dst = claim_mask(cg, lhs);
    cg.emit(Inst::MaskBin { op, dst, src: rv });
    cg.release(rhs);
    Some(dst)
}

fn mask_not(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let child = cg.tree().get(node).child(0);
    let src = cg.gen_use(child);
    let dst = match cg.steal(child) {
        Some(d) => d,
        None => {
            let d = cg.alloc(RegKind::Mask);
            cg.release(child);
            d
        }
    };
    cg.emit(Inst::MaskNot { dst, src });
    Some(dst)
}

fn mask_test(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    // kortest: cf = all lanes set, zf = no lane set.
    let cond = match n.opcode() {
        Opcode::MAllTrue => Cond::B,
        Opcode::MAnyTrue => Cond::Ne,
        op => unreachable!("{} is not a mask test", op.name()),
    };
    let child = n.child(0);
    let src = cg.gen_use(child);
    cg.emit(Inst::MaskTest { src });
    cg.release(child);
    let dst = cg.alloc(RegKind::Gpr);
    cg.emit(Inst::Setcc { dst, cond });
    Some(dst)
}

fn fence(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let kind = match cg.tree().get(node).opcode() {
        Opcode::Fence => FenceKind::Full,
        Opcode::LoadFence => FenceKind::Load,
        Opcode::StoreFence => FenceKind::Store,
        op => unreachable!("{} is not a fence", op.name()),
    };
    cg.emit(Inst::Fence { kind });
    None
}

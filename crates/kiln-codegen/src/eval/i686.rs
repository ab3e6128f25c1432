//! 32-bit overlay.
//!
//! The i686 baseline has no 64-bit general-purpose registers, no SSE vector
//! file, and none of the ABM/BMI extensions, so those slots are marked
//! unimplemented and [`EvaluatorTable::audit`] rejects trees that use them.
//! Leading/trailing zero counts are lowered through `bsr`/`bsf`, which leave
//! the destination undefined on a zero input and need an explicit branch to
//! produce the defined-at-zero result.

use kiln_ir::{NodeId, Opcode};

use crate::cg::CodeGenerator;
use crate::eval::common;
use crate::inst::{AluOp, Cond, Inst, Width};
use crate::reg::{Reg, RegKind};
use crate::table::EvaluatorTable;

pub(crate) fn table() -> EvaluatorTable {
    let mut t = EvaluatorTable::new();
    common::install(&mut t);

    // 64-bit values do not fit the register file.
    const SIXTY_FOUR_BIT: &[Opcode] = &[
        Opcode::LConst,
        Opcode::LLoad,
        Opcode::LLoadI,
        Opcode::LStore,
        Opcode::LStoreI,
        Opcode::LAdd,
        Opcode::LSub,
        Opcode::LMul,
        Opcode::LDiv,
        Opcode::LUDiv,
        Opcode::LRem,
        Opcode::LURem,
        Opcode::LNeg,
        Opcode::LAbs,
        Opcode::LShl,
        Opcode::LShr,
        Opcode::LUShr,
        Opcode::LRol,
        Opcode::LAnd,
        Opcode::LOr,
        Opcode::LXor,
        Opcode::LCmpEq,
        Opcode::LCmpNe,
        Opcode::LCmpLt,
        Opcode::LCmpGe,
        Opcode::LCmpGt,
        Opcode::LCmpLe,
        Opcode::LUCmpLt,
        Opcode::LUCmpGe,
        Opcode::IfLCmpEq,
        Opcode::IfLCmpNe,
        Opcode::IfLCmpLt,
        Opcode::IfLCmpGe,
        Opcode::LReturn,
        Opcode::LCall,
        Opcode::LSelect,
        Opcode::I2L,
        Opcode::IU2L,
        Opcode::L2I,
        Opcode::L2D,
        Opcode::LBits2D,
        Opcode::DBits2L,
        Opcode::LPopcnt,
        Opcode::LClz,
        Opcode::LCtz,
        Opcode::LByteswap,
    ];
    // No SSE register file in the baseline.
    const VECTOR: &[Opcode] = &[
        Opcode::VSplatsI,
        Opcode::VLoadI,
        Opcode::VStoreI,
        Opcode::VAddI,
        Opcode::VSubI,
        Opcode::VMulI,
        Opcode::VAndI,
        Opcode::VOrI,
        Opcode::VXorI,
        Opcode::VMinI,
        Opcode::VMaxI,
        Opcode::VCmpEqI,
        Opcode::VCmpGtI,
        Opcode::VCmpLtI,
        Opcode::VReduceAddI,
        Opcode::VReduceMinI,
        Opcode::VReduceMaxI,
        Opcode::VReduceAndI,
        Opcode::VReduceOrI,
        Opcode::VReduceXorI,
        Opcode::VMAddI,
        Opcode::VMSubI,
        Opcode::VBlendI,
        Opcode::VPermI,
        Opcode::VSplatsF,
        Opcode::VLoadF,
        Opcode::VStoreF,
        Opcode::VAddF,
        Opcode::VSubF,
        Opcode::VMulF,
        Opcode::VDivF,
        Opcode::VCmpEqF,
        Opcode::VCmpLtF,
        Opcode::VReduceAddF,
        Opcode::VReduceMinF,
        Opcode::VReduceMaxF,
        Opcode::VMAddF,
        Opcode::MAnd,
        Opcode::MOr,
        Opcode::MNot,
        Opcode::MAllTrue,
        Opcode::MAnyTrue,
    ];
    for &op in SIXTY_FOUR_BIT.iter().chain(VECTOR) {
        t.set_unimplemented(op);
    }

    t.set(Opcode::IClz, count_leading);
    t.set(Opcode::ICtz, count_trailing);
    // IPopcnt, ICompressBits and IExpandBits stay unimplemented: the
    // baseline lacks popcnt and BMI2.
    t
}

/// `bsr` + branch. `bsr` sets `zf` and leaves the destination undefined on a
/// zero source, so the zero case is handled with a taken branch; `mov` does
/// not disturb the flags between `bsr` and the `jcc`.
fn count_leading(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let child = cg.tree().get(node).child(0);
    let src = cg.gen_use(child);
    let tmp = cg.alloc(RegKind::Gpr);
    let dst = cg.alloc(RegKind::Gpr);
    let done = cg.new_label();
    cg.emit(Inst::Bsr {
        dst: tmp,
        src,
        width: Width::W32,
    });
    cg.emit(Inst::MovImm {
        dst,
        imm: 32,
        width: Width::W32,
    });
    cg.emit(Inst::Jcc {
        cond: Cond::E,
        target: done,
    });
    cg.emit(Inst::MovImm {
        dst,
        imm: 31,
        width: Width::W32,
    });
    cg.emit(Inst::Alu {
        op: AluOp::Sub,
        dst,
        src: tmp,
        width: Width::W32,
    });
    cg.bind(done);
    cg.free(tmp);
    cg.release(child);
    Some(dst)
}

fn count_trailing(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let child = cg.tree().get(node).child(0);
    let src = cg.gen_use(child);
    let tmp = cg.alloc(RegKind::Gpr);
    let dst = cg.alloc(RegKind::Gpr);
    let done = cg.new_label();
    cg.emit(Inst::Bsf {
        dst: tmp,
        src,
        width: Width::W32,
    });
    cg.emit(Inst::MovImm {
        dst,
        imm: 32,
        width: Width::W32,
    });
    cg.emit(Inst::Jcc {
        cond: Cond::E,
        target: done,
    });
    cg.emit(Inst::Mov {
        dst,
        src: tmp,
        width: Width::W32,
    });
    cg.bind(done);
    cg.free(tmp);
    cg.release(child);
    Some(dst)
}

//! 64-bit overlay: ABM/BMI2 bit counting and the SSE4.1-style packed
//! signed min/max the generic layer leaves unimplemented.

use kiln_ir::{NodeId, Opcode};

use crate::cg::CodeGenerator;
use crate::eval::{common, vector_binary_with};
use crate::inst::{Inst, VCmpOp, Width};
use crate::reg::{Reg, RegKind};
use crate::table::EvaluatorTable;

pub(crate) fn table() -> EvaluatorTable {
    let mut t = EvaluatorTable::new();
    common::install(&mut t);
    t.set(Opcode::IPopcnt, popcnt);
    t.set(Opcode::LPopcnt, popcnt);
    t.set(Opcode::IClz, count_zeros);
    t.set(Opcode::LClz, count_zeros);
    t.set(Opcode::ICtz, count_zeros);
    t.set(Opcode::LCtz, count_zeros);
    t.set(Opcode::ICompressBits, bit_compress);
    t.set(Opcode::IExpandBits, bit_expand);
    t.set(Opcode::VMinI, vector_min);
    t.set(Opcode::VMaxI, vector_max);
    t
}

fn popcnt(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let width = match n.opcode() {
        Opcode::IPopcnt => Width::W32,
        _ => Width::W64,
    };
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
    cg.emit(Inst::Popcnt { dst, src, width });
    Some(dst)
}

/// `lzcnt`/`tzcnt` are defined at zero (they yield the operand width), which
/// is exactly the IR contract.
fn count_zeros(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let (leading, width) = match n.opcode() {
        Opcode::IClz => (true, Width::W32),
        Opcode::LClz => (true, Width::W64),
        Opcode::ICtz => (false, Width::W32),
        Opcode::LCtz => (false, Width::W64),
        op => unreachable!("{} is not a zero count", op.name()),
    };
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
    if leading {
        cg.emit(Inst::Lzcnt { dst, src, width });
    } else {
        cg.emit(Inst::Tzcnt { dst, src, width });
    }
    Some(dst)
}

fn bit_compress(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let (value, mask) = (n.child(0), n.child(1));
    let sv = cg.gen_use(value);
    let mv = cg.gen_use(mask);
    let dst = cg.alloc(RegKind::Gpr);
    cg.emit(Inst::Pext {
        dst,
        src: sv,
        mask: mv,
        width: Width::W32,
    });
    cg.release(value);
    cg.release(mask);
    Some(dst)
}

fn bit_expand(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    let n = cg.tree().get(node);
    let (value, mask) = (n.child(0), n.child(1));
    let sv = cg.gen_use(value);
    let mv = cg.gen_use(mask);
    let dst = cg.alloc(RegKind::Gpr);
    cg.emit(Inst::Pdep {
        dst,
        src: sv,
        mask: mv,
        width: Width::W32,
    });
    cg.release(value);
    cg.release(mask);
    Some(dst)
}

// SSE2 has no packed signed min/max; compare-and-blend stands in.

fn vector_min(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    Some(vector_binary_with(cg, node, |cg, dst, src| {
        let m = cg.alloc(RegKind::Mask);
        cg.emit(Inst::VCmp {
            op: VCmpOp::GtI,
            dst: m,
            lhs: dst,
            rhs: src,
        });
        // Lanes where dst > src take src.
        cg.emit(Inst::VBlend { dst, src, mask: m });
        cg.free(m);
    }))
}

fn vector_max(cg: &mut CodeGenerator<'_>, node: NodeId) -> Option<Reg> {
    Some(vector_binary_with(cg, node, |cg, dst, src| {
        let m = cg.alloc(RegKind::Mask);
        cg.emit(Inst::VCmp {
            op: VCmpOp::GtI,
            dst: m,
            lhs: src,
            rhs: dst,
        });
        cg.emit(Inst::VBlend { dst, src, mask: m });
        cg.free(m);
    }))
}

//! The modelled x86-64 instruction stream evaluators emit into.
//!
//! Instructions are width-tagged and keep x86 semantics where those semantics
//! are load-bearing for the IR contract: shift counts are masked by the
//! hardware (`width - 1` for 32/64-bit operands), `Ucomis` sets `zf/pf/cf`
//! exactly as the hardware does (unordered ⇒ all three set), 32-bit register
//! writes zero the upper half, and `cvttss2si`/`cvttsd2si` produce the
//! integer-indefinite value on NaN/overflow.

use kiln_ir::SymRef;

use crate::reg::Reg;

/// Operand width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
}

impl Width {
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            Width::W8 => 8,
            Width::W16 => 16,
            Width::W32 => 32,
            Width::W64 => 64,
        }
    }

    #[must_use]
    pub fn mask(self) -> u64 {
        match self {
            Width::W64 => u64::MAX,
            w => (1u64 << w.bits()) - 1,
        }
    }
}

/// Machine label; resolved to an instruction offset by the executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

/// x86 condition codes, evaluated against [`Flags`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    O,
    No,
    B,
    Ae,
    E,
    Ne,
    Be,
    A,
    S,
    Ns,
    P,
    Np,
    L,
    Ge,
    Le,
    G,
}

/// Architectural flags. `pf` is modelled only as the unordered indicator set
/// by [`Inst::Ucomis`]; integer instructions clear it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags {
    pub cf: bool,
    pub zf: bool,
    pub sf: bool,
    pub of: bool,
    pub pf: bool,
}

impl Flags {
    #[must_use]
    pub fn eval(self, cond: Cond) -> bool {
        match cond {
            Cond::O => self.of,
            Cond::No => !self.of,
            Cond::B => self.cf,
            Cond::Ae => !self.cf,
            Cond::E => self.zf,
            Cond::Ne => !self.zf,
            Cond::Be => self.cf || self.zf,
            Cond::A => !self.cf && !self.zf,
            Cond::S => self.sf,
            Cond::Ns => !self.sf,
            Cond::P => self.pf,
            Cond::Np => !self.pf,
            Cond::L => self.sf != self.of,
            Cond::Ge => self.sf == self.of,
            Cond::Le => self.zf || self.sf != self.of,
            Cond::G => !self.zf && self.sf == self.of,
        }
    }
}

/// `base + index * scale + disp` addressing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Addr {
    pub base: Option<Reg>,
    pub index: Option<(Reg, u8)>,
    pub disp: i32,
}

impl Addr {
    #[must_use]
    pub fn abs(disp: i32) -> Self {
        Addr {
            base: None,
            index: None,
            disp,
        }
    }

    #[must_use]
    pub fn base(base: Reg, disp: i32) -> Self {
        Addr {
            base: Some(base),
            index: None,
            disp,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ext {
    Zero,
    Sign,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftCount {
    Imm(u8),
    Reg(Reg),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallTarget {
    Sym(SymRef),
    Reg(Reg),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Imul,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftOp {
    Shl,
    /// Logical right shift.
    Shr,
    /// Arithmetic right shift.
    Sar,
    Rol,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluFOp {
    Add,
    Sub,
    Mul,
    Div,
    /// x86 `minss`/`minsd` shape: returns the second operand when either
    /// input is NaN or the operands compare equal.
    Min,
    Max,
    /// Bitwise ops on float registers (`andps`/`xorps`), used for abs/neg.
    And,
    Xor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VAluOp {
    AddI,
    SubI,
    MulI,
    AndV,
    OrV,
    XorV,
    AddF,
    SubF,
    MulF,
    DivF,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VCmpOp {
    EqI,
    GtI,
    LtI,
    EqF,
    LtF,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskBinOp {
    And,
    Or,
    Xor,
}

/// Element interpretation for vector splat/extract/insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElemKind {
    I32,
    F32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceKind {
    /// `mfence`: full ordering.
    Full,
    /// `lfence`: load ordering.
    Load,
    /// `sfence`: store ordering.
    Store,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrapKind {
    DivByZero,
    Unreachable,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Inst {
    Label(Label),

    // ---- Integer moves and memory -------------------------------------
    MovImm { dst: Reg, imm: i64, width: Width },
    Mov { dst: Reg, src: Reg, width: Width },
    MovSx { dst: Reg, src: Reg, from: Width },
    MovZx { dst: Reg, src: Reg, from: Width },
    Lea { dst: Reg, addr: Addr },
    Load { dst: Reg, addr: Addr, width: Width, ext: Ext },
    Store { src: Reg, addr: Addr, width: Width },

    // ---- Integer ALU ---------------------------------------------------
    Alu { op: AluOp, dst: Reg, src: Reg, width: Width },
    AluImm { op: AluOp, dst: Reg, imm: i64, width: Width },
    Neg { dst: Reg, width: Width },
    Shift { op: ShiftOp, dst: Reg, count: ShiftCount, width: Width },
    /// Explicit-operand division. The executor traps on a zero divisor as a
    /// backstop; `INT_MIN / -1` wraps (quotient `INT_MIN`, remainder 0).
    Div { dst: Reg, lhs: Reg, rhs: Reg, width: Width, signed: bool, rem: bool },

    // ---- Flags, conditions, control -------------------------------------
    Cmp { lhs: Reg, rhs: Reg, width: Width },
    CmpImm { lhs: Reg, imm: i64, width: Width },
    Test { lhs: Reg, rhs: Reg, width: Width },
    Setcc { dst: Reg, cond: Cond },
    Cmov { dst: Reg, src: Reg, cond: Cond, width: Width },
    Jcc { cond: Cond, target: Label },
    Jmp { target: Label },
    /// Computed jump through a contiguous table. The emitter is responsible
    /// for the bounds check; the index register is read as unsigned.
    JmpTable { index: Reg, targets: Box<[Label]> },
    Call { target: CallTarget },
    Ret,
    Push { src: Reg },
    Pop { dst: Reg },

    // ---- Bit manipulation -----------------------------------------------
    /// `bsf`: undefined destination and `zf=1` when the source is zero.
    Bsf { dst: Reg, src: Reg, width: Width },
    /// `bsr`: undefined destination and `zf=1` when the source is zero.
    Bsr { dst: Reg, src: Reg, width: Width },
    /// `lzcnt`: defined at zero (yields the operand width).
    Lzcnt { dst: Reg, src: Reg, width: Width },
    /// `tzcnt`: defined at zero (yields the operand width).
    Tzcnt { dst: Reg, src: Reg, width: Width },
    Popcnt { dst: Reg, src: Reg, width: Width },
    Bswap { dst: Reg, width: Width },
    Pext { dst: Reg, src: Reg, mask: Reg, width: Width },
    Pdep { dst: Reg, src: Reg, mask: Reg, width: Width },

    // ---- Scalar float ----------------------------------------------------
    MovF { dst: Reg, src: Reg },
    MovFImmBits { dst: Reg, bits: u64 },
    LoadF { dst: Reg, addr: Addr, double: bool },
    StoreF { src: Reg, addr: Addr, double: bool },
    AluF { op: AluFOp, dst: Reg, src: Reg, double: bool },
    SqrtF { dst: Reg, src: Reg, double: bool },
    /// `ucomiss`/`ucomisd`: unordered ⇒ `zf=pf=cf=1`.
    Ucomis { lhs: Reg, rhs: Reg, double: bool },
    CvtI2F { dst: Reg, src: Reg, src64: bool, double: bool },
    /// Truncating float→int; NaN/overflow produce the integer-indefinite
    /// value (`INT_MIN` of the destination width).
    CvtF2I { dst: Reg, src: Reg, dst64: bool, double: bool },
    CvtF2F { dst: Reg, src: Reg, to_double: bool },
    /// `movd`/`movq` general↔float register bit copies.
    MovGprToFpr { dst: Reg, src: Reg, w64: bool },
    MovFprToGpr { dst: Reg, src: Reg, w64: bool },

    // ---- Vector and mask -------------------------------------------------
    VMov { dst: Reg, src: Reg },
    VSplat { dst: Reg, src: Reg, elem: ElemKind },
    VLoad { dst: Reg, addr: Addr },
    VStore { src: Reg, addr: Addr },
    VAlu { op: VAluOp, dst: Reg, src: Reg },
    /// Merge-masked form: lanes with a clear mask bit keep `dst`'s value.
    VAluMasked { op: VAluOp, dst: Reg, src: Reg, mask: Reg },
    VCmp { op: VCmpOp, dst: Reg, lhs: Reg, rhs: Reg },
    /// Lanes with a set mask bit take `src`; the rest keep `dst`.
    VBlend { dst: Reg, src: Reg, mask: Reg },
    VPermute { dst: Reg, src: Reg, lanes: [u8; 4] },
    VExtract { dst: Reg, src: Reg, lane: u8, elem: ElemKind },
    VInsert { dst: Reg, src: Reg, lane: u8, elem: ElemKind },
    MaskMov { dst: Reg, src: Reg },
    MaskBin { op: MaskBinOp, dst: Reg, src: Reg },
    MaskNot { dst: Reg, src: Reg },
    /// `kortest` shape: `zf` = mask empty, `cf` = all lanes set.
    MaskTest { src: Reg },

    // ---- Ordering and faults ---------------------------------------------
    Fence { kind: FenceKind },
    Trap { kind: TrapKind },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_conditions_follow_sf_xor_of() {
        let lt = Flags {
            sf: true,
            of: false,
            ..Flags::default()
        };
        assert!(lt.eval(Cond::L));
        assert!(!lt.eval(Cond::Ge));
        assert!(lt.eval(Cond::Le));
        assert!(!lt.eval(Cond::G));
    }

    #[test]
    fn unordered_ucomis_flags_satisfy_below_not_above() {
        // ucomis on NaN sets zf/pf/cf all at once.
        let unordered = Flags {
            zf: true,
            pf: true,
            cf: true,
            ..Flags::default()
        };
        assert!(unordered.eval(Cond::B));
        assert!(unordered.eval(Cond::Be));
        assert!(!unordered.eval(Cond::A));
        assert!(!unordered.eval(Cond::Ae));
        assert!(unordered.eval(Cond::P));
    }

    #[test]
    fn width_masks() {
        assert_eq!(Width::W8.mask(), 0xff);
        assert_eq!(Width::W32.mask(), 0xffff_ffff);
        assert_eq!(Width::W64.mask(), u64::MAX);
    }
}

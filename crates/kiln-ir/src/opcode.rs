//! The opcode catalogue.
//!
//! One dense numeric space: every backend's dispatch table is indexed by
//! `Opcode as usize`, so the enum, the diagnostic names, result types,
//! arities, payload kinds, and property flags are all generated from the one
//! table below and cannot drift apart.

use bitflags::bitflags;

use crate::DataType;

bitflags! {
    /// Per-opcode property flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OpFlags: u16 {
        /// Operands may be swapped freely.
        const COMMUTATIVE = 1 << 0;
        /// Unsigned semantics (zero extension, unsigned compare/divide).
        const UNSIGNED = 1 << 1;
        /// Child count is a minimum, not an exact arity (calls).
        const VARIADIC = 1 << 2;
        /// Fused compare-and-branch: lowered as one unit, no boolean result.
        const COMPARE_BRANCH = 1 << 3;
        /// Transfers control (branches, switch, returns).
        const BRANCH = 1 << 4;
        /// Writes memory.
        const STORE = 1 << 5;
        /// Reads memory.
        const LOAD = 1 << 6;
        /// Transfers control to another function.
        const CALL = 1 << 7;
    }
}

/// What the opcode's payload slot must hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadKind {
    None,
    Int,
    Float,
    Double,
    Sym,
    Offset,
    Label,
    Cases,
    Lanes,
}

macro_rules! opcodes {
    ($( $variant:ident => $name:literal, $ty:ident, $arity:literal, $payload:ident, [$($flag:ident)|*]; )*) => {
        /// Abstract operation tags. Naming follows the classic prefix scheme:
        /// `i` = 32-bit int, `l` = 64-bit int, `b`/`s` = 8/16-bit, `f`/`d` =
        /// float/double, `a` = address, `v*` = vector, `m` = mask; a `u`
        /// marks unsigned semantics, a trailing `i` on memory ops marks the
        /// indirect (through-pointer) form.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum Opcode {
            $($variant,)*
        }

        impl Opcode {
            pub const COUNT: usize = [$(Opcode::$variant),*].len();

            /// Every opcode, in dispatch-table order.
            pub const ALL: [Opcode; Self::COUNT] = [$(Opcode::$variant),*];

            /// Lower-case diagnostic mnemonic.
            #[must_use]
            pub fn name(self) -> &'static str {
                match self { $(Opcode::$variant => $name,)* }
            }

            /// Type of the value this node produces (`Void` for control-only
            /// and store opcodes).
            #[must_use]
            pub fn result_type(self) -> DataType {
                match self { $(Opcode::$variant => DataType::$ty,)* }
            }

            /// Exact child count, or the minimum for variadic opcodes.
            #[must_use]
            pub fn arity(self) -> usize {
                match self { $(Opcode::$variant => $arity,)* }
            }

            #[must_use]
            pub fn payload_kind(self) -> PayloadKind {
                match self { $(Opcode::$variant => PayloadKind::$payload,)* }
            }

            #[must_use]
            pub fn flags(self) -> OpFlags {
                match self {
                    $(Opcode::$variant =>
                        OpFlags::from_bits_truncate(0 $(| OpFlags::$flag.bits())*),)*
                }
            }

            /// Dense dispatch-table index.
            #[must_use]
            pub fn index(self) -> usize {
                self as usize
            }
        }
    };
}

opcodes! {
    // ---- Constants ----------------------------------------------------
    IConst => "iconst", Int32, 0, Int, [];
    LConst => "lconst", Int64, 0, Int, [];
    BConst => "bconst", Int8, 0, Int, [];
    SConst => "sconst", Int16, 0, Int, [];
    FConst => "fconst", Float, 0, Float, [];
    DConst => "dconst", Double, 0, Double, [];
    AConst => "aconst", Address, 0, Int, [];

    // ---- Direct loads (payload = data symbol) -------------------------
    // Narrow loads widen into a 32-bit register: the plain forms
    // sign-extend, the `u` forms zero-extend.
    BLoad => "bload", Int32, 0, Sym, [LOAD];
    BULoad => "buload", Int32, 0, Sym, [LOAD | UNSIGNED];
    SLoad => "sload", Int32, 0, Sym, [LOAD];
    SULoad => "suload", Int32, 0, Sym, [LOAD | UNSIGNED];
    ILoad => "iload", Int32, 0, Sym, [LOAD];
    LLoad => "lload", Int64, 0, Sym, [LOAD];
    FLoad => "fload", Float, 0, Sym, [LOAD];
    DLoad => "dload", Double, 0, Sym, [LOAD];
    ALoad => "aload", Address, 0, Sym, [LOAD];

    // ---- Indirect loads (child 0 = address, payload = displacement) ---
    BLoadI => "bloadi", Int32, 1, Offset, [LOAD];
    BULoadI => "buloadi", Int32, 1, Offset, [LOAD | UNSIGNED];
    SLoadI => "sloadi", Int32, 1, Offset, [LOAD];
    SULoadI => "suloadi", Int32, 1, Offset, [LOAD | UNSIGNED];
    ILoadI => "iloadi", Int32, 1, Offset, [LOAD];
    LLoadI => "lloadi", Int64, 1, Offset, [LOAD];
    FLoadI => "floadi", Float, 1, Offset, [LOAD];
    DLoadI => "dloadi", Double, 1, Offset, [LOAD];
    ALoadI => "aloadi", Address, 1, Offset, [LOAD];

    // ---- Direct stores (child 0 = value, payload = data symbol) -------
    BStore => "bstore", Void, 1, Sym, [STORE];
    SStore => "sstore", Void, 1, Sym, [STORE];
    IStore => "istore", Void, 1, Sym, [STORE];
    LStore => "lstore", Void, 1, Sym, [STORE];
    FStore => "fstore", Void, 1, Sym, [STORE];
    DStore => "dstore", Void, 1, Sym, [STORE];
    AStore => "astore", Void, 1, Sym, [STORE];

    // ---- Indirect stores (children = address, value) ------------------
    BStoreI => "bstorei", Void, 2, Offset, [STORE];
    SStoreI => "sstorei", Void, 2, Offset, [STORE];
    IStoreI => "istorei", Void, 2, Offset, [STORE];
    LStoreI => "lstorei", Void, 2, Offset, [STORE];
    FStoreI => "fstorei", Void, 2, Offset, [STORE];
    DStoreI => "dstorei", Void, 2, Offset, [STORE];
    AStoreI => "astorei", Void, 2, Offset, [STORE];

    // ---- 32-bit integer arithmetic ------------------------------------
    IAdd => "iadd", Int32, 2, None, [COMMUTATIVE];
    ISub => "isub", Int32, 2, None, [];
    IMul => "imul", Int32, 2, None, [COMMUTATIVE];
    IDiv => "idiv", Int32, 2, None, [];
    IUDiv => "iudiv", Int32, 2, None, [UNSIGNED];
    IRem => "irem", Int32, 2, None, [];
    IURem => "iurem", Int32, 2, None, [UNSIGNED];
    INeg => "ineg", Int32, 1, None, [];
    IAbs => "iabs", Int32, 1, None, [];
    IMin => "imin", Int32, 2, None, [COMMUTATIVE];
    IMax => "imax", Int32, 2, None, [COMMUTATIVE];

    // ---- 64-bit integer arithmetic ------------------------------------
    LAdd => "ladd", Int64, 2, None, [COMMUTATIVE];
    LSub => "lsub", Int64, 2, None, [];
    LMul => "lmul", Int64, 2, None, [COMMUTATIVE];
    LDiv => "ldiv", Int64, 2, None, [];
    LUDiv => "ludiv", Int64, 2, None, [UNSIGNED];
    LRem => "lrem", Int64, 2, None, [];
    LURem => "lurem", Int64, 2, None, [UNSIGNED];
    LNeg => "lneg", Int64, 1, None, [];
    LAbs => "labs", Int64, 1, None, [];

    // ---- Float arithmetic ---------------------------------------------
    FAdd => "fadd", Float, 2, None, [COMMUTATIVE];
    FSub => "fsub", Float, 2, None, [];
    FMul => "fmul", Float, 2, None, [COMMUTATIVE];
    FDiv => "fdiv", Float, 2, None, [];
    FNeg => "fneg", Float, 1, None, [];
    FAbs => "fabs", Float, 1, None, [];
    FSqrt => "fsqrt", Float, 1, None, [];
    DAdd => "dadd", Double, 2, None, [COMMUTATIVE];
    DSub => "dsub", Double, 2, None, [];
    DMul => "dmul", Double, 2, None, [COMMUTATIVE];
    DDiv => "ddiv", Double, 2, None, [];
    DNeg => "dneg", Double, 1, None, [];
    DAbs => "dabs", Double, 1, None, [];
    DSqrt => "dsqrt", Double, 1, None, [];

    // ---- Shifts and rotates (count masked by width - 1) ---------------
    IShl => "ishl", Int32, 2, None, [];
    IShr => "ishr", Int32, 2, None, [];
    IUShr => "iushr", Int32, 2, None, [UNSIGNED];
    IRol => "irol", Int32, 2, None, [];
    LShl => "lshl", Int64, 2, None, [];
    LShr => "lshr", Int64, 2, None, [];
    LUShr => "lushr", Int64, 2, None, [UNSIGNED];
    LRol => "lrol", Int64, 2, None, [];

    // ---- Bitwise ------------------------------------------------------
    IAnd => "iand", Int32, 2, None, [COMMUTATIVE];
    IOr => "ior", Int32, 2, None, [COMMUTATIVE];
    IXor => "ixor", Int32, 2, None, [COMMUTATIVE];
    LAnd => "land", Int64, 2, None, [COMMUTATIVE];
    LOr => "lor", Int64, 2, None, [COMMUTATIVE];
    LXor => "lxor", Int64, 2, None, [COMMUTATIVE];

    // ---- 32-bit integer compares (produce 0/1) ------------------------
    ICmpEq => "icmpeq", Int32, 2, None, [COMMUTATIVE];
    ICmpNe => "icmpne", Int32, 2, None, [COMMUTATIVE];
    ICmpLt => "icmplt", Int32, 2, None, [];
    ICmpGe => "icmpge", Int32, 2, None, [];
    ICmpGt => "icmpgt", Int32, 2, None, [];
    ICmpLe => "icmple", Int32, 2, None, [];
    IUCmpLt => "iucmplt", Int32, 2, None, [UNSIGNED];
    IUCmpGe => "iucmpge", Int32, 2, None, [UNSIGNED];
    IUCmpGt => "iucmpgt", Int32, 2, None, [UNSIGNED];
    IUCmpLe => "iucmple", Int32, 2, None, [UNSIGNED];

    // ---- 64-bit integer compares --------------------------------------
    LCmpEq => "lcmpeq", Int32, 2, None, [COMMUTATIVE];
    LCmpNe => "lcmpne", Int32, 2, None, [COMMUTATIVE];
    LCmpLt => "lcmplt", Int32, 2, None, [];
    LCmpGe => "lcmpge", Int32, 2, None, [];
    LCmpGt => "lcmpgt", Int32, 2, None, [];
    LCmpLe => "lcmple", Int32, 2, None, [];
    LUCmpLt => "lucmplt", Int32, 2, None, [UNSIGNED];
    LUCmpGe => "lucmpge", Int32, 2, None, [UNSIGNED];

    // ---- Float compares -----------------------------------------------
    // Ordered forms are false when either operand is NaN; the `u` forms
    // are true instead.
    FCmpEq => "fcmpeq", Int32, 2, None, [COMMUTATIVE];
    FCmpNe => "fcmpne", Int32, 2, None, [COMMUTATIVE];
    FCmpLt => "fcmplt", Int32, 2, None, [];
    FCmpGe => "fcmpge", Int32, 2, None, [];
    FCmpGt => "fcmpgt", Int32, 2, None, [];
    FCmpLe => "fcmple", Int32, 2, None, [];
    FCmpEqU => "fcmpequ", Int32, 2, None, [COMMUTATIVE];
    FCmpNeU => "fcmpneu", Int32, 2, None, [COMMUTATIVE];
    FCmpLtU => "fcmpltu", Int32, 2, None, [];
    FCmpGeU => "fcmpgeu", Int32, 2, None, [];
    FCmpGtU => "fcmpgtu", Int32, 2, None, [];
    FCmpLeU => "fcmpleu", Int32, 2, None, [];
    DCmpEq => "dcmpeq", Int32, 2, None, [COMMUTATIVE];
    DCmpNe => "dcmpne", Int32, 2, None, [COMMUTATIVE];
    DCmpLt => "dcmplt", Int32, 2, None, [];
    DCmpGe => "dcmpge", Int32, 2, None, [];
    DCmpGt => "dcmpgt", Int32, 2, None, [];
    DCmpLe => "dcmple", Int32, 2, None, [];
    DCmpEqU => "dcmpequ", Int32, 2, None, [COMMUTATIVE];
    DCmpNeU => "dcmpneu", Int32, 2, None, [COMMUTATIVE];
    DCmpLtU => "dcmpltu", Int32, 2, None, [];
    DCmpGeU => "dcmpgeu", Int32, 2, None, [];
    DCmpGtU => "dcmpgtu", Int32, 2, None, [];
    DCmpLeU => "dcmpleu", Int32, 2, None, [];

    // ---- Fused compare-and-branch (payload = target label) ------------
    IfICmpEq => "ificmpeq", Void, 2, Label, [COMPARE_BRANCH | BRANCH];
    IfICmpNe => "ificmpne", Void, 2, Label, [COMPARE_BRANCH | BRANCH];
    IfICmpLt => "ificmplt", Void, 2, Label, [COMPARE_BRANCH | BRANCH];
    IfICmpGe => "ificmpge", Void, 2, Label, [COMPARE_BRANCH | BRANCH];
    IfICmpGt => "ificmpgt", Void, 2, Label, [COMPARE_BRANCH | BRANCH];
    IfICmpLe => "ificmple", Void, 2, Label, [COMPARE_BRANCH | BRANCH];
    IfIUCmpLt => "ifiucmplt", Void, 2, Label, [COMPARE_BRANCH | BRANCH | UNSIGNED];
    IfIUCmpGe => "ifiucmpge", Void, 2, Label, [COMPARE_BRANCH | BRANCH | UNSIGNED];
    IfLCmpEq => "iflcmpeq", Void, 2, Label, [COMPARE_BRANCH | BRANCH];
    IfLCmpNe => "iflcmpne", Void, 2, Label, [COMPARE_BRANCH | BRANCH];
    IfLCmpLt => "iflcmplt", Void, 2, Label, [COMPARE_BRANCH | BRANCH];
    IfLCmpGe => "iflcmpge", Void, 2, Label, [COMPARE_BRANCH | BRANCH];

    // ---- Control flow -------------------------------------------------
    Goto => "goto", Void, 0, Label, [BRANCH];
    IfTrue => "iftrue", Void, 1, Label, [BRANCH];
    Switch => "switch", Void, 1, Cases, [BRANCH];
    Return => "return", Void, 0, None, [BRANCH];
    IReturn => "ireturn", Void, 1, None, [BRANCH];
    LReturn => "lreturn", Void, 1, None, [BRANCH];
    FReturn => "freturn", Void, 1, None, [BRANCH];
    DReturn => "dreturn", Void, 1, None, [BRANCH];
    AReturn => "areturn", Void, 1, None, [BRANCH];

    // ---- Calls (payload = function symbol, children = arguments) ------
    ICall => "icall", Int32, 0, Sym, [CALL | VARIADIC];
    LCall => "lcall", Int64, 0, Sym, [CALL | VARIADIC];
    FCall => "fcall", Float, 0, Sym, [CALL | VARIADIC];
    DCall => "dcall", Double, 0, Sym, [CALL | VARIADIC];
    ACall => "acall", Address, 0, Sym, [CALL | VARIADIC];
    Call => "call", Void, 0, Sym, [CALL | VARIADIC];
    // Indirect forms: child 0 = target address.
    ICallI => "icalli", Int32, 1, None, [CALL | VARIADIC];
    CallI => "calli", Void, 1, None, [CALL | VARIADIC];

    // ---- Conversions --------------------------------------------------
    I2L => "i2l", Int64, 1, None, [];
    IU2L => "iu2l", Int64, 1, None, [UNSIGNED];
    L2I => "l2i", Int32, 1, None, [];
    I2F => "i2f", Float, 1, None, [];
    I2D => "i2d", Double, 1, None, [];
    L2D => "l2d", Double, 1, None, [];
    F2I => "f2i", Int32, 1, None, [];
    D2I => "d2i", Int32, 1, None, [];
    F2D => "f2d", Double, 1, None, [];
    D2F => "d2f", Float, 1, None, [];
    I2B => "i2b", Int32, 1, None, [];
    I2S => "i2s", Int32, 1, None, [];
    B2I => "b2i", Int32, 1, None, [];
    BU2I => "bu2i", Int32, 1, None, [UNSIGNED];
    S2I => "s2i", Int32, 1, None, [];
    SU2I => "su2i", Int32, 1, None, [UNSIGNED];

    // ---- Bit reinterpretation (same-width bit copy, no conversion) ----
    IBits2F => "ibits2f", Float, 1, None, [];
    FBits2I => "fbits2i", Int32, 1, None, [];
    LBits2D => "lbits2d", Double, 1, None, [];
    DBits2L => "dbits2l", Int64, 1, None, [];

    // ---- Select (cond, then, else) ------------------------------------
    ISelect => "iselect", Int32, 3, None, [];
    LSelect => "lselect", Int64, 3, None, [];

    // ---- Bit manipulation ---------------------------------------------
    IPopcnt => "ipopcnt", Int32, 1, None, [];
    LPopcnt => "lpopcnt", Int64, 1, None, [];
    IClz => "iclz", Int32, 1, None, [];
    ICtz => "ictz", Int32, 1, None, [];
    LClz => "lclz", Int64, 1, None, [];
    LCtz => "lctz", Int64, 1, None, [];
    IByteswap => "ibyteswap", Int32, 1, None, [];
    LByteswap => "lbyteswap", Int64, 1, None, [];
    ICompressBits => "icompressbits", Int32, 2, None, [];
    IExpandBits => "iexpandbits", Int32, 2, None, [];

    // ---- Integer vectors (4 x int32) ----------------------------------
    VSplatsI => "vsplatsi", VectorInt32, 1, None, [];
    VLoadI => "vloadi", VectorInt32, 1, Offset, [LOAD];
    VStoreI => "vstorei", Void, 2, Offset, [STORE];
    VAddI => "vaddi", VectorInt32, 2, None, [COMMUTATIVE];
    VSubI => "vsubi", VectorInt32, 2, None, [];
    VMulI => "vmuli", VectorInt32, 2, None, [COMMUTATIVE];
    VAndI => "vandi", VectorInt32, 2, None, [COMMUTATIVE];
    VOrI => "vori", VectorInt32, 2, None, [COMMUTATIVE];
    VXorI => "vxori", VectorInt32, 2, None, [COMMUTATIVE];
    VMinI => "vmini", VectorInt32, 2, None, [COMMUTATIVE];
    VMaxI => "vmaxi", VectorInt32, 2, None, [COMMUTATIVE];
    VCmpEqI => "vcmpeqi", Mask, 2, None, [COMMUTATIVE];
    VCmpGtI => "vcmpgti", Mask, 2, None, [];
    VCmpLtI => "vcmplti", Mask, 2, None, [];
    VReduceAddI => "vreduceaddi", Int32, 1, None, [];
    VReduceMinI => "vreducemini", Int32, 1, None, [];
    VReduceMaxI => "vreducemaxi", Int32, 1, None, [];
    VReduceAndI => "vreduceandi", Int32, 1, None, [];
    VReduceOrI => "vreduceori", Int32, 1, None, [];
    VReduceXorI => "vreducexori", Int32, 1, None, [];
    // Masked forms: (lhs, rhs, mask); unselected lanes keep lhs's lane.
    VMAddI => "vmaddi", VectorInt32, 3, None, [];
    VMSubI => "vmsubi", VectorInt32, 3, None, [];
    // Blend: (mask, then, else) selects per lane.
    VBlendI => "vblendi", VectorInt32, 3, None, [];
    VPermI => "vpermi", VectorInt32, 1, Lanes, [];

    // ---- Float vectors (4 x float) ------------------------------------
    VSplatsF => "vsplatsf", VectorFloat, 1, None, [];
    VLoadF => "vloadf", VectorFloat, 1, Offset, [LOAD];
    VStoreF => "vstoref", Void, 2, Offset, [STORE];
    VAddF => "vaddf", VectorFloat, 2, None, [COMMUTATIVE];
    VSubF => "vsubf", VectorFloat, 2, None, [];
    VMulF => "vmulf", VectorFloat, 2, None, [COMMUTATIVE];
    VDivF => "vdivf", VectorFloat, 2, None, [];
    VCmpEqF => "vcmpeqf", Mask, 2, None, [COMMUTATIVE];
    VCmpLtF => "vcmpltf", Mask, 2, None, [];
    VReduceAddF => "vreduceaddf", Float, 1, None, [];
    VReduceMinF => "vreduceminf", Float, 1, None, [];
    VReduceMaxF => "vreducemaxf", Float, 1, None, [];
    VMAddF => "vmaddf", VectorFloat, 3, None, [];

    // ---- Masks --------------------------------------------------------
    MAnd => "mand", Mask, 2, None, [COMMUTATIVE];
    MOr => "mor", Mask, 2, None, [COMMUTATIVE];
    MNot => "mnot", Mask, 1, None, [];
    MAllTrue => "malltrue", Int32, 1, None, [];
    MAnyTrue => "manytrue", Int32, 1, None, [];

    // ---- Fences (control-only, no result) -----------------------------
    Fence => "fence", Void, 0, None, [];
    LoadFence => "loadfence", Void, 0, None, [];
    StoreFence => "storefence", Void, 0, None, [];

    // ---- Host-runtime dialect -----------------------------------------
    // Monitor opcodes belong to a host runtime's IR dialect; the generic
    // backends wire them to the invalid-opcode sentinel.
    MonEnt => "monent", Void, 1, None, [];
    MonExit => "monexit", Void, 1, None, [];
}

impl Opcode {
    #[must_use]
    pub fn is_commutative(self) -> bool {
        self.flags().contains(OpFlags::COMMUTATIVE)
    }

    #[must_use]
    pub fn is_unsigned(self) -> bool {
        self.flags().contains(OpFlags::UNSIGNED)
    }

    #[must_use]
    pub fn is_variadic(self) -> bool {
        self.flags().contains(OpFlags::VARIADIC)
    }

    #[must_use]
    pub fn is_compare_branch(self) -> bool {
        self.flags().contains(OpFlags::COMPARE_BRANCH)
    }

    #[must_use]
    pub fn is_branch(self) -> bool {
        self.flags().contains(OpFlags::BRANCH)
    }

    #[must_use]
    pub fn is_store(self) -> bool {
        self.flags().contains(OpFlags::STORE)
    }

    #[must_use]
    pub fn is_load(self) -> bool {
        self.flags().contains(OpFlags::LOAD)
    }

    #[must_use]
    pub fn is_call(self) -> bool {
        self.flags().contains(OpFlags::CALL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_indices_are_dense_and_stable() {
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(op.index(), i);
        }
        assert_eq!(Opcode::ALL.len(), Opcode::COUNT);
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<&str> = Opcode::ALL.iter().map(|op| op.name()).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(names.len(), before);
    }

    #[test]
    fn unsigned_loads_are_flagged() {
        assert!(Opcode::BULoad.is_unsigned());
        assert!(!Opcode::BLoad.is_unsigned());
        assert!(Opcode::SULoadI.is_unsigned());
    }

    #[test]
    fn stores_and_branches_are_void() {
        for op in Opcode::ALL {
            if op.is_store() || op.is_branch() {
                assert_eq!(
                    op.result_type(),
                    DataType::Void,
                    "{} should be void",
                    op.name()
                );
            }
        }
    }
}

//! Calling conventions.
//!
//! Both targets use a private linkage over the allocatable files: every
//! allocatable register is caller-saved, so call sites preserve whatever is
//! live by pushing it around the call. Integer and address arguments go in
//! `int_args` order, float/double arguments in `float_args` order; extras
//! beyond the register lists are unsupported by the private linkage.

use crate::reg::{fpr, gpr, Reg};

#[derive(Clone, Copy, Debug)]
pub struct Linkage {
    pub int_args: &'static [Reg],
    pub float_args: &'static [Reg],
    pub int_ret: Reg,
    pub float_ret: Reg,
    /// Register a computed call target is staged in. Never used to pass
    /// arguments.
    pub scratch: Reg,
}

impl Linkage {
    /// System V-flavoured 64-bit linkage: rdi, rsi, rdx, rcx, r8, r9 for
    /// integer arguments, xmm0-7 for floats, rax/xmm0 for returns.
    pub const AMD64: Linkage = Linkage {
        int_args: &[gpr(5), gpr(4), gpr(2), gpr(1), gpr(6), gpr(7)],
        float_args: &[
            fpr(0),
            fpr(1),
            fpr(2),
            fpr(3),
            fpr(4),
            fpr(5),
            fpr(6),
            fpr(7),
        ],
        int_ret: gpr(0),
        float_ret: fpr(0),
        scratch: gpr(11),
    };

    /// 32-bit private linkage: register arguments only (fastcall-style,
    /// widened to four registers), eax return.
    pub const I686: Linkage = Linkage {
        int_args: &[gpr(1), gpr(2), gpr(3), gpr(4)],
        float_args: &[fpr(0), fpr(1), fpr(2), fpr(3)],
        int_ret: gpr(0),
        float_ret: fpr(0),
        scratch: gpr(5),
    };
}

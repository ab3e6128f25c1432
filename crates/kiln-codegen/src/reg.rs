//! Register handles.

use std::fmt;

/// Storage class of a result handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegKind {
    /// General-purpose integer register.
    Gpr,
    /// Scalar floating-point register.
    Fpr,
    /// 128-bit vector register.
    Vec,
    /// Lane-predicate (mask) register.
    Mask,
}

/// An opaque handle to one physical register, produced by evaluating a node.
///
/// Ownership is tracked by the `CodeGenerator`: a handle stays pinned while
/// any consumer of its node remains, and returns to the free pool when the
/// node's use count reaches zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Reg {
    kind: RegKind,
    index: u8,
}

impl Reg {
    #[must_use]
    pub const fn new(kind: RegKind, index: u8) -> Self {
        Self { kind, index }
    }

    #[must_use]
    pub fn kind(self) -> RegKind {
        self.kind
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// x86-64 names for the allocatable general-purpose file (rsp/rbp are not
/// allocatable and have no slot).
const GPR_NAMES: [&str; 14] = [
    "rax", "rcx", "rdx", "rbx", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
];

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RegKind::Gpr => match GPR_NAMES.get(self.index()) {
                Some(name) => f.write_str(name),
                None => write!(f, "gpr{}", self.index),
            },
            RegKind::Fpr => write!(f, "xmm{}", self.index),
            RegKind::Vec => write!(f, "v{}", self.index),
            RegKind::Mask => write!(f, "k{}", self.index),
        }
    }
}

pub const fn gpr(index: u8) -> Reg {
    Reg::new(RegKind::Gpr, index)
}

pub const fn fpr(index: u8) -> Reg {
    Reg::new(RegKind::Fpr, index)
}

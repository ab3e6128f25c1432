//! An interpreter for lowered units.
//!
//! Executes the modelled instruction stream against a flat memory and a
//! register file, with x86 register-write semantics: 32-bit writes zero the
//! upper half, 8/16-bit writes preserve it. Calls dispatch to host functions
//! registered against the function-table indices the symbol table hands out.
//! Used by the end-to-end tests; it is the observable meaning of a
//! [`LoweredUnit`].

use rustc_hash::FxHashMap;

use kiln_ir::{DataType, SymbolTable};

use crate::cg::LoweredUnit;
use crate::inst::{
    Addr, AluFOp, AluOp, CallTarget, ElemKind, FenceKind, Flags, Inst, Label, MaskBinOp,
    ShiftCount, ShiftOp, TrapKind, VAluOp, VCmpOp, Width,
};
use crate::reg::{Reg, RegKind};

/// How a host function's result reaches the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetKind {
    Int,
    Float,
    Void,
}

struct HostFn {
    params: Vec<DataType>,
    ret: RetKind,
    body: Box<dyn FnMut(&[u64]) -> u64>,
}

/// Why execution stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunExit {
    Return,
    Trap(TrapKind),
}

pub struct Machine {
    gpr: [u64; 16],
    fpr: [u64; 16],
    vec: [[u32; 4]; 16],
    mask: [u8; 8],
    flags: Flags,
    stack: Vec<[u64; 2]>,
    mem: Vec<u8>,
    funcs: Vec<HostFn>,
}

impl Machine {
    /// A machine with `mem_size` bytes of zeroed memory.
    #[must_use]
    pub fn new(mem_size: usize) -> Self {
        Self {
            gpr: [0; 16],
            fpr: [0; 16],
            vec: [[0; 4]; 16],
            mask: [0; 8],
            flags: Flags::default(),
            stack: Vec::new(),
            mem: vec![0; mem_size],
            funcs: Vec::new(),
        }
    }

    /// Registers a host function; the returned index is what a `Func` symbol
    /// (or a computed call target) must carry. Arguments arrive as raw bits,
    /// floats included.
    pub fn register_func(
        &mut self,
        params: Vec<DataType>,
        ret: RetKind,
        body: impl FnMut(&[u64]) -> u64 + 'static,
    ) -> u32 {
        self.funcs.push(HostFn {
            params,
            ret,
            body: Box::new(body),
        });
        (self.funcs.len() - 1) as u32
    }

    // ---- Register and memory accessors for tests ------------------------

    #[must_use]
    pub fn gpr_value(&self, r: Reg) -> u64 {
        self.gpr[r.index()]
    }

    pub fn set_gpr_value(&mut self, r: Reg, v: u64) {
        self.gpr[r.index()] = v;
    }

    #[must_use]
    pub fn fpr_f32(&self, r: Reg) -> f32 {
        f32::from_bits(self.fpr[r.index()] as u32)
    }

    #[must_use]
    pub fn fpr_f64(&self, r: Reg) -> f64 {
        f64::from_bits(self.fpr[r.index()])
    }

    #[must_use]
    pub fn vec_lanes(&self, r: Reg) -> [u32; 4] {
        self.vec[r.index()]
    }

    #[must_use]
    pub fn mask_bits(&self, r: Reg) -> u8 {
        self.mask[r.index()]
    }

    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.mem[offset..offset + 4].try_into().unwrap())
    }

    pub fn write_u32(&mut self, offset: usize, v: u32) {
        self.mem[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }

    #[must_use]
    pub fn read_u64(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.mem[offset..offset + 8].try_into().unwrap())
    }

    pub fn write_u64(&mut self, offset: usize, v: u64) {
        self.mem[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
    }

    #[must_use]
    pub fn read_f32(&self, offset: usize) -> f32 {
        f32::from_bits(self.read_u32(offset))
    }

    pub fn write_f32(&mut self, offset: usize, v: f32) {
        self.write_u32(offset, v.to_bits());
    }

    pub fn write_f64(&mut self, offset: usize, v: f64) {
        self.write_u64(offset, v.to_bits());
    }

    #[must_use]
    pub fn read_f64(&self, offset: usize) -> f64 {
        f64::from_bits(self.read_u64(offset))
    }

    pub fn write_u8(&mut self, offset: usize, v: u8) {
        self.mem[offset] = v;
    }

    pub fn write_u16(&mut self, offset: usize, v: u16) {
        self.mem[offset..offset + 2].copy_from_slice(&v.to_le_bytes());
    }

    // ---- Internal register/memory plumbing ------------------------------

    fn read(&self, r: Reg, w: Width) -> u64 {
        self.gpr[r.index()] & w.mask()
    }

    fn write(&mut self, r: Reg, v: u64, w: Width) {
        let i = r.index();
        match w {
            Width::W64 => self.gpr[i] = v,
            // 32-bit writes clear the upper half; narrower writes keep it.
            Width::W32 => self.gpr[i] = v & 0xffff_ffff,
            w => {
                let m = w.mask();
                self.gpr[i] = (self.gpr[i] & !m) | (v & m);
            }
        }
    }

    fn ea(&self, a: Addr) -> usize {
        let mut v = a.disp as i64 as u64;
        if let Some(b) = a.base {
            v = v.wrapping_add(self.gpr[b.index()]);
        }
        if let Some((r, scale)) = a.index {
            v = v.wrapping_add(self.gpr[r.index()].wrapping_mul(u64::from(scale)));
        }
        v as usize
    }

    fn load_mem(&self, addr: usize, bytes: usize) -> u64 {
        assert!(
            addr + bytes <= self.mem.len(),
            "load of {bytes} bytes at {addr:#x} is out of bounds"
        );
        let mut v = 0u64;
        for (i, &b) in self.mem[addr..addr + bytes].iter().enumerate() {
            v |= u64::from(b) << (8 * i);
        }
        v
    }

    fn store_mem(&mut self, addr: usize, bytes: usize, v: u64) {
        assert!(
            addr + bytes <= self.mem.len(),
            "store of {bytes} bytes at {addr:#x} is out of bounds"
        );
        for i in 0..bytes {
            self.mem[addr + i] = (v >> (8 * i)) as u8;
        }
    }

    fn flags_logic(&mut self, res: u64, w: Width) {
        let res = res & w.mask();
        self.flags = Flags {
            zf: res == 0,
            sf: res >> (w.bits() - 1) & 1 == 1,
            ..Flags::default()
        };
    }

    fn flags_sub(&mut self, l: u64, r: u64, w: Width) -> u64 {
        let m = w.mask();
        let (l, r) = (l & m, r & m);
        let res = l.wrapping_sub(r) & m;
        let sign = 1u64 << (w.bits() - 1);
        self.flags = Flags {
            cf: l < r,
            zf: res == 0,
            sf: res & sign != 0,
            of: (l ^ r) & (l ^ res) & sign != 0,
            pf: false,
        };
        res
    }

    fn flags_add(&mut self, l: u64, r: u64, w: Width) -> u64 {
        let m = w.mask();
        let (l, r) = (l & m, r & m);
        let res = l.wrapping_add(r) & m;
        let sign = 1u64 << (w.bits() - 1);
        self.flags = Flags {
            cf: res < l,
            zf: res == 0,
            sf: res & sign != 0,
            of: (l ^ res) & (r ^ res) & sign != 0,
            pf: false,
        };
        res
    }

    fn alu(&mut self, op: AluOp, l: u64, r: u64, w: Width) -> u64 {
        match op {
            AluOp::Add => self.flags_add(l, r, w),
            AluOp::Sub => self.flags_sub(l, r, w),
            AluOp::And => {
                let res = (l & r) & w.mask();
                self.flags_logic(res, w);
                res
            }
            AluOp::Or => {
                let res = (l | r) & w.mask();
                self.flags_logic(res, w);
                res
            }
            AluOp::Xor => {
                let res = (l ^ r) & w.mask();
                self.flags_logic(res, w);
                res
            }
            AluOp::Imul => {
                let res = l.wrapping_mul(r) & w.mask();
                self.flags_logic(res, w);
                res
            }
        }
    }

    fn ucomis(&mut self, lhs: Reg, rhs: Reg, double: bool) {
        let (unordered, eq, lt) = if double {
            let l = f64::from_bits(self.fpr[lhs.index()]);
            let r = f64::from_bits(self.fpr[rhs.index()]);
            (l.is_nan() || r.is_nan(), l == r, l < r)
        } else {
            let l = f32::from_bits(self.fpr[lhs.index()] as u32);
            let r = f32::from_bits(self.fpr[rhs.index()] as u32);
            (l.is_nan() || r.is_nan(), l == r, l < r)
        };
        self.flags = if unordered {
            Flags {
                zf: true,
                pf: true,
                cf: true,
                sf: false,
                of: false,
            }
        } else {
            Flags {
                zf: eq,
                cf: lt,
                ..Flags::default()
            }
        };
    }

    fn alu_f(&mut self, op: AluFOp, dst: Reg, src: Reg, double: bool) {
        let (d, s) = (self.fpr[dst.index()], self.fpr[src.index()]);
        let bits = match op {
            // Bitwise forms work on raw register bits.
            AluFOp::And => d & s,
            AluFOp::Xor => d ^ s,
            _ if double => {
                let (l, r) = (f64::from_bits(d), f64::from_bits(s));
                let v = match op {
                    AluFOp::Add => l + r,
                    AluFOp::Sub => l - r,
                    AluFOp::Mul => l * r,
                    AluFOp::Div => l / r,
                    // minsd/maxsd: the second operand wins on NaN or equality.
                    AluFOp::Min => {
                        if l < r {
                            l
                        } else {
                            r
                        }
                    }
                    AluFOp::Max => {
                        if l > r {
                            l
                        } else {
                            r
                        }
                    }
                    AluFOp::And | AluFOp::Xor => unreachable!(),
                };
                v.to_bits()
            }
            _ => {
                let (l, r) = (f32::from_bits(d as u32), f32::from_bits(s as u32));
                let v = match op {
                    AluFOp::Add => l + r,
                    AluFOp::Sub => l - r,
                    AluFOp::Mul => l * r,
                    AluFOp::Div => l / r,
                    AluFOp::Min => {
                        if l < r {
                            l
                        } else {
                            r
                        }
                    }
                    AluFOp::Max => {
                        if l > r {
                            l
                        } else {
                            r
                        }
                    }
                    AluFOp::And | AluFOp::Xor => unreachable!(),
                };
                u64::from(v.to_bits())
            }
        };
        self.fpr[dst.index()] = bits;
    }

    fn push_slot(&mut self, r: Reg) {
        let slot = match r.kind() {
            RegKind::Gpr => [self.gpr[r.index()], 0],
            RegKind::Fpr => [self.fpr[r.index()], 0],
            RegKind::Vec => {
                let v = self.vec[r.index()];
                [
                    u64::from(v[0]) | u64::from(v[1]) << 32,
                    u64::from(v[2]) | u64::from(v[3]) << 32,
                ]
            }
            RegKind::Mask => [u64::from(self.mask[r.index()]), 0],
        };
        self.stack.push(slot);
    }

    fn pop_slot(&mut self, r: Reg) {
        let slot = self.stack.pop().expect("pop from an empty machine stack");
        match r.kind() {
            RegKind::Gpr => self.gpr[r.index()] = slot[0],
            RegKind::Fpr => self.fpr[r.index()] = slot[0],
            RegKind::Vec => {
                self.vec[r.index()] = [
                    slot[0] as u32,
                    (slot[0] >> 32) as u32,
                    slot[1] as u32,
                    (slot[1] >> 32) as u32,
                ];
            }
            RegKind::Mask => self.mask[r.index()] = slot[0] as u8,
        }
    }

    fn call_host(&mut self, index: usize, unit: &LoweredUnit) {
        let linkage = unit.target.linkage();
        let (args, ret) = {
            let func = &self.funcs[index];
            let mut ints = 0;
            let mut floats = 0;
            let mut args = Vec::with_capacity(func.params.len());
            for &p in &func.params {
                match p {
                    DataType::Float | DataType::Double => {
                        args.push(self.fpr[linkage.float_args[floats].index()]);
                        floats += 1;
                    }
                    DataType::Void | DataType::VectorInt32 | DataType::VectorFloat
                    | DataType::Mask => {
                        panic!("host function parameter type {p} is not supported")
                    }
                    _ => {
                        args.push(self.gpr[linkage.int_args[ints].index()]);
                        ints += 1;
                    }
                }
            }
            (args, func.ret)
        };
        let result = (self.funcs[index].body)(&args);
        match ret {
            RetKind::Int => self.gpr[linkage.int_ret.index()] = result,
            RetKind::Float => self.fpr[linkage.float_ret.index()] = result,
            RetKind::Void => {}
        }
    }

    fn vec_lane_op(op: VAluOp, l: u32, r: u32) -> u32 {
        match op {
            VAluOp::AddI => l.wrapping_add(r),
            VAluOp::SubI => l.wrapping_sub(r),
            VAluOp::MulI => l.wrapping_mul(r),
            VAluOp::AndV => l & r,
            VAluOp::OrV => l | r,
            VAluOp::XorV => l ^ r,
            VAluOp::AddF => (f32::from_bits(l) + f32::from_bits(r)).to_bits(),
            VAluOp::SubF => (f32::from_bits(l) - f32::from_bits(r)).to_bits(),
            VAluOp::MulF => (f32::from_bits(l) * f32::from_bits(r)).to_bits(),
            VAluOp::DivF => (f32::from_bits(l) / f32::from_bits(r)).to_bits(),
        }
    }

    /// Runs a unit from its first instruction until `ret`, a trap, or the
    /// end of the stream. `symbols` resolves direct call targets.
    pub fn run(&mut self, unit: &LoweredUnit, symbols: &SymbolTable) -> RunExit {
        let mut labels: FxHashMap<Label, usize> = FxHashMap::default();
        for (i, inst) in unit.insts.iter().enumerate() {
            if let Inst::Label(l) = inst {
                labels.insert(*l, i);
            }
        }
        let at = |l: Label| *labels.get(&l).unwrap_or_else(|| panic!("unbound label {l:?}"));

        let mut pc = 0usize;
        while pc < unit.insts.len() {
            match &unit.insts[pc] {
                Inst::Label(_) => {}

                Inst::MovImm { dst, imm, width } => self.write(*dst, *imm as u64, *width),
                Inst::Mov { dst, src, width } => self.write(*dst, self.gpr[src.index()], *width),
                Inst::MovSx { dst, src, from } => {
                    let v = sext(self.gpr[src.index()], *from) as u64;
                    self.write(*dst, v, Width::W64);
                }
                Inst::MovZx { dst, src, from } => {
                    let v = self.gpr[src.index()] & from.mask();
                    self.write(*dst, v, Width::W64);
                }
                Inst::Lea { dst, addr } => {
                    let v = self.ea(*addr) as u64;
                    self.write(*dst, v, Width::W64);
                }
                Inst::Load {
                    dst,
                    addr,
                    width,
                    ext,
                } => {
                    let raw = self.load_mem(self.ea(*addr), width.bits() as usize / 8);
                    let v = match ext {
                        crate::inst::Ext::Zero => raw,
                        crate::inst::Ext::Sign => sext(raw, *width) as u64,
                    };
                    self.write(*dst, v, Width::W64);
                }
                Inst::Store { src, addr, width } => {
                    let v = self.gpr[src.index()];
                    self.store_mem(self.ea(*addr), width.bits() as usize / 8, v);
                }

                Inst::Alu {
                    op,
                    dst,
                    src,
                    width,
                } => {
                    let res = self.alu(*op, self.gpr[dst.index()], self.gpr[src.index()], *width);
                    self.write(*dst, res, *width);
                }
                Inst::AluImm {
                    op,
                    dst,
                    imm,
                    width,
                } => {
                    let res = self.alu(*op, self.gpr[dst.index()], *imm as u64, *width);
                    self.write(*dst, res, *width);
                }
                Inst::Neg { dst, width } => {
                    let res = self.flags_sub(0, self.gpr[dst.index()], *width);
                    self.write(*dst, res, *width);
                }
                Inst::Shift {
                    op,
                    dst,
                    count,
                    width,
                } => {
                    let bits = width.bits();
                    let c = match count {
                        ShiftCount::Imm(c) => u32::from(*c),
                        ShiftCount::Reg(r) => self.gpr[r.index()] as u32,
                    } & (bits - 1);
                    let v = self.read(*dst, *width);
                    let res = match op {
                        ShiftOp::Shl => v.wrapping_shl(c),
                        ShiftOp::Shr => v.wrapping_shr(c),
                        ShiftOp::Sar => (sext(v, *width) >> c) as u64,
                        ShiftOp::Rol => {
                            if c == 0 {
                                v
                            } else {
                                (v << c | v >> (bits - c)) & width.mask()
                            }
                        }
                    } & width.mask();
                    self.flags_logic(res, *width);
                    self.write(*dst, res, *width);
                }
                Inst::Div {
                    dst,
                    lhs,
                    rhs,
                    width,
                    signed,
                    rem,
                } => {
                    let r = self.read(*rhs, *width);
                    if r == 0 {
                        return RunExit::Trap(TrapKind::DivByZero);
                    }
                    let l = self.read(*lhs, *width);
                    let res = if *signed {
                        match width {
                            Width::W32 => {
                                let (l, r) = (l as u32 as i32, r as u32 as i32);
                                let v = if *rem {
                                    l.wrapping_rem(r)
                                } else {
                                    l.wrapping_div(r)
                                };
                                v as u32 as u64
                            }
                            _ => {
                                let (l, r) = (l as i64, r as i64);
                                let v = if *rem {
                                    l.wrapping_rem(r)
                                } else {
                                    l.wrapping_div(r)
                                };
                                v as u64
                            }
                        }
                    } else if *rem {
                        l % r
                    } else {
                        l / r
                    };
                    self.write(*dst, res, *width);
                }

                Inst::Cmp { lhs, rhs, width } => {
                    let _ = self.flags_sub(self.gpr[lhs.index()], self.gpr[rhs.index()], *width);
                }
                Inst::CmpImm { lhs, imm, width } => {
                    let _ = self.flags_sub(self.gpr[lhs.index()], *imm as u64, *width);
                }
                Inst::Test { lhs, rhs, width } => {
                    let res = self.read(*lhs, *width) & self.read(*rhs, *width);
                    self.flags_logic(res, *width);
                }
                Inst::Setcc { dst, cond } => {
                    let v = u64::from(self.flags.eval(*cond));
                    self.write(*dst, v, Width::W64);
                }
                Inst::Cmov {
                    dst,
                    src,
                    cond,
                    width,
                } => {
                    // cmov rewrites the destination either way (a 32-bit
                    // form zero-extends even when the move is not taken).
                    let v = if self.flags.eval(*cond) {
                        self.gpr[src.index()]
                    } else {
                        self.gpr[dst.index()]
                    };
                    self.write(*dst, v, *width);
                }
                Inst::Jcc { cond, target } => {
                    if self.flags.eval(*cond) {
                        pc = at(*target);
                    }
                }
                Inst::Jmp { target } => pc = at(*target),
                Inst::JmpTable { index, targets } => {
                    let i = self.read(*index, Width::W32) as usize;
                    assert!(i < targets.len(), "jump table index {i} out of range");
                    pc = at(targets[i]);
                }
                Inst::Call { target } => {
                    let index = match target {
                        CallTarget::Sym(sym) => symbols.func_index(*sym) as usize,
                        CallTarget::Reg(r) => self.gpr[r.index()] as usize,
                    };
                    self.call_host(index, unit);
                }
                Inst::Ret => return RunExit::Return,
                Inst::Push { src } => self.push_slot(*src),
                Inst::Pop { dst } => self.pop_slot(*dst),

                Inst::Bsf { dst, src, width } => {
                    let v = self.read(*src, *width);
                    self.flags = Flags {
                        zf: v == 0,
                        ..Flags::default()
                    };
                    if v != 0 {
                        self.write(*dst, u64::from(v.trailing_zeros()), *width);
                    }
                }
                Inst::Bsr { dst, src, width } => {
                    let v = self.read(*src, *width);
                    self.flags = Flags {
                        zf: v == 0,
                        ..Flags::default()
                    };
                    if v != 0 {
                        self.write(*dst, u64::from(63 - v.leading_zeros()), *width);
                    }
                }
                Inst::Lzcnt { dst, src, width } => {
                    let v = self.read(*src, *width);
                    let res = if v == 0 {
                        u64::from(width.bits())
                    } else {
                        u64::from(width.bits() - 1 - (63 - v.leading_zeros()))
                    };
                    self.flags = Flags {
                        zf: res == 0,
                        cf: v == 0,
                        ..Flags::default()
                    };
                    self.write(*dst, res, *width);
                }
                Inst::Tzcnt { dst, src, width } => {
                    let v = self.read(*src, *width);
                    let res = if v == 0 {
                        u64::from(width.bits())
                    } else {
                        u64::from(v.trailing_zeros())
                    };
                    self.flags = Flags {
                        zf: res == 0,
                        cf: v == 0,
                        ..Flags::default()
                    };
                    self.write(*dst, res, *width);
                }
                Inst::Popcnt { dst, src, width } => {
                    let v = self.read(*src, *width);
                    self.write(*dst, u64::from(v.count_ones()), *width);
                }
                Inst::Bswap { dst, width } => {
                    let v = self.read(*dst, *width);
                    let res = match width {
                        Width::W32 => u64::from((v as u32).swap_bytes()),
                        _ => v.swap_bytes(),
                    };
                    self.write(*dst, res, *width);
                }
                Inst::Pext {
                    dst,
                    src,
                    mask,
                    width,
                } => {
                    let v = self.read(*src, *width);
                    let m = self.read(*mask, *width);
                    let mut res = 0u64;
                    let mut out = 0;
                    for bit in 0..width.bits() {
                        if m >> bit & 1 == 1 {
                            res |= (v >> bit & 1) << out;
                            out += 1;
                        }
                    }
                    self.write(*dst, res, *width);
                }
                Inst::Pdep {
                    dst,
                    src,
                    mask,
                    width,
                } => {
                    let v = self.read(*src, *width);
                    let m = self.read(*mask, *width);
                    let mut res = 0u64;
                    let mut taken = 0;
                    for bit in 0..width.bits() {
                        if m >> bit & 1 == 1 {
                            res |= (v >> taken & 1) << bit;
                            taken += 1;
                        }
                    }
                    self.write(*dst, res, *width);
                }

                Inst::MovF { dst, src } => self.fpr[dst.index()] = self.fpr[src.index()],
                Inst::MovFImmBits { dst, bits } => self.fpr[dst.index()] = *bits,
                Inst::LoadF { dst, addr, double } => {
                    let bytes = if *double { 8 } else { 4 };
                    self.fpr[dst.index()] = self.load_mem(self.ea(*addr), bytes);
                }
                Inst::StoreF { src, addr, double } => {
                    let bytes = if *double { 8 } else { 4 };
                    let v = self.fpr[src.index()];
                    self.store_mem(self.ea(*addr), bytes, v);
                }
                Inst::AluF {
                    op,
                    dst,
                    src,
                    double,
                } => self.alu_f(*op, *dst, *src, *double),
                Inst::SqrtF { dst, src, double } => {
                    self.fpr[dst.index()] = if *double {
                        f64::from_bits(self.fpr[src.index()]).sqrt().to_bits()
                    } else {
                        u64::from(f32::from_bits(self.fpr[src.index()] as u32).sqrt().to_bits())
                    };
                }
                Inst::Ucomis { lhs, rhs, double } => self.ucomis(*lhs, *rhs, *double),
                Inst::CvtI2F {
                    dst,
                    src,
                    src64,
                    double,
                } => {
                    let v = if *src64 {
                        self.gpr[src.index()] as i64
                    } else {
                        self.gpr[src.index()] as u32 as i32 as i64
                    };
                    self.fpr[dst.index()] = if *double {
                        (v as f64).to_bits()
                    } else {
                        u64::from((v as f32).to_bits())
                    };
                }
                Inst::CvtF2I {
                    dst,
                    src,
                    dst64,
                    double,
                } => {
                    let f = if *double {
                        f64::from_bits(self.fpr[src.index()])
                    } else {
                        f64::from(f32::from_bits(self.fpr[src.index()] as u32))
                    };
                    let v = cvt_trunc(f, *dst64);
                    if *dst64 {
                        self.write(*dst, v as u64, Width::W64);
                    } else {
                        self.write(*dst, v as u32 as u64, Width::W32);
                    }
                }
                Inst::CvtF2F { dst, src, to_double } => {
                    self.fpr[dst.index()] = if *to_double {
                        f64::from(f32::from_bits(self.fpr[src.index()] as u32)).to_bits()
                    } else {
                        u64::from((f64::from_bits(self.fpr[src.index()]) as f32).to_bits())
                    };
                }
                Inst::MovGprToFpr { dst, src, w64 } => {
                    let v = self.gpr[src.index()];
                    self.fpr[dst.index()] = if *w64 { v } else { v & 0xffff_ffff };
                }
                Inst::MovFprToGpr { dst, src, w64 } => {
                    let v = self.fpr[src.index()];
                    if *w64 {
                        self.write(*dst, v, Width::W64);
                    } else {
                        self.write(*dst, v, Width::W32);
                    }
                }

                Inst::VMov { dst, src } => self.vec[dst.index()] = self.vec[src.index()],
                Inst::VSplat { dst, src, elem } => {
                    let lane = match elem {
                        ElemKind::I32 => self.gpr[src.index()] as u32,
                        ElemKind::F32 => self.fpr[src.index()] as u32,
                    };
                    self.vec[dst.index()] = [lane; 4];
                }
                Inst::VLoad { dst, addr } => {
                    let base = self.ea(*addr);
                    let mut lanes = [0u32; 4];
                    for (i, lane) in lanes.iter_mut().enumerate() {
                        *lane = self.load_mem(base + 4 * i, 4) as u32;
                    }
                    self.vec[dst.index()] = lanes;
                }
                Inst::VStore { src, addr } => {
                    let base = self.ea(*addr);
                    let lanes = self.vec[src.index()];
                    for (i, lane) in lanes.iter().enumerate() {
                        self.store_mem(base + 4 * i, 4, u64::from(*lane));
                    }
                }
                Inst::VAlu { op, dst, src } => {
                    let (d, s) = (self.vec[dst.index()], self.vec[src.index()]);
                    let mut res = [0u32; 4];
                    for i in 0..4 {
                        res[i] = Self::vec_lane_op(*op, d[i], s[i]);
                    }
                    self.vec[dst.index()] = res;
                }
                Inst::VAluMasked { op, dst, src, mask } => {
                    let (d, s) = (self.vec[dst.index()], self.vec[src.index()]);
                    let m = self.mask[mask.index()];
                    let mut res = d;
                    for i in 0..4 {
                        if m >> i & 1 == 1 {
                            res[i] = Self::vec_lane_op(*op, d[i], s[i]);
                        }
                    }
                    self.vec[dst.index()] = res;
                }
                Inst::VCmp { op, dst, lhs, rhs } => {
                    let (l, r) = (self.vec[lhs.index()], self.vec[rhs.index()]);
                    let mut m = 0u8;
                    for i in 0..4 {
                        let hit = match op {
                            VCmpOp::EqI => l[i] == r[i],
                            VCmpOp::GtI => (l[i] as i32) > (r[i] as i32),
                            VCmpOp::LtI => (l[i] as i32) < (r[i] as i32),
                            VCmpOp::EqF => f32::from_bits(l[i]) == f32::from_bits(r[i]),
                            VCmpOp::LtF => f32::from_bits(l[i]) < f32::from_bits(r[i]),
                        };
                        if hit {
                            m |= 1 << i;
                        }
                    }
                    self.mask[dst.index()] = m;
                }
                Inst::VBlend { dst, src, mask } => {
                    let m = self.mask[mask.index()];
                    let s = self.vec[src.index()];
                    for i in 0..4 {
                        if m >> i & 1 == 1 {
                            self.vec[dst.index()][i] = s[i];
                        }
                    }
                }
                Inst::VPermute { dst, src, lanes } => {
                    let s = self.vec[src.index()];
                    let mut res = [0u32; 4];
                    for i in 0..4 {
                        res[i] = s[(lanes[i] & 3) as usize];
                    }
                    self.vec[dst.index()] = res;
                }
                Inst::VExtract {
                    dst,
                    src,
                    lane,
                    elem,
                } => {
                    let v = self.vec[src.index()][(*lane & 3) as usize];
                    match elem {
                        ElemKind::I32 => self.write(*dst, u64::from(v), Width::W32),
                        ElemKind::F32 => self.fpr[dst.index()] = u64::from(v),
                    }
                }
                Inst::VInsert {
                    dst,
                    src,
                    lane,
                    elem,
                } => {
                    let v = match elem {
                        ElemKind::I32 => self.gpr[src.index()] as u32,
                        ElemKind::F32 => self.fpr[src.index()] as u32,
                    };
                    self.vec[dst.index()][(*lane & 3) as usize] = v;
                }
                Inst::MaskMov { dst, src } => self.mask[dst.index()] = self.mask[src.index()],
                Inst::MaskBin { op, dst, src } => {
                    let (d, s) = (self.mask[dst.index()], self.mask[src.index()]);
                    self.mask[dst.index()] = match op {
                        MaskBinOp::And => d & s,
                        MaskBinOp::Or => d | s,
                        MaskBinOp::Xor => d ^ s,
                    };
                }
                Inst::MaskNot { dst, src } => {
                    self.mask[dst.index()] = !self.mask[src.index()] & 0xf;
                }
                Inst::MaskTest { src } => {
                    let m = self.mask[src.index()];
                    self.flags = Flags {
                        zf: m == 0,
                        cf: m == 0xf,
                        ..Flags::default()
                    };
                }

                Inst::Fence { kind } => {
                    use std::sync::atomic::{fence, Ordering};
                    match kind {
                        FenceKind::Full => fence(Ordering::SeqCst),
                        FenceKind::Load => fence(Ordering::Acquire),
                        FenceKind::Store => fence(Ordering::Release),
                    }
                }
                Inst::Trap { kind } => return RunExit::Trap(*kind),
            }
            pc += 1;
        }
        RunExit::Return
    }
}

fn sext(v: u64, w: Width) -> i64 {
    match w {
        Width::W8 => v as u8 as i8 as i64,
        Width::W16 => v as u16 as i16 as i64,
        Width::W32 => v as u32 as i32 as i64,
        Width::W64 => v as i64,
    }
}

/// Truncating float-to-int with the x86 out-of-range result: the integer
/// indefinite value (`INT_MIN` of the destination width).
fn cvt_trunc(f: f64, dst64: bool) -> i64 {
    if dst64 {
        if f.is_nan() || f >= 9_223_372_036_854_775_808.0 || f < -9_223_372_036_854_775_808.0 {
            i64::MIN
        } else {
            f.trunc() as i64
        }
    } else if f.is_nan() || f >= 2_147_483_648.0 || f < -2_147_483_648.0 {
        i64::from(i32::MIN)
    } else {
        i64::from(f.trunc() as i32)
    }
}

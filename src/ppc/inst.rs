//! Guest instruction word field access.
//!
//! PowerPC numbers bits from the most-significant end; the accessors below
//! already account for that and return fields ready to use.

use std::fmt;

/// One 32-bit PowerPC instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inst(pub u32);

impl Inst {
    pub const fn hex(self) -> u32 {
        self.0
    }

    /// Primary opcode.
    pub const fn opcd(self) -> u32 {
        self.0 >> 26
    }

    /// Destination register (same field as [`Self::rs`] and [`Self::to`]).
    pub const fn rd(self) -> usize {
        ((self.0 >> 21) & 31) as usize
    }

    pub const fn rs(self) -> usize {
        self.rd()
    }

    pub const fn ra(self) -> usize {
        ((self.0 >> 16) & 31) as usize
    }

    pub const fn rb(self) -> usize {
        ((self.0 >> 11) & 31) as usize
    }

    /// Secondary opcode for primary opcodes 19 and 31 (includes the OE bit).
    pub const fn subop10(self) -> u32 {
        (self.0 >> 1) & 0x3ff
    }

    /// Overflow-recording bit.
    pub const fn oe(self) -> bool {
        (self.0 >> 10) & 1 != 0
    }

    /// Flag-recording bit.
    pub const fn rc(self) -> bool {
        self.0 & 1 != 0
    }

    pub const fn simm_16(self) -> i16 {
        self.0 as u16 as i16
    }

    pub const fn uimm(self) -> u32 {
        self.0 & 0xffff
    }

    pub const fn crfd(self) -> usize {
        ((self.0 >> 23) & 7) as usize
    }

    pub const fn crfs(self) -> usize {
        ((self.0 >> 18) & 7) as usize
    }

    /// Trap condition mask.
    pub const fn to(self) -> u32 {
        (self.0 >> 21) & 31
    }

    /// Segment register number.
    pub const fn sr(self) -> usize {
        ((self.0 >> 16) & 15) as usize
    }
}

impl fmt::Debug for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Inst({:#010x})", self.0)
    }
}

/// Builders for instruction words, used by tests and the command line tool.
pub mod encode {
    const fn d_form(opcd: u32, d: usize, a: usize, imm: u32) -> u32 {
        (opcd << 26) | ((d as u32) << 21) | ((a as u32) << 16) | (imm & 0xffff)
    }

    const fn x_form(opcd: u32, s: usize, a: usize, b: usize, subop: u32, rc: bool) -> u32 {
        (opcd << 26)
            | ((s as u32) << 21)
            | ((a as u32) << 16)
            | ((b as u32) << 11)
            | (subop << 1)
            | rc as u32
    }

    pub const fn addi(d: usize, a: usize, simm: i16) -> u32 {
        d_form(14, d, a, simm as u16 as u32)
    }

    pub const fn addis(d: usize, a: usize, simm: i16) -> u32 {
        d_form(15, d, a, simm as u16 as u32)
    }

    pub const fn ori(a: usize, s: usize, uimm: u16) -> u32 {
        d_form(24, s, a, uimm as u32)
    }

    pub const fn oris(a: usize, s: usize, uimm: u16) -> u32 {
        d_form(25, s, a, uimm as u32)
    }

    pub const fn xori(a: usize, s: usize, uimm: u16) -> u32 {
        d_form(26, s, a, uimm as u32)
    }

    pub const fn xoris(a: usize, s: usize, uimm: u16) -> u32 {
        d_form(27, s, a, uimm as u32)
    }

    pub const fn andi_rc(a: usize, s: usize, uimm: u16) -> u32 {
        d_form(28, s, a, uimm as u32)
    }

    pub const fn andis_rc(a: usize, s: usize, uimm: u16) -> u32 {
        d_form(29, s, a, uimm as u32)
    }

    /// Two-register logical operation; `subop` is one of the `SUBOP_*` values.
    pub const fn logical(subop: u32, a: usize, s: usize, b: usize, rc: bool) -> u32 {
        x_form(31, s, a, b, subop, rc)
    }

    pub const SUBOP_AND: u32 = 28;
    pub const SUBOP_ANDC: u32 = 60;
    pub const SUBOP_OR: u32 = 444;
    pub const SUBOP_ORC: u32 = 412;
    pub const SUBOP_XOR: u32 = 316;
    pub const SUBOP_EQV: u32 = 284;
    pub const SUBOP_NAND: u32 = 476;
    pub const SUBOP_NOR: u32 = 124;

    pub const fn extsb(a: usize, s: usize, rc: bool) -> u32 {
        x_form(31, s, a, 0, 954, rc)
    }

    pub const fn extsh(a: usize, s: usize, rc: bool) -> u32 {
        x_form(31, s, a, 0, 922, rc)
    }

    pub const fn cntlzw(a: usize, s: usize, rc: bool) -> u32 {
        x_form(31, s, a, 0, 26, rc)
    }

    pub const fn neg(d: usize, a: usize, oe: bool, rc: bool) -> u32 {
        x_form(31, d, a, 0, 104 | ((oe as u32) << 9), rc)
    }

    pub const fn cmp(crf: usize, a: usize, b: usize) -> u32 {
        x_form(31, crf << 2, a, b, 0, false)
    }

    pub const fn cmpl(crf: usize, a: usize, b: usize) -> u32 {
        x_form(31, crf << 2, a, b, 32, false)
    }

    pub const fn cmpi(crf: usize, a: usize, simm: i16) -> u32 {
        d_form(11, crf << 2, a, simm as u16 as u32)
    }

    pub const fn cmpli(crf: usize, a: usize, uimm: u16) -> u32 {
        d_form(10, crf << 2, a, uimm as u32)
    }

    pub const fn tw(to: u32, a: usize, b: usize) -> u32 {
        x_form(31, to as usize, a, b, 4, false)
    }

    pub const fn twi(to: u32, a: usize, simm: i16) -> u32 {
        d_form(3, to as usize, a, simm as u16 as u32)
    }

    pub const fn mtmsr(s: usize) -> u32 {
        x_form(31, s, 0, 0, 146, false)
    }

    pub const fn mfmsr(d: usize) -> u32 {
        x_form(31, d, 0, 0, 83, false)
    }

    pub const fn mcrf(crfd: usize, crfs: usize) -> u32 {
        x_form(19, crfd << 2, crfs << 2, 0, 0, false)
    }

    pub const fn mfsr(d: usize, sr: usize) -> u32 {
        x_form(31, d, sr & 15, 0, 595, false)
    }

    pub const fn mtsr(sr: usize, s: usize) -> u32 {
        x_form(31, s, sr & 15, 0, 210, false)
    }

    pub const fn mfsrin(d: usize, b: usize) -> u32 {
        x_form(31, d, 0, b, 659, false)
    }

    pub const fn mtsrin(s: usize, b: usize) -> u32 {
        x_form(31, s, 0, b, 242, false)
    }

    /// Unconditional relative branch.
    pub const fn b(offset: i32) -> u32 {
        (18 << 26) | (offset as u32 & 0x03ff_fffc)
    }

    pub const NOP: u32 = 0x6000_0000;
}

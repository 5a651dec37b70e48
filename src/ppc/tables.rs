//! Opcode dispatch tables.
//!
//! Maps an instruction word to the handler the translator runs for it, the
//! family it belongs to (for the per-family disable switches) and whether it
//! ends a block.

use super::inst::Inst;

/// Handlers the translator knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Addi,
    Addis,
    Ori,
    Oris,
    Xori,
    Xoris,
    Andi,
    Andis,
    /// The eight two-register logical operations.
    Bool,
    Extsb,
    Extsh,
    Cntlzw,
    Neg,
    Cmp,
    Cmpl,
    Cmpi,
    Cmpli,
    Tw,
    Twi,
    Mtmsr,
    Mfmsr,
    Mcrf,
    Mfsr,
    Mtsr,
    Mfsrin,
    Mtsrin,
    /// Known to the table but always handed to the interpreter.
    Interpret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Integer,
    SystemRegisters,
    Branch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    pub name: &'static str,
    pub op: Op,
    pub family: Family,
    pub ends_block: bool,
    /// Translated even when the family is switched off.
    pub force_jit: bool,
}

const fn int(name: &'static str, op: Op) -> OpInfo {
    OpInfo { name, op, family: Family::Integer, ends_block: false, force_jit: false }
}

const fn sys(name: &'static str, op: Op) -> OpInfo {
    OpInfo { name, op, family: Family::SystemRegisters, ends_block: false, force_jit: false }
}

const fn branch(name: &'static str) -> OpInfo {
    OpInfo { name, op: Op::Interpret, family: Family::Branch, ends_block: true, force_jit: false }
}

const MTMSR: OpInfo = OpInfo {
    name: "mtmsr",
    op: Op::Mtmsr,
    family: Family::SystemRegisters,
    ends_block: true,
    force_jit: true,
};

/// Look up an instruction word.
pub fn decode(inst: Inst) -> Option<OpInfo> {
    let info = match inst.opcd() {
        3 => int("twi", Op::Twi),
        10 => int("cmpli", Op::Cmpli),
        11 => int("cmpi", Op::Cmpi),
        14 => int("addi", Op::Addi),
        15 => int("addis", Op::Addis),
        16 => branch("bc"),
        17 => branch("sc"),
        18 => branch("b"),
        19 => return decode_19(inst),
        24 => int("ori", Op::Ori),
        25 => int("oris", Op::Oris),
        26 => int("xori", Op::Xori),
        27 => int("xoris", Op::Xoris),
        28 => int("andi.", Op::Andi),
        29 => int("andis.", Op::Andis),
        31 => return decode_31(inst),
        _ => return None,
    };
    Some(info)
}

fn decode_19(inst: Inst) -> Option<OpInfo> {
    let info = match inst.subop10() {
        0 => sys("mcrf", Op::Mcrf),
        16 => branch("bclr"),
        50 => branch("rfi"),
        528 => branch("bcctr"),
        _ => return None,
    };
    Some(info)
}

fn decode_31(inst: Inst) -> Option<OpInfo> {
    let info = match inst.subop10() {
        0 => int("cmp", Op::Cmp),
        4 => int("tw", Op::Tw),
        26 => int("cntlzw", Op::Cntlzw),
        28 => int("and", Op::Bool),
        32 => int("cmpl", Op::Cmpl),
        60 => int("andc", Op::Bool),
        83 => sys("mfmsr", Op::Mfmsr),
        104 => int("neg", Op::Neg),
        616 => int("nego", Op::Neg),
        124 => int("nor", Op::Bool),
        146 => MTMSR,
        210 => sys("mtsr", Op::Mtsr),
        242 => sys("mtsrin", Op::Mtsrin),
        284 => int("eqv", Op::Bool),
        316 => int("xor", Op::Bool),
        412 => int("orc", Op::Bool),
        444 => int("or", Op::Bool),
        476 => int("nand", Op::Bool),
        595 => sys("mfsr", Op::Mfsr),
        659 => sys("mfsrin", Op::Mfsrin),
        922 => int("extsh", Op::Extsh),
        954 => int("extsb", Op::Extsb),
        _ => return None,
    };
    Some(info)
}

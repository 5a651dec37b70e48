//! Integer instruction handlers.
//!
//! Every handler has the same three-way shape: fold when the sources are
//! known constants, take an algebraic shortcut when one applies, otherwise
//! bind the operands and emit the general sequence. `Rc` forms record into
//! condition field 0.

use std::cmp::Ordering;

use crate::core::error::{JitError, JitResult};
use crate::core::register_file::HostReg;
use crate::ppc::inst::{encode, Inst};
use crate::ppc::state::{EXCEPTIONS_OFFSET, EXCEPTION_PROGRAM};
use crate::ppc::tables::{Op, OpInfo};

use super::cr::compare_result;
use super::emitter::{AluOp, Fixup, HostEmitter, JumpCondition};
use super::exit::ExitTarget;
use super::fallback::DeclineReason;
use super::translator::{Flow, Translator};

/// Trap mask bits with the host condition each one tests.
const TRAP_CONDITIONS: [(u32, JumpCondition); 5] = [
    (0x10, JumpCondition::Less),
    (0x08, JumpCondition::Greater),
    (0x04, JumpCondition::Equal),
    (0x02, JumpCondition::Below),
    (0x01, JumpCondition::Above),
];

/// Largest immediate the compare forms use without a scratch constant.
const SMALL_IMM_LIMIT: i32 = 4096;

/// ALU operation and trailing complement for a two-register logical subop.
fn bool_op(subop: u32) -> Option<(AluOp, bool)> {
    Some(match subop {
        encode::SUBOP_AND => (AluOp::And, false),
        encode::SUBOP_NAND => (AluOp::And, true),
        encode::SUBOP_ANDC => (AluOp::AndNot, false),
        encode::SUBOP_OR => (AluOp::Or, false),
        encode::SUBOP_NOR => (AluOp::Or, true),
        encode::SUBOP_ORC => (AluOp::OrNot, false),
        encode::SUBOP_XOR => (AluOp::Xor, false),
        encode::SUBOP_EQV => (AluOp::XorNot, false),
        _ => return None,
    })
}

/// Whether a trap with mask `to` fires for operands `a` and `b`.
pub fn trap_condition(to: u32, a: u32, b: u32) -> bool {
    let (sa, sb) = (a as i32, b as i32);
    (to & 0x10 != 0 && sa < sb)
        || (to & 0x08 != 0 && sa > sb)
        || (to & 0x04 != 0 && a == b)
        || (to & 0x02 != 0 && a < b)
        || (to & 0x01 != 0 && a > b)
}

/// Masks that cover every ordering of the operands.
pub fn always_traps(to: u32) -> bool {
    to & 0x1c == 0x1c || to & 0x07 == 0x07
}

fn is_small_imm(imm: i32) -> bool {
    (0..SMALL_IMM_LIMIT).contains(&imm)
}

impl<E: HostEmitter> Translator<E> {
    pub(super) fn arith_imm(&mut self, info: OpInfo, inst: Inst) -> JitResult<Flow> {
        let (d, a, s) = (inst.rd(), inst.ra(), inst.rs());
        let simm = inst.simm_16() as i32 as u32;
        let uimm = inst.uimm();

        match info.op {
            Op::Addi => self.reg_imm(info, inst, d, a, false, simm, AluOp::Add, false),
            Op::Addis => self.reg_imm(info, inst, d, a, false, simm << 16, AluOp::Add, false),
            Op::Ori if a == 0 && s == 0 && uimm == 0 => Ok(Flow::Continue),
            Op::Ori => self.reg_imm(info, inst, a, s, true, uimm, AluOp::Or, false),
            Op::Oris => self.reg_imm(info, inst, a, s, true, uimm << 16, AluOp::Or, false),
            Op::Xori => self.reg_imm(info, inst, a, s, true, uimm, AluOp::Xor, false),
            Op::Xoris => self.reg_imm(info, inst, a, s, true, uimm << 16, AluOp::Xor, false),
            Op::Andi => self.reg_imm(info, inst, a, s, true, uimm, AluOp::And, true),
            Op::Andis => self.reg_imm(info, inst, a, s, true, uimm << 16, AluOp::And, true),
            _ => Err(JitError::ImpossibleEncoding { name: info.name, inst: inst.hex() }),
        }
    }

    /// `d = op(a, value)`. For the add forms `a == 0` means the literal zero.
    #[allow(clippy::too_many_arguments)]
    fn reg_imm(
        &mut self,
        info: OpInfo,
        inst: Inst,
        d: usize,
        a: usize,
        binary: bool,
        value: u32,
        op: AluOp,
        rc: bool,
    ) -> JitResult<Flow> {
        if a != 0 || binary {
            if let Some(known) = self.gpr.imm(a) {
                let result = op.eval32(known, value);
                self.gpr.set_imm(d, result)?;
                if rc {
                    self.compute_rc_imm(result, 0)?;
                }
            } else {
                let ra = self.gpr.reg(&mut self.emit, a)?;
                let rd = self.gpr.bind(&mut self.emit, d, d == a)?;
                self.emit.alu32_imm(op, rd, ra, value)?;
                if rc {
                    self.compute_rc(rd, 0)?;
                }
            }
        } else if op == AluOp::Add {
            self.gpr.set_imm(d, value)?;
            if rc {
                self.compute_rc_imm(value, 0)?;
            }
        } else {
            return Err(JitError::ImpossibleEncoding { name: info.name, inst: inst.hex() });
        }
        Ok(Flow::Continue)
    }

    pub(super) fn bool_x(&mut self, info: OpInfo, inst: Inst) -> JitResult<Flow> {
        let (a, s, b) = (inst.ra(), inst.rs(), inst.rb());
        let subop = inst.subop10();
        let (op, invert) = bool_op(subop)
            .ok_or(JitError::ImpossibleEncoding { name: info.name, inst: inst.hex() })?;

        if let (Some(x), Some(y)) = (self.gpr.imm(s), self.gpr.imm(b)) {
            let mut result = op.eval32(x, y);
            if invert {
                result = !result;
            }
            self.set_imm_rc(a, result, inst.rc())?;
        } else if s == b {
            match subop {
                encode::SUBOP_AND | encode::SUBOP_OR => {
                    if a != s {
                        let rs = self.gpr.reg(&mut self.emit, s)?;
                        let ra = self.gpr.bind(&mut self.emit, a, false)?;
                        self.emit.mov32(ra, rs)?;
                    }
                    if inst.rc() {
                        let ra = self.gpr.reg(&mut self.emit, a)?;
                        self.compute_rc(ra, 0)?;
                    }
                }
                encode::SUBOP_NAND | encode::SUBOP_NOR => {
                    let rs = self.gpr.reg(&mut self.emit, s)?;
                    let ra = self.gpr.bind(&mut self.emit, a, a == s)?;
                    self.emit.not32(ra, rs)?;
                    if inst.rc() {
                        self.compute_rc(ra, 0)?;
                    }
                }
                encode::SUBOP_ORC | encode::SUBOP_EQV => self.set_imm_rc(a, u32::MAX, inst.rc())?,
                _ => self.set_imm_rc(a, 0, inst.rc())?,
            }
        } else {
            let rs = self.gpr.reg(&mut self.emit, s)?;
            let rb = self.gpr.reg(&mut self.emit, b)?;
            let ra = self.gpr.bind(&mut self.emit, a, a == s || a == b)?;
            self.emit.alu32(op, ra, rs, rb)?;
            if invert {
                self.emit.not32(ra, ra)?;
            }
            if inst.rc() {
                self.compute_rc(ra, 0)?;
            }
        }
        Ok(Flow::Continue)
    }

    pub(super) fn exts_x(&mut self, inst: Inst, bits: u8) -> JitResult<Flow> {
        let (a, s) = (inst.ra(), inst.rs());
        if let Some(value) = self.gpr.imm(s) {
            let result = if bits == 8 { value as i8 as i32 } else { value as i16 as i32 };
            self.set_imm_rc(a, result as u32, inst.rc())?;
        } else {
            let rs = self.gpr.reg(&mut self.emit, s)?;
            let ra = self.gpr.bind(&mut self.emit, a, a == s)?;
            self.emit.sign_extend32(ra, rs, bits)?;
            if inst.rc() {
                self.compute_rc(ra, 0)?;
            }
        }
        Ok(Flow::Continue)
    }

    pub(super) fn cntlzw_x(&mut self, inst: Inst) -> JitResult<Flow> {
        let (a, s) = (inst.ra(), inst.rs());
        if let Some(value) = self.gpr.imm(s) {
            self.set_imm_rc(a, value.leading_zeros(), inst.rc())?;
        } else {
            let rs = self.gpr.reg(&mut self.emit, s)?;
            let ra = self.gpr.bind(&mut self.emit, a, a == s)?;
            self.emit.clz32(ra, rs)?;
            if inst.rc() {
                self.compute_rc(ra, 0)?;
            }
        }
        Ok(Flow::Continue)
    }

    pub(super) fn neg_x(&mut self, inst: Inst) -> JitResult<Flow> {
        if inst.oe() {
            return Ok(Flow::Declined(DeclineReason::OverflowRecording));
        }
        let (d, a) = (inst.rd(), inst.ra());
        if let Some(value) = self.gpr.imm(a) {
            self.set_imm_rc(d, (!value).wrapping_add(1), inst.rc())?;
        } else {
            let ra = self.gpr.reg(&mut self.emit, a)?;
            let rd = self.gpr.bind(&mut self.emit, d, d == a)?;
            self.emit.sub_from_zero32(rd, ra)?;
            if inst.rc() {
                self.compute_rc(rd, 0)?;
            }
        }
        Ok(Flow::Continue)
    }

    pub(super) fn cmp(&mut self, inst: Inst) -> JitResult<Flow> {
        let (crf, a, b) = (inst.crfd(), inst.ra(), inst.rb());
        if let (Some(x), Some(y)) = (self.gpr.imm(a), self.gpr.imm(b)) {
            self.compute_rc_imm(compare_result((x as i32).cmp(&(y as i32))), crf)?;
            return Ok(Flow::Continue);
        }

        let ra = self.gpr.reg(&mut self.emit, a)?;
        let rb = self.gpr.reg(&mut self.emit, b)?;
        let wide = self.gpr.acquire_scratch(&mut self.emit)?;
        let rhs = self.gpr.acquire_scratch(&mut self.emit)?;
        self.emit.sign_extend_32_to_64(wide, ra)?;
        self.emit.sign_extend_32_to_64(rhs, rb)?;
        self.emit.alu64(AluOp::Sub, wide, wide, rhs)?;
        self.gpr.release_scratch(rhs)?;
        self.store_cr_wide(wide, crf)?;
        self.gpr.release_scratch(wide)?;
        Ok(Flow::Continue)
    }

    pub(super) fn cmpl(&mut self, inst: Inst) -> JitResult<Flow> {
        let (crf, a, b) = (inst.crfd(), inst.ra(), inst.rb());
        match (self.gpr.imm(a), self.gpr.imm(b)) {
            (Some(x), Some(y)) => self.compute_rc_imm(compare_result(x.cmp(&y)), crf)?,
            (_, Some(0)) => self.record_unsigned(a, crf)?,
            _ => return Ok(Flow::Declined(DeclineReason::UnsignedCompare)),
        }
        Ok(Flow::Continue)
    }

    pub(super) fn cmpi(&mut self, inst: Inst) -> JitResult<Flow> {
        let (crf, a) = (inst.crfd(), inst.ra());
        let simm = inst.simm_16() as i32;
        if let Some(x) = self.gpr.imm(a) {
            self.compute_rc_imm(compare_result((x as i32).cmp(&simm)), crf)?;
            return Ok(Flow::Continue);
        }

        let ra = self.gpr.reg(&mut self.emit, a)?;
        let wide = self.gpr.acquire_scratch(&mut self.emit)?;
        self.emit.sign_extend_32_to_64(wide, ra)?;
        if is_small_imm(simm) {
            self.emit.alu64_imm(AluOp::Sub, wide, wide, simm as u64)?;
        } else {
            let rhs = self.gpr.acquire_scratch(&mut self.emit)?;
            self.emit.mov_imm32(rhs, simm as u32)?;
            self.emit.sign_extend_32_to_64(rhs, rhs)?;
            self.emit.alu64(AluOp::Sub, wide, wide, rhs)?;
            self.gpr.release_scratch(rhs)?;
        }
        self.store_cr_wide(wide, crf)?;
        self.gpr.release_scratch(wide)?;
        Ok(Flow::Continue)
    }

    pub(super) fn cmpli(&mut self, inst: Inst) -> JitResult<Flow> {
        let (crf, a, uimm) = (inst.crfd(), inst.ra(), inst.uimm());
        if let Some(x) = self.gpr.imm(a) {
            self.compute_rc_imm(compare_result(x.cmp(&uimm)), crf)?;
        } else if uimm == 0 {
            self.record_unsigned(a, crf)?;
        } else {
            return Ok(Flow::Declined(DeclineReason::UnsignedCompare));
        }
        Ok(Flow::Continue)
    }

    /// Unsigned compare against zero: the zero-extended value itself.
    fn record_unsigned(&mut self, a: usize, crf: usize) -> JitResult<()> {
        let ra = self.gpr.reg(&mut self.emit, a)?;
        let wide = self.gpr.acquire_scratch(&mut self.emit)?;
        self.emit.zero_extend_32_to_64(wide, ra)?;
        self.store_cr_wide(wide, crf)?;
        self.gpr.release_scratch(wide)
    }

    pub(super) fn tw_x(&mut self, op: Op, inst: Inst) -> JitResult<Flow> {
        let (to, a, b) = (inst.to(), inst.ra(), inst.rb());
        if to == 0 {
            return Ok(Flow::Continue);
        }

        let simm = inst.simm_16() as i32;
        let rhs = if op == Op::Twi { Some(simm as u32) } else { self.gpr.imm(b) };
        let known = match (self.gpr.imm(a), rhs) {
            (Some(x), Some(y)) => Some(trap_condition(to, x, y)),
            _ if always_traps(to) => Some(true),
            _ => None,
        };
        if let Some(taken) = known {
            log::trace!("trap at {:#010x} resolved statically: {taken}", self.pc);
        }
        match known {
            Some(true) => {
                self.raise_program_exception()?;
                return Ok(Flow::EndBlock);
            }
            Some(false) => return Ok(Flow::Continue),
            None => {}
        }

        // Anything that can spill has to happen before the branches, or the
        // store would only exist on the trapping path.
        let ra = self.gpr.reg(&mut self.emit, a)?;
        let rb = if op == Op::Tw { Some(self.gpr.reg(&mut self.emit, b)?) } else { None };
        let flag = self.gpr.acquire_scratch(&mut self.emit)?;
        match rb {
            Some(rb) => self.emit.cmp32(ra, rb)?,
            None if is_small_imm(simm) => self.emit.cmp32_imm(ra, simm)?,
            None => {
                let rhs = self.gpr.acquire_scratch(&mut self.emit)?;
                self.emit.mov_imm32(rhs, simm as u32)?;
                self.emit.cmp32(ra, rhs)?;
                self.gpr.release_scratch(rhs)?;
            }
        }

        let mut trap: Option<Fixup> = None;
        for (mask, cond) in TRAP_CONDITIONS {
            if to & mask == 0 {
                continue;
            }
            match trap {
                Some(target) => self.emit.branch_to(cond, target)?,
                None => trap = Some(self.emit.branch(cond)?),
            }
        }
        let dont_trap = self.emit.jump()?;
        if let Some(target) = trap {
            self.emit.set_jump_target(target)?;
        }
        self.flag_program_exception(flag)?;
        self.write_exception_exit_keep_state(ExitTarget::Imm(self.pc))?;
        self.emit.set_jump_target(dont_trap)?;
        self.gpr.release_scratch(flag)?;
        Ok(Flow::Continue)
    }

    /// Unconditional trap: flag the exception and end the block.
    fn raise_program_exception(&mut self) -> JitResult<()> {
        let reg = self.gpr.acquire_scratch(&mut self.emit)?;
        self.flag_program_exception(reg)?;
        self.gpr.release_scratch(reg)?;
        self.write_exception_exit(ExitTarget::Imm(self.pc))
    }

    fn flag_program_exception(&mut self, reg: HostReg) -> JitResult<()> {
        self.emit.load32(reg, EXCEPTIONS_OFFSET)?;
        self.emit.alu32_imm(AluOp::Or, reg, reg, EXCEPTION_PROGRAM)?;
        self.emit.store32(reg, EXCEPTIONS_OFFSET)?;
        Ok(())
    }

    fn set_imm_rc(&mut self, guest: usize, value: u32, rc: bool) -> JitResult<()> {
        self.gpr.set_imm(guest, value)?;
        if rc {
            self.compute_rc_imm(value, 0)?;
        }
        Ok(())
    }
}

// This module executes recorded host operations against a guest register file. It is the
// reference semantics of the HostEmitter contract: 32-bit operations write the low half of a
// 64-bit host register and clear the upper half, memory operands are PpcState fields named
// by their block ABI offsets, and conditional branches test the operands of the most recent
// compare. Interpreter calls are forwarded to an Interpreter implementation, so complete
// blocks including fallbacks can be run in tests and from the command line tool.

//! Host operation interpreter.

use hashbrown::HashMap;
use thiserror::Error;

use crate::core::register_file::{HostReg, MAX_HOST_REGS};
use crate::jit::emitter::{ExitKind, Fixup, JumpCondition};
use crate::ppc::inst::Inst;
use crate::ppc::interpreter::Interpreter;
use crate::ppc::state::PpcState;

use super::HostOp;

/// Operations executed before a run is considered stuck.
pub const DEFAULT_FUEL: usize = 1 << 20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MachineError {
    #[error("no guest state field at offset {0:#x}")]
    BadOffset(i32),
    #[error("host register {0} out of range")]
    BadRegister(HostReg),
    #[error("branch to {0:?}, which is never placed")]
    MissingLabel(Fixup),
    #[error("conditional branch without a preceding compare")]
    NoCompare,
    #[error("ran off the end of the operation list")]
    NoExit,
    #[error("fuel exhausted")]
    OutOfFuel,
}

/// Operands of the last compare.
#[derive(Debug, Clone, Copy)]
struct Compare {
    lhs: u64,
    rhs: u64,
    wide: bool,
}

impl Compare {
    fn holds(self, cond: JumpCondition) -> bool {
        let (sl, sr, ul, ur) = if self.wide {
            (self.lhs as i64, self.rhs as i64, self.lhs, self.rhs)
        } else {
            (
                self.lhs as u32 as i32 as i64,
                self.rhs as u32 as i32 as i64,
                self.lhs as u32 as u64,
                self.rhs as u32 as u64,
            )
        };
        match cond {
            JumpCondition::Equal => ul == ur,
            JumpCondition::NotEqual => ul != ur,
            JumpCondition::Less => sl < sr,
            JumpCondition::Greater => sl > sr,
            JumpCondition::LessEqual => sl <= sr,
            JumpCondition::GreaterEqual => sl >= sr,
            JumpCondition::Below => ul < ur,
            JumpCondition::Above => ul > ur,
        }
    }
}

pub struct HostMachine<I: Interpreter> {
    interpreter: I,
    regs: [u64; MAX_HOST_REGS],
    compare: Option<Compare>,
    fuel: usize,
}

impl<I: Interpreter> HostMachine<I> {
    pub fn new(interpreter: I) -> Self {
        Self {
            interpreter,
            regs: [0; MAX_HOST_REGS],
            compare: None,
            fuel: DEFAULT_FUEL,
        }
    }

    pub fn with_fuel(mut self, fuel: usize) -> Self {
        self.fuel = fuel;
        self
    }

    /// Host register contents after a run.
    pub fn reg(&self, reg: HostReg) -> Option<u64> {
        self.regs.get(reg.id() as usize).copied()
    }

    /// Execute `ops` from the start until an exit.
    pub fn run(&mut self, ops: &[HostOp], state: &mut PpcState) -> Result<ExitKind, MachineError> {
        let labels: HashMap<u32, usize> = ops
            .iter()
            .enumerate()
            .filter_map(|(at, op)| match op {
                HostOp::Label(fixup) => Some((fixup.0, at)),
                _ => None,
            })
            .collect();
        let target = |fixup: Fixup| labels.get(&fixup.0).copied().ok_or(MachineError::MissingLabel(fixup));

        let mut fuel = self.fuel;
        let mut at = 0usize;
        while let Some(&op) = ops.get(at) {
            fuel = fuel.checked_sub(1).ok_or(MachineError::OutOfFuel)?;
            at += 1;

            match op {
                HostOp::MovImm32 { dst, imm } => self.set32(dst, imm)?,
                HostOp::Mov32 { dst, src } => {
                    let value = self.get32(src)?;
                    self.set32(dst, value)?;
                }
                HostOp::Alu32 { op, dst, lhs, rhs } => {
                    let value = op.eval32(self.get32(lhs)?, self.get32(rhs)?);
                    self.set32(dst, value)?;
                }
                HostOp::Alu32Imm { op, dst, lhs, imm } => {
                    let value = op.eval32(self.get32(lhs)?, imm);
                    self.set32(dst, value)?;
                }
                HostOp::Alu64 { op, dst, lhs, rhs } => {
                    let value = op.eval64(self.get(lhs)?, self.get(rhs)?);
                    self.set(dst, value)?;
                }
                HostOp::Alu64Imm { op, dst, lhs, imm } => {
                    let value = op.eval64(self.get(lhs)?, imm);
                    self.set(dst, value)?;
                }
                HostOp::Not32 { dst, src } => {
                    let value = !self.get32(src)?;
                    self.set32(dst, value)?;
                }
                HostOp::SubFromZero32 { dst, src } => {
                    let value = 0u32.wrapping_sub(self.get32(src)?);
                    self.set32(dst, value)?;
                }
                HostOp::SignExtend32 { dst, src, bits } => {
                    let value = self.get32(src)?;
                    let value = if bits == 8 { value as i8 as i32 } else { value as i16 as i32 };
                    self.set32(dst, value as u32)?;
                }
                HostOp::Clz32 { dst, src } => {
                    let value = self.get32(src)?.leading_zeros();
                    self.set32(dst, value)?;
                }
                HostOp::Shr32Imm { dst, src, amount } => {
                    let value = self.get32(src)?.checked_shr(amount as u32).unwrap_or(0);
                    self.set32(dst, value)?;
                }
                HostOp::SignExtend64 { dst, src } => {
                    let value = self.get32(src)? as i32 as i64 as u64;
                    self.set(dst, value)?;
                }
                HostOp::ZeroExtend64 { dst, src } => {
                    let value = self.get32(src)? as u64;
                    self.set(dst, value)?;
                }
                HostOp::Load32 { dst, offset } => {
                    let value = state.load_u32(offset).ok_or(MachineError::BadOffset(offset))?;
                    self.set32(dst, value)?;
                }
                HostOp::Store32 { src, offset } => {
                    let value = self.get32(src)?;
                    state.store_u32(offset, value).ok_or(MachineError::BadOffset(offset))?;
                }
                HostOp::Store32Imm { imm, offset } => {
                    state.store_u32(offset, imm).ok_or(MachineError::BadOffset(offset))?;
                }
                HostOp::Load64 { dst, offset } => {
                    let value = state.load_u64(offset).ok_or(MachineError::BadOffset(offset))?;
                    self.set(dst, value)?;
                }
                HostOp::Store64 { src, offset } => {
                    let value = self.get(src)?;
                    state.store_u64(offset, value).ok_or(MachineError::BadOffset(offset))?;
                }
                HostOp::Load32Indexed { dst, index, offset } => {
                    let offset = Self::indexed(self.get32(index)?, offset);
                    let value = state.load_u32(offset).ok_or(MachineError::BadOffset(offset))?;
                    self.set32(dst, value)?;
                }
                HostOp::Store32Indexed { src, index, offset } => {
                    let offset = Self::indexed(self.get32(index)?, offset);
                    let value = self.get32(src)?;
                    state.store_u32(offset, value).ok_or(MachineError::BadOffset(offset))?;
                }
                HostOp::Cmp32 { lhs, rhs } => {
                    self.compare = Some(Compare { lhs: self.get(lhs)?, rhs: self.get(rhs)?, wide: false });
                }
                HostOp::Cmp32Imm { lhs, imm } => {
                    self.compare = Some(Compare { lhs: self.get(lhs)?, rhs: imm as u32 as u64, wide: false });
                }
                HostOp::Cmp64Zero { reg } => {
                    self.compare = Some(Compare { lhs: self.get(reg)?, rhs: 0, wide: true });
                }
                HostOp::Branch { cond, target: fixup } => {
                    if self.compare.ok_or(MachineError::NoCompare)?.holds(cond) {
                        at = target(fixup)?;
                    }
                }
                HostOp::Jump { target: fixup } => at = target(fixup)?,
                HostOp::TestBit64Branch { reg, bit, jump_if_set, target: fixup } => {
                    let set = self.get(reg)? & (1u64 << bit) != 0;
                    if set == jump_if_set {
                        at = target(fixup)?;
                    }
                }
                HostOp::BranchIfZero32 { reg, jump_if_zero, target: fixup } => {
                    let zero = self.get32(reg)? == 0;
                    if zero == jump_if_zero {
                        at = target(fixup)?;
                    }
                }
                HostOp::Label(_) => {}
                HostOp::Exit(kind) => return Ok(kind),
                HostOp::CallInterpreter(word) => {
                    log::trace!("interpreting {word:#010x} at {:#010x}", state.pc);
                    self.interpreter.execute(state, Inst(word));
                }
            }
        }
        Err(MachineError::NoExit)
    }

    fn indexed(index: u32, offset: i32) -> i32 {
        offset.wrapping_add((index as i32).wrapping_mul(4))
    }

    fn get(&self, reg: HostReg) -> Result<u64, MachineError> {
        self.regs.get(reg.id() as usize).copied().ok_or(MachineError::BadRegister(reg))
    }

    fn get32(&self, reg: HostReg) -> Result<u32, MachineError> {
        self.get(reg).map(|value| value as u32)
    }

    fn set(&mut self, reg: HostReg, value: u64) -> Result<(), MachineError> {
        let slot = self.regs.get_mut(reg.id() as usize).ok_or(MachineError::BadRegister(reg))?;
        *slot = value;
        Ok(())
    }

    fn set32(&mut self, reg: HostReg, value: u32) -> Result<(), MachineError> {
        self.set(reg, value as u64)
    }
}

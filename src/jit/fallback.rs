//! Interpreter fallback.
//!
//! A handler declines by returning [`Flow::Declined`](super::Flow) before it
//! touches the register cache. The driver then emits a call that makes the
//! interpreter run that one word with the guest register file up to date.

use std::fmt;

use crate::core::error::JitResult;
use crate::ppc::inst::Inst;
use crate::ppc::state::{EXCEPTIONS_OFFSET, NPC_OFFSET, PC_OFFSET};
use crate::ppc::tables::Family;

use super::emitter::HostEmitter;
use super::exit::ExitTarget;
use super::reg_cache::FlushMode;
use super::translator::{FlushScope, Translator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    /// The instruction family is switched off in the configuration.
    Disabled(Family),
    /// `OE` forms of arithmetic.
    OverflowRecording,
    /// Unsigned compare whose operands are not both known or against zero.
    UnsignedCompare,
    /// Known to the tables but always interpreted (branches).
    Interpreted,
    /// Not in the opcode tables.
    Unknown,
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclineReason::Disabled(family) => write!(f, "{family:?} instructions disabled"),
            DeclineReason::OverflowRecording => write!(f, "overflow recording not supported"),
            DeclineReason::UnsignedCompare => write!(f, "unsigned compare with unknown operands"),
            DeclineReason::Interpreted => write!(f, "always interpreted"),
            DeclineReason::Unknown => write!(f, "unknown instruction"),
        }
    }
}

impl<E: HostEmitter> Translator<E> {
    /// Run `inst` in the interpreter from translated code.
    pub(super) fn fall_back(&mut self, inst: Inst, ends_block: bool) -> JitResult<()> {
        let pc = self.pc;
        self.flush_caches(FlushScope::All, FlushMode::All)?;
        self.emit.store32_imm(pc, PC_OFFSET)?;
        self.emit.store32_imm(pc.wrapping_add(4), NPC_OFFSET)?;
        self.emit.call_interpreter(inst.hex())?;

        let scratch = self.gpr.acquire_scratch(&mut self.emit)?;
        if ends_block {
            self.emit.load32(scratch, NPC_OFFSET)?;
            self.write_exit(ExitTarget::Reg(scratch))?;
            return self.gpr.release_scratch(scratch);
        }

        self.emit.load32(scratch, EXCEPTIONS_OFFSET)?;
        let no_exception = self.emit.branch_if_zero32(scratch, true)?;
        self.gpr.release_scratch(scratch)?;
        self.write_exception_exit_keep_state(ExitTarget::Imm(pc))?;
        self.emit.set_jump_target(no_exception)?;
        Ok(())
    }
}

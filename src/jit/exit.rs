//! Block exits.
//!
//! Both exit kinds flush every register file first, publish the guest
//! program counter and return to the dispatcher. A full exit is terminal for
//! the block; the keep-state form is used on side paths that leave the block
//! while the main path keeps translating.

use crate::core::error::JitResult;
use crate::core::register_file::HostReg;
use crate::ppc::state::{NPC_OFFSET, PC_OFFSET};

use super::emitter::{ExitKind, HostEmitter};
use super::reg_cache::FlushMode;
use super::translator::{FlushScope, Translator};

/// Guest address handed to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTarget {
    Imm(u32),
    Reg(HostReg),
}

impl<E: HostEmitter> Translator<E> {
    /// Leave the block and continue at `target`.
    pub fn write_exit(&mut self, target: ExitTarget) -> JitResult<()> {
        self.flush_caches(FlushScope::All, FlushMode::All)?;
        self.emit_exit(target, ExitKind::Normal)?;
        self.ended = true;
        Ok(())
    }

    /// Leave the block with a guest exception pending at `target`.
    pub fn write_exception_exit(&mut self, target: ExitTarget) -> JitResult<()> {
        self.flush_caches(FlushScope::All, FlushMode::All)?;
        self.emit_exit(target, ExitKind::Exception)?;
        self.ended = true;
        Ok(())
    }

    /// Exception exit on a conditional path; the cache state survives for
    /// the code after the branch.
    pub(super) fn write_exception_exit_keep_state(&mut self, target: ExitTarget) -> JitResult<()> {
        self.flush_caches(FlushScope::All, FlushMode::MaintainState)?;
        self.emit_exit(target, ExitKind::Exception)
    }

    fn emit_exit(&mut self, target: ExitTarget, kind: ExitKind) -> JitResult<()> {
        match target {
            ExitTarget::Imm(pc) => {
                self.emit.store32_imm(pc, PC_OFFSET)?;
                self.emit.store32_imm(pc, NPC_OFFSET)?;
            }
            ExitTarget::Reg(reg) => {
                self.emit.store32(reg, PC_OFFSET)?;
                self.emit.store32(reg, NPC_OFFSET)?;
            }
        }
        self.emit.exit_to_dispatcher(kind)?;
        log::trace!("{:#010x}: {kind:?} exit to {target:?}", self.pc);
        Ok(())
    }
}

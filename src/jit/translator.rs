// This module is the block driver of the translator. A Translator owns one host emitter, the
// guest register cache, an optional sibling cache that is flushed together with the GPRs,
// and the configuration. translate_instruction decodes one guest word, applies the family
// disable switches, dispatches to the handler for its opcode and then enforces the
// per-instruction invariants: every borrowed scratch register was returned, and the
// per-instruction eviction locks are dropped. Declines are routed through the fallback
// bridge. translate_block drives a whole block and closes it with a normal exit when the
// last instruction did not end it.

//! Block translation driver.

use crate::core::config::JitConfig;
use crate::core::error::{JitError, JitResult};
use crate::core::session::SessionStats;
use crate::ppc::inst::Inst;
use crate::ppc::tables::{decode, Family, Op, OpInfo};

use super::emitter::HostEmitter;
use super::exit::ExitTarget;
use super::fallback::DeclineReason;
use super::reg_cache::{FlushMode, GprCache, SiblingCache};

/// What happened to one guest instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Translated; the block goes on.
    Continue,
    /// Translated and the block has been exited.
    EndBlock,
    /// Handed to the interpreter.
    Declined(DeclineReason),
}

/// Which register caches a flush touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushScope {
    Integer,
    All,
}

pub struct Translator<E: HostEmitter> {
    pub(super) emit: E,
    pub(super) gpr: GprCache,
    pub(super) sibling: Option<Box<dyn SiblingCache>>,
    pub(super) config: JitConfig,
    /// Address of the instruction being translated.
    pub(super) pc: u32,
    pub(super) ended: bool,
    stats: SessionStats,
}

impl<E: HostEmitter> Translator<E> {
    pub fn new(emit: E, config: JitConfig) -> Self {
        Self {
            emit,
            gpr: GprCache::new(config.allocatable),
            sibling: None,
            config,
            pc: 0,
            ended: false,
            stats: SessionStats::default(),
        }
    }

    /// Attach a cache that must be flushed whenever every register file is.
    pub fn with_sibling(mut self, sibling: Box<dyn SiblingCache>) -> Self {
        self.sibling = Some(sibling);
        self
    }

    pub fn emitter(&self) -> &E {
        &self.emit
    }

    /// For callers placing targets returned by the condition-field branches.
    pub fn emitter_mut(&mut self) -> &mut E {
        &mut self.emit
    }

    pub fn gpr(&self) -> &GprCache {
        &self.gpr
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Hand back the emitter and the counters of the translated block.
    pub fn finish(self) -> (E, SessionStats) {
        (self.emit, self.stats)
    }

    /// Translate a contiguous run of guest words starting at `start_pc`.
    ///
    /// Stops after a block-ending instruction or at the configured size
    /// limit. Returns the number of guest instructions consumed.
    pub fn translate_block(&mut self, words: &[u32], start_pc: u32) -> JitResult<usize> {
        if self.ended {
            return Err(JitError::BlockTerminated { pc: start_pc });
        }
        self.gpr.reset();

        let mut consumed = 0usize;
        for &word in words.iter().take(self.config.max_block_instructions) {
            let pc = start_pc.wrapping_add(4 * consumed as u32);
            self.translate_instruction(word, pc)?;
            consumed += 1;
            if self.ended {
                break;
            }
        }

        if !self.ended {
            let next = start_pc.wrapping_add(4 * consumed as u32);
            self.write_exit(ExitTarget::Imm(next))?;
        }

        self.stats.blocks += 1;
        self.stats.host_instructions = self.emit.instruction_count() as u64;
        log::debug!(
            "block {start_pc:#010x}: {consumed} guest, {} host, {} folded, {} declined",
            self.stats.host_instructions,
            self.stats.folded_instructions,
            self.stats.declined_instructions
        );
        Ok(consumed)
    }

    /// Translate one guest instruction at `pc`.
    pub fn translate_instruction(&mut self, word: u32, pc: u32) -> JitResult<Flow> {
        if self.ended {
            return Err(JitError::BlockTerminated { pc });
        }
        self.pc = pc;
        let inst = Inst(word);
        let host_before = self.emit.instruction_count();
        let info = decode(inst);
        let name = info.map_or("unknown", |info| info.name);

        let flow = self.translate_decoded(info, inst).map_err(|err| {
            let err = err.at(name, pc);
            log::error!("{err}");
            err
        })?;
        self.gpr.end_instruction();

        self.stats.guest_instructions += 1;
        match flow {
            Flow::Declined(_) => self.stats.declined_instructions += 1,
            _ if self.emit.instruction_count() == host_before => self.stats.folded_instructions += 1,
            _ => {}
        }
        Ok(flow)
    }

    fn translate_decoded(&mut self, info: Option<OpInfo>, inst: Inst) -> JitResult<Flow> {
        let name = info.map_or("unknown", |info| info.name);
        let flow = match info {
            Some(info) => self.dispatch(info, inst)?,
            None => Flow::Declined(DeclineReason::Unknown),
        };

        if let Flow::Declined(reason) = flow {
            log::warn!("{name} at {:#010x} ({inst:?}) declined: {reason}", self.pc);
            self.fall_back(inst, info.map_or(false, |info| info.ends_block))?;
        }

        let count = self.gpr.scratch_in_use();
        if count != 0 {
            return Err(JitError::ScratchLeak { name, count });
        }
        Ok(flow)
    }

    fn dispatch(&mut self, info: OpInfo, inst: Inst) -> JitResult<Flow> {
        if let Some(reason) = self.disabled(&info) {
            return Ok(Flow::Declined(reason));
        }
        log::trace!("{:#010x}: {} {inst:?}", self.pc, info.name);

        match info.op {
            Op::Addi | Op::Addis | Op::Ori | Op::Oris | Op::Xori | Op::Xoris | Op::Andi | Op::Andis => {
                self.arith_imm(info, inst)
            }
            Op::Bool => self.bool_x(info, inst),
            Op::Extsb => self.exts_x(inst, 8),
            Op::Extsh => self.exts_x(inst, 16),
            Op::Cntlzw => self.cntlzw_x(inst),
            Op::Neg => self.neg_x(inst),
            Op::Cmp => self.cmp(inst),
            Op::Cmpl => self.cmpl(inst),
            Op::Cmpi => self.cmpi(inst),
            Op::Cmpli => self.cmpli(inst),
            Op::Tw | Op::Twi => self.tw_x(info.op, inst),
            Op::Mtmsr => self.mtmsr(inst),
            Op::Mfmsr => self.mfmsr(inst),
            Op::Mcrf => self.mcrf(inst),
            Op::Mfsr => self.mfsr(inst),
            Op::Mtsr => self.mtsr(inst),
            Op::Mfsrin => self.mfsrin(inst),
            Op::Mtsrin => self.mtsrin(inst),
            Op::Interpret => Ok(Flow::Declined(DeclineReason::Interpreted)),
        }
    }

    fn disabled(&self, info: &OpInfo) -> Option<DeclineReason> {
        if info.force_jit {
            return None;
        }
        let off = match info.family {
            Family::Integer => self.config.integer_off,
            Family::SystemRegisters => self.config.system_registers_off,
            Family::Branch => false,
        };
        off.then_some(DeclineReason::Disabled(info.family))
    }

    /// Write cached state back to the guest register file.
    pub(super) fn flush_caches(&mut self, scope: FlushScope, mode: FlushMode) -> JitResult<()> {
        self.gpr.flush(&mut self.emit, mode)?;
        if scope == FlushScope::All {
            if let Some(sibling) = self.sibling.as_mut() {
                sibling.flush(&mut self.emit, mode)?;
            }
        }
        Ok(())
    }
}

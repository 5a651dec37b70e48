//! Machine state, condition field and segment register moves.

use crate::core::error::JitResult;
use crate::ppc::inst::Inst;
use crate::ppc::state::{cr_offset, sr_offset, MSR_OFFSET, SR_OFFSET};

use super::emitter::HostEmitter;
use super::exit::ExitTarget;
use super::translator::{Flow, Translator};

/// Segment register selected by an effective address.
pub const fn segment_index(ea: u32) -> usize {
    (ea >> 28) as usize
}

impl<E: HostEmitter> Translator<E> {
    /// Machine state changes can alter translation, so the block ends here.
    pub(super) fn mtmsr(&mut self, inst: Inst) -> JitResult<Flow> {
        self.store_gpr(inst.rs(), MSR_OFFSET)?;
        self.write_exit(ExitTarget::Imm(self.pc.wrapping_add(4)))?;
        Ok(Flow::EndBlock)
    }

    pub(super) fn mfmsr(&mut self, inst: Inst) -> JitResult<Flow> {
        let rd = self.gpr.bind(&mut self.emit, inst.rd(), false)?;
        self.emit.load32(rd, MSR_OFFSET)?;
        Ok(Flow::Continue)
    }

    pub(super) fn mcrf(&mut self, inst: Inst) -> JitResult<Flow> {
        let (dst, src) = (inst.crfd(), inst.crfs());
        if dst != src {
            let word = self.gpr.acquire_scratch(&mut self.emit)?;
            self.emit.load64(word, cr_offset(src))?;
            self.emit.store64(word, cr_offset(dst))?;
            self.gpr.release_scratch(word)?;
        }
        Ok(Flow::Continue)
    }

    pub(super) fn mfsr(&mut self, inst: Inst) -> JitResult<Flow> {
        let rd = self.gpr.bind(&mut self.emit, inst.rd(), false)?;
        self.emit.load32(rd, sr_offset(inst.sr()))?;
        Ok(Flow::Continue)
    }

    pub(super) fn mtsr(&mut self, inst: Inst) -> JitResult<Flow> {
        self.store_gpr(inst.rs(), sr_offset(inst.sr()))?;
        Ok(Flow::Continue)
    }

    pub(super) fn mfsrin(&mut self, inst: Inst) -> JitResult<Flow> {
        let (d, b) = (inst.rd(), inst.rb());
        if let Some(ea) = self.gpr.imm(b) {
            let rd = self.gpr.bind(&mut self.emit, d, false)?;
            self.emit.load32(rd, sr_offset(segment_index(ea)))?;
            return Ok(Flow::Continue);
        }

        let rb = self.gpr.reg(&mut self.emit, b)?;
        let index = self.gpr.acquire_scratch(&mut self.emit)?;
        self.emit.shr32_imm(index, rb, 28)?;
        let rd = self.gpr.bind(&mut self.emit, d, d == b)?;
        self.emit.load32_indexed(rd, index, SR_OFFSET)?;
        self.gpr.release_scratch(index)?;
        Ok(Flow::Continue)
    }

    pub(super) fn mtsrin(&mut self, inst: Inst) -> JitResult<Flow> {
        let (s, b) = (inst.rs(), inst.rb());
        if let Some(ea) = self.gpr.imm(b) {
            self.store_gpr(s, sr_offset(segment_index(ea)))?;
            return Ok(Flow::Continue);
        }

        let rb = self.gpr.reg(&mut self.emit, b)?;
        let rs = self.gpr.reg(&mut self.emit, s)?;
        let index = self.gpr.acquire_scratch(&mut self.emit)?;
        self.emit.shr32_imm(index, rb, 28)?;
        self.emit.store32_indexed(rs, index, SR_OFFSET)?;
        self.gpr.release_scratch(index)?;
        Ok(Flow::Continue)
    }

    /// Store guest register `s` to a state field without binding a known constant.
    fn store_gpr(&mut self, s: usize, offset: i32) -> JitResult<()> {
        match self.gpr.imm(s) {
            Some(value) => self.emit.store32_imm(value, offset)?,
            None => {
                let rs = self.gpr.reg(&mut self.emit, s)?;
                self.emit.store32(rs, offset)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::JitConfig;
    use crate::host_ir::{HostMachine, HostOp, OpRecorder};
    use crate::jit::emitter::ExitKind;
    use crate::ppc::inst::encode;
    use crate::ppc::state::PpcState;

    fn translator() -> Translator<OpRecorder> {
        let _ = env_logger::builder().is_test(true).try_init();
        Translator::new(OpRecorder::new(), JitConfig::default())
    }

    fn run_block(words: &[u32], state: &mut PpcState) -> ExitKind {
        let mut t = translator();
        t.translate_block(words, 0x80).unwrap();
        let (emit, _) = t.finish();
        let mut machine = HostMachine::new(|_: &mut PpcState, inst: Inst| panic!("unexpected fallback {inst:?}"));
        machine.run(emit.ops(), state).unwrap()
    }

    #[test]
    fn test_mtmsr_ends_block_at_next_address() {
        let mut state = PpcState::default();
        state.gpr[3] = 0x8032;
        let words = [encode::mtmsr(3), encode::addi(4, 0, 1)];
        assert_eq!(run_block(&words, &mut state), ExitKind::Normal);
        assert_eq!(state.msr, 0x8032);
        assert_eq!(state.pc, 0x84);
        assert_eq!(state.gpr[4], 0);
    }

    #[test]
    fn test_mtmsr_of_known_value_stores_immediate() {
        let mut t = translator();
        t.translate_instruction(encode::addi(3, 0, 0x30), 0).unwrap();
        t.translate_instruction(encode::mtmsr(3), 4).unwrap();
        assert_eq!(t.emitter().ops()[0], HostOp::Store32Imm { imm: 0x30, offset: MSR_OFFSET });
        assert!(t.is_ended());
    }

    #[test]
    fn test_mfmsr_reads_machine_state() {
        let mut state = PpcState::default();
        state.msr = 0x2000;
        run_block(&[encode::mfmsr(7)], &mut state);
        assert_eq!(state.gpr[7], 0x2000);
    }

    #[test]
    fn test_mcrf_same_field_is_noop() {
        let mut t = translator();
        t.translate_instruction(encode::mcrf(2, 2), 0).unwrap();
        assert!(t.emitter().ops().is_empty());

        let mut state = PpcState::default();
        state.cr_val[6] = 0x1234_5678_9abc;
        run_block(&[encode::mcrf(1, 6)], &mut state);
        assert_eq!(state.cr_val[1], 0x1234_5678_9abc);
    }

    #[test]
    fn test_fixed_segment_registers() {
        let mut state = PpcState::default();
        state.gpr[3] = 0xdead_beef;
        state.sr[9] = 0x77;
        run_block(&[encode::mtsr(4, 3), encode::mfsr(5, 9)], &mut state);
        assert_eq!(state.sr[4], 0xdead_beef);
        assert_eq!(state.gpr[5], 0x77);
    }

    #[test]
    fn test_indexed_segment_registers() {
        let mut state = PpcState::default();
        state.gpr[3] = 0x1111_2222;
        state.gpr[4] = 0xc000_1000;
        state.sr[0xa] = 0xabc;
        state.gpr[6] = 0xa000_0000;
        run_block(&[encode::mtsrin(3, 4), encode::mfsrin(5, 6), encode::mfsrin(6, 6)], &mut state);
        assert_eq!(state.sr[0xc], 0x1111_2222);
        assert_eq!(state.gpr[5], 0xabc);
        assert_eq!(state.gpr[6], 0xabc);
    }

    #[test]
    fn test_indexed_segment_with_known_address_uses_fixed_offset() {
        let mut t = translator();
        t.translate_instruction(encode::addis(4, 0, 0x3000), 0).unwrap();
        t.translate_instruction(encode::mfsrin(5, 4), 4).unwrap();
        let ops = t.emitter().ops();
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], HostOp::Load32 { offset, .. } if offset == sr_offset(3)));
    }
}

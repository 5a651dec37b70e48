// This module is the condition-flags unit. Each of the eight condition fields is one packed
// 64-bit word: the value a result was compared against zero with, sign-extended, so EQ is
// "low 32 bits are zero", LT is bit 62 and GT is "greater than zero as a signed 64-bit
// value". Summary overflow lives in bit 61 and is carried over from the previous word on
// every store; when the low half is zero, bit 63 is set so a carried SO bit cannot make the
// field read as GT. Compares store the exact 64-bit difference of the widened operands so
// overflowing 32-bit differences still classify correctly.

//! Condition register fields.

use crate::core::error::{JitError, JitResult};
use crate::core::register_file::HostReg;
use crate::ppc::state::{
    cr_offset, CR_EQ_BIT, CR_GT_BIT, CR_LT_BIT, CR_LT_PACKED_BIT, CR_SO_BIT, CR_SO_PACKED_BIT,
};

use super::emitter::{AluOp, Fixup, HostEmitter, JumpCondition};
use super::translator::Translator;

pub const SO_MASK: u64 = 1 << CR_SO_PACKED_BIT;
/// Set in the stored word when the low half is zero.
pub const EQ_GUARD: u64 = 1 << 63;

/// The word a field holds after recording `value` with the given SO bit.
pub fn pack_cr_value(value: i64, so: bool) -> u64 {
    let mut word = (value as u64 & !SO_MASK) | if so { SO_MASK } else { 0 };
    if word as u32 == 0 {
        word |= EQ_GUARD;
    }
    word
}

/// Packed word for a folded compare.
pub fn compare_result(ordering: std::cmp::Ordering) -> u32 {
    ordering as i8 as i32 as u32
}

impl<E: HostEmitter> Translator<E> {
    /// Record a 32-bit result held in `value` into field `field`.
    pub fn compute_rc(&mut self, value: HostReg, field: usize) -> JitResult<()> {
        let wide = self.gpr.acquire_scratch(&mut self.emit)?;
        self.emit.sign_extend_32_to_64(wide, value)?;
        self.store_cr_wide(wide, field)?;
        self.gpr.release_scratch(wide)
    }

    /// Record a known 32-bit result into field `field`. The old word is read
    /// back and masked so its SO bit survives (load, and, or, store).
    pub fn compute_rc_imm(&mut self, value: u32, field: usize) -> JitResult<()> {
        let packed = pack_cr_value(value as i32 as i64, false);
        let word = self.gpr.acquire_scratch(&mut self.emit)?;
        self.emit.load64(word, cr_offset(field))?;
        self.emit.alu64_imm(AluOp::And, word, word, SO_MASK)?;
        self.emit.alu64_imm(AluOp::Or, word, word, packed)?;
        self.emit.store64(word, cr_offset(field))?;
        self.gpr.release_scratch(word)
    }

    /// Store an already widened 64-bit comparison value. Clobbers `wide`.
    pub(super) fn store_cr_wide(&mut self, wide: HostReg, field: usize) -> JitResult<()> {
        let old = self.gpr.acquire_scratch(&mut self.emit)?;
        self.emit.alu64_imm(AluOp::And, wide, wide, !SO_MASK)?;
        self.emit.load64(old, cr_offset(field))?;
        self.emit.alu64_imm(AluOp::And, old, old, SO_MASK)?;
        self.emit.alu64(AluOp::Or, wide, wide, old)?;
        self.gpr.release_scratch(old)?;

        let nonzero = self.emit.branch_if_zero32(wide, false)?;
        self.emit.alu64_imm(AluOp::Or, wide, wide, EQ_GUARD)?;
        self.emit.set_jump_target(nonzero)?;
        self.emit.store64(wide, cr_offset(field))?;
        Ok(())
    }

    /// Branch on one bit of a condition field. The returned target is placed
    /// by the caller.
    pub fn jump_if_cr_field_bit(&mut self, field: usize, bit: u32, jump_if_set: bool) -> JitResult<Fixup> {
        if !matches!(bit, CR_LT_BIT | CR_GT_BIT | CR_EQ_BIT | CR_SO_BIT) {
            return Err(JitError::InvalidCrBit { bit });
        }

        let reg = self.gpr.acquire_scratch(&mut self.emit)?;
        let fixup = match bit {
            CR_SO_BIT => {
                self.emit.load64(reg, cr_offset(field))?;
                self.emit.test_bit64_branch(reg, CR_SO_PACKED_BIT as u8, jump_if_set)?
            }
            CR_EQ_BIT => {
                self.emit.load32(reg, cr_offset(field))?;
                self.emit.branch_if_zero32(reg, jump_if_set)?
            }
            CR_GT_BIT => {
                self.emit.load64(reg, cr_offset(field))?;
                self.emit.cmp64_zero(reg)?;
                let cond = if jump_if_set { JumpCondition::Greater } else { JumpCondition::LessEqual };
                self.emit.branch(cond)?
            }
            _ => {
                self.emit.load64(reg, cr_offset(field))?;
                self.emit.test_bit64_branch(reg, CR_LT_PACKED_BIT as u8, jump_if_set)?
            }
        };
        self.gpr.release_scratch(reg)?;
        Ok(fixup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::JitConfig;
    use crate::host_ir::{HostMachine, HostOp, OpRecorder};
    use crate::jit::emitter::ExitKind;
    use crate::ppc::inst::Inst;
    use crate::ppc::state::PpcState;

    fn translator() -> Translator<OpRecorder> {
        Translator::new(OpRecorder::new(), JitConfig::default())
    }

    fn run(ops: &[HostOp], state: &mut PpcState) -> ExitKind {
        let mut machine = HostMachine::new(|_: &mut PpcState, _: Inst| {});
        machine.run(ops, state).unwrap()
    }

    fn field_after(value: u32, so: bool) -> PpcState {
        let mut state = PpcState::default();
        state.cr_val[2] = if so { SO_MASK } else { 0 };

        let mut t = translator();
        let reg = t.gpr.acquire_scratch(&mut t.emit).unwrap();
        t.emit.mov_imm32(reg, value).unwrap();
        t.compute_rc(reg, 2).unwrap();
        t.gpr.release_scratch(reg).unwrap();
        t.emit.exit_to_dispatcher(ExitKind::Normal).unwrap();
        run(t.emitter().ops(), &mut state);
        state
    }

    #[test]
    fn test_pack_keeps_exact_bits() {
        assert_eq!(pack_cr_value(0, false), EQ_GUARD);
        assert_eq!(pack_cr_value(5, false), 5);
        assert_eq!(pack_cr_value(5, true), 5 | SO_MASK);
        assert_eq!(pack_cr_value(-1, false), !SO_MASK);
        assert_eq!(compare_result(std::cmp::Ordering::Less), u32::MAX);
        assert_eq!(compare_result(std::cmp::Ordering::Greater), 1);
    }

    #[test]
    fn test_register_and_immediate_paths_agree() {
        for value in [0u32, 1, 10, 0x7fff_ffff, 0x8000_0000, 0xffff_fff6, u32::MAX] {
            for so in [false, true] {
                let state = field_after(value, so);
                assert_eq!(state.cr_val[2], pack_cr_value(value as i32 as i64, so), "{value:#x}");

                let mut imm_state = PpcState::default();
                imm_state.cr_val[2] = if so { SO_MASK } else { 0 };
                let mut t = translator();
                t.compute_rc_imm(value, 2).unwrap();
                t.emit.exit_to_dispatcher(ExitKind::Normal).unwrap();
                run(t.emitter().ops(), &mut imm_state);
                assert_eq!(imm_state.cr_val[2], state.cr_val[2], "{value:#x}");
            }
        }
    }

    #[test]
    fn test_sticky_overflow_survives_recording() {
        let state = field_after(0, true);
        assert!(state.cr_bit(2, CR_SO_BIT));
        assert!(state.cr_bit(2, CR_EQ_BIT));
        assert!(!state.cr_bit(2, CR_GT_BIT));
        assert!(!state.cr_bit(2, CR_LT_BIT));
    }

    #[test]
    fn test_field_bit_branches() {
        for (value, bit, expect) in [
            (0u32, CR_EQ_BIT, true),
            (3, CR_EQ_BIT, false),
            (3, CR_GT_BIT, true),
            (-3i32 as u32, CR_GT_BIT, false),
            (-3i32 as u32, CR_LT_BIT, true),
            (0, CR_LT_BIT, false),
            (0, CR_SO_BIT, false),
        ] {
            for jump_if_set in [true, false] {
                let mut state = PpcState::default();
                state.cr_val[5] = pack_cr_value(value as i32 as i64, false);

                let mut t = translator();
                let taken = t.jump_if_cr_field_bit(5, bit, jump_if_set).unwrap();
                t.emit.exit_to_dispatcher(ExitKind::Normal).unwrap();
                t.emit.set_jump_target(taken).unwrap();
                t.emit.exit_to_dispatcher(ExitKind::Exception).unwrap();

                let jumped = run(t.emitter().ops(), &mut state) == ExitKind::Exception;
                assert_eq!(jumped, expect == jump_if_set, "value {value:#x} bit {bit}");
            }
        }
    }

    #[test]
    fn test_invalid_bit_is_fatal() {
        let mut t = translator();
        let err = t.jump_if_cr_field_bit(0, 4, true).unwrap_err();
        assert!(matches!(err, JitError::InvalidCrBit { bit: 4 }));
        assert_eq!(t.gpr().scratch_in_use(), 0);
        assert!(t.emitter().ops().is_empty());
    }
}

//! Guest register file and its fixed offsets.
//!
//! Translated code addresses this structure relative to a host base register,
//! so the layout is `#[repr(C)]` and every offset below is part of the block ABI.

use std::mem::offset_of;

/// Pending-exception bit raised by traps.
pub const EXCEPTION_PROGRAM: u32 = 0x0000_0080;

/// Condition register bit indices within a field, PowerPC order.
pub const CR_LT_BIT: u32 = 0;
pub const CR_GT_BIT: u32 = 1;
pub const CR_EQ_BIT: u32 = 2;
pub const CR_SO_BIT: u32 = 3;

/// Bit of the packed condition word holding summary overflow.
pub const CR_SO_PACKED_BIT: u32 = 61;
/// Bit of the packed condition word tested for less-than.
pub const CR_LT_PACKED_BIT: u32 = 62;

#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpcState {
    pub gpr: [u32; 32],
    pub pc: u32,
    pub npc: u32,
    /// One packed word per condition field.
    pub cr_val: [u64; 8],
    pub msr: u32,
    pub sr: [u32; 16],
    pub exceptions: u32,
}

impl Default for PpcState {
    fn default() -> Self {
        Self {
            gpr: [0; 32],
            pc: 0,
            npc: 0,
            cr_val: [0; 8],
            msr: 0,
            sr: [0; 16],
            exceptions: 0,
        }
    }
}

pub const GPR_OFFSET: i32 = offset_of!(PpcState, gpr) as i32;
pub const PC_OFFSET: i32 = offset_of!(PpcState, pc) as i32;
pub const NPC_OFFSET: i32 = offset_of!(PpcState, npc) as i32;
pub const CR_VAL_OFFSET: i32 = offset_of!(PpcState, cr_val) as i32;
pub const MSR_OFFSET: i32 = offset_of!(PpcState, msr) as i32;
pub const SR_OFFSET: i32 = offset_of!(PpcState, sr) as i32;
pub const EXCEPTIONS_OFFSET: i32 = offset_of!(PpcState, exceptions) as i32;

pub const fn gpr_offset(reg: usize) -> i32 {
    GPR_OFFSET + 4 * reg as i32
}

pub const fn cr_offset(field: usize) -> i32 {
    CR_VAL_OFFSET + 8 * field as i32
}

pub const fn sr_offset(sr: usize) -> i32 {
    SR_OFFSET + 4 * sr as i32
}

/// Index into a fixed-size array field when `offset` lands on an element.
fn element(offset: i32, base: i32, size: i32, len: usize) -> Option<usize> {
    let rel = offset.checked_sub(base)?;
    if rel < 0 || rel % size != 0 {
        return None;
    }
    let idx = (rel / size) as usize;
    (idx < len).then_some(idx)
}

impl PpcState {
    /// Read a 32-bit field by its block ABI offset.
    pub fn load_u32(&self, offset: i32) -> Option<u32> {
        if let Some(i) = element(offset, GPR_OFFSET, 4, 32) {
            return Some(self.gpr[i]);
        }
        if let Some(i) = element(offset, SR_OFFSET, 4, 16) {
            return Some(self.sr[i]);
        }
        if let Some(i) = element(offset, CR_VAL_OFFSET, 8, 8) {
            return Some(self.cr_val[i] as u32);
        }
        match offset {
            PC_OFFSET => Some(self.pc),
            NPC_OFFSET => Some(self.npc),
            MSR_OFFSET => Some(self.msr),
            EXCEPTIONS_OFFSET => Some(self.exceptions),
            _ => None,
        }
    }

    pub fn store_u32(&mut self, offset: i32, value: u32) -> Option<()> {
        if let Some(i) = element(offset, GPR_OFFSET, 4, 32) {
            self.gpr[i] = value;
            return Some(());
        }
        if let Some(i) = element(offset, SR_OFFSET, 4, 16) {
            self.sr[i] = value;
            return Some(());
        }
        let slot = match offset {
            PC_OFFSET => &mut self.pc,
            NPC_OFFSET => &mut self.npc,
            MSR_OFFSET => &mut self.msr,
            EXCEPTIONS_OFFSET => &mut self.exceptions,
            _ => return None,
        };
        *slot = value;
        Some(())
    }

    /// Only condition fields are 64 bits wide.
    pub fn load_u64(&self, offset: i32) -> Option<u64> {
        element(offset, CR_VAL_OFFSET, 8, 8).map(|i| self.cr_val[i])
    }

    pub fn store_u64(&mut self, offset: i32, value: u64) -> Option<()> {
        let i = element(offset, CR_VAL_OFFSET, 8, 8)?;
        self.cr_val[i] = value;
        Some(())
    }

    /// Decode one condition bit of a field from its packed word.
    ///
    /// `bit` uses PowerPC order (0 = LT, 1 = GT, 2 = EQ, 3 = SO).
    pub fn cr_bit(&self, field: usize, bit: u32) -> bool {
        let word = self.cr_val[field];
        match bit {
            CR_LT_BIT => word & (1 << CR_LT_PACKED_BIT) != 0,
            CR_GT_BIT => (word as i64) > 0,
            CR_EQ_BIT => word as u32 == 0,
            _ => word & (1 << CR_SO_PACKED_BIT) != 0,
        }
    }

    /// The four bits of a field as a PowerPC nibble (LT in bit 3, SO in bit 0).
    pub fn cr_field(&self, field: usize) -> u32 {
        (0..4).fold(0, |acc, bit| acc | (self.cr_bit(field, bit) as u32) << (3 - bit))
    }
}

//! Host register allocation and ownership tracking.
//!
//! This module implements the RegisterFile that hands out host registers to
//! the guest register cache and to short-lived scratch borrows. Every host
//! register has at most one owner at a time. When the free pool is empty the
//! clock hand picks an unlocked guest-owned register as the spill victim;
//! scratch registers and locked registers are never picked.

use thiserror::Error;

/// Maximum number of host registers tracked.
pub const MAX_HOST_REGS: usize = 64;

/// A host general-purpose register token.
///
/// The id is the host encoding number (for x86-64: 0 = rax ... 15 = r15).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostReg(u8);

impl HostReg {
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for HostReg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Bit set for efficiently tracking register sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegBitSet(u64);

impl RegBitSet {
    /// Create empty register set.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Create a set from a raw mask.
    pub const fn from_mask(mask: u64) -> Self {
        Self(mask)
    }

    /// Create a set holding the given registers.
    pub fn from_regs(regs: &[HostReg]) -> Self {
        let mut set = Self::new();
        for &reg in regs {
            set.set(reg);
        }
        set
    }

    pub const fn mask(self) -> u64 {
        self.0
    }

    pub fn contains(self, reg: HostReg) -> bool {
        (reg.0 as usize) < MAX_HOST_REGS && self.0 & (1u64 << reg.0) != 0
    }

    pub fn set(&mut self, reg: HostReg) {
        if (reg.0 as usize) < MAX_HOST_REGS {
            self.0 |= 1u64 << reg.0;
        }
    }

    pub fn clear(&mut self, reg: HostReg) {
        if (reg.0 as usize) < MAX_HOST_REGS {
            self.0 &= !(1u64 << reg.0);
        }
    }

    pub fn union(self, other: RegBitSet) -> RegBitSet {
        Self(self.0 | other.0)
    }

    pub fn difference(self, other: RegBitSet) -> RegBitSet {
        Self(self.0 & !other.0)
    }

    /// Lowest register in the set.
    pub fn first(self) -> Option<HostReg> {
        if self.0 == 0 {
            None
        } else {
            Some(HostReg(self.0.trailing_zeros() as u8))
        }
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = HostReg> {
        (0..MAX_HOST_REGS as u8).filter(move |&id| self.0 & (1u64 << id) != 0).map(HostReg)
    }
}

/// Who currently holds a host register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegOwner {
    /// Mapped to a guest general-purpose register.
    Guest(u8),
    /// Borrowed as a scratch register by an instruction handler.
    Scratch,
}

/// Error types for register allocation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegAllocError {
    #[error("no host registers available")]
    NoRegistersAvailable,
    #[error("host register {0} is not allocated")]
    RegisterNotAllocated(HostReg),
    #[error("host register {0} is not allocatable")]
    InvalidRegister(HostReg),
    #[error("lock count underflow on host register {0}")]
    LockCountUnderflow(HostReg),
}

/// RegisterFile manages host register ownership for a single block.
pub struct RegisterFile {
    /// Registers available for allocation (excludes stack, state base, temp).
    allocatable: RegBitSet,
    /// Currently owned registers.
    used: RegBitSet,
    /// Registers that cannot be evicted (locked).
    fixed: RegBitSet,
    /// Clock position for victim selection.
    clock: u8,
    owners: [Option<RegOwner>; MAX_HOST_REGS],
    lock_counts: [u8; MAX_HOST_REGS],
}

impl RegisterFile {
    pub fn new(allocatable: RegBitSet) -> Self {
        Self {
            allocatable,
            used: RegBitSet::new(),
            fixed: RegBitSet::new(),
            clock: 0,
            owners: [None; MAX_HOST_REGS],
            lock_counts: [0; MAX_HOST_REGS],
        }
    }

    /// Take the lowest free register for `owner`.
    ///
    /// Never evicts; callers spill a victim from [`Self::find_clocked_evictable`]
    /// and retry.
    pub fn allocate(&mut self, owner: RegOwner) -> Result<HostReg, RegAllocError> {
        let reg = self
            .allocatable
            .difference(self.used)
            .first()
            .ok_or(RegAllocError::NoRegistersAvailable)?;
        self.used.set(reg);
        self.owners[reg.0 as usize] = Some(owner);
        Ok(reg)
    }

    /// Find a guest-owned, unlocked register using the clock algorithm.
    pub fn find_clocked_evictable(&mut self) -> Option<(HostReg, u8)> {
        for _ in 0..MAX_HOST_REGS {
            let reg = HostReg(self.clock);
            self.clock = (self.clock + 1) % MAX_HOST_REGS as u8;

            if !self.used.contains(reg) || self.fixed.contains(reg) {
                continue;
            }
            if let Some(RegOwner::Guest(guest)) = self.owners[reg.0 as usize] {
                return Some((reg, guest));
            }
        }
        None
    }

    /// Return a register to the free pool.
    pub fn free(&mut self, reg: HostReg) -> Result<(), RegAllocError> {
        if !self.allocatable.contains(reg) {
            return Err(RegAllocError::InvalidRegister(reg));
        }
        if !self.used.contains(reg) {
            return Err(RegAllocError::RegisterNotAllocated(reg));
        }
        self.used.clear(reg);
        self.fixed.clear(reg);
        self.owners[reg.0 as usize] = None;
        self.lock_counts[reg.0 as usize] = 0;
        Ok(())
    }

    /// Lock a register to prevent eviction.
    pub fn lock(&mut self, reg: HostReg) -> Result<(), RegAllocError> {
        if !self.used.contains(reg) {
            return Err(RegAllocError::RegisterNotAllocated(reg));
        }
        let count = &mut self.lock_counts[reg.0 as usize];
        *count = count.saturating_add(1);
        self.fixed.set(reg);
        Ok(())
    }

    pub fn unlock(&mut self, reg: HostReg) -> Result<(), RegAllocError> {
        let count = &mut self.lock_counts[reg.0 as usize];
        if *count == 0 {
            return Err(RegAllocError::LockCountUnderflow(reg));
        }
        *count -= 1;
        if *count == 0 {
            self.fixed.clear(reg);
        }
        Ok(())
    }

    /// Drop every lock at once (end of a guest instruction).
    pub fn unlock_all(&mut self) {
        self.fixed = RegBitSet::new();
        self.lock_counts.fill(0);
    }

    pub fn owner(&self, reg: HostReg) -> Option<RegOwner> {
        self.owners.get(reg.0 as usize).copied().flatten()
    }

    pub fn is_allocated(&self, reg: HostReg) -> bool {
        self.used.contains(reg)
    }

    pub fn is_locked(&self, reg: HostReg) -> bool {
        self.fixed.contains(reg)
    }

    pub fn allocatable(&self) -> RegBitSet {
        self.allocatable
    }

    /// Number of registers neither owned nor reserved.
    pub fn free_count(&self) -> u32 {
        self.allocatable.difference(self.used).count()
    }

    /// Number of registers currently borrowed as scratch.
    pub fn scratch_count(&self) -> u32 {
        self.used
            .iter()
            .filter(|reg| self.owners[reg.0 as usize] == Some(RegOwner::Scratch))
            .count() as u32
    }

    /// Reset for a new block.
    pub fn reset(&mut self) {
        self.used = RegBitSet::new();
        self.fixed = RegBitSet::new();
        self.clock = 0;
        self.owners.fill(None);
        self.lock_counts.fill(0);
    }
}

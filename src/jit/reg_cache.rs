//! Guest register cache.
//!
//! Tracks, for each of the 32 guest GPRs, where its authoritative value
//! lives during the current block, and owns the host register pool that
//! scratch borrows come from. A guest register that must be evicted to
//! satisfy an allocation is written back first; registers touched by the
//! current instruction are locked against eviction until
//! [`GprCache::end_instruction`].

use crate::core::error::JitResult;
use crate::core::register_file::{HostReg, RegAllocError, RegBitSet, RegOwner, RegisterFile};
use crate::ppc::state::gpr_offset;

use super::emitter::HostEmitter;

pub const GPR_COUNT: usize = 32;

/// Where a guest register's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegState {
    /// In the guest register file.
    Unbound,
    /// Known at translation time, not yet materialized.
    Immediate(u32),
    /// In a host register exclusively owned by this guest register.
    Bound(HostReg),
}

#[derive(Debug, Clone, Copy)]
struct CachedReg {
    state: RegState,
    /// The bound host register holds a value newer than the register file.
    dirty: bool,
}

impl CachedReg {
    const UNBOUND: Self = Self { state: RegState::Unbound, dirty: false };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Write back and reset every entry to `Unbound`.
    All,
    /// Write back but keep the cache state, for code on a side path that
    /// leaves the block while the main path continues.
    MaintainState,
}

/// Another register cache (such as a floating-point one) that must be
/// flushed together with the GPR cache.
pub trait SiblingCache {
    fn flush(&mut self, emit: &mut dyn HostEmitter, mode: FlushMode) -> JitResult<()>;
}

pub struct GprCache {
    regs: [CachedReg; GPR_COUNT],
    file: RegisterFile,
}

impl GprCache {
    pub fn new(allocatable: RegBitSet) -> Self {
        Self {
            regs: [CachedReg::UNBOUND; GPR_COUNT],
            file: RegisterFile::new(allocatable),
        }
    }

    /// Forget all state for a new block.
    pub fn reset(&mut self) {
        self.regs = [CachedReg::UNBOUND; GPR_COUNT];
        self.file.reset();
    }

    pub fn state(&self, guest: usize) -> RegState {
        self.regs[guest].state
    }

    pub fn is_imm(&self, guest: usize) -> bool {
        matches!(self.regs[guest].state, RegState::Immediate(_))
    }

    /// The known constant of an `Immediate` entry.
    pub fn imm(&self, guest: usize) -> Option<u32> {
        match self.regs[guest].state {
            RegState::Immediate(value) => Some(value),
            _ => None,
        }
    }

    /// Record a translation-time constant, dropping any host binding.
    pub fn set_imm(&mut self, guest: usize, value: u32) -> JitResult<()> {
        self.release_binding(guest)?;
        self.regs[guest] = CachedReg { state: RegState::Immediate(value), dirty: false };
        log::trace!("r{guest} = imm {value:#x}");
        Ok(())
    }

    /// Host register holding the current value of `guest`, loading or
    /// materializing it if needed. Locks the register for this instruction.
    pub fn reg<E: HostEmitter + ?Sized>(&mut self, emit: &mut E, guest: usize) -> JitResult<HostReg> {
        let reg = match self.regs[guest].state {
            RegState::Bound(reg) => reg,
            RegState::Immediate(value) => {
                let reg = self.allocate(emit, RegOwner::Guest(guest as u8))?;
                emit.mov_imm32(reg, value)?;
                self.regs[guest] = CachedReg { state: RegState::Bound(reg), dirty: true };
                log::trace!("r{guest}: materialized {value:#x} into {reg}");
                reg
            }
            RegState::Unbound => {
                let reg = self.allocate(emit, RegOwner::Guest(guest as u8))?;
                emit.load32(reg, gpr_offset(guest))?;
                self.regs[guest] = CachedReg { state: RegState::Bound(reg), dirty: false };
                reg
            }
        };
        self.file.lock(reg)?;
        Ok(reg)
    }

    /// Bind `guest` as the destination of the current instruction.
    ///
    /// With `prefer_same_host_reg` the existing value is kept in place, for
    /// destinations that are also a source; otherwise the host register is
    /// handed out without loading anything. The entry becomes dirty.
    pub fn bind<E: HostEmitter + ?Sized>(
        &mut self,
        emit: &mut E,
        guest: usize,
        prefer_same_host_reg: bool,
    ) -> JitResult<HostReg> {
        let reg = match self.regs[guest].state {
            RegState::Bound(reg) => {
                self.file.lock(reg)?;
                reg
            }
            _ if prefer_same_host_reg => self.reg(emit, guest)?,
            _ => {
                let reg = self.allocate(emit, RegOwner::Guest(guest as u8))?;
                self.file.lock(reg)?;
                reg
            }
        };
        self.regs[guest] = CachedReg { state: RegState::Bound(reg), dirty: true };
        Ok(reg)
    }

    /// Borrow a host register not mapped to any guest register.
    pub fn acquire_scratch<E: HostEmitter + ?Sized>(&mut self, emit: &mut E) -> JitResult<HostReg> {
        self.allocate(emit, RegOwner::Scratch)
    }

    pub fn release_scratch(&mut self, reg: HostReg) -> JitResult<()> {
        match self.file.owner(reg) {
            Some(RegOwner::Scratch) => Ok(self.file.free(reg)?),
            _ => Err(RegAllocError::RegisterNotAllocated(reg).into()),
        }
    }

    /// Scratch registers currently borrowed.
    pub fn scratch_in_use(&self) -> u32 {
        self.file.scratch_count()
    }

    /// Host registers in the free pool.
    pub fn free_host_regs(&self) -> u32 {
        self.file.free_count()
    }

    /// Write every `Bound` and `Immediate` entry back to the register file.
    pub fn flush<E: HostEmitter + ?Sized>(&mut self, emit: &mut E, mode: FlushMode) -> JitResult<()> {
        for guest in 0..GPR_COUNT {
            self.write_back(emit, guest)?;
            if mode == FlushMode::All {
                self.release_binding(guest)?;
                self.regs[guest] = CachedReg::UNBOUND;
            }
        }
        Ok(())
    }

    /// Drop the per-instruction eviction locks.
    pub fn end_instruction(&mut self) {
        self.file.unlock_all();
    }

    fn write_back<E: HostEmitter + ?Sized>(&mut self, emit: &mut E, guest: usize) -> JitResult<()> {
        match self.regs[guest] {
            CachedReg { state: RegState::Immediate(value), .. } => {
                emit.store32_imm(value, gpr_offset(guest))?;
            }
            CachedReg { state: RegState::Bound(reg), dirty: true } => {
                emit.store32(reg, gpr_offset(guest))?;
            }
            _ => {}
        }
        Ok(())
    }

    fn release_binding(&mut self, guest: usize) -> JitResult<()> {
        if let RegState::Bound(reg) = self.regs[guest].state {
            self.file.free(reg)?;
            self.regs[guest] = CachedReg::UNBOUND;
        }
        Ok(())
    }

    /// Allocate for `owner`, spilling an unlocked guest register if the pool is empty.
    fn allocate<E: HostEmitter + ?Sized>(&mut self, emit: &mut E, owner: RegOwner) -> JitResult<HostReg> {
        match self.file.allocate(owner) {
            Ok(reg) => return Ok(reg),
            Err(RegAllocError::NoRegistersAvailable) => {}
            Err(err) => return Err(err.into()),
        }

        let (victim, guest) = self
            .file
            .find_clocked_evictable()
            .ok_or(RegAllocError::NoRegistersAvailable)?;
        log::trace!("spilling r{guest} from {victim}");
        self.write_back(emit, guest as usize)?;
        self.release_binding(guest as usize)?;
        Ok(self.file.allocate(owner)?)
    }
}

// This module provides arena-based translation session management using the bumpalo crate.
// JitSession owns a reference to the arena and keeps everything that outlives a single
// block: the finished host code of every translated block (copied into the arena and keyed
// by guest start address in a hashbrown map) and the running SessionStats (blocks, guest
// instructions, constant-folded instructions, declined instructions, host instructions and
// code bytes). All block code shares the session lifetime, so callers can hand out plain
// slices without reference counting.

//! Arena-based translation session management.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// A finished block stored in the session arena.
#[derive(Debug, Clone, Copy)]
pub struct BlockRecord<'arena> {
    pub start_pc: u32,
    /// Guest instructions covered by the block.
    pub guest_len: u32,
    /// Encoded host code.
    pub code: &'arena [u8],
}

/// Translation statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub blocks: u64,
    pub guest_instructions: u64,
    /// Instructions that emitted no host code at all.
    pub folded_instructions: u64,
    pub declined_instructions: u64,
    pub host_instructions: u64,
    pub code_bytes: u64,
}

impl SessionStats {
    /// Merge the counters of one block.
    pub fn absorb(&mut self, block: &SessionStats) {
        self.blocks += block.blocks;
        self.guest_instructions += block.guest_instructions;
        self.folded_instructions += block.folded_instructions;
        self.declined_instructions += block.declined_instructions;
        self.host_instructions += block.host_instructions;
        self.code_bytes += block.code_bytes;
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} block(s), {} guest instruction(s) ({} folded, {} declined), {} host instruction(s), {} byte(s)",
            self.blocks,
            self.guest_instructions,
            self.folded_instructions,
            self.declined_instructions,
            self.host_instructions,
            self.code_bytes
        )
    }
}

/// Arena-based translation session.
pub struct JitSession<'arena> {
    arena: &'arena Bump,
    stats: RefCell<SessionStats>,
    blocks: RefCell<HashMap<u32, BlockRecord<'arena>>>,
}

impl<'arena> JitSession<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            blocks: RefCell::new(HashMap::new()),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Store a finished block, replacing any older translation of the same address.
    pub fn record_block(
        &self,
        start_pc: u32,
        guest_len: u32,
        code: &[u8],
        block_stats: &SessionStats,
    ) -> BlockRecord<'arena> {
        let record = BlockRecord {
            start_pc,
            guest_len,
            code: self.arena.alloc_slice_copy(code),
        };
        if self.blocks.borrow_mut().insert(start_pc, record).is_some() {
            log::debug!("replaced block at {start_pc:#010x}");
        }

        let mut stats = self.stats.borrow_mut();
        stats.absorb(block_stats);
        stats.code_bytes += code.len() as u64;
        record
    }

    pub fn block(&self, start_pc: u32) -> Option<BlockRecord<'arena>> {
        self.blocks.borrow().get(&start_pc).copied()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.borrow().len()
    }

    pub fn stats(&self) -> SessionStats {
        *self.stats.borrow()
    }

    /// Bytes held by the arena.
    pub fn memory_used(&self) -> usize {
        self.arena.allocated_bytes()
    }
}

// This module defines the fatal error types of the translator using the thiserror crate.
// JitError covers the translator-contract violations (an impossible condition register bit,
// an impossible immediate encoding, a scratch register leaked past the end of a handler,
// translation after the block was terminated) together with failures of the two services
// the translator leans on: host register allocation and host instruction encoding. Guest
// traps and declined instructions are not errors and never appear here.

//! Error types for the translator.

use thiserror::Error;

use super::register_file::RegAllocError;
use crate::jit::emitter::EncodingError;

/// Fatal translation error. Any of these stops generation of the current block.
#[derive(Error, Debug)]
pub enum JitError {
    #[error("invalid condition register bit {bit}")]
    InvalidCrBit { bit: u32 },

    #[error("impossible encoding reached in {name}: {inst:#010x}")]
    ImpossibleEncoding { name: &'static str, inst: u32 },

    #[error("{name} returned with {count} scratch register(s) still borrowed")]
    ScratchLeak { name: &'static str, count: u32 },

    #[error("instruction at {pc:#010x} translated after the block was terminated")]
    BlockTerminated { pc: u32 },

    #[error("register allocation failed: {0}")]
    RegisterAllocation(#[from] RegAllocError),

    #[error("host encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("{name} at {pc:#010x}: {source}")]
    Instruction {
        name: &'static str,
        pc: u32,
        #[source]
        source: Box<JitError>,
    },
}

impl JitError {
    /// Attach the offending instruction form to an error.
    pub fn at(self, name: &'static str, pc: u32) -> Self {
        match self {
            already @ JitError::Instruction { .. } => already,
            other => JitError::Instruction { name, pc, source: Box::new(other) },
        }
    }
}

/// Result type alias for translation operations.
pub type JitResult<T> = Result<T, JitError>;

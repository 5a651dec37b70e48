//! ppcjit - PowerPC to x86-64 block translation core.
//!
//! Translates 32-bit PowerPC guest code one instruction at a time while
//! tracking which guest registers hold known constants and which live in host
//! registers, so redundant traffic to the guest register file disappears and
//! constant instruction sequences fold away entirely.
//!
//! # Primary Usage
//!
//! ```ignore
//! use bumpalo::Bump;
//! use ppcjit::core::{JitConfig, JitSession};
//! use ppcjit::x64::compile_block;
//!
//! let arena = Bump::new();
//! let session = JitSession::new(&arena);
//! let block = compile_block(&session, &JitConfig::from_env(), &words, 0x8000_3100)?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - host register file, errors, configuration, session
//! - [`ppc`] - guest instruction fields, state layout, opcode tables
//! - [`jit`] - register cache, condition fields, handlers, exits, fallback
//! - [`host_ir`] - recorded host ops and a machine that executes them
//! - [`x64`] - x86-64 emission through iced-x86

pub mod core;
pub mod host_ir;
pub mod jit;
pub mod ppc;
pub mod x64;

pub use self::core::{
    BlockRecord, HostReg, JitConfig, JitError, JitResult, JitSession, RegAllocError, RegBitSet,
    RegisterFile, SessionStats,
};
pub use host_ir::{HostMachine, HostOp, MachineError, OpRecorder};
pub use jit::{DeclineReason, Flow, FlushScope, GprCache, HostEmitter, Translator};
pub use ppc::{Inst, Interpreter, PpcState};
pub use x64::X64Emitter;

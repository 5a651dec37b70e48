//! x86-64 host backend.
//!
//! - [`encoder`]: [`X64Emitter`], the iced-x86 implementation of the host emitter
//! - [`backend`]: block compilation into the session arena and ELF object output

pub mod backend;
pub mod encoder;

pub use backend::{block_symbol, compile_block, compile_block_with, write_object};
pub use encoder::{X64Emitter, DEFAULT_CODE_BASE, STATE_REG, TEMP_REG};

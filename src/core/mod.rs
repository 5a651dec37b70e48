// This module serves as the hub for the translator's shared infrastructure: the host
// register file (ownership tracking and clock-based spill victim selection), the fatal
// error types, the translator configuration and the arena-backed translation session.
// None of it knows about guest instruction semantics.

//! Core translator infrastructure.
//!
//! # Key Components
//!
//! - [`register_file`]: host register ownership, locks and spill victims
//! - [`error`]: fatal translation errors
//! - [`config`]: tunables and per-family disable switches
//! - [`session`]: arena storage for finished blocks and statistics

pub mod config;
pub mod error;
pub mod register_file;
pub mod session;

pub use config::JitConfig;
pub use error::{JitError, JitResult};
pub use register_file::{HostReg, RegAllocError, RegBitSet, RegOwner, RegisterFile};
pub use session::{BlockRecord, JitSession, SessionStats};

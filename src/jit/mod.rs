//! The translator: register cache, condition fields, per-opcode handlers,
//! block exits and the interpreter fallback, all emitting through
//! [`HostEmitter`].

pub mod cr;
pub mod emitter;
pub mod exit;
pub mod fallback;
pub mod integer;
pub mod reg_cache;
pub mod system_registers;
pub mod translator;

pub use cr::pack_cr_value;
pub use emitter::{AluOp, EncodingError, ExitKind, Fixup, HostEmitter, JumpCondition};
pub use exit::ExitTarget;
pub use fallback::DeclineReason;
pub use reg_cache::{FlushMode, GprCache, RegState, SiblingCache};
pub use translator::{FlushScope, Flow, Translator};

//! Guest side: PowerPC instruction words, the guest register file layout,
//! the opcode tables and the interpreter boundary.

pub mod inst;
pub mod interpreter;
pub mod state;
pub mod tables;

pub use inst::Inst;
pub use interpreter::Interpreter;
pub use state::PpcState;
pub use tables::{decode, Family, Op, OpInfo};

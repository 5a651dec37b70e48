//! Boundary to the interpreter that executes declined instructions.

use super::inst::Inst;
use super::state::PpcState;

/// Executes exactly one guest instruction against the guest state.
///
/// Implementations update `npc` for branch-class instructions; translated
/// code has already stored `pc` and `npc = pc + 4` before the call.
pub trait Interpreter {
    fn execute(&mut self, state: &mut PpcState, inst: Inst);
}

impl<F> Interpreter for F
where
    F: FnMut(&mut PpcState, Inst),
{
    fn execute(&mut self, state: &mut PpcState, inst: Inst) {
        self(state, inst)
    }
}

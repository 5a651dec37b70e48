//! The host encoder boundary.
//!
//! Handlers never touch a concrete assembler; they talk to a [`HostEmitter`],
//! which offers three-operand primitives over host register tokens and
//! addresses the guest register file relative to an implicit state base.
//! [`crate::x64::X64Emitter`] lowers these to x86-64 and
//! [`crate::host_ir::OpRecorder`] records them for inspection and execution.

use crate::core::register_file::HostReg;

/// Error types for instruction encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Register token the backend cannot encode.
    InvalidRegister(HostReg),
    /// Unsupported instruction or operand combination.
    UnsupportedInstruction(&'static str),
    /// Assembly error from the underlying assembler.
    AssemblyError(String),
    /// Branch target handle that was never created.
    UnknownFixup(Fixup),
}

impl std::fmt::Display for EncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodingError::InvalidRegister(reg) => write!(f, "Invalid register {reg} for operation"),
            EncodingError::UnsupportedInstruction(what) => {
                write!(f, "Unsupported instruction or operand combination: {what}")
            }
            EncodingError::AssemblyError(msg) => write!(f, "Assembly error: {msg}"),
            EncodingError::UnknownFixup(fixup) => write!(f, "Unknown branch target {fixup:?}"),
        }
    }
}

impl std::error::Error for EncodingError {}

pub type EmitResult<T = ()> = Result<T, EncodingError>;

/// Jump conditions for conditional branches, evaluated on the last compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpCondition {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    /// Unsigned less-than.
    Below,
    /// Unsigned greater-than.
    Above,
}

/// Two-input ALU operations. The `*Not` forms complement the right operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    And,
    AndNot,
    Or,
    OrNot,
    Xor,
    XorNot,
}

impl AluOp {
    pub fn eval32(self, lhs: u32, rhs: u32) -> u32 {
        match self {
            AluOp::Add => lhs.wrapping_add(rhs),
            AluOp::Sub => lhs.wrapping_sub(rhs),
            AluOp::And => lhs & rhs,
            AluOp::AndNot => lhs & !rhs,
            AluOp::Or => lhs | rhs,
            AluOp::OrNot => lhs | !rhs,
            AluOp::Xor => lhs ^ rhs,
            AluOp::XorNot => lhs ^ !rhs,
        }
    }

    pub fn eval64(self, lhs: u64, rhs: u64) -> u64 {
        match self {
            AluOp::Add => lhs.wrapping_add(rhs),
            AluOp::Sub => lhs.wrapping_sub(rhs),
            AluOp::And => lhs & rhs,
            AluOp::AndNot => lhs & !rhs,
            AluOp::Or => lhs | rhs,
            AluOp::OrNot => lhs | !rhs,
            AluOp::Xor => lhs ^ rhs,
            AluOp::XorNot => lhs ^ !rhs,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::And => "and",
            AluOp::AndNot => "andn",
            AluOp::Or => "or",
            AluOp::OrNot => "orn",
            AluOp::Xor => "xor",
            AluOp::XorNot => "xorn",
        }
    }
}

/// Handle of a branch target that has not been placed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fixup(pub u32);

/// How a translated block hands control back to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExitKind {
    /// Continue at the guest address stored in `pc`.
    Normal = 0,
    /// A guest exception is pending; route through exception handling.
    Exception = 1,
}

/// Primitive host instruction emission.
///
/// 32-bit operations write the low half of a host register and clear the
/// upper half. Offsets are relative to the guest state base.
pub trait HostEmitter {
    fn mov_imm32(&mut self, dst: HostReg, imm: u32) -> EmitResult;
    fn mov32(&mut self, dst: HostReg, src: HostReg) -> EmitResult;

    /// `dst = lhs op rhs`.
    fn alu32(&mut self, op: AluOp, dst: HostReg, lhs: HostReg, rhs: HostReg) -> EmitResult;
    fn alu32_imm(&mut self, op: AluOp, dst: HostReg, lhs: HostReg, imm: u32) -> EmitResult;
    fn alu64(&mut self, op: AluOp, dst: HostReg, lhs: HostReg, rhs: HostReg) -> EmitResult;
    fn alu64_imm(&mut self, op: AluOp, dst: HostReg, lhs: HostReg, imm: u64) -> EmitResult;

    fn not32(&mut self, dst: HostReg, src: HostReg) -> EmitResult;
    /// `dst = 0 - src`.
    fn sub_from_zero32(&mut self, dst: HostReg, src: HostReg) -> EmitResult;
    /// Sign-extend the low `bits` (8 or 16) of `src` to 32 bits.
    fn sign_extend32(&mut self, dst: HostReg, src: HostReg, bits: u8) -> EmitResult;
    /// Count leading zeros; 32 for a zero input.
    fn clz32(&mut self, dst: HostReg, src: HostReg) -> EmitResult;
    fn shr32_imm(&mut self, dst: HostReg, src: HostReg, amount: u8) -> EmitResult;
    fn sign_extend_32_to_64(&mut self, dst: HostReg, src: HostReg) -> EmitResult;
    fn zero_extend_32_to_64(&mut self, dst: HostReg, src: HostReg) -> EmitResult;

    fn load32(&mut self, dst: HostReg, offset: i32) -> EmitResult;
    fn store32(&mut self, src: HostReg, offset: i32) -> EmitResult;
    fn store32_imm(&mut self, imm: u32, offset: i32) -> EmitResult;
    fn load64(&mut self, dst: HostReg, offset: i32) -> EmitResult;
    fn store64(&mut self, src: HostReg, offset: i32) -> EmitResult;
    /// Load from `base + index * 4 + offset`; the index is a 32-bit value.
    fn load32_indexed(&mut self, dst: HostReg, index: HostReg, offset: i32) -> EmitResult;
    fn store32_indexed(&mut self, src: HostReg, index: HostReg, offset: i32) -> EmitResult;

    fn cmp32(&mut self, lhs: HostReg, rhs: HostReg) -> EmitResult;
    fn cmp32_imm(&mut self, lhs: HostReg, imm: i32) -> EmitResult;
    /// Signed 64-bit compare against zero.
    fn cmp64_zero(&mut self, reg: HostReg) -> EmitResult;

    /// Conditional branch to a new, unplaced target.
    fn branch(&mut self, cond: JumpCondition) -> EmitResult<Fixup>;
    /// Conditional branch to an existing, unplaced target.
    fn branch_to(&mut self, cond: JumpCondition, target: Fixup) -> EmitResult;
    fn jump(&mut self) -> EmitResult<Fixup>;
    /// Branch when bit `bit` of the 64-bit register is set (or clear).
    fn test_bit64_branch(&mut self, reg: HostReg, bit: u8, jump_if_set: bool) -> EmitResult<Fixup>;
    /// Branch when the low 32 bits are zero (or nonzero).
    fn branch_if_zero32(&mut self, reg: HostReg, jump_if_zero: bool) -> EmitResult<Fixup>;
    /// Place `target` at the current position.
    fn set_jump_target(&mut self, target: Fixup) -> EmitResult;

    /// Return to the block dispatcher.
    fn exit_to_dispatcher(&mut self, kind: ExitKind) -> EmitResult;
    /// Run one guest instruction in the interpreter.
    fn call_interpreter(&mut self, inst: u32) -> EmitResult;

    /// Host instructions emitted so far.
    fn instruction_count(&self) -> usize;
}

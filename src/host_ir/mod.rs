//! Recorded host operations.
//!
//! [`OpRecorder`] implements [`HostEmitter`] by appending one [`HostOp`] per
//! call instead of encoding machine code. The listing shows exactly what a
//! backend would be asked to emit, and [`HostMachine`] can execute it
//! against a [`PpcState`](crate::ppc::PpcState).
//!
//! # Listing format
//!
//! ```text
//!     load32 h0, [state+0x0c]
//!     alu32.xor h1, h0, h0
//! L0:
//!     exit normal
//! ```

use std::fmt;

use crate::core::register_file::HostReg;
use crate::jit::emitter::{AluOp, EmitResult, EncodingError, ExitKind, Fixup, HostEmitter, JumpCondition};

pub mod machine;

pub use machine::{HostMachine, MachineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOp {
    MovImm32 { dst: HostReg, imm: u32 },
    Mov32 { dst: HostReg, src: HostReg },
    Alu32 { op: AluOp, dst: HostReg, lhs: HostReg, rhs: HostReg },
    Alu32Imm { op: AluOp, dst: HostReg, lhs: HostReg, imm: u32 },
    Alu64 { op: AluOp, dst: HostReg, lhs: HostReg, rhs: HostReg },
    Alu64Imm { op: AluOp, dst: HostReg, lhs: HostReg, imm: u64 },
    Not32 { dst: HostReg, src: HostReg },
    SubFromZero32 { dst: HostReg, src: HostReg },
    SignExtend32 { dst: HostReg, src: HostReg, bits: u8 },
    Clz32 { dst: HostReg, src: HostReg },
    Shr32Imm { dst: HostReg, src: HostReg, amount: u8 },
    SignExtend64 { dst: HostReg, src: HostReg },
    ZeroExtend64 { dst: HostReg, src: HostReg },
    Load32 { dst: HostReg, offset: i32 },
    Store32 { src: HostReg, offset: i32 },
    Store32Imm { imm: u32, offset: i32 },
    Load64 { dst: HostReg, offset: i32 },
    Store64 { src: HostReg, offset: i32 },
    Load32Indexed { dst: HostReg, index: HostReg, offset: i32 },
    Store32Indexed { src: HostReg, index: HostReg, offset: i32 },
    Cmp32 { lhs: HostReg, rhs: HostReg },
    Cmp32Imm { lhs: HostReg, imm: i32 },
    Cmp64Zero { reg: HostReg },
    Branch { cond: JumpCondition, target: Fixup },
    Jump { target: Fixup },
    TestBit64Branch { reg: HostReg, bit: u8, jump_if_set: bool, target: Fixup },
    BranchIfZero32 { reg: HostReg, jump_if_zero: bool, target: Fixup },
    /// Placement of a branch target; not an instruction.
    Label(Fixup),
    Exit(ExitKind),
    CallInterpreter(u32),
}

impl HostOp {
    pub fn is_label(&self) -> bool {
        matches!(self, HostOp::Label(_))
    }
}

fn cond_name(cond: JumpCondition) -> &'static str {
    match cond {
        JumpCondition::Equal => "eq",
        JumpCondition::NotEqual => "ne",
        JumpCondition::Less => "lt",
        JumpCondition::Greater => "gt",
        JumpCondition::LessEqual => "le",
        JumpCondition::GreaterEqual => "ge",
        JumpCondition::Below => "b",
        JumpCondition::Above => "a",
    }
}

struct Mem(i32);

impl fmt::Display for Mem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[state+{:#04x}]", self.0)
    }
}

impl fmt::Display for HostOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use HostOp::*;
        match *self {
            MovImm32 { dst, imm } => write!(f, "mov32 {dst}, {imm:#x}"),
            Mov32 { dst, src } => write!(f, "mov32 {dst}, {src}"),
            Alu32 { op, dst, lhs, rhs } => write!(f, "alu32.{} {dst}, {lhs}, {rhs}", op.mnemonic()),
            Alu32Imm { op, dst, lhs, imm } => write!(f, "alu32.{} {dst}, {lhs}, {imm:#x}", op.mnemonic()),
            Alu64 { op, dst, lhs, rhs } => write!(f, "alu64.{} {dst}, {lhs}, {rhs}", op.mnemonic()),
            Alu64Imm { op, dst, lhs, imm } => write!(f, "alu64.{} {dst}, {lhs}, {imm:#x}", op.mnemonic()),
            Not32 { dst, src } => write!(f, "not32 {dst}, {src}"),
            SubFromZero32 { dst, src } => write!(f, "neg32 {dst}, {src}"),
            SignExtend32 { dst, src, bits } => write!(f, "sext{bits} {dst}, {src}"),
            Clz32 { dst, src } => write!(f, "clz32 {dst}, {src}"),
            Shr32Imm { dst, src, amount } => write!(f, "shr32 {dst}, {src}, {amount}"),
            SignExtend64 { dst, src } => write!(f, "sext64 {dst}, {src}"),
            ZeroExtend64 { dst, src } => write!(f, "zext64 {dst}, {src}"),
            Load32 { dst, offset } => write!(f, "load32 {dst}, {}", Mem(offset)),
            Store32 { src, offset } => write!(f, "store32 {}, {src}", Mem(offset)),
            Store32Imm { imm, offset } => write!(f, "store32 {}, {imm:#x}", Mem(offset)),
            Load64 { dst, offset } => write!(f, "load64 {dst}, {}", Mem(offset)),
            Store64 { src, offset } => write!(f, "store64 {}, {src}", Mem(offset)),
            Load32Indexed { dst, index, offset } => {
                write!(f, "load32 {dst}, [state+{index}*4+{offset:#04x}]")
            }
            Store32Indexed { src, index, offset } => {
                write!(f, "store32 [state+{index}*4+{offset:#04x}], {src}")
            }
            Cmp32 { lhs, rhs } => write!(f, "cmp32 {lhs}, {rhs}"),
            Cmp32Imm { lhs, imm } => write!(f, "cmp32 {lhs}, {imm}"),
            Cmp64Zero { reg } => write!(f, "cmp64 {reg}, 0"),
            Branch { cond, target } => write!(f, "b.{} L{}", cond_name(cond), target.0),
            Jump { target } => write!(f, "jmp L{}", target.0),
            TestBit64Branch { reg, bit, jump_if_set, target } => {
                let name = if jump_if_set { "tbnz" } else { "tbz" };
                write!(f, "{name} {reg}, {bit}, L{}", target.0)
            }
            BranchIfZero32 { reg, jump_if_zero, target } => {
                let name = if jump_if_zero { "cbz" } else { "cbnz" };
                write!(f, "{name} {reg}, L{}", target.0)
            }
            Label(target) => write!(f, "L{}:", target.0),
            Exit(ExitKind::Normal) => write!(f, "exit normal"),
            Exit(ExitKind::Exception) => write!(f, "exit exception"),
            CallInterpreter(inst) => write!(f, "call interpreter, {inst:#010x}"),
        }
    }
}

/// Emitter that records operations instead of encoding them.
#[derive(Debug, Default)]
pub struct OpRecorder {
    ops: Vec<HostOp>,
    next_fixup: u32,
}

impl OpRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<HostOp> {
        self.ops
    }

    /// One operation per line, labels flush left.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for op in &self.ops {
            if !op.is_label() {
                out.push_str("    ");
            }
            out.push_str(&op.to_string());
            out.push('\n');
        }
        out
    }

    fn push(&mut self, op: HostOp) -> EmitResult {
        log::trace!("emit {op}");
        self.ops.push(op);
        Ok(())
    }

    fn new_fixup(&mut self) -> Fixup {
        let fixup = Fixup(self.next_fixup);
        self.next_fixup += 1;
        fixup
    }
}

impl HostEmitter for OpRecorder {
    fn mov_imm32(&mut self, dst: HostReg, imm: u32) -> EmitResult {
        self.push(HostOp::MovImm32 { dst, imm })
    }

    fn mov32(&mut self, dst: HostReg, src: HostReg) -> EmitResult {
        self.push(HostOp::Mov32 { dst, src })
    }

    fn alu32(&mut self, op: AluOp, dst: HostReg, lhs: HostReg, rhs: HostReg) -> EmitResult {
        self.push(HostOp::Alu32 { op, dst, lhs, rhs })
    }

    fn alu32_imm(&mut self, op: AluOp, dst: HostReg, lhs: HostReg, imm: u32) -> EmitResult {
        self.push(HostOp::Alu32Imm { op, dst, lhs, imm })
    }

    fn alu64(&mut self, op: AluOp, dst: HostReg, lhs: HostReg, rhs: HostReg) -> EmitResult {
        self.push(HostOp::Alu64 { op, dst, lhs, rhs })
    }

    fn alu64_imm(&mut self, op: AluOp, dst: HostReg, lhs: HostReg, imm: u64) -> EmitResult {
        self.push(HostOp::Alu64Imm { op, dst, lhs, imm })
    }

    fn not32(&mut self, dst: HostReg, src: HostReg) -> EmitResult {
        self.push(HostOp::Not32 { dst, src })
    }

    fn sub_from_zero32(&mut self, dst: HostReg, src: HostReg) -> EmitResult {
        self.push(HostOp::SubFromZero32 { dst, src })
    }

    fn sign_extend32(&mut self, dst: HostReg, src: HostReg, bits: u8) -> EmitResult {
        if bits != 8 && bits != 16 {
            return Err(EncodingError::UnsupportedInstruction("sign extension width"));
        }
        self.push(HostOp::SignExtend32 { dst, src, bits })
    }

    fn clz32(&mut self, dst: HostReg, src: HostReg) -> EmitResult {
        self.push(HostOp::Clz32 { dst, src })
    }

    fn shr32_imm(&mut self, dst: HostReg, src: HostReg, amount: u8) -> EmitResult {
        self.push(HostOp::Shr32Imm { dst, src, amount })
    }

    fn sign_extend_32_to_64(&mut self, dst: HostReg, src: HostReg) -> EmitResult {
        self.push(HostOp::SignExtend64 { dst, src })
    }

    fn zero_extend_32_to_64(&mut self, dst: HostReg, src: HostReg) -> EmitResult {
        self.push(HostOp::ZeroExtend64 { dst, src })
    }

    fn load32(&mut self, dst: HostReg, offset: i32) -> EmitResult {
        self.push(HostOp::Load32 { dst, offset })
    }

    fn store32(&mut self, src: HostReg, offset: i32) -> EmitResult {
        self.push(HostOp::Store32 { src, offset })
    }

    fn store32_imm(&mut self, imm: u32, offset: i32) -> EmitResult {
        self.push(HostOp::Store32Imm { imm, offset })
    }

    fn load64(&mut self, dst: HostReg, offset: i32) -> EmitResult {
        self.push(HostOp::Load64 { dst, offset })
    }

    fn store64(&mut self, src: HostReg, offset: i32) -> EmitResult {
        self.push(HostOp::Store64 { src, offset })
    }

    fn load32_indexed(&mut self, dst: HostReg, index: HostReg, offset: i32) -> EmitResult {
        self.push(HostOp::Load32Indexed { dst, index, offset })
    }

    fn store32_indexed(&mut self, src: HostReg, index: HostReg, offset: i32) -> EmitResult {
        self.push(HostOp::Store32Indexed { src, index, offset })
    }

    fn cmp32(&mut self, lhs: HostReg, rhs: HostReg) -> EmitResult {
        self.push(HostOp::Cmp32 { lhs, rhs })
    }

    fn cmp32_imm(&mut self, lhs: HostReg, imm: i32) -> EmitResult {
        self.push(HostOp::Cmp32Imm { lhs, imm })
    }

    fn cmp64_zero(&mut self, reg: HostReg) -> EmitResult {
        self.push(HostOp::Cmp64Zero { reg })
    }

    fn branch(&mut self, cond: JumpCondition) -> EmitResult<Fixup> {
        let target = self.new_fixup();
        self.push(HostOp::Branch { cond, target })?;
        Ok(target)
    }

    fn branch_to(&mut self, cond: JumpCondition, target: Fixup) -> EmitResult {
        if target.0 >= self.next_fixup {
            return Err(EncodingError::UnknownFixup(target));
        }
        self.push(HostOp::Branch { cond, target })
    }

    fn jump(&mut self) -> EmitResult<Fixup> {
        let target = self.new_fixup();
        self.push(HostOp::Jump { target })?;
        Ok(target)
    }

    fn test_bit64_branch(&mut self, reg: HostReg, bit: u8, jump_if_set: bool) -> EmitResult<Fixup> {
        if bit >= 64 {
            return Err(EncodingError::UnsupportedInstruction("bit index out of range"));
        }
        let target = self.new_fixup();
        self.push(HostOp::TestBit64Branch { reg, bit, jump_if_set, target })?;
        Ok(target)
    }

    fn branch_if_zero32(&mut self, reg: HostReg, jump_if_zero: bool) -> EmitResult<Fixup> {
        let target = self.new_fixup();
        self.push(HostOp::BranchIfZero32 { reg, jump_if_zero, target })?;
        Ok(target)
    }

    fn set_jump_target(&mut self, target: Fixup) -> EmitResult {
        if target.0 >= self.next_fixup {
            return Err(EncodingError::UnknownFixup(target));
        }
        self.push(HostOp::Label(target))
    }

    fn exit_to_dispatcher(&mut self, kind: ExitKind) -> EmitResult {
        self.push(HostOp::Exit(kind))
    }

    fn call_interpreter(&mut self, inst: u32) -> EmitResult {
        self.push(HostOp::CallInterpreter(inst))
    }

    fn instruction_count(&self) -> usize {
        self.ops.iter().filter(|op| !op.is_label()).count()
    }
}

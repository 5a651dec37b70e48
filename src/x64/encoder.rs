// This module lowers the translator's host primitives to real x86-64 machine code using the
// iced-x86 code assembler. X64Emitter maps HostReg tokens straight onto the hardware register
// numbers (0 = rax ... 15 = r15), addresses the guest register file through r15, and reserves
// r11 as its private temporary for the operand shuffles that three-operand primitives need on a
// two-operand ISA, such as a subtract whose destination aliases its right operand. Branch
// targets are iced CodeLabels indexed by Fixup; a nop separates two targets placed back to back
// since iced allows only one label per instruction. A block is entered with the state pointer in
// r15 and returns its ExitKind in eax.

//! x86-64 host code emission using iced-x86.

use iced_x86::code_asm::*;
use iced_x86::IcedError;

use crate::core::register_file::HostReg;
use crate::jit::emitter::{AluOp, EmitResult, EncodingError, ExitKind, Fixup, HostEmitter, JumpCondition};

/// Host register holding the guest state pointer.
pub const STATE_REG: HostReg = HostReg::new(15);
/// Emitter-private temporary.
pub const TEMP_REG: HostReg = HostReg::new(11);

/// Default address the assembled block is positioned at.
pub const DEFAULT_CODE_BASE: u64 = 0x1000;

const GP64: [AsmRegister64; 16] = [
    rax, rcx, rdx, rbx, rsp, rbp, rsi, rdi, r8, r9, r10, r11, r12, r13, r14, r15,
];

const GP32: [AsmRegister32; 16] = [
    eax, ecx, edx, ebx, esp, ebp, esi, edi, r8d, r9d, r10d, r11d, r12d, r13d, r14d, r15d,
];

const GP16: [AsmRegister16; 16] = [
    ax, cx, dx, bx, sp, bp, si, di, r8w, r9w, r10w, r11w, r12w, r13w, r14w, r15w,
];

const GP8: [AsmRegister8; 16] = [
    al, cl, dl, bl, spl, bpl, sil, dil, r8b, r9b, r10b, r11b, r12b, r13b, r14b, r15b,
];

fn asm_err(e: IcedError) -> EncodingError {
    EncodingError::AssemblyError(e.to_string())
}

/// Two-operand x86 ALU forms the `AluOp` set lowers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum X86Alu {
    Add,
    Sub,
    And,
    Or,
    Xor,
}

impl X86Alu {
    /// Base operation and whether the right operand is complemented first.
    fn lower(op: AluOp) -> (X86Alu, bool) {
        match op {
            AluOp::Add => (X86Alu::Add, false),
            AluOp::Sub => (X86Alu::Sub, false),
            AluOp::And => (X86Alu::And, false),
            AluOp::AndNot => (X86Alu::And, true),
            AluOp::Or => (X86Alu::Or, false),
            AluOp::OrNot => (X86Alu::Or, true),
            AluOp::Xor => (X86Alu::Xor, false),
            AluOp::XorNot => (X86Alu::Xor, true),
        }
    }

    fn commutes(self) -> bool {
        self != X86Alu::Sub
    }
}

/// x86-64 implementation of [`HostEmitter`].
pub struct X64Emitter {
    assembler: CodeAssembler,
    labels: Vec<CodeLabel>,
    placed: Vec<bool>,
    /// Instruction index of the most recently placed label.
    label_at: Option<usize>,
    interpreter_entry: u64,
}

impl X64Emitter {
    /// Create an emitter whose interpreter calls go to `interpreter_entry`,
    /// an `extern "C" fn(*mut PpcState, u32)`.
    pub fn new(interpreter_entry: u64) -> Result<Self, EncodingError> {
        let assembler = CodeAssembler::new(64).map_err(asm_err)?;
        Ok(Self {
            assembler,
            labels: Vec::new(),
            placed: Vec::new(),
            label_at: None,
            interpreter_entry,
        })
    }

    /// Assemble everything emitted so far for execution at `base`.
    pub fn finalize(&mut self, base: u64) -> Result<Vec<u8>, EncodingError> {
        if let Some(index) = self.placed.iter().position(|placed| !placed) {
            return Err(EncodingError::UnknownFixup(Fixup(index as u32)));
        }
        if self.label_at == Some(self.assembler.instructions().len()) {
            self.assembler.int3().map_err(asm_err)?;
        }
        self.assembler.assemble(base).map_err(asm_err)
    }

    fn gp64(reg: HostReg) -> Result<AsmRegister64, EncodingError> {
        GP64.get(reg.id() as usize).copied().ok_or(EncodingError::InvalidRegister(reg))
    }

    fn gp32(reg: HostReg) -> Result<AsmRegister32, EncodingError> {
        GP32.get(reg.id() as usize).copied().ok_or(EncodingError::InvalidRegister(reg))
    }

    fn gp16(reg: HostReg) -> Result<AsmRegister16, EncodingError> {
        GP16.get(reg.id() as usize).copied().ok_or(EncodingError::InvalidRegister(reg))
    }

    fn gp8(reg: HostReg) -> Result<AsmRegister8, EncodingError> {
        GP8.get(reg.id() as usize).copied().ok_or(EncodingError::InvalidRegister(reg))
    }

    /// Cache registers may never name the state base or the temporary.
    fn usable(reg: HostReg) -> EmitResult {
        if reg == STATE_REG || reg == TEMP_REG {
            return Err(EncodingError::InvalidRegister(reg));
        }
        Ok(())
    }

    fn mem32(offset: i32) -> AsmMemoryOperand {
        dword_ptr(r15 + offset)
    }

    fn mem64(offset: i32) -> AsmMemoryOperand {
        qword_ptr(r15 + offset)
    }

    fn mem32_indexed(index: AsmRegister64, offset: i32) -> AsmMemoryOperand {
        dword_ptr(r15 + index * 4 + offset)
    }

    fn op32(&mut self, op: X86Alu, dst: AsmRegister32, src: AsmRegister32) -> EmitResult {
        let a = &mut self.assembler;
        match op {
            X86Alu::Add => a.add(dst, src),
            X86Alu::Sub => a.sub(dst, src),
            X86Alu::And => a.and(dst, src),
            X86Alu::Or => a.or(dst, src),
            X86Alu::Xor => a.xor(dst, src),
        }
        .map_err(asm_err)
    }

    fn op32_imm(&mut self, op: X86Alu, dst: AsmRegister32, imm: i32) -> EmitResult {
        let a = &mut self.assembler;
        match op {
            X86Alu::Add => a.add(dst, imm),
            X86Alu::Sub => a.sub(dst, imm),
            X86Alu::And => a.and(dst, imm),
            X86Alu::Or => a.or(dst, imm),
            X86Alu::Xor => a.xor(dst, imm),
        }
        .map_err(asm_err)
    }

    fn op64(&mut self, op: X86Alu, dst: AsmRegister64, src: AsmRegister64) -> EmitResult {
        let a = &mut self.assembler;
        match op {
            X86Alu::Add => a.add(dst, src),
            X86Alu::Sub => a.sub(dst, src),
            X86Alu::And => a.and(dst, src),
            X86Alu::Or => a.or(dst, src),
            X86Alu::Xor => a.xor(dst, src),
        }
        .map_err(asm_err)
    }

    fn op64_imm(&mut self, op: X86Alu, dst: AsmRegister64, imm: i32) -> EmitResult {
        let a = &mut self.assembler;
        match op {
            X86Alu::Add => a.add(dst, imm),
            X86Alu::Sub => a.sub(dst, imm),
            X86Alu::And => a.and(dst, imm),
            X86Alu::Or => a.or(dst, imm),
            X86Alu::Xor => a.xor(dst, imm),
        }
        .map_err(asm_err)
    }

    /// `mov dst, src` unless they are the same register.
    fn copy32(&mut self, dst: AsmRegister32, src: AsmRegister32) -> EmitResult {
        if dst != src {
            self.assembler.mov(dst, src).map_err(asm_err)?;
        }
        Ok(())
    }

    fn copy64(&mut self, dst: AsmRegister64, src: AsmRegister64) -> EmitResult {
        if dst != src {
            self.assembler.mov(dst, src).map_err(asm_err)?;
        }
        Ok(())
    }

    fn new_label(&mut self) -> (Fixup, CodeLabel) {
        let label = self.assembler.create_label();
        let fixup = Fixup(self.labels.len() as u32);
        self.labels.push(label);
        self.placed.push(false);
        (fixup, label)
    }

    fn open_label(&self, target: Fixup) -> Result<CodeLabel, EncodingError> {
        match self.placed.get(target.0 as usize) {
            Some(false) => Ok(self.labels[target.0 as usize]),
            _ => Err(EncodingError::UnknownFixup(target)),
        }
    }

    fn jcc(&mut self, cond: JumpCondition, label: CodeLabel) -> EmitResult {
        let a = &mut self.assembler;
        match cond {
            JumpCondition::Equal => a.je(label),
            JumpCondition::NotEqual => a.jne(label),
            JumpCondition::Less => a.jl(label),
            JumpCondition::Greater => a.jg(label),
            JumpCondition::LessEqual => a.jle(label),
            JumpCondition::GreaterEqual => a.jge(label),
            JumpCondition::Below => a.jb(label),
            JumpCondition::Above => a.ja(label),
        }
        .map_err(asm_err)
    }
}

impl HostEmitter for X64Emitter {
    fn mov_imm32(&mut self, dst: HostReg, imm: u32) -> EmitResult {
        Self::usable(dst)?;
        let dst = Self::gp32(dst)?;
        if imm == 0 {
            self.assembler.xor(dst, dst).map_err(asm_err)
        } else {
            self.assembler.mov(dst, imm as i32).map_err(asm_err)
        }
    }

    fn mov32(&mut self, dst: HostReg, src: HostReg) -> EmitResult {
        Self::usable(dst)?;
        self.assembler.mov(Self::gp32(dst)?, Self::gp32(src)?).map_err(asm_err)
    }

    fn alu32(&mut self, op: AluOp, dst: HostReg, lhs: HostReg, rhs: HostReg) -> EmitResult {
        Self::usable(dst)?;
        let (base, complement) = X86Alu::lower(op);
        let (dst, lhs, mut rhs) = (Self::gp32(dst)?, Self::gp32(lhs)?, Self::gp32(rhs)?);

        if complement {
            self.assembler.mov(r11d, rhs).map_err(asm_err)?;
            self.assembler.not(r11d).map_err(asm_err)?;
            rhs = r11d;
        }
        if dst == rhs && dst != lhs {
            if base.commutes() {
                return self.op32(base, dst, lhs);
            }
            self.assembler.mov(r11d, rhs).map_err(asm_err)?;
            rhs = r11d;
        }
        self.copy32(dst, lhs)?;
        self.op32(base, dst, rhs)
    }

    fn alu32_imm(&mut self, op: AluOp, dst: HostReg, lhs: HostReg, imm: u32) -> EmitResult {
        Self::usable(dst)?;
        let (base, complement) = X86Alu::lower(op);
        let imm = if complement { !imm } else { imm };
        let dst32 = Self::gp32(dst)?;
        self.copy32(dst32, Self::gp32(lhs)?)?;
        self.op32_imm(base, dst32, imm as i32)
    }

    fn alu64(&mut self, op: AluOp, dst: HostReg, lhs: HostReg, rhs: HostReg) -> EmitResult {
        Self::usable(dst)?;
        let (base, complement) = X86Alu::lower(op);
        let (dst, lhs, mut rhs) = (Self::gp64(dst)?, Self::gp64(lhs)?, Self::gp64(rhs)?);

        if complement {
            self.assembler.mov(r11, rhs).map_err(asm_err)?;
            self.assembler.not(r11).map_err(asm_err)?;
            rhs = r11;
        }
        if dst == rhs && dst != lhs {
            if base.commutes() {
                return self.op64(base, dst, lhs);
            }
            self.assembler.mov(r11, rhs).map_err(asm_err)?;
            rhs = r11;
        }
        self.copy64(dst, lhs)?;
        self.op64(base, dst, rhs)
    }

    fn alu64_imm(&mut self, op: AluOp, dst: HostReg, lhs: HostReg, imm: u64) -> EmitResult {
        Self::usable(dst)?;
        let (base, complement) = X86Alu::lower(op);
        let imm = if complement { !imm } else { imm };
        let dst64 = Self::gp64(dst)?;
        self.copy64(dst64, Self::gp64(lhs)?)?;

        match i32::try_from(imm as i64) {
            Ok(small) => self.op64_imm(base, dst64, small),
            Err(_) => {
                self.assembler.mov(r11, imm as i64).map_err(asm_err)?;
                self.op64(base, dst64, r11)
            }
        }
    }

    fn not32(&mut self, dst: HostReg, src: HostReg) -> EmitResult {
        Self::usable(dst)?;
        let dst = Self::gp32(dst)?;
        self.copy32(dst, Self::gp32(src)?)?;
        self.assembler.not(dst).map_err(asm_err)
    }

    fn sub_from_zero32(&mut self, dst: HostReg, src: HostReg) -> EmitResult {
        Self::usable(dst)?;
        let dst = Self::gp32(dst)?;
        self.copy32(dst, Self::gp32(src)?)?;
        self.assembler.neg(dst).map_err(asm_err)
    }

    fn sign_extend32(&mut self, dst: HostReg, src: HostReg, bits: u8) -> EmitResult {
        Self::usable(dst)?;
        let dst32 = Self::gp32(dst)?;
        match bits {
            8 => self.assembler.movsx(dst32, Self::gp8(src)?).map_err(asm_err),
            16 => self.assembler.movsx(dst32, Self::gp16(src)?).map_err(asm_err),
            _ => Err(EncodingError::UnsupportedInstruction("sign extension width")),
        }
    }

    fn clz32(&mut self, dst: HostReg, src: HostReg) -> EmitResult {
        Self::usable(dst)?;
        self.assembler.lzcnt(Self::gp32(dst)?, Self::gp32(src)?).map_err(asm_err)
    }

    fn shr32_imm(&mut self, dst: HostReg, src: HostReg, amount: u8) -> EmitResult {
        Self::usable(dst)?;
        if amount >= 32 {
            return Err(EncodingError::UnsupportedInstruction("shift amount"));
        }
        let dst = Self::gp32(dst)?;
        self.copy32(dst, Self::gp32(src)?)?;
        self.assembler.shr(dst, amount as i32).map_err(asm_err)
    }

    fn sign_extend_32_to_64(&mut self, dst: HostReg, src: HostReg) -> EmitResult {
        Self::usable(dst)?;
        self.assembler.movsxd(Self::gp64(dst)?, Self::gp32(src)?).map_err(asm_err)
    }

    fn zero_extend_32_to_64(&mut self, dst: HostReg, src: HostReg) -> EmitResult {
        Self::usable(dst)?;
        // A 32-bit mov clears the upper half, even onto itself.
        self.assembler.mov(Self::gp32(dst)?, Self::gp32(src)?).map_err(asm_err)
    }

    fn load32(&mut self, dst: HostReg, offset: i32) -> EmitResult {
        Self::usable(dst)?;
        self.assembler.mov(Self::gp32(dst)?, Self::mem32(offset)).map_err(asm_err)
    }

    fn store32(&mut self, src: HostReg, offset: i32) -> EmitResult {
        self.assembler.mov(Self::mem32(offset), Self::gp32(src)?).map_err(asm_err)
    }

    fn store32_imm(&mut self, imm: u32, offset: i32) -> EmitResult {
        self.assembler.mov(Self::mem32(offset), imm as i32).map_err(asm_err)
    }

    fn load64(&mut self, dst: HostReg, offset: i32) -> EmitResult {
        Self::usable(dst)?;
        self.assembler.mov(Self::gp64(dst)?, Self::mem64(offset)).map_err(asm_err)
    }

    fn store64(&mut self, src: HostReg, offset: i32) -> EmitResult {
        self.assembler.mov(Self::mem64(offset), Self::gp64(src)?).map_err(asm_err)
    }

    fn load32_indexed(&mut self, dst: HostReg, index: HostReg, offset: i32) -> EmitResult {
        Self::usable(dst)?;
        let mem = Self::mem32_indexed(Self::gp64(index)?, offset);
        self.assembler.mov(Self::gp32(dst)?, mem).map_err(asm_err)
    }

    fn store32_indexed(&mut self, src: HostReg, index: HostReg, offset: i32) -> EmitResult {
        let mem = Self::mem32_indexed(Self::gp64(index)?, offset);
        self.assembler.mov(mem, Self::gp32(src)?).map_err(asm_err)
    }

    fn cmp32(&mut self, lhs: HostReg, rhs: HostReg) -> EmitResult {
        self.assembler.cmp(Self::gp32(lhs)?, Self::gp32(rhs)?).map_err(asm_err)
    }

    fn cmp32_imm(&mut self, lhs: HostReg, imm: i32) -> EmitResult {
        self.assembler.cmp(Self::gp32(lhs)?, imm).map_err(asm_err)
    }

    fn cmp64_zero(&mut self, reg: HostReg) -> EmitResult {
        self.assembler.cmp(Self::gp64(reg)?, 0i32).map_err(asm_err)
    }

    fn branch(&mut self, cond: JumpCondition) -> EmitResult<Fixup> {
        let (fixup, label) = self.new_label();
        self.jcc(cond, label)?;
        Ok(fixup)
    }

    fn branch_to(&mut self, cond: JumpCondition, target: Fixup) -> EmitResult {
        let label = self.open_label(target)?;
        self.jcc(cond, label)
    }

    fn jump(&mut self) -> EmitResult<Fixup> {
        let (fixup, label) = self.new_label();
        self.assembler.jmp(label).map_err(asm_err)?;
        Ok(fixup)
    }

    fn test_bit64_branch(&mut self, reg: HostReg, bit: u8, jump_if_set: bool) -> EmitResult<Fixup> {
        if bit >= 64 {
            return Err(EncodingError::UnsupportedInstruction("bit index"));
        }
        self.assembler.bt(Self::gp64(reg)?, bit as i32).map_err(asm_err)?;
        let (fixup, label) = self.new_label();
        if jump_if_set {
            self.assembler.jb(label).map_err(asm_err)?;
        } else {
            self.assembler.jae(label).map_err(asm_err)?;
        }
        Ok(fixup)
    }

    fn branch_if_zero32(&mut self, reg: HostReg, jump_if_zero: bool) -> EmitResult<Fixup> {
        let reg = Self::gp32(reg)?;
        self.assembler.test(reg, reg).map_err(asm_err)?;
        let (fixup, label) = self.new_label();
        if jump_if_zero {
            self.assembler.je(label).map_err(asm_err)?;
        } else {
            self.assembler.jne(label).map_err(asm_err)?;
        }
        Ok(fixup)
    }

    fn set_jump_target(&mut self, target: Fixup) -> EmitResult {
        let mut label = self.open_label(target)?;
        let here = self.assembler.instructions().len();
        if self.label_at == Some(here) {
            self.assembler.nop().map_err(asm_err)?;
        }
        self.assembler.set_label(&mut label).map_err(asm_err)?;
        self.labels[target.0 as usize] = label;
        self.placed[target.0 as usize] = true;
        self.label_at = Some(self.assembler.instructions().len());
        Ok(())
    }

    fn exit_to_dispatcher(&mut self, kind: ExitKind) -> EmitResult {
        self.assembler.mov(eax, kind as u32 as i32).map_err(asm_err)?;
        self.assembler.ret().map_err(asm_err)
    }

    fn call_interpreter(&mut self, inst: u32) -> EmitResult {
        // Every cache register has been flushed and released before this call,
        // so clobbering the caller-saved set is fine.
        let a = &mut self.assembler;
        a.mov(rdi, r15).map_err(asm_err)?;
        a.mov(esi, inst as i32).map_err(asm_err)?;
        a.mov(rax, self.interpreter_entry as i64).map_err(asm_err)?;
        a.sub(rsp, 8).map_err(asm_err)?;
        a.call(rax).map_err(asm_err)?;
        a.add(rsp, 8).map_err(asm_err)
    }

    fn instruction_count(&self) -> usize {
        self.assembler.instructions().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, IntelFormatter, Mnemonic};

    fn decode(code: &[u8]) -> Vec<Instruction> {
        let mut decoder = Decoder::with_ip(64, code, DEFAULT_CODE_BASE, DecoderOptions::NONE);
        let mut out = Vec::new();
        while decoder.can_decode() {
            out.push(decoder.decode());
        }
        out
    }

    fn text(code: &[u8]) -> Vec<String> {
        let mut formatter = IntelFormatter::new();
        decode(code)
            .iter()
            .map(|inst| {
                let mut line = String::new();
                formatter.format(inst, &mut line);
                line
            })
            .collect()
    }

    fn h(id: u8) -> HostReg {
        HostReg::new(id)
    }

    #[test]
    fn test_state_relative_moves() {
        let mut emit = X64Emitter::new(0).unwrap();
        emit.load32(h(0), 0x0c).unwrap();
        emit.store32(h(0), 0x10).unwrap();
        emit.store32_imm(0xdead_beef, 0x14).unwrap();
        emit.load64(h(1), 0x88).unwrap();
        emit.exit_to_dispatcher(ExitKind::Exception).unwrap();
        let lines = text(&emit.finalize(DEFAULT_CODE_BASE).unwrap());

        assert_eq!(lines[0], "mov eax,[r15+0Ch]");
        assert_eq!(lines[1], "mov [r15+10h],eax");
        assert_eq!(lines[2], "mov dword ptr [r15+14h],0DEADBEEFh");
        assert_eq!(lines[3], "mov rcx,[r15+88h]");
        assert_eq!(lines[4], "mov eax,1");
        assert_eq!(lines[5], "ret");
    }

    #[test]
    fn test_subtract_into_right_operand_uses_temp() {
        let mut emit = X64Emitter::new(0).unwrap();
        emit.alu32(AluOp::Sub, h(1), h(0), h(1)).unwrap();
        let insts = decode(&emit.finalize(DEFAULT_CODE_BASE).unwrap());
        let mnemonics: Vec<_> = insts.iter().map(|i| i.mnemonic()).collect();
        assert_eq!(mnemonics, [Mnemonic::Mov, Mnemonic::Mov, Mnemonic::Sub]);
        assert_eq!(insts[0].op0_register(), iced_x86::Register::R11D);
    }

    #[test]
    fn test_commutative_op_into_right_operand_swaps() {
        let mut emit = X64Emitter::new(0).unwrap();
        emit.alu32(AluOp::Xor, h(1), h(0), h(1)).unwrap();
        assert_eq!(emit.instruction_count(), 1);
        let lines = text(&emit.finalize(DEFAULT_CODE_BASE).unwrap());
        assert_eq!(lines, ["xor ecx,eax"]);
    }

    #[test]
    fn test_complemented_operand() {
        let mut emit = X64Emitter::new(0).unwrap();
        emit.alu32(AluOp::OrNot, h(2), h(3), h(6)).unwrap();
        let lines = text(&emit.finalize(DEFAULT_CODE_BASE).unwrap());
        assert_eq!(lines, ["mov r11d,esi", "not r11d", "mov edx,ebx", "or edx,r11d"]);
    }

    #[test]
    fn test_wide_immediate_goes_through_temp() {
        let mut emit = X64Emitter::new(0).unwrap();
        emit.alu64_imm(AluOp::And, h(0), h(0), !(1u64 << 61)).unwrap();
        emit.alu64_imm(AluOp::Sub, h(0), h(0), 7).unwrap();
        let insts = decode(&emit.finalize(DEFAULT_CODE_BASE).unwrap());
        assert_eq!(insts.len(), 3);
        assert_eq!(insts[0].mnemonic(), Mnemonic::Mov);
        assert_eq!(insts[1].mnemonic(), Mnemonic::And);
        assert_eq!(insts[2].mnemonic(), Mnemonic::Sub);
    }

    #[test]
    fn test_reserved_registers_rejected() {
        let mut emit = X64Emitter::new(0).unwrap();
        assert_eq!(emit.mov_imm32(STATE_REG, 1), Err(EncodingError::InvalidRegister(STATE_REG)));
        assert_eq!(emit.load32(TEMP_REG, 0), Err(EncodingError::InvalidRegister(TEMP_REG)));
        assert!(matches!(emit.mov_imm32(h(16), 1), Err(EncodingError::InvalidRegister(_))));
    }

    #[test]
    fn test_branches_resolve_forward() {
        let mut emit = X64Emitter::new(0).unwrap();
        emit.load32(h(0), 0).unwrap();
        let skip = emit.branch_if_zero32(h(0), true).unwrap();
        let other = emit.test_bit64_branch(h(0), 61, false).unwrap();
        emit.mov_imm32(h(0), 5).unwrap();
        emit.set_jump_target(skip).unwrap();
        emit.set_jump_target(other).unwrap();
        emit.exit_to_dispatcher(ExitKind::Normal).unwrap();

        let insts = decode(&emit.finalize(DEFAULT_CODE_BASE).unwrap());
        let mnemonics: Vec<_> = insts.iter().map(|i| i.mnemonic()).collect();
        assert_eq!(
            mnemonics,
            [
                Mnemonic::Mov,
                Mnemonic::Test,
                Mnemonic::Je,
                Mnemonic::Bt,
                Mnemonic::Jae,
                Mnemonic::Mov,
                Mnemonic::Nop,
                Mnemonic::Mov,
                Mnemonic::Ret
            ]
        );
        assert_eq!(insts[2].near_branch_target(), insts[6].ip());
        assert_eq!(insts[4].near_branch_target(), insts[7].ip());
    }

    #[test]
    fn test_fixup_misuse() {
        let mut emit = X64Emitter::new(0).unwrap();
        assert_eq!(emit.set_jump_target(Fixup(0)), Err(EncodingError::UnknownFixup(Fixup(0))));
        let target = emit.jump().unwrap();
        assert_eq!(emit.finalize(DEFAULT_CODE_BASE), Err(EncodingError::UnknownFixup(target)));
        emit.set_jump_target(target).unwrap();
        assert_eq!(emit.set_jump_target(target), Err(EncodingError::UnknownFixup(target)));
    }

    #[test]
    fn test_interpreter_call_sequence() {
        let mut emit = X64Emitter::new(0x7fff_1234_5678).unwrap();
        emit.call_interpreter(0x7c03_2000).unwrap();
        let insts = decode(&emit.finalize(DEFAULT_CODE_BASE).unwrap());
        assert_eq!(insts.len(), 6);
        assert_eq!(insts[2].immediate64(), 0x7fff_1234_5678);
        assert_eq!(insts[4].mnemonic(), Mnemonic::Call);
    }

    #[test]
    fn test_extensions_and_clz() {
        let mut emit = X64Emitter::new(0).unwrap();
        emit.sign_extend32(h(0), h(6), 8).unwrap();
        emit.sign_extend32(h(1), h(1), 16).unwrap();
        emit.sign_extend_32_to_64(h(2), h(2)).unwrap();
        emit.clz32(h(3), h(0)).unwrap();
        assert!(emit.sign_extend32(h(0), h(0), 4).is_err());
        let lines = text(&emit.finalize(DEFAULT_CODE_BASE).unwrap());
        assert_eq!(lines, ["movsx eax,sil", "movsx ecx,cx", "movsxd rdx,edx", "lzcnt ebx,eax"]);
    }
}

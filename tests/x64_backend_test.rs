//! Native x86-64 output for whole blocks, decoded back with iced-x86.

use std::cell::Cell;
use std::rc::Rc;

use bumpalo::Bump;
use iced_x86::{Decoder, DecoderOptions, Instruction, Mnemonic, OpKind, Register};
use object::{Object, ObjectSymbol};
use ppcjit::core::{JitConfig, JitResult, JitSession};
use ppcjit::jit::{FlushMode, HostEmitter, SiblingCache};
use ppcjit::ppc::inst::encode;
use ppcjit::x64::{block_symbol, compile_block, compile_block_with, write_object, DEFAULT_CODE_BASE};

fn decode(code: &[u8]) -> Vec<Instruction> {
    let mut decoder = Decoder::with_ip(64, code, DEFAULT_CODE_BASE, DecoderOptions::NONE);
    let mut out = Vec::new();
    while decoder.can_decode() {
        let inst = decoder.decode();
        assert!(!inst.is_invalid(), "invalid instruction at {:#x}", inst.ip());
        out.push(inst);
    }
    out
}

fn every_handler() -> Vec<u32> {
    vec![
        encode::addi(3, 4, 100),
        encode::addis(5, 3, -2),
        encode::ori(6, 5, 0xff),
        encode::oris(7, 6, 0x8000),
        encode::xori(8, 7, 1),
        encode::xoris(9, 8, 0xffff),
        encode::andi_rc(10, 9, 0xf0f0),
        encode::andis_rc(11, 10, 0x0ff0),
        encode::logical(encode::SUBOP_NAND, 12, 11, 10, true),
        encode::logical(encode::SUBOP_ORC, 13, 12, 3, false),
        encode::extsb(14, 13, true),
        encode::extsh(15, 14, false),
        encode::cntlzw(16, 15, true),
        encode::neg(17, 16, false, true),
        encode::cmp(1, 17, 3),
        encode::cmpl(2, 17, 3),
        encode::cmpi(3, 17, -5),
        encode::cmpli(4, 17, 0),
        encode::tw(0x12, 17, 3),
        encode::twi(0x08, 17, 40),
        encode::mfmsr(18),
        encode::mcrf(5, 1),
        encode::mfsr(19, 2),
        encode::mtsr(3, 19),
        encode::mfsrin(20, 17),
        encode::mtsrin(20, 17),
        encode::mtmsr(20),
    ]
}

#[test]
fn every_handler_assembles_to_valid_code() {
    let arena = Bump::new();
    let session = JitSession::new(&arena);
    let words = every_handler();

    let block = compile_block(&session, &JitConfig::default(), &words, 0x8000_3100).unwrap();
    assert_eq!(block.guest_len as usize, words.len());

    let insts = decode(block.code);
    assert_eq!(insts.last().map(Instruction::mnemonic), Some(Mnemonic::Ret));

    for inst in &insts {
        for i in 0..inst.op_count() {
            if inst.op_kind(i) == OpKind::Memory {
                assert_eq!(inst.memory_base(), Register::R15, "{inst} at {:#x}", inst.ip());
            }
        }
        assert_ne!(inst.op0_register(), Register::R15, "{inst}");
    }
}

#[test]
fn exits_set_their_kind_before_returning() {
    let arena = Bump::new();
    let session = JitSession::new(&arena);
    let block = compile_block(&session, &JitConfig::default(), &[encode::tw(0x04, 3, 4)], 0).unwrap();
    let insts = decode(block.code);

    let rets: Vec<usize> = insts.iter().enumerate().filter(|(_, i)| i.mnemonic() == Mnemonic::Ret).map(|(n, _)| n).collect();
    assert_eq!(rets.len(), 2, "trap exit and block exit");
    let kinds: Vec<u32> = rets
        .iter()
        .map(|&n| {
            let set = &insts[n - 1];
            assert_eq!(set.op0_register(), Register::EAX);
            set.immediate32()
        })
        .collect();
    assert!(kinds.contains(&0) && kinds.contains(&1), "{kinds:?}");
}

#[test]
fn declined_instruction_calls_interpreter_entry() {
    let arena = Bump::new();
    let session = JitSession::new(&arena);
    let config = JitConfig { interpreter_entry: 0x7fff_1234_5678, ..JitConfig::default() };
    let block = compile_block(&session, &config, &[encode::cmpl(0, 3, 4), encode::addi(3, 3, 1)], 0x40).unwrap();
    let insts = decode(block.code);

    let call = insts.iter().position(|i| i.mnemonic() == Mnemonic::Call).expect("no call");
    assert_eq!(insts[call].op0_register(), Register::RAX);
    assert!(insts[..call].iter().any(|i| i.mnemonic() == Mnemonic::Mov
        && i.op0_register() == Register::RAX
        && i.immediate64() == 0x7fff_1234_5678));
    assert!(insts[..call].iter().any(|i| i.mnemonic() == Mnemonic::Mov
        && i.op0_register() == Register::ESI
        && i.immediate32() == encode::cmpl(0, 3, 4)));
    assert!(insts[..call].iter().any(|i| i.mnemonic() == Mnemonic::Mov
        && i.op0_register() == Register::RDI
        && i.op1_register() == Register::R15));
}

struct CountingSibling(Rc<Cell<usize>>);

impl SiblingCache for CountingSibling {
    fn flush(&mut self, _: &mut dyn HostEmitter, _: FlushMode) -> JitResult<()> {
        self.0.set(self.0.get() + 1);
        Ok(())
    }
}

#[test]
fn sibling_cache_flushes_with_interpreter_calls_and_exits() {
    let arena = Bump::new();
    let session = JitSession::new(&arena);
    let count = Rc::new(Cell::new(0));
    let words = [encode::addi(3, 0, 1), encode::cmpl(0, 3, 4), encode::addi(4, 3, 1)];

    compile_block_with(&session, &JitConfig::default(), Some(Box::new(CountingSibling(count.clone()))), &words, 0)
        .unwrap();
    assert!(count.get() >= 2, "flushed {} time(s)", count.get());
}

#[test]
fn session_collects_blocks_into_object() {
    let arena = Bump::new();
    let session = JitSession::new(&arena);
    let config = JitConfig::default();
    let starts = [0x8000_0000u32, 0x8000_0040, 0x8000_0100];
    let blocks: Vec<_> = starts
        .iter()
        .map(|&pc| compile_block(&session, &config, &[encode::addi(3, 3, 1), encode::cmpi(0, 3, 9)], pc).unwrap())
        .collect();

    assert_eq!(session.block_count(), 3);
    assert_eq!(session.block(0x8000_0040).map(|b| b.code.len()), Some(blocks[1].code.len()));
    assert_eq!(session.stats().blocks, 3);

    let bytes = write_object(&blocks).unwrap();
    let file = object::File::parse(&*bytes).unwrap();
    let names: Vec<String> = file.symbols().filter_map(|s| s.name().ok().map(str::to_owned)).collect();
    for pc in starts {
        assert!(names.contains(&block_symbol(pc)), "{names:?}");
    }
}

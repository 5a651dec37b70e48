//! x86-64 block compilation and object output.
//!
//! Bridges the [`Translator`] with [`X64Emitter`]: one call translates a guest
//! block, assembles it and records the bytes in the [`JitSession`] arena.
//! Recorded blocks can also be written out as an ELF relocatable with one
//! `ppc_block_<address>` text symbol per block.

use object::write::{Object, StandardSection, Symbol, SymbolSection};
use object::{Architecture, BinaryFormat, Endianness, SymbolFlags, SymbolKind, SymbolScope};

use crate::core::config::JitConfig;
use crate::core::error::JitResult;
use crate::core::session::{BlockRecord, JitSession};
use crate::jit::{SiblingCache, Translator};

use super::encoder::{X64Emitter, DEFAULT_CODE_BASE};

/// Translate and assemble one block, storing the code in `session`.
pub fn compile_block<'arena>(
    session: &JitSession<'arena>,
    config: &JitConfig,
    words: &[u32],
    start_pc: u32,
) -> JitResult<BlockRecord<'arena>> {
    compile_block_with(session, config, None, words, start_pc)
}

/// As [`compile_block`], with a sibling register cache flushed alongside the
/// integer one.
pub fn compile_block_with<'arena>(
    session: &JitSession<'arena>,
    config: &JitConfig,
    sibling: Option<Box<dyn SiblingCache>>,
    words: &[u32],
    start_pc: u32,
) -> JitResult<BlockRecord<'arena>> {
    let emitter = X64Emitter::new(config.interpreter_entry)?;
    let mut translator = Translator::new(emitter, config.clone());
    if let Some(sibling) = sibling {
        translator = translator.with_sibling(sibling);
    }

    let guest_len = translator.translate_block(words, start_pc)?;
    let (mut emitter, stats) = translator.finish();
    let code = emitter.finalize(DEFAULT_CODE_BASE)?;
    log::debug!("block {start_pc:#010x}: {} byte(s) of x86-64", code.len());

    Ok(session.record_block(start_pc, guest_len as u32, &code, &stats))
}

/// Symbol name used for a block in object output.
pub fn block_symbol(start_pc: u32) -> String {
    format!("ppc_block_{start_pc:08x}")
}

/// Write blocks into an x86-64 ELF relocatable object.
///
/// Interpreter calls use absolute addresses, so the text needs no relocations.
pub fn write_object(blocks: &[BlockRecord<'_>]) -> Result<Vec<u8>, object::write::Error> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text = obj.section_id(StandardSection::Text);

    for block in blocks {
        let offset = obj.append_section_data(text, block.code, 16);
        obj.add_symbol(Symbol {
            name: block_symbol(block.start_pc).into_bytes(),
            value: offset,
            size: block.code.len() as u64,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(text),
            flags: SymbolFlags::None,
        });
    }

    obj.write()
}

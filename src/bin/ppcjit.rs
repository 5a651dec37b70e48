//! Block translation driver.
//!
//! Translates one block of PowerPC instruction words and prints the host code,
//! either as recorded host ops or as x86-64 disassembly.

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use bumpalo::Bump;
use clap::{Parser, ValueEnum};
use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, IntelFormatter};

use ppcjit::core::{JitConfig, JitSession};
use ppcjit::host_ir::{HostMachine, OpRecorder};
use ppcjit::jit::Translator;
use ppcjit::ppc::{decode, Inst, PpcState};
use ppcjit::x64::{compile_block, write_object, DEFAULT_CODE_BASE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Recorded host operations.
    Ops,
    /// x86-64 machine code.
    X64,
}

#[derive(Parser, Debug)]
#[command(name = "ppcjit", about = "Translate a block of PowerPC instructions to host code")]
struct Args {
    /// Instruction words in hex (0x prefix optional)
    words: Vec<String>,

    /// Read whitespace-separated hex words from a file
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Guest address of the first word
    #[arg(long, value_parser = parse_hex, default_value = "0x80003100")]
    pc: u32,

    #[arg(long, value_enum, default_value_t = Backend::Ops)]
    backend: Backend,

    /// Execute the recorded ops against a zeroed guest state
    #[arg(long, action = clap::ArgAction::SetTrue)]
    run: bool,

    /// Initial register value for --run, e.g. r3=0x10
    #[arg(long = "set", value_name = "rN=VALUE", value_parser = parse_assignment)]
    set: Vec<(usize, u32)>,

    /// Write the x86-64 code as an ELF relocatable
    #[arg(long, value_name = "PATH")]
    emit_object: Option<PathBuf>,

    /// Send integer instructions to the interpreter
    #[arg(long, action = clap::ArgAction::SetTrue)]
    disable_integer: bool,

    /// Send system register instructions to the interpreter
    #[arg(long, action = clap::ArgAction::SetTrue)]
    disable_system_registers: bool,
}

fn parse_hex(text: &str) -> Result<u32, String> {
    let digits = text.trim().trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("{text:?}: {e}"))
}

fn parse_assignment(text: &str) -> Result<(usize, u32), String> {
    let (reg, value) = text.split_once('=').ok_or_else(|| format!("{text:?}: expected rN=VALUE"))?;
    let index: usize = reg
        .trim()
        .trim_start_matches('r')
        .parse()
        .map_err(|_| format!("{reg:?}: not a register"))?;
    if index >= 32 {
        return Err(format!("{reg:?}: no such register"));
    }
    Ok((index, parse_hex(value)?))
}

fn collect_words(args: &Args) -> Result<Vec<u32>, Box<dyn Error>> {
    let mut words = Vec::new();
    if let Some(path) = &args.file {
        for token in fs::read_to_string(path)?.split_whitespace() {
            words.push(parse_hex(token)?);
        }
    }
    for token in &args.words {
        words.push(parse_hex(token)?);
    }
    if words.is_empty() {
        return Err("no instruction words given".into());
    }
    Ok(words)
}

fn print_guest(words: &[u32], pc: u32) {
    for (i, &word) in words.iter().enumerate() {
        let name = decode(Inst(word)).map_or("?", |info| info.name);
        println!("{:08x}: {word:08x}  {name}", pc.wrapping_add(4 * i as u32));
    }
    println!();
}

fn print_x64(code: &[u8]) {
    let mut decoder = Decoder::with_ip(64, code, DEFAULT_CODE_BASE, DecoderOptions::NONE);
    let mut formatter = IntelFormatter::new();
    let mut instruction = Instruction::default();
    let mut line = String::new();
    while decoder.can_decode() {
        decoder.decode_out(&mut instruction);
        line.clear();
        formatter.format(&instruction, &mut line);
        let start = (instruction.ip() - DEFAULT_CODE_BASE) as usize;
        let bytes: String = code[start..start + instruction.len()].iter().map(|b| format!("{b:02x}")).collect();
        println!("{:6x}  {bytes:<24} {line}", instruction.ip());
    }
}

fn run_ops(args: &Args, config: &JitConfig, words: &[u32]) -> Result<(), Box<dyn Error>> {
    let mut translator = Translator::new(OpRecorder::new(), config.clone());
    let len = translator.translate_block(words, args.pc)?;
    let (recorder, stats) = translator.finish();
    print!("{}", recorder.listing());
    println!("\n{len} guest instruction(s): {stats}");

    if args.run {
        let mut state = PpcState::default();
        for &(reg, value) in &args.set {
            state.gpr[reg] = value;
        }
        let mut machine = HostMachine::new(|state: &mut PpcState, inst: Inst| {
            log::warn!("interpreter not available, skipping {:#010x} at {:#010x}", inst.hex(), state.pc);
        });
        let exit = machine.run(recorder.ops(), &mut state)?;
        println!("exit {exit:?} pc={:#010x}", state.pc);
        for (reg, value) in state.gpr.iter().enumerate().filter(|(_, value)| **value != 0) {
            println!("  r{reg:<2} = {value:#010x}");
        }
        for field in 0..8 {
            if state.cr_val[field] != 0 {
                println!("  cr{field} = {:04b}", state.cr_field(field));
            }
        }
        if state.exceptions != 0 {
            println!("  exceptions = {:#x}", state.exceptions);
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();
    let words = collect_words(&args)?;

    let mut config = JitConfig::from_env();
    config.integer_off |= args.disable_integer;
    config.system_registers_off |= args.disable_system_registers;

    print_guest(&words, args.pc);

    if args.backend == Backend::Ops {
        run_ops(&args, &config, &words)?;
    }

    if args.backend == Backend::X64 || args.emit_object.is_some() {
        let arena = Bump::new();
        let session = JitSession::new(&arena);
        let block = compile_block(&session, &config, &words, args.pc)?;

        if args.backend == Backend::X64 {
            print_x64(block.code);
            println!("\n{}", session.stats());
        }
        if let Some(path) = &args.emit_object {
            fs::write(path, write_object(&[block])?)?;
            log::info!("wrote {}", path.display());
        }
    }

    Ok(())
}

//! Shared helpers for the integration tests: translation through the op
//! recorder, execution on the host machine, and a straightforward reference
//! interpreter the translated code is checked against.

#![allow(dead_code)]

use ppcjit::core::{JitConfig, SessionStats};
use ppcjit::host_ir::{HostMachine, OpRecorder};
use ppcjit::jit::{pack_cr_value, ExitKind, Translator};
use ppcjit::ppc::state::{EXCEPTION_PROGRAM, CR_SO_PACKED_BIT};
use ppcjit::ppc::{decode, Inst, Op, PpcState};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn translator(config: JitConfig) -> Translator<OpRecorder> {
    init_logging();
    Translator::new(OpRecorder::new(), config)
}

/// Translate one block and hand back the recorded ops with the block counters.
pub fn translate(config: JitConfig, words: &[u32], pc: u32) -> (OpRecorder, SessionStats) {
    let mut t = translator(config);
    t.translate_block(words, pc).expect("translation failed");
    t.finish()
}

/// Translate and execute one block; declined instructions run in the reference interpreter.
pub fn run_jit(config: JitConfig, words: &[u32], pc: u32, state: &mut PpcState) -> ExitKind {
    let (recorder, _) = translate(config, words, pc);
    let mut machine = HostMachine::new(|state: &mut PpcState, inst: Inst| reference_execute(state, inst));
    machine.run(recorder.ops(), state).expect("host machine failed")
}

/// Translate and execute one block, failing if anything reaches the interpreter.
pub fn run_native(words: &[u32], pc: u32, state: &mut PpcState) -> ExitKind {
    let (recorder, _) = translate(JitConfig::default(), words, pc);
    let mut machine =
        HostMachine::new(|_: &mut PpcState, inst: Inst| panic!("{inst:?} reached the interpreter"));
    machine.run(recorder.ops(), state).expect("host machine failed")
}

fn record(state: &mut PpcState, field: usize, value: i64) {
    let so = state.cr_val[field] & (1 << CR_SO_PACKED_BIT) != 0;
    state.cr_val[field] = pack_cr_value(value, so);
}

fn order(ordering: std::cmp::Ordering) -> i64 {
    ordering as i8 as i64
}

fn traps(to: u32, a: u32, b: u32) -> bool {
    let (sa, sb) = (a as i32, b as i32);
    (to & 0x10 != 0 && sa < sb)
        || (to & 0x08 != 0 && sa > sb)
        || (to & 0x04 != 0 && a == b)
        || (to & 0x02 != 0 && a < b)
        || (to & 0x01 != 0 && a > b)
}

/// Execute one instruction directly on the guest state.
pub fn reference_execute(state: &mut PpcState, inst: Inst) {
    let info = decode(inst).unwrap_or_else(|| panic!("reference cannot run {inst:?}"));
    let (d, a, b) = (inst.rd(), inst.ra(), inst.rb());
    let simm = inst.simm_16() as i32 as u32;
    let uimm = inst.uimm();
    let ra_or_zero = if a == 0 { 0 } else { state.gpr[a] };
    let rs = state.gpr[inst.rs()];

    let mut rc_result = None;
    match info.op {
        Op::Addi => state.gpr[d] = ra_or_zero.wrapping_add(simm),
        Op::Addis => state.gpr[d] = ra_or_zero.wrapping_add(simm << 16),
        Op::Ori => state.gpr[a] = rs | uimm,
        Op::Oris => state.gpr[a] = rs | (uimm << 16),
        Op::Xori => state.gpr[a] = rs ^ uimm,
        Op::Xoris => state.gpr[a] = rs ^ (uimm << 16),
        Op::Andi => {
            state.gpr[a] = rs & uimm;
            rc_result = Some(state.gpr[a]);
        }
        Op::Andis => {
            state.gpr[a] = rs & (uimm << 16);
            rc_result = Some(state.gpr[a]);
        }
        Op::Bool => {
            let rb = state.gpr[b];
            state.gpr[a] = match inst.subop10() {
                28 => rs & rb,
                60 => rs & !rb,
                124 => !(rs | rb),
                284 => !(rs ^ rb),
                316 => rs ^ rb,
                412 => rs | !rb,
                444 => rs | rb,
                476 => !(rs & rb),
                other => panic!("bad logical subop {other}"),
            };
        }
        Op::Extsb => state.gpr[a] = rs as i8 as i32 as u32,
        Op::Extsh => state.gpr[a] = rs as i16 as i32 as u32,
        Op::Cntlzw => state.gpr[a] = rs.leading_zeros(),
        Op::Neg => state.gpr[d] = state.gpr[a].wrapping_neg(),
        Op::Cmp => {
            let ordering = (state.gpr[a] as i32).cmp(&(state.gpr[b] as i32));
            record(state, inst.crfd(), order(ordering));
        }
        Op::Cmpl => {
            let ordering = state.gpr[a].cmp(&state.gpr[b]);
            record(state, inst.crfd(), order(ordering));
        }
        Op::Cmpi => {
            let ordering = (state.gpr[a] as i32).cmp(&(simm as i32));
            record(state, inst.crfd(), order(ordering));
        }
        Op::Cmpli => {
            let ordering = state.gpr[a].cmp(&uimm);
            record(state, inst.crfd(), order(ordering));
        }
        Op::Tw | Op::Twi => {
            let rhs = if info.op == Op::Twi { simm } else { state.gpr[b] };
            if traps(inst.to(), state.gpr[a], rhs) {
                state.exceptions |= EXCEPTION_PROGRAM;
            }
        }
        Op::Mtmsr => state.msr = rs,
        Op::Mfmsr => state.gpr[d] = state.msr,
        Op::Mcrf => state.cr_val[inst.crfd()] = state.cr_val[inst.crfs()],
        Op::Mfsr => state.gpr[d] = state.sr[inst.sr()],
        Op::Mtsr => state.sr[inst.sr()] = rs,
        Op::Mfsrin => state.gpr[d] = state.sr[(state.gpr[b] >> 28) as usize],
        Op::Mtsrin => state.sr[(state.gpr[b] >> 28) as usize] = rs,
        Op::Interpret => panic!("reference cannot run branch {inst:?}"),
    }

    if inst.rc() && matches!(info.op, Op::Bool | Op::Extsb | Op::Extsh | Op::Cntlzw | Op::Neg) {
        let target = if info.op == Op::Neg { d } else { a };
        rc_result = Some(state.gpr[target]);
    }
    if let Some(value) = rc_result {
        record(state, 0, value as i32 as i64);
    }
}

/// Run a block in the reference interpreter with the block exit conventions:
/// a raised exception leaves `pc` on the trapping instruction, `mtmsr` ends
/// the block at the following address.
pub fn reference_run(words: &[u32], start_pc: u32, state: &mut PpcState) -> ExitKind {
    let mut pc = start_pc;
    for &word in words {
        let inst = Inst(word);
        reference_execute(state, inst);
        if state.exceptions != 0 {
            state.pc = pc;
            state.npc = pc;
            return ExitKind::Exception;
        }
        pc = pc.wrapping_add(4);
        if decode(inst).is_some_and(|info| info.op == Op::Mtmsr) {
            break;
        }
    }
    state.pc = pc;
    state.npc = pc;
    ExitKind::Normal
}

/// Architecturally visible state: packed condition words are compared by
/// their decoded bits.
pub fn assert_same_state(jit: &PpcState, reference: &PpcState, context: &str) {
    assert_eq!(jit.gpr, reference.gpr, "gprs differ: {context}");
    for field in 0..8 {
        assert_eq!(
            jit.cr_field(field),
            reference.cr_field(field),
            "cr{field} differs: {context}"
        );
    }
    assert_eq!(jit.msr, reference.msr, "msr differs: {context}");
    assert_eq!(jit.sr, reference.sr, "segment registers differ: {context}");
    assert_eq!(jit.exceptions, reference.exceptions, "exceptions differ: {context}");
    assert_eq!(jit.pc, reference.pc, "pc differs: {context}");
}

/// Small deterministic generator for instruction mixes.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed ^ 0x9e37_79b9_7f4a_7c15)
    }

    pub fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    pub fn below(&mut self, n: u32) -> u32 {
        self.next() % n
    }

    pub fn pick<T: Copy>(&mut self, items: &[T]) -> T {
        items[self.below(items.len() as u32) as usize]
    }
}

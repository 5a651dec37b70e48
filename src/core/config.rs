//! Translator configuration.
//!
//! Defaults match the x86-64 backend; overrides come from the environment
//! (`PPCJIT_*`) or from the command line tool.

use super::register_file::{HostReg, RegBitSet};

/// Host registers the x86-64 backend lets the register cache use:
/// rax, rcx, rdx, rbx, rsi, rdi, r8, r9, r10, r12, r13, r14.
/// rsp and rbp are the stack, r11 is the emitter temporary, r15 holds the state pointer.
pub const X64_ALLOCATABLE: RegBitSet = RegBitSet::from_mask(0b0111_0111_1100_1111);

/// Default guest instructions per block.
pub const DEFAULT_MAX_BLOCK_INSTRUCTIONS: usize = 64;

#[derive(Debug, Clone)]
pub struct JitConfig {
    /// Host registers available to the guest register cache.
    pub allocatable: RegBitSet,
    /// Guest instructions translated before a block is cut.
    pub max_block_instructions: usize,
    /// Send every integer instruction to the interpreter.
    pub integer_off: bool,
    /// Send every system-register instruction (except mtmsr) to the interpreter.
    pub system_registers_off: bool,
    /// Address of the `extern "C" fn(*mut PpcState, u32)` interpreter entry.
    pub interpreter_entry: u64,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            allocatable: X64_ALLOCATABLE,
            max_block_instructions: DEFAULT_MAX_BLOCK_INSTRUCTIONS,
            integer_off: false,
            system_registers_off: false,
            interpreter_entry: 0,
        }
    }
}

impl JitConfig {
    /// Defaults with `PPCJIT_INTEGER_OFF`, `PPCJIT_SYSTEM_REGISTERS_OFF` and
    /// `PPCJIT_MAX_BLOCK` applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(flag) = std::env::var("PPCJIT_INTEGER_OFF").ok().as_deref().and_then(parse_flag) {
            config.integer_off = flag;
        }
        if let Some(flag) = std::env::var("PPCJIT_SYSTEM_REGISTERS_OFF")
            .ok()
            .as_deref()
            .and_then(parse_flag)
        {
            config.system_registers_off = flag;
        }
        if let Ok(value) = std::env::var("PPCJIT_MAX_BLOCK") {
            match value.trim().parse::<usize>() {
                Ok(max) if max > 0 => config.max_block_instructions = max,
                _ => log::warn!("ignoring PPCJIT_MAX_BLOCK={value:?}"),
            }
        }
        log::debug!("jit config: {config:?}");
        config
    }

    /// Restrict the register cache to the given host registers.
    pub fn with_allocatable(mut self, regs: &[HostReg]) -> Self {
        self.allocatable = RegBitSet::from_regs(regs);
        self
    }
}

/// Parse a boolean switch value.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allocatable_excludes_reserved() {
        let config = JitConfig::default();
        for reserved in [4u8, 5, 11, 15] {
            assert!(!config.allocatable.contains(HostReg::new(reserved)));
        }
        assert_eq!(config.allocatable.count(), 12);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" On "), Some(true));
        assert_eq!(parse_flag("false"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_with_allocatable() {
        let config = JitConfig::default().with_allocatable(&[HostReg::new(0), HostReg::new(1)]);
        assert_eq!(config.allocatable.count(), 2);
    }
}

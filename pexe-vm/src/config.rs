//! The executor's configuration surface (spec §6): everything `pexe-run`
//! assembles from flags and hands the core as a plain value. The core never
//! parses a flag itself — see `SPEC_FULL.md` §7.

use std::collections::BTreeSet;

use pexe_types::DEFAULT_MEMORY_SIZE;

/// A named trace category from the original source's `--trace=<flag>,...`
/// surface (`pnacl.c`'s option table). `pexe-run` parses these from
/// repeated `--trace` flags; the core only ever sees the resulting set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display, strum::EnumIter)]
pub enum TraceFlag {
    Memory,
    Execute,
    Irt,
    Function,
    Block,
    Instruction,
}

impl std::str::FromStr for TraceFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MEMORY" => Ok(TraceFlag::Memory),
            "EXECUTE" => Ok(TraceFlag::Execute),
            "IRT" => Ok(TraceFlag::Irt),
            "FUNCTION" => Ok(TraceFlag::Function),
            "BLOCK" => Ok(TraceFlag::Block),
            "INSTRUCTION" => Ok(TraceFlag::Instruction),
            other => Err(format!("unknown trace flag {other:?}")),
        }
    }
}

/// The executor's only configuration surface (spec §6's flag-shape-agnostic
/// option object).
#[derive(Debug, Clone)]
pub struct Config {
    pub memory_size: u32,
    pub argv: Vec<String>,
    pub env: Vec<String>,
    pub run: bool,
    pub dedupe_phi: bool,
    pub trace_flags: BTreeSet<TraceFlag>,
    pub repeat_load: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            memory_size: DEFAULT_MEMORY_SIZE,
            argv: Vec::new(),
            env: Vec::new(),
            run: true,
            dedupe_phi: true,
            trace_flags: BTreeSet::new(),
            repeat_load: 1,
        }
    }
}

impl Config {
    pub fn traces(&self, flag: TraceFlag) -> bool {
        self.trace_flags.contains(&flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_flag_parses_case_insensitively() {
        assert_eq!("irt".parse::<TraceFlag>().unwrap(), TraceFlag::Irt);
        assert_eq!("BLOCK".parse::<TraceFlag>().unwrap(), TraceFlag::Block);
        assert!("bogus".parse::<TraceFlag>().is_err());
    }

    #[test]
    fn default_config_runs_with_one_load() {
        let cfg = Config::default();
        assert!(cfg.run);
        assert_eq!(cfg.repeat_load, 1);
    }
}

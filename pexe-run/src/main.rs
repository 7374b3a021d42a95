//! Command-line front end for the pexe interpreter.
//!
//! Parses flags into a [`pexe_vm::Config`], loads and analyzes a PEXE file,
//! and runs it to completion, exiting with the guest's own exit code.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pexe_vm::{Config, TraceFlag};

#[derive(Parser, Debug)]
#[command(name = "pexe-run", about = "Run a PNaCl PEXE bitcode file")]
struct Args {
    /// Path to the `.pexe` file to load.
    pexe: PathBuf,

    /// Total linear memory size in bytes.
    #[arg(long, default_value_t = pexe_types::DEFAULT_MEMORY_SIZE)]
    memory_size: u32,

    /// Arguments passed to the guest's `argv`, after the pexe path itself.
    #[arg(long = "arg")]
    argv: Vec<String>,

    /// `K=V` environment entries passed to the guest.
    #[arg(long = "env")]
    env: Vec<String>,

    /// Copy the host's environment into the guest instead of `--env`.
    #[arg(long)]
    use_host_env: bool,

    /// Parse and analyze the module but don't execute it.
    #[arg(long)]
    no_run: bool,

    /// Disable phi-assign dedupe on multi-case switch edges.
    #[arg(long)]
    no_dedupe_phi_nodes: bool,

    /// Re-run the loaded module this many times (for measuring load cost).
    #[arg(long, default_value_t = 1)]
    repeat_load: u32,

    /// Enable a named trace category (MEMORY, EXECUTE, IRT, FUNCTION, BLOCK,
    /// INSTRUCTION); may be repeated.
    #[arg(long = "trace", value_name = "FLAG")]
    trace_flags: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;

    let data = std::fs::read(&args.pexe).with_context(|| format!("reading {}", args.pexe.display()))?;

    let repeats = config.repeat_load.max(1);
    for i in 0..repeats {
        let (module, analyzed) = pexe_reader::load(&data, config.dedupe_phi).context("parsing pexe module")?;
        let last = i + 1 == repeats;
        if !config.run || !last {
            continue;
        }
        let Some(entry) = find_entry(&module) else {
            bail!("module declares no `_start` function");
        };
        let code = pexe_vm::run(module, analyzed, entry, config.clone())?;
        std::process::exit(code);
    }
    Ok(())
}

fn build_config(args: &Args) -> Result<Config> {
    let mut env = args.env.clone();
    if args.use_host_env {
        env.extend(std::env::vars().map(|(k, v)| format!("{k}={v}")));
    }
    for entry in &env {
        if !entry.contains('=') {
            bail!("--env entry {entry:?} is missing '='");
        }
    }
    let trace_flags = args
        .trace_flags
        .iter()
        .map(|s| s.parse::<TraceFlag>().map_err(|e| anyhow::anyhow!(e)))
        .collect::<Result<_>>()?;
    Ok(Config {
        memory_size: args.memory_size,
        argv: args.argv.clone(),
        env,
        run: !args.no_run,
        dedupe_phi: !args.no_dedupe_phi_nodes,
        trace_flags,
        repeat_load: args.repeat_load,
    })
}

fn find_entry(module: &pexe_reader::Module) -> Option<pexe_types::FunctionId> {
    module
        .functions
        .iter()
        .position(|f| f.name == "_start" && !f.is_declaration_only)
        .map(|i| pexe_types::FunctionId::new(i as u32))
}

//! Parses a PNaCl PEXE bitcode file into an SSA [`Module`], then analyzes
//! each function into the typed runtime instruction stream [`pexe_vm`]
//! executes directly.
//!
//! The pipeline is: [`bitstream`] (bit-level cursor + VBR) feeds
//! [`abbrev`]/[`record`] (abbreviation-aware record decoding), which
//! [`blocks`] turns into the pieces of [`ir::Module`] that [`reader`]
//! assembles. [`analyze`] then lowers each function to a
//! [`pexe_asm::RuntimeOp`] stream.

mod abbrev;
mod analyze;
mod bitstream;
mod blocks;
mod error;
mod ir;
mod record;
mod reader;

pub use analyze::{analyze_function, AnalyzedFunction};
pub use error::{AnalyzeError, BitstreamError};
pub use ir::{BasicBlock, Constant, Function, GlobalVar, Instruction, IntrinsicName, Module, Type};
pub use reader::parse_module;

/// Parse and fully analyze a PEXE file: every declared function gets its
/// [`AnalyzedFunction`], keyed by declaration order. `dedupe_phi` is
/// forwarded to [`analyze_function`] for every function analyzed.
pub fn load(data: &[u8], dedupe_phi: bool) -> Result<(Module, Vec<AnalyzedFunction>), LoadError> {
    let module = parse_module(data)?;
    let mut analyzed = Vec::with_capacity(module.functions.len());
    for function in &module.functions {
        if function.is_declaration_only {
            analyzed.push(AnalyzedFunction {
                value_types: Vec::new(),
                predecessors: Vec::new(),
                code: Vec::new(),
                block_offsets: Vec::new(),
            });
            continue;
        }
        analyzed.push(analyze::analyze_function(&module, function, dedupe_phi)?);
    }
    Ok((module, analyzed))
}

/// Either phase's failure, surfaced by [`load`].
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Bitstream(#[from] BitstreamError),
    #[error(transparent)]
    Analyze(#[from] AnalyzeError),
}

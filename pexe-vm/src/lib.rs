//! The pexe threaded interpreter: a PEXE [`pexe_reader::Module`] plus its
//! [`pexe_reader::AnalyzedFunction`]s in, a process exit code out.
//!
//! [`Executor`] owns the single linear [`Memory`] every simulated thread
//! shares, the cooperative [`Scheduler`] ring, and the IRT built-in table
//! ([`irt`]) that stands in for the host kernel.

mod config;
mod error;
mod executor;
mod frame;
mod irt;
mod memory;
mod thread;

pub use config::{Config, TraceFlag};
pub use error::{Fault, RuntimeError};
pub use executor::{CallTarget, Executor};
pub use frame::{CallFrame, Location};
pub use memory::{Layout, Memory};
pub use thread::{FutexState, Scheduler, Thread, ThreadId, ThreadState};

use pexe_reader::{AnalyzedFunction, Module};
use pexe_types::FunctionId;

/// Build an [`Executor`] for `module`, spawn its entry function as the main
/// thread, and run every thread to completion, returning the process exit
/// code (spec §6 "Exit code").
pub fn run(module: Module, analyzed: Vec<AnalyzedFunction>, entry: FunctionId, config: Config) -> Result<i32, Fault> {
    let mut exec = Executor::new(module, analyzed, config);
    exec.spawn_main(entry)?;
    exec.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pexe_asm::{Encoder, RuntimeOp};
    use pexe_reader::Function;
    use pexe_types::{BasicBlockId, BasicType, ValueId};

    #[test]
    fn run_executes_a_trivial_return() {
        let mut module = Module::default();
        module.functions.push(Function { num_args: 0, ..Default::default() });

        let mut enc = Encoder::new();
        enc.begin_block(BasicBlockId::new(0));
        enc.push(RuntimeOp::RetValue { ty: BasicType::I32, value: ValueId::new(0) });
        let code = enc.finish();

        let analyzed = AnalyzedFunction {
            value_types: vec![BasicType::I32],
            predecessors: vec![Vec::new()],
            code,
            block_offsets: vec![0],
        };

        let mut config = Config::default();
        config.memory_size = 64 * 1024;
        let mut exec = Executor::new(module, vec![analyzed], config);
        exec.spawn_main(FunctionId::new(0)).unwrap();
        // The frame's only value defaults to zero, so the expected exit is 0.
        let code = exec.run().unwrap();
        assert_eq!(code, 0);
    }
}

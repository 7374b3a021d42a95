//! The executor's fatal-fault taxonomy (spec §7): anything that halts the
//! dispatch loop outright rather than being surfaced to the guest as an
//! errno register value.

use pexe_types::{BasicBlockId, FunctionId, ValueId};

/// A contract violation the interpreter cannot recover from. Every variant
/// here corresponds to one "Fatal" row of the design's error table; an IRT
/// call failure is never one of these — it returns a [`pexe_types::Errno`]
/// instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("load/store at offset {offset} (size {size}) is out of bounds for a {memory_size}-byte memory")]
    OutOfBounds { offset: u32, size: u32, memory_size: u32 },
    #[error("access at offset {offset} falls inside the guard region (< {guard_size})")]
    GuardViolation { offset: u32, guard_size: u32 },
    #[error("stack overflow: stack pointer {stack_top} crossed the heap boundary at {heap_end}")]
    StackOverflow { stack_top: u32, heap_end: u32 },
    #[error("unreachable instruction executed in function {function:?} at block {block:?}")]
    Unreachable { function: FunctionId, block: BasicBlockId },
    #[error("call to unknown built-in id {0}")]
    UnknownBuiltin(u32),
    #[error("indirect call through {0:?} does not name a built-in or a function")]
    BadCallTarget(ValueId),
    #[error("longjmp referenced unknown jmpbuf id {0}")]
    UnknownJmpBuf(u32),
    #[error("switch/opcode specialization saw a value outside its legal range")]
    SpecializationMismatch,
    #[error("runtime instruction stream: {0}")]
    Stream(#[from] pexe_asm::StreamError),
    #[error("thread ring is empty; no runnable thread remains")]
    NoRunnableThread,
    #[error("`llvm.trap` executed")]
    Trap,
}

/// The `Result` error type for a single dispatch step (spec §8 "the errno
/// path never goes through `Result::Err`" — only fatal faults do).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(transparent)]
pub struct RuntimeError(#[from] pub Fault);

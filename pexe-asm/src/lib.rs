//! The dense, typed runtime instruction encoding produced by opcode
//! specialization (spec §4.4 step 6) and consumed directly by the executor's
//! dispatch loop (spec §4.5).
//!
//! Unlike the abstract, pre-lowering instruction set (one variant per opcode
//! *group*), every [`RuntimeOp`] here already knows its operand types: a
//! `binop` becomes `BINOP_ADD_INT32`, a `load` becomes `LOAD_DOUBLE`, and so
//! on. The dispatch loop therefore never branches on operand type at run
//! time — only on which [`RuntimeOp`] variant it fetched.
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod op;
mod stream;

pub use op::{AtomicRmwOp, BinOp, CastOp, CmpOp, Intrinsic, PhiAssign, RuntimeOp};
pub use stream::{apply_phi_assigns, Decoder, Encoder, PhiReader, StreamError};

/// Runtime instructions are packed so that every basic block begins on this
/// boundary; branch targets are stream byte offsets and are always a
/// multiple of this.
pub const BLOCK_ALIGN: usize = 4;

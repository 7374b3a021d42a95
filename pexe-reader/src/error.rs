//! Error types for the two reader phases: decoding the bitstream into a raw
//! module, and analyzing a function's instructions into a runtime stream.

use pexe_types::{BasicBlockId, FunctionId, TypeId, ValueId};

/// A malformed or truncated bitstream. Any of these aborts loading the
/// whole module — there is no partial-load recovery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitstreamError {
    #[error("unexpected end of stream at bit {bit_offset}, wanted {wanted_bits} more bits")]
    UnexpectedEof { bit_offset: u32, wanted_bits: u32 },

    #[error("VBR value did not terminate within 64 bits, starting near bit {bit_offset}")]
    VbrOverflow { bit_offset: u32 },

    #[error("char6 value {value} out of range at bit {bit_offset}")]
    InvalidChar6 { value: u32, bit_offset: u32 },

    #[error("magic number mismatch: expected 'PEXE' wrapper or raw bitcode magic, got {0:#010x}")]
    BadMagic(u32),

    #[error("block id {block_id} nested past the abbreviation width stack")]
    AbbrevWidthUnderflow { block_id: u32 },

    #[error("abbreviation id {0} has no definition in scope")]
    UndefinedAbbrev(u32),

    #[error("record code {code} is not valid in block {block_id}")]
    UnknownRecordCode { block_id: u32, code: u32 },

    #[error("record for code {code} is missing required operand {index}")]
    MissingOperand { code: u32, index: usize },

    #[error("type id {0:?} referenced before it was defined")]
    ForwardTypeRef(TypeId),

    #[error("value id {0:?} is out of range for the current scope")]
    UnknownValue(ValueId),

    #[error("END_BLOCK seen while no block was open")]
    UnbalancedBlockEnd,

    #[error("abbreviation definition exceeded the {0} operand limit")]
    TooManyAbbrevOps(usize),
}

/// A failure in the function analyzer: type inference, use-set
/// computation, or opcode lowering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyzeError {
    #[error("function {0:?} has no terminator in its last declared block")]
    MissingTerminator(FunctionId),

    #[error("operand {value:?} used in block {block:?} has no inferred result type")]
    UninferredType { value: ValueId, block: BasicBlockId },

    #[error("phi node in block {block:?} names predecessor {pred:?} which is not actually a predecessor")]
    PhiPredecessorMismatch { block: BasicBlockId, pred: BasicBlockId },

    #[error("phi {dest:?} in block {block:?} has conflicting incoming values from predecessor {pred:?}")]
    ConflictingPhiIncoming { block: BasicBlockId, pred: BasicBlockId, dest: ValueId },

    #[error("branch in block {0:?} targets a basic block outside the function")]
    BranchTargetOutOfRange(BasicBlockId),

    #[error("instruction stream encoding failed: {0}")]
    Stream(#[from] pexe_asm::StreamError),

    #[error("call to function {0:?} passes a mismatched argument count")]
    ArgCountMismatch(FunctionId),
}

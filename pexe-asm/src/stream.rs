//! Two-pass encoding of a function's [`RuntimeOp`] stream, and cursor-based
//! decoding of it.
//!
//! Pass one walks the analyzed basic blocks to compute each block's 4-byte
//! aligned start offset (spec §4.4 step 6, "compute offsets"). Pass two
//! re-walks them and emits each instruction, now able to resolve every
//! intra-function branch target to the absolute offset computed in pass one.

use alloc::vec::Vec;
use pexe_types::{BasicBlockId, ValueId};

use crate::op::{PhiAssign, RuntimeOp};
use crate::BLOCK_ALIGN;

/// Failure constructing or walking a runtime instruction stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// A branch referenced a basic block the encoder never assigned an
    /// offset to, i.e. a block outside the function being encoded.
    #[error("branch target references unknown basic block {0:?}")]
    UnknownBlock(BasicBlockId),
    /// [`Decoder::read_at`] was given an offset past the end of the stream,
    /// or landed mid-instruction.
    #[error("decode cursor {0} out of range for a stream of {1} bytes")]
    CursorOutOfRange(u32, usize),
}

/// Builds a function's runtime instruction stream from its analyzed basic
/// blocks.
///
/// Usage mirrors the two-pass description in the design: push every block's
/// instructions with [`Encoder::begin_block`] / [`Encoder::push`], call
/// [`Encoder::block_offset`] to resolve branch targets during the second
/// pass, and finish with [`Encoder::finish`].
#[derive(Debug, Default)]
pub struct Encoder {
    ops: Vec<RuntimeOp>,
    block_starts: Vec<(BasicBlockId, u32)>,
    len_words: u32,
}

impl Encoder {
    /// A fresh encoder with no blocks yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `block`'s instruction-stream start offset. Call once per block
    /// per pass, in block order, before pushing its instructions.
    ///
    /// The offset returned is 4-byte aligned, rounding up from whatever the
    /// previous block left behind, so branch targets always land on a
    /// [`BLOCK_ALIGN`] boundary as the design requires.
    pub fn begin_block(&mut self, block: BasicBlockId) -> u32 {
        let misalign = (self.len_words as usize) % BLOCK_ALIGN;
        if misalign != 0 {
            let pad = BLOCK_ALIGN - misalign;
            for _ in 0..pad {
                self.ops.push(RuntimeOp::Unreachable);
                self.len_words += 1;
            }
        }
        let offset = self.len_words;
        self.block_starts.push((block, offset));
        offset
    }

    /// Append one instruction, returning its own offset.
    pub fn push(&mut self, op: RuntimeOp) -> u32 {
        let offset = self.len_words;
        self.ops.push(op);
        self.len_words += 1;
        offset
    }

    /// Look up the start offset recorded for `block` in an earlier
    /// [`Encoder::begin_block`] call (normally from the first pass, reused
    /// while building the second).
    pub fn block_offset(&self, block: BasicBlockId) -> Result<u32, StreamError> {
        self.block_starts
            .iter()
            .find(|&&(id, _)| id == block)
            .map(|&(_, offset)| offset)
            .ok_or(StreamError::UnknownBlock(block))
    }

    /// Consume the encoder, yielding the finished instruction sequence.
    ///
    /// Each [`RuntimeOp`] here occupies one logical "word" of the stream;
    /// [`RuntimeOp::Br`]/[`RuntimeOp::BrInt1`]/[`RuntimeOp::Switch`] targets
    /// are the word offsets returned by [`Self::block_offset`] during
    /// encoding, already resolved — the decoder never needs the block table.
    pub fn finish(self) -> Vec<RuntimeOp> {
        self.ops
    }

    /// Number of instructions (including block-alignment padding) emitted so
    /// far.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing has been pushed yet.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Cursor-based, random-access view over a finished instruction stream,
/// used by the executor's dispatch loop (spec §4.5) to fetch the instruction
/// at the program counter and to jump on taken branches.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    ops: &'a [RuntimeOp],
}

impl<'a> Decoder<'a> {
    /// Wrap a finished stream for decoding.
    pub const fn new(ops: &'a [RuntimeOp]) -> Self {
        Self { ops }
    }

    /// Fetch the instruction at word offset `pc`.
    pub fn read_at(&self, pc: u32) -> Result<&'a RuntimeOp, StreamError> {
        self.ops
            .get(pc as usize)
            .ok_or(StreamError::CursorOutOfRange(pc, self.ops.len()))
    }

    /// Total number of words in the stream.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the stream is empty.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Apply a block of φ-assigns using the copy-then-write protocol (spec §4.4
/// step 3): every `source` is read from `before` before any `dest` is
/// written, so a cycle of φ-assigns (`%a = phi [%b, ...]`, `%b = phi [%a,
/// ...]`) resolves to a swap rather than clobbering itself.
pub fn apply_phi_assigns<R>(assigns: &[PhiAssign], mut read: R, mut write: impl FnMut(ValueId, R::Item))
where
    R: PhiReader,
{
    let staged: Vec<_> = assigns.iter().map(|a| (a.dest, read.read(a.source))).collect();
    for (dest, value) in staged {
        write(dest, value);
    }
}

/// Callback trait backing [`apply_phi_assigns`]'s read side, parameterized so
/// the executor can read straight out of its register file without this
/// crate knowing its representation.
pub trait PhiReader {
    /// The value type read for a source [`ValueId`].
    type Item;
    /// Read the current value bound to `id`.
    fn read(&mut self, id: ValueId) -> Self::Item;
}

impl<F, T> PhiReader for F
where
    F: FnMut(ValueId) -> T,
{
    type Item = T;
    fn read(&mut self, id: ValueId) -> T {
        self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::BinOp;
    use pexe_types::BasicType;

    fn dummy_binop(dest: u32) -> RuntimeOp {
        RuntimeOp::Binop {
            op: BinOp::Add,
            ty: BasicType::I32,
            dest: ValueId::new(dest),
            lhs: ValueId::new(0),
            rhs: ValueId::new(1),
        }
    }

    #[test]
    fn blocks_align_to_four_words() {
        let mut enc = Encoder::new();
        let b0 = BasicBlockId::new(0);
        let b1 = BasicBlockId::new(1);

        let off0 = enc.begin_block(b0);
        assert_eq!(off0, 0);
        enc.push(dummy_binop(2));
        enc.push(dummy_binop(3));
        enc.push(dummy_binop(4));

        let off1 = enc.begin_block(b1);
        assert_eq!(off1 % BLOCK_ALIGN as u32, 0);
        assert!(off1 >= 3);
        enc.push(RuntimeOp::RetVoid);

        let ops = enc.finish();
        assert_eq!(&ops[off1 as usize], &RuntimeOp::RetVoid);
    }

    #[test]
    fn unknown_block_offset_errors() {
        let enc = Encoder::new();
        assert_eq!(
            enc.block_offset(BasicBlockId::new(9)),
            Err(StreamError::UnknownBlock(BasicBlockId::new(9)))
        );
    }

    #[test]
    fn decoder_reads_back_pushed_instructions() {
        let mut enc = Encoder::new();
        enc.begin_block(BasicBlockId::new(0));
        enc.push(dummy_binop(5));
        enc.push(RuntimeOp::RetVoid);
        let ops = enc.finish();

        let dec = Decoder::new(&ops);
        assert_eq!(dec.len(), 2);
        assert_eq!(dec.read_at(1).unwrap(), &RuntimeOp::RetVoid);
        assert!(matches!(
            dec.read_at(2),
            Err(StreamError::CursorOutOfRange(2, 2))
        ));
    }

    #[test]
    fn phi_assigns_swap_cleanly() {
        let a = ValueId::new(0);
        let b = ValueId::new(1);
        let regs = core::cell::RefCell::new([10i64, 20i64]);

        let assigns = [
            PhiAssign { dest: a, source: b },
            PhiAssign { dest: b, source: a },
        ];
        apply_phi_assigns(
            &assigns,
            |id: ValueId| regs.borrow()[id.index()],
            |id, v| regs.borrow_mut()[id.index()] = v,
        );

        assert_eq!(regs.borrow()[a.index()], 20);
        assert_eq!(regs.borrow()[b.index()], 10);
    }
}

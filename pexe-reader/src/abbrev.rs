//! Abbreviation definitions: per-block-id templates that let a record's
//! operands be packed more densely than the generic "VBR6 code, VBR6 count,
//! VBR6 operands..." unabbreviated form.

use crate::bitstream::BitReader;
use crate::error::BitstreamError;

/// The four builtin entry kinds every nested block can see at the current
/// abbreviation width, before any block-specific abbreviations are read.
pub const ENTRY_END_BLOCK: u32 = 0;
pub const ENTRY_ENTER_SUBBLOCK: u32 = 1;
pub const ENTRY_DEFINE_ABBREV: u32 = 2;
pub const ENTRY_UNABBREV_RECORD: u32 = 3;
pub const FIRST_APPLICATION_ABBREV: u32 = 4;

const MAX_ABBREV_OPS: usize = 10;

/// One operand slot in an abbreviation definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbbrevOp {
    /// Not read from the stream; the value is baked into the abbreviation.
    Literal(u64),
    /// A fixed-width field.
    Fixed(u32),
    /// A VBR-encoded field with the given chunk width.
    Vbr(u32),
    /// Introduces a VBR6 element count followed by that many elements of
    /// the *next* op in the abbreviation.
    Array,
    /// A 6-bit packed identifier character.
    Char6,
    /// A VBR6 length followed by that many raw bytes, 32-bit aligned.
    Blob,
}

/// A full abbreviation: an ordered list of operand encodings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abbreviation {
    pub ops: Vec<AbbrevOp>,
}

impl Abbreviation {
    /// Parse a `DEFINE_ABBREV` entry's body (the op count and each op
    /// encoding) straight off the bitstream.
    pub fn parse(reader: &mut BitReader<'_>) -> Result<Self, BitstreamError> {
        let num_ops = reader.read_vbr32(5)? as usize;
        if num_ops > MAX_ABBREV_OPS {
            return Err(BitstreamError::TooManyAbbrevOps(MAX_ABBREV_OPS));
        }
        let mut ops = Vec::with_capacity(num_ops);
        while ops.len() < num_ops {
            let is_literal = reader.read(1)? != 0;
            if is_literal {
                let value = reader.read_vbr64(8)?;
                ops.push(AbbrevOp::Literal(value));
                continue;
            }
            let encoding = reader.read(3)?;
            let op = match encoding {
                1 => AbbrevOp::Fixed(reader.read_vbr32(5)?),
                2 => AbbrevOp::Vbr(reader.read_vbr32(5)?),
                3 => AbbrevOp::Array,
                4 => AbbrevOp::Char6,
                5 => AbbrevOp::Blob,
                other => {
                    return Err(BitstreamError::UnknownRecordCode { block_id: u32::MAX, code: other })
                }
            };
            ops.push(op);
        }
        Ok(Self { ops })
    }
}

/// Abbreviations registered via BLOCKINFO for a given block id, applied to
/// every instance of that block in the module — plus whatever a block
/// defines locally via its own `DEFINE_ABBREV` entries.
#[derive(Debug, Default, Clone)]
pub struct BlockInfoAbbrevs {
    by_block_id: std::collections::HashMap<u32, Vec<Abbreviation>>,
}

impl BlockInfoAbbrevs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, block_id: u32, abbrev: Abbreviation) {
        self.by_block_id.entry(block_id).or_default().push(abbrev);
    }

    /// The BLOCKINFO-registered abbreviations for `block_id`, in
    /// definition order — these always precede any block-local ones.
    pub fn for_block(&self, block_id: u32) -> &[Abbreviation] {
        self.by_block_id.get(&block_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits_from_pattern(bits: &[(u32, u32)]) -> Vec<u8> {
        let mut out = vec![0u8; 64];
        let mut pos = 0usize;
        for &(value, width) in bits {
            for b in 0..width {
                if value & (1 << b) != 0 {
                    out[pos / 8] |= 1 << (pos % 8);
                }
                pos += 1;
            }
        }
        out.truncate((pos + 7) / 8);
        out
    }

    #[test]
    fn parses_a_simple_abbreviation() {
        // num_ops = 2 (VBR5), then one Fixed(8) op and one literal op.
        let data = bits_from_pattern(&[
            (2, 5),   // num_ops
            (0, 1),   // not literal
            (1, 3),   // encoding = Fixed
            (8, 5),   // width = 8
            (1, 1),   // literal
            (42, 8),  // literal value, VBR8 single chunk (no high bit)
        ]);
        let mut r = BitReader::new(&data);
        let abbrev = Abbreviation::parse(&mut r).unwrap();
        assert_eq!(abbrev.ops.len(), 2);
        assert_eq!(abbrev.ops[0], AbbrevOp::Fixed(8));
        assert_eq!(abbrev.ops[1], AbbrevOp::Literal(42));
    }

    #[test]
    fn blockinfo_abbrevs_scoped_by_block_id() {
        let mut table = BlockInfoAbbrevs::new();
        table.register(12, Abbreviation { ops: vec![AbbrevOp::Fixed(8)] });
        assert_eq!(table.for_block(12).len(), 1);
        assert!(table.for_block(99).is_empty());
    }
}

//! Reads one block-entry record — abbreviated or not — into a flat operand
//! list plus an optional trailing blob.
//!
//! Every record, abbreviated or not, is consumed down to this shape before
//! the block parsers in [`crate::blocks`] interpret it; this keeps the
//! abbreviation machinery isolated from record semantics.

use crate::abbrev::{AbbrevOp, Abbreviation, FIRST_APPLICATION_ABBREV};
use crate::bitstream::BitReader;
use crate::error::BitstreamError;

/// A decoded record: its code, its operand values, and (for `BLOB`
/// encodings) the trailing raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub code: u32,
    pub values: Vec<u64>,
    pub blob: Option<Vec<u8>>,
}

impl Record {
    pub fn get(&self, index: usize) -> Option<u64> {
        self.values.get(index).copied()
    }

    pub fn get_u32(&self, index: usize) -> Option<u32> {
        self.get(index).map(|v| v as u32)
    }

    pub fn get_i64_rotated(&self, index: usize) -> Option<i64> {
        self.get(index).map(pexe_types::decode_sign_rotated)
    }
}

/// Read the `UNABBREV_RECORD` wire form: `VBR6 code`, `VBR6 count`, then
/// `count` VBR6 operands.
pub fn read_unabbrev_record(reader: &mut BitReader<'_>) -> Result<Record, BitstreamError> {
    let code = reader.read_vbr32(6)?;
    let count = reader.read_vbr32(6)? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(reader.read_vbr64(6)?);
    }
    Ok(Record { code, values, blob: None })
}

/// Read a record using `abbrev_id` (already adjusted to be relative to
/// [`FIRST_APPLICATION_ABBREV`]) against the abbreviation definitions
/// visible in the current block.
pub fn read_abbreviated_record(
    reader: &mut BitReader<'_>,
    abbrev_id: u32,
    abbrevs: &[Abbreviation],
) -> Result<Record, BitstreamError> {
    let index = (abbrev_id - FIRST_APPLICATION_ABBREV) as usize;
    let abbrev = abbrevs
        .get(index)
        .ok_or(BitstreamError::UndefinedAbbrev(abbrev_id))?;

    let mut values = Vec::new();
    let mut blob = None;
    let mut op_index = 0usize;
    while op_index < abbrev.ops.len() {
        match abbrev.ops[op_index] {
            AbbrevOp::Literal(v) => {
                values.push(v);
                op_index += 1;
            }
            AbbrevOp::Fixed(width) => {
                values.push(reader.read(width)? as u64);
                op_index += 1;
            }
            AbbrevOp::Vbr(width) => {
                values.push(reader.read_vbr64(width)?);
                op_index += 1;
            }
            AbbrevOp::Char6 => {
                values.push(reader.read_char6()? as u64);
                op_index += 1;
            }
            AbbrevOp::Array => {
                let elt_op = abbrev
                    .ops
                    .get(op_index + 1)
                    .copied()
                    .ok_or(BitstreamError::TooManyAbbrevOps(op_index))?;
                let count = reader.read_vbr32(6)?;
                for _ in 0..count {
                    let v = match elt_op {
                        AbbrevOp::Literal(v) => v,
                        AbbrevOp::Fixed(width) => reader.read(width)? as u64,
                        AbbrevOp::Vbr(width) => reader.read_vbr64(width)?,
                        AbbrevOp::Char6 => reader.read_char6()? as u64,
                        AbbrevOp::Array | AbbrevOp::Blob => {
                            return Err(BitstreamError::UnknownRecordCode { block_id: u32::MAX, code: 0 })
                        }
                    };
                    values.push(v);
                }
                op_index += 2;
            }
            AbbrevOp::Blob => {
                let len = reader.read_vbr32(6)?;
                reader.align32()?;
                blob = Some(reader.read_bytes(len)?.to_vec());
                reader.align32()?;
                op_index += 1;
            }
        }
    }

    if values.is_empty() {
        return Err(BitstreamError::MissingOperand { code: abbrev_id, index: 0 });
    }
    let code = values.remove(0);
    Ok(Record { code: code as u32, values, blob })
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
    fn unabbrev_record_round_trips() {
        let data = bits_from_pattern(&[
            (7, 6),  // code
            (2, 6),  // count
            (1, 6),  // value[0]
            (9, 6),  // value[1]
        ]);
        let mut r = BitReader::new(&data);
        let rec = read_unabbrev_record(&mut r).unwrap();
        assert_eq!(rec.code, 7);
        assert_eq!(rec.values, vec![1, 9]);
    }

    #[test]
    fn abbreviated_record_with_literal_code() {
        let abbrevs = vec![Abbreviation {
            ops: vec![AbbrevOp::Literal(3), AbbrevOp::Fixed(4)],
        }];
        let data = bits_from_pattern(&[(5, 4)]);
        let mut r = BitReader::new(&data);
        let rec = read_abbreviated_record(&mut r, FIRST_APPLICATION_ABBREV, &abbrevs).unwrap();
        assert_eq!(rec.code, 3);
        assert_eq!(rec.values, vec![5]);
    }
}

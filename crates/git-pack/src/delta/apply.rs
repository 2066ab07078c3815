//! Expand a delta instruction stream against a base object.
//!
//! A delta is `[source_size: varint] [target_size: varint]` followed by a
//! sequence of copy/insert opcodes: the high bit of the opcode byte
//! selects a copy (the low 4 bits pick which offset bytes follow, the
//! next 3 which size bytes follow, little-endian, each present byte
//! optional); any other nonzero byte is an insert of that many literal
//! bytes. Opcode `0` is reserved and never appears in a real pack.

use super::read_varint;
use crate::PackError;

/// Walks a delta byte stream, tracking the read position against the
/// base object being expanded.
struct DeltaCursor<'a> {
    delta: &'a [u8],
    pos: usize,
}

impl<'a> DeltaCursor<'a> {
    fn new(delta: &'a [u8]) -> Self {
        Self { delta, pos: 0 }
    }

    fn take_varint(&mut self, what: &'static str) -> Result<usize, PackError> {
        let (value, consumed) = read_varint(&self.delta[self.pos..]).ok_or_else(|| PackError::InvalidDelta {
            offset: self.pos as u64,
            reason: format!("truncated {what}"),
        })?;
        self.pos += consumed;
        Ok(value)
    }

    fn take_byte(&mut self, what: &'static str) -> Result<u8, PackError> {
        let byte = *self.delta.get(self.pos).ok_or_else(|| PackError::InvalidDelta {
            offset: self.pos as u64,
            reason: format!("truncated {what}"),
        })?;
        self.pos += 1;
        Ok(byte)
    }

    fn take_slice(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], PackError> {
        let end = self.pos + len;
        let slice = self.delta.get(self.pos..end).ok_or_else(|| PackError::InvalidDelta {
            offset: self.pos as u64,
            reason: format!("truncated {what}"),
        })?;
        self.pos = end;
        Ok(slice)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.delta.len()
    }
}

/// One decoded delta opcode.
enum Instruction<'a> {
    /// Copy `size` bytes from `offset` in the base object.
    Copy { offset: usize, size: usize },
    /// Append these literal bytes.
    Insert(&'a [u8]),
}

/// Assemble a copy instruction's offset/size from the bitmask byte: each
/// set bit (low 4 for offset, next 3 for size) means one more
/// little-endian byte follows in the stream.
fn decode_copy(cursor: &mut DeltaCursor<'_>, mask: u8) -> Result<(usize, usize), PackError> {
    let mut offset: usize = 0;
    for shift in [0u32, 8, 16, 24] {
        let bit = 1u8 << (shift / 8);
        if mask & bit != 0 {
            offset |= (cursor.take_byte("copy offset")? as usize) << shift;
        }
    }

    let mut size: usize = 0;
    for shift in [0u32, 8, 16] {
        let bit = 1u8 << (4 + shift / 8);
        if mask & bit != 0 {
            size |= (cursor.take_byte("copy size")? as usize) << shift;
        }
    }
    if size == 0 {
        size = 0x10000;
    }

    Ok((offset, size))
}

fn next_instruction<'a>(cursor: &mut DeltaCursor<'a>) -> Result<Instruction<'a>, PackError> {
    let opcode = cursor.take_byte("opcode")?;
    if opcode & 0x80 != 0 {
        let (offset, size) = decode_copy(cursor, opcode & 0x7f)?;
        Ok(Instruction::Copy { offset, size })
    } else if opcode != 0 {
        let bytes = cursor.take_slice(opcode as usize, "insert data")?;
        Ok(Instruction::Insert(bytes))
    } else {
        Err(PackError::InvalidDelta {
            offset: (cursor.pos - 1) as u64,
            reason: "unexpected delta opcode 0".into(),
        })
    }
}

/// Apply a delta instruction stream to a base object, producing the target.
///
/// Validates both the declared source size against `base` and the
/// declared target size against the bytes actually produced, and bounds
/// checks every copy so it can never read past the end of `base`.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, PackError> {
    let mut cursor = DeltaCursor::new(delta);

    let source_size = cursor.take_varint("source size")?;
    let target_size = cursor.take_varint("target size")?;

    if source_size != base.len() {
        return Err(PackError::InvalidDelta {
            offset: 0,
            reason: format!("source size mismatch: delta says {source_size}, base is {}", base.len()),
        });
    }

    let mut output = Vec::with_capacity(target_size);

    while !cursor.is_at_end() {
        match next_instruction(&mut cursor)? {
            Instruction::Copy { offset, size } => {
                let end = offset.checked_add(size).ok_or_else(|| PackError::InvalidDelta {
                    offset: cursor.pos as u64,
                    reason: format!("copy offset/size overflow: offset={offset}, size={size}"),
                })?;
                let span = base.get(offset..end).ok_or_else(|| PackError::InvalidDelta {
                    offset: cursor.pos as u64,
                    reason: format!("copy out of bounds: offset={offset}, size={size}, base_len={}", base.len()),
                })?;
                output.extend_from_slice(span);
            }
            Instruction::Insert(bytes) => output.extend_from_slice(bytes),
        }
    }

    if output.len() != target_size {
        return Err(PackError::InvalidDelta {
            offset: 0,
            reason: format!("target size mismatch: delta says {target_size}, got {}", output.len()),
        });
    }

    Ok(output)
}

//! Bounds-checked big-endian cursor over class file bytes.

use thiserror::Error;

/// Structural problems found while decoding a class file
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected end of data at offset {offset} (need {needed} byte(s), {remaining} left)")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("{what} count {count} exceeds remaining {remaining} byte(s)")]
    CountOverflow {
        what: &'static str,
        count: usize,
        remaining: usize,
    },

    #[error("constant pool index {index} out of range")]
    BadIndex { index: u16 },

    #[error("constant pool entry {index} is not a {expected} constant")]
    WrongTag { index: u16, expected: &'static str },

    #[error("unknown constant pool tag {tag} at entry {index}")]
    UnknownTag { tag: u8, index: u16 },

    #[error("invalid modified UTF-8 in constant {index}")]
    BadUtf8 { index: u16 },
}

pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        if n > self.remaining() {
            return Err(ParseError::Truncated {
                offset: self.pos,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ParseError> {
        self.bytes(n).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, ParseError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, ParseError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Rejects a table whose declared length cannot fit in what is left,
    /// before any per-item allocation happens.
    pub fn ensure_count(
        &self,
        count: usize,
        min_item_size: usize,
        what: &'static str,
    ) -> Result<(), ParseError> {
        let needed = count.saturating_mul(min_item_size);
        if needed > self.remaining() {
            return Err(ParseError::CountOverflow {
                what,
                count,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }
}

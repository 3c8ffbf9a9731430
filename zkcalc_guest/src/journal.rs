//! Word-addressed journal encoding.
//!
//! Every value occupies whole little-endian 32-bit words: `u32` and `bool` take
//! one word, `u64`/`i64` take two (low word first), and strings are a length
//! word followed by the UTF-8 bytes zero-padded to the next word boundary.
//! This is the layout the zkVM uses for committed values, so a guest that
//! commits `to_bytes()` and one that commits field by field agree.

use alloc::{string::String, vec::Vec};

pub const WORD_SIZE: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JournalError {
    UnexpectedEnd { needed: usize, remaining: usize },
    InvalidBool(u32),
    InvalidUtf8,
    NonZeroPadding,
    TrailingBytes(usize),
}

impl core::fmt::Display for JournalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            JournalError::UnexpectedEnd { needed, remaining } => {
                write!(f, "journal ended early: needed {needed} bytes, {remaining} left")
            }
            JournalError::InvalidBool(word) => write!(f, "invalid bool word {word:#x}"),
            JournalError::InvalidUtf8 => write!(f, "string is not valid utf-8"),
            JournalError::NonZeroPadding => write!(f, "string padding is not zero"),
            JournalError::TrailingBytes(n) => write!(f, "{n} trailing bytes after journal"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct JournalWriter {
    bytes: Vec<u8>,
}

impl JournalWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_u32(value as u32)
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.write_u32(value as u32);
        self.write_u32((value >> 32) as u32)
    }

    pub fn write_i64(&mut self, value: i64) -> &mut Self {
        self.write_u64(value as u64)
    }

    pub fn write_str(&mut self, value: &str) -> &mut Self {
        self.write_u32(value.len() as u32);
        self.bytes.extend_from_slice(value.as_bytes());
        let padded = self.bytes.len().next_multiple_of(WORD_SIZE);
        self.bytes.resize(padded, 0);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

pub struct JournalReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> JournalReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], JournalError> {
        if self.remaining() < n {
            return Err(JournalError::UnexpectedEnd {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> Result<u32, JournalError> {
        let word = self.take(WORD_SIZE)?;
        Ok(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }

    pub fn read_bool(&mut self) -> Result<bool, JournalError> {
        match self.read_u32()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(JournalError::InvalidBool(other)),
        }
    }

    pub fn read_u64(&mut self) -> Result<u64, JournalError> {
        let low = self.read_u32()? as u64;
        let high = self.read_u32()? as u64;
        Ok(low | (high << 32))
    }

    pub fn read_i64(&mut self) -> Result<i64, JournalError> {
        self.read_u64().map(|v| v as i64)
    }

    pub fn read_string(&mut self) -> Result<String, JournalError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        let padding = self.take(len.next_multiple_of(WORD_SIZE) - len)?;
        if padding.iter().any(|b| *b != 0) {
            return Err(JournalError::NonZeroPadding);
        }
        core::str::from_utf8(bytes)
            .map(String::from)
            .map_err(|_| JournalError::InvalidUtf8)
    }

    /// Fails unless every byte has been consumed.
    pub fn finish(self) -> Result<(), JournalError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(JournalError::TrailingBytes(n)),
        }
    }
}

/// A value committed to the journal as one unit.
pub trait Journal: Sized {
    fn encode(&self, writer: &mut JournalWriter);

    fn decode(reader: &mut JournalReader<'_>) -> Result<Self, JournalError>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = JournalWriter::new();
        self.encode(&mut writer);
        writer.into_bytes()
    }

    /// Decodes a complete journal, rejecting trailing bytes.
    fn from_bytes(bytes: &[u8]) -> Result<Self, JournalError> {
        let mut reader = JournalReader::new(bytes);
        let value = Self::decode(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_is_two_words_low_first() {
        let mut w = JournalWriter::new();
        w.write_u64(0x0000_0002_0000_0001);
        assert_eq!(w.as_bytes(), &[1, 0, 0, 0, 2, 0, 0, 0]);
    }

    #[test]
    fn test_string_padding() {
        let mut w = JournalWriter::new();
        w.write_str("abcde");
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 4 + 8);
        assert_eq!(&bytes[..4], &[5, 0, 0, 0]);
        assert_eq!(&bytes[9..], &[0, 0, 0]);

        let mut r = JournalReader::new(&bytes);
        assert_eq!(r.read_string().unwrap(), "abcde");
        r.finish().unwrap();
    }

    #[test]
    fn test_reader_errors() {
        let mut r = JournalReader::new(&[1, 0]);
        assert_eq!(
            r.read_u32(),
            Err(JournalError::UnexpectedEnd {
                needed: 4,
                remaining: 2
            })
        );

        let mut r = JournalReader::new(&[2, 0, 0, 0]);
        assert_eq!(r.read_bool(), Err(JournalError::InvalidBool(2)));

        let mut r = JournalReader::new(&[1, 0, 0, 0, 9, 9, 9, 9]);
        r.read_u32().unwrap();
        assert_eq!(r.finish(), Err(JournalError::TrailingBytes(4)));
    }

    #[test]
    fn test_padding_must_be_zero() {
        let bytes = [1, 0, 0, 0, b'x', 0, 7, 0];
        let mut r = JournalReader::new(&bytes);
        assert_eq!(r.read_string(), Err(JournalError::NonZeroPadding));
    }
}

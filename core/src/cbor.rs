//! A minimal CBOR codec for node records and proof wires.
//!
//! Only the subset needed by the tree is supported: unsigned integers (major type 0), byte
//! strings (major type 2) and arrays (major type 4), all with definite lengths. Integers and
//! lengths must use the shortest encoding, so every value has exactly one byte representation.

use alloc::vec::Vec;

const MAJOR_UINT: u8 = 0;
const MAJOR_BYTES: u8 = 2;
const MAJOR_ARRAY: u8 = 4;

/// Errors encountered while decoding CBOR node records or proof wires.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unsupported CBOR major type {0}")]
    UnsupportedMajorType(u8),
    #[error("indefinite-length items are not supported")]
    IndefiniteLength,
    #[error("reserved additional information value {0}")]
    ReservedAdditionalInfo(u8),
    #[error("non-canonical integer encoding")]
    NonCanonical,
    #[error("expected major type {expected}, found {found}")]
    UnexpectedType { expected: u8, found: u8 },
    #[error("length {0} does not fit in memory")]
    LengthOverflow(u64),
    #[error("hash must be 32 bytes, got {0}")]
    InvalidHashLength(usize),
    #[error("unknown node tag {0}")]
    UnknownTag(u64),
    #[error("extension nodes are reserved and never encoded")]
    ReservedExtension,
    #[error("bitmap {bitmap:#06x} does not match {children} child hashes")]
    BitmapMismatch { bitmap: u16, children: usize },
    #[error("bitmap {0} out of range")]
    InvalidBitmap(u64),
    #[error("record has invalid arity {0}")]
    InvalidArity(usize),
    #[error("invalid compressed path")]
    InvalidPath,
    #[error("{0} trailing bytes after item")]
    TrailingBytes(usize),
}

/// Appends CBOR items to a buffer.
#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder::default()
    }

    fn header(&mut self, major: u8, value: u64) {
        let major = major << 5;
        if value < 24 {
            self.buf.push(major | value as u8);
        } else if value <= u8::MAX as u64 {
            self.buf.push(major | 24);
            self.buf.push(value as u8);
        } else if value <= u16::MAX as u64 {
            self.buf.push(major | 25);
            self.buf.extend_from_slice(&(value as u16).to_be_bytes());
        } else if value <= u32::MAX as u64 {
            self.buf.push(major | 26);
            self.buf.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buf.push(major | 27);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub fn uint(&mut self, value: u64) -> &mut Self {
        self.header(MAJOR_UINT, value);
        self
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.header(MAJOR_BYTES, bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Begin an array of `len` items. The caller must encode exactly `len` items afterwards.
    pub fn array(&mut self, len: usize) -> &mut Self {
        self.header(MAJOR_ARRAY, len as u64);
        self
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads CBOR items from a byte slice.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Decoder { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::UnexpectedEnd)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn header(&mut self) -> Result<(u8, u64), DecodeError> {
        let initial = self.take(1)?[0];
        let major = initial >> 5;
        if !matches!(major, MAJOR_UINT | MAJOR_BYTES | MAJOR_ARRAY) {
            return Err(DecodeError::UnsupportedMajorType(major));
        }

        let info = initial & 0x1F;
        let (value, min) = match info {
            0..=23 => return Ok((major, info as u64)),
            24 => (self.take(1)?[0] as u64, 24),
            25 => {
                let b = self.take(2)?;
                (u16::from_be_bytes([b[0], b[1]]) as u64, u8::MAX as u64 + 1)
            }
            26 => {
                let b = self.take(4)?;
                (
                    u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as u64,
                    u16::MAX as u64 + 1,
                )
            }
            27 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(self.take(8)?);
                (u64::from_be_bytes(buf), u32::MAX as u64 + 1)
            }
            31 => return Err(DecodeError::IndefiniteLength),
            reserved => return Err(DecodeError::ReservedAdditionalInfo(reserved)),
        };

        if value < min {
            return Err(DecodeError::NonCanonical);
        }
        Ok((major, value))
    }

    fn expect(&mut self, expected: u8) -> Result<u64, DecodeError> {
        let (found, value) = self.header()?;
        if found != expected {
            return Err(DecodeError::UnexpectedType { expected, found });
        }
        Ok(value)
    }

    fn len(value: u64) -> Result<usize, DecodeError> {
        usize::try_from(value).map_err(|_| DecodeError::LengthOverflow(value))
    }

    pub fn uint(&mut self) -> Result<u64, DecodeError> {
        self.expect(MAJOR_UINT)
    }

    pub fn bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = Self::len(self.expect(MAJOR_BYTES)?)?;
        self.take(len)
    }

    /// Read a byte string which must be exactly 32 bytes long.
    pub fn hash(&mut self) -> Result<[u8; 32], DecodeError> {
        let bytes = self.bytes()?;
        bytes
            .try_into()
            .map_err(|_| DecodeError::InvalidHashLength(bytes.len()))
    }

    /// Read an array header, returning the number of items.
    pub fn array(&mut self) -> Result<usize, DecodeError> {
        let len = Self::len(self.expect(MAJOR_ARRAY)?)?;
        // every item takes at least one byte.
        if len > self.remaining() {
            return Err(DecodeError::UnexpectedEnd);
        }
        Ok(len)
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Ensure the whole input was consumed.
    pub fn finish(self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

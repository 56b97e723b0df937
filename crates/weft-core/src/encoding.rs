//! Canonical encoding for wire structures.
//!
//! Everything that participates in signing MUST use canonical encoding so
//! that both ends of a connection produce the same byte representation.
//!
//! # Encoding Rules
//!
//! - **Integers**: little-endian
//! - **Fixed arrays**: elements encoded consecutively without length prefix
//! - **Variable sequences**: u32 length prefix followed by elements
//! - **Strings**: u32 byte length followed by UTF-8 bytes
//! - **Options**: 0x00 for None, 0x01 + value for Some
//! - **Structs**: fields encoded in declaration order without padding

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Errors during canonical decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough bytes to decode
    #[error("Insufficient bytes: expected {expected}, got {available}")]
    InsufficientBytes {
        /// Expected number of bytes
        expected: usize,
        /// Actually available bytes
        available: usize,
    },

    /// Invalid UTF-8 string
    #[error("Invalid UTF-8 string: {0}")]
    InvalidUtf8(String),

    /// Invalid enum or option tag
    #[error("Invalid tag: {0}")]
    InvalidTag(u32),

    /// Sequence too long
    #[error("Sequence too long: length {0} exceeds u32::MAX")]
    SequenceTooLong(usize),

    /// Custom decode error
    #[error("{0}")]
    Custom(String),
}

/// Trait for types that can be canonically encoded.
pub trait CanonicalEncode {
    /// Encodes the value to canonical byte representation.
    fn encode(&self, buf: &mut BytesMut);

    /// Returns the encoded byte representation.
    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Returns the encoded byte representation as a Vec.
    fn to_vec(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }
}

/// Trait for types that can be decoded from canonical encoding.
pub trait CanonicalDecode: Sized {
    /// Decodes from canonical byte representation.
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError>;

    /// Decodes from a byte slice.
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut buf = Bytes::copy_from_slice(bytes);
        Self::decode(&mut buf)
    }
}

fn ensure(buf: &Bytes, expected: usize) -> Result<(), DecodeError> {
    if buf.remaining() < expected {
        return Err(DecodeError::InsufficientBytes {
            expected,
            available: buf.remaining(),
        });
    }
    Ok(())
}

// ============================================================================
// Primitive implementations
// ============================================================================

impl CanonicalEncode for u8 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(*self);
    }
}

impl CanonicalDecode for u8 {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        ensure(buf, 1)?;
        Ok(buf.get_u8())
    }
}

impl CanonicalEncode for u16 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(*self);
    }
}

impl CanonicalDecode for u16 {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        ensure(buf, 2)?;
        Ok(buf.get_u16_le())
    }
}

impl CanonicalEncode for u32 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(*self);
    }
}

impl CanonicalDecode for u32 {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        ensure(buf, 4)?;
        Ok(buf.get_u32_le())
    }
}

impl CanonicalEncode for u64 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(*self);
    }
}

impl CanonicalDecode for u64 {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        ensure(buf, 8)?;
        Ok(buf.get_u64_le())
    }
}

impl<const N: usize> CanonicalEncode for [u8; N] {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(self);
    }
}

impl<const N: usize> CanonicalDecode for [u8; N] {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        ensure(buf, N)?;
        let mut arr = [0u8; N];
        buf.copy_to_slice(&mut arr);
        Ok(arr)
    }
}

impl CanonicalEncode for String {
    fn encode(&self, buf: &mut BytesMut) {
        let bytes = self.as_bytes();
        (bytes.len() as u32).encode(buf);
        buf.put_slice(bytes);
    }
}

impl CanonicalDecode for String {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        let len = u32::decode(buf)? as usize;
        ensure(buf, len)?;
        let bytes = buf.copy_to_bytes(len);
        String::from_utf8(bytes.to_vec()).map_err(|e| DecodeError::InvalidUtf8(e.to_string()))
    }
}

impl CanonicalEncode for Vec<u8> {
    fn encode(&self, buf: &mut BytesMut) {
        (self.len() as u32).encode(buf);
        buf.put_slice(self);
    }
}

impl CanonicalDecode for Vec<u8> {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        let len = u32::decode(buf)? as usize;
        ensure(buf, len)?;
        Ok(buf.copy_to_bytes(len).to_vec())
    }
}

impl<T: CanonicalEncode> CanonicalEncode for Option<T> {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            None => buf.put_u8(0),
            Some(value) => {
                buf.put_u8(1);
                value.encode(buf);
            }
        }
    }
}

impl<T: CanonicalDecode> CanonicalDecode for Option<T> {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        match u8::decode(buf)? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(buf)?)),
            tag => Err(DecodeError::InvalidTag(tag as u32)),
        }
    }
}

impl CanonicalEncode for Vec<String> {
    fn encode(&self, buf: &mut BytesMut) {
        (self.len() as u32).encode(buf);
        for item in self {
            item.encode(buf);
        }
    }
}

impl CanonicalDecode for Vec<String> {
    fn decode(buf: &mut Bytes) -> Result<Self, DecodeError> {
        let len = u32::decode(buf)? as usize;
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(String::decode(buf)?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_roundtrip() {
        let mut buf = BytesMut::new();
        42u8.encode(&mut buf);
        0xBEEFu16.encode(&mut buf);
        0xDEADBEEFu32.encode(&mut buf);
        u64::MAX.encode(&mut buf);

        let mut bytes = buf.freeze();
        assert_eq!(u8::decode(&mut bytes).unwrap(), 42);
        assert_eq!(u16::decode(&mut bytes).unwrap(), 0xBEEF);
        assert_eq!(u32::decode(&mut bytes).unwrap(), 0xDEADBEEF);
        assert_eq!(u64::decode(&mut bytes).unwrap(), u64::MAX);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_string_roundtrip() {
        let value = "quic://127.0.0.1:4242".to_string();
        let encoded = value.to_vec();
        assert_eq!(String::from_bytes(&encoded).unwrap(), value);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let value = vec![0u8, 1, 2, 3, 255];
        let encoded = value.to_vec();
        assert_eq!(Vec::<u8>::from_bytes(&encoded).unwrap(), value);
    }

    #[test]
    fn test_option_roundtrip() {
        let some: Option<u32> = Some(7);
        let none: Option<u32> = None;
        assert_eq!(Option::<u32>::from_bytes(&some.to_vec()).unwrap(), some);
        assert_eq!(Option::<u32>::from_bytes(&none.to_vec()).unwrap(), none);
    }

    #[test]
    fn test_insufficient_bytes() {
        let err = u32::from_bytes(&[1, 2]).unwrap_err();
        assert!(matches!(err, DecodeError::InsufficientBytes { .. }));
    }

    #[test]
    fn test_invalid_option_tag() {
        let err = Option::<u8>::from_bytes(&[7]).unwrap_err();
        assert_eq!(err, DecodeError::InvalidTag(7));
    }

    #[test]
    fn test_fixed_array_roundtrip() {
        let value = [0xABu8; 32];
        let encoded = value.to_vec();
        assert_eq!(encoded.len(), 32);
        assert_eq!(<[u8; 32]>::from_bytes(&encoded).unwrap(), value);
    }
}

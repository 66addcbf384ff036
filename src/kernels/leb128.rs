//! This module contains the pure, stateless kernels for LEB128 (Little-Endian
//! Base 128) variable-length integer encoding and decoding.
//!
//! The level and dictionary-index streams use it for RLE run headers, and the
//! dictionary analysis uses `encoded_len` to estimate index-stream sizes.

use num_traits::{PrimInt, Unsigned};
use std::io::Cursor;

use crate::error::TambakError;

//==================================================================================
// 1. Public API for Single-Value Operations
//==================================================================================

/// Encodes a single unsigned integer into a LEB128 byte sequence, writing to a buffer.
pub fn encode_one<T>(value: T, buffer: &mut Vec<u8>)
where
    T: PrimInt + Unsigned,
{
    let mut current = value.to_u128().unwrap_or(0);
    loop {
        let byte = (current & 0x7F) as u8;
        current >>= 7;
        if current == 0 {
            buffer.push(byte);
            break;
        }
        buffer.push(byte | 0x80);
    }
}

/// Returns the number of bytes `encode_one` would emit for `value`.
pub fn encoded_len<T>(value: T) -> usize
where
    T: PrimInt + Unsigned,
{
    let bits = (std::mem::size_of::<T>() * 8) as u32 - value.leading_zeros();
    if bits == 0 {
        1
    } else {
        bits.div_ceil(7) as usize
    }
}

/// Decodes a single unsigned integer from a LEB128 byte stream cursor.
pub fn decode_one<T>(cursor: &mut Cursor<&[u8]>) -> Result<T, TambakError>
where
    T: PrimInt + Unsigned,
{
    let mut result = T::zero();
    let mut shift = 0;
    let total_bits = std::mem::size_of::<T>() * 8;

    loop {
        let pos = cursor.position() as usize;
        let byte = *cursor
            .get_ref()
            .get(pos)
            .ok_or_else(|| TambakError::Leb128DecodeError("Unexpected end of buffer".to_string()))?;
        cursor.set_position((pos + 1) as u64);

        if shift >= total_bits {
            return Err(TambakError::Leb128DecodeError(
                "Integer overflow during decoding".to_string(),
            ));
        }
        let payload = T::from(byte & 0x7F).ok_or_else(|| {
            TambakError::Leb128DecodeError("Failed to create 7-bit payload from byte".to_string())
        })?;

        if byte & 0x80 == 0 {
            // The final byte must not carry bits beyond the width of T.
            if shift + 7 > total_bits && (byte >> (total_bits - shift)) > 0 {
                return Err(TambakError::Leb128DecodeError(
                    "Integer overflow during decoding".to_string(),
                ));
            }
            return Ok(result | (payload << shift));
        }

        result = result | (payload << shift);
        shift += 7;
    }
}

//==================================================================================
// 2. Unit Tests
//==================================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leb128_roundtrip_u32() {
        let original: Vec<u32> = vec![0, 1, 127, 128, 1000, 16_384, u32::MAX];
        let mut encoded = Vec::new();
        for &v in &original {
            encode_one(v, &mut encoded);
        }
        let mut cursor = Cursor::new(encoded.as_slice());
        let decoded: Vec<u32> = original
            .iter()
            .map(|_| decode_one::<u32>(&mut cursor).unwrap())
            .collect();
        assert_eq!(decoded, original);
        assert_eq!(cursor.position() as usize, encoded.len());
    }

    #[test]
    fn test_encoded_len_matches_encoding() {
        for v in [0u64, 1, 127, 128, 255, 16_383, 16_384, 1 << 35, u64::MAX] {
            let mut buf = Vec::new();
            encode_one(v, &mut buf);
            assert_eq!(encoded_len(v), buf.len(), "value {}", v);
        }
    }

    #[test]
    fn test_known_encoding() {
        let mut buf = Vec::new();
        encode_one(624_485u32, &mut buf);
        assert_eq!(buf, vec![0xE5, 0x8E, 0x26]);
    }

    #[test]
    fn test_decode_truncated_buffer() {
        let bytes = [0xE5u8, 0x8E];
        let mut cursor = Cursor::new(&bytes[..]);
        let err = decode_one::<u64>(&mut cursor).unwrap_err();
        assert!(err.to_string().contains("Unexpected end of buffer"));
    }

    #[test]
    fn test_decode_overflow_error() {
        let bytes = [0xFFu8, 0xFF, 0xFF, 0xFF, 0x7F];
        let mut cursor = Cursor::new(&bytes[..]);
        let result = decode_one::<u32>(&mut cursor);
        assert!(matches!(result, Err(TambakError::Leb128DecodeError(_))));
    }
}

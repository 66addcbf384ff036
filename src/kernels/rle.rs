//! This module contains the RLE/bit-packing hybrid encoder used for repetition
//! levels, definition levels and dictionary indices.
//!
//! The encoder always emits RLE runs, never bit-packed literal groups. Each run
//! is `varint(run_length << 1)` followed by the run value in `ceil(bit_width / 8)`
//! little-endian bytes. The encoder has two passes sharing the same run
//! boundaries: a size-estimation pass (`begin_prepare` / `prepare_value` /
//! `finish_prepare`) used to length-prefix a block, and a write pass
//! (`begin_write` / `write_value` / `finish_write`).

use std::io::Cursor;

use super::leb128;
use crate::error::TambakError;

//==================================================================================
// 1. Bit-Width Helpers
//==================================================================================

/// Returns the number of bits needed to represent `max_value` (0 for 0).
pub fn compute_bit_width(max_value: u64) -> u8 {
    (64 - max_value.leading_zeros()) as u8
}

/// Bit width for dictionary indices over a vocabulary of `size` entries.
///
/// Never zero for a non-empty vocabulary, as a zero key width means PLAIN.
pub fn dictionary_bit_width(size: usize) -> u8 {
    if size == 0 {
        return 0;
    }
    compute_bit_width(size as u64 - 1).max(1)
}

//==================================================================================
// 2. Encoder
//==================================================================================

#[derive(Debug, Clone)]
pub struct RleBpEncoder {
    byte_width: usize,
    byte_count: usize,
    run_count: usize,
    current_run_count: u32,
    last_value: u32,
}

impl RleBpEncoder {
    pub fn new(bit_width: u8) -> Self {
        Self {
            byte_width: (bit_width as usize).div_ceil(8),
            byte_count: 0,
            run_count: 0,
            current_run_count: 0,
            last_value: 0,
        }
    }

    // --- size-estimation pass ---

    pub fn begin_prepare(&mut self, first_value: u32) {
        self.byte_count = 0;
        self.run_count = 0;
        self.current_run_count = 1;
        self.last_value = first_value;
    }

    pub fn prepare_value(&mut self, value: u32) {
        if value != self.last_value {
            self.finish_run();
            self.last_value = value;
        } else {
            self.current_run_count += 1;
        }
    }

    pub fn finish_prepare(&mut self) {
        self.finish_run();
    }

    /// Exact number of bytes the write pass will emit for the prepared sequence.
    pub fn byte_count(&self) -> usize {
        self.byte_count
    }

    /// Number of runs closed during the estimation pass.
    pub fn run_count(&self) -> usize {
        self.run_count
    }

    fn finish_run(&mut self) {
        self.byte_count += leb128::encoded_len(self.current_run_count << 1) + self.byte_width;
        self.current_run_count = 1;
        self.run_count += 1;
    }

    // --- write pass ---

    pub fn begin_write(&mut self, first_value: u32) {
        self.last_value = first_value;
        self.current_run_count = 1;
    }

    pub fn write_value(&mut self, out: &mut Vec<u8>, value: u32) -> Result<(), TambakError> {
        if value != self.last_value {
            self.write_run(out)?;
            self.last_value = value;
        } else {
            self.current_run_count += 1;
        }
        Ok(())
    }

    pub fn finish_write(&mut self, out: &mut Vec<u8>) -> Result<(), TambakError> {
        self.write_run(out)
    }

    fn write_run(&mut self, out: &mut Vec<u8>) -> Result<(), TambakError> {
        leb128::encode_one(self.current_run_count << 1, out);
        let value = self.last_value;
        match self.byte_width {
            1 => out.push(value as u8),
            2 => out.extend_from_slice(&(value as u16).to_le_bytes()),
            3 => {
                out.push((value & 0xFF) as u8);
                out.push(((value >> 8) & 0xFF) as u8);
                out.push(((value >> 16) & 0xFF) as u8);
            }
            4 => out.extend_from_slice(&value.to_le_bytes()),
            other => {
                return Err(TambakError::RleEncodeError(format!(
                    "unsupported byte width {} for RLE encoding",
                    other
                )))
            }
        }
        self.current_run_count = 1;
        Ok(())
    }
}

//==================================================================================
// 3. Slice API
//==================================================================================

/// Encodes `values` with the given bit width, returning the RLE block and the
/// byte count computed by the estimation pass.
pub fn encode(values: &[u32], bit_width: u8, out: &mut Vec<u8>) -> Result<usize, TambakError> {
    let Some((&first, rest)) = values.split_first() else {
        return Ok(0);
    };
    let mut encoder = RleBpEncoder::new(bit_width);
    encoder.begin_prepare(first);
    for &v in rest {
        encoder.prepare_value(v);
    }
    encoder.finish_prepare();

    encoder.begin_write(first);
    for &v in rest {
        encoder.write_value(out, v)?;
    }
    encoder.finish_write(out)?;
    Ok(encoder.byte_count())
}

/// Decodes `num_values` values from an RLE/bit-packing hybrid stream.
///
/// Bit-packed groups are accepted as well, so the decoder also reads streams
/// produced by other writers.
pub fn decode(input: &[u8], bit_width: u8, num_values: usize) -> Result<Vec<u32>, TambakError> {
    let byte_width = (bit_width as usize).div_ceil(8);
    let mut cursor = Cursor::new(input);
    let mut output = Vec::with_capacity(num_values);

    while output.len() < num_values {
        let header = leb128::decode_one::<u32>(&mut cursor)?;
        let pos = cursor.position() as usize;
        if header & 1 == 0 {
            let run_length = (header >> 1) as usize;
            let value_bytes = input.get(pos..pos + byte_width).ok_or_else(|| {
                TambakError::RleDecodeError("Truncated buffer: cannot read run value".to_string())
            })?;
            let mut value = 0u32;
            for (i, b) in value_bytes.iter().enumerate() {
                value |= (*b as u32) << (8 * i);
            }
            cursor.set_position((pos + byte_width) as u64);
            let take = run_length.min(num_values - output.len());
            output.extend(std::iter::repeat(value).take(take));
        } else {
            let group_count = (header >> 1) as usize;
            let byte_len = group_count * bit_width as usize;
            let packed = input.get(pos..pos + byte_len).ok_or_else(|| {
                TambakError::RleDecodeError("Truncated buffer: cannot read bit-packed run".to_string())
            })?;
            cursor.set_position((pos + byte_len) as u64);
            let mask = if bit_width == 0 { 0 } else { u32::MAX >> (32 - bit_width as u32) };
            for i in 0..group_count * 8 {
                if output.len() == num_values {
                    break;
                }
                let bit_offset = i * bit_width as usize;
                let mut value = 0u64;
                for b in 0..(bit_width as usize).div_ceil(8) + 1 {
                    if let Some(byte) = packed.get(bit_offset / 8 + b) {
                        value |= (*byte as u64) << (8 * b);
                    }
                }
                output.push(((value >> (bit_offset % 8)) as u32) & mask);
            }
        }
    }

    Ok(output)
}

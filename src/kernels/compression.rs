//! Block compression for pages.
//!
//! Codecs are black boxes behind the `BlockCompressor` trait: given the raw page
//! bytes they append the compressed form to an output buffer and report the
//! compressed size. `compress_page` wraps a compressor with the page-size limit
//! checks of the format (both sizes must fit a signed 32-bit header field).

use std::io::Write;

use crate::config::CompressionCodec;
use crate::error::TambakError;

//==================================================================================
// 1. Compressor Contract
//==================================================================================

pub trait BlockCompressor: Send + Sync + std::fmt::Debug {
    /// The codec id recorded in column-chunk metadata.
    fn codec(&self) -> CompressionCodec;

    /// Appends the compressed form of `input` to `output` and returns the
    /// compressed size in bytes.
    fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize, TambakError>;
}

/// Page bytes before and after compression. The transition happens once, at flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageBuffer {
    Uncompressed(Vec<u8>),
    Compressed(Vec<u8>),
}

impl PageBuffer {
    pub fn bytes(&self) -> &[u8] {
        match self {
            PageBuffer::Uncompressed(b) | PageBuffer::Compressed(b) => b,
        }
    }
}

/// Compresses a finished page, enforcing the i32 size limits.
///
/// Returns the page buffer together with its on-disk (compressed) size. With the
/// UNCOMPRESSED codec the raw buffer is kept and no copy is made.
pub fn compress_page(
    compressor: &dyn BlockCompressor,
    raw: Vec<u8>,
) -> Result<(PageBuffer, usize), TambakError> {
    check_page_size("uncompressed", raw.len())?;
    if compressor.codec() == CompressionCodec::Uncompressed {
        let size = raw.len();
        return Ok((PageBuffer::Uncompressed(raw), size));
    }
    let mut output = Vec::new();
    let size = compressor.compress(&raw, &mut output)?;
    check_page_size("compressed", size)?;
    Ok((PageBuffer::Compressed(output), size))
}

fn check_page_size(kind: &'static str, size: usize) -> Result<(), TambakError> {
    if size > i32::MAX as usize {
        return Err(TambakError::PageSizeOverflow { kind, size });
    }
    Ok(())
}

//==================================================================================
// 2. Built-in Codecs
//==================================================================================

const DEFAULT_ZSTD_LEVEL: i32 = 3;
const DEFAULT_GZIP_LEVEL: u32 = 6;
const DEFAULT_BROTLI_QUALITY: u32 = 11;
const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_LG_WINDOW_SIZE: u32 = 22;

/// The compressor for one of the built-in codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCompressor {
    codec: CompressionCodec,
    level: Option<i32>,
}

impl PageCompressor {
    /// Creates a compressor, failing for codec ids without an implementation.
    pub fn new(codec: CompressionCodec, level: Option<i32>) -> Result<Self, TambakError> {
        match codec {
            CompressionCodec::Lzo | CompressionCodec::Lz4 => {
                Err(TambakError::UnsupportedCodec(codec.as_str().to_string()))
            }
            _ => Ok(Self { codec, level }),
        }
    }
}

impl BlockCompressor for PageCompressor {
    fn codec(&self) -> CompressionCodec {
        self.codec
    }

    fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize, TambakError> {
        let start = output.len();
        match self.codec {
            CompressionCodec::Uncompressed => output.extend_from_slice(input),
            CompressionCodec::Snappy => {
                let max_len = snap::raw::max_compress_len(input.len());
                output.resize(start + max_len, 0);
                let n = snap::raw::Encoder::new()
                    .compress(input, &mut output[start..])
                    .map_err(|e| TambakError::CompressionError(format!("snappy: {}", e)))?;
                output.truncate(start + n);
            }
            CompressionCodec::Gzip => {
                let level = self.level.map(|l| l as u32).unwrap_or(DEFAULT_GZIP_LEVEL);
                let mut encoder =
                    flate2::write::GzEncoder::new(&mut *output, flate2::Compression::new(level));
                encoder
                    .write_all(input)
                    .map_err(|e| TambakError::CompressionError(format!("gzip: {}", e)))?;
                encoder
                    .finish()
                    .map_err(|e| TambakError::CompressionError(format!("gzip: {}", e)))?;
            }
            CompressionCodec::Lz4Raw => {
                let max_len = lz4_flex::block::get_maximum_output_size(input.len());
                output.resize(start + max_len, 0);
                let n = lz4_flex::block::compress_into(input, &mut output[start..])
                    .map_err(|e| TambakError::CompressionError(format!("lz4_raw: {}", e)))?;
                output.truncate(start + n);
            }
            CompressionCodec::Zstd => {
                let level = self.level.unwrap_or(DEFAULT_ZSTD_LEVEL);
                let mut encoder = zstd::stream::Encoder::new(&mut *output, level)
                    .map_err(|e| TambakError::CompressionError(format!("zstd: {}", e)))?;
                encoder
                    .write_all(input)
                    .map_err(|e| TambakError::CompressionError(format!("zstd: {}", e)))?;
                encoder
                    .finish()
                    .map_err(|e| TambakError::CompressionError(format!("zstd: {}", e)))?;
            }
            CompressionCodec::Brotli => {
                let quality = self.level.map(|l| l as u32).unwrap_or(DEFAULT_BROTLI_QUALITY);
                let mut encoder = brotli::CompressorWriter::new(
                    &mut *output,
                    BROTLI_BUFFER_SIZE,
                    quality,
                    BROTLI_LG_WINDOW_SIZE,
                );
                encoder
                    .write_all(input)
                    .map_err(|e| TambakError::CompressionError(format!("brotli: {}", e)))?;
                encoder
                    .flush()
                    .map_err(|e| TambakError::CompressionError(format!("brotli: {}", e)))?;
                // Dropping the writer finishes the brotli stream.
                drop(encoder);
            }
            CompressionCodec::Lzo | CompressionCodec::Lz4 => {
                return Err(TambakError::UnsupportedCodec(self.codec.as_str().to_string()))
            }
        }
        Ok(output.len() - start)
    }
}

//==================================================================================
// 3. Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn sample_page() -> Vec<u8> {
        b"hello world, this is a test of page compression. hello world, this is a test."
            .repeat(50)
    }

    #[test]
    fn test_snappy_roundtrip() {
        let raw = sample_page();
        let mut out = Vec::new();
        let size = PageCompressor::new(CompressionCodec::Snappy, None)
            .unwrap()
            .compress(&raw, &mut out)
            .unwrap();
        assert_eq!(size, out.len());
        assert!(size < raw.len());
        assert_eq!(snap::raw::Decoder::new().decompress_vec(&out).unwrap(), raw);
    }

    #[test]
    fn test_zstd_roundtrip_with_level() {
        let raw = sample_page();
        let mut out = Vec::new();
        PageCompressor::new(CompressionCodec::Zstd, Some(9))
            .unwrap()
            .compress(&raw, &mut out)
            .unwrap();
        assert_eq!(zstd::stream::decode_all(out.as_slice()).unwrap(), raw);
    }

    #[test]
    fn test_gzip_roundtrip() {
        let raw = sample_page();
        let mut out = Vec::new();
        PageCompressor::new(CompressionCodec::Gzip, None)
            .unwrap()
            .compress(&raw, &mut out)
            .unwrap();
        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(out.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn test_lz4_raw_roundtrip() {
        let raw = sample_page();
        let mut out = Vec::new();
        PageCompressor::new(CompressionCodec::Lz4Raw, None)
            .unwrap()
            .compress(&raw, &mut out)
            .unwrap();
        assert_eq!(lz4_flex::block::decompress(&out, raw.len()).unwrap(), raw);
    }

    #[test]
    fn test_brotli_roundtrip() {
        let raw = sample_page();
        let mut out = Vec::new();
        PageCompressor::new(CompressionCodec::Brotli, Some(5))
            .unwrap()
            .compress(&raw, &mut out)
            .unwrap();
        let mut decoded = Vec::new();
        brotli::Decompressor::new(out.as_slice(), 4096)
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn test_unsupported_codecs() {
        for codec in [CompressionCodec::Lzo, CompressionCodec::Lz4] {
            let err = PageCompressor::new(codec, None).unwrap_err();
            assert!(matches!(err, TambakError::UnsupportedCodec(_)));
        }
    }

    #[test]
    fn test_uncompressed_keeps_buffer() {
        let compressor = PageCompressor::new(CompressionCodec::Uncompressed, None).unwrap();
        let (buffer, size) = compress_page(&compressor, vec![1, 2, 3]).unwrap();
        assert_eq!(buffer, PageBuffer::Uncompressed(vec![1, 2, 3]));
        assert_eq!(size, 3);
    }

    #[derive(Debug)]
    struct Expander;

    impl BlockCompressor for Expander {
        fn codec(&self) -> CompressionCodec {
            CompressionCodec::Zstd
        }
        fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize, TambakError> {
            output.extend_from_slice(input);
            Ok(i32::MAX as usize + 1)
        }
    }

    #[test]
    fn test_compressed_overflow_is_capacity_error() {
        let err = compress_page(&Expander, vec![0; 16]).unwrap_err();
        match err {
            TambakError::PageSizeOverflow { kind, size } => {
                assert_eq!(kind, "compressed");
                assert_eq!(size, 1 << 31);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}

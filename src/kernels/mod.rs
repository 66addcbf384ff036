//! This module declares the pure, stateless byte-level kernels used by the
//! column writers: varint coding, the RLE/bit-packing hybrid encoder and
//! page block compression.

/// Variable-length integers (run headers, size estimates).
pub mod leb128;

/// Repetition/definition levels and dictionary indices.
pub mod rle;

/// Final stage: page compression.
pub mod compression;

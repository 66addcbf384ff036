// In: src/error.rs

//! This module defines the single, unified error type for the columnar writer.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.
//!
//! Every failure aborts the row group that is being written; there is no
//! partial-success mode for a single column or page.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TambakError {
    // =========================================================================
    // === Schema / Domain-Validity Errors (user-facing, reject the write)
    // =========================================================================
    #[error("Parquet writer: column '{0}' is not allowed to contain NULL values")]
    NullConstraint(String),

    #[error("Parquet files do not support negative intervals (column '{0}')")]
    NegativeInterval(String),

    #[error("Unsupported data type for this operation: {0}")]
    UnsupportedType(String),

    #[error("Input does not match the column schema: {0}")]
    InvalidInput(String),

    // =========================================================================
    // === Capacity / Format-Limit Errors
    // =========================================================================
    #[error("Parquet writer: {size} {kind} page size out of range for type integer")]
    PageSizeOverflow { kind: &'static str, size: usize },

    #[error("Unsupported codec for Parquet writer: {0}")]
    UnsupportedCodec(String),

    #[error("Invalid writer configuration: {0}")]
    InvalidConfig(String),

    #[error("Compression failed: {0}")]
    CompressionError(String),

    #[error("Page header serialization/deserialization failed: {0}")]
    FormatError(String),

    // =========================================================================
    // === Internal Invariant Violations (always a bug if reached)
    // =========================================================================
    #[error("RLE encoding error: {0}")]
    RleEncodeError(String),

    #[error("RLE decoding error: {0}")]
    RleDecodeError(String),

    #[error("LEB128 decoding error: {0}")]
    Leb128DecodeError(String),

    #[error("Internal logic error (this is a bug): {0}")]
    InternalError(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error originating from the Arrow library.
    #[error("Arrow operation failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// An error originating from the output sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, typically while loading a config.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    // =========================================================================
    // === Context Wrapper
    // =========================================================================
    #[error("Writing column '{column}' failed: {source}")]
    ColumnError {
        column: String,
        #[source]
        source: Box<TambakError>,
    },
}

impl TambakError {
    /// Wraps an error with the name of the column being written.
    pub fn in_column(self, column: &str) -> Self {
        match self {
            // Keep the innermost column name; it is the most specific.
            err @ TambakError::ColumnError { .. } => err,
            other => TambakError::ColumnError {
                column: column.to_string(),
                source: Box::new(other),
            },
        }
    }
}

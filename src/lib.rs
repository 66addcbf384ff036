//! This file is the root of the `tambak_columnar` Rust crate.
//!
//! The crate encodes Arrow record batches into Parquet-style column chunks:
//! repetition/definition levels, PLAIN and RLE_DICTIONARY pages, block
//! compression, statistics and row-group metadata. Its responsibilities here
//! are limited to declaring the modules and re-exporting the public API.
//!
//! ```no_run
//! use tambak_columnar::{ColumnSchema, LogicalType, MemorySink, TableWriter, WriterConfig};
//!
//! let columns = vec![ColumnSchema::new("id", LogicalType::Int64).not_null()];
//! let writer = TableWriter::new(MemorySink::new(), columns, WriterConfig::default()).unwrap();
//! let (_sink, metadata) = writer.finish().unwrap();
//! assert_eq!(metadata.num_rows, 0);
//! ```

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
//==================================================================================
// 1. Module Declarations
//==================================================================================
#[macro_use]
pub mod observability; // Make macros available throughout the crate

pub mod column_writer;
pub mod config;
pub mod error;
pub mod format;
pub mod kernels;
pub mod null_handling;
pub mod row_group;
pub mod sink;
pub mod types;
pub mod writer;

#[cfg(test)]
mod writer_tests;

//==================================================================================
// 2. Public API Re-exports
//==================================================================================
pub use column_writer::{GeometryAccumulator, WriterContext};
pub use config::{CompressionCodec, FieldId, FieldIds, WriterConfig};
pub use error::TambakError;
pub use format::{FileMetaData, RowGroupMetaData};
pub use observability::enable_verbose_logging;
pub use row_group::write_row_group;
pub use sink::{MemorySink, PageSink, StreamSink};
pub use types::{ColumnSchema, LogicalType};
pub use writer::TableWriter;

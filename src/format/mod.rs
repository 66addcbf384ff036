//! On-disk structures: page headers, the flat schema and chunk metadata.

pub mod metadata;
pub mod page;
pub mod schema;

pub use metadata::{ColumnChunkMetaData, FileMetaData, RowGroupMetaData, Statistics};
pub use page::{Encoding, PageHeader, PageKind, PageType};
pub use schema::{ConvertedType, PhysicalType, Repetition, SchemaElement};

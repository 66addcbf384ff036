//! Column-chunk, row-group and file metadata emitted by the writer.
//!
//! These mirror the Parquet footer structures. Serializing them into the
//! Thrift footer is left to the caller; here they derive `serde::Serialize`
//! so they can be inspected or dumped as JSON.

use serde::Serialize;

use super::page::Encoding;
use super::schema::{PhysicalType, SchemaElement};
use crate::config::CompressionCodec;

/// Column statistics. Every field is optional, as in the footer.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Legacy signed min, left empty for unsigned columns.
    pub min: Option<Vec<u8>>,
    /// Legacy signed max, left empty for unsigned columns.
    pub max: Option<Vec<u8>>,
    pub min_value: Option<Vec<u8>>,
    pub max_value: Option<Vec<u8>>,
    pub null_count: Option<i64>,
    pub distinct_count: Option<i64>,
}

impl Statistics {
    pub fn is_empty(&self) -> bool {
        *self == Statistics::default()
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ColumnChunkMetaData {
    pub path_in_schema: Vec<String>,
    pub physical_type: PhysicalType,
    pub codec: CompressionCodec,
    /// Number of level slots, nulls and empty lists included.
    pub num_values: i64,
    pub data_page_offset: Option<i64>,
    pub dictionary_page_offset: Option<i64>,
    pub total_compressed_size: i64,
    pub total_uncompressed_size: i64,
    /// Encodings in order of first use, without duplicates.
    pub encodings: Vec<Encoding>,
    pub statistics: Statistics,
}

impl ColumnChunkMetaData {
    pub fn new(path_in_schema: Vec<String>, physical_type: PhysicalType, codec: CompressionCodec) -> Self {
        Self {
            path_in_schema,
            physical_type,
            codec,
            num_values: 0,
            data_page_offset: None,
            dictionary_page_offset: None,
            total_compressed_size: 0,
            total_uncompressed_size: 0,
            encodings: Vec::new(),
            statistics: Statistics::default(),
        }
    }

    /// Offset of the first page of the chunk.
    pub fn first_page_offset(&self) -> Option<i64> {
        self.dictionary_page_offset.or(self.data_page_offset)
    }

    pub(crate) fn push_encoding(&mut self, encoding: Encoding) {
        if !self.encodings.contains(&encoding) {
            self.encodings.push(encoding);
        }
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct RowGroupMetaData {
    /// One entry per leaf column, in schema order.
    pub columns: Vec<ColumnChunkMetaData>,
    pub num_rows: i64,
    pub total_byte_size: i64,
    pub file_offset: Option<i64>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FileMetaData {
    pub schema: Vec<SchemaElement>,
    pub row_groups: Vec<RowGroupMetaData>,
    pub num_rows: i64,
    pub created_by: String,
}

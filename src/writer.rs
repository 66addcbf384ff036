//! The table-level writer.
//!
//! `TableWriter` owns the column writer tree for one table schema and a sink.
//! Batches are buffered until `row_group_size` rows are available, then
//! written as one row group. `finish` flushes the remainder and hands back the
//! sink together with the file metadata.

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use log::{debug, info};

use crate::column_writer::factory::build_table_writers;
use crate::column_writer::{ColumnWriter, GeometryAccumulator, WriterContext};
use crate::config::WriterConfig;
use crate::error::TambakError;
use crate::format::{FileMetaData, RowGroupMetaData, SchemaElement};
use crate::kernels::compression::BlockCompressor;
use crate::row_group::write_row_group;
use crate::sink::PageSink;
use crate::types::ColumnSchema;

//==================================================================================
// 1. Row Group Buffer
//==================================================================================

#[derive(Debug, Default)]
struct RowGroupBuffer {
    batches: Vec<RecordBatch>,
    total_rows: usize,
}

impl RowGroupBuffer {
    fn add_batch(&mut self, batch: RecordBatch) {
        self.total_rows += batch.num_rows();
        self.batches.push(batch);
    }

    /// Empties the buffer, returning what it held.
    fn take(&mut self) -> Vec<RecordBatch> {
        self.total_rows = 0;
        std::mem::take(&mut self.batches)
    }
}

//==================================================================================
// 2. Table Writer
//==================================================================================

pub struct TableWriter<S: PageSink> {
    sink: S,
    columns: Vec<ColumnSchema>,
    config: WriterConfig,
    writers: Vec<ColumnWriter>,
    schema: Vec<SchemaElement>,
    geometry: Option<Box<dyn GeometryAccumulator>>,
    buffer: RowGroupBuffer,
    row_groups: Vec<RowGroupMetaData>,
    num_rows: i64,
}

impl<S: PageSink> TableWriter<S> {
    /// Builds the writer tree for `columns`, using the codec named in `config`.
    pub fn new(sink: S, columns: Vec<ColumnSchema>, config: WriterConfig) -> Result<Self, TambakError> {
        let context = Arc::new(WriterContext::new(config.clone())?);
        let (writers, schema) = build_table_writers(&context, &columns)?;
        debug!(
            "table writer: {} columns, {} schema elements, codec {}",
            columns.len(),
            schema.len(),
            config.codec.as_str()
        );
        Ok(Self {
            sink,
            columns,
            config,
            writers,
            schema,
            geometry: None,
            buffer: RowGroupBuffer::default(),
            row_groups: Vec::new(),
            num_rows: 0,
        })
    }

    /// Replaces the page compressor. Must be called before the first batch.
    pub fn with_compressor(mut self, compressor: Box<dyn BlockCompressor>) -> Result<Self, TambakError> {
        if self.buffer.total_rows > 0 || !self.row_groups.is_empty() {
            return Err(TambakError::InternalError(
                "the compressor cannot change after rows were written".to_string(),
            ));
        }
        let context = Arc::new(WriterContext::with_compressor(self.config.clone(), compressor)?);
        let (writers, schema) = build_table_writers(&context, &self.columns)?;
        self.writers = writers;
        self.schema = schema;
        Ok(self)
    }

    pub fn with_geometry_accumulator(mut self, accumulator: Box<dyn GeometryAccumulator>) -> Self {
        self.geometry = Some(accumulator);
        self
    }

    /// The flattened schema, root element first.
    pub fn schema(&self) -> &[SchemaElement] {
        &self.schema
    }

    pub fn row_groups(&self) -> &[RowGroupMetaData] {
        &self.row_groups
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Rows accepted so far, flushed or not.
    pub fn num_rows(&self) -> i64 {
        self.num_rows + self.buffer.total_rows as i64
    }

    /// Buffers `batch`, writing a row group each time `row_group_size` rows
    /// are available. Batches are split so row groups never exceed that size.
    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), TambakError> {
        if batch.num_columns() != self.columns.len() {
            return Err(TambakError::InvalidInput(format!(
                "batch has {} columns, the table has {}",
                batch.num_columns(),
                self.columns.len()
            )));
        }
        let row_group_size = self.config.row_group_size;
        let mut offset = 0;
        while offset < batch.num_rows() {
            let take = (row_group_size - self.buffer.total_rows).min(batch.num_rows() - offset);
            self.buffer.add_batch(batch.slice(offset, take));
            offset += take;
            if self.buffer.total_rows >= row_group_size {
                self.flush()?;
            }
        }
        Ok(())
    }

    /// Writes the buffered rows as one row group. Does nothing when empty.
    ///
    /// On error the buffered rows are dropped; the sink holds only the row
    /// groups written before.
    pub fn flush(&mut self) -> Result<(), TambakError> {
        if self.buffer.total_rows == 0 {
            return Ok(());
        }
        let batches = self.buffer.take();
        let geometry: Option<&mut dyn GeometryAccumulator> = match self.geometry.as_mut() {
            Some(g) => Some(&mut **g),
            None => None,
        };
        let row_group = write_row_group(&self.writers, &batches, &mut self.sink, geometry)?;
        self.num_rows += row_group.num_rows;
        info!(
            "row group {} flushed: {} rows, {} bytes total",
            self.row_groups.len(),
            row_group.num_rows,
            self.sink.total_written()
        );
        self.row_groups.push(row_group);
        Ok(())
    }

    /// Flushes the remaining rows and returns the sink with the file metadata.
    pub fn finish(mut self) -> Result<(S, FileMetaData), TambakError> {
        self.flush()?;
        let metadata = FileMetaData {
            schema: self.schema,
            row_groups: self.row_groups,
            num_rows: self.num_rows,
            created_by: format!("tambak-columnar version {}", crate::VERSION),
        };
        info!(
            "table finished: {} rows in {} row groups",
            metadata.num_rows,
            metadata.row_groups.len()
        );
        Ok((self.sink, metadata))
    }
}

//! Row-group assembly.
//!
//! Every column is driven through the full write protocol on its own, with its
//! pages buffered in memory. Only when every column has been written without
//! error are the chunks emitted to the sink, sequentially and in schema order.
//! Any failure aborts the whole row group before a single byte is emitted,
//! except for sink I/O errors during emission.

use arrow::array::ArrayRef;
use arrow::record_batch::RecordBatch;
use log::{debug, info};

use crate::column_writer::{reborrow_geometry, ColumnWriter, ColumnWriterState, GeometryAccumulator};
use crate::error::TambakError;
use crate::format::RowGroupMetaData;
use crate::sink::PageSink;

/// Runs one column through every protocol stage before emission.
fn write_column(
    writer: &ColumnWriter,
    arrays: &[ArrayRef],
    mut geometry: Option<&mut dyn GeometryAccumulator>,
) -> Result<ColumnWriterState, TambakError> {
    let mut state = writer.initialize_write_state();
    if writer.has_analyze() {
        for array in arrays {
            writer.analyze(&mut state, array)?;
        }
    }
    writer.finalize_analyze(&mut state)?;
    for array in arrays {
        writer.prepare(&mut state, None, array)?;
    }
    writer.begin_write(&mut state)?;

    for array in arrays {
        writer.write(&mut state, array, reborrow_geometry(&mut geometry))?;
    }
    Ok(state)
}

/// Writes `batches` as one row group and returns its metadata.
///
/// Every batch must have one column per writer, in the same order.
pub fn write_row_group(
    writers: &[ColumnWriter],
    batches: &[RecordBatch],
    sink: &mut dyn PageSink,
    mut geometry: Option<&mut dyn GeometryAccumulator>,
) -> Result<RowGroupMetaData, TambakError> {
    if let Some(batch) = batches.iter().find(|b| b.num_columns() != writers.len()) {
        return Err(TambakError::InvalidInput(format!(
            "batch has {} columns, the table has {}",
            batch.num_columns(),
            writers.len()
        )));
    }
    let num_rows: usize = batches.iter().map(RecordBatch::num_rows).sum();

    let mut states = Vec::with_capacity(writers.len());
    for (index, writer) in writers.iter().enumerate() {
        let arrays: Vec<ArrayRef> = batches.iter().map(|b| b.column(index).clone()).collect();
        let geometry = reborrow_geometry(&mut geometry);
        let state = write_column(writer, &arrays, geometry).map_err(|e| e.in_column(writer.name()))?;
        states.push(state);
    }

    let mut row_group = RowGroupMetaData {
        num_rows: num_rows as i64,
        ..RowGroupMetaData::default()
    };
    let start_offset = sink.total_written();
    for (writer, state) in writers.iter().zip(&mut states) {
        let geometry = reborrow_geometry(&mut geometry);
        writer
            .finalize_write(state, sink, geometry, &mut row_group)
            .map_err(|e| e.in_column(writer.name()))?;
        debug!("column '{}' finalized at offset {}", writer.name(), sink.total_written());
    }
    row_group.total_byte_size = row_group.columns.iter().map(|c| c.total_uncompressed_size).sum();
    row_group.file_offset = row_group.columns.first().and_then(|c| c.first_page_offset());

    info!(
        "row group written: {} rows, {} column chunks, {} bytes",
        num_rows,
        row_group.columns.len(),
        sink.total_written() - start_offset
    );
    log_metric!(
        "event" = "row_group",
        "rows" = num_rows,
        "chunks" = row_group.columns.len(),
        "uncompressed" = row_group.total_byte_size
    );
    Ok(row_group)
}

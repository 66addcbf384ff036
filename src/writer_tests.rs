use std::sync::{Arc, Mutex};

use arrow::array::{Array, ArrayRef, BinaryArray, Int32Array, Int64Array, ListArray, StringArray};
use arrow::datatypes::{DataType, Field, Int32Type, Schema};
use arrow::record_batch::RecordBatch;

use crate::column_writer::GeometryAccumulator;
use crate::config::{CompressionCodec, WriterConfig};
use crate::error::TambakError;
use crate::format::{PageHeader, PageType, Repetition};
use crate::kernels::compression::BlockCompressor;
use crate::sink::{MemorySink, PageSink, StreamSink};
use crate::types::{ColumnSchema, LogicalType};
use crate::writer::TableWriter;

// Test Helpers
fn config(row_group_size: usize) -> WriterConfig {
    WriterConfig {
        codec: CompressionCodec::Uncompressed,
        row_group_size,
        ..WriterConfig::default()
    }
}

fn id_batch(values: Vec<Option<i64>>) -> RecordBatch {
    RecordBatch::try_from_iter(vec![("id", Arc::new(Int64Array::from(values)) as ArrayRef)]).unwrap()
}

fn id_schema() -> Vec<ColumnSchema> {
    vec![ColumnSchema::new("id", LogicalType::Int64).not_null()]
}

/// Records every side-channel call as `"<event>:<column>:<count>"`.
#[derive(Debug, Default, Clone)]
struct RecordingAccumulator {
    calls: Arc<Mutex<Vec<String>>>,
}

impl GeometryAccumulator for RecordingAccumulator {
    fn update(&mut self, column: &str, values: &dyn Array, count: usize) -> Result<(), TambakError> {
        assert_eq!(values.len(), count);
        self.calls.lock().unwrap().push(format!("update:{column}:{count}"));
        Ok(())
    }

    fn finalize(&mut self, column: &str) -> Result<(), TambakError> {
        self.calls.lock().unwrap().push(format!("finalize:{column}"));
        Ok(())
    }
}

#[test]
fn test_batches_are_split_into_row_groups() {
    let mut writer = TableWriter::new(MemorySink::new(), id_schema(), config(4)).unwrap();
    writer.write_batch(&id_batch((0..10).map(Some).collect())).unwrap();
    // two full row groups are out, two rows are still buffered
    assert_eq!(writer.row_groups().len(), 2);
    assert_eq!(writer.num_rows(), 10);

    let (sink, metadata) = writer.finish().unwrap();
    let sizes: Vec<i64> = metadata.row_groups.iter().map(|rg| rg.num_rows).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
    assert_eq!(metadata.num_rows, 10);

    // row groups follow each other in the sink
    let first = &metadata.row_groups[0];
    assert_eq!(first.file_offset, Some(0));
    assert_eq!(
        metadata.row_groups[1].file_offset,
        Some(first.columns[0].total_compressed_size)
    );
    let total: i64 = metadata
        .row_groups
        .iter()
        .map(|rg| rg.columns[0].total_compressed_size)
        .sum();
    assert_eq!(total as u64, sink.total_written());
}

#[test]
fn test_file_metadata_schema() {
    let columns = vec![
        ColumnSchema::new("id", LogicalType::Int64).not_null(),
        ColumnSchema::new(
            "tags",
            LogicalType::List(Box::new(ColumnSchema::new("tag", LogicalType::Utf8))),
        ),
    ];
    let writer = TableWriter::new(MemorySink::new(), columns, config(100)).unwrap();
    let (_, metadata) = writer.finish().unwrap();
    assert!(metadata.row_groups.is_empty());
    assert_eq!(metadata.num_rows, 0);
    assert!(metadata.created_by.contains(crate::VERSION));

    let names: Vec<&str> = metadata.schema.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["schema", "id", "tags", "list", "element"]);
    assert_eq!(metadata.schema[0].num_children, Some(2));
    assert_eq!(metadata.schema[1].repetition, Repetition::Required);
    assert_eq!(metadata.schema[3].repetition, Repetition::Repeated);
}

#[test]
fn test_arrow_schema_round_trip_through_writer() {
    let schema = Schema::new(vec![
        Field::new("n", DataType::Int32, false),
        Field::new_list("xs", Field::new("item", DataType::Int32, true), true),
    ]);
    let columns = ColumnSchema::from_arrow_schema(&schema).unwrap();
    let xs = ListArray::from_iter_primitive::<Int32Type, _, _>(vec![
        Some(vec![Some(1)]),
        None,
        Some(vec![Some(2), Some(3)]),
    ]);
    let batch = RecordBatch::try_new(
        Arc::new(schema),
        vec![Arc::new(Int32Array::from(vec![1, 2, 3])), Arc::new(xs)],
    )
    .unwrap();

    let mut writer = TableWriter::new(MemorySink::new(), columns, config(100)).unwrap();
    writer.write_batch(&batch).unwrap();
    let (_, metadata) = writer.finish().unwrap();
    let row_group = &metadata.row_groups[0];
    assert_eq!(row_group.num_rows, 3);
    assert_eq!(row_group.columns.len(), 2);
    assert_eq!(row_group.columns[1].num_values, 4);
    assert_eq!(row_group.columns[0].statistics.null_count, Some(0));
}

#[test]
fn test_failed_row_group_is_dropped() {
    let mut writer = TableWriter::new(MemorySink::new(), id_schema(), config(100)).unwrap();
    writer.write_batch(&id_batch(vec![Some(1), None])).unwrap();
    let err = writer.flush().unwrap_err();
    assert!(matches!(err, TambakError::ColumnError { ref column, .. } if column == "id"));
    assert_eq!(writer.sink().total_written(), 0);
    assert_eq!(writer.num_rows(), 0);

    // the writer is usable again
    writer.write_batch(&id_batch(vec![Some(7)])).unwrap();
    let (_, metadata) = writer.finish().unwrap();
    assert_eq!(metadata.row_groups.len(), 1);
    assert_eq!(metadata.num_rows, 1);
}

#[test]
fn test_column_count_mismatch() {
    let mut writer = TableWriter::new(MemorySink::new(), id_schema(), config(100)).unwrap();
    let batch = RecordBatch::try_from_iter(vec![
        ("a", Arc::new(Int64Array::from(vec![1])) as ArrayRef),
        ("b", Arc::new(Int64Array::from(vec![2])) as ArrayRef),
    ])
    .unwrap();
    assert!(matches!(writer.write_batch(&batch), Err(TambakError::InvalidInput(_))));
}

#[test]
fn test_invalid_config_is_rejected() {
    let bad = WriterConfig {
        codec: CompressionCodec::Gzip,
        compression_level: Some(42),
        ..WriterConfig::default()
    };
    assert!(matches!(
        TableWriter::new(MemorySink::new(), id_schema(), bad),
        Err(TambakError::InvalidConfig(_))
    ));
}

#[test]
fn test_zstd_pages_decompress_to_plain_values() {
    let config = WriterConfig {
        codec: CompressionCodec::Zstd,
        ..config(100)
    };
    let mut writer = TableWriter::new(StreamSink::new(Vec::new()), id_schema(), config).unwrap();
    writer.write_batch(&id_batch((0..50).map(Some).collect())).unwrap();
    let (sink, metadata) = writer.finish().unwrap();
    let bytes = sink.into_inner().unwrap();
    assert_eq!(metadata.row_groups[0].columns[0].codec, CompressionCodec::Zstd);

    let (header, consumed) = PageHeader::from_bytes(&bytes).unwrap();
    assert_eq!(header.page_type(), PageType::DataPage);
    let body = &bytes[consumed..consumed + header.compressed_page_size as usize];
    let raw = zstd::decode_all(body).unwrap();
    assert_eq!(raw.len(), header.uncompressed_page_size as usize);
    let expected: Vec<u8> = (0..50i64).flat_map(|v| v.to_le_bytes()).collect();
    assert_eq!(raw, expected);
}

#[derive(Debug)]
struct ReverseCompressor;

impl BlockCompressor for ReverseCompressor {
    fn codec(&self) -> CompressionCodec {
        CompressionCodec::Lz4Raw
    }

    fn compress(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize, TambakError> {
        output.extend(input.iter().rev());
        Ok(input.len())
    }
}

#[test]
fn test_injected_compressor() {
    let writer = TableWriter::new(MemorySink::new(), id_schema(), config(100)).unwrap();
    let mut writer = writer.with_compressor(Box::new(ReverseCompressor)).unwrap();
    writer.write_batch(&id_batch(vec![Some(1)])).unwrap();
    let (sink, metadata) = writer.finish().unwrap();
    assert_eq!(metadata.row_groups[0].columns[0].codec, CompressionCodec::Lz4Raw);

    let bytes = sink.into_inner();
    let (_, consumed) = PageHeader::from_bytes(&bytes).unwrap();
    let mut expected = 1i64.to_le_bytes().to_vec();
    expected.reverse();
    assert_eq!(&bytes[consumed..], expected.as_slice());
}

#[test]
fn test_geometry_side_channel() {
    let accumulator = RecordingAccumulator::default();
    let calls = Arc::clone(&accumulator.calls);
    let columns = vec![
        ColumnSchema::new("name", LogicalType::Utf8),
        ColumnSchema::new("geom", LogicalType::Geometry),
    ];
    let mut writer = TableWriter::new(MemorySink::new(), columns, config(100))
        .unwrap()
        .with_geometry_accumulator(Box::new(accumulator));

    let batch = RecordBatch::try_from_iter(vec![
        ("name", Arc::new(StringArray::from(vec!["a", "b", "c"])) as ArrayRef),
        (
            "geom",
            Arc::new(BinaryArray::from(vec![Some(&[1u8, 1][..]), None, Some(&[1u8, 2][..])])) as ArrayRef,
        ),
    ])
    .unwrap();
    writer.write_batch(&batch).unwrap();
    writer.write_batch(&batch).unwrap();
    writer.finish().unwrap();

    // one update per write, one finalize per row group, non-geometry columns ignored
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["update:geom:3", "update:geom:3", "finalize:geom"]
    );
}

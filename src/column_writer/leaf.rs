//! The leaf column writer.
//!
//! A leaf owns everything that ends up on disk for one column chunk: its
//! repetition/definition levels, the page boundaries computed during
//! `prepare`, the page buffers filled during `write`, statistics and (for
//! byte-array columns) the dictionary. `finalize_write` emits the pages to the
//! sink and fills in the column chunk metadata.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef};
use arrow::buffer::NullBuffer;
use log::debug;

use super::dictionary::DictionaryState;
use super::encoders::{self, BytesAccessor, EnumCatalog, NumericKind, PageEncoderState};
use super::statistics::{MinMax, StatisticsAccumulator};
use super::{GeometryAccumulator, WriterContext};
use crate::error::TambakError;
use crate::format::{ColumnChunkMetaData, Encoding, PageHeader, PageType, PhysicalType, RowGroupMetaData};
use crate::kernels::compression::{compress_page, PageBuffer};
use crate::kernels::rle::{compute_bit_width, RleBpEncoder};
use crate::null_handling::{handle_define_levels, handle_repeat_levels, is_valid, LevelState};
use crate::sink::PageSink;

const MIN_PAGE_BUFFER_CAPACITY: usize = 512;

//==================================================================================
// 1. Leaf Kinds
//==================================================================================

/// What a leaf stores and how its values are encoded.
#[derive(Debug, Clone)]
pub enum LeafKind {
    Boolean,
    Numeric(NumericKind),
    /// Decimals wider than 18 digits.
    FixedDecimal,
    Uuid,
    Interval,
    /// Strings and binaries; dictionary-capable. `geometry` feeds the side channel.
    Bytes { geometry: bool },
    Enum(EnumCatalog),
}

impl LeafKind {
    pub fn physical_type(&self) -> PhysicalType {
        match self {
            Self::Boolean => PhysicalType::Boolean,
            Self::Numeric(kind) => kind.physical_type(),
            Self::FixedDecimal | Self::Uuid | Self::Interval => PhysicalType::FixedLenByteArray,
            Self::Bytes { .. } | Self::Enum(_) => PhysicalType::ByteArray,
        }
    }

    pub fn is_geometry(&self) -> bool {
        matches!(self, Self::Bytes { geometry: true })
    }

    fn new_statistics(&self, max_string_size: usize) -> StatisticsAccumulator {
        match self {
            Self::Boolean => StatisticsAccumulator::boolean(),
            Self::Numeric(kind) => kind.new_statistics(),
            Self::FixedDecimal => StatisticsAccumulator::Decimal { minmax: MinMax::default() },
            Self::Uuid | Self::Interval => StatisticsAccumulator::Unsupported,
            Self::Bytes { .. } | Self::Enum(_) => StatisticsAccumulator::bytes(max_string_size),
        }
    }
}

//==================================================================================
// 2. Write State
//==================================================================================

/// Page boundaries as computed by `prepare`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageInfo {
    /// First level slot of the page.
    pub offset: usize,
    pub row_count: usize,
    /// Slots that carry no value (below a null or empty parent).
    pub empty_count: usize,
    pub estimated_size: usize,
}

#[derive(Debug)]
struct PageWriteInfo {
    header: PageHeader,
    buffer: PageBuffer,
    page_state: PageEncoderState,
    write_count: usize,
    max_write_count: usize,
    flushed: bool,
}

#[derive(Debug)]
pub struct LeafWriteState {
    pub levels: LevelState,
    column_chunk: ColumnChunkMetaData,
    page_info: Vec<PageInfo>,
    write_info: Vec<PageWriteInfo>,
    /// Number of pages started; the open page is `current_page - 1`.
    current_page: usize,
    stats: StatisticsAccumulator,
    dictionary: Option<DictionaryState>,
    began: bool,
}

impl LeafWriteState {
    pub fn column_chunk(&self) -> &ColumnChunkMetaData {
        &self.column_chunk
    }

    pub fn page_info(&self) -> &[PageInfo] {
        &self.page_info
    }

    pub fn dictionary(&self) -> Option<&DictionaryState> {
        self.dictionary.as_ref()
    }
}

fn misaligned() -> TambakError {
    TambakError::InternalError("writes are not correctly aligned".to_string())
}

//==================================================================================
// 3. Writer
//==================================================================================

#[derive(Debug)]
pub struct LeafWriter {
    context: Arc<WriterContext>,
    name: String,
    schema_path: Vec<String>,
    kind: LeafKind,
    max_repeat: u16,
    max_define: u16,
    nullable: bool,
}

impl LeafWriter {
    pub fn new(
        context: Arc<WriterContext>,
        name: impl Into<String>,
        schema_path: Vec<String>,
        kind: LeafKind,
        max_repeat: u16,
        max_define: u16,
        nullable: bool,
    ) -> Self {
        Self {
            context,
            name: name.into(),
            schema_path,
            kind,
            max_repeat,
            max_define,
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &LeafKind {
        &self.kind
    }

    pub fn max_repeat(&self) -> u16 {
        self.max_repeat
    }

    pub fn max_define(&self) -> u16 {
        self.max_define
    }

    pub fn initialize_write_state(&self) -> LeafWriteState {
        let config = &self.context.config;
        LeafWriteState {
            levels: LevelState::default(),
            column_chunk: ColumnChunkMetaData::new(
                self.schema_path.clone(),
                self.kind.physical_type(),
                self.context.compressor.codec(),
            ),
            page_info: vec![PageInfo::default()],
            write_info: Vec::new(),
            current_page: 0,
            stats: self.kind.new_statistics(config.max_string_statistics_size),
            dictionary: matches!(self.kind, LeafKind::Bytes { .. }).then(DictionaryState::default),
            began: false,
        }
    }

    pub fn has_analyze(&self) -> bool {
        matches!(self.kind, LeafKind::Bytes { .. })
            && self.context.config.dictionary_threshold().is_some()
    }

    pub fn analyze(&self, state: &mut LeafWriteState, array: &ArrayRef) -> Result<(), TambakError> {
        let Some(dictionary) = state.dictionary.as_mut() else {
            return Ok(());
        };
        let accessor = BytesAccessor::try_new(array.as_ref())?;
        let nulls = array.logical_nulls();
        dictionary.analyze(accessor.iter_with(nulls.as_ref(), array.len()), &self.context.config);
        Ok(())
    }

    pub fn finalize_analyze(&self, state: &mut LeafWriteState) {
        if let Some(dictionary) = state.dictionary.as_mut() {
            dictionary.finalize_analyze(&self.context.config, &self.name);
        }
    }

    /// Key width of the dictionary encoding, if the column uses one.
    fn key_bit_width(&self, state: &LeafWriteState) -> Option<u8> {
        match &self.kind {
            LeafKind::Enum(catalog) => Some(catalog.bit_width()),
            LeafKind::Bytes { .. } => state
                .dictionary
                .as_ref()
                .filter(|d| d.is_dictionary_encoded())
                .map(DictionaryState::bit_width),
            _ => None,
        }
    }

    /// Estimated bytes per valid row when it doesn't depend on the value.
    fn fixed_row_size(&self, key_bit_width: Option<u8>) -> Option<usize> {
        if let Some(bit_width) = key_bit_width {
            return Some((bit_width as usize).div_ceil(8));
        }
        match &self.kind {
            LeafKind::Boolean => Some(1),
            LeafKind::Numeric(kind) => Some(kind.byte_width()),
            LeafKind::FixedDecimal | LeafKind::Uuid => Some(16),
            LeafKind::Interval => Some(12),
            LeafKind::Enum(catalog) => Some((catalog.bit_width() as usize).div_ceil(8)),
            LeafKind::Bytes { .. } => None,
        }
    }

    /// Extends the levels and page boundaries with one batch.
    pub fn prepare(
        &self,
        state: &mut LeafWriteState,
        parent: Option<&LevelState>,
        array: &ArrayRef,
    ) -> Result<(), TambakError> {
        let nulls = array.logical_nulls();
        let start = state.levels.definition_levels.len();
        let vcount = match parent {
            Some(parent) => parent.definition_levels.len().saturating_sub(start),
            None => array.len(),
        };

        handle_repeat_levels(&mut state.levels, parent);
        handle_define_levels(
            &mut state.levels,
            parent,
            nulls.as_ref(),
            array.len(),
            self.max_define,
            self.max_define.saturating_sub(1),
            self.nullable,
            &self.name,
        )?;

        let fixed_size = self.fixed_row_size(self.key_bit_width(state));
        let bytes = match fixed_size {
            Some(_) => None,
            None => Some(BytesAccessor::try_new(array.as_ref())?),
        };
        let max_page_size = self.context.config.max_page_size;

        let mut vector_index = 0;
        for i in start..start + vcount {
            if parent.is_some_and(|p| p.is_empty_at(i)) {
                let page = state.page_info.last_mut().ok_or_else(misaligned)?;
                page.row_count += 1;
                page.empty_count += 1;
                continue;
            }
            if vector_index >= array.len() {
                return Err(TambakError::InvalidInput(format!(
                    "column '{}' has fewer values than level slots",
                    self.name
                )));
            }
            if is_valid(nulls.as_ref(), vector_index) {
                let row_size = match (fixed_size, bytes) {
                    (Some(size), _) => size,
                    (None, Some(bytes)) => bytes.value(vector_index).len(),
                    (None, None) => 0,
                };
                let page = state.page_info.last_mut().ok_or_else(misaligned)?;
                page.row_count += 1;
                page.estimated_size += row_size;
                if page.estimated_size >= max_page_size {
                    let offset = page.offset + page.row_count;
                    debug!(
                        "column '{}': page cut at slot {} ({} estimated bytes)",
                        self.name, offset, page.estimated_size
                    );
                    state.page_info.push(PageInfo { offset, ..PageInfo::default() });
                }
            } else {
                let page = state.page_info.last_mut().ok_or_else(misaligned)?;
                page.row_count += 1;
            }
            vector_index += 1;
        }
        state.column_chunk.num_values += vcount as i64;
        Ok(())
    }

    fn new_page_state(&self, key_bit_width: Option<u8>) -> PageEncoderState {
        match (key_bit_width, &self.kind) {
            (Some(bit_width), _) => PageEncoderState::dictionary(bit_width),
            (None, LeafKind::Boolean) => PageEncoderState::boolean(),
            _ => PageEncoderState::Plain,
        }
    }

    /// Allocates one page buffer per prepared page and opens the first one.
    pub fn begin_write(&self, state: &mut LeafWriteState) -> Result<(), TambakError> {
        if state.page_info.last().is_some_and(|p| p.row_count == 0) {
            state.page_info.pop();
        }
        let key_bit_width = self.key_bit_width(state);
        let encoding = if key_bit_width.is_some() {
            Encoding::RleDictionary
        } else {
            Encoding::Plain
        };

        let mut write_info = Vec::with_capacity(state.page_info.len());
        for page in &state.page_info {
            let num_values = i32::try_from(page.row_count).map_err(|_| TambakError::PageSizeOverflow {
                kind: "value count",
                size: page.row_count,
            })?;
            let capacity = page.estimated_size.next_power_of_two().max(MIN_PAGE_BUFFER_CAPACITY);
            write_info.push(PageWriteInfo {
                header: PageHeader::data(num_values, encoding),
                buffer: PageBuffer::Uncompressed(Vec::with_capacity(capacity)),
                page_state: self.new_page_state(key_bit_width),
                write_count: page.empty_count,
                max_write_count: page.row_count,
                flushed: false,
            });
        }
        log_metric!(
            "event" = "begin_write",
            "column" = &self.name,
            "pages" = write_info.len()
        );
        state.write_info = write_info;
        state.current_page = 0;
        state.began = true;
        self.next_page(state)
    }

    /// Flushes the open page and opens the next one, skipping pages that
    /// hold only empty slots.
    fn next_page(&self, state: &mut LeafWriteState) -> Result<(), TambakError> {
        loop {
            if state.current_page > 0 {
                self.flush_page(state)?;
            }
            if state.current_page >= state.write_info.len() {
                state.current_page = state.write_info.len() + 1;
                return Ok(());
            }
            let index = state.current_page;
            state.current_page += 1;

            let page = &state.page_info[index];
            let info = &mut state.write_info[index];
            let PageBuffer::Uncompressed(out) = &mut info.buffer else {
                return Err(misaligned());
            };
            write_levels(out, &state.levels.repetition_levels, self.max_repeat, page.offset, page.row_count)?;
            write_levels(out, &state.levels.definition_levels, self.max_define, page.offset, page.row_count)?;
            if info.write_count < info.max_write_count {
                return Ok(());
            }
        }
    }

    /// Finalizes the open page and compresses it.
    fn flush_page(&self, state: &mut LeafWriteState) -> Result<(), TambakError> {
        let Some(info) = state
            .current_page
            .checked_sub(1)
            .and_then(|index| state.write_info.get_mut(index))
        else {
            return Ok(());
        };
        if info.flushed {
            return Ok(());
        }
        let PageBuffer::Uncompressed(mut raw) =
            std::mem::replace(&mut info.buffer, PageBuffer::Uncompressed(Vec::new()))
        else {
            return Err(misaligned());
        };
        info.page_state.finish(&mut raw)?;
        let uncompressed_size = raw.len();
        let (buffer, compressed_size) = compress_page(self.context.compressor.as_ref(), raw)?;
        // both sizes were range-checked by compress_page
        info.header.uncompressed_page_size = uncompressed_size as i32;
        info.header.compressed_page_size = compressed_size as i32;
        info.buffer = buffer;
        info.flushed = true;
        debug!(
            "column '{}': flushed page of {} slots, {} -> {} bytes",
            self.name, info.max_write_count, uncompressed_size, compressed_size
        );
        Ok(())
    }

    pub fn write(
        &self,
        state: &mut LeafWriteState,
        array: &ArrayRef,
        geometry: Option<&mut dyn GeometryAccumulator>,
    ) -> Result<(), TambakError> {
        if !state.began {
            return Err(TambakError::InternalError(format!(
                "column '{}' written before begin_write",
                self.name
            )));
        }
        let nulls = array.logical_nulls();
        let enum_keys = match &self.kind {
            LeafKind::Enum(catalog) => Some(catalog.keys(array.as_ref())?),
            _ => None,
        };

        let mut remaining = array.len();
        let mut offset = 0;
        while remaining > 0 {
            let info = state
                .current_page
                .checked_sub(1)
                .and_then(|index| state.write_info.get_mut(index))
                .filter(|info| !info.flushed)
                .ok_or_else(misaligned)?;
            let step = remaining.min(info.max_write_count.saturating_sub(info.write_count));
            if step == 0 {
                return Err(misaligned());
            }
            let PageBuffer::Uncompressed(out) = &mut info.buffer else {
                return Err(misaligned());
            };
            self.write_values(
                out,
                &mut state.stats,
                &mut info.page_state,
                state.dictionary.as_ref(),
                enum_keys.as_deref(),
                array.as_ref(),
                nulls.as_ref(),
                offset,
                offset + step,
            )?;
            info.write_count += step;
            if info.write_count == info.max_write_count {
                self.next_page(state)?;
            }
            offset += step;
            remaining -= step;
        }

        if self.kind.is_geometry() {
            if let Some(geometry) = geometry {
                geometry.update(&self.name, array.as_ref(), array.len())?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_values(
        &self,
        out: &mut Vec<u8>,
        stats: &mut StatisticsAccumulator,
        page_state: &mut PageEncoderState,
        dictionary: Option<&DictionaryState>,
        enum_keys: Option<&[u32]>,
        array: &dyn Array,
        nulls: Option<&NullBuffer>,
        start: usize,
        end: usize,
    ) -> Result<(), TambakError> {
        match &self.kind {
            LeafKind::Boolean => encoders::write_boolean(array, nulls, start, end, out, stats, page_state),
            LeafKind::Numeric(kind) => encoders::write_numeric(*kind, array, nulls, start, end, out, stats),
            LeafKind::FixedDecimal => encoders::write_fixed_decimal(array, nulls, start, end, out, stats),
            LeafKind::Uuid => encoders::write_uuid(array, nulls, start, end, out),
            LeafKind::Interval => encoders::write_interval(array, nulls, start, end, out, &self.name),
            LeafKind::Bytes { .. } => match dictionary.filter(|d| d.is_dictionary_encoded()) {
                Some(dictionary) => {
                    encoders::write_dictionary_keys(array, nulls, start, end, out, dictionary, page_state)
                }
                None => encoders::write_plain_bytes(array, nulls, start, end, out, stats),
            },
            LeafKind::Enum(_) => {
                let keys = enum_keys.ok_or_else(misaligned)?;
                for r in start..end {
                    if is_valid(nulls, r) {
                        page_state.push_index(out, keys[r])?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Builds the compressed dictionary page, returning it with its entry count.
    fn flush_dictionary(&self, state: &mut LeafWriteState) -> Result<Option<(PageWriteInfo, usize)>, TambakError> {
        let values: Vec<&[u8]> = match &self.kind {
            LeafKind::Enum(catalog) => catalog.values().iter().map(|v| v.as_bytes()).collect(),
            LeafKind::Bytes { .. } => match state.dictionary.as_ref().filter(|d| d.is_dictionary_encoded()) {
                Some(dictionary) => dictionary.values_in_index_order(),
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        let StatisticsAccumulator::Bytes(stats) = &mut state.stats else {
            return Err(TambakError::InternalError(format!(
                "column '{}' has a dictionary but no string statistics",
                self.name
            )));
        };

        let mut raw = Vec::with_capacity(values.iter().map(|v| v.len() + 4).sum());
        for value in &values {
            stats.update(value);
            encoders::put_plain_bytes(&mut raw, value);
        }
        let num_values = i32::try_from(values.len()).map_err(|_| TambakError::PageSizeOverflow {
            kind: "dictionary entry count",
            size: values.len(),
        })?;
        let uncompressed_size = raw.len();
        let (buffer, compressed_size) = compress_page(self.context.compressor.as_ref(), raw)?;
        let mut header = PageHeader::dictionary(num_values);
        header.uncompressed_page_size = uncompressed_size as i32;
        header.compressed_page_size = compressed_size as i32;
        debug!(
            "column '{}': dictionary page of {} entries, {} -> {} bytes",
            self.name,
            values.len(),
            uncompressed_size,
            compressed_size
        );
        let page = PageWriteInfo {
            header,
            buffer,
            page_state: PageEncoderState::Plain,
            write_count: 0,
            max_write_count: 0,
            flushed: true,
        };
        Ok(Some((page, values.len())))
    }

    /// Emits every page of the chunk and records its metadata in `row_group`.
    pub fn finalize_write(
        &self,
        state: &mut LeafWriteState,
        sink: &mut dyn PageSink,
        geometry: Option<&mut dyn GeometryAccumulator>,
        row_group: &mut RowGroupMetaData,
    ) -> Result<(), TambakError> {
        if !state.began {
            return Err(TambakError::InternalError(format!(
                "column '{}' finalized before begin_write",
                self.name
            )));
        }
        self.flush_page(state)?;
        if state.write_info.iter().any(|info| !info.flushed) {
            return Err(misaligned());
        }

        let start_offset = sink.total_written();
        if let Some((page, distinct)) = self.flush_dictionary(state)? {
            state.column_chunk.statistics.distinct_count = Some(distinct as i64);
            state.column_chunk.dictionary_page_offset = Some(start_offset as i64);
            state.write_info.insert(0, page);
        }

        let statistics = &mut state.column_chunk.statistics;
        if self.max_repeat == 0 {
            statistics.null_count = Some(state.levels.null_count as i64);
        }
        if state.stats.has_stats() {
            state.stats.apply_to(statistics);
        }

        let mut total_uncompressed_size = 0i64;
        for info in &state.write_info {
            state.column_chunk.push_encoding(info.header.encoding());
            if info.header.page_type() == PageType::DataPage && state.column_chunk.data_page_offset.is_none() {
                state.column_chunk.data_page_offset = Some(sink.total_written() as i64);
            }
            let header_start = sink.total_written();
            sink.write_header(&info.header)?;
            // the serialized header counts toward the uncompressed total
            total_uncompressed_size += (sink.total_written() - header_start) as i64;
            total_uncompressed_size += info.header.uncompressed_page_size as i64;
            sink.write_data(info.buffer.bytes())?;
        }
        state.column_chunk.total_compressed_size = (sink.total_written() - start_offset) as i64;
        state.column_chunk.total_uncompressed_size = total_uncompressed_size;

        log_metric!(
            "event" = "finalize_write",
            "column" = &self.name,
            "pages" = state.write_info.len(),
            "compressed" = state.column_chunk.total_compressed_size,
            "uncompressed" = total_uncompressed_size
        );
        row_group.columns.push(state.column_chunk.clone());

        if self.kind.is_geometry() {
            if let Some(geometry) = geometry {
                geometry.finalize(&self.name)?;
            }
        }
        Ok(())
    }
}

/// Appends one level stream: `u32` LE byte count, then the RLE-BP block.
/// Nothing is written for an empty vector, an empty page or a max level of 0.
fn write_levels(
    out: &mut Vec<u8>,
    levels: &[u16],
    max_level: u16,
    offset: usize,
    count: usize,
) -> Result<(), TambakError> {
    if levels.is_empty() || count == 0 || max_level == 0 {
        return Ok(());
    }
    let slice = levels.get(offset..offset + count).ok_or_else(misaligned)?;
    let mut encoder = RleBpEncoder::new(compute_bit_width(max_level as u64));
    encoder.begin_prepare(slice[0] as u32);
    for &level in &slice[1..] {
        encoder.prepare_value(level as u32);
    }
    encoder.finish_prepare();
    out.extend_from_slice(&(encoder.byte_count() as u32).to_le_bytes());

    encoder.begin_write(slice[0] as u32);
    for &level in &slice[1..] {
        encoder.write_value(out, level as u32)?;
    }
    encoder.finish_write(out)
}

//! Value encoders for leaf columns.
//!
//! Each `write_*` function plain-encodes the valid entries of `[start, end)`
//! of one input array into a page buffer and feeds the statistics
//! accumulator. Nulls contribute no bytes; they are carried by the levels.

use arrow::array::{
    Array, ArrowPrimitiveType, AsArray, BinaryArray, LargeBinaryArray, LargeStringArray,
    StringArray,
};
use arrow::buffer::NullBuffer;
use arrow::datatypes::{
    DataType, Date32Type, Decimal128Type, Float32Type, Float64Type, Int16Type, Int32Type,
    Int64Type, Int8Type, IntervalMonthDayNanoType, Time64MicrosecondType,
    TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use hashbrown::HashMap;

use super::dictionary::DictionaryState;
use super::statistics::{StatValue, StatisticsAccumulator};
use crate::error::TambakError;
use crate::format::PhysicalType;
use crate::kernels::rle::{dictionary_bit_width, RleBpEncoder};
use crate::null_handling::is_valid;

const MICROS_PER_SECOND: i64 = 1_000_000;
const NANOS_PER_MILLI: i64 = 1_000_000;

//==================================================================================
// 1. Page-local encoder state
//==================================================================================

/// Encoder state that lives for the duration of one data page.
#[derive(Debug, Clone)]
pub enum PageEncoderState {
    Plain,
    /// LSB-first bit cursor; the pending byte is flushed zero-padded.
    Boolean { byte: u8, byte_pos: u8 },
    /// Dictionary keys: a one-byte bit width, then one RLE-BP block.
    Dictionary {
        bit_width: u8,
        encoder: RleBpEncoder,
        written_value: bool,
    },
}

impl PageEncoderState {
    pub fn boolean() -> Self {
        Self::Boolean { byte: 0, byte_pos: 0 }
    }

    pub fn dictionary(bit_width: u8) -> Self {
        Self::Dictionary {
            bit_width,
            encoder: RleBpEncoder::new(bit_width),
            written_value: false,
        }
    }

    /// Appends one dictionary key.
    pub fn push_index(&mut self, out: &mut Vec<u8>, index: u32) -> Result<(), TambakError> {
        let Self::Dictionary { bit_width, encoder, written_value } = self else {
            return Err(TambakError::InternalError(
                "dictionary key written to a non-dictionary page".to_string(),
            ));
        };
        if *written_value {
            encoder.write_value(out, index)
        } else {
            out.push(*bit_width);
            encoder.begin_write(index);
            *written_value = true;
            Ok(())
        }
    }

    /// Emits whatever the state still buffers at the end of the page.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), TambakError> {
        match self {
            Self::Plain => Ok(()),
            Self::Boolean { byte, byte_pos } => {
                if *byte_pos > 0 {
                    out.push(*byte);
                    *byte = 0;
                    *byte_pos = 0;
                }
                Ok(())
            }
            Self::Dictionary { bit_width, encoder, written_value } => {
                if *written_value {
                    encoder.finish_write(out)
                } else {
                    // all-null page: only the width prefix
                    out.push(*bit_width);
                    Ok(())
                }
            }
        }
    }
}

//==================================================================================
// 2. Numeric kinds
//==================================================================================

/// Source kinds of the fixed-width numeric columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Date32,
    Time64Micros,
    TimestampSecond,
    TimestampMillisecond,
    TimestampMicrosecond,
    TimestampNanosecond,
    /// Decimal128 storage with precision <= 9.
    Decimal32,
    /// Decimal128 storage with precision <= 18.
    Decimal64,
}

impl NumericKind {
    pub fn physical_type(self) -> PhysicalType {
        match self {
            Self::Int8
            | Self::Int16
            | Self::Int32
            | Self::UInt8
            | Self::UInt16
            | Self::UInt32
            | Self::Date32
            | Self::Decimal32 => PhysicalType::Int32,
            Self::Int64
            | Self::UInt64
            | Self::Time64Micros
            | Self::TimestampSecond
            | Self::TimestampMillisecond
            | Self::TimestampMicrosecond
            | Self::TimestampNanosecond
            | Self::Decimal64 => PhysicalType::Int64,
            Self::Float32 => PhysicalType::Float,
            Self::Float64 => PhysicalType::Double,
        }
    }

    /// Plain-encoded bytes per value.
    pub fn byte_width(self) -> usize {
        match self.physical_type() {
            PhysicalType::Int32 | PhysicalType::Float => 4,
            _ => 8,
        }
    }

    pub fn new_statistics(self) -> StatisticsAccumulator {
        match self {
            Self::UInt8 | Self::UInt16 => StatisticsAccumulator::int32(false),
            Self::UInt32 => StatisticsAccumulator::UInt32 { minmax: Default::default() },
            Self::UInt64 => StatisticsAccumulator::UInt64 { minmax: Default::default() },
            Self::Float32 => StatisticsAccumulator::Float { minmax: Default::default() },
            Self::Float64 => StatisticsAccumulator::Double { minmax: Default::default() },
            other => match other.physical_type() {
                PhysicalType::Int32 => StatisticsAccumulator::int32(true),
                _ => StatisticsAccumulator::int64(true),
            },
        }
    }
}

fn type_mismatch(expected: &str, actual: &DataType) -> TambakError {
    TambakError::InvalidInput(format!("expected {} array, got {:?}", expected, actual))
}

fn stats_mismatch() -> TambakError {
    TambakError::InternalError("statistics accumulator does not match the column kind".to_string())
}

#[allow(clippy::too_many_arguments)]
fn write_primitive<T, U>(
    array: &dyn Array,
    nulls: Option<&NullBuffer>,
    start: usize,
    end: usize,
    out: &mut Vec<u8>,
    stats: &mut StatisticsAccumulator,
    convert: impl Fn(T::Native) -> Result<U, TambakError>,
) -> Result<(), TambakError>
where
    T: ArrowPrimitiveType,
    U: StatValue,
{
    let values = array
        .as_primitive_opt::<T>()
        .ok_or_else(|| type_mismatch(&T::DATA_TYPE.to_string(), array.data_type()))?;
    let minmax = U::accumulator(stats).ok_or_else(stats_mismatch)?;
    let raw = values.values();
    for r in start..end {
        if is_valid(nulls, r) {
            let value = convert(raw[r])?;
            minmax.update(value);
            value.extend_le(out);
        }
    }
    Ok(())
}

fn decimal_overflow(value: i128) -> TambakError {
    TambakError::InvalidInput(format!("decimal value {} does not fit its declared precision", value))
}

pub fn write_numeric(
    kind: NumericKind,
    array: &dyn Array,
    nulls: Option<&NullBuffer>,
    start: usize,
    end: usize,
    out: &mut Vec<u8>,
    stats: &mut StatisticsAccumulator,
) -> Result<(), TambakError> {
    let (a, n, s, e) = (array, nulls, start, end);
    match kind {
        NumericKind::Int8 => write_primitive::<Int8Type, i32>(a, n, s, e, out, stats, |v| Ok(v as i32)),
        NumericKind::Int16 => write_primitive::<Int16Type, i32>(a, n, s, e, out, stats, |v| Ok(v as i32)),
        NumericKind::Int32 => write_primitive::<Int32Type, i32>(a, n, s, e, out, stats, Ok),
        NumericKind::Int64 => write_primitive::<Int64Type, i64>(a, n, s, e, out, stats, Ok),
        NumericKind::UInt8 => write_primitive::<UInt8Type, i32>(a, n, s, e, out, stats, |v| Ok(v as i32)),
        NumericKind::UInt16 => write_primitive::<UInt16Type, i32>(a, n, s, e, out, stats, |v| Ok(v as i32)),
        NumericKind::UInt32 => write_primitive::<UInt32Type, u32>(a, n, s, e, out, stats, Ok),
        NumericKind::UInt64 => write_primitive::<UInt64Type, u64>(a, n, s, e, out, stats, Ok),
        NumericKind::Float32 => write_primitive::<Float32Type, f32>(a, n, s, e, out, stats, Ok),
        NumericKind::Float64 => write_primitive::<Float64Type, f64>(a, n, s, e, out, stats, Ok),
        NumericKind::Date32 => write_primitive::<Date32Type, i32>(a, n, s, e, out, stats, Ok),
        NumericKind::Time64Micros => {
            write_primitive::<Time64MicrosecondType, i64>(a, n, s, e, out, stats, Ok)
        }
        NumericKind::TimestampSecond => {
            write_primitive::<TimestampSecondType, i64>(a, n, s, e, out, stats, |v| {
                v.checked_mul(MICROS_PER_SECOND).ok_or_else(|| {
                    TambakError::InvalidInput(format!("timestamp {}s overflows microseconds", v))
                })
            })
        }
        NumericKind::TimestampMillisecond => {
            write_primitive::<TimestampMillisecondType, i64>(a, n, s, e, out, stats, Ok)
        }
        NumericKind::TimestampMicrosecond => {
            write_primitive::<TimestampMicrosecondType, i64>(a, n, s, e, out, stats, Ok)
        }
        NumericKind::TimestampNanosecond => {
            write_primitive::<TimestampNanosecondType, i64>(a, n, s, e, out, stats, Ok)
        }
        NumericKind::Decimal32 => write_primitive::<Decimal128Type, i32>(a, n, s, e, out, stats, |v| {
            i32::try_from(v).map_err(|_| decimal_overflow(v))
        }),
        NumericKind::Decimal64 => write_primitive::<Decimal128Type, i64>(a, n, s, e, out, stats, |v| {
            i64::try_from(v).map_err(|_| decimal_overflow(v))
        }),
    }
}

//==================================================================================
// 3. Boolean and fixed-length encoders
//==================================================================================

#[allow(clippy::too_many_arguments)]
pub fn write_boolean(
    array: &dyn Array,
    nulls: Option<&NullBuffer>,
    start: usize,
    end: usize,
    out: &mut Vec<u8>,
    stats: &mut StatisticsAccumulator,
    page_state: &mut PageEncoderState,
) -> Result<(), TambakError> {
    let values = array
        .as_boolean_opt()
        .ok_or_else(|| type_mismatch("Boolean", array.data_type()))?;
    let (StatisticsAccumulator::Boolean { min, max }, PageEncoderState::Boolean { byte, byte_pos }) =
        (stats, page_state)
    else {
        return Err(stats_mismatch());
    };
    for r in start..end {
        if !is_valid(nulls, r) {
            continue;
        }
        if values.value(r) {
            *max = true;
            *byte |= 1 << *byte_pos;
        } else {
            *min = false;
        }
        *byte_pos += 1;
        if *byte_pos == 8 {
            out.push(*byte);
            *byte = 0;
            *byte_pos = 0;
        }
    }
    Ok(())
}

/// Wide decimals as 16-byte big-endian two's complement.
pub fn write_fixed_decimal(
    array: &dyn Array,
    nulls: Option<&NullBuffer>,
    start: usize,
    end: usize,
    out: &mut Vec<u8>,
    stats: &mut StatisticsAccumulator,
) -> Result<(), TambakError> {
    let values = array
        .as_primitive_opt::<Decimal128Type>()
        .ok_or_else(|| type_mismatch("Decimal128", array.data_type()))?;
    let minmax = i128::accumulator(stats).ok_or_else(stats_mismatch)?;
    for r in start..end {
        if is_valid(nulls, r) {
            let value = values.value(r);
            minmax.update(value);
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
    Ok(())
}

/// UUIDs from either canonical 16-byte binaries or order-preserving 128-bit
/// integers (sign bit of the upper half flipped).
pub fn write_uuid(
    array: &dyn Array,
    nulls: Option<&NullBuffer>,
    start: usize,
    end: usize,
    out: &mut Vec<u8>,
) -> Result<(), TambakError> {
    if let Some(fixed) = array.as_fixed_size_binary_opt() {
        if fixed.value_length() != 16 {
            return Err(type_mismatch("FixedSizeBinary(16)", array.data_type()));
        }
        for r in start..end {
            if is_valid(nulls, r) {
                out.extend_from_slice(fixed.value(r));
            }
        }
        return Ok(());
    }
    let ordered = array
        .as_primitive_opt::<Decimal128Type>()
        .ok_or_else(|| type_mismatch("FixedSizeBinary(16) or Decimal128", array.data_type()))?;
    for r in start..end {
        if is_valid(nulls, r) {
            let bits = (ordered.value(r) as u128) ^ (1u128 << 127);
            out.extend_from_slice(&bits.to_be_bytes());
        }
    }
    Ok(())
}

/// Month-day-nano intervals as three little-endian u32 (months, days, millis).
pub fn write_interval(
    array: &dyn Array,
    nulls: Option<&NullBuffer>,
    start: usize,
    end: usize,
    out: &mut Vec<u8>,
    column: &str,
) -> Result<(), TambakError> {
    let values = array
        .as_primitive_opt::<IntervalMonthDayNanoType>()
        .ok_or_else(|| type_mismatch("Interval(MonthDayNano)", array.data_type()))?;
    for r in start..end {
        if !is_valid(nulls, r) {
            continue;
        }
        let (months, days, nanos) = IntervalMonthDayNanoType::to_parts(values.value(r));
        if months < 0 || days < 0 || nanos < 0 {
            return Err(TambakError::NegativeInterval(column.to_string()));
        }
        out.extend_from_slice(&(months as u32).to_le_bytes());
        out.extend_from_slice(&(days as u32).to_le_bytes());
        out.extend_from_slice(&((nanos / NANOS_PER_MILLI) as u32).to_le_bytes());
    }
    Ok(())
}

//==================================================================================
// 4. Byte-array encoders
//==================================================================================

/// Uniform access to the four arrow byte-array layouts.
#[derive(Debug, Clone, Copy)]
pub enum BytesAccessor<'a> {
    Utf8(&'a StringArray),
    LargeUtf8(&'a LargeStringArray),
    Binary(&'a BinaryArray),
    LargeBinary(&'a LargeBinaryArray),
}

impl<'a> BytesAccessor<'a> {
    pub fn try_new(array: &'a dyn Array) -> Result<Self, TambakError> {
        if let Some(a) = array.as_string_opt::<i32>() {
            return Ok(Self::Utf8(a));
        }
        if let Some(a) = array.as_string_opt::<i64>() {
            return Ok(Self::LargeUtf8(a));
        }
        if let Some(a) = array.as_binary_opt::<i32>() {
            return Ok(Self::Binary(a));
        }
        if let Some(a) = array.as_binary_opt::<i64>() {
            return Ok(Self::LargeBinary(a));
        }
        Err(type_mismatch("string or binary", array.data_type()))
    }

    #[inline]
    pub fn value(&self, index: usize) -> &'a [u8] {
        match self {
            Self::Utf8(a) => a.value(index).as_bytes(),
            Self::LargeUtf8(a) => a.value(index).as_bytes(),
            Self::Binary(a) => a.value(index),
            Self::LargeBinary(a) => a.value(index),
        }
    }

    /// Every entry, `None` for nulls.
    pub fn iter_with(
        self,
        nulls: Option<&'a NullBuffer>,
        len: usize,
    ) -> impl Iterator<Item = Option<&'a [u8]>> + 'a {
        (0..len).map(move |i| is_valid(nulls, i).then(|| self.value(i)))
    }
}

/// Appends one PLAIN byte-array value: `u32` length, then the bytes.
#[inline]
pub fn put_plain_bytes(out: &mut Vec<u8>, value: &[u8]) {
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value);
}

pub fn write_plain_bytes(
    array: &dyn Array,
    nulls: Option<&NullBuffer>,
    start: usize,
    end: usize,
    out: &mut Vec<u8>,
    stats: &mut StatisticsAccumulator,
) -> Result<(), TambakError> {
    let accessor = BytesAccessor::try_new(array)?;
    let StatisticsAccumulator::Bytes(stats) = stats else {
        return Err(stats_mismatch());
    };
    for r in start..end {
        if is_valid(nulls, r) {
            let value = accessor.value(r);
            stats.update(value);
            put_plain_bytes(out, value);
        }
    }
    Ok(())
}

/// Dictionary keys for a byte-array column. Statistics come from the
/// vocabulary when the dictionary page is flushed.
pub fn write_dictionary_keys(
    array: &dyn Array,
    nulls: Option<&NullBuffer>,
    start: usize,
    end: usize,
    out: &mut Vec<u8>,
    dictionary: &DictionaryState,
    page_state: &mut PageEncoderState,
) -> Result<(), TambakError> {
    let accessor = BytesAccessor::try_new(array)?;
    for r in start..end {
        if is_valid(nulls, r) {
            let index = dictionary.index_of(accessor.value(r))?;
            page_state.push_index(out, index)?;
        }
    }
    Ok(())
}

//==================================================================================
// 5. Enum catalog
//==================================================================================

/// The fixed vocabulary of an enum column; catalog order gives the keys.
#[derive(Debug, Clone)]
pub struct EnumCatalog {
    values: Vec<String>,
    index: HashMap<Vec<u8>, u32>,
    bit_width: u8,
}

impl EnumCatalog {
    pub fn new(values: Vec<String>) -> Result<Self, TambakError> {
        if values.is_empty() {
            return Err(TambakError::UnsupportedType("enum with an empty catalog".to_string()));
        }
        if values.len() > u32::MAX as usize {
            return Err(TambakError::UnsupportedType("enum catalog too large".to_string()));
        }
        let mut index = HashMap::with_capacity(values.len());
        for (i, value) in values.iter().enumerate() {
            if index.insert(value.as_bytes().to_vec(), i as u32).is_some() {
                return Err(TambakError::UnsupportedType(format!(
                    "duplicate enum value '{}'",
                    value
                )));
            }
        }
        let bit_width = dictionary_bit_width(values.len());
        Ok(Self { values, index, bit_width })
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn bit_width(&self) -> u8 {
        self.bit_width
    }

    fn lookup(&self, value: &[u8]) -> Result<u32, TambakError> {
        self.index.get(value).copied().ok_or_else(|| {
            TambakError::InvalidInput(format!(
                "'{}' is not a value of the enum",
                String::from_utf8_lossy(value)
            ))
        })
    }

    /// Catalog key of every entry of `array`; null entries map to 0.
    ///
    /// Accepts arrow dictionary arrays (values remapped through the catalog)
    /// and plain string arrays.
    pub fn keys(&self, array: &dyn Array) -> Result<Vec<u32>, TambakError> {
        let nulls = array.logical_nulls();
        if let Some(dict) = array.as_any_dictionary_opt() {
            let values = dict.values();
            let accessor = BytesAccessor::try_new(values.as_ref())?;
            let value_nulls = values.logical_nulls();
            // unknown or null dictionary values only fail when referenced
            let remap: Vec<Option<u32>> = (0..values.len())
                .map(|i| {
                    is_valid(value_nulls.as_ref(), i)
                        .then(|| self.index.get(accessor.value(i)).copied())
                        .flatten()
                })
                .collect();
            return dict
                .normalized_keys()
                .into_iter()
                .enumerate()
                .map(|(r, key)| {
                    if !is_valid(nulls.as_ref(), r) {
                        return Ok(0);
                    }
                    match remap.get(key).copied().flatten() {
                        Some(index) => Ok(index),
                        None => self.lookup(accessor.value(key)),
                    }
                })
                .collect();
        }
        let accessor = BytesAccessor::try_new(array)?;
        (0..array.len())
            .map(|r| {
                if is_valid(nulls.as_ref(), r) {
                    self.lookup(accessor.value(r))
                } else {
                    Ok(0)
                }
            })
            .collect()
    }
}

//! Min/max statistics per value kind.
//!
//! Numeric accumulators track the on-disk (target) type. Legacy `min`/`max`
//! are only reported for signed source kinds, since older readers interpret
//! them with signed comparison. Strings are compared as raw bytes.

use num_traits::{Bounded, Float};

use crate::format::Statistics;

//==================================================================================
// 1. Comparable values
//==================================================================================

/// A plain value with a statistics ordering and a little-endian encoding.
pub trait StatValue: Copy + std::fmt::Debug {
    fn initial_min() -> Self;
    fn initial_max() -> Self;
    fn less_than(self, other: Self) -> bool;
    /// `false` for values that cannot bound a range on their own (NaN).
    fn is_ordered(self) -> bool {
        true
    }
    /// Appends the plain (little-endian) encoding of the value.
    fn extend_le(self, out: &mut Vec<u8>);
    fn le_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(std::mem::size_of::<Self>());
        self.extend_le(&mut out);
        out
    }
    /// The accumulator holding this type, if `stats` is of the matching kind.
    fn accumulator(stats: &mut StatisticsAccumulator) -> Option<&mut MinMax<Self>>;
}

macro_rules! impl_int_stat_value {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl StatValue for $ty {
                fn initial_min() -> Self {
                    <$ty as Bounded>::max_value()
                }
                fn initial_max() -> Self {
                    <$ty as Bounded>::min_value()
                }
                fn less_than(self, other: Self) -> bool {
                    self < other
                }
                #[inline]
                fn extend_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
                fn accumulator(stats: &mut StatisticsAccumulator) -> Option<&mut MinMax<Self>> {
                    match stats {
                        StatisticsAccumulator::$variant { minmax, .. } => Some(minmax),
                        _ => None,
                    }
                }
            }
        )+
    };
}

impl_int_stat_value!(
    i32 => Int32,
    i64 => Int64,
    u32 => UInt32,
    u64 => UInt64,
    i128 => Decimal,
);

macro_rules! impl_float_stat_value {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl StatValue for $ty {
                fn initial_min() -> Self {
                    <$ty as Float>::infinity()
                }
                fn initial_max() -> Self {
                    <$ty as Float>::neg_infinity()
                }
                // NaN sorts above every other value.
                fn less_than(self, other: Self) -> bool {
                    if self.is_nan() {
                        false
                    } else if other.is_nan() {
                        true
                    } else {
                        self < other
                    }
                }
                fn is_ordered(self) -> bool {
                    !self.is_nan()
                }
                #[inline]
                fn extend_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
                fn accumulator(stats: &mut StatisticsAccumulator) -> Option<&mut MinMax<Self>> {
                    match stats {
                        StatisticsAccumulator::$variant { minmax } => Some(minmax),
                        _ => None,
                    }
                }
            }
        )+
    };
}

impl_float_stat_value!(f32 => Float, f64 => Double);

//==================================================================================
// 2. Accumulators
//==================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MinMax<T> {
    pub min: T,
    pub max: T,
    /// Set once a non-NaN value was seen; an all-NaN column has no range.
    seen_ordered: bool,
}

impl<T: StatValue> Default for MinMax<T> {
    fn default() -> Self {
        Self {
            min: T::initial_min(),
            max: T::initial_max(),
            seen_ordered: false,
        }
    }
}

impl<T: StatValue> MinMax<T> {
    #[inline]
    pub fn update(&mut self, value: T) {
        self.seen_ordered |= value.is_ordered();
        if value.less_than(self.min) {
            self.min = value;
        }
        if self.max.less_than(value) {
            self.max = value;
        }
    }

    pub fn has_stats(&self) -> bool {
        self.seen_ordered && !self.max.less_than(self.min)
    }
}

/// Byte-string statistics with a per-value size cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringStatistics {
    has_stats: bool,
    values_too_big: bool,
    min: Vec<u8>,
    max: Vec<u8>,
    max_size: usize,
}

impl StringStatistics {
    pub fn new(max_size: usize) -> Self {
        Self {
            has_stats: false,
            values_too_big: false,
            min: Vec::new(),
            max: Vec::new(),
            max_size,
        }
    }

    pub fn update(&mut self, value: &[u8]) {
        if self.values_too_big {
            return;
        }
        if value.len() > self.max_size {
            // stats are stored uncompressed in the footer; give up for this column
            self.values_too_big = true;
            self.has_stats = false;
            self.min.clear();
            self.max.clear();
            return;
        }
        if !self.has_stats || value < self.min.as_slice() {
            self.min = value.to_vec();
        }
        if !self.has_stats || value > self.max.as_slice() {
            self.max = value.to_vec();
        }
        self.has_stats = true;
    }

    pub fn has_stats(&self) -> bool {
        self.has_stats
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatisticsAccumulator {
    /// UUID and interval columns carry no min/max.
    Unsupported,
    Int32 { minmax: MinMax<i32>, signed: bool },
    Int64 { minmax: MinMax<i64>, signed: bool },
    UInt32 { minmax: MinMax<u32> },
    UInt64 { minmax: MinMax<u64> },
    Float { minmax: MinMax<f32> },
    Double { minmax: MinMax<f64> },
    Boolean { min: bool, max: bool },
    /// Wide decimals, encoded as 16-byte big-endian two's complement.
    Decimal { minmax: MinMax<i128> },
    Bytes(StringStatistics),
}

impl StatisticsAccumulator {
    pub fn int32(signed: bool) -> Self {
        Self::Int32 { minmax: MinMax::default(), signed }
    }

    pub fn int64(signed: bool) -> Self {
        Self::Int64 { minmax: MinMax::default(), signed }
    }

    pub fn boolean() -> Self {
        Self::Boolean { min: true, max: false }
    }

    pub fn bytes(max_size: usize) -> Self {
        Self::Bytes(StringStatistics::new(max_size))
    }

    pub fn has_stats(&self) -> bool {
        match self {
            Self::Unsupported => false,
            Self::Int32 { minmax, .. } => minmax.has_stats(),
            Self::Int64 { minmax, .. } => minmax.has_stats(),
            Self::UInt32 { minmax } => minmax.has_stats(),
            Self::UInt64 { minmax } => minmax.has_stats(),
            Self::Float { minmax } => minmax.has_stats(),
            Self::Double { minmax } => minmax.has_stats(),
            Self::Boolean { min, max } => !(*min && !*max),
            Self::Decimal { minmax } => minmax.has_stats(),
            Self::Bytes(s) => s.has_stats(),
        }
    }

    /// Whether legacy `min`/`max` may be reported (signed comparison semantics).
    fn reports_legacy(&self) -> bool {
        match self {
            Self::Int32 { signed, .. } | Self::Int64 { signed, .. } => *signed,
            Self::UInt32 { .. } | Self::UInt64 { .. } | Self::Unsupported => false,
            _ => true,
        }
    }

    pub fn min_value(&self) -> Option<Vec<u8>> {
        if !self.has_stats() {
            return None;
        }
        Some(match self {
            Self::Unsupported => return None,
            Self::Int32 { minmax, .. } => minmax.min.le_bytes(),
            Self::Int64 { minmax, .. } => minmax.min.le_bytes(),
            Self::UInt32 { minmax } => minmax.min.le_bytes(),
            Self::UInt64 { minmax } => minmax.min.le_bytes(),
            Self::Float { minmax } => minmax.min.le_bytes(),
            Self::Double { minmax } => minmax.min.le_bytes(),
            Self::Boolean { min, .. } => vec![*min as u8],
            Self::Decimal { minmax } => minmax.min.to_be_bytes().to_vec(),
            Self::Bytes(s) => s.min.clone(),
        })
    }

    pub fn max_value(&self) -> Option<Vec<u8>> {
        if !self.has_stats() {
            return None;
        }
        Some(match self {
            Self::Unsupported => return None,
            Self::Int32 { minmax, .. } => minmax.max.le_bytes(),
            Self::Int64 { minmax, .. } => minmax.max.le_bytes(),
            Self::UInt32 { minmax } => minmax.max.le_bytes(),
            Self::UInt64 { minmax } => minmax.max.le_bytes(),
            Self::Float { minmax } => minmax.max.le_bytes(),
            Self::Double { minmax } => minmax.max.le_bytes(),
            Self::Boolean { max, .. } => vec![*max as u8],
            Self::Decimal { minmax } => minmax.max.to_be_bytes().to_vec(),
            Self::Bytes(s) => s.max.clone(),
        })
    }

    pub fn min(&self) -> Option<Vec<u8>> {
        self.reports_legacy().then(|| self.min_value()).flatten()
    }

    pub fn max(&self) -> Option<Vec<u8>> {
        self.reports_legacy().then(|| self.max_value()).flatten()
    }

    /// Copies min/max into the footer statistics.
    pub fn apply_to(&self, statistics: &mut Statistics) {
        statistics.min = self.min();
        statistics.max = self.max();
        statistics.min_value = self.min_value();
        statistics.max_value = self.max_value();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int32_minmax() {
        let mut stats = StatisticsAccumulator::int32(true);
        let minmax = i32::accumulator(&mut stats).unwrap();
        for v in [5, -3, 10, 2] {
            minmax.update(v);
        }
        assert_eq!(stats.min_value(), Some((-3i32).to_le_bytes().to_vec()));
        assert_eq!(stats.max(), Some(10i32.to_le_bytes().to_vec()));
    }

    #[test]
    fn test_empty_numeric_has_no_stats() {
        let stats = StatisticsAccumulator::int64(true);
        assert!(!stats.has_stats());
        assert_eq!(stats.min_value(), None);
    }

    #[test]
    fn test_unsigned_has_no_legacy_stats() {
        let mut stats = StatisticsAccumulator::UInt32 { minmax: MinMax::default() };
        u32::accumulator(&mut stats).unwrap().update(4_000_000_000);
        assert_eq!(stats.min(), None);
        assert_eq!(stats.min_value(), Some(4_000_000_000u32.to_le_bytes().to_vec()));

        // narrow unsigned sources are stored as INT32 but still skip legacy stats
        let mut stats = StatisticsAccumulator::int32(false);
        i32::accumulator(&mut stats).unwrap().update(200);
        assert_eq!(stats.max(), None);
        assert!(stats.max_value().is_some());
    }

    #[test]
    fn test_nan_sorts_last() {
        let mut minmax = MinMax::<f64>::default();
        for v in [1.5, f64::NAN, -2.0] {
            minmax.update(v);
        }
        assert_eq!(minmax.min, -2.0);
        assert!(minmax.max.is_nan());
        assert!(minmax.has_stats());
    }

    #[test]
    fn test_all_nan_has_no_stats() {
        let mut stats = StatisticsAccumulator::Double { minmax: MinMax::default() };
        let minmax = f64::accumulator(&mut stats).unwrap();
        minmax.update(f64::NAN);
        minmax.update(f64::NAN);
        assert!(!stats.has_stats());
        assert_eq!(stats.min_value(), None);
        assert_eq!(stats.max_value(), None);

        // infinity is a real bound
        let mut minmax = MinMax::<f32>::default();
        minmax.update(f32::INFINITY);
        minmax.update(f32::NAN);
        assert!(minmax.has_stats());
        assert_eq!(minmax.min, f32::INFINITY);
    }

    #[test]
    fn test_boolean_stats() {
        let stats = StatisticsAccumulator::boolean();
        assert!(!stats.has_stats());
        let stats = StatisticsAccumulator::Boolean { min: false, max: true };
        assert_eq!(stats.min_value(), Some(vec![0]));
        assert_eq!(stats.max_value(), Some(vec![1]));
    }

    #[test]
    fn test_decimal_stats_are_big_endian() {
        let mut stats = StatisticsAccumulator::Decimal { minmax: MinMax::default() };
        i128::accumulator(&mut stats).unwrap().update(-1);
        assert_eq!(stats.min_value(), Some(vec![0xFF; 16]));
        assert_eq!(stats.min(), stats.min_value());
    }

    #[test]
    fn test_string_stats_and_size_cap() {
        let mut s = StringStatistics::new(4);
        s.update(b"pear");
        s.update(b"apple"); // too long: disables stats for good
        s.update(b"fig");
        assert!(!s.has_stats());

        let mut stats = StatisticsAccumulator::bytes(10);
        if let StatisticsAccumulator::Bytes(s) = &mut stats {
            let values: [&[u8]; 3] = [b"pear", b"apple", b"fig"];
            for v in values {
                s.update(v);
            }
        }
        assert_eq!(stats.min_value(), Some(b"apple".to_vec()));
        assert_eq!(stats.max_value(), Some(b"pear".to_vec()));
    }

    #[test]
    fn test_mismatched_accumulator() {
        let mut stats = StatisticsAccumulator::Unsupported;
        assert!(i32::accumulator(&mut stats).is_none());
    }
}

// In: src/config.rs

//! The single source of truth for all writer configuration.
//!
//! `WriterConfig` is created once at the application boundary (for example
//! from a JSON document) and then passed down through the column writer tree
//! via a shared, read-only `Arc<WriterContext>`, together with the block
//! compressor it selects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TambakError;

//==================================================================================
// I. Core Configuration Enums
//==================================================================================

/// The block compression codec applied to every page of every column.
///
/// The discriminants match the codec ids of the Parquet format.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CompressionCodec {
    Uncompressed = 0,
    #[default]
    Snappy = 1,
    Gzip = 2,
    /// Recognized id without a writer implementation.
    Lzo = 3,
    Brotli = 4,
    /// Hadoop-framed LZ4. Recognized id without a writer implementation.
    Lz4 = 5,
    Zstd = 6,
    Lz4Raw = 7,
}

impl CompressionCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uncompressed => "UNCOMPRESSED",
            Self::Snappy => "SNAPPY",
            Self::Gzip => "GZIP",
            Self::Lzo => "LZO",
            Self::Brotli => "BROTLI",
            Self::Lz4 => "LZ4",
            Self::Zstd => "ZSTD",
            Self::Lz4Raw => "LZ4_RAW",
        }
    }
}

/// Field ids keyed by column name. Nested names are resolved against the
/// `children` of their parent: `element` for list items, `key` and `value`
/// for map entries, the field name for struct fields.
pub type FieldIds = BTreeMap<String, FieldId>;

/// The field id of one column, with the ids of its nested fields.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldId {
    #[serde(default)]
    pub field_id: Option<i32>,
    #[serde(default)]
    pub children: FieldIds,
}

impl FieldId {
    pub fn new(field_id: i32) -> Self {
        Self {
            field_id: Some(field_id),
            children: FieldIds::new(),
        }
    }

    pub fn with_child(mut self, name: impl Into<String>, child: FieldId) -> Self {
        self.children.insert(name.into(), child);
        self
    }
}

//==================================================================================
// II. The Unified WriterConfig
//==================================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct WriterConfig {
    /// Codec used for every data and dictionary page.
    #[serde(default)]
    pub codec: CompressionCodec,

    /// Optional codec level. Used by ZSTD, GZIP and BROTLI; ignored otherwise.
    #[serde(default)]
    pub compression_level: Option<i32>,

    /// Minimum ratio `plain / (rle + dictionary)` required to keep dictionary
    /// encoding for a string column. `None` (or a non-finite value) disables
    /// dictionary analysis entirely and every string column is written PLAIN.
    #[serde(default = "default_dictionary_ratio_threshold")]
    pub dictionary_compression_ratio_threshold: Option<f64>,

    /// Once a dictionary holds more entries than this and is already projected
    /// to lose against plain encoding, analysis stops growing it.
    #[serde(default = "default_dictionary_analyze_threshold")]
    pub dictionary_analyze_threshold: usize,

    /// Soft cap on the estimated uncompressed size of a data page.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Hard cap on the estimated dictionary page size.
    #[serde(default = "default_max_dictionary_page_size")]
    pub max_dictionary_page_size: usize,

    /// Number of rows buffered by the `TableWriter` before a row group is flushed.
    #[serde(default = "default_row_group_size")]
    pub row_group_size: usize,

    /// String values longer than this disable min/max statistics for the column.
    #[serde(default = "default_max_string_statistics_size")]
    pub max_string_statistics_size: usize,

    /// Field ids written into the schema elements. Columns without an entry
    /// get no field id.
    #[serde(default)]
    pub field_ids: FieldIds,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            compression_level: None,
            dictionary_compression_ratio_threshold: default_dictionary_ratio_threshold(),
            dictionary_analyze_threshold: default_dictionary_analyze_threshold(),
            max_page_size: default_max_page_size(),
            max_dictionary_page_size: default_max_dictionary_page_size(),
            row_group_size: default_row_group_size(),
            max_string_statistics_size: default_max_string_statistics_size(),
            field_ids: FieldIds::new(),
        }
    }
}

impl WriterConfig {
    /// Parses a configuration from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, TambakError> {
        let config: WriterConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the dictionary threshold if dictionary compression is enabled.
    pub fn dictionary_threshold(&self) -> Option<f64> {
        self.dictionary_compression_ratio_threshold
            .filter(|t| t.is_finite() && *t < f64::MAX)
    }

    /// Disables dictionary analysis: every string column is written PLAIN.
    pub fn without_dictionary(mut self) -> Self {
        self.dictionary_compression_ratio_threshold = None;
        self
    }

    pub fn validate(&self) -> Result<(), TambakError> {
        if self.max_page_size == 0 {
            return Err(TambakError::InvalidConfig("max_page_size must be positive".into()));
        }
        if self.max_dictionary_page_size == 0 {
            return Err(TambakError::InvalidConfig(
                "max_dictionary_page_size must be positive".into(),
            ));
        }
        if self.row_group_size == 0 {
            return Err(TambakError::InvalidConfig("row_group_size must be positive".into()));
        }
        if let Some(t) = self.dictionary_compression_ratio_threshold {
            if t.is_nan() || t < 0.0 {
                return Err(TambakError::InvalidConfig(format!(
                    "dictionary_compression_ratio_threshold must be non-negative, got {}",
                    t
                )));
            }
        }
        if let Some(level) = self.compression_level {
            let valid = match self.codec {
                CompressionCodec::Zstd => (-131_072..=22).contains(&level),
                CompressionCodec::Gzip => (0..=9).contains(&level),
                CompressionCodec::Brotli => (0..=11).contains(&level),
                _ => true,
            };
            if !valid {
                return Err(TambakError::InvalidConfig(format!(
                    "compression level {} is out of range for {}",
                    level,
                    self.codec.as_str()
                )));
            }
        }
        Ok(())
    }
}

/// Helper for `serde` to default the dictionary ratio threshold.
fn default_dictionary_ratio_threshold() -> Option<f64> {
    Some(1.0)
}

fn default_dictionary_analyze_threshold() -> usize {
    10_000
}

fn default_max_page_size() -> usize {
    100_000_000
}

fn default_max_dictionary_page_size() -> usize {
    1_000_000_000
}

fn default_row_group_size() -> usize {
    122_880
}

fn default_max_string_statistics_size() -> usize {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config = WriterConfig::from_json("{}").unwrap();
        assert_eq!(config, WriterConfig::default());
        assert_eq!(config.dictionary_threshold(), Some(1.0));
        assert_eq!(config.max_page_size, 100_000_000);
    }

    #[test]
    fn test_partial_json_overrides() {
        let config =
            WriterConfig::from_json(r#"{"codec": "zstd", "compression_level": 9, "row_group_size": 10}"#)
                .unwrap();
        assert_eq!(config.codec, CompressionCodec::Zstd);
        assert_eq!(config.compression_level, Some(9));
        assert_eq!(config.row_group_size, 10);
    }

    #[test]
    fn test_null_threshold_disables_dictionary() {
        let config =
            WriterConfig::from_json(r#"{"dictionary_compression_ratio_threshold": null}"#).unwrap();
        assert_eq!(config.dictionary_threshold(), None);

        let mut config = WriterConfig::default();
        config.dictionary_compression_ratio_threshold = Some(f64::MAX);
        assert_eq!(config.dictionary_threshold(), None);
    }

    #[test]
    fn test_nested_field_ids_from_json() {
        let config = WriterConfig::from_json(
            r#"{"field_ids": {"tags": {"field_id": 3, "children": {"element": {"field_id": 4}}}}}"#,
        )
        .unwrap();
        let expected = FieldId::new(3).with_child("element", FieldId::new(4));
        assert_eq!(config.field_ids.get("tags"), Some(&expected));
    }

    #[test]
    fn test_invalid_level_rejected() {
        let err = WriterConfig::from_json(r#"{"codec": "gzip", "compression_level": 42}"#).unwrap_err();
        assert!(matches!(err, TambakError::InvalidConfig(_)));
        assert!(err.to_string().contains("GZIP"));
    }
}

//! Dictionary analysis for byte-string columns.
//!
//! During the analyze pass every valid value is inserted into a value -> index
//! map while three size estimates are kept: the plain encoding, the dictionary
//! page, and the RLE-encoded index stream. `finalize_analyze` compares them and
//! freezes the decision: a key bit width of zero means the column is written
//! PLAIN and the map is dropped.

use hashbrown::HashMap;
use log::debug;

use crate::config::WriterConfig;
use crate::error::TambakError;
use crate::kernels::leb128;
use crate::kernels::rle::dictionary_bit_width;

/// Bytes of the `u32` length prefix on each plain value.
const STRING_LENGTH_SIZE: usize = 4;
/// Upper bound on the bytes needed for one dictionary key.
const MAX_DICTIONARY_KEY_SIZE: usize = 4;

#[derive(Debug, Default, Clone)]
pub struct DictionaryState {
    map: HashMap<Vec<u8>, u32>,
    estimated_plain_size: usize,
    estimated_dict_page_size: usize,
    estimated_rle_pages_size: usize,
    bit_width: u8,
}

impl DictionaryState {
    /// Feeds one batch of values (`None` for nulls) into the analysis.
    pub fn analyze<'a, I>(&mut self, values: I, config: &WriterConfig)
    where
        I: IntoIterator<Item = Option<&'a [u8]>>,
    {
        if config.dictionary_threshold().is_none()
            || (self.map.len() > config.dictionary_analyze_threshold && self.wont_use(config))
        {
            return;
        }

        let mut last_index = u32::MAX;
        let mut run_length = 0usize;
        let mut run_count = 0usize;
        for value in values.into_iter().flatten() {
            run_length += 1;
            let next_index = self.map.len() as u32;
            let index = match self.map.get(value) {
                Some(&index) => index,
                None => {
                    self.map.insert(value.to_vec(), next_index);
                    self.estimated_dict_page_size += value.len() + MAX_DICTIONARY_KEY_SIZE;
                    next_index
                }
            };
            self.estimated_plain_size += value.len() + STRING_LENGTH_SIZE;
            if index != last_index {
                // the key width is unknown until the end; keys are added below
                self.estimated_rle_pages_size += leb128::encoded_len(run_length as u64);
                run_length = 0;
                run_count += 1;
                last_index = index;
            }
        }
        self.estimated_rle_pages_size += MAX_DICTIONARY_KEY_SIZE * run_count;
    }

    /// Plain size over dictionary size; 1 when any estimate is still zero.
    pub fn compression_ratio(&self) -> f64 {
        if self.estimated_plain_size == 0
            || self.estimated_rle_pages_size == 0
            || self.estimated_dict_page_size == 0
        {
            return 1.0;
        }
        self.estimated_plain_size as f64
            / (self.estimated_rle_pages_size + self.estimated_dict_page_size) as f64
    }

    pub fn wont_use(&self, config: &WriterConfig) -> bool {
        match config.dictionary_threshold() {
            None => true,
            Some(threshold) => {
                self.estimated_dict_page_size > config.max_dictionary_page_size
                    || self.compression_ratio() < threshold
            }
        }
    }

    /// Freezes the PLAIN / DICTIONARY decision for the row group.
    pub fn finalize_analyze(&mut self, config: &WriterConfig, column: &str) {
        if self.wont_use(config) {
            self.map.clear();
            self.bit_width = 0;
        } else {
            self.bit_width = dictionary_bit_width(self.map.len());
        }
        debug!(
            "column '{}': {} dictionary entries, ratio {:.2}, encoding {}",
            column,
            self.map.len(),
            self.compression_ratio(),
            if self.is_dictionary_encoded() { "RLE_DICTIONARY" } else { "PLAIN" }
        );
        log_metric!(
            "event" = "dictionary_decision",
            "column" = column,
            "entries" = self.map.len(),
            "plain_size" = self.estimated_plain_size,
            "dict_page_size" = self.estimated_dict_page_size,
            "rle_size" = self.estimated_rle_pages_size,
            "bit_width" = self.bit_width
        );
    }

    pub fn is_dictionary_encoded(&self) -> bool {
        self.bit_width != 0
    }

    pub fn bit_width(&self) -> u8 {
        self.bit_width
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn estimated_dict_page_size(&self) -> usize {
        self.estimated_dict_page_size
    }

    pub fn index_of(&self, value: &[u8]) -> Result<u32, TambakError> {
        self.map.get(value).copied().ok_or_else(|| {
            TambakError::InternalError("value missing from the analyzed dictionary".to_string())
        })
    }

    /// The vocabulary in index order.
    pub fn values_in_index_order(&self) -> Vec<&[u8]> {
        let mut values: Vec<&[u8]> = vec![&[][..]; self.map.len()];
        for (value, &index) in &self.map {
            values[index as usize] = value.as_slice();
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze_strs(state: &mut DictionaryState, values: &[Option<&str>], config: &WriterConfig) {
        state.analyze(values.iter().map(|v| v.map(str::as_bytes)), config);
    }

    #[test]
    fn test_low_cardinality_uses_dictionary() {
        let config = WriterConfig::default();
        let mut state = DictionaryState::default();
        let values: Vec<Option<&str>> = (0..1000usize)
            .map(|i| if i % 7 == 0 { None } else { Some(["red", "green", "blue"][i % 3]) })
            .collect();
        analyze_strs(&mut state, &values, &config);
        state.finalize_analyze(&config, "color");
        assert!(state.is_dictionary_encoded());
        assert_eq!(state.len(), 3);
        assert_eq!(state.bit_width(), 2);
        let expected: Vec<&[u8]> = vec![b"green", b"blue", b"red"];
        assert_eq!(state.values_in_index_order(), expected);
    }

    #[test]
    fn test_unique_values_fall_back_to_plain() {
        let config = WriterConfig::default();
        let mut state = DictionaryState::default();
        let owned: Vec<String> = (0..500).map(|i| format!("value-{}", i)).collect();
        let values: Vec<Option<&str>> = owned.iter().map(|s| Some(s.as_str())).collect();
        analyze_strs(&mut state, &values, &config);
        assert!(state.compression_ratio() < 1.0);
        state.finalize_analyze(&config, "id");
        assert!(!state.is_dictionary_encoded());
        assert!(state.is_empty());
    }

    #[test]
    fn test_disabled_threshold_skips_analysis() {
        let config = WriterConfig::default().without_dictionary();
        let mut state = DictionaryState::default();
        analyze_strs(&mut state, &[Some("a"), Some("a")], &config);
        assert!(state.is_empty());
        state.finalize_analyze(&config, "a");
        assert_eq!(state.bit_width(), 0);
    }

    #[test]
    fn test_single_entry_gets_one_bit() {
        let config = WriterConfig::default();
        let mut state = DictionaryState::default();
        analyze_strs(&mut state, &[Some("x"); 64], &config);
        state.finalize_analyze(&config, "x");
        assert_eq!(state.bit_width(), 1);
        assert_eq!(state.index_of(b"x").unwrap(), 0);
        assert!(state.index_of(b"y").is_err());
    }

    #[test]
    fn test_dictionary_page_cap() {
        let config = WriterConfig {
            max_dictionary_page_size: 8,
            ..WriterConfig::default()
        };
        let mut state = DictionaryState::default();
        analyze_strs(&mut state, &[Some("abcdef"), Some("abcdef"), Some("ghijkl")], &config);
        assert!(state.wont_use(&config));
    }
}

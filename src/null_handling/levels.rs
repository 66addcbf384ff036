//! Repetition and definition level computation.
//!
//! Every column writer, structural or leaf, owns a `LevelState`. A leaf's
//! levels are bounded by its `max_repeat` / `max_define`; structural writers
//! additionally use the `DEFINE_VALID` sentinel to mark slots that are fully
//! defined at their own depth, leaving the final value to their children.

use arrow::buffer::NullBuffer;

use crate::error::TambakError;

/// Sentinel definition level: the slot is valid at this structural node.
pub const DEFINE_VALID: u16 = u16::MAX;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LevelState {
    pub repetition_levels: Vec<u16>,
    pub definition_levels: Vec<u16>,
    /// Set for slots that carry no child value (null or empty lists, and
    /// anything below them). Only structural nodes fill this.
    pub is_empty: Vec<bool>,
    pub null_count: u64,
}

impl LevelState {
    /// Whether slot `index` is flagged empty. Missing flags mean "not empty".
    pub fn is_empty_at(&self, index: usize) -> bool {
        self.is_empty.get(index).copied().unwrap_or(false)
    }

    /// Repetition level a child should use for the first entry under slot `index`.
    pub fn first_repeat_level(&self, index: usize, default: u16) -> u16 {
        self.repetition_levels.get(index).copied().unwrap_or(default)
    }
}

/// Validity of entry `index`; an absent buffer means every entry is valid.
#[inline]
pub fn is_valid(nulls: Option<&NullBuffer>, index: usize) -> bool {
    nulls.map_or(true, |n| n.is_valid(index))
}

/// Copies the repetition levels the parent added since the last call.
///
/// Top-level columns carry no repetition levels.
pub fn handle_repeat_levels(state: &mut LevelState, parent: Option<&LevelState>) {
    if let Some(parent) = parent {
        let start = state.repetition_levels.len();
        if let Some(suffix) = parent.repetition_levels.get(start..) {
            state.repetition_levels.extend_from_slice(suffix);
        }
    }
}

/// Extends `state.definition_levels` for one batch.
///
/// Without a parent, one level is produced per entry of the batch. With a
/// parent, one level is produced per new parent slot: slots the parent already
/// resolved (anything below `DEFINE_VALID`) inherit the parent's level, the
/// rest are decided by this column's own validity. `count` is the length of
/// the batch array.
#[allow(clippy::too_many_arguments)]
pub fn handle_define_levels(
    state: &mut LevelState,
    parent: Option<&LevelState>,
    nulls: Option<&NullBuffer>,
    count: usize,
    define_value: u16,
    null_value: u16,
    nullable: bool,
    column: &str,
) -> Result<(), TambakError> {
    match parent {
        Some(parent) => {
            let mut vector_index = 0;
            while state.definition_levels.len() < parent.definition_levels.len() {
                let current_index = state.definition_levels.len();
                let parent_level = parent.definition_levels[current_index];
                if parent_level != DEFINE_VALID {
                    state.definition_levels.push(parent_level);
                } else {
                    if vector_index >= count {
                        return Err(TambakError::InvalidInput(format!(
                            "column '{}' has fewer values ({}) than its parent slots",
                            column, count
                        )));
                    }
                    if is_valid(nulls, vector_index) {
                        state.definition_levels.push(define_value);
                    } else {
                        if !nullable {
                            return Err(TambakError::NullConstraint(column.to_string()));
                        }
                        state.null_count += 1;
                        state.definition_levels.push(null_value);
                    }
                }
                if !parent.is_empty_at(current_index) {
                    vector_index += 1;
                }
            }
        }
        None => {
            state.definition_levels.reserve(count);
            for i in 0..count {
                if is_valid(nulls, i) {
                    state.definition_levels.push(define_value);
                } else {
                    if !nullable {
                        return Err(TambakError::NullConstraint(column.to_string()));
                    }
                    state.null_count += 1;
                    state.definition_levels.push(null_value);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_levels() {
        let nulls = NullBuffer::from(vec![true, false, true]);
        let mut state = LevelState::default();
        handle_define_levels(&mut state, None, Some(&nulls), 3, 1, 0, true, "a").unwrap();
        assert_eq!(state.definition_levels, vec![1, 0, 1]);
        assert_eq!(state.null_count, 1);
        handle_repeat_levels(&mut state, None);
        assert!(state.repetition_levels.is_empty());
    }

    #[test]
    fn test_top_level_null_rejected() {
        let nulls = NullBuffer::from(vec![true, false]);
        let mut state = LevelState::default();
        let err = handle_define_levels(&mut state, None, Some(&nulls), 2, 0, 0, false, "id")
            .unwrap_err();
        assert!(matches!(err, TambakError::NullConstraint(ref c) if c == "id"));
    }

    #[test]
    fn test_inherits_parent_levels() {
        // parent: [null list (0), empty list (1), two valid slots]
        let parent = LevelState {
            repetition_levels: vec![0, 0, 0, 1],
            definition_levels: vec![0, 1, DEFINE_VALID, DEFINE_VALID],
            is_empty: vec![true, true, false, false],
            null_count: 0,
        };
        let nulls = NullBuffer::from(vec![true, false]);
        let mut state = LevelState::default();
        handle_repeat_levels(&mut state, Some(&parent));
        handle_define_levels(&mut state, Some(&parent), Some(&nulls), 2, 3, 2, true, "x").unwrap();
        assert_eq!(state.definition_levels, vec![0, 1, 3, 2]);
        assert_eq!(state.repetition_levels, vec![0, 0, 0, 1]);
        assert_eq!(state.null_count, 1);
    }

    #[test]
    fn test_short_child_is_error() {
        let parent = LevelState {
            definition_levels: vec![DEFINE_VALID, DEFINE_VALID],
            ..Default::default()
        };
        let mut state = LevelState::default();
        let err = handle_define_levels(&mut state, Some(&parent), None, 1, 1, 0, true, "x")
            .unwrap_err();
        assert!(matches!(err, TambakError::InvalidInput(_)));
    }
}

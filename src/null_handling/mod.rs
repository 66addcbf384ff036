//! This module is the public API for nullability handling in the writer.
//!
//! It covers two concerns: turning validity and nesting into repetition and
//! definition levels (`levels`), and merging parent validity into child arrays
//! before they are encoded (`bitmap`).

/// Repetition/definition level computation.
pub mod levels;

/// Validity-bitmap kernels for nested arrays.
pub mod bitmap;

mod bitmap_tests;

pub use self::bitmap::{expand_fixed_size_nulls, push_down_nulls};
pub use self::levels::{handle_define_levels, handle_repeat_levels, is_valid, LevelState, DEFINE_VALID};

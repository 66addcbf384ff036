//! Validity-bitmap kernels used by the structural writers.
//!
//! Arrow allows a child entry to hold a valid value underneath a null struct
//! or fixed-size-list row. The writer must never emit such a value, so parent
//! nulls are merged into the child's own validity before it is written.

use arrow::array::{make_array, Array, ArrayRef};
use arrow::buffer::{BooleanBuffer, NullBuffer};

use crate::error::TambakError;

/// Returns `child` with every slot that is null in `parent_nulls` marked null.
///
/// `parent_nulls` must have one entry per child entry. Without parent nulls
/// the child is returned unchanged (an `Arc` clone).
pub fn push_down_nulls(
    child: &ArrayRef,
    parent_nulls: Option<&NullBuffer>,
) -> Result<ArrayRef, TambakError> {
    let Some(parent) = parent_nulls.filter(|n| n.null_count() > 0) else {
        return Ok(child.clone());
    };
    if parent.len() != child.len() {
        return Err(TambakError::InternalError(format!(
            "validity length {} does not match child length {}",
            parent.len(),
            child.len()
        )));
    }
    let merged = NullBuffer::union(Some(parent), child.nulls());
    let data = child.to_data().into_builder().nulls(merged).build()?;
    Ok(make_array(data))
}

/// Repeats every entry of a fixed-size-list validity `size` times, giving the
/// validity of the list's flattened values.
pub fn expand_fixed_size_nulls(nulls: &NullBuffer, size: usize) -> NullBuffer {
    let expanded = BooleanBuffer::collect_bool(nulls.len() * size, |i| nulls.is_valid(i / size));
    NullBuffer::new(expanded)
}

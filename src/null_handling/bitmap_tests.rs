//==================================================================================
// Unit Tests for the validity kernels
//==================================================================================

#[cfg(test)]
mod tests {
    use crate::null_handling::bitmap::*;
    use arrow::array::{Array, ArrayRef, Int32Array, StringArray};
    use arrow::buffer::NullBuffer;
    use std::sync::Arc;

    #[test]
    fn test_push_down_marks_child_null() {
        let child: ArrayRef = Arc::new(Int32Array::from(vec![Some(1), Some(2), None, Some(4)]));
        let parent = NullBuffer::from(vec![true, false, true, false]);
        let merged = push_down_nulls(&child, Some(&parent)).unwrap();
        let merged = merged.as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(merged, &Int32Array::from(vec![Some(1), None, None, None]));
    }

    #[test]
    fn test_push_down_without_parent_nulls_is_identity() {
        let child: ArrayRef = Arc::new(StringArray::from(vec!["a", "b"]));
        let all_valid = NullBuffer::new_valid(2);
        let out = push_down_nulls(&child, Some(&all_valid)).unwrap();
        assert!(Arc::ptr_eq(&out, &child));
        let out = push_down_nulls(&child, None).unwrap();
        assert!(Arc::ptr_eq(&out, &child));
    }

    #[test]
    fn test_push_down_on_sliced_child() {
        let full: ArrayRef = Arc::new(Int32Array::from(vec![Some(9), Some(1), Some(2), Some(3)]));
        let child = full.slice(1, 3);
        let parent = NullBuffer::from(vec![false, true, true]);
        let merged = push_down_nulls(&child, Some(&parent)).unwrap();
        let merged = merged.as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(merged, &Int32Array::from(vec![None, Some(2), Some(3)]));
    }

    #[test]
    fn test_push_down_length_mismatch() {
        let child: ArrayRef = Arc::new(Int32Array::from(vec![1, 2, 3]));
        let parent = NullBuffer::from(vec![true, false]);
        assert!(push_down_nulls(&child, Some(&parent)).is_err());
    }

    #[test]
    fn test_expand_fixed_size_nulls() {
        let nulls = NullBuffer::from(vec![true, false, true]);
        let expanded = expand_fixed_size_nulls(&nulls, 2);
        let bits: Vec<bool> = expanded.iter().collect();
        assert_eq!(bits, vec![true, true, false, false, true, true]);
        assert_eq!(expanded.null_count(), 2);
    }
}

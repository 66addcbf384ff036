//! Struct and list writers.
//!
//! Structural writers produce levels but no pages. They compute their own
//! repetition/definition levels (using `DEFINE_VALID` for slots that their
//! children must resolve) and forward a child array whose entries line up
//! with the non-empty slots they produced.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, StructArray, UInt64Array};
use arrow::buffer::NullBuffer;

use super::{reborrow_geometry, ColumnWriter, ColumnWriterState, GeometryAccumulator};
use crate::error::TambakError;
use crate::format::RowGroupMetaData;
use crate::null_handling::{
    expand_fixed_size_nulls, handle_define_levels, handle_repeat_levels, is_valid, push_down_nulls,
    LevelState, DEFINE_VALID,
};
use crate::sink::PageSink;

//==================================================================================
// 1. Struct
//==================================================================================

#[derive(Debug)]
pub struct StructWriter {
    name: String,
    children: Vec<ColumnWriter>,
    max_define: u16,
    nullable: bool,
}

#[derive(Debug)]
pub struct StructWriteState {
    pub levels: LevelState,
    children: Vec<ColumnWriterState>,
}

impl StructWriteState {
    pub fn children(&self) -> &[ColumnWriterState] {
        &self.children
    }
}

impl StructWriter {
    pub fn new(name: impl Into<String>, children: Vec<ColumnWriter>, max_define: u16, nullable: bool) -> Self {
        Self {
            name: name.into(),
            children,
            max_define,
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[ColumnWriter] {
        &self.children
    }

    pub fn initialize_write_state(&self) -> StructWriteState {
        StructWriteState {
            levels: LevelState::default(),
            children: self.children.iter().map(ColumnWriter::initialize_write_state).collect(),
        }
    }

    pub fn has_analyze(&self) -> bool {
        self.children.iter().any(ColumnWriter::has_analyze)
    }

    /// Downcasts the batch and checks its arity.
    fn as_struct<'a>(&self, array: &'a ArrayRef) -> Result<&'a StructArray, TambakError> {
        let struct_array = array.as_struct_opt().ok_or_else(|| {
            TambakError::InvalidInput(format!(
                "column '{}' expects a struct array, got {:?}",
                self.name,
                array.data_type()
            ))
        })?;
        if struct_array.num_columns() != self.children.len() {
            return Err(TambakError::InvalidInput(format!(
                "struct column '{}' has {} fields, expected {}",
                self.name,
                struct_array.num_columns(),
                self.children.len()
            )));
        }
        Ok(struct_array)
    }

    /// Child `index` with the struct's nulls merged into its validity.
    fn child_array(struct_array: &StructArray, index: usize) -> Result<ArrayRef, TambakError> {
        push_down_nulls(struct_array.column(index), struct_array.nulls())
    }

    pub fn analyze(&self, state: &mut StructWriteState, array: &ArrayRef) -> Result<(), TambakError> {
        let struct_array = self.as_struct(array)?;
        for (index, (child, child_state)) in self.children.iter().zip(&mut state.children).enumerate() {
            if child.has_analyze() {
                child.analyze(child_state, &Self::child_array(struct_array, index)?)?;
            }
        }
        Ok(())
    }

    pub fn finalize_analyze(&self, state: &mut StructWriteState) -> Result<(), TambakError> {
        for (child, child_state) in self.children.iter().zip(&mut state.children) {
            child.finalize_analyze(child_state)?;
        }
        Ok(())
    }

    pub fn prepare(
        &self,
        state: &mut StructWriteState,
        parent: Option<&LevelState>,
        array: &ArrayRef,
    ) -> Result<(), TambakError> {
        let struct_array = self.as_struct(array)?;
        if let Some(parent) = parent {
            let start = state.levels.is_empty.len();
            if let Some(suffix) = parent.is_empty.get(start..) {
                state.levels.is_empty.extend_from_slice(suffix);
            }
        }
        handle_repeat_levels(&mut state.levels, parent);
        handle_define_levels(
            &mut state.levels,
            parent,
            struct_array.nulls(),
            struct_array.len(),
            DEFINE_VALID,
            self.max_define.saturating_sub(1),
            self.nullable,
            &self.name,
        )?;
        for (index, (child, child_state)) in self.children.iter().zip(&mut state.children).enumerate() {
            let child_array = Self::child_array(struct_array, index)?;
            child.prepare(child_state, Some(&state.levels), &child_array)?;
        }
        Ok(())
    }

    pub fn begin_write(&self, state: &mut StructWriteState) -> Result<(), TambakError> {
        for (child, child_state) in self.children.iter().zip(&mut state.children) {
            child.begin_write(child_state)?;
        }
        Ok(())
    }

    pub fn write(
        &self,
        state: &mut StructWriteState,
        array: &ArrayRef,
        mut geometry: Option<&mut dyn GeometryAccumulator>,
    ) -> Result<(), TambakError> {
        let struct_array = self.as_struct(array)?;
        for (index, (child, child_state)) in self.children.iter().zip(&mut state.children).enumerate() {
            let child_array = Self::child_array(struct_array, index)?;
            child.write(child_state, &child_array, reborrow_geometry(&mut geometry))?;
        }
        Ok(())
    }

    pub fn finalize_write(
        &self,
        state: &mut StructWriteState,
        sink: &mut dyn PageSink,
        mut geometry: Option<&mut dyn GeometryAccumulator>,
        row_group: &mut RowGroupMetaData,
    ) -> Result<(), TambakError> {
        for (child, child_state) in self.children.iter().zip(&mut state.children) {
            // nulls of the struct itself are nulls of every child
            child_state.levels_mut().null_count += state.levels.null_count;
            child.finalize_write(child_state, sink, reborrow_geometry(&mut geometry), row_group)?;
        }
        Ok(())
    }
}

//==================================================================================
// 2. Lists
//==================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// Variable-length lists (and maps, as lists of key/value structs).
    Variable,
    /// Fixed-size lists of the given size.
    Fixed(usize),
}

#[derive(Debug)]
pub struct ListWriter {
    name: String,
    kind: ListKind,
    child: Box<ColumnWriter>,
    max_repeat: u16,
    max_define: u16,
    nullable: bool,
}

#[derive(Debug)]
pub struct ListWriteState {
    pub levels: LevelState,
    child: Box<ColumnWriterState>,
    /// Parent slots consumed so far.
    parent_index: usize,
}

impl ListWriteState {
    pub fn child(&self) -> &ColumnWriterState {
        &self.child
    }
}

#[derive(Debug, Clone, Copy)]
enum Offsets<'a> {
    Small(&'a [i32]),
    Large(&'a [i64]),
}

impl Offsets<'_> {
    /// Child range `[start, end)` of row `row`.
    fn range(&self, row: usize) -> (usize, usize) {
        match self {
            Offsets::Small(o) => (o[row] as usize, o[row + 1] as usize),
            Offsets::Large(o) => (o[row] as usize, o[row + 1] as usize),
        }
    }
}

/// A list-like batch reduced to what the list writer needs.
struct ListInput<'a> {
    /// `None` for fixed-size lists.
    offsets: Option<Offsets<'a>>,
    values: ArrayRef,
    nulls: Option<&'a NullBuffer>,
    len: usize,
}

impl ListInput<'_> {
    fn row_length(&self, row: usize, fixed_size: usize) -> usize {
        match self.offsets {
            Some(offsets) => {
                let (start, end) = offsets.range(row);
                end - start
            }
            None => fixed_size,
        }
    }
}

impl ListWriter {
    pub fn new(
        name: impl Into<String>,
        kind: ListKind,
        child: ColumnWriter,
        max_repeat: u16,
        max_define: u16,
        nullable: bool,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            child: Box::new(child),
            max_repeat,
            max_define,
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn child(&self) -> &ColumnWriter {
        &self.child
    }

    pub fn initialize_write_state(&self) -> ListWriteState {
        ListWriteState {
            levels: LevelState::default(),
            child: Box::new(self.child.initialize_write_state()),
            parent_index: 0,
        }
    }

    pub fn has_analyze(&self) -> bool {
        self.child.has_analyze()
    }

    fn input<'a>(&self, array: &'a ArrayRef) -> Result<ListInput<'a>, TambakError> {
        let mismatch = || {
            TambakError::InvalidInput(format!(
                "column '{}' expects a list array, got {:?}",
                self.name,
                array.data_type()
            ))
        };
        match self.kind {
            ListKind::Variable => {
                if let Some(list) = array.as_list_opt::<i32>() {
                    Ok(ListInput {
                        offsets: Some(Offsets::Small(list.value_offsets())),
                        values: list.values().clone(),
                        nulls: list.nulls(),
                        len: list.len(),
                    })
                } else if let Some(list) = array.as_list_opt::<i64>() {
                    Ok(ListInput {
                        offsets: Some(Offsets::Large(list.value_offsets())),
                        values: list.values().clone(),
                        nulls: list.nulls(),
                        len: list.len(),
                    })
                } else if let Some(map) = array.as_map_opt() {
                    Ok(ListInput {
                        offsets: Some(Offsets::Small(map.value_offsets())),
                        values: Arc::new(map.entries().clone()),
                        nulls: map.nulls(),
                        len: map.len(),
                    })
                } else {
                    Err(mismatch())
                }
            }
            ListKind::Fixed(size) => {
                let list = array.as_fixed_size_list_opt().ok_or_else(mismatch)?;
                if size == 0 || list.value_length() as usize != size {
                    return Err(TambakError::InvalidInput(format!(
                        "column '{}' expects fixed lists of size {}, got {}",
                        self.name,
                        size,
                        list.value_length()
                    )));
                }
                Ok(ListInput {
                    offsets: None,
                    values: list.values().slice(0, list.len() * size),
                    nulls: list.nulls(),
                    len: list.len(),
                })
            }
        }
    }

    /// The child array lined up with this list's non-empty slots.
    ///
    /// Fixed lists forward every element with the row nulls pushed down.
    /// Variable lists forward the elements of valid rows only: a zero-copy
    /// slice when those rows are contiguous, a gather otherwise.
    fn child_array(&self, input: &ListInput<'_>) -> Result<ArrayRef, TambakError> {
        let Some(offsets) = input.offsets else {
            let ListKind::Fixed(size) = self.kind else {
                return Err(TambakError::InternalError("fixed list without a size".to_string()));
            };
            let expanded = input.nulls.map(|nulls| expand_fixed_size_nulls(nulls, size));
            return push_down_nulls(&input.values, expanded.as_ref());
        };

        let mut ranges = Vec::new();
        let mut contiguous = true;
        for row in 0..input.len {
            if !is_valid(input.nulls, row) {
                continue;
            }
            let (start, end) = offsets.range(row);
            if let Some(&(_, previous_end)) = ranges.last() {
                contiguous &= previous_end == start;
            }
            ranges.push((start, end));
        }
        match (ranges.first(), ranges.last()) {
            (Some(&(first, _)), Some(&(_, last))) if contiguous => Ok(input.values.slice(first, last - first)),
            (None, _) => Ok(input.values.slice(0, 0)),
            _ => {
                let indices = UInt64Array::from_iter_values(
                    ranges.iter().flat_map(|&(start, end)| (start as u64)..(end as u64)),
                );
                Ok(arrow::compute::take(input.values.as_ref(), &indices, None)?)
            }
        }
    }

    pub fn analyze(&self, state: &mut ListWriteState, array: &ArrayRef) -> Result<(), TambakError> {
        let input = self.input(array)?;
        let child_array = self.child_array(&input)?;
        self.child.analyze(&mut state.child, &child_array)
    }

    pub fn finalize_analyze(&self, state: &mut ListWriteState) -> Result<(), TambakError> {
        self.child.finalize_analyze(&mut state.child)
    }

    fn null_row(&self) -> Result<(), TambakError> {
        if self.nullable {
            Ok(())
        } else {
            Err(TambakError::NullConstraint(self.name.clone()))
        }
    }

    pub fn prepare(
        &self,
        state: &mut ListWriteState,
        parent: Option<&LevelState>,
        array: &ArrayRef,
    ) -> Result<(), TambakError> {
        let input = self.input(array)?;
        let vcount = match parent {
            Some(parent) => parent.definition_levels.len().saturating_sub(state.parent_index),
            None => input.len,
        };
        let (fixed, fixed_size) = match self.kind {
            ListKind::Fixed(size) => (true, size),
            ListKind::Variable => (false, 0),
        };
        let next_repeat = self.max_repeat + 1;

        let mut vector_index = 0;
        for i in 0..vcount {
            let parent_index = state.parent_index + i;
            let levels = &mut state.levels;
            if let Some(parent) = parent.filter(|p| p.is_empty_at(parent_index)) {
                levels.definition_levels.push(parent.definition_levels[parent_index]);
                levels.repetition_levels.push(parent.first_repeat_level(parent_index, self.max_repeat));
                levels.is_empty.push(true);
                continue;
            }
            if vector_index >= input.len {
                return Err(TambakError::InvalidInput(format!(
                    "column '{}' has fewer rows than its parent slots",
                    self.name
                )));
            }
            let first_repeat = parent.map_or(self.max_repeat, |p| p.first_repeat_level(parent_index, self.max_repeat));
            let parent_define = parent
                .map(|p| p.definition_levels[parent_index])
                .filter(|&level| level != DEFINE_VALID);

            // (definition level, slots, first slot empty)
            let (define, length, empty) = match parent_define {
                // resolved above us; fixed lists still span all their slots
                Some(level) => (level, if fixed { fixed_size } else { 1 }, !fixed),
                None if is_valid(input.nulls, vector_index) => {
                    let length = input.row_length(vector_index, fixed_size);
                    if length == 0 {
                        (self.max_define, 1, true)
                    } else {
                        (DEFINE_VALID, length, false)
                    }
                }
                None => {
                    self.null_row()?;
                    (self.max_define.saturating_sub(1), if fixed { fixed_size } else { 1 }, !fixed)
                }
            };
            levels.definition_levels.push(define);
            levels.repetition_levels.push(first_repeat);
            levels.is_empty.push(empty);
            for _ in 1..length {
                levels.definition_levels.push(define);
                levels.repetition_levels.push(next_repeat);
                levels.is_empty.push(false);
            }
            vector_index += 1;
        }
        state.parent_index += vcount;

        let child_array = self.child_array(&input)?;
        self.child.prepare(&mut state.child, Some(&state.levels), &child_array)
    }

    pub fn begin_write(&self, state: &mut ListWriteState) -> Result<(), TambakError> {
        self.child.begin_write(&mut state.child)
    }

    pub fn write(
        &self,
        state: &mut ListWriteState,
        array: &ArrayRef,
        geometry: Option<&mut dyn GeometryAccumulator>,
    ) -> Result<(), TambakError> {
        let input = self.input(array)?;
        let child_array = self.child_array(&input)?;
        self.child.write(&mut state.child, &child_array, geometry)
    }

    pub fn finalize_write(
        &self,
        state: &mut ListWriteState,
        sink: &mut dyn PageSink,
        geometry: Option<&mut dyn GeometryAccumulator>,
        row_group: &mut RowGroupMetaData,
    ) -> Result<(), TambakError> {
        self.child.finalize_write(&mut state.child, sink, geometry, row_group)
    }
}

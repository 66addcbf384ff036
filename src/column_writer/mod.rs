//! This module is the public API for the column writers.
//!
//! A schema is compiled by `factory::build_column_writer` into a tree of
//! `ColumnWriter`s mirroring the nesting. Each row group creates a matching
//! tree of `ColumnWriterState`s and drives it through the write protocol:
//!
//! `initialize_write_state -> analyze* -> finalize_analyze -> prepare* ->
//!  begin_write -> write* -> finalize_write`
//!
//! The writer tree is immutable after construction; everything that changes
//! while a row group is written lives in the state tree.

use arrow::array::{Array, ArrayRef};

use crate::config::WriterConfig;
use crate::error::TambakError;
use crate::format::RowGroupMetaData;
use crate::kernels::compression::{BlockCompressor, PageCompressor};
use crate::null_handling::LevelState;
use crate::sink::PageSink;

pub mod dictionary;
pub mod encoders;
pub mod factory;
pub mod leaf;
pub mod statistics;
pub mod structural;


pub use self::factory::build_column_writer;
pub use self::leaf::{LeafKind, LeafWriteState, LeafWriter};
pub use self::structural::{ListKind, ListWriteState, ListWriter, StructWriteState, StructWriter};

//==================================================================================
// 1. Shared Context & Side Channels
//==================================================================================

/// Read-only settings shared by every writer of one table.
#[derive(Debug)]
pub struct WriterContext {
    pub config: WriterConfig,
    pub compressor: Box<dyn BlockCompressor>,
}

impl WriterContext {
    /// Builds a context with the built-in compressor for `config.codec`.
    pub fn new(config: WriterConfig) -> Result<Self, TambakError> {
        config.validate()?;
        let compressor = PageCompressor::new(config.codec, config.compression_level)?;
        Ok(Self {
            config,
            compressor: Box::new(compressor),
        })
    }

    /// Builds a context around a caller-supplied compressor. `config.codec`
    /// and `config.compression_level` are not consulted.
    pub fn with_compressor(config: WriterConfig, compressor: Box<dyn BlockCompressor>) -> Result<Self, TambakError> {
        config.validate()?;
        Ok(Self { config, compressor })
    }
}

/// Receives the values of geometry columns as they are written.
pub trait GeometryAccumulator {
    /// Called after every write of a geometry column with the batch just written.
    fn update(&mut self, column: &str, values: &dyn Array, count: usize) -> Result<(), TambakError>;

    /// Called once per row group when the geometry column is finalized.
    fn finalize(&mut self, column: &str) -> Result<(), TambakError>;
}

//==================================================================================
// 2. Writer & State Trees
//==================================================================================

#[derive(Debug)]
pub enum ColumnWriter {
    Leaf(LeafWriter),
    Struct(StructWriter),
    List(ListWriter),
}

#[derive(Debug)]
pub enum ColumnWriterState {
    Leaf(Box<LeafWriteState>),
    Struct(StructWriteState),
    List(ListWriteState),
}

impl ColumnWriterState {
    pub fn levels(&self) -> &LevelState {
        match self {
            Self::Leaf(s) => &s.levels,
            Self::Struct(s) => &s.levels,
            Self::List(s) => &s.levels,
        }
    }

    pub fn levels_mut(&mut self) -> &mut LevelState {
        match self {
            Self::Leaf(s) => &mut s.levels,
            Self::Struct(s) => &mut s.levels,
            Self::List(s) => &mut s.levels,
        }
    }
}

fn state_mismatch(column: &str) -> TambakError {
    TambakError::InternalError(format!("write state does not match the writer of column '{}'", column))
}

impl ColumnWriter {
    pub fn name(&self) -> &str {
        match self {
            Self::Leaf(w) => w.name(),
            Self::Struct(w) => w.name(),
            Self::List(w) => w.name(),
        }
    }

    pub fn initialize_write_state(&self) -> ColumnWriterState {
        match self {
            Self::Leaf(w) => ColumnWriterState::Leaf(Box::new(w.initialize_write_state())),
            Self::Struct(w) => ColumnWriterState::Struct(w.initialize_write_state()),
            Self::List(w) => ColumnWriterState::List(w.initialize_write_state()),
        }
    }

    /// Whether any leaf below this writer wants an analyze pass.
    pub fn has_analyze(&self) -> bool {
        match self {
            Self::Leaf(w) => w.has_analyze(),
            Self::Struct(w) => w.has_analyze(),
            Self::List(w) => w.has_analyze(),
        }
    }

    pub fn analyze(&self, state: &mut ColumnWriterState, array: &ArrayRef) -> Result<(), TambakError> {
        match (self, state) {
            (Self::Leaf(w), ColumnWriterState::Leaf(s)) => w.analyze(s, array),
            (Self::Struct(w), ColumnWriterState::Struct(s)) => w.analyze(s, array),
            (Self::List(w), ColumnWriterState::List(s)) => w.analyze(s, array),
            _ => Err(state_mismatch(self.name())),
        }
    }

    pub fn finalize_analyze(&self, state: &mut ColumnWriterState) -> Result<(), TambakError> {
        match (self, state) {
            (Self::Leaf(w), ColumnWriterState::Leaf(s)) => {
                w.finalize_analyze(s);
                Ok(())
            }
            (Self::Struct(w), ColumnWriterState::Struct(s)) => w.finalize_analyze(s),
            (Self::List(w), ColumnWriterState::List(s)) => w.finalize_analyze(s),
            _ => Err(state_mismatch(self.name())),
        }
    }

    /// Computes levels and page boundaries for one batch.
    pub fn prepare(
        &self,
        state: &mut ColumnWriterState,
        parent: Option<&LevelState>,
        array: &ArrayRef,
    ) -> Result<(), TambakError> {
        match (self, state) {
            (Self::Leaf(w), ColumnWriterState::Leaf(s)) => w.prepare(s, parent, array),
            (Self::Struct(w), ColumnWriterState::Struct(s)) => w.prepare(s, parent, array),
            (Self::List(w), ColumnWriterState::List(s)) => w.prepare(s, parent, array),
            _ => Err(state_mismatch(self.name())),
        }
    }

    pub fn begin_write(&self, state: &mut ColumnWriterState) -> Result<(), TambakError> {
        match (self, state) {
            (Self::Leaf(w), ColumnWriterState::Leaf(s)) => w.begin_write(s),
            (Self::Struct(w), ColumnWriterState::Struct(s)) => w.begin_write(s),
            (Self::List(w), ColumnWriterState::List(s)) => w.begin_write(s),
            _ => Err(state_mismatch(self.name())),
        }
    }

    pub fn write(
        &self,
        state: &mut ColumnWriterState,
        array: &ArrayRef,
        geometry: Option<&mut dyn GeometryAccumulator>,
    ) -> Result<(), TambakError> {
        match (self, state) {
            (Self::Leaf(w), ColumnWriterState::Leaf(s)) => w.write(s, array, geometry),
            (Self::Struct(w), ColumnWriterState::Struct(s)) => w.write(s, array, geometry),
            (Self::List(w), ColumnWriterState::List(s)) => w.write(s, array, geometry),
            _ => Err(state_mismatch(self.name())),
        }
    }

    /// Emits the pages of every leaf below this writer and appends one
    /// column chunk per leaf to `row_group`.
    pub fn finalize_write(
        &self,
        state: &mut ColumnWriterState,
        sink: &mut dyn PageSink,
        geometry: Option<&mut dyn GeometryAccumulator>,
        row_group: &mut RowGroupMetaData,
    ) -> Result<(), TambakError> {
        match (self, state) {
            (Self::Leaf(w), ColumnWriterState::Leaf(s)) => w.finalize_write(s, sink, geometry, row_group),
            (Self::Struct(w), ColumnWriterState::Struct(s)) => {
                w.finalize_write(s, sink, geometry, row_group)
            }
            (Self::List(w), ColumnWriterState::List(s)) => w.finalize_write(s, sink, geometry, row_group),
            _ => Err(state_mismatch(self.name())),
        }
    }
}

/// Reborrows the optional accumulator for one child call.
pub(crate) fn reborrow_geometry<'a>(
    geometry: &'a mut Option<&mut dyn GeometryAccumulator>,
) -> Option<&'a mut dyn GeometryAccumulator> {
    match geometry {
        Some(g) => Some(&mut **g),
        None => None,
    }
}

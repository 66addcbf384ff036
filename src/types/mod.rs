//! This module defines the core, strongly-typed schema description used by the
//! writer factory.
//!
//! It includes the closed `LogicalType` enum and the `ColumnSchema` tree, plus
//! conversions from Arrow fields and schemas.

pub mod logical_type;

// Re-export the main type(s) for easier access.
pub use logical_type::{ColumnSchema, LogicalType, TimeUnit};

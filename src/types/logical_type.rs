//! This module defines the canonical, type-safe description of a table schema
//! consumed by the writer factory: a tree of `ColumnSchema` nodes, each with a
//! closed `LogicalType`.

use arrow::datatypes::{DataType as ArrowDataType, Field, IntervalUnit, Schema, TimeUnit as ArrowTimeUnit};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TambakError;

/// Arrow field metadata key naming a canonical extension type.
pub const EXTENSION_NAME_KEY: &str = "ARROW:extension:name";
/// Extension name marking a binary column as well-known-binary geometry.
pub const GEOMETRY_EXTENSION: &str = "geoarrow.wkb";
/// Extension name marking a 16-byte fixed binary column as a UUID.
pub const UUID_EXTENSION: &str = "arrow.uuid";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Second,
    Millisecond,
    Microsecond,
    Nanosecond,
}

/// The logical type of a column, nested types included.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum LogicalType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    /// Days since the epoch.
    Date32,
    /// Microseconds since midnight.
    Time64Micros,
    Timestamp(TimeUnit),
    Decimal { precision: u8, scale: i8 },
    Uuid,
    Interval,
    Utf8,
    Binary,
    /// Well-known-binary geometry, written as binary plus the geometry side channel.
    Geometry,
    /// A string enum with a fixed catalog; the catalog order defines the indices.
    Enum(Vec<String>),
    Struct(Vec<ColumnSchema>),
    List(Box<ColumnSchema>),
    /// A fixed-size list.
    Array { element: Box<ColumnSchema>, size: usize },
    Map { key: Box<ColumnSchema>, value: Box<ColumnSchema> },
}

impl LogicalType {
    /// Converts an Arrow `DataType` (plus the field's extension name) into a `LogicalType`.
    pub fn from_arrow_type(
        arrow_type: &ArrowDataType,
        extension: Option<&str>,
    ) -> Result<Self, TambakError> {
        let ty = match arrow_type {
            ArrowDataType::Boolean => Self::Boolean,
            ArrowDataType::Int8 => Self::Int8,
            ArrowDataType::Int16 => Self::Int16,
            ArrowDataType::Int32 => Self::Int32,
            ArrowDataType::Int64 => Self::Int64,
            ArrowDataType::UInt8 => Self::UInt8,
            ArrowDataType::UInt16 => Self::UInt16,
            ArrowDataType::UInt32 => Self::UInt32,
            ArrowDataType::UInt64 => Self::UInt64,
            ArrowDataType::Float32 => Self::Float32,
            ArrowDataType::Float64 => Self::Float64,
            ArrowDataType::Date32 => Self::Date32,
            ArrowDataType::Time64(ArrowTimeUnit::Microsecond) => Self::Time64Micros,
            ArrowDataType::Timestamp(unit, _) => Self::Timestamp(match unit {
                ArrowTimeUnit::Second => TimeUnit::Second,
                ArrowTimeUnit::Millisecond => TimeUnit::Millisecond,
                ArrowTimeUnit::Microsecond => TimeUnit::Microsecond,
                ArrowTimeUnit::Nanosecond => TimeUnit::Nanosecond,
            }),
            ArrowDataType::Decimal128(precision, scale) => Self::Decimal {
                precision: *precision,
                scale: *scale,
            },
            ArrowDataType::FixedSizeBinary(16) if extension == Some(UUID_EXTENSION) => Self::Uuid,
            ArrowDataType::Interval(IntervalUnit::MonthDayNano) => Self::Interval,
            ArrowDataType::Utf8 | ArrowDataType::LargeUtf8 => Self::Utf8,
            ArrowDataType::Binary | ArrowDataType::LargeBinary => {
                if extension == Some(GEOMETRY_EXTENSION) {
                    Self::Geometry
                } else {
                    Self::Binary
                }
            }
            ArrowDataType::Dictionary(_, _) => {
                return Err(TambakError::UnsupportedType(
                    "dictionary-encoded arrow columns must be declared as Enum with an explicit catalog"
                        .to_string(),
                ))
            }
            ArrowDataType::Struct(fields) => Self::Struct(
                fields
                    .iter()
                    .map(|f| ColumnSchema::from_arrow_field(f))
                    .collect::<Result<_, _>>()?,
            ),
            ArrowDataType::List(f) | ArrowDataType::LargeList(f) => {
                Self::List(Box::new(ColumnSchema::from_arrow_field(f)?))
            }
            ArrowDataType::FixedSizeList(f, size) => Self::Array {
                element: Box::new(ColumnSchema::from_arrow_field(f)?),
                size: usize::try_from(*size).map_err(|_| {
                    TambakError::UnsupportedType(format!("invalid fixed list size {}", size))
                })?,
            },
            ArrowDataType::Map(entries, _) => match entries.data_type() {
                ArrowDataType::Struct(kv) if kv.len() == 2 => Self::Map {
                    key: Box::new(ColumnSchema::from_arrow_field(&kv[0])?.not_null()),
                    value: Box::new(ColumnSchema::from_arrow_field(&kv[1])?),
                },
                other => {
                    return Err(TambakError::UnsupportedType(format!(
                        "map entries must be a two-field struct, got {:?}",
                        other
                    )))
                }
            },
            dt => {
                return Err(TambakError::UnsupportedType(format!(
                    "Cannot convert Arrow type {:?} to a column type",
                    dt
                )))
            }
        };
        Ok(ty)
    }
}

/// Provides a compact string representation, used in logs and error messages.
impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decimal { precision, scale } => write!(f, "Decimal({}, {})", precision, scale),
            Self::Timestamp(unit) => write!(f, "Timestamp({:?})", unit),
            Self::Enum(catalog) => write!(f, "Enum[{}]", catalog.len()),
            Self::Struct(children) => write!(f, "Struct[{}]", children.len()),
            Self::List(child) => write!(f, "List<{}>", child.logical_type),
            Self::Array { element, size } => write!(f, "Array<{}; {}>", element.logical_type, size),
            Self::Map { key, value } => write!(f, "Map<{}, {}>", key.logical_type, value.logical_type),
            other => write!(f, "{:?}", other),
        }
    }
}

//==================================================================================
// Column Schema
//==================================================================================

/// One named, possibly nested column.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub logical_type: LogicalType,
    /// A non-nullable column is written as REQUIRED and rejects nulls.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSchema {
    /// Creates a nullable column.
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn from_arrow_field(field: &Field) -> Result<Self, TambakError> {
        let extension = field.metadata().get(EXTENSION_NAME_KEY).map(String::as_str);
        Ok(Self {
            name: field.name().clone(),
            logical_type: LogicalType::from_arrow_type(field.data_type(), extension)?,
            nullable: field.is_nullable(),
        })
    }

    pub fn from_arrow_schema(schema: &Schema) -> Result<Vec<Self>, TambakError> {
        schema.fields().iter().map(|f| Self::from_arrow_field(f)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::Fields;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[test]
    fn test_scalar_conversion() {
        let ty = LogicalType::from_arrow_type(&ArrowDataType::Int16, None).unwrap();
        assert_eq!(ty, LogicalType::Int16);
        let ty = LogicalType::from_arrow_type(
            &ArrowDataType::Timestamp(ArrowTimeUnit::Second, Some("UTC".into())),
            None,
        )
        .unwrap();
        assert_eq!(ty, LogicalType::Timestamp(TimeUnit::Second));
    }

    #[test]
    fn test_nested_conversion() {
        let item = Arc::new(Field::new("item", ArrowDataType::Int32, true));
        let field = Field::new(
            "s",
            ArrowDataType::Struct(Fields::from(vec![
                Field::new("a", ArrowDataType::List(item), true),
                Field::new("b", ArrowDataType::Utf8, false),
            ])),
            true,
        );
        let schema = ColumnSchema::from_arrow_field(&field).unwrap();
        let LogicalType::Struct(children) = &schema.logical_type else {
            panic!("expected struct");
        };
        assert!(matches!(children[0].logical_type, LogicalType::List(_)));
        assert!(!children[1].nullable);
    }

    #[test]
    fn test_map_key_forced_required() {
        let entries = Field::new(
            "entries",
            ArrowDataType::Struct(Fields::from(vec![
                Field::new("keys", ArrowDataType::Utf8, true),
                Field::new("values", ArrowDataType::Int64, true),
            ])),
            false,
        );
        let ty = LogicalType::from_arrow_type(&ArrowDataType::Map(Arc::new(entries), false), None)
            .unwrap();
        let LogicalType::Map { key, value } = ty else {
            panic!("expected map");
        };
        assert!(!key.nullable);
        assert!(value.nullable);
    }

    #[test]
    fn test_extension_types() {
        let geo = Field::new("geom", ArrowDataType::Binary, true).with_metadata(HashMap::from([(
            EXTENSION_NAME_KEY.to_string(),
            GEOMETRY_EXTENSION.to_string(),
        )]));
        assert_eq!(
            ColumnSchema::from_arrow_field(&geo).unwrap().logical_type,
            LogicalType::Geometry
        );
        let uuid = Field::new("id", ArrowDataType::FixedSizeBinary(16), true).with_metadata(
            HashMap::from([(EXTENSION_NAME_KEY.to_string(), UUID_EXTENSION.to_string())]),
        );
        assert_eq!(
            ColumnSchema::from_arrow_field(&uuid).unwrap().logical_type,
            LogicalType::Uuid
        );
    }

    #[test]
    fn test_dictionary_requires_catalog() {
        let dt = ArrowDataType::Dictionary(Box::new(ArrowDataType::UInt8), Box::new(ArrowDataType::Utf8));
        let err = LogicalType::from_arrow_type(&dt, None).unwrap_err();
        assert!(matches!(err, TambakError::UnsupportedType(_)));
    }
}

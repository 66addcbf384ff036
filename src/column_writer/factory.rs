//! Compiles `ColumnSchema` trees into column writers.
//!
//! The factory walks the schema depth-first, appending one `SchemaElement` per
//! node to a flat list and threading the repetition/definition maxima down
//! the tree. Nested types follow the Parquet conventions:
//!
//! - LIST / ARRAY: `<name> (LIST)` -> `repeated list|array` -> `element`
//! - MAP: `<name> (MAP)` -> `repeated key_value` -> `key` (required), `value`
//!
//! Field ids are looked up by name at each level; the synthetic `list`,
//! `array` and `key_value` groups never carry one.

use std::sync::Arc;

use super::encoders::{EnumCatalog, NumericKind};
use super::leaf::{LeafKind, LeafWriter};
use super::structural::{ListKind, ListWriter, StructWriter};
use super::{ColumnWriter, WriterContext};
use crate::config::FieldIds;
use crate::error::TambakError;
use crate::format::{ConvertedType, PhysicalType, Repetition, SchemaElement};
use crate::types::{ColumnSchema, LogicalType, TimeUnit};

/// Deepest nesting accepted by the factory.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Name of the root group of the flat schema.
pub const ROOT_SCHEMA_NAME: &str = "schema";

const MAX_DECIMAL_PRECISION: u8 = 38;

/// Builds the writers for every top-level column together with the flat
/// schema, root element first.
pub fn build_table_writers(
    context: &Arc<WriterContext>,
    columns: &[ColumnSchema],
) -> Result<(Vec<ColumnWriter>, Vec<SchemaElement>), TambakError> {
    let mut schemas = vec![SchemaElement::group(ROOT_SCHEMA_NAME, Repetition::Required, columns.len())];
    let field_ids = Some(&context.config.field_ids);
    let writers = columns
        .iter()
        .map(|column| build_column_writer(context, &mut schemas, column, field_ids, Vec::new(), 0, 1, 0))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((writers, schemas))
}

/// Builds the writer for `column`, appending its schema elements to `schemas`.
///
/// `max_repeat` / `max_define` are the maxima of a nullable column at this
/// position; a required column lowers `max_define` by one. `field_ids` holds
/// the ids of the columns at this level.
#[allow(clippy::too_many_arguments)]
pub fn build_column_writer(
    context: &Arc<WriterContext>,
    schemas: &mut Vec<SchemaElement>,
    column: &ColumnSchema,
    field_ids: Option<&FieldIds>,
    mut schema_path: Vec<String>,
    max_repeat: u16,
    max_define: u16,
    depth: usize,
) -> Result<ColumnWriter, TambakError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(TambakError::UnsupportedType(format!(
            "column '{}' is nested deeper than {} levels",
            column.name, MAX_NESTING_DEPTH
        )));
    }
    let (repetition, max_define) = if column.nullable {
        (Repetition::Optional, max_define)
    } else {
        (Repetition::Required, max_define.saturating_sub(1))
    };
    let name = column.name.as_str();
    let entry = field_ids.and_then(|ids| ids.get(name));
    let field_id = entry.and_then(|e| e.field_id);
    let child_ids = entry.map(|e| &e.children);

    match &column.logical_type {
        LogicalType::Struct(fields) => {
            if fields.is_empty() {
                return Err(TambakError::UnsupportedType(format!(
                    "struct column '{}' has no fields",
                    name
                )));
            }
            schemas.push(SchemaElement::group(name, repetition, fields.len()).with_field_id(field_id));
            schema_path.push(name.to_string());
            let children = fields
                .iter()
                .map(|field| {
                    build_column_writer(
                        context,
                        schemas,
                        field,
                        child_ids,
                        schema_path.clone(),
                        max_repeat,
                        max_define + 1,
                        depth + 1,
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ColumnWriter::Struct(StructWriter::new(name, children, max_define, column.nullable)))
        }
        LogicalType::List(element) | LogicalType::Array { element, .. } => {
            let (kind, repeated_name) = match &column.logical_type {
                LogicalType::Array { size: 0, .. } => {
                    return Err(TambakError::UnsupportedType(format!(
                        "array column '{}' has size 0",
                        name
                    )))
                }
                LogicalType::Array { size, .. } => (ListKind::Fixed(*size), "array"),
                _ => (ListKind::Variable, "list"),
            };
            schemas.push(
                SchemaElement::group(name, repetition, 1)
                    .with_converted_type(ConvertedType::List)
                    .with_field_id(field_id),
            );
            schemas.push(SchemaElement::group(repeated_name, Repetition::Repeated, 1));
            schema_path.push(name.to_string());
            schema_path.push(repeated_name.to_string());
            let element = ColumnSchema {
                name: "element".to_string(),
                ..element.as_ref().clone()
            };
            let child = build_column_writer(
                context,
                schemas,
                &element,
                child_ids,
                schema_path,
                max_repeat + 1,
                max_define + 2,
                depth + 1,
            )?;
            Ok(ColumnWriter::List(ListWriter::new(
                name,
                kind,
                child,
                max_repeat,
                max_define,
                column.nullable,
            )))
        }
        LogicalType::Map { key, value } => {
            schemas.push(
                SchemaElement::group(name, repetition, 1)
                    .with_converted_type(ConvertedType::Map)
                    .with_field_id(field_id),
            );
            schemas.push(
                SchemaElement::group("key_value", Repetition::Repeated, 2)
                    .with_converted_type(ConvertedType::MapKeyValue),
            );
            schema_path.push(name.to_string());
            schema_path.push("key_value".to_string());
            let key = ColumnSchema {
                name: "key".to_string(),
                nullable: false,
                ..key.as_ref().clone()
            };
            let value = ColumnSchema {
                name: "value".to_string(),
                ..value.as_ref().clone()
            };
            let children = [key, value]
                .iter()
                .map(|field| {
                    build_column_writer(
                        context,
                        schemas,
                        field,
                        child_ids,
                        schema_path.clone(),
                        max_repeat + 1,
                        max_define + 2,
                        depth + 1,
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;
            let entries = ColumnWriter::Struct(StructWriter::new("key_value", children, max_define, false));
            Ok(ColumnWriter::List(ListWriter::new(
                name,
                ListKind::Variable,
                entries,
                max_repeat,
                max_define,
                column.nullable,
            )))
        }
        logical => {
            let (kind, element) = leaf_type(name, logical, repetition)?;
            schemas.push(element.with_field_id(field_id));
            schema_path.push(name.to_string());
            Ok(ColumnWriter::Leaf(LeafWriter::new(
                Arc::clone(context),
                name,
                schema_path,
                kind,
                max_repeat,
                max_define,
                column.nullable,
            )))
        }
    }
}

/// The leaf kind and schema element of a scalar logical type.
fn leaf_type(
    name: &str,
    logical: &LogicalType,
    repetition: Repetition,
) -> Result<(LeafKind, SchemaElement), TambakError> {
    let numeric = |kind: NumericKind, converted: Option<ConvertedType>| {
        let element = SchemaElement::leaf(name, kind.physical_type(), repetition);
        let element = match converted {
            Some(converted) => element.with_converted_type(converted),
            None => element,
        };
        (LeafKind::Numeric(kind), element)
    };
    let fixed = |kind: LeafKind, length: i32| {
        let element = SchemaElement::leaf(name, PhysicalType::FixedLenByteArray, repetition).with_type_length(length);
        (kind, element)
    };
    let bytes = || SchemaElement::leaf(name, PhysicalType::ByteArray, repetition);

    let leaf = match logical {
        LogicalType::Boolean => (
            LeafKind::Boolean,
            SchemaElement::leaf(name, PhysicalType::Boolean, repetition),
        ),
        LogicalType::Int8 => numeric(NumericKind::Int8, Some(ConvertedType::Int8)),
        LogicalType::Int16 => numeric(NumericKind::Int16, Some(ConvertedType::Int16)),
        LogicalType::Int32 => numeric(NumericKind::Int32, None),
        LogicalType::Int64 => numeric(NumericKind::Int64, None),
        LogicalType::UInt8 => numeric(NumericKind::UInt8, Some(ConvertedType::Uint8)),
        LogicalType::UInt16 => numeric(NumericKind::UInt16, Some(ConvertedType::Uint16)),
        LogicalType::UInt32 => numeric(NumericKind::UInt32, Some(ConvertedType::Uint32)),
        LogicalType::UInt64 => numeric(NumericKind::UInt64, Some(ConvertedType::Uint64)),
        LogicalType::Float32 => numeric(NumericKind::Float32, None),
        LogicalType::Float64 => numeric(NumericKind::Float64, None),
        LogicalType::Date32 => numeric(NumericKind::Date32, Some(ConvertedType::Date)),
        LogicalType::Time64Micros => numeric(NumericKind::Time64Micros, Some(ConvertedType::TimeMicros)),
        LogicalType::Timestamp(unit) => match unit {
            // seconds are scaled to microseconds on write
            TimeUnit::Second => numeric(NumericKind::TimestampSecond, Some(ConvertedType::TimestampMicros)),
            TimeUnit::Millisecond => {
                numeric(NumericKind::TimestampMillisecond, Some(ConvertedType::TimestampMillis))
            }
            TimeUnit::Microsecond => {
                numeric(NumericKind::TimestampMicrosecond, Some(ConvertedType::TimestampMicros))
            }
            TimeUnit::Nanosecond => numeric(NumericKind::TimestampNanosecond, None),
        },
        LogicalType::Decimal { precision, scale } => {
            if *precision == 0 || *precision > MAX_DECIMAL_PRECISION {
                return Err(TambakError::UnsupportedType(format!(
                    "column '{}': decimal precision {} out of range",
                    name, precision
                )));
            }
            let (kind, element) = if *precision <= 9 {
                numeric(NumericKind::Decimal32, None)
            } else if *precision <= 18 {
                numeric(NumericKind::Decimal64, None)
            } else {
                fixed(LeafKind::FixedDecimal, 16)
            };
            (kind, element.with_decimal(*precision, *scale))
        }
        LogicalType::Uuid => fixed(LeafKind::Uuid, 16),
        LogicalType::Interval => {
            let (kind, element) = fixed(LeafKind::Interval, 12);
            (kind, element.with_converted_type(ConvertedType::Interval))
        }
        LogicalType::Utf8 => (
            LeafKind::Bytes { geometry: false },
            bytes().with_converted_type(ConvertedType::Utf8),
        ),
        LogicalType::Binary => (LeafKind::Bytes { geometry: false }, bytes()),
        LogicalType::Geometry => (LeafKind::Bytes { geometry: true }, bytes()),
        LogicalType::Enum(values) => {
            let catalog = EnumCatalog::new(values.clone()).map_err(|e| e.in_column(name))?;
            (LeafKind::Enum(catalog), bytes().with_converted_type(ConvertedType::Enum))
        }
        nested => {
            return Err(TambakError::InternalError(format!(
                "nested type {} reached the leaf factory",
                nested
            )))
        }
    };
    Ok(leaf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WriterConfig;

    fn context() -> Arc<WriterContext> {
        Arc::new(WriterContext::new(WriterConfig::default()).unwrap())
    }

    #[test]
    fn test_list_schema_and_levels() {
        let column = ColumnSchema::new(
            "tags",
            LogicalType::List(Box::new(ColumnSchema::new("item", LogicalType::Utf8))),
        );
        let mut schemas = Vec::new();
        let writer = build_column_writer(&context(), &mut schemas, &column, None, Vec::new(), 0, 1, 0).unwrap();
        let names: Vec<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["tags", "list", "element"]);
        assert_eq!(schemas[0].converted_type, Some(ConvertedType::List));
        assert_eq!(schemas[1].repetition, Repetition::Repeated);
        assert_eq!(schemas[2].converted_type, Some(ConvertedType::Utf8));

        let ColumnWriter::List(list) = writer else { panic!("expected a list writer") };
        let ColumnWriter::Leaf(leaf) = list.child() else { panic!("expected a leaf") };
        assert_eq!((leaf.max_repeat(), leaf.max_define()), (1, 3));
    }

    #[test]
    fn test_required_struct_lowers_define_levels() {
        let column = ColumnSchema::new(
            "point",
            LogicalType::Struct(vec![
                ColumnSchema::new("x", LogicalType::Float64).not_null(),
                ColumnSchema::new("y", LogicalType::Float64),
            ]),
        )
        .not_null();
        let mut schemas = Vec::new();
        let writer = build_column_writer(&context(), &mut schemas, &column, None, Vec::new(), 0, 1, 0).unwrap();
        assert_eq!(schemas[0].repetition, Repetition::Required);
        assert_eq!(schemas[0].num_children, Some(2));
        let ColumnWriter::Struct(point) = writer else { panic!("expected a struct writer") };
        let defines: Vec<u16> = point
            .children()
            .iter()
            .map(|c| match c {
                ColumnWriter::Leaf(l) => l.max_define(),
                _ => panic!("expected leaves"),
            })
            .collect();
        assert_eq!(defines, vec![0, 1]);
    }

    #[test]
    fn test_map_layout() {
        let column = ColumnSchema::new(
            "attrs",
            LogicalType::Map {
                key: Box::new(ColumnSchema::new("k", LogicalType::Utf8)),
                value: Box::new(ColumnSchema::new("v", LogicalType::Int64)),
            },
        );
        let mut schemas = Vec::new();
        build_column_writer(&context(), &mut schemas, &column, None, Vec::new(), 0, 1, 0).unwrap();
        let names: Vec<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["attrs", "key_value", "key", "value"]);
        assert_eq!(schemas[1].converted_type, Some(ConvertedType::MapKeyValue));
        assert_eq!(schemas[2].repetition, Repetition::Required);
        assert_eq!(schemas[3].repetition, Repetition::Optional);
    }

    #[test]
    fn test_decimal_and_timestamp_mapping() {
        let columns = vec![
            ColumnSchema::new("d9", LogicalType::Decimal { precision: 9, scale: 2 }),
            ColumnSchema::new("d18", LogicalType::Decimal { precision: 18, scale: 2 }),
            ColumnSchema::new("d38", LogicalType::Decimal { precision: 38, scale: 2 }),
            ColumnSchema::new("ts", LogicalType::Timestamp(TimeUnit::Second)),
            ColumnSchema::new("ns", LogicalType::Timestamp(TimeUnit::Nanosecond)),
        ];
        let (_, schemas) = build_table_writers(&context(), &columns).unwrap();
        assert_eq!(schemas[0].name, ROOT_SCHEMA_NAME);
        assert_eq!(schemas[1].physical_type, Some(PhysicalType::Int32));
        assert_eq!(schemas[2].physical_type, Some(PhysicalType::Int64));
        assert_eq!(schemas[3].physical_type, Some(PhysicalType::FixedLenByteArray));
        assert_eq!(schemas[3].type_length, Some(16));
        assert_eq!(schemas[3].precision, Some(38));
        assert_eq!(schemas[4].converted_type, Some(ConvertedType::TimestampMicros));
        assert_eq!(schemas[5].converted_type, None);
    }

    #[test]
    fn test_rejects_bad_types() {
        let zero = ColumnSchema::new(
            "a",
            LogicalType::Array {
                element: Box::new(ColumnSchema::new("e", LogicalType::Int32)),
                size: 0,
            },
        );
        let empty_enum = ColumnSchema::new("e", LogicalType::Enum(vec![]));
        for column in [zero, empty_enum] {
            let result = build_column_writer(&context(), &mut Vec::new(), &column, None, Vec::new(), 0, 1, 0);
            assert!(result.is_err());
        }
    }

    #[test]
    fn test_field_ids_follow_the_schema_tree() {
        use crate::config::FieldId;

        let mut config = WriterConfig::default();
        config.field_ids.insert("id".into(), FieldId::new(1));
        config
            .field_ids
            .insert("tags".into(), FieldId::new(2).with_child("element", FieldId::new(3)));
        config.field_ids.insert(
            "attrs".into(),
            FieldId::new(4).with_child("value", FieldId::new(5)),
        );
        config
            .field_ids
            .insert("point".into(), FieldId::default().with_child("x", FieldId::new(6)));
        let context = Arc::new(WriterContext::new(config).unwrap());

        let columns = vec![
            ColumnSchema::new("id", LogicalType::Int64),
            ColumnSchema::new(
                "tags",
                LogicalType::List(Box::new(ColumnSchema::new("item", LogicalType::Utf8))),
            ),
            ColumnSchema::new(
                "attrs",
                LogicalType::Map {
                    key: Box::new(ColumnSchema::new("k", LogicalType::Utf8)),
                    value: Box::new(ColumnSchema::new("v", LogicalType::Int64)),
                },
            ),
            ColumnSchema::new(
                "point",
                LogicalType::Struct(vec![
                    ColumnSchema::new("x", LogicalType::Float64),
                    ColumnSchema::new("y", LogicalType::Float64),
                ]),
            ),
            ColumnSchema::new("other", LogicalType::Int32),
        ];
        let (_, schemas) = build_table_writers(&context, &columns).unwrap();
        let ids: Vec<(&str, Option<i32>)> = schemas.iter().map(|s| (s.name.as_str(), s.field_id)).collect();
        assert_eq!(
            ids,
            vec![
                ("schema", None),
                ("id", Some(1)),
                ("tags", Some(2)),
                ("list", None),
                ("element", Some(3)),
                ("attrs", Some(4)),
                ("key_value", None),
                ("key", None),
                ("value", Some(5)),
                ("point", None),
                ("x", Some(6)),
                ("y", None),
                ("other", None),
            ]
        );
    }

    #[test]
    fn test_depth_limit() {
        let mut column = ColumnSchema::new("leaf", LogicalType::Int32);
        for _ in 0..=MAX_NESTING_DEPTH {
            column = ColumnSchema::new("s", LogicalType::Struct(vec![column]));
        }
        let result = build_column_writer(&context(), &mut Vec::new(), &column, None, Vec::new(), 0, 1, 0);
        assert!(matches!(result, Err(TambakError::UnsupportedType(_))));
    }
}

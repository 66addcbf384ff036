//! Flat schema elements, as produced by the recursive writer factory.
//!
//! The layout follows the Parquet schema tree flattened in depth-first order:
//! a group element records how many children follow it.

use serde::Serialize;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalType {
    Boolean,
    Int32,
    Int64,
    Float,
    Double,
    ByteArray,
    FixedLenByteArray,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repetition {
    Required,
    Optional,
    Repeated,
}

/// Converted (legacy logical) type annotations.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertedType {
    Utf8,
    Map,
    MapKeyValue,
    List,
    Enum,
    Decimal,
    Date,
    TimeMicros,
    TimestampMillis,
    TimestampMicros,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Interval,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SchemaElement {
    pub name: String,
    /// `None` for group (struct, list, map) elements.
    pub physical_type: Option<PhysicalType>,
    pub type_length: Option<i32>,
    pub repetition: Repetition,
    pub num_children: Option<i32>,
    pub converted_type: Option<ConvertedType>,
    pub precision: Option<i32>,
    pub scale: Option<i32>,
    pub field_id: Option<i32>,
}

impl SchemaElement {
    pub fn group(name: impl Into<String>, repetition: Repetition, num_children: usize) -> Self {
        Self {
            name: name.into(),
            physical_type: None,
            type_length: None,
            repetition,
            num_children: Some(num_children as i32),
            converted_type: None,
            precision: None,
            scale: None,
            field_id: None,
        }
    }

    pub fn leaf(name: impl Into<String>, physical_type: PhysicalType, repetition: Repetition) -> Self {
        Self {
            name: name.into(),
            physical_type: Some(physical_type),
            type_length: None,
            repetition,
            num_children: None,
            converted_type: None,
            precision: None,
            scale: None,
            field_id: None,
        }
    }

    pub fn with_converted_type(mut self, converted_type: ConvertedType) -> Self {
        self.converted_type = Some(converted_type);
        self
    }

    pub fn with_type_length(mut self, length: i32) -> Self {
        self.type_length = Some(length);
        self
    }

    pub fn with_decimal(mut self, precision: u8, scale: i8) -> Self {
        self.converted_type = Some(ConvertedType::Decimal);
        self.precision = Some(precision as i32);
        self.scale = Some(scale as i32);
        self
    }

    pub fn with_field_id(mut self, field_id: Option<i32>) -> Self {
        self.field_id = field_id;
        self
    }

    pub fn is_group(&self) -> bool {
        self.physical_type.is_none()
    }
}

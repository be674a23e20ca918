//! Column definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// 32-bit signed integer
    Integer,
    /// 64-bit signed integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// Boolean
    Boolean,
    /// UTF-8 string
    String,
    /// Raw bytes
    Bytes,
    /// Fixed-point decimal (unscaled value and scale)
    Decimal,
}

impl FieldType {
    /// Returns whether columns of this type may be part of a primary key.
    pub fn is_key_capable(self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Long | FieldType::String | FieldType::Bytes
        )
    }

    /// PostgreSQL column type used when rendering DDL.
    pub fn sql_type(self) -> &'static str {
        match self {
            FieldType::Integer => "INT",
            FieldType::Long => "BIGINT",
            FieldType::Float => "REAL",
            FieldType::Double => "DOUBLE PRECISION",
            FieldType::Boolean => "BOOLEAN",
            FieldType::String => "TEXT",
            FieldType::Bytes => "BYTEA",
            FieldType::Decimal => "NUMERIC",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Integer => "integer",
            FieldType::Long => "long",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Boolean => "boolean",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
            FieldType::Decimal => "decimal",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(FieldType::Integer),
            "long" | "bigint" => Ok(FieldType::Long),
            "float" => Ok(FieldType::Float),
            "double" => Ok(FieldType::Double),
            "bool" | "boolean" => Ok(FieldType::Boolean),
            "string" | "text" => Ok(FieldType::String),
            "bytes" => Ok(FieldType::Bytes),
            "decimal" => Ok(FieldType::Decimal),
            other => Err(format!("unknown field type '{}'", other)),
        }
    }
}

/// Column definition within a table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Column name
    pub name: String,
    /// Column type
    pub field_type: FieldType,
    /// Whether the column may hold null
    pub nullable: bool,
}

impl FieldDef {
    /// Creates a non-nullable column.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
        }
    }

    /// Creates a nullable column.
    pub fn nullable(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
        }
    }
}

//! Cell values, rows, and primary keys.

use std::collections::BTreeMap;
use std::fmt;

use super::field::FieldType;

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
    Bytes(Vec<u8>),
    /// Fixed-point decimal: `unscaled * 10^-scale`
    Decimal { unscaled: i128, scale: u32 },
}

impl Value {
    /// Returns the type of a non-null value.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(FieldType::Integer),
            Value::Long(_) => Some(FieldType::Long),
            Value::Float(_) => Some(FieldType::Float),
            Value::Double(_) => Some(FieldType::Double),
            Value::Boolean(_) => Some(FieldType::Boolean),
            Value::String(_) => Some(FieldType::String),
            Value::Bytes(_) => Some(FieldType::Bytes),
            Value::Decimal { .. } => Some(FieldType::Decimal),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the integer content of `Integer` or `Long` values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// A row: column name to value. Absent nullable columns read as null.
pub type Row = BTreeMap<String, Value>;

/// Builds a row from `(column, value)` pairs.
pub fn row<I, K, V>(cells: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    cells
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// One component of a primary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyPart {
    Integer(i32),
    Long(i64),
    String(String),
    Bytes(Vec<u8>),
}

impl KeyPart {
    /// Converts a key-capable, non-null value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(v) => Some(KeyPart::Integer(*v)),
            Value::Long(v) => Some(KeyPart::Long(*v)),
            Value::String(v) => Some(KeyPart::String(v.clone())),
            Value::Bytes(v) => Some(KeyPart::Bytes(v.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            KeyPart::Integer(v) => Value::Integer(*v),
            KeyPart::Long(v) => Value::Long(*v),
            KeyPart::String(v) => Value::String(v.clone()),
            KeyPart::Bytes(v) => Value::Bytes(v.clone()),
        }
    }
}

/// Primary key of a row, in primary-key column order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey(pub Vec<KeyPart>);

impl RowKey {
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match part {
                KeyPart::Integer(v) => write!(f, "{}", v)?,
                KeyPart::Long(v) => write!(f, "{}", v)?,
                KeyPart::String(v) => write!(f, "'{}'", v)?,
                KeyPart::Bytes(v) => write!(f, "0x{}", hex_string(v))?,
            }
        }
        f.write_str(")")
    }
}

pub(crate) fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

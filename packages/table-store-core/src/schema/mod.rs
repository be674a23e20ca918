//! Table schemas, column definitions, cell values, and row validation.

mod field;
mod table_schema;
pub(crate) mod validation;
mod value;

pub use field::{FieldDef, FieldType};
pub use table_schema::{TableSchema, TableSchemaBuilder};
pub use value::{row, KeyPart, Row, RowKey, Value};
pub(crate) use value::hex_string;

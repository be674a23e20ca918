//! Table schema definition.

use serde::{Deserialize, Serialize};

use super::field::{FieldDef, FieldType};
use super::validation;
use super::value::{KeyPart, Row, RowKey, Value};
use crate::error::StoreError;

/// Schema of a structured table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name, unique within the store
    pub name: String,
    /// Columns in declaration order
    pub fields: Vec<FieldDef>,
    /// Primary key columns, in declaration order
    pub primary_keys: Vec<String>,
    /// Secondary index columns
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl TableSchema {
    /// Creates and validates a schema.
    ///
    /// # Arguments
    /// * `name` - Table name
    /// * `fields` - Column definitions in declaration order
    /// * `primary_keys` - Primary key column names
    ///
    /// # Returns
    /// `Result<TableSchema, StoreError>` containing the schema or the violated invariant.
    pub fn new(
        name: impl Into<String>,
        fields: Vec<FieldDef>,
        primary_keys: Vec<String>,
    ) -> Result<Self, StoreError> {
        let schema = Self {
            name: name.into(),
            fields,
            primary_keys,
            indexes: Vec::new(),
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Starts a schema builder.
    pub fn builder(name: impl Into<String>) -> TableSchemaBuilder {
        TableSchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
            primary_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Re-checks every schema invariant. Used after decoding stored documents.
    pub fn validate(&self) -> Result<(), StoreError> {
        validation::validate_schema(self)
    }

    /// Looks up a column by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Primary key columns in key order.
    pub fn key_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.primary_keys.iter().filter_map(|k| self.field(k))
    }

    /// Extracts the primary key of a row.
    pub fn key_of(&self, row: &Row) -> Result<RowKey, StoreError> {
        let mut parts = Vec::with_capacity(self.primary_keys.len());
        for key in &self.primary_keys {
            let value = row.get(key).ok_or_else(|| StoreError::InvalidRow {
                table: self.name.clone(),
                reason: format!("missing primary key column '{}'", key),
            })?;
            parts.push(self.key_part(key, value)?);
        }
        Ok(RowKey(parts))
    }

    /// Builds a key from values given in primary-key order.
    pub fn key_from_values(&self, values: &[Value]) -> Result<RowKey, StoreError> {
        if values.len() != self.primary_keys.len() {
            return Err(StoreError::InvalidRow {
                table: self.name.clone(),
                reason: format!(
                    "expected {} key values, got {}",
                    self.primary_keys.len(),
                    values.len()
                ),
            });
        }
        let parts = self
            .primary_keys
            .iter()
            .zip(values)
            .map(|(key, value)| self.key_part(key, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RowKey(parts))
    }

    /// Writes the key parts back into a row under their column names.
    pub fn key_to_row(&self, key: &RowKey) -> Row {
        self.primary_keys
            .iter()
            .cloned()
            .zip(key.parts().iter().map(KeyPart::to_value))
            .collect()
    }

    /// Validates a complete row against this schema.
    pub fn validate_row(&self, row: &Row) -> Result<(), StoreError> {
        validation::validate_row(self, row)
    }

    /// Merges an upsert into the existing row (if any) and validates the result.
    ///
    /// Columns present in `update` replace the existing values; other existing
    /// columns are kept.
    pub fn merge_row(&self, existing: Option<&Row>, update: Row) -> Result<Row, StoreError> {
        let merged = match existing {
            Some(current) => {
                let mut merged = current.clone();
                merged.extend(update);
                merged
            }
            None => update,
        };
        self.validate_row(&merged)?;
        Ok(merged)
    }

    fn key_part(&self, column: &str, value: &Value) -> Result<KeyPart, StoreError> {
        let field = self.field(column).ok_or_else(|| StoreError::InvalidRow {
            table: self.name.clone(),
            reason: format!("unknown key column '{}'", column),
        })?;
        validation::validate_cell(&self.name, field, value)?;
        KeyPart::from_value(value).ok_or_else(|| StoreError::InvalidRow {
            table: self.name.clone(),
            reason: format!("value for key column '{}' cannot be a key", column),
        })
    }
}

/// Incremental schema construction; `build` validates.
#[derive(Debug, Clone)]
pub struct TableSchemaBuilder {
    name: String,
    fields: Vec<FieldDef>,
    primary_keys: Vec<String>,
    indexes: Vec<String>,
}

impl TableSchemaBuilder {
    /// Adds a non-nullable column.
    pub fn column(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDef::new(name, field_type));
        self
    }

    /// Adds a nullable column.
    pub fn nullable_column(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDef::nullable(name, field_type));
        self
    }

    /// Appends primary key columns.
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Appends indexed columns.
    pub fn index(mut self, column: impl Into<String>) -> Self {
        self.indexes.push(column.into());
        self
    }

    pub fn build(self) -> Result<TableSchema, StoreError> {
        let schema = TableSchema {
            name: self.name,
            fields: self.fields,
            primary_keys: self.primary_keys,
            indexes: self.indexes,
        };
        schema.validate()?;
        Ok(schema)
    }
}

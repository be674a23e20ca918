//! Validation methods for table schemas and rows.

use std::collections::HashSet;

use super::field::FieldDef;
use super::table_schema::TableSchema;
use super::value::{Row, Value};
use crate::error::StoreError;

fn invalid_schema(table: &str, reason: impl Into<String>) -> StoreError {
    StoreError::InvalidSchema {
        table: table.to_string(),
        reason: reason.into(),
    }
}

fn invalid_row(table: &str, reason: impl Into<String>) -> StoreError {
    StoreError::InvalidRow {
        table: table.to_string(),
        reason: reason.into(),
    }
}

/// Validates the structural invariants of a schema.
///
/// # Arguments
/// * `schema` - Schema to validate
///
/// # Returns
/// `Result<(), StoreError>` indicating success or the first violated invariant.
pub(crate) fn validate_schema(schema: &TableSchema) -> Result<(), StoreError> {
    let table = schema.name.as_str();
    if table.is_empty() {
        return Err(invalid_schema(table, "table name is empty"));
    }
    if schema.fields.is_empty() {
        return Err(invalid_schema(table, "no columns declared"));
    }

    let mut seen = HashSet::new();
    for field in &schema.fields {
        if field.name.is_empty() {
            return Err(invalid_schema(table, "column name is empty"));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(invalid_schema(
                table,
                format!("column '{}' declared more than once", field.name),
            ));
        }
    }

    validate_primary_keys(schema)?;

    for index in &schema.indexes {
        if schema.field(index).is_none() {
            return Err(invalid_schema(
                table,
                format!("index column '{}' is not declared", index),
            ));
        }
        if schema.primary_keys.contains(index) {
            return Err(invalid_schema(
                table,
                format!("index column '{}' is part of the primary key", index),
            ));
        }
    }
    Ok(())
}

/// Primary keys must be a non-empty, duplicate-free subset of the declared
/// columns listed in declaration order, and key-capable and non-nullable.
fn validate_primary_keys(schema: &TableSchema) -> Result<(), StoreError> {
    let table = schema.name.as_str();
    if schema.primary_keys.is_empty() {
        return Err(invalid_schema(table, "primary key is empty"));
    }

    let mut last_position = None;
    for key in &schema.primary_keys {
        let position = schema
            .fields
            .iter()
            .position(|f| &f.name == key)
            .ok_or_else(|| {
                invalid_schema(table, format!("primary key column '{}' is not declared", key))
            })?;

        if let Some(last) = last_position {
            if position == last {
                return Err(invalid_schema(
                    table,
                    format!("primary key column '{}' listed twice", key),
                ));
            }
            if position < last {
                return Err(invalid_schema(
                    table,
                    format!(
                        "primary key column '{}' is out of declaration order",
                        key
                    ),
                ));
            }
        }
        last_position = Some(position);

        let field = &schema.fields[position];
        if !field.field_type.is_key_capable() {
            return Err(invalid_schema(
                table,
                format!(
                    "primary key column '{}' has type {} which cannot be a key",
                    key, field.field_type
                ),
            ));
        }
        if field.nullable {
            return Err(invalid_schema(
                table,
                format!("primary key column '{}' is nullable", key),
            ));
        }
    }
    Ok(())
}

/// Validates a single cell against its column definition.
pub(crate) fn validate_cell(table: &str, field: &FieldDef, value: &Value) -> Result<(), StoreError> {
    match value.field_type() {
        None if field.nullable => Ok(()),
        None => Err(invalid_row(
            table,
            format!("column '{}' is not nullable", field.name),
        )),
        Some(actual) if actual == field.field_type => Ok(()),
        Some(actual) => Err(invalid_row(
            table,
            format!(
                "column '{}' expects {}, got {}",
                field.name, field.field_type, actual
            ),
        )),
    }
}

/// Validates a complete row: known columns, matching types, and every
/// non-nullable column present.
pub(crate) fn validate_row(schema: &TableSchema, row: &Row) -> Result<(), StoreError> {
    let table = schema.name.as_str();
    for (column, value) in row {
        let field = schema
            .field(column)
            .ok_or_else(|| invalid_row(table, format!("unknown column '{}'", column)))?;
        validate_cell(table, field, value)?;
    }

    for field in &schema.fields {
        if !field.nullable && !row.contains_key(&field.name) {
            return Err(invalid_row(
                table,
                format!("missing value for non-nullable column '{}'", field.name),
            ));
        }
    }
    Ok(())
}

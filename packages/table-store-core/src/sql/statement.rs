//! PostgreSQL text of the statements issued by the relational path.
//!
//! Used for debug logging; the embedded database executes the equivalent
//! operations directly.

use crate::schema::{hex_string, Row, RowKey, TableSchema, Value};

/// Double-quotes an identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Renders a value as a SQL literal.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Boolean(true) => "TRUE".to_string(),
        Value::Boolean(false) => "FALSE".to_string(),
        Value::String(v) => format!("'{}'", v.replace('\'', "''")),
        Value::Bytes(v) => format!("'\\x{}'::bytea", hex_string(v)),
        Value::Decimal { unscaled, scale } => decimal_text(*unscaled, *scale),
    }
}

fn decimal_text(unscaled: i128, scale: u32) -> String {
    if scale == 0 {
        return unscaled.to_string();
    }
    let digits = unscaled.unsigned_abs().to_string();
    let scale = scale as usize;
    let padded = if digits.len() <= scale {
        format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
    } else {
        digits
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - scale);
    let sign = if unscaled < 0 { "-" } else { "" };
    format!("{}{}.{}", sign, int_part, frac_part)
}

pub fn create_table(schema: &TableSchema) -> String {
    let mut columns: Vec<String> = schema
        .fields
        .iter()
        .map(|field| {
            let mut column = format!(
                "{} {}",
                quote_ident(&field.name),
                field.field_type.sql_type()
            );
            if !field.nullable {
                column.push_str(" NOT NULL");
            }
            column
        })
        .collect();
    let keys: Vec<String> = schema.primary_keys.iter().map(|k| quote_ident(k)).collect();
    columns.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    format!(
        "CREATE TABLE {} ({})",
        quote_ident(&schema.name),
        columns.join(", ")
    )
}

/// One `CREATE INDEX` per secondary index column.
pub fn create_indexes(schema: &TableSchema) -> Vec<String> {
    schema
        .indexes
        .iter()
        .map(|column| {
            format!(
                "CREATE INDEX {} ON {} ({})",
                quote_ident(&format!("{}_{}_idx", schema.name, column)),
                quote_ident(&schema.name),
                quote_ident(column)
            )
        })
        .collect()
}

pub fn drop_table(name: &str) -> String {
    format!("DROP TABLE {}", quote_ident(name))
}

/// `INSERT ... ON CONFLICT DO UPDATE` touching only the columns in `row`.
pub fn upsert(schema: &TableSchema, row: &Row) -> String {
    let columns: Vec<String> = row.keys().map(|c| quote_ident(c)).collect();
    let values: Vec<String> = row.values().map(literal).collect();
    let keys: Vec<String> = schema.primary_keys.iter().map(|k| quote_ident(k)).collect();
    let updates: Vec<String> = row
        .keys()
        .filter(|c| !schema.primary_keys.contains(*c))
        .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
        .collect();
    let on_conflict = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        quote_ident(&schema.name),
        columns.join(", "),
        values.join(", "),
        keys.join(", "),
        on_conflict
    )
}

fn key_predicate(schema: &TableSchema, key: &RowKey) -> String {
    schema
        .primary_keys
        .iter()
        .zip(key.parts())
        .map(|(column, part)| format!("{} = {}", quote_ident(column), literal(&part.to_value())))
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub fn select_by_key(schema: &TableSchema, key: &RowKey) -> String {
    format!(
        "SELECT * FROM {} WHERE {}",
        quote_ident(&schema.name),
        key_predicate(schema, key)
    )
}

pub fn delete_by_key(schema: &TableSchema, key: &RowKey) -> String {
    format!(
        "DELETE FROM {} WHERE {}",
        quote_ident(&schema.name),
        key_predicate(schema, key)
    )
}

pub fn select_all(schema: &TableSchema) -> String {
    let keys: Vec<String> = schema.primary_keys.iter().map(|k| quote_ident(k)).collect();
    format!(
        "SELECT * FROM {} ORDER BY {}",
        quote_ident(&schema.name),
        keys.join(", ")
    )
}

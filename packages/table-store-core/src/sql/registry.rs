//! Schema registry kept in a relational metadata table.

use std::sync::Arc;

use super::connection::{ConnectionSource, SqlConnection};
use crate::error::{Result, StoreError};
use crate::registry::StructuredTableRegistry;
use crate::schema::{FieldDef, FieldType, Row, RowKey, TableSchema, Value};
use crate::selector::StorageBackendKind;

/// Name of the metadata table holding one row per registered schema.
pub const REGISTRY_TABLE: &str = "structured_table_registry";

const NAME_COLUMN: &str = "table_name";
const DOCUMENT_COLUMN: &str = "specification";

fn registry_schema() -> TableSchema {
    TableSchema {
        name: REGISTRY_TABLE.to_string(),
        fields: vec![
            FieldDef::new(NAME_COLUMN, FieldType::String),
            FieldDef::new(DOCUMENT_COLUMN, FieldType::String),
        ],
        primary_keys: vec![NAME_COLUMN.to_string()],
        indexes: Vec::new(),
    }
}

/// Registry storing JSON schema documents in [`REGISTRY_TABLE`].
pub struct SqlStructuredTableRegistry {
    source: Arc<dyn ConnectionSource>,
    schema: TableSchema,
}

impl SqlStructuredTableRegistry {
    pub fn new(source: Arc<dyn ConnectionSource>) -> Self {
        Self {
            source,
            schema: registry_schema(),
        }
    }

    /// Creates the metadata table if it does not exist.
    pub fn initialize(&self) -> Result<()> {
        let mut conn = self.source.connection()?;
        if conn.table_exists(REGISTRY_TABLE)? {
            return Ok(());
        }
        match conn.create_table(&self.schema) {
            Ok(()) => {
                tracing::info!("Created registry table {}", REGISTRY_TABLE);
                Ok(())
            }
            // Another process got there first
            Err(StoreError::TableAlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn key(&self, name: &str) -> Result<RowKey> {
        self.schema.key_from_values(&[Value::from(name)])
    }

    /// Runs `f` in its own short transaction.
    fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn SqlConnection) -> Result<T>,
    {
        let mut conn = self.source.connection()?;
        conn.begin()?;
        match f(conn.as_mut()) {
            Ok(value) => {
                conn.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = conn.rollback() {
                    tracing::warn!("Registry rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }
}

/// A missing metadata table means the registry was never initialized, not
/// that the requested table is absent.
fn registry_missing(e: StoreError) -> StoreError {
    match e {
        StoreError::TableNotFound(table) if table == REGISTRY_TABLE => StoreError::Connection(
            format!("registry table {} does not exist", REGISTRY_TABLE),
        ),
        other => other,
    }
}

fn decode(name: &str, row: &Row) -> Result<Arc<TableSchema>> {
    let document = row
        .get(DOCUMENT_COLUMN)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Serialization(format!("registry row for {} has no specification", name)))?;
    let schema: TableSchema = serde_json::from_str(document)?;
    schema.validate()?;
    Ok(Arc::new(schema))
}

/// Reads a registered schema through `conn`, which may be inside a transaction.
pub(crate) fn lookup_on(conn: &mut dyn SqlConnection, name: &str) -> Result<Arc<TableSchema>> {
    lookup_with(conn, &registry_schema(), name)
}

fn lookup_with(
    conn: &mut dyn SqlConnection,
    registry: &TableSchema,
    name: &str,
) -> Result<Arc<TableSchema>> {
    let key = registry.key_from_values(&[Value::from(name)])?;
    match conn.read(registry, &key).map_err(registry_missing)? {
        Some(row) => decode(name, &row),
        None => Err(StoreError::TableNotFound(name.to_string())),
    }
}

impl StructuredTableRegistry for SqlStructuredTableRegistry {
    fn register(&self, schema: &TableSchema) -> Result<()> {
        let document = serde_json::to_string(schema)?;
        let key = self.key(&schema.name)?;
        self.transact(|conn| {
            if conn.read(&self.schema, &key).map_err(registry_missing)?.is_some() {
                return Err(StoreError::TableAlreadyExists(schema.name.clone()));
            }
            let mut row = Row::new();
            row.insert(NAME_COLUMN.to_string(), Value::from(schema.name.as_str()));
            row.insert(DOCUMENT_COLUMN.to_string(), Value::String(document));
            conn.upsert(&self.schema, &row).map_err(registry_missing)
        })
    }

    fn get(&self, name: &str) -> Result<Arc<TableSchema>> {
        let mut conn = self.source.connection()?;
        lookup_with(conn.as_mut(), &self.schema, name)
    }

    fn remove(&self, name: &str) -> Result<()> {
        let key = self.key(name)?;
        self.transact(|conn| {
            if conn.read(&self.schema, &key).map_err(registry_missing)?.is_none() {
                return Err(StoreError::TableNotFound(name.to_string()));
            }
            conn.delete(&self.schema, &key).map_err(registry_missing)
        })
    }

    fn table_names(&self) -> Result<Vec<String>> {
        let mut conn = self.source.connection()?;
        Ok(conn
            .scan(&self.schema)
            .map_err(registry_missing)?
            .iter()
            .filter_map(|row| row.get(NAME_COLUMN).and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    fn kind(&self) -> StorageBackendKind {
        StorageBackendKind::Sql
    }
}

//! Schema registry persisted in the key-value store's metadata namespace.

use std::sync::Arc;

use super::store::KeyValueStore;
use crate::error::{Result, StoreError};
use crate::registry::StructuredTableRegistry;
use crate::schema::TableSchema;
use crate::selector::StorageBackendKind;

const SCHEMA_KEY_PREFIX: &str = "structured_table_registry/";

fn schema_key(name: &str) -> String {
    format!("{}{}", SCHEMA_KEY_PREFIX, name)
}

/// Registry storing each schema as a JSON document.
pub struct NoSqlStructuredTableRegistry {
    store: Arc<dyn KeyValueStore>,
}

impl NoSqlStructuredTableRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

impl StructuredTableRegistry for NoSqlStructuredTableRegistry {
    fn register(&self, schema: &TableSchema) -> Result<()> {
        let document = serde_json::to_string(schema)?;
        if !self
            .store
            .metadata_put_if_absent(&schema_key(&schema.name), document)?
        {
            return Err(StoreError::TableAlreadyExists(schema.name.clone()));
        }
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Arc<TableSchema>> {
        let document = self
            .store
            .metadata_get(&schema_key(name))?
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
        let schema: TableSchema = serde_json::from_str(&document)?;
        schema.validate()?;
        Ok(Arc::new(schema))
    }

    fn remove(&self, name: &str) -> Result<()> {
        if !self.store.metadata_delete(&schema_key(name))? {
            return Err(StoreError::TableNotFound(name.to_string()));
        }
        Ok(())
    }

    fn table_names(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .metadata_keys(SCHEMA_KEY_PREFIX)?
            .into_iter()
            .filter_map(|key| key.strip_prefix(SCHEMA_KEY_PREFIX).map(str::to_string))
            .collect())
    }

    fn kind(&self) -> StorageBackendKind {
        StorageBackendKind::NoSql
    }
}

//! Table DDL for the relational backend.

use std::sync::Arc;

use parking_lot::Mutex;

use super::connection::ConnectionSource;
use super::registry::REGISTRY_TABLE;
use crate::admin::{create_table_with, drop_table_with, StructuredTableAdmin};
use crate::error::{Result, StoreError};
use crate::registry::StructuredTableRegistry;
use crate::schema::TableSchema;
use crate::selector::StorageBackendKind;

/// Issues `CREATE TABLE` / `DROP TABLE` and keeps the registry in step.
pub struct SqlStructuredTableAdmin {
    source: Arc<dyn ConnectionSource>,
    registry: Arc<dyn StructuredTableRegistry>,
    ddl: Mutex<()>,
}

impl SqlStructuredTableAdmin {
    pub fn new(source: Arc<dyn ConnectionSource>, registry: Arc<dyn StructuredTableRegistry>) -> Self {
        Self {
            source,
            registry,
            ddl: Mutex::new(()),
        }
    }
}

impl StructuredTableAdmin for SqlStructuredTableAdmin {
    fn create_table(&self, schema: &TableSchema) -> Result<()> {
        if schema.name == REGISTRY_TABLE {
            return Err(StoreError::InvalidSchema {
                table: schema.name.clone(),
                reason: "table name is reserved for the schema registry".to_string(),
            });
        }
        let _ddl = self.ddl.lock();
        create_table_with(self.registry.as_ref(), schema, |schema| {
            self.source.connection()?.create_table(schema)
        })
    }

    fn drop_table(&self, name: &str) -> Result<()> {
        let _ddl = self.ddl.lock();
        drop_table_with(self.registry.as_ref(), name, |name| {
            self.source.connection()?.drop_table(name)
        })
    }

    fn get_schema(&self, name: &str) -> Result<Arc<TableSchema>> {
        self.registry.get(name)
    }

    fn kind(&self) -> StorageBackendKind {
        StorageBackendKind::Sql
    }
}

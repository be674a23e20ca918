//! Table DDL for the distributed backend.

use std::sync::Arc;

use parking_lot::Mutex;

use super::store::KeyValueStore;
use crate::admin::{create_table_with, drop_table_with, StructuredTableAdmin};
use crate::error::Result;
use crate::registry::StructuredTableRegistry;
use crate::schema::TableSchema;
use crate::selector::StorageBackendKind;

/// Creates and drops key-value tables and keeps the registry in step.
pub struct NoSqlStructuredTableAdmin {
    store: Arc<dyn KeyValueStore>,
    registry: Arc<dyn StructuredTableRegistry>,
    ddl: Mutex<()>,
}

impl NoSqlStructuredTableAdmin {
    pub fn new(store: Arc<dyn KeyValueStore>, registry: Arc<dyn StructuredTableRegistry>) -> Self {
        Self {
            store,
            registry,
            ddl: Mutex::new(()),
        }
    }
}

impl StructuredTableAdmin for NoSqlStructuredTableAdmin {
    fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let _ddl = self.ddl.lock();
        create_table_with(self.registry.as_ref(), schema, |schema| {
            self.store.create_table(&schema.name)
        })
    }

    fn drop_table(&self, name: &str) -> Result<()> {
        let _ddl = self.ddl.lock();
        drop_table_with(self.registry.as_ref(), name, |name| self.store.drop_table(name))
    }

    fn get_schema(&self, name: &str) -> Result<Arc<TableSchema>> {
        self.registry.get(name)
    }

    fn kind(&self) -> StorageBackendKind {
        StorageBackendKind::NoSql
    }
}

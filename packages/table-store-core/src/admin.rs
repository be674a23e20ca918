//! Structured table admin: schema DDL against the selected backend.
//!
//! Both backend admins share the create/drop sequencing below: the registry
//! is consulted first, backend storage is changed next, and the registry is
//! updated last. A failure after the storage step leaves the two out of step
//! and is reported as a `Consistency` error without any repair attempt.

use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::registry::StructuredTableRegistry;
use crate::schema::TableSchema;
use crate::selector::StorageBackendKind;

/// Creates, drops, and describes structured tables.
pub trait StructuredTableAdmin: Send + Sync {
    /// Creates backend storage for the table and registers its schema.
    ///
    /// Fails with `TableAlreadyExists` if the name is registered.
    fn create_table(&self, schema: &TableSchema) -> Result<()>;

    /// Drops backend storage and the registry entry.
    ///
    /// Fails with `TableNotFound` if the name is not registered.
    fn drop_table(&self, name: &str) -> Result<()>;

    /// Returns the registered schema.
    fn get_schema(&self, name: &str) -> Result<Arc<TableSchema>>;

    /// Returns whether the table is registered.
    fn exists(&self, name: &str) -> Result<bool> {
        match self.get_schema(name) {
            Ok(_) => Ok(true),
            Err(StoreError::TableNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Backend family this admin belongs to.
    fn kind(&self) -> StorageBackendKind;
}

fn consistency(table: &str, detail: String) -> StoreError {
    tracing::error!(
        "Storage and registry diverged for table '{}': {}",
        table,
        detail
    );
    StoreError::Consistency {
        table: table.to_string(),
        detail,
    }
}

/// Registry check, storage creation, then registration.
pub(crate) fn create_table_with<F>(
    registry: &dyn StructuredTableRegistry,
    schema: &TableSchema,
    create_storage: F,
) -> Result<()>
where
    F: FnOnce(&TableSchema) -> Result<()>,
{
    schema.validate()?;
    match registry.get(&schema.name) {
        Ok(_) => return Err(StoreError::TableAlreadyExists(schema.name.clone())),
        Err(StoreError::TableNotFound(_)) => {}
        Err(e) => return Err(e),
    }

    match create_storage(schema) {
        Ok(()) => {}
        Err(StoreError::TableAlreadyExists(_)) => {
            return Err(consistency(
                &schema.name,
                "backend storage exists without a registry entry".to_string(),
            ));
        }
        Err(e) => return Err(e),
    }

    registry.register(schema).map_err(|e| {
        consistency(
            &schema.name,
            format!("storage created but registering the schema failed: {}", e),
        )
    })?;
    tracing::info!(
        "Created table {} with {} fields",
        schema.name,
        schema.fields.len()
    );
    Ok(())
}

/// Registry check, storage removal, then deregistration.
pub(crate) fn drop_table_with<F>(
    registry: &dyn StructuredTableRegistry,
    name: &str,
    drop_storage: F,
) -> Result<()>
where
    F: FnOnce(&str) -> Result<()>,
{
    registry.get(name)?;

    match drop_storage(name) {
        Ok(()) => {}
        Err(StoreError::TableNotFound(_)) => {
            return Err(consistency(
                name,
                "registry entry exists without backend storage".to_string(),
            ));
        }
        Err(e) => return Err(e),
    }

    registry.remove(name).map_err(|e| {
        consistency(
            name,
            format!("storage dropped but removing the schema failed: {}", e),
        )
    })?;
    tracing::info!("Dropped table {}", name);
    Ok(())
}

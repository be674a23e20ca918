//! Structured table registry: table name to schema.

mod cached;

use std::sync::Arc;

use crate::error::Result;
use crate::schema::TableSchema;
use crate::selector::StorageBackendKind;

pub use cached::CachedStructuredTableRegistry;

/// Metadata store mapping table names to their schemas.
///
/// Implementations persist schemas in their backend's own metadata store.
pub trait StructuredTableRegistry: Send + Sync {
    /// Records a new schema.
    ///
    /// Fails with `TableAlreadyExists` if the name is taken.
    fn register(&self, schema: &TableSchema) -> Result<()>;

    /// Looks up a schema. Fails with `TableNotFound` if absent.
    fn get(&self, name: &str) -> Result<Arc<TableSchema>>;

    /// Looks up a schema using `load` instead of this registry's own session.
    ///
    /// `load` must read the same metadata store as [`get`](Self::get), for
    /// example through a connection the caller already holds. Caching
    /// registries answer from their cache and only call `load` on a miss.
    fn get_or_load(
        &self,
        name: &str,
        load: &mut dyn FnMut() -> Result<Arc<TableSchema>>,
    ) -> Result<Arc<TableSchema>> {
        let _ = name;
        load()
    }

    /// Removes a schema. Fails with `TableNotFound` if absent.
    fn remove(&self, name: &str) -> Result<()>;

    /// Names of every registered table, sorted.
    fn table_names(&self) -> Result<Vec<String>>;

    /// Backend family this registry belongs to.
    fn kind(&self) -> StorageBackendKind;
}

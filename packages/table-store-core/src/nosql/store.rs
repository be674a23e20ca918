//! Versioned key-value storage underneath the distributed tables.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use super::coordinator::Transaction;
use crate::error::{Result, StoreError};
use crate::schema::{Row, RowKey};

/// Multi-version key-value store with a small metadata namespace.
///
/// Every cell write carries the writing transaction's version; a `None` cell
/// is a delete marker. Reads pick the newest version visible to the
/// transaction snapshot.
pub trait KeyValueStore: Send + Sync {
    fn create_table(&self, table: &str) -> Result<()>;
    fn drop_table(&self, table: &str) -> Result<()>;
    fn table_exists(&self, table: &str) -> Result<bool>;

    /// Newest visible row for `key`, or `None` if absent or deleted.
    fn read(&self, table: &str, key: &RowKey, tx: &Transaction) -> Result<Option<Row>>;

    /// Every visible row in key order.
    fn scan(&self, table: &str, tx: &Transaction) -> Result<Vec<(RowKey, Row)>>;

    /// Writes one cell version.
    fn write(&self, table: &str, key: &RowKey, version: u64, cell: Option<Row>) -> Result<()>;

    /// Removes the cell version written by `version`, if present.
    fn undo(&self, table: &str, key: &RowKey, version: u64) -> Result<()>;

    fn metadata_get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` unless `key` exists. Returns whether it was stored.
    fn metadata_put_if_absent(&self, key: &str, value: String) -> Result<bool>;

    /// Removes `key`. Returns whether it existed.
    fn metadata_delete(&self, key: &str) -> Result<bool>;

    /// Metadata keys starting with `prefix`, sorted.
    fn metadata_keys(&self, prefix: &str) -> Result<Vec<String>>;
}

type Versions = BTreeMap<u64, Option<Row>>;

#[derive(Debug, Default)]
struct KvTable {
    cells: BTreeMap<RowKey, Versions>,
}

impl KvTable {
    fn visible<'a>(versions: &'a Versions, tx: &Transaction) -> Option<&'a Option<Row>> {
        versions
            .iter()
            .rev()
            .find(|(version, _)| tx.is_visible(**version))
            .map(|(_, cell)| cell)
    }
}

/// In-process [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    tables: RwLock<HashMap<String, Arc<RwLock<KvTable>>>>,
    metadata: RwLock<BTreeMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored cell versions for a table, delete markers included.
    pub fn version_count(&self, table: &str) -> Result<usize> {
        let table = self.table(table)?;
        let guard = table.read();
        Ok(guard.cells.values().map(|versions| versions.len()).sum())
    }

    fn table(&self, name: &str) -> Result<Arc<RwLock<KvTable>>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }
}

impl KeyValueStore for MemoryKvStore {
    fn create_table(&self, table: &str) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.contains_key(table) {
            return Err(StoreError::TableAlreadyExists(table.to_string()));
        }
        tables.insert(table.to_string(), Arc::new(RwLock::new(KvTable::default())));
        tracing::debug!("Created key-value table {}", table);
        Ok(())
    }

    fn drop_table(&self, table: &str) -> Result<()> {
        self.tables
            .write()
            .remove(table)
            .map(|_| tracing::debug!("Dropped key-value table {}", table))
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.tables.read().contains_key(table))
    }

    fn read(&self, table: &str, key: &RowKey, tx: &Transaction) -> Result<Option<Row>> {
        let table = self.table(table)?;
        let guard = table.read();
        Ok(guard
            .cells
            .get(key)
            .and_then(|versions| KvTable::visible(versions, tx))
            .cloned()
            .flatten())
    }

    fn scan(&self, table: &str, tx: &Transaction) -> Result<Vec<(RowKey, Row)>> {
        let table = self.table(table)?;
        let guard = table.read();
        Ok(guard
            .cells
            .iter()
            .filter_map(|(key, versions)| match KvTable::visible(versions, tx) {
                Some(Some(row)) => Some((key.clone(), row.clone())),
                _ => None,
            })
            .collect())
    }

    fn write(&self, table: &str, key: &RowKey, version: u64, cell: Option<Row>) -> Result<()> {
        let table = self.table(table)?;
        table
            .write()
            .cells
            .entry(key.clone())
            .or_default()
            .insert(version, cell);
        Ok(())
    }

    fn undo(&self, table: &str, key: &RowKey, version: u64) -> Result<()> {
        let table = self.table(table)?;
        let mut guard = table.write();
        if let Some(versions) = guard.cells.get_mut(key) {
            versions.remove(&version);
            if versions.is_empty() {
                guard.cells.remove(key);
            }
        }
        Ok(())
    }

    fn metadata_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.metadata.read().get(key).cloned())
    }

    fn metadata_put_if_absent(&self, key: &str, value: String) -> Result<bool> {
        let mut metadata = self.metadata.write();
        if metadata.contains_key(key) {
            return Ok(false);
        }
        metadata.insert(key.to_string(), value);
        Ok(true)
    }

    fn metadata_delete(&self, key: &str) -> Result<bool> {
        Ok(self.metadata.write().remove(key).is_some())
    }

    fn metadata_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .metadata
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

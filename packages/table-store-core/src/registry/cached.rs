//! Read-through, write-invalidate cache in front of any registry.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::StructuredTableRegistry;
use crate::error::{Result, StoreError};
use crate::schema::TableSchema;
use crate::selector::StorageBackendKind;

/// Cached lookup outcome for one table name.
#[derive(Debug, Clone)]
enum CachedLookup {
    Found(Arc<TableSchema>),
    /// Backend confirmed the table does not exist
    Missing,
}

/// Per-name cache slot. `None` means nothing is cached.
type Slot = Arc<Mutex<Option<CachedLookup>>>;

/// Registry wrapper keeping a process-local cache of lookups.
///
/// Every operation on a name runs under that name's slot lock, so a lookup
/// never interleaves with a `register`/`remove` of the same name, while
/// different names proceed in parallel. The cache is only updated after the
/// wrapped registry confirms a change; a failed change invalidates the slot.
pub struct CachedStructuredTableRegistry {
    inner: Arc<dyn StructuredTableRegistry>,
    slots: DashMap<String, Slot>,
}

impl CachedStructuredTableRegistry {
    /// Wraps a registry.
    pub fn new(inner: Arc<dyn StructuredTableRegistry>) -> Self {
        Self {
            inner,
            slots: DashMap::new(),
        }
    }

    /// Drops any cached lookup for `name`.
    pub fn invalidate(&self, name: &str) {
        if let Some(slot) = self.slots.get(name).map(|s| s.value().clone()) {
            *slot.lock() = None;
            self.release_slot(name, slot);
        }
    }

    /// Drops every cached lookup.
    pub fn invalidate_all(&self) {
        let slots: Vec<(String, Slot)> = self
            .slots
            .iter()
            .map(|s| (s.key().clone(), s.value().clone()))
            .collect();
        for (name, slot) in slots {
            *slot.lock() = None;
            self.release_slot(&name, slot);
        }
    }

    /// Number of names with a cached lookup (positive or negative).
    pub fn cached_len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.iter().map(|s| s.value().clone()).collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    fn lookup(
        &self,
        name: &str,
        load: &mut dyn FnMut() -> Result<Arc<TableSchema>>,
    ) -> Result<Arc<TableSchema>> {
        let slot = self.slot(name);
        let result = {
            let mut cached = slot.lock();
            match cached.as_ref() {
                Some(CachedLookup::Found(schema)) => return Ok(schema.clone()),
                Some(CachedLookup::Missing) => {
                    return Err(StoreError::TableNotFound(name.to_string()))
                }
                None => {}
            }
            match load() {
                Ok(schema) => {
                    *cached = Some(CachedLookup::Found(schema.clone()));
                    Ok(schema)
                }
                Err(StoreError::TableNotFound(missing)) => {
                    *cached = Some(CachedLookup::Missing);
                    Err(StoreError::TableNotFound(missing))
                }
                Err(e) => Err(e),
            }
        };
        if matches!(&result, Err(e) if !matches!(e, StoreError::TableNotFound(_))) {
            self.release_slot(name, slot);
        }
        result
    }

    /// Drops the slot for `name` if it is empty and nobody else holds it.
    fn release_slot(&self, name: &str, slot: Slot) {
        drop(slot);
        self.slots
            .remove_if(name, |_, slot| Arc::strong_count(slot) == 1 && slot.lock().is_none());
    }

    fn slot(&self, name: &str) -> Slot {
        if let Some(slot) = self.slots.get(name) {
            return slot.value().clone();
        }
        // The shard guard is released before the caller locks the slot
        self.slots.entry(name.to_string()).or_default().value().clone()
    }
}

impl StructuredTableRegistry for CachedStructuredTableRegistry {
    fn register(&self, schema: &TableSchema) -> Result<()> {
        let slot = self.slot(&schema.name);
        let result = {
            let mut cached = slot.lock();
            let result = self.inner.register(schema);
            *cached = match result {
                Ok(()) => Some(CachedLookup::Found(Arc::new(schema.clone()))),
                Err(_) => None,
            };
            result
        };
        if result.is_err() {
            self.release_slot(&schema.name, slot);
        }
        result
    }

    fn get(&self, name: &str) -> Result<Arc<TableSchema>> {
        self.lookup(name, &mut || self.inner.get(name))
    }

    fn get_or_load(
        &self,
        name: &str,
        load: &mut dyn FnMut() -> Result<Arc<TableSchema>>,
    ) -> Result<Arc<TableSchema>> {
        self.lookup(name, load)
    }

    fn remove(&self, name: &str) -> Result<()> {
        let slot = self.slot(name);
        let result = {
            let mut cached = slot.lock();
            let result = self.inner.remove(name);
            *cached = match result {
                Ok(()) => Some(CachedLookup::Missing),
                Err(_) => None,
            };
            result
        };
        if result.is_err() {
            self.release_slot(name, slot);
        }
        result
    }

    fn table_names(&self) -> Result<Vec<String>> {
        self.inner.table_names()
    }

    fn kind(&self) -> StorageBackendKind {
        self.inner.kind()
    }
}

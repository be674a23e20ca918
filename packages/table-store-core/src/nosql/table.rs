//! Transaction-aware table views over the key-value store.
//!
//! Writes are buffered per table until commit. At commit the buffered
//! writes are persisted as cell versions stamped with the transaction's
//! write pointer; rollback removes exactly the versions persisted so far.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::coordinator::{ChangeId, Transaction};
use super::store::KeyValueStore;
use crate::error::{Result, StoreError};
use crate::registry::StructuredTableRegistry;
use crate::runner::{StructuredTable, StructuredTableContext};
use crate::schema::{Row, RowKey, TableSchema, Value};

/// Transaction participant for one table.
#[derive(Debug)]
pub(crate) struct TxTable {
    schema: Arc<TableSchema>,
    writes: BTreeMap<RowKey, Option<Row>>,
    persisted: Vec<RowKey>,
}

impl TxTable {
    fn new(schema: Arc<TableSchema>) -> Self {
        Self {
            schema,
            writes: BTreeMap::new(),
            persisted: Vec::new(),
        }
    }

    fn name(&self) -> &str {
        &self.schema.name
    }

    fn persist(&mut self, store: &dyn KeyValueStore, tx: &Transaction) -> Result<()> {
        for (key, cell) in &self.writes {
            store.write(&self.schema.name, key, tx.write_pointer(), cell.clone())?;
            self.persisted.push(key.clone());
        }
        Ok(())
    }

    fn rollback(&mut self, store: &dyn KeyValueStore, tx: &Transaction) -> Result<()> {
        while let Some(key) = self.persisted.last() {
            store.undo(&self.schema.name, key, tx.write_pointer())?;
            self.persisted.pop();
        }
        Ok(())
    }
}

/// Table view handed to a unit of work.
struct NoSqlTable<'a> {
    state: &'a mut TxTable,
    store: &'a dyn KeyValueStore,
    tx: &'a Transaction,
}

impl NoSqlTable<'_> {
    fn lookup(&self, key: &RowKey) -> Result<Option<Row>> {
        match self.state.writes.get(key) {
            Some(cell) => Ok(cell.clone()),
            None => self.store.read(self.state.name(), key, self.tx),
        }
    }
}

impl StructuredTable for NoSqlTable<'_> {
    fn schema(&self) -> &TableSchema {
        &self.state.schema
    }

    fn upsert(&mut self, row: Row) -> Result<()> {
        let key = self.state.schema.key_of(&row)?;
        let existing = self.lookup(&key)?;
        let merged = self.state.schema.merge_row(existing.as_ref(), row)?;
        self.state.writes.insert(key, Some(merged));
        Ok(())
    }

    fn read(&mut self, key: &[Value]) -> Result<Option<Row>> {
        let key = self.state.schema.key_from_values(key)?;
        self.lookup(&key)
    }

    fn delete(&mut self, key: &[Value]) -> Result<()> {
        let key = self.state.schema.key_from_values(key)?;
        self.state.writes.insert(key, None);
        Ok(())
    }

    fn scan(&mut self) -> Result<Vec<Row>> {
        let mut rows: BTreeMap<RowKey, Row> = self
            .store
            .scan(self.state.name(), self.tx)?
            .into_iter()
            .collect();
        for (key, cell) in &self.state.writes {
            match cell {
                Some(row) => {
                    rows.insert(key.clone(), row.clone());
                }
                None => {
                    rows.remove(key);
                }
            }
        }
        Ok(rows.into_values().collect())
    }
}

/// Table access for one distributed transaction.
pub(crate) struct NoSqlTableContext<'a> {
    store: &'a dyn KeyValueStore,
    registry: &'a dyn StructuredTableRegistry,
    tx: &'a Transaction,
    participants: BTreeMap<String, TxTable>,
}

impl<'a> NoSqlTableContext<'a> {
    pub(crate) fn new(
        store: &'a dyn KeyValueStore,
        registry: &'a dyn StructuredTableRegistry,
        tx: &'a Transaction,
    ) -> Self {
        Self {
            store,
            registry,
            tx,
            participants: BTreeMap::new(),
        }
    }

    /// Rows changed by this transaction across all tables.
    pub(crate) fn change_set(&self) -> HashSet<ChangeId> {
        self.participants
            .values()
            .flat_map(|table| {
                table.writes.keys().map(|key| ChangeId {
                    table: table.schema.name.clone(),
                    key: key.clone(),
                })
            })
            .collect()
    }

    /// Persists every participant in table name order, stopping at the first failure.
    pub(crate) fn persist_all(&mut self) -> Result<()> {
        for table in self.participants.values_mut() {
            table.persist(self.store, self.tx).map_err(|e| {
                StoreError::Connection(format!("persisting table {} failed: {}", table.name(), e))
            })?;
        }
        Ok(())
    }

    /// Rolls back every participant, attempting all of them even after a failure.
    ///
    /// # Returns
    /// The first failure, if any participant could not be rolled back.
    pub(crate) fn rollback_all(&mut self) -> Result<()> {
        let mut first_failure = None;
        for table in self.participants.values_mut() {
            if let Err(e) = table.rollback(self.store, self.tx) {
                tracing::warn!(
                    "Rollback of table {} in transaction {} failed: {}",
                    table.name(),
                    self.tx.write_pointer(),
                    e
                );
                first_failure.get_or_insert(e);
            }
        }
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl StructuredTableContext for NoSqlTableContext<'_> {
    fn table(&mut self, name: &str) -> Result<Box<dyn StructuredTable + '_>> {
        let state = match self.participants.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let schema = self.registry.get(name)?;
                tracing::trace!(
                    "Table {} joined transaction {}",
                    name,
                    self.tx.write_pointer()
                );
                entry.insert(TxTable::new(schema))
            }
        };
        Ok(Box::new(NoSqlTable {
            state,
            store: self.store,
            tx: self.tx,
        }))
    }
}

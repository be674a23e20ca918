//! Embedded relational database.
//!
//! Committed tables sit behind one `RwLock`. Each connection stages its
//! transaction's changes per table and applies them at commit, in table name
//! order, under a single write lock, so readers never see half a commit.
//! DDL is not transactional and applies immediately.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use super::connection::{ConnectionSource, SqlConnection};
use super::statement;
use crate::error::{Result, StoreError};
use crate::pool::{BoundedPool, PoolStats};
use crate::schema::{Row, RowKey, TableSchema};

#[derive(Debug, Default)]
struct StoredTable {
    rows: BTreeMap<RowKey, Row>,
}

/// Pending writes of one transaction, by table. `None` deletes.
type StagedChanges = BTreeMap<String, BTreeMap<RowKey, Option<Row>>>;

#[derive(Debug)]
struct DatabaseInner {
    url: String,
    tables: RwLock<BTreeMap<String, StoredTable>>,
    sessions: BoundedPool<u64>,
    next_session: AtomicU64,
    fail_commits: AtomicBool,
}

/// In-process relational database with a bounded number of connections.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    inner: Arc<DatabaseInner>,
}

impl MemoryDatabase {
    /// Creates an empty database.
    ///
    /// # Arguments
    /// * `url` - Identity reported by `describe`
    /// * `max_connections` - Maximum number of open connections
    /// * `acquire_timeout` - How long `connection` waits for a free slot
    pub fn new(url: impl Into<String>, max_connections: usize, acquire_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                url: url.into(),
                tables: RwLock::new(BTreeMap::new()),
                sessions: BoundedPool::new("sql connection", max_connections, acquire_timeout),
                next_session: AtomicU64::new(1),
                fail_commits: AtomicBool::new(false),
            }),
        }
    }

    /// Makes every subsequent commit fail until switched off again.
    pub fn set_fail_commits(&self, fail: bool) {
        self.inner.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn connection_stats(&self) -> PoolStats {
        self.inner.sessions.stats()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.inner.tables.read().keys().cloned().collect()
    }

    /// Committed row count of a table.
    pub fn row_count(&self, table: &str) -> Result<usize> {
        self.inner
            .tables
            .read()
            .get(table)
            .map(|t| t.rows.len())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }
}

impl ConnectionSource for MemoryDatabase {
    fn connection(&self) -> Result<Box<dyn SqlConnection>> {
        let session = self
            .inner
            .sessions
            .checkout(|| Ok(self.inner.next_session.fetch_add(1, Ordering::SeqCst)))?;
        Ok(Box::new(MemoryConnection {
            db: self.inner.clone(),
            session: Some(session),
            staged: None,
        }))
    }

    fn describe(&self) -> String {
        self.inner.url.clone()
    }
}

/// Connection to a [`MemoryDatabase`].
#[derive(Debug)]
pub struct MemoryConnection {
    db: Arc<DatabaseInner>,
    session: Option<u64>,
    staged: Option<StagedChanges>,
}

impl MemoryConnection {
    fn session_id(&self) -> u64 {
        self.session.unwrap_or_default()
    }

    fn ensure_table(&self, table: &str) -> Result<()> {
        if self.db.tables.read().contains_key(table) {
            Ok(())
        } else {
            Err(StoreError::TableNotFound(table.to_string()))
        }
    }

    fn stage_or_apply(&mut self, schema: &TableSchema, key: RowKey, cell: Option<Row>) -> Result<()> {
        match self.staged.as_mut() {
            Some(staged) => {
                self.db.tables.read().get(&schema.name).ok_or_else(|| {
                    StoreError::TableNotFound(schema.name.clone())
                })?;
                staged
                    .entry(schema.name.clone())
                    .or_default()
                    .insert(key, cell);
                Ok(())
            }
            None => {
                let mut tables = self.db.tables.write();
                let table = tables
                    .get_mut(&schema.name)
                    .ok_or_else(|| StoreError::TableNotFound(schema.name.clone()))?;
                match cell {
                    Some(row) => {
                        table.rows.insert(key, row);
                    }
                    None => {
                        table.rows.remove(&key);
                    }
                }
                Ok(())
            }
        }
    }
}

impl SqlConnection for MemoryConnection {
    fn begin(&mut self) -> Result<()> {
        if self.staged.is_some() {
            return Err(StoreError::Connection(format!(
                "session {} already has an open transaction",
                self.session_id()
            )));
        }
        tracing::trace!("[session {}] BEGIN", self.session_id());
        self.staged = Some(StagedChanges::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let staged = self.staged.take().ok_or_else(|| {
            StoreError::Connection(format!(
                "session {} has no open transaction",
                self.session_id()
            ))
        })?;
        if self.db.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(format!(
                "session {}: commit failed",
                self.session_id()
            )));
        }

        let mut tables = self.db.tables.write();
        if let Some(missing) = staged.keys().find(|name| !tables.contains_key(*name)) {
            return Err(StoreError::Connection(format!(
                "session {}: table {} was dropped during the transaction",
                self.session_id(),
                missing
            )));
        }
        for (name, changes) in staged {
            if let Some(table) = tables.get_mut(&name) {
                for (key, cell) in changes {
                    match cell {
                        Some(row) => {
                            table.rows.insert(key, row);
                        }
                        None => {
                            table.rows.remove(&key);
                        }
                    }
                }
            }
        }
        tracing::trace!("[session {}] COMMIT", self.session_id());
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.staged.take().is_some() {
            tracing::trace!("[session {}] ROLLBACK", self.session_id());
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }

    fn table_exists(&mut self, table: &str) -> Result<bool> {
        Ok(self.db.tables.read().contains_key(table))
    }

    fn create_table(&mut self, schema: &TableSchema) -> Result<()> {
        let mut tables = self.db.tables.write();
        if tables.contains_key(&schema.name) {
            return Err(StoreError::TableAlreadyExists(schema.name.clone()));
        }
        tracing::debug!("[session {}] {}", self.session_id(), statement::create_table(schema));
        for index in statement::create_indexes(schema) {
            tracing::debug!("[session {}] {}", self.session_id(), index);
        }
        tables.insert(schema.name.clone(), StoredTable::default());
        Ok(())
    }

    fn drop_table(&mut self, table: &str) -> Result<()> {
        let mut tables = self.db.tables.write();
        if tables.remove(table).is_none() {
            return Err(StoreError::TableNotFound(table.to_string()));
        }
        tracing::debug!("[session {}] {}", self.session_id(), statement::drop_table(table));
        Ok(())
    }

    fn upsert(&mut self, schema: &TableSchema, row: &Row) -> Result<()> {
        let key = schema.key_of(row)?;
        tracing::debug!("[session {}] {}", self.session_id(), statement::upsert(schema, row));
        self.stage_or_apply(schema, key, Some(row.clone()))
    }

    fn read(&mut self, schema: &TableSchema, key: &RowKey) -> Result<Option<Row>> {
        tracing::trace!("[session {}] {}", self.session_id(), statement::select_by_key(schema, key));
        if let Some(cell) = self
            .staged
            .as_ref()
            .and_then(|staged| staged.get(&schema.name))
            .and_then(|changes| changes.get(key))
        {
            self.ensure_table(&schema.name)?;
            return Ok(cell.clone());
        }
        let tables = self.db.tables.read();
        let table = tables
            .get(&schema.name)
            .ok_or_else(|| StoreError::TableNotFound(schema.name.clone()))?;
        Ok(table.rows.get(key).cloned())
    }

    fn delete(&mut self, schema: &TableSchema, key: &RowKey) -> Result<()> {
        tracing::debug!("[session {}] {}", self.session_id(), statement::delete_by_key(schema, key));
        self.stage_or_apply(schema, key.clone(), None)
    }

    fn scan(&mut self, schema: &TableSchema) -> Result<Vec<Row>> {
        tracing::trace!("[session {}] {}", self.session_id(), statement::select_all(schema));
        let mut rows = {
            let tables = self.db.tables.read();
            let table = tables
                .get(&schema.name)
                .ok_or_else(|| StoreError::TableNotFound(schema.name.clone()))?;
            table.rows.clone()
        };
        if let Some(changes) = self.staged.as_ref().and_then(|s| s.get(&schema.name)) {
            for (key, cell) in changes {
                match cell {
                    Some(row) => {
                        rows.insert(key.clone(), row.clone());
                    }
                    None => {
                        rows.remove(key);
                    }
                }
            }
        }
        Ok(rows.into_values().collect())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if self.staged.take().is_some() {
            tracing::warn!(
                "[session {}] closed with an open transaction, rolling back",
                self.session_id()
            );
        }
        if let Some(session) = self.session.take() {
            self.db.sessions.checkin(session, true);
        }
    }
}

//! Shared fixtures: provider builders, schemas, and fault-injecting collaborators.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use table_store_core::nosql::{
    ChangeId, CoordinatorClient, CoordinatorConnector, InMemoryCoordinator, KeyValueStore,
    MemoryKvStore, Transaction,
};
use table_store_core::{
    Backends, FieldType, Result, Row, RowKey, StorageProviders, StoreConfig, StoreError,
    TableSchema, Value,
};

pub fn counter_schema(name: &str) -> TableSchema {
    TableSchema::builder(name)
        .column("name", FieldType::String)
        .column("count", FieldType::Long)
        .primary_key(["name"])
        .build()
        .unwrap()
}

pub fn counter_row(name: &str, count: i64) -> Row {
    table_store_core::row([("name", Value::from(name)), ("count", Value::Long(count))])
}

/// Providers over the built-in local backends.
pub fn local_providers(backend: &str) -> StorageProviders {
    StorageProviders::from_config(&StoreConfig::with_storage(backend)).unwrap()
}

/// Nosql providers over the given coordinator connector and a fresh store.
pub fn nosql_providers(
    config: StoreConfig,
    connector: Arc<dyn CoordinatorConnector>,
    store: Arc<dyn KeyValueStore>,
) -> StorageProviders {
    StorageProviders::from_parts(&config, Backends::nosql(connector, store)).unwrap()
}

pub fn count_in(providers: &StorageProviders, table: &str, name: &str) -> Option<i64> {
    use table_store_core::TransactionRunnerExt;
    providers
        .runner()
        .run(|ctx| ctx.table(table)?.read(&[Value::from(name)]))
        .unwrap()
        .and_then(|row| row.get("count").and_then(Value::as_i64))
}

#[derive(Debug, Default)]
pub struct ClientCounters {
    pub connections: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

/// Connector recording how many transactions are open at once.
pub struct CountingConnector {
    inner: InMemoryCoordinator,
    pub counters: Arc<ClientCounters>,
}

impl CountingConnector {
    pub fn new(inner: InMemoryCoordinator) -> Self {
        Self {
            inner,
            counters: Arc::new(ClientCounters::default()),
        }
    }
}

impl CoordinatorConnector for CountingConnector {
    fn connect(&self) -> Result<Box<dyn CoordinatorClient>> {
        let client = self.inner.connect()?;
        self.counters.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingClient {
            inner: client,
            counters: self.counters.clone(),
        }))
    }
}

struct CountingClient {
    inner: Box<dyn CoordinatorClient>,
    counters: Arc<ClientCounters>,
}

impl CountingClient {
    fn finished(&self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CoordinatorClient for CountingClient {
    fn begin(&mut self) -> Result<Transaction> {
        let tx = self.inner.begin()?;
        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Ok(tx)
    }

    fn can_commit(&mut self, tx: &Transaction, changes: &HashSet<ChangeId>) -> Result<bool> {
        self.inner.can_commit(tx, changes)
    }

    fn commit(&mut self, tx: &Transaction) -> Result<bool> {
        let committed = self.inner.commit(tx)?;
        if committed {
            self.finished();
        }
        Ok(committed)
    }

    fn abort(&mut self, tx: &Transaction) -> Result<()> {
        self.inner.abort(tx)?;
        self.finished();
        Ok(())
    }

    fn invalidate(&mut self, tx: &Transaction) -> Result<bool> {
        let result = self.inner.invalidate(tx)?;
        self.finished();
        Ok(result)
    }
}

/// Key-value store that can be told to fail writes to one table or all undos.
#[derive(Default)]
pub struct FlakyKvStore {
    pub inner: MemoryKvStore,
    fail_writes_to: Mutex<Option<String>>,
    fail_undo: AtomicBool,
}

impl FlakyKvStore {
    pub fn fail_writes_to(&self, table: &str) {
        *self.fail_writes_to.lock() = Some(table.to_string());
    }

    pub fn fail_undo(&self, fail: bool) {
        self.fail_undo.store(fail, Ordering::SeqCst);
    }
}

impl KeyValueStore for FlakyKvStore {
    fn create_table(&self, table: &str) -> Result<()> {
        self.inner.create_table(table)
    }

    fn drop_table(&self, table: &str) -> Result<()> {
        self.inner.drop_table(table)
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        self.inner.table_exists(table)
    }

    fn read(&self, table: &str, key: &RowKey, tx: &Transaction) -> Result<Option<Row>> {
        self.inner.read(table, key, tx)
    }

    fn scan(&self, table: &str, tx: &Transaction) -> Result<Vec<(RowKey, Row)>> {
        self.inner.scan(table, tx)
    }

    fn write(&self, table: &str, key: &RowKey, version: u64, cell: Option<Row>) -> Result<()> {
        if self.fail_writes_to.lock().as_deref() == Some(table) {
            return Err(StoreError::Connection(format!("region server for {} unreachable", table)));
        }
        self.inner.write(table, key, version, cell)
    }

    fn undo(&self, table: &str, key: &RowKey, version: u64) -> Result<()> {
        if self.fail_undo.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("undo rejected".to_string()));
        }
        self.inner.undo(table, key, version)
    }

    fn metadata_get(&self, key: &str) -> Result<Option<String>> {
        self.inner.metadata_get(key)
    }

    fn metadata_put_if_absent(&self, key: &str, value: String) -> Result<bool> {
        self.inner.metadata_put_if_absent(key, value)
    }

    fn metadata_delete(&self, key: &str) -> Result<bool> {
        self.inner.metadata_delete(key)
    }

    fn metadata_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.metadata_keys(prefix)
    }
}

//! Storage backend selection and provider wiring.
//!
//! [`StorageProviders`] is built once at startup from a [`StoreConfig`]. It
//! resolves the configured backend family and constructs that family's
//! transaction runner, table admin, and (cached) schema registry. Callers
//! only ever see the three trait objects.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::admin::StructuredTableAdmin;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::nosql::{
    create_client_provider, CoordinatorConnector, InMemoryCoordinator, KeyValueStore,
    MemoryKvStore, NoSqlStructuredTableAdmin, NoSqlStructuredTableRegistry,
    NoSqlTransactionRunner, NoopCoordinator,
};
use crate::registry::{CachedStructuredTableRegistry, StructuredTableRegistry};
use crate::runner::TransactionRunner;
use crate::sql::{
    ConnectionSource, MemoryDatabase, SqlStructuredTableAdmin, SqlStructuredTableRegistry,
    SqlTransactionRunner,
};

const MEMORY_URL_SCHEME: &str = "memory://";

/// Backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageBackendKind {
    /// Versioned key-value store with an external transaction coordinator
    NoSql,
    /// Relational database with native transactions
    Sql,
}

impl StorageBackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageBackendKind::NoSql => "nosql",
            StorageBackendKind::Sql => "sql",
        }
    }
}

impl fmt::Display for StorageBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackendKind {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "nosql" => Ok(StorageBackendKind::NoSql),
            "sql" => Ok(StorageBackendKind::Sql),
            _ => Err(StoreError::Configuration(format!(
                "{} is not a supported storage implementation, the supported implementations are {} and {}",
                value,
                StorageBackendKind::NoSql,
                StorageBackendKind::Sql
            ))),
        }
    }
}

/// Coordinator client provider strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientProviderKind {
    /// Bounded pool shared by all threads
    Pool,
    /// One client per thread
    ThreadLocal,
}

impl ClientProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientProviderKind::Pool => "pool",
            ClientProviderKind::ThreadLocal => "thread-local",
        }
    }
}

impl fmt::Display for ClientProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientProviderKind {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "pool" => Ok(ClientProviderKind::Pool),
            "thread-local" => Ok(ClientProviderKind::ThreadLocal),
            _ => {
                let message = format!(
                    "Unknown Transaction Service Client Provider '{}', expected {} or {}",
                    value,
                    ClientProviderKind::Pool,
                    ClientProviderKind::ThreadLocal
                );
                tracing::error!("{}", message);
                Err(StoreError::Configuration(message))
            }
        }
    }
}

/// External collaborators for [`StorageProviders::from_parts`]. Only the
/// selected family's collaborators are required.
#[derive(Clone, Default)]
pub struct Backends {
    pub coordinator: Option<Arc<dyn CoordinatorConnector>>,
    pub kv_store: Option<Arc<dyn KeyValueStore>>,
    pub connection_source: Option<Arc<dyn ConnectionSource>>,
}

impl Backends {
    pub fn nosql(coordinator: Arc<dyn CoordinatorConnector>, kv_store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            coordinator: Some(coordinator),
            kv_store: Some(kv_store),
            connection_source: None,
        }
    }

    pub fn sql(connection_source: Arc<dyn ConnectionSource>) -> Self {
        Self {
            coordinator: None,
            kv_store: None,
            connection_source: Some(connection_source),
        }
    }
}

fn required<T: ?Sized>(collaborator: &Option<Arc<T>>, setting: &str) -> Result<Arc<T>> {
    collaborator.clone().ok_or_else(|| {
        StoreError::Configuration(format!("missing required setting: {}", setting))
    })
}

/// The three capabilities of one backend family.
#[derive(Clone)]
pub struct StorageProviders {
    kind: StorageBackendKind,
    runner: Arc<dyn TransactionRunner>,
    admin: Arc<dyn StructuredTableAdmin>,
    registry: Arc<dyn StructuredTableRegistry>,
}

impl StorageProviders {
    /// Wires the in-process backends: an in-memory key-value store and
    /// coordinator for `nosql`, an embedded database for `sql`.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let kind = config.backend_kind()?;
        let backends = match kind {
            StorageBackendKind::NoSql => {
                let coordinator: Arc<dyn CoordinatorConnector> = if config.use_noop_tx_client {
                    tracing::warn!("Using the no-op transaction coordinator; conflicts are not detected");
                    Arc::new(NoopCoordinator::new())
                } else {
                    Arc::new(InMemoryCoordinator::new())
                };
                Backends::nosql(coordinator, Arc::new(MemoryKvStore::new()))
            }
            StorageBackendKind::Sql => {
                if !config.sql_connection_string.starts_with(MEMORY_URL_SCHEME) {
                    return Err(StoreError::Configuration(format!(
                        "sql_connection_string '{}' needs an external connection source; only {} URLs are built in",
                        config.sql_connection_string, MEMORY_URL_SCHEME
                    )));
                }
                Backends::sql(Arc::new(MemoryDatabase::new(
                    config.sql_connection_string.clone(),
                    config.sql_max_connections,
                    config.sql_acquire_timeout(),
                )))
            }
        };
        Self::from_parts(config, backends)
    }

    /// Builds the providers of the configured family from the given collaborators.
    ///
    /// # Returns
    /// `Result<StorageProviders, StoreError>`; every error is `Configuration`
    /// except failures creating the relational registry table.
    pub fn from_parts(config: &StoreConfig, backends: Backends) -> Result<Self> {
        config.validate()?;
        let kind = config.backend_kind()?;
        tracing::info!("Selected storage implementation '{}'", kind);

        let providers = match kind {
            StorageBackendKind::NoSql => {
                let strategy = config.client_provider_kind()?;
                let coordinator = required(&backends.coordinator, "coordinator")?;
                let store = required(&backends.kv_store, "kv_store")?;

                let registry: Arc<dyn StructuredTableRegistry> = Arc::new(
                    CachedStructuredTableRegistry::new(Arc::new(NoSqlStructuredTableRegistry::new(
                        store.clone(),
                    ))),
                );
                let clients = create_client_provider(strategy, coordinator, config);
                Self {
                    kind,
                    runner: Arc::new(NoSqlTransactionRunner::new(
                        clients,
                        store.clone(),
                        registry.clone(),
                    )),
                    admin: Arc::new(NoSqlStructuredTableAdmin::new(store, registry.clone())),
                    registry,
                }
            }
            StorageBackendKind::Sql => {
                let source = required(&backends.connection_source, "sql_connection_string")?;
                tracing::info!("Using relational database {}", source.describe());

                let backing = SqlStructuredTableRegistry::new(source.clone());
                backing.initialize()?;
                let registry: Arc<dyn StructuredTableRegistry> =
                    Arc::new(CachedStructuredTableRegistry::new(Arc::new(backing)));
                Self {
                    kind,
                    runner: Arc::new(SqlTransactionRunner::new(source.clone(), registry.clone())),
                    admin: Arc::new(SqlStructuredTableAdmin::new(source, registry.clone())),
                    registry,
                }
            }
        };
        Ok(providers)
    }

    pub fn kind(&self) -> StorageBackendKind {
        self.kind
    }

    pub fn runner(&self) -> Arc<dyn TransactionRunner> {
        self.runner.clone()
    }

    pub fn admin(&self) -> Arc<dyn StructuredTableAdmin> {
        self.admin.clone()
    }

    pub fn registry(&self) -> Arc<dyn StructuredTableRegistry> {
        self.registry.clone()
    }
}

impl fmt::Debug for StorageProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageProviders")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

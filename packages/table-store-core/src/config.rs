//! Storage layer configuration.
//!
//! Supports TOML config files, environment variable overrides, and defaults.

use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::selector::{ClientProviderKind, StorageBackendKind};

/// Default coordinator client pool size.
pub const DEFAULT_TX_CLIENT_POOL_SIZE: usize = 50;
/// Default coordinator client borrow timeout.
pub const DEFAULT_TX_CLIENT_OBTAIN_TIMEOUT_MS: u64 = 3000;

/// Configuration for the structured-table storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Storage implementation: `nosql` or `sql` (required)
    pub storage_implementation: Option<String>,
    /// Coordinator client provider: `pool` or `thread-local` (default: `pool`)
    pub tx_client_provider: String,
    /// Maximum number of pooled coordinator clients (default: 50)
    pub tx_client_pool_size: usize,
    /// How long a borrow waits for a pooled coordinator client (default: 3000 ms)
    pub tx_client_obtain_timeout_ms: u64,
    /// Use the constant coordinator that never detects conflicts (default: false)
    pub use_noop_tx_client: bool,
    /// Relational connection string (default: `memory://local`)
    pub sql_connection_string: String,
    /// Maximum concurrent relational connections for the local database (default: 10)
    pub sql_max_connections: usize,
    /// How long to wait for a relational connection (default: 3000 ms)
    pub sql_acquire_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_implementation: None,
            tx_client_provider: "pool".to_string(),
            tx_client_pool_size: DEFAULT_TX_CLIENT_POOL_SIZE,
            tx_client_obtain_timeout_ms: DEFAULT_TX_CLIENT_OBTAIN_TIMEOUT_MS,
            use_noop_tx_client: false,
            sql_connection_string: "memory://local".to_string(),
            sql_max_connections: 10,
            sql_acquire_timeout_ms: 3000,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a default configuration selecting the given storage implementation.
    pub fn with_storage(storage_implementation: impl Into<String>) -> Self {
        Self {
            storage_implementation: Some(storage_implementation.into()),
            ..Self::default()
        }
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            StoreError::Configuration(format!("Failed to read config file: {}", e))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| StoreError::Configuration(format!("Invalid TOML: {}", e)))
    }

    /// Saves the configuration to a TOML file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let toml = toml::to_string_pretty(self).map_err(|e| {
            StoreError::Configuration(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(path.as_ref(), toml).map_err(|e| {
            StoreError::Configuration(format!("Failed to write config file: {}", e))
        })?;
        Ok(())
    }

    /// Applies environment variable overrides.
    /// Environment variables are prefixed with `TABLESTORE_`.
    /// Example: `TABLESTORE_STORAGE_IMPLEMENTATION=sql` overrides `storage_implementation`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("TABLESTORE_STORAGE_IMPLEMENTATION") {
            self.storage_implementation = Some(val);
        }
        if let Ok(val) = env::var("TABLESTORE_TX_CLIENT_PROVIDER") {
            self.tx_client_provider = val;
        }
        if let Ok(val) = env::var("TABLESTORE_TX_CLIENT_POOL_SIZE") {
            self.tx_client_pool_size = parse_env("tx_client_pool_size", &val)?;
        }
        if let Ok(val) = env::var("TABLESTORE_TX_CLIENT_OBTAIN_TIMEOUT_MS") {
            self.tx_client_obtain_timeout_ms = parse_env("tx_client_obtain_timeout_ms", &val)?;
        }
        if let Ok(val) = env::var("TABLESTORE_USE_NOOP_TX_CLIENT") {
            self.use_noop_tx_client = parse_env("use_noop_tx_client", &val)?;
        }
        if let Ok(val) = env::var("TABLESTORE_SQL_CONNECTION_STRING") {
            self.sql_connection_string = val;
        }
        if let Ok(val) = env::var("TABLESTORE_SQL_MAX_CONNECTIONS") {
            self.sql_max_connections = parse_env("sql_max_connections", &val)?;
        }
        if let Ok(val) = env::var("TABLESTORE_SQL_ACQUIRE_TIMEOUT_MS") {
            self.sql_acquire_timeout_ms = parse_env("sql_acquire_timeout_ms", &val)?;
        }
        Ok(())
    }

    /// Resolves the configured storage implementation.
    pub fn backend_kind(&self) -> Result<StorageBackendKind> {
        match self.storage_implementation.as_deref() {
            None => Err(StoreError::Configuration(
                "No storage implementation is specified in the configuration".to_string(),
            )),
            Some(value) => value.parse(),
        }
    }

    /// Resolves the configured coordinator client provider strategy.
    pub fn client_provider_kind(&self) -> Result<ClientProviderKind> {
        self.tx_client_provider.parse()
    }

    /// Checks numeric bounds. Backend and strategy names are checked by the selector.
    pub fn validate(&self) -> Result<()> {
        if self.tx_client_pool_size == 0 {
            return Err(StoreError::Configuration(
                "tx_client_pool_size must be greater than 0".to_string(),
            ));
        }
        if self.sql_max_connections == 0 {
            return Err(StoreError::Configuration(
                "sql_max_connections must be greater than 0".to_string(),
            ));
        }
        if self.sql_connection_string.is_empty() {
            return Err(StoreError::Configuration(
                "sql_connection_string must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the coordinator client borrow timeout as a `Duration`.
    pub fn tx_client_obtain_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_client_obtain_timeout_ms)
    }

    /// Returns the relational connection wait bound as a `Duration`.
    pub fn sql_acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.sql_acquire_timeout_ms)
    }
}

fn parse_env<T: FromStr>(setting: &str, val: &str) -> Result<T> {
    val.parse()
        .map_err(|_| StoreError::Configuration(format!("Invalid {}: {}", setting, val)))
}

//! Storage layer error types.

use thiserror::Error;

/// Errors returned by the structured-table storage layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Invalid or missing configuration, fatal at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Table already exists
    #[error("Table '{0}' already exists")]
    TableAlreadyExists(String),

    /// Table not found
    #[error("Table '{0}' not found")]
    TableNotFound(String),

    /// Schema definition violates a schema invariant
    #[error("Invalid schema for table '{table}': {reason}")]
    InvalidSchema { table: String, reason: String },

    /// Row or key does not match the table schema
    #[error("Invalid row for table '{table}': {reason}")]
    InvalidRow { table: String, reason: String },

    /// Transaction was rolled back; the whole unit of work may be retried
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    /// Timed out waiting for a pooled resource
    #[error("Timed out after {waited_ms} ms waiting for {resource}")]
    PoolTimeout { resource: &'static str, waited_ms: u64 },

    /// Coordinator session or protocol failure
    #[error("Coordinator error: {0}")]
    Coordinator(String),

    /// Relational driver failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend storage and registry disagree after a schema change
    #[error("Consistency error on table '{table}': {detail}")]
    Consistency { table: String, detail: String },

    /// Registry document encode/decode failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unit of work reported a failure
    #[error("Unit of work failed: {0}")]
    WorkFailed(String),

    /// Unit of work panicked
    #[error("Unit of work panicked: {0}")]
    WorkPanicked(String),
}

impl StoreError {
    /// Returns whether the caller may retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::TransactionAborted(_) | StoreError::PoolTimeout { .. }
        )
    }

    /// Returns whether this is a fatal storage/registry divergence.
    pub fn is_consistency(&self) -> bool {
        matches!(self, StoreError::Consistency { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

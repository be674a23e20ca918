//! Structured-table storage with pluggable transactional backends.
//!
//! Provides one API for schema-bearing tables (transaction runner, table
//! admin, schema registry) over either a coordinator-managed versioned
//! key-value store or a relational database, selected from configuration.

pub mod admin;
pub mod config;
pub mod error;
pub mod nosql;
pub mod pool;
pub mod registry;
pub mod runner;
pub mod schema;
pub mod selector;
pub mod sql;

pub use admin::StructuredTableAdmin;
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use registry::{CachedStructuredTableRegistry, StructuredTableRegistry};
pub use runner::{
    StructuredTable, StructuredTableContext, TransactionRunner, TransactionRunnerExt, UnitOfWork,
};
pub use schema::{row, FieldDef, FieldType, Row, RowKey, TableSchema, Value};
pub use selector::{Backends, ClientProviderKind, StorageBackendKind, StorageProviders};

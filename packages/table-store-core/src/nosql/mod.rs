//! Distributed-transaction backend family.
//!
//! Tables live in a versioned key-value store; isolation and conflict
//! detection come from an external transaction coordinator reached through
//! a [`CoordinatorClientProvider`].

mod admin;
mod coordinator;
mod memory_coordinator;
mod provider;
mod registry;
mod runner;
mod store;
mod table;

pub use admin::NoSqlStructuredTableAdmin;
pub use coordinator::{ChangeId, CoordinatorClient, CoordinatorConnector, Transaction};
pub use memory_coordinator::{InMemoryCoordinator, InMemoryCoordinatorClient, NoopCoordinator};
pub use provider::{
    create_client_provider, ClientLease, CoordinatorClientProvider, PooledClientProvider,
    ThreadLocalClientProvider,
};
pub use registry::NoSqlStructuredTableRegistry;
pub use runner::NoSqlTransactionRunner;
pub use store::{KeyValueStore, MemoryKvStore};

//! Relational backend family.
//!
//! Tables are ordinary relational tables reached through a
//! [`ConnectionSource`]; each unit of work runs inside one native database
//! transaction.

mod admin;
mod connection;
mod memory;
mod registry;
mod runner;
pub mod statement;
mod table;

pub use admin::SqlStructuredTableAdmin;
pub use connection::{ConnectionSource, SqlConnection};
pub use memory::{MemoryConnection, MemoryDatabase};
pub use registry::{SqlStructuredTableRegistry, REGISTRY_TABLE};
pub use runner::SqlTransactionRunner;

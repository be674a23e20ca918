//! Relational driver contract.

use crate::error::Result;
use crate::schema::{Row, RowKey, TableSchema};

/// One relational database session.
///
/// Outside `begin`/`commit` every statement commits on its own. Dropping a
/// connection with an open transaction rolls it back and returns the
/// connection to its source.
pub trait SqlConnection: Send {
    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
    fn in_transaction(&self) -> bool;

    fn table_exists(&mut self, table: &str) -> Result<bool>;
    fn create_table(&mut self, schema: &TableSchema) -> Result<()>;
    fn drop_table(&mut self, table: &str) -> Result<()>;

    /// Inserts `row`, or replaces the stored row with the same key.
    fn upsert(&mut self, schema: &TableSchema, row: &Row) -> Result<()>;
    fn read(&mut self, schema: &TableSchema, key: &RowKey) -> Result<Option<Row>>;
    fn delete(&mut self, schema: &TableSchema, key: &RowKey) -> Result<()>;
    /// Every row in key order.
    fn scan(&mut self, schema: &TableSchema) -> Result<Vec<Row>>;
}

/// Hands out relational connections, waiting a bounded time when none is free.
pub trait ConnectionSource: Send + Sync {
    fn connection(&self) -> Result<Box<dyn SqlConnection>>;

    /// Connection string or other human-readable identity of the database.
    fn describe(&self) -> String;
}

//! Transaction runner contract and the table view handed to units of work.

use crate::error::{Result, StoreError};
use crate::schema::{Row, TableSchema, Value};
use crate::selector::StorageBackendKind;

/// A transactional view of one structured table.
///
/// Reads observe the enclosing transaction's own writes.
pub trait StructuredTable {
    /// Schema of the table.
    fn schema(&self) -> &TableSchema;

    /// Inserts a row, or merges the given columns into the existing row.
    fn upsert(&mut self, row: Row) -> Result<()>;

    /// Reads the row with the given primary key values.
    fn read(&mut self, key: &[Value]) -> Result<Option<Row>>;

    /// Deletes the row with the given primary key values. Deleting an absent
    /// row is not an error.
    fn delete(&mut self, key: &[Value]) -> Result<()>;

    /// Returns every row in primary key order.
    fn scan(&mut self) -> Result<Vec<Row>>;
}

/// Per-transaction access to structured tables.
pub trait StructuredTableContext {
    /// Opens a table view in the current transaction. Fails with
    /// `TableNotFound` if the table is not registered.
    fn table(&mut self, name: &str) -> Result<Box<dyn StructuredTable + '_>>;
}

/// Unit of work signature accepted by [`TransactionRunner::execute`].
pub type UnitOfWork<'a> = dyn FnMut(&mut dyn StructuredTableContext) -> Result<()> + 'a;

/// Executes units of work inside one atomic transaction boundary.
pub trait TransactionRunner: Send + Sync {
    /// Runs `work` in a new transaction, committing if it succeeds and
    /// rolling back otherwise. The work is invoked exactly once.
    fn execute(&self, work: &mut UnitOfWork<'_>) -> Result<()>;

    /// Backend family this runner belongs to.
    fn kind(&self) -> StorageBackendKind;
}

/// Closure-friendly entry point for any [`TransactionRunner`].
pub trait TransactionRunnerExt {
    /// Runs `work` in a transaction and returns its value.
    fn run<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn StructuredTableContext) -> Result<T>;
}

impl<R: TransactionRunner + ?Sized> TransactionRunnerExt for R {
    fn run<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn StructuredTableContext) -> Result<T>,
    {
        let mut work = Some(work);
        let mut output = None;
        self.execute(&mut |ctx: &mut dyn StructuredTableContext| {
            let work = work.take().ok_or_else(|| {
                StoreError::TransactionAborted("unit of work invoked more than once".to_string())
            })?;
            output = Some(work(ctx)?);
            Ok(())
        })?;
        output.ok_or_else(|| {
            StoreError::TransactionAborted("unit of work produced no result".to_string())
        })
    }
}

/// Invokes a unit of work, converting a panic into `WorkPanicked`.
pub(crate) fn invoke_work(
    work: &mut UnitOfWork<'_>,
    ctx: &mut dyn StructuredTableContext,
) -> Result<()> {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| work(ctx)));
    match result {
        Ok(outcome) => outcome,
        Err(panic) => {
            let panic_msg = if let Some(msg) = panic.downcast_ref::<&str>() {
                msg.to_string()
            } else if let Some(msg) = panic.downcast_ref::<String>() {
                msg.clone()
            } else {
                "unknown panic".to_string()
            };
            tracing::error!("Unit of work panicked: {}", panic_msg);
            Err(StoreError::WorkPanicked(panic_msg))
        }
    }
}

//! Transaction runner for the distributed backend.
//!
//! Each `execute` leases a coordinator client, begins a transaction, runs
//! the unit of work against buffered table views, and then drives the
//! commit protocol:
//!
//! 1. conflict check of the change set (`can_commit`)
//! 2. persist every participant's writes
//! 3. coordinator commit
//!
//! Any failure rolls back every participant and aborts the transaction. A
//! participant that cannot roll back causes the transaction to be
//! invalidated so its leftover writes stay invisible. When the coordinator
//! session itself fails, that abort or invalidation is retried on the next
//! session the runner leases.

use std::sync::Arc;

use parking_lot::Mutex;

use super::coordinator::Transaction;
use super::provider::{ClientLease, CoordinatorClientProvider};
use super::store::KeyValueStore;
use super::table::NoSqlTableContext;
use crate::error::{Result, StoreError};
use crate::registry::StructuredTableRegistry;
use crate::runner::{invoke_work, TransactionRunner, UnitOfWork};
use crate::selector::StorageBackendKind;

/// Maps coordinator failures to an aborted transaction; other errors pass through.
fn into_aborted(e: StoreError) -> StoreError {
    match e {
        StoreError::Coordinator(msg) => {
            StoreError::TransactionAborted(format!("coordinator failure: {}", msg))
        }
        other => other,
    }
}

/// A transaction the coordinator still considers in progress.
struct Unfinished {
    tx: Transaction,
    rolled_back: bool,
}

/// Runs units of work as coordinator-managed transactions.
pub struct NoSqlTransactionRunner {
    clients: Arc<dyn CoordinatorClientProvider>,
    store: Arc<dyn KeyValueStore>,
    registry: Arc<dyn StructuredTableRegistry>,
    unfinished: Mutex<Vec<Unfinished>>,
}

impl NoSqlTransactionRunner {
    pub fn new(
        clients: Arc<dyn CoordinatorClientProvider>,
        store: Arc<dyn KeyValueStore>,
        registry: Arc<dyn StructuredTableRegistry>,
    ) -> Self {
        Self {
            clients,
            store,
            registry,
            unfinished: Mutex::new(Vec::new()),
        }
    }

    fn commit(
        &self,
        lease: &mut ClientLease<'_>,
        tx: &Transaction,
        ctx: &mut NoSqlTableContext<'_>,
    ) -> Result<()> {
        let id = tx.write_pointer();
        let changes = ctx.change_set();

        match lease.client().can_commit(tx, &changes) {
            Ok(true) => {}
            Ok(false) => {
                self.abort(lease, tx, ctx);
                return Err(conflict(id));
            }
            Err(e) => {
                lease.discard();
                self.abort(lease, tx, ctx);
                return Err(into_aborted(e));
            }
        }

        if let Err(e) = ctx.persist_all() {
            tracing::warn!("Transaction {} failed to persist: {}", id, e);
            self.abort(lease, tx, ctx);
            return Err(StoreError::TransactionAborted(format!(
                "transaction {} could not persist its changes: {}",
                id, e
            )));
        }

        match lease.client().commit(tx) {
            Ok(true) => {
                tracing::debug!("Committed transaction {} ({} changes)", id, changes.len());
                Ok(())
            }
            Ok(false) => {
                self.abort(lease, tx, ctx);
                Err(conflict(id))
            }
            Err(e) => {
                lease.discard();
                self.abort(lease, tx, ctx);
                Err(into_aborted(e))
            }
        }
    }

    fn abort(&self, lease: &mut ClientLease<'_>, tx: &Transaction, ctx: &mut NoSqlTableContext<'_>) {
        let orphan = Unfinished {
            tx: tx.clone(),
            rolled_back: ctx.rollback_all().is_ok(),
        };

        if lease.is_discarded() {
            tracing::warn!(
                "Transaction {} will be settled on the next coordinator session",
                tx.write_pointer()
            );
            self.unfinished.lock().push(orphan);
            return;
        }

        if let Err(e) = settle(lease, &orphan) {
            tracing::warn!("Failed to settle transaction {}: {}", tx.write_pointer(), e);
            lease.discard();
            self.unfinished.lock().push(orphan);
        }
    }

    /// Settles transactions whose session failed before they were finished.
    fn settle_unfinished(&self, lease: &mut ClientLease<'_>) -> Result<()> {
        let pending = std::mem::take(&mut *self.unfinished.lock());
        let mut pending = pending.into_iter();
        while let Some(orphan) = pending.next() {
            if let Err(e) = settle(lease, &orphan) {
                lease.discard();
                let mut unfinished = self.unfinished.lock();
                unfinished.push(orphan);
                unfinished.extend(pending);
                return Err(into_aborted(e));
            }
        }
        Ok(())
    }

    /// Transactions waiting to be aborted or invalidated.
    pub fn unfinished_count(&self) -> usize {
        self.unfinished.lock().len()
    }
}

/// Aborts a rolled-back transaction, or invalidates one whose writes may
/// still be in storage.
fn settle(lease: &mut ClientLease<'_>, orphan: &Unfinished) -> Result<()> {
    let id = orphan.tx.write_pointer();
    if orphan.rolled_back {
        lease.client().abort(&orphan.tx)?;
        tracing::debug!("Aborted transaction {}", id);
    } else {
        lease.client().invalidate(&orphan.tx)?;
        tracing::error!("Invalidated transaction {} after failed rollback", id);
    }
    Ok(())
}

fn conflict(id: u64) -> StoreError {
    StoreError::TransactionAborted(format!(
        "transaction {} conflicts with a concurrent commit",
        id
    ))
}

impl TransactionRunner for NoSqlTransactionRunner {
    fn execute(&self, work: &mut UnitOfWork<'_>) -> Result<()> {
        let mut lease = self.clients.acquire().map_err(into_aborted)?;
        self.settle_unfinished(&mut lease)?;
        let tx = match lease.client().begin() {
            Ok(tx) => tx,
            Err(e) => {
                lease.discard();
                return Err(into_aborted(e));
            }
        };
        tracing::trace!("Started transaction {}", tx.write_pointer());

        let mut ctx = NoSqlTableContext::new(self.store.as_ref(), self.registry.as_ref(), &tx);
        if let Err(e) = invoke_work(work, &mut ctx) {
            tracing::debug!("Unit of work failed in transaction {}: {}", tx.write_pointer(), e);
            self.abort(&mut lease, &tx, &mut ctx);
            return Err(e);
        }
        self.commit(&mut lease, &tx, &mut ctx)
    }

    fn kind(&self) -> StorageBackendKind {
        StorageBackendKind::NoSql
    }
}

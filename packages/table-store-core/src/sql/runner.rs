//! Transaction runner for the relational backend.

use std::sync::Arc;

use super::connection::ConnectionSource;
use super::table::SqlTableContext;
use crate::error::{Result, StoreError};
use crate::registry::StructuredTableRegistry;
use crate::runner::{invoke_work, TransactionRunner, UnitOfWork};
use crate::selector::StorageBackendKind;

fn into_aborted(e: StoreError) -> StoreError {
    match e {
        StoreError::Connection(msg) => {
            StoreError::TransactionAborted(format!("connection failure: {}", msg))
        }
        other => other,
    }
}

/// Runs units of work inside native database transactions.
pub struct SqlTransactionRunner {
    source: Arc<dyn ConnectionSource>,
    registry: Arc<dyn StructuredTableRegistry>,
}

impl SqlTransactionRunner {
    pub fn new(source: Arc<dyn ConnectionSource>, registry: Arc<dyn StructuredTableRegistry>) -> Self {
        Self { source, registry }
    }
}

impl TransactionRunner for SqlTransactionRunner {
    fn execute(&self, work: &mut UnitOfWork<'_>) -> Result<()> {
        let mut conn = self.source.connection().map_err(into_aborted)?;
        conn.begin().map_err(into_aborted)?;

        let outcome = {
            let mut ctx = SqlTableContext::new(conn.as_mut(), self.registry.as_ref());
            invoke_work(work, &mut ctx)
        };

        match outcome {
            Ok(()) => conn.commit().map_err(|e| {
                tracing::warn!("Commit failed: {}", e);
                if conn.in_transaction() {
                    if let Err(rollback) = conn.rollback() {
                        tracing::warn!("Rollback after failed commit failed: {}", rollback);
                    }
                }
                into_aborted(e)
            }),
            Err(e) => {
                if let Err(rollback) = conn.rollback() {
                    tracing::warn!("Rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    fn kind(&self) -> StorageBackendKind {
        StorageBackendKind::Sql
    }
}

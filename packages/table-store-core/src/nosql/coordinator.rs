//! Coordinator client contract for distributed transactions.

use std::collections::{BTreeSet, HashSet};

use crate::error::Result;
use crate::schema::RowKey;

/// Snapshot describing one distributed transaction.
///
/// The write pointer is both the transaction id and the version stamped on
/// every cell the transaction writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    write_pointer: u64,
    read_pointer: u64,
    excluded: BTreeSet<u64>,
}

impl Transaction {
    /// Creates a transaction snapshot.
    ///
    /// # Arguments
    /// * `write_pointer` - Transaction id and version of its writes
    /// * `read_pointer` - Highest version the snapshot may observe
    /// * `excluded` - Versions at or below the read pointer that stay invisible
    ///   (in progress or invalidated when the transaction started)
    pub fn new(write_pointer: u64, read_pointer: u64, excluded: BTreeSet<u64>) -> Self {
        Self {
            write_pointer,
            read_pointer,
            excluded,
        }
    }

    pub fn write_pointer(&self) -> u64 {
        self.write_pointer
    }

    pub fn read_pointer(&self) -> u64 {
        self.read_pointer
    }

    pub fn excluded(&self) -> &BTreeSet<u64> {
        &self.excluded
    }

    /// Returns whether a cell written at `version` is visible to this transaction.
    pub fn is_visible(&self, version: u64) -> bool {
        version == self.write_pointer
            || (version <= self.read_pointer && !self.excluded.contains(&version))
    }
}

/// One changed row, used for write-write conflict detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeId {
    pub table: String,
    pub key: RowKey,
}

/// A session with the transaction coordinator.
pub trait CoordinatorClient: Send + Sync {
    /// Starts a transaction.
    fn begin(&mut self) -> Result<Transaction>;

    /// Checks the change set against transactions committed since `tx`
    /// started. `false` means a conflict.
    fn can_commit(&mut self, tx: &Transaction, changes: &HashSet<ChangeId>) -> Result<bool>;

    /// Makes the transaction's writes visible. `false` means a conflict.
    fn commit(&mut self, tx: &Transaction) -> Result<bool>;

    /// Ends a transaction whose writes have been rolled back.
    fn abort(&mut self, tx: &Transaction) -> Result<()>;

    /// Marks a transaction whose writes could not be rolled back so that they
    /// are never visible.
    fn invalidate(&mut self, tx: &Transaction) -> Result<bool>;
}

/// Opens coordinator sessions.
pub trait CoordinatorConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn CoordinatorClient>>;
}

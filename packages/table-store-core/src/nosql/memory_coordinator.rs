//! In-process coordinators for local mode and tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::coordinator::{ChangeId, CoordinatorClient, CoordinatorConnector, Transaction};
use crate::error::{Result, StoreError};

/// How long a transaction may stay in progress before it is invalidated.
pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct CoordinatorState {
    next_pointer: u64,
    tx_timeout: Duration,
    /// Start time of every open transaction, by write pointer
    in_progress: BTreeMap<u64, Instant>,
    invalid: BTreeSet<u64>,
    /// Change sets announced through `can_commit`, by write pointer
    committing: HashMap<u64, HashSet<ChangeId>>,
    /// Change sets of committed transactions, by commit pointer
    committed: BTreeMap<u64, HashSet<ChangeId>>,
}

impl CoordinatorState {
    fn new(tx_timeout: Duration) -> Self {
        Self {
            next_pointer: 1,
            tx_timeout,
            in_progress: BTreeMap::new(),
            invalid: BTreeSet::new(),
            committing: HashMap::new(),
            committed: BTreeMap::new(),
        }
    }

    /// Whether a transaction that committed after `tx` started touched any of `changes`.
    fn has_conflict(&self, tx: &Transaction, changes: &HashSet<ChangeId>) -> bool {
        if changes.is_empty() {
            return false;
        }
        self.committed
            .range(tx.write_pointer() + 1..)
            .any(|(_, committed)| !committed.is_disjoint(changes))
    }

    /// Forgets change sets no in-progress transaction can conflict with.
    fn prune_committed(&mut self) {
        match self.in_progress.keys().next().copied() {
            Some(oldest) => self.committed = self.committed.split_off(&oldest),
            None => self.committed.clear(),
        }
    }

    fn finish(&mut self, write_pointer: u64) {
        self.in_progress.remove(&write_pointer);
        self.committing.remove(&write_pointer);
        self.prune_committed();
    }

    /// Invalidates transactions whose client never finished them.
    fn expire(&mut self, now: Instant) {
        let timeout = self.tx_timeout;
        let expired: Vec<u64> = self
            .in_progress
            .iter()
            .filter(|(_, started)| now.duration_since(**started) >= timeout)
            .map(|(write_pointer, _)| *write_pointer)
            .collect();
        for write_pointer in expired {
            tracing::warn!("Transaction {} timed out; invalidating", write_pointer);
            self.finish(write_pointer);
            self.invalid.insert(write_pointer);
        }
    }
}

/// Snapshot-isolation coordinator with write-write conflict detection.
///
/// Clones share state, so connectors handed to several providers see one
/// coordinator.
#[derive(Debug, Clone)]
pub struct InMemoryCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
    available: Arc<AtomicBool>,
    connections: Arc<AtomicU64>,
}

impl InMemoryCoordinator {
    pub fn new() -> Self {
        Self::with_tx_timeout(DEFAULT_TX_TIMEOUT)
    }

    /// Creates a coordinator that invalidates transactions left in progress
    /// longer than `tx_timeout`. Expiry is checked whenever a transaction begins.
    pub fn with_tx_timeout(tx_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(CoordinatorState::new(tx_timeout))),
            available: Arc::new(AtomicBool::new(true)),
            connections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Simulates the coordinator going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of sessions opened so far.
    pub fn connections_opened(&self) -> u64 {
        self.connections.load(Ordering::SeqCst)
    }

    /// Number of transactions neither committed, aborted, nor invalidated.
    pub fn in_progress_count(&self) -> usize {
        self.state.lock().in_progress.len()
    }

    /// Number of invalidated transactions.
    pub fn invalid_count(&self) -> usize {
        self.state.lock().invalid.len()
    }
}

impl Default for InMemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinatorConnector for InMemoryCoordinator {
    fn connect(&self) -> Result<Box<dyn CoordinatorClient>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Coordinator(
                "coordinator unavailable: connection refused".to_string(),
            ));
        }
        let session = self.connections.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Opened coordinator session {}", session);
        Ok(Box::new(InMemoryCoordinatorClient {
            state: self.state.clone(),
            available: self.available.clone(),
            session,
        }))
    }
}

/// Session with an [`InMemoryCoordinator`].
#[derive(Debug)]
pub struct InMemoryCoordinatorClient {
    state: Arc<Mutex<CoordinatorState>>,
    available: Arc<AtomicBool>,
    session: u64,
}

impl InMemoryCoordinatorClient {
    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Coordinator(format!(
                "coordinator unavailable (session {})",
                self.session
            )))
        }
    }
}

impl CoordinatorClient for InMemoryCoordinatorClient {
    fn begin(&mut self) -> Result<Transaction> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        let now = Instant::now();
        state.expire(now);
        let write_pointer = state.next_pointer;
        state.next_pointer += 1;
        let excluded: BTreeSet<u64> = state
            .in_progress
            .keys()
            .chain(state.invalid.iter())
            .copied()
            .collect();
        state.in_progress.insert(write_pointer, now);
        Ok(Transaction::new(write_pointer, write_pointer - 1, excluded))
    }

    fn can_commit(&mut self, tx: &Transaction, changes: &HashSet<ChangeId>) -> Result<bool> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        if !state.in_progress.contains_key(&tx.write_pointer()) {
            return Err(StoreError::Coordinator(format!(
                "transaction {} is not in progress",
                tx.write_pointer()
            )));
        }
        if state.has_conflict(tx, changes) {
            return Ok(false);
        }
        state.committing.insert(tx.write_pointer(), changes.clone());
        Ok(true)
    }

    fn commit(&mut self, tx: &Transaction) -> Result<bool> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        let write_pointer = tx.write_pointer();
        if !state.in_progress.contains_key(&write_pointer) {
            return Err(StoreError::Coordinator(format!(
                "transaction {} is not in progress",
                write_pointer
            )));
        }
        let changes = state.committing.get(&write_pointer).cloned().unwrap_or_default();
        // Re-check against commits that landed after can_commit
        if state.has_conflict(tx, &changes) {
            return Ok(false);
        }
        let commit_pointer = state.next_pointer;
        state.next_pointer += 1;
        if !changes.is_empty() {
            state.committed.insert(commit_pointer, changes);
        }
        state.finish(write_pointer);
        Ok(true)
    }

    fn abort(&mut self, tx: &Transaction) -> Result<()> {
        self.ensure_available()?;
        self.state.lock().finish(tx.write_pointer());
        Ok(())
    }

    fn invalidate(&mut self, tx: &Transaction) -> Result<bool> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        let write_pointer = tx.write_pointer();
        let was_in_progress = state.in_progress.contains_key(&write_pointer);
        state.finish(write_pointer);
        state.invalid.insert(write_pointer);
        Ok(was_in_progress)
    }
}

/// Coordinator that hands out ever-increasing write pointers and accepts
/// every commit. Snapshots see every persisted version.
#[derive(Debug, Clone, Default)]
pub struct NoopCoordinator {
    next_pointer: Arc<AtomicU64>,
}

impl NoopCoordinator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CoordinatorConnector for NoopCoordinator {
    fn connect(&self) -> Result<Box<dyn CoordinatorClient>> {
        Ok(Box::new(NoopCoordinatorClient {
            next_pointer: self.next_pointer.clone(),
        }))
    }
}

#[derive(Debug)]
struct NoopCoordinatorClient {
    next_pointer: Arc<AtomicU64>,
}

impl CoordinatorClient for NoopCoordinatorClient {
    fn begin(&mut self) -> Result<Transaction> {
        let write_pointer = self.next_pointer.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Transaction::new(write_pointer, u64::MAX, BTreeSet::new()))
    }

    fn can_commit(&mut self, _tx: &Transaction, _changes: &HashSet<ChangeId>) -> Result<bool> {
        Ok(true)
    }

    fn commit(&mut self, _tx: &Transaction) -> Result<bool> {
        Ok(true)
    }

    fn abort(&mut self, _tx: &Transaction) -> Result<()> {
        Ok(())
    }

    fn invalidate(&mut self, _tx: &Transaction) -> Result<bool> {
        Ok(true)
    }
}

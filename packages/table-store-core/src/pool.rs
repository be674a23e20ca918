//! Bounded resource pool with timed checkout.
//!
//! Items are created lazily up to a fixed maximum. A checkout that finds
//! neither an idle item nor spare capacity waits on a condition variable
//! until an item is returned or the timeout elapses.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, StoreError};

/// Pool counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Items created
    pub created: u64,
    /// Items dropped instead of being returned for reuse
    pub discarded: u64,
    /// Checkouts that gave up waiting
    pub timeouts: u64,
    /// Items currently checked out
    pub outstanding: usize,
    /// Highest number of items checked out at once
    pub peak_outstanding: usize,
    /// Items currently idle
    pub idle: usize,
}

struct PoolState<T> {
    idle: Vec<T>,
    /// Checked-out items plus slots reserved for items being created
    outstanding: usize,
    stats: PoolStats,
}

/// Bounded pool of reusable items.
pub struct BoundedPool<T> {
    resource: &'static str,
    max_size: usize,
    timeout: Duration,
    state: Mutex<PoolState<T>>,
    returned: Condvar,
}

impl<T> BoundedPool<T> {
    /// Creates an empty pool.
    ///
    /// # Arguments
    /// * `resource` - Name used in timeout errors and logs
    /// * `max_size` - Maximum number of live items (idle + checked out)
    /// * `timeout` - How long a checkout waits for capacity
    pub fn new(resource: &'static str, max_size: usize, timeout: Duration) -> Self {
        Self {
            resource,
            max_size,
            timeout,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                outstanding: 0,
                stats: PoolStats::default(),
            }),
            returned: Condvar::new(),
        }
    }

    /// Checks out an idle item, or creates one with `create` when below the
    /// maximum. Creation runs without holding the pool lock.
    ///
    /// # Returns
    /// `Result<T, StoreError>` with the item, `PoolTimeout` when no capacity
    /// became available in time, or the error returned by `create`.
    pub fn checkout<F>(&self, create: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.idle.pop() {
                Self::mark_checked_out(&mut state);
                return Ok(item);
            }

            if state.outstanding + state.idle.len() < self.max_size {
                Self::mark_checked_out(&mut state);
                drop(state);
                return match create() {
                    Ok(item) => {
                        self.state.lock().stats.created += 1;
                        Ok(item)
                    }
                    Err(e) => {
                        let mut state = self.state.lock();
                        state.outstanding -= 1;
                        drop(state);
                        self.returned.notify_one();
                        Err(e)
                    }
                };
            }

            if self.returned.wait_until(&mut state, deadline).timed_out() {
                // A return may have raced with the timeout
                if !state.idle.is_empty() || state.outstanding + state.idle.len() < self.max_size
                {
                    continue;
                }
                state.stats.timeouts += 1;
                tracing::warn!(
                    "Timed out waiting {} ms for {} ({} outstanding)",
                    self.timeout.as_millis(),
                    self.resource,
                    state.outstanding
                );
                return Err(StoreError::PoolTimeout {
                    resource: self.resource,
                    waited_ms: self.timeout.as_millis() as u64,
                });
            }
        }
    }

    /// Returns an item. Items that are not reusable are dropped and their
    /// capacity freed.
    pub fn checkin(&self, item: T, reusable: bool) {
        let mut state = self.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        if reusable {
            state.idle.push(item);
        } else {
            state.stats.discarded += 1;
            drop(item);
        }
        drop(state);
        self.returned.notify_one();
    }

    /// Returns a snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.outstanding = state.outstanding;
        stats.idle = state.idle.len();
        stats
    }

    /// Maximum number of live items.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Drops every idle item.
    pub fn clear_idle(&self) {
        let idle = std::mem::take(&mut self.state.lock().idle);
        drop(idle);
    }

    fn mark_checked_out(state: &mut PoolState<T>) {
        state.outstanding += 1;
        state.stats.peak_outstanding = state.stats.peak_outstanding.max(state.outstanding);
    }
}

impl<T> std::fmt::Debug for BoundedPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedPool")
            .field("resource", &self.resource)
            .field("max_size", &self.max_size)
            .field("timeout", &self.timeout)
            .field("stats", &self.stats())
            .finish()
    }
}

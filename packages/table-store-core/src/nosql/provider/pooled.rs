//! Bounded pool of coordinator clients shared by all threads.

use std::sync::Arc;
use std::time::Duration;

use super::{ClientLease, CoordinatorClientProvider};
use crate::error::Result;
use crate::nosql::coordinator::{CoordinatorClient, CoordinatorConnector};
use crate::pool::{BoundedPool, PoolStats};
use crate::selector::ClientProviderKind;

/// Pool of at most `max_size` coordinator clients. Borrowers wait up to the
/// obtain timeout for a free client and then fail with `PoolTimeout`.
pub struct PooledClientProvider {
    connector: Arc<dyn CoordinatorConnector>,
    pool: BoundedPool<Box<dyn CoordinatorClient>>,
}

impl PooledClientProvider {
    pub fn new(connector: Arc<dyn CoordinatorConnector>, max_size: usize, timeout: Duration) -> Self {
        Self {
            connector,
            pool: BoundedPool::new("coordinator client", max_size, timeout),
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn max_size(&self) -> usize {
        self.pool.max_size()
    }
}

impl CoordinatorClientProvider for PooledClientProvider {
    fn acquire(&self) -> Result<ClientLease<'_>> {
        let client = self.pool.checkout(|| self.connector.connect())?;
        Ok(ClientLease::new(self, client))
    }

    fn release(&self, client: Box<dyn CoordinatorClient>, reusable: bool) {
        if !reusable {
            tracing::warn!("Closing broken coordinator client instead of returning it to the pool");
        }
        self.pool.checkin(client, reusable);
    }

    fn strategy(&self) -> ClientProviderKind {
        ClientProviderKind::Pool
    }
}

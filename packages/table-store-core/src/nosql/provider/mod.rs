//! Coordinator client providers.
//!
//! A provider hands out leases on coordinator clients. The lease returns
//! the client when dropped; a lease marked with [`ClientLease::discard`]
//! closes the client instead so a broken session is never reused.

mod pooled;
mod thread_local;

pub use pooled::PooledClientProvider;
pub use thread_local::ThreadLocalClientProvider;

use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use super::coordinator::{CoordinatorClient, CoordinatorConnector};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::selector::ClientProviderKind;

/// Source of coordinator clients for transaction runners.
pub trait CoordinatorClientProvider: Send + Sync {
    /// Leases a client for the duration of one transaction.
    fn acquire(&self) -> Result<ClientLease<'_>>;

    /// Takes a client back from a lease. Called by the lease on drop.
    fn release(&self, client: Box<dyn CoordinatorClient>, reusable: bool);

    /// Strategy implemented by this provider.
    fn strategy(&self) -> ClientProviderKind;
}

/// Exclusive use of one coordinator client.
///
/// Leases are bound to the thread that acquired them.
pub struct ClientLease<'a> {
    provider: &'a dyn CoordinatorClientProvider,
    /// Taken only in `drop`
    client: ManuallyDrop<Box<dyn CoordinatorClient>>,
    reusable: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a> ClientLease<'a> {
    pub fn new(provider: &'a dyn CoordinatorClientProvider, client: Box<dyn CoordinatorClient>) -> Self {
        Self {
            provider,
            client: ManuallyDrop::new(client),
            reusable: true,
            _not_send: PhantomData,
        }
    }

    pub fn client(&mut self) -> &mut dyn CoordinatorClient {
        &mut **self.client
    }

    /// Marks the client as broken so it is closed instead of returned.
    pub fn discard(&mut self) {
        self.reusable = false;
    }

    pub fn is_discarded(&self) -> bool {
        !self.reusable
    }
}

impl Drop for ClientLease<'_> {
    fn drop(&mut self) {
        // SAFETY: `client` is not touched again after this take.
        let client = unsafe { ManuallyDrop::take(&mut self.client) };
        self.provider.release(client, self.reusable);
    }
}

impl std::fmt::Debug for ClientLease<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientLease")
            .field("strategy", &self.provider.strategy())
            .field("reusable", &self.reusable)
            .finish()
    }
}

/// Builds the provider selected by `kind`.
pub fn create_client_provider(
    kind: ClientProviderKind,
    connector: Arc<dyn CoordinatorConnector>,
    config: &StoreConfig,
) -> Arc<dyn CoordinatorClientProvider> {
    tracing::info!("Using coordinator client provider '{}'", kind);
    match kind {
        ClientProviderKind::Pool => Arc::new(PooledClientProvider::new(
            connector,
            config.tx_client_pool_size,
            config.tx_client_obtain_timeout(),
        )),
        ClientProviderKind::ThreadLocal => Arc::new(ThreadLocalClientProvider::new(connector)),
    }
}

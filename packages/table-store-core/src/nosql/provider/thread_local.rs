//! One coordinator client per thread.
//!
//! Clients live in the owning thread's thread-local storage, so a thread
//! that exits closes its client with it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use super::{ClientLease, CoordinatorClientProvider};
use crate::error::{Result, StoreError};
use crate::nosql::coordinator::{CoordinatorClient, CoordinatorConnector};
use crate::selector::ClientProviderKind;

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// This thread's clients, by provider id.
    static THREAD_CLIENTS: RefCell<HashMap<u64, ThreadSlot>> = RefCell::new(HashMap::new());
}

enum SlotState {
    Idle(Box<dyn CoordinatorClient>),
    /// The thread's client is out on a lease
    Leased,
}

struct ThreadSlot {
    state: SlotState,
    _live: LiveClient,
}

/// Counts a slot in its provider's live clients until dropped.
struct LiveClient(Arc<AtomicUsize>);

impl LiveClient {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(live.clone())
    }
}

impl Drop for LiveClient {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Gives each thread its own lazily opened client, reused by every
/// transaction on that thread. Never blocks on other threads.
pub struct ThreadLocalClientProvider {
    id: u64,
    connector: Arc<dyn CoordinatorConnector>,
    opened: AtomicU64,
    live: Arc<AtomicUsize>,
}

impl ThreadLocalClientProvider {
    pub fn new(connector: Arc<dyn CoordinatorConnector>) -> Self {
        Self {
            id: NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed),
            connector,
            opened: AtomicU64::new(0),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Clients opened over the provider's lifetime.
    pub fn clients_opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    /// Running threads currently holding a client.
    pub fn live_clients(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn remove_slot(&self) -> Option<ThreadSlot> {
        THREAD_CLIENTS
            .try_with(|clients| clients.borrow_mut().remove(&self.id))
            .ok()
            .flatten()
    }
}

impl CoordinatorClientProvider for ThreadLocalClientProvider {
    fn acquire(&self) -> Result<ClientLease<'_>> {
        let idle = THREAD_CLIENTS.with(|clients| {
            let mut clients = clients.borrow_mut();
            match clients.get_mut(&self.id) {
                Some(slot) => match std::mem::replace(&mut slot.state, SlotState::Leased) {
                    SlotState::Idle(client) => Ok(Some(client)),
                    SlotState::Leased => Err(StoreError::Coordinator(format!(
                        "coordinator client of thread {:?} is already leased; nested transactions are not supported",
                        thread::current().id()
                    ))),
                },
                None => {
                    clients.insert(
                        self.id,
                        ThreadSlot {
                            state: SlotState::Leased,
                            _live: LiveClient::new(&self.live),
                        },
                    );
                    Ok(None)
                }
            }
        })?;
        if let Some(client) = idle {
            return Ok(ClientLease::new(self, client));
        }

        match self.connector.connect() {
            Ok(client) => {
                self.opened.fetch_add(1, Ordering::SeqCst);
                tracing::debug!("Opened coordinator client for thread {:?}", thread::current().id());
                Ok(ClientLease::new(self, client))
            }
            Err(e) => {
                self.remove_slot();
                Err(e)
            }
        }
    }

    fn release(&self, client: Box<dyn CoordinatorClient>, reusable: bool) {
        if !reusable {
            tracing::warn!(
                "Closing broken coordinator client of thread {:?}",
                thread::current().id()
            );
            drop(client);
            self.remove_slot();
            return;
        }
        // During thread teardown the storage is gone and the client just closes
        let _ = THREAD_CLIENTS.try_with(|clients| {
            if let Some(slot) = clients.borrow_mut().get_mut(&self.id) {
                slot.state = SlotState::Idle(client);
            }
        });
    }

    fn strategy(&self) -> ClientProviderKind {
        ClientProviderKind::ThreadLocal
    }
}

impl Drop for ThreadLocalClientProvider {
    fn drop(&mut self) {
        // Other threads drop their slots for this provider when they exit
        self.remove_slot();
    }
}

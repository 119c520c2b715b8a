//! Controller connectivity listeners

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Error returned by a failing listener
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives the hub's "controller connected" status updates
#[async_trait]
pub trait ConnectivityListener: Send + Sync {
    async fn on_connectivity(&self, connected: bool) -> Result<(), ListenerError>;
}

/// Handle identifying a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Registered listeners in registration order
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ConnectivityListener>)>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, listener: Arc<dyn ConnectivityListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().unwrap().push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Await every listener in order, collecting failures instead of stopping
    pub async fn notify(&self, connected: bool) -> Vec<(ListenerId, ListenerError)> {
        let snapshot = self.listeners.read().unwrap().clone();

        let mut failures = Vec::new();
        for (id, listener) in snapshot {
            if let Err(e) = listener.on_connectivity(connected).await {
                failures.push((id, e));
            }
        }
        failures
    }
}

//! Sync progress events and the bus that fans them out to listeners.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Events emitted by the sync engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// One page of ledger records was consumed.
    PageFetched {
        #[serde(rename = "driveId")]
        drive_id: String,
        /// 1-based page number within this sync.
        page: usize,
        /// Records on this page.
        records: usize,
        /// Records consumed so far in this sync.
        processed: usize,
    },
    /// Sync finished and the new snapshot was saved.
    SyncCompleted {
        #[serde(rename = "driveId")]
        drive_id: String,
        added: usize,
        modified: usize,
        unreachable: usize,
        /// Highest block height covered by the new snapshot.
        #[serde(rename = "blockHeight")]
        block_height: u64,
    },
    /// Sync aborted; nothing was saved.
    SyncFailed {
        #[serde(rename = "driveId")]
        drive_id: String,
        reason: String,
        processed: usize,
    },
}

type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    listeners: Mutex<BTreeMap<u64, Listener>>,
    next_id: AtomicU64,
}

impl Registry {
    fn listeners(&self) -> MutexGuard<'_, BTreeMap<u64, Listener>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Keeps a listener registered. Dropping it (or calling `cancel`) removes
/// the listener.
#[must_use = "the listener is removed when the subscription is dropped"]
pub struct Subscription {
    registry: Weak<Registry>,
    id: u64,
}

impl Subscription {
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.listeners().remove(&self.id);
        }
    }
}

/// Cloneable handle to a set of `SyncEvent` listeners. Clones share listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&SyncEvent) + Send + Sync + 'static) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.listeners().insert(id, Arc::new(listener));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.listeners().len()
    }

    /// Deliver `event` to every listener in subscription order.
    pub fn emit(&self, event: SyncEvent) {
        // Lock released before calling out, so listeners may (un)subscribe
        let listeners: Vec<Listener> = self.registry.listeners().values().cloned().collect();
        for listener in listeners {
            listener(&event);
        }
    }
}

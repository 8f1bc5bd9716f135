//! Server-wide bookkeeping a single `Processor` can't reach on its own:
//! cancellation handles for KILL (spec §4.1 KILL, §4.4 Cancellation) and
//! state snapshots for SHOW PROCESSLIST (spec §4.1 SHOW, §5 "External
//! reads ... iterate under the lock and return copies of processor-state
//! snapshots").

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tokio::sync::Notify;

use crate::processor::ProcessorState;

/// Per-connection cancellation flags, shared between the owning
/// `Processor` and the `ConnRegistry` so a KILL from a different
/// connection can reach it without touching the owning worker thread
/// directly (spec §4.4 "Cancellation").
pub struct CancelHandle {
    query_canceled: AtomicBool,
    connection_stopped: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    fn new() -> Arc<Self> {
        Arc::new(CancelHandle {
            query_canceled: AtomicBool::new(false),
            connection_stopped: AtomicBool::new(false),
            notify: Notify::new(),
        })
    }

    pub fn is_canceled(&self) -> bool {
        self.query_canceled.load(Ordering::SeqCst) || self.connection_stopped.load(Ordering::SeqCst)
    }

    pub fn is_connection_stopped(&self) -> bool {
        self.connection_stopped.load(Ordering::SeqCst)
    }

    /// Resolves on the next `cancel_query`/`cancel_connection` call, for a
    /// suspension point (e.g. `SLEEP(n)`) that needs to wake immediately
    /// rather than poll.
    pub async fn notified(&self) {
        self.notify.notified().await
    }

    /// Consumes a pending query-level cancel, so the next statement on the
    /// same connection starts clean (spec §4.4: cancel is observed once by
    /// the resumed task, then the statement fails).
    pub fn take_query_cancel(&self) -> bool {
        self.query_canceled.swap(false, Ordering::SeqCst)
    }

    fn cancel_query(&self) {
        self.query_canceled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn cancel_connection(&self) {
        self.connection_stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorSnapshot {
    pub id: u64,
    pub user: String,
    pub host: String,
    pub database: String,
    pub state: ProcessorState,
    pub state_since: Instant,
    pub last_statement: String,
}

#[derive(Default)]
pub struct ConnRegistry {
    handles: RwLock<HashMap<u64, Arc<CancelHandle>>>,
    snapshots: RwLock<HashMap<u64, ProcessorSnapshot>>,
}

impl ConnRegistry {
    pub fn new() -> Self {
        ConnRegistry::default()
    }

    pub fn register(&self, id: u64) -> Arc<CancelHandle> {
        let handle = CancelHandle::new();
        self.handles.write().unwrap().insert(id, handle.clone());
        handle
    }

    pub fn unregister(&self, id: u64) {
        self.handles.write().unwrap().remove(&id);
        self.snapshots.write().unwrap().remove(&id);
    }

    /// Cancels the in-flight query only (spec §4.1 `KILL QUERY <id>`).
    /// Returns `false` if no connection with that id is registered.
    pub fn cancel_query(&self, id: u64) -> bool {
        match self.handles.read().unwrap().get(&id) {
            Some(h) => {
                h.cancel_query();
                true
            }
            None => false,
        }
    }

    /// Cancels the whole connection (spec §4.1 `KILL [CONNECTION] <id>`).
    pub fn cancel_connection(&self, id: u64) -> bool {
        match self.handles.read().unwrap().get(&id) {
            Some(h) => {
                h.cancel_connection();
                true
            }
            None => false,
        }
    }

    pub fn update_snapshot(&self, snapshot: ProcessorSnapshot) {
        self.snapshots.write().unwrap().insert(snapshot.id, snapshot);
    }

    pub fn snapshots(&self) -> Vec<ProcessorSnapshot> {
        self.snapshots.read().unwrap().values().cloned().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cancel_query_is_observed_once() {
        let registry = ConnRegistry::new();
        let handle = registry.register(1);
        assert!(!handle.is_canceled());
        assert!(registry.cancel_query(1));
        assert!(handle.take_query_cancel());
        assert!(!handle.take_query_cancel());
    }

    #[test]
    fn cancel_unknown_connection_returns_false() {
        let registry = ConnRegistry::new();
        assert!(!registry.cancel_query(999));
    }
}

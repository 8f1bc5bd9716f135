//! Per-connection transaction state and the process-wide write lock (spec
//! §3 "Transaction mode"/"Transaction", §4.3).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

pub use parser::statement::{IsolationLevel, TransactionMode, TxBehavior};

/// The single-writer exclusive lock serializing writers across every
/// connection the server holds (spec §3 "Write lock", §4.3, §5). Acquiring
/// is always non-blocking (`try_lock`); a caller that fails waits by
/// awaiting `wait_for_release` rather than blocking its worker thread,
/// matching spec §5 "Suspension points".
pub struct WriteLock {
    owner: Mutex<Option<u64>>,
    notify: Notify,
}

impl Default for WriteLock {
    fn default() -> Self {
        WriteLock { owner: Mutex::new(None), notify: Notify::new() }
    }
}

impl WriteLock {
    pub fn new() -> Self {
        WriteLock::default()
    }

    /// Non-blocking acquisition attempt. Returns `true` if `conn_id` now
    /// holds the lock (either freshly acquired or already held by it —
    /// the lock is non-reentrant in the sense that a second distinct
    /// holder can never succeed, but the same connection re-asking is a
    /// harmless no-op, matching "required to execute any writing
    /// statement" being checked fresh every statement).
    pub fn try_lock(&self, conn_id: u64) -> bool {
        let mut owner = self.owner.lock().unwrap();
        match *owner {
            None => {
                *owner = Some(conn_id);
                true
            }
            Some(holder) => holder == conn_id,
        }
    }

    /// Releases the lock. Only succeeds if `conn_id` is the current
    /// holder (spec §4.3: "`unlock(p)` succeeds only if `p` currently
    /// holds the lock"). Wakes every waiter so the worker's busy-resume
    /// pass can re-check readiness immediately.
    pub fn unlock(&self, conn_id: u64) -> bool {
        let mut owner = self.owner.lock().unwrap();
        if *owner == Some(conn_id) {
            *owner = None;
            drop(owner);
            self.notify.notify_waiters();
            true
        } else {
            false
        }
    }

    pub fn holder(&self) -> Option<u64> {
        *self.owner.lock().unwrap()
    }

    pub fn is_held_by(&self, conn_id: u64) -> bool {
        self.holder() == Some(conn_id)
    }

    pub fn is_available(&self) -> bool {
        self.holder().is_none()
    }

    /// Resolves the next time the lock is released (or a spurious wakeup
    /// that the caller must re-check `try_lock` against). Used by a
    /// parked processor instead of blocking its worker thread.
    pub async fn wait_for_release(&self) {
        self.notify.notified().await
    }
}

/// Monotonically increasing connection-id generator, shared by the server
/// across every worker (spec §3 "Processor" is keyed by an opaque id for
/// SHOW PROCESSLIST / KILL).
#[derive(Default)]
pub struct ConnIdSeq(AtomicU64);

impl ConnIdSeq {
    pub fn new() -> Self {
        ConnIdSeq(AtomicU64::new(1))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Per-connection transaction state (spec §3 "Transaction"). Created on
/// first write in auto-commit or on BEGIN/SAVEPOINT; ends on COMMIT/
/// END/ROLLBACK with no target, or on the outermost SAVEPOINT release.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub mode: TransactionMode,
    pub implicit: bool,
    pub opened_by: String,
    /// Ordered sequence; the last element is the innermost (top) savepoint.
    savepoints: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SavepointError {
    #[error("no such savepoint: {0}")]
    NotFound(String),
}

impl Transaction {
    pub fn new(mode: TransactionMode, implicit: bool, opened_by: impl Into<String>) -> Self {
        Transaction { mode, implicit, opened_by: opened_by.into(), savepoints: Vec::new() }
    }

    pub fn is_read_only(&self) -> bool {
        self.mode.read_only.unwrap_or(false)
    }

    pub fn savepoints(&self) -> &[String] {
        &self.savepoints
    }

    pub fn push_savepoint(&mut self, name: String) {
        self.savepoints.push(name);
    }

    /// `RELEASE [SAVEPOINT] n` — pops `n` and everything nested inside it.
    /// Returns `true` if the stack is now empty (auto-commit is restored,
    /// spec §4.3).
    pub fn release_to(&mut self, name: &str) -> Result<bool, SavepointError> {
        let pos = self.savepoints.iter().rposition(|n| n == name).ok_or_else(|| SavepointError::NotFound(name.to_string()))?;
        self.savepoints.truncate(pos);
        Ok(self.savepoints.is_empty())
    }

    /// `ROLLBACK TO [SAVEPOINT] n` — discards everything nested inside `n`
    /// but keeps `n` itself on the stack, so it can be rolled back to or
    /// released again afterward (spec §4.3 "inclusive rollback" describes
    /// the data rolled back, not the stack entry itself).
    pub fn rollback_to(&mut self, name: &str) -> Result<(), SavepointError> {
        let pos = self.savepoints.iter().rposition(|n| n == name).ok_or_else(|| SavepointError::NotFound(name.to_string()))?;
        self.savepoints.truncate(pos + 1);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn try_lock_is_exclusive_across_connections() {
        let lock = WriteLock::new();
        assert!(lock.try_lock(1));
        assert!(!lock.try_lock(2));
        assert!(lock.try_lock(1));
    }

    #[tokio::test]
    async fn unlock_only_succeeds_for_the_holder() {
        let lock = WriteLock::new();
        lock.try_lock(1);
        assert!(!lock.unlock(2));
        assert!(lock.unlock(1));
        assert!(lock.is_available());
    }

    #[tokio::test]
    async fn release_notifies_a_waiter() {
        let lock = std::sync::Arc::new(WriteLock::new());
        lock.try_lock(1);
        let waiter_lock = lock.clone();
        let waiter = tokio::spawn(async move {
            waiter_lock.wait_for_release().await;
            waiter_lock.try_lock(2)
        });
        tokio::task::yield_now().await;
        lock.unlock(1);
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn release_to_pops_inclusive_and_reports_emptied() {
        let mut tx = Transaction::new(TransactionMode::default(), true, "insert");
        tx.push_savepoint("a".to_string());
        tx.push_savepoint("b".to_string());
        let emptied = tx.release_to("a").unwrap();
        assert!(tx.savepoints().is_empty());
        assert!(emptied);
    }

    #[test]
    fn rollback_to_keeps_the_named_savepoint() {
        let mut tx = Transaction::new(TransactionMode::default(), true, "insert");
        tx.push_savepoint("a".to_string());
        tx.push_savepoint("b".to_string());
        tx.rollback_to("a").unwrap();
        assert_eq!(tx.savepoints(), &["a".to_string()]);
    }

    #[test]
    fn release_of_unknown_savepoint_errors() {
        let mut tx = Transaction::new(TransactionMode::default(), true, "insert");
        assert!(tx.release_to("nope").is_err());
    }
}

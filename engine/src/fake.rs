//! In-memory engine double used by the server crate's test suite. It is
//! deliberately dumb: it recognizes just enough SQL shape to exercise the
//! transaction coordinator and processor pipeline (BEGIN/COMMIT/ROLLBACK
//! toggle autocommit, INSERT bumps a row counter, SELECT returns a canned
//! row) and exposes injection hooks a test can use to force a busy error or
//! an implicit-commit failure on demand (spec §8 scenarios 4 and 5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use common::err::{SqliteServerError, SsResult};

use crate::{Engine, EngineConnection, ExecOutcome};

#[derive(Default)]
struct DbState {
    next_rowid: u64,
    row_count: u64,
}

/// Shared, `Clone`-able fake engine. All connections opened against the
/// same `db_name` see the same `DbState`, the way multiple real connections
/// would see the same on-disk database file.
#[derive(Clone, Default)]
pub struct FakeEngine {
    databases: Arc<Mutex<HashMap<String, Arc<Mutex<DbState>>>>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        FakeEngine::default()
    }

    fn state_for(&self, db_name: &str) -> Arc<Mutex<DbState>> {
        let mut dbs = self.databases.lock().unwrap();
        dbs.entry(db_name.to_string()).or_insert_with(|| Arc::new(Mutex::new(DbState::default()))).clone()
    }
}

impl Engine for FakeEngine {
    fn open(&self, db_name: &str) -> SsResult<Box<dyn EngineConnection>> {
        Ok(Box::new(self.open_concrete(db_name)))
    }

    fn drop_database(&self, db_name: &str) -> SsResult<()> {
        self.databases.lock().unwrap().remove(db_name);
        Ok(())
    }

    fn database_file_exists(&self, db_name: &str) -> bool {
        self.databases.lock().unwrap().contains_key(db_name)
    }
}

impl FakeEngine {
    /// Same as `open` but returns the concrete type, so tests can reach the
    /// injection hooks without downcasting a trait object.
    pub fn open_concrete(&self, db_name: &str) -> FakeEngineConnection {
        FakeEngineConnection {
            db_name: db_name.to_string(),
            state: self.state_for(db_name),
            autocommit: true,
            attached: HashMap::new(),
            interrupted: Arc::new(AtomicBool::new(false)),
            inject_busy: Arc::new(AtomicU32::new(0)),
            inject_commit_failure: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub struct FakeEngineConnection {
    pub db_name: String,
    state: Arc<Mutex<DbState>>,
    autocommit: bool,
    attached: HashMap<String, String>,
    interrupted: Arc<AtomicBool>,
    inject_busy: Arc<AtomicU32>,
    inject_commit_failure: Arc<AtomicBool>,
}

impl FakeEngineConnection {
    /// The next `count` calls to `execute` with a writing statement fail
    /// with `Busy`, simulating contention inside the engine itself (spec
    /// §4.4 step 6, distinct from the process-wide write lock).
    pub fn inject_busy(&self, count: u32) {
        self.inject_busy.store(count, Ordering::SeqCst);
    }

    /// The next COMMIT this connection executes fails (spec §8 scenario 5's
    /// failure branch, and §7 `ImplicitCommitError`).
    pub fn inject_commit_failure(&self) {
        self.inject_commit_failure.store(true, Ordering::SeqCst);
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

impl EngineConnection for FakeEngineConnection {
    fn execute(&mut self, sql: &str) -> SsResult<ExecOutcome> {
        let trimmed = sql.trim_start().to_ascii_lowercase();

        if trimmed.starts_with("begin") || trimmed.starts_with("start") {
            self.autocommit = false;
            return Ok(ExecOutcome::empty());
        }
        if trimmed.starts_with("commit") || trimmed.starts_with("end") {
            if self.inject_commit_failure.swap(false, Ordering::SeqCst) {
                return Err(SqliteServerError::ImplicitCommit("fake engine commit failure".to_string()));
            }
            self.autocommit = true;
            return Ok(ExecOutcome::empty());
        }
        if trimmed.starts_with("rollback") {
            self.autocommit = true;
            return Ok(ExecOutcome::empty());
        }
        if trimmed.starts_with("savepoint") || trimmed.starts_with("release") {
            return Ok(ExecOutcome::empty());
        }

        let remaining = self.inject_busy.load(Ordering::SeqCst);
        if remaining > 0 && is_write_shape(&trimmed) {
            self.inject_busy.store(remaining - 1, Ordering::SeqCst);
            return Err(SqliteServerError::Busy("fake engine is busy".to_string()));
        }

        if trimmed.starts_with("insert") {
            let mut state = self.state.lock().unwrap();
            state.next_rowid += 1;
            state.row_count += 1;
            return Ok(ExecOutcome::written(1, state.next_rowid));
        }
        if trimmed.starts_with("update") || trimmed.starts_with("delete") {
            let state = self.state.lock().unwrap();
            return Ok(ExecOutcome::written(state.row_count.min(1), 0));
        }
        if trimmed.starts_with("select") {
            let state = self.state.lock().unwrap();
            return Ok(ExecOutcome::rows(vec!["1"], vec![vec![Some(state.row_count.to_string())]]));
        }

        Ok(ExecOutcome::empty())
    }

    fn interrupt(&mut self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    fn attach(&mut self, path: &str, schema: &str) -> SsResult<()> {
        self.attached.insert(schema.to_string(), path.to_string());
        Ok(())
    }

    fn detach(&mut self, schema: &str) -> SsResult<()> {
        self.attached.remove(schema);
        Ok(())
    }

    fn is_autocommit(&self) -> bool {
        self.autocommit
    }
}

fn is_write_shape(lowercased_sql: &str) -> bool {
    lowercased_sql.starts_with("insert")
        || lowercased_sql.starts_with("update")
        || lowercased_sql.starts_with("delete")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn begin_clears_autocommit_and_commit_restores_it() {
        let engine = FakeEngine::new();
        let mut conn = engine.open("main").unwrap();
        assert!(conn.is_autocommit());
        conn.execute("begin immediate").unwrap();
        assert!(!conn.is_autocommit());
        conn.execute("commit").unwrap();
        assert!(conn.is_autocommit());
    }

    #[test]
    fn injected_busy_fails_only_writes_and_only_once() {
        let engine = FakeEngine::new();
        let mut conn = engine.open_concrete("main");
        conn.inject_busy(1);
        assert!(conn.execute("insert into t values (1)").is_err());
        assert!(conn.execute("insert into t values (1)").is_ok());
    }

    #[test]
    fn two_connections_to_the_same_db_share_row_state() {
        let engine = FakeEngine::new();
        let mut a = engine.open("main").unwrap();
        let mut b = engine.open("main").unwrap();
        a.execute("insert into t values (1)").unwrap();
        let outcome = b.execute("select * from t").unwrap();
        assert_eq!(outcome.rows[0][0], Some("1".to_string()));
    }
}

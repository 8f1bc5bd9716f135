//! The narrow boundary to the out-of-scope file-backed SQL engine (spec §1:
//! "used only through a minimal capability: open a connection, execute SQL,
//! stream results, interrupt an in-progress statement, report busy/constraint
//! errors"). Nothing in this crate implements a storage engine; it is the
//! seam the server crate codes against, with `fake` providing a test double.

pub mod fake;

use common::err::SsResult;

/// One column of a result set, as the engine reports it (text protocol
/// values only; binary/prepared-statement protocol is out of scope).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
}

/// The outcome of executing one statement against an engine connection.
/// `columns`/`rows` are empty for a non-query (DML/DDL); `affected_rows`
/// and `last_insert_id` are the row-count/rowid pair a write reports.
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ExecOutcome {
    pub fn empty() -> Self {
        ExecOutcome::default()
    }

    pub fn rows(columns: Vec<&str>, rows: Vec<Vec<Option<String>>>) -> Self {
        ExecOutcome {
            affected_rows: 0,
            last_insert_id: 0,
            columns: columns.into_iter().map(|c| ColumnMeta { name: c.to_string() }).collect(),
            rows,
        }
    }

    pub fn written(affected_rows: u64, last_insert_id: u64) -> Self {
        ExecOutcome { affected_rows, last_insert_id, columns: Vec::new(), rows: Vec::new() }
    }
}

/// One logical engine connection, bound to a single database file at
/// `open` time (spec §3 "Catalog", §4.4 processor pipeline step 6).
///
/// `execute` is synchronous and assumed to return promptly or fail with
/// `SqliteServerError::Busy` — the real engine's blocking/locking behavior
/// is exactly the out-of-scope collaborator named in spec §1; this trait
/// exists only so the processor pipeline has something concrete to drive
/// in tests.
pub trait EngineConnection: Send {
    /// Executes one statement's SQL text. A write-lock failure inside the
    /// engine itself (e.g. SQLite's own busy handler) surfaces as
    /// `SqliteServerError::Busy`, distinct from the process-wide write lock
    /// the transaction coordinator owns (spec §4.3/§4.4).
    fn execute(&mut self, sql: &str) -> SsResult<ExecOutcome>;

    /// Requests that an in-flight `execute` call return early with a
    /// canceled error (spec §4.4 "Cancellation"). A no-op if nothing is
    /// currently executing.
    fn interrupt(&mut self);

    /// Attaches another catalog's file under `schema` for the lifetime of
    /// the connection (spec §4.1 ATTACH).
    fn attach(&mut self, path: &str, schema: &str) -> SsResult<()>;

    /// Detaches a previously attached schema (spec §4.1 DETACH).
    fn detach(&mut self, schema: &str) -> SsResult<()>;

    /// Whether the connection is currently in auto-commit mode, observed
    /// after a COMMIT/ROLLBACK to confirm the transaction fully closed
    /// (spec §8 scenario 5).
    fn is_autocommit(&self) -> bool;
}

/// Opens per-database engine connections. One `Engine` is shared by the
/// whole server (spec §4.6 "Owns ... the Meta database handle" — the user
/// databases are opened the same way, just keyed by db name instead).
pub trait Engine: Send + Sync {
    fn open(&self, db_name: &str) -> SsResult<Box<dyn EngineConnection>>;

    /// Deletes a database's file and WAL/SHM/journal siblings (spec §6
    /// "On-disk state" — DROP DATABASE). Returns an `Io` error if any
    /// sibling exists but cannot be removed.
    fn drop_database(&self, db_name: &str) -> SsResult<()>;

    /// Whether a database file already exists on disk, independent of
    /// whether the meta database has a `catalog` row for it (spec §9 Open
    /// Question (a): a CREATE DATABASE IF NOT EXISTS that finds the file
    /// but no catalog row must not silently no-op).
    fn database_file_exists(&self, db_name: &str) -> bool;
}

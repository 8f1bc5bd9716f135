//! The per-connection state machine and statement pipeline (spec §3
//! "Processor", §4.4). A `Processor` owns one engine connection, the
//! transaction (if any) it has open, and drives every statement in an
//! incoming batch through permission/read-only/write-lock checks before
//! handing executable SQL to the engine.
//!
//! Network I/O (frame decode, handshake/login, result encoding) lives in
//! `worker.rs`; this module only knows about parsed `Statement`s and
//! produces `StatementOutcome`s, so it can be driven directly in tests
//! without a socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::config::ServerConfig;
use common::err::{SqliteServerError, SsResult};
use engine::{Engine, EngineConnection, ExecOutcome};
use parser::cursor::StatementParser;
use parser::statement::{
    CommandTag, GrantTarget, PragmaValue, Privilege, ShowKind, Statement, StatementDetail, TransactionMode, TxBehavior,
};

use crate::function_registry::StartTime;
use crate::meta_db::MetaDb;
use crate::registry::{CancelHandle, ConnRegistry};
use crate::txn::{Transaction, WriteLock};

/// The processor's lifecycle state (spec §3 "Processor"). `New`/`Auth`
/// describe a connection before its `Processor` value exists — the worker
/// tracks those two states itself while the handshake is in flight — every
/// other variant is one a live `Processor` can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    New,
    Auth,
    Sleep,
    SleepInTx,
    Read,
    Write,
    Busy,
    Stopped,
    Closed,
}

impl std::fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessorState::New => "New",
            ProcessorState::Auth => "Auth",
            ProcessorState::Sleep => "Sleep",
            ProcessorState::SleepInTx => "Sleep in transaction",
            ProcessorState::Read => "Read",
            ProcessorState::Write => "Write",
            ProcessorState::Busy => "Busy",
            ProcessorState::Stopped => "Stopped",
            ProcessorState::Closed => "Closed",
        };
        f.write_str(s)
    }
}

/// What a single statement produced, once the pipeline has run it to
/// completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    Rows { columns: Vec<String>, rows: Vec<Vec<Option<String>>> },
    Written { affected_rows: u64, last_insert_id: u64 },
    /// A recoverable, non-error condition the client still needs to see
    /// (spec §9 Open Question (a): `CREATE DATABASE IF NOT EXISTS` finding
    /// a database file with no catalog row must not silently no-op).
    Notice(String),
}

impl From<ExecOutcome> for StatementOutcome {
    fn from(o: ExecOutcome) -> Self {
        if o.columns.is_empty() && o.rows.is_empty() {
            StatementOutcome::Written { affected_rows: o.affected_rows, last_insert_id: o.last_insert_id }
        } else {
            StatementOutcome::Rows { columns: o.columns.into_iter().map(|c| c.name).collect(), rows: o.rows }
        }
    }
}

fn busy_timeout_duration(ms: i64) -> Option<Duration> {
    if ms < 0 {
        None
    } else {
        Some(Duration::from_millis(ms as u64))
    }
}

/// Whether a statement must hold the process-wide write lock to execute.
/// `is_write()` already covers INSERT/UPDATE/DELETE and every meta-affecting
/// DDL; a `PRAGMA name = value` is the one shape it misses, since a pragma
/// assignment mutates connection/engine state without being tagged a write
/// at the command level (spec §4.1 PRAGMA, §4.4 step 3).
fn is_writable(stmt: &Statement) -> bool {
    stmt.is_write() || matches!(&stmt.detail, StatementDetail::Pragma { value: Some(_), .. })
}

/// The privilege a statement requires, or `None` if it needs no grant check
/// at all (transaction control, PRAGMA query form, SHOW, user/admin
/// commands — the latter are gated on the superuser flag instead, see
/// `requires_superuser`).
fn required_privilege(stmt: &Statement) -> Option<Privilege> {
    match stmt.tag {
        CommandTag::Select => Some(Privilege::Select),
        CommandTag::Insert => Some(Privilege::Insert),
        CommandTag::Update => Some(Privilege::Update),
        CommandTag::Delete => Some(Privilege::Delete),
        CommandTag::Attach => Some(Privilege::Attach),
        CommandTag::CreateDatabase => Some(Privilege::Create),
        CommandTag::DropDatabase => Some(Privilege::Drop),
        CommandTag::Pragma => match &stmt.detail {
            StatementDetail::Pragma { name, value, .. } if value.is_some() && name.eq_ignore_ascii_case("vacuum") => {
                Some(Privilege::Vacuum)
            }
            StatementDetail::Pragma { value: Some(_), .. } => Some(Privilege::Pragma),
            _ => None,
        },
        _ => None,
    }
}

/// User/grant administration is gated on the connection's superuser flag
/// rather than the privilege set — the privilege enum (spec §3 "User" —
/// `{all, select, insert, update, delete, attach, vacuum, create, drop,
/// alter, pragma}`) has no member that naturally covers CREATE/ALTER/DROP
/// USER or GRANT/REVOKE, so this is an explicit interpretive decision
/// (recorded in the grounding ledger) rather than something the grammar
/// leaves implicit.
fn requires_superuser(tag: &CommandTag) -> bool {
    matches!(tag, CommandTag::CreateUser | CommandTag::AlterUser | CommandTag::DropUser | CommandTag::Grant | CommandTag::Revoke)
}

pub struct Processor {
    pub id: u64,
    pub host: String,
    pub user: String,
    pub protocol: String,
    pub database: String,
    pub superuser: bool,

    state: ProcessorState,
    state_since: Instant,

    current_tx: Option<Transaction>,
    /// The `TxBehavior`/isolation a fresh auto-commit write wraps itself in
    /// (spec §4.3: "BEGIN in auto-commit with DEFERRED behavior is rewritten
    /// to IMMEDIATE unless explicitly read-only" — the same rewrite applies
    /// to every implicit transaction this processor opens).
    implicit_mode: TransactionMode,

    engine_conn: Box<dyn EngineConnection>,
    engine: Arc<dyn Engine>,
    meta: Arc<MetaDb>,
    write_lock: Arc<WriteLock>,
    config: Arc<ServerConfig>,
    cancel: Arc<CancelHandle>,

    /// Set when an implicit ROLLBACK itself failed — the connection can no
    /// longer be trusted and must be torn down (spec §7 propagation rules,
    /// §4.3 "an implicit commit that itself fails is surfaced as a distinct
    /// error kind").
    fatal: AtomicBool,

    /// The server-wide connection directory, used only by `KILL` to reach a
    /// different connection's cancel handle. Not every caller has one to
    /// hand (the unit tests below don't), so `KILL` degrades to a protocol
    /// error rather than the constructor growing another required argument.
    registry: Option<Arc<ConnRegistry>>,

    /// Text of the statement currently (or most recently) executing,
    /// published into the registry's snapshot for `SHOW PROCESSLIST`'s
    /// `Info` column (spec §4.1 SHOW PROCESSLIST).
    last_statement: String,
}

impl Processor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        host: impl Into<String>,
        user: impl Into<String>,
        protocol: impl Into<String>,
        database: impl Into<String>,
        superuser: bool,
        engine_conn: Box<dyn EngineConnection>,
        engine: Arc<dyn Engine>,
        meta: Arc<MetaDb>,
        write_lock: Arc<WriteLock>,
        config: Arc<ServerConfig>,
        cancel: Arc<CancelHandle>,
    ) -> Self {
        Processor {
            id,
            host: host.into(),
            user: user.into(),
            protocol: protocol.into(),
            database: database.into(),
            superuser,
            state: ProcessorState::Sleep,
            state_since: Instant::now(),
            current_tx: None,
            implicit_mode: TransactionMode { behavior: TxBehavior::Immediate, ..TransactionMode::default() },
            engine_conn,
            engine,
            meta,
            write_lock,
            config,
            cancel,
            fatal: AtomicBool::new(false),
            registry: None,
            last_statement: String::new(),
        }
    }

    /// Gives this processor a handle on the server's connection directory,
    /// so it can service `KILL` against connections other than itself
    /// (spec §4.1 KILL). Called once by the worker right after construction.
    pub fn attach_registry(&mut self, registry: Arc<ConnRegistry>) {
        self.registry = Some(registry);
    }

    /// Backs `COM_INIT_DB` (spec §4.1 `USE`/init-db): swaps in a connection
    /// already opened against the new database. Refused by the caller while
    /// a transaction is open, so this never needs to worry about one.
    pub fn switch_database(&mut self, database: String, engine_conn: Box<dyn EngineConnection>) {
        self.database = database;
        self.engine_conn = engine_conn;
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    pub fn state_dwell(&self) -> Duration {
        self.state_since.elapsed()
    }

    pub fn is_in_transaction(&self) -> bool {
        self.current_tx.is_some()
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }

    fn transition(&mut self, state: ProcessorState) {
        self.state = state;
        self.state_since = Instant::now();
        self.publish_snapshot();
    }

    /// Publishes this processor's current state into the registry, if one
    /// is attached, for `SHOW PROCESSLIST` to read (spec §5 "External reads
    /// ... return copies of processor-state snapshots").
    fn publish_snapshot(&self) {
        if let Some(registry) = &self.registry {
            registry.update_snapshot(crate::registry::ProcessorSnapshot {
                id: self.id,
                user: self.user.clone(),
                host: self.host.clone(),
                database: self.database.clone(),
                state: self.state,
                state_since: self.state_since,
                last_statement: self.last_statement.clone(),
            });
        }
    }

    /// Runs every statement in `sql_text` against this connection in order
    /// (spec §4.1 "Statement splitting"). Stops early, without parsing the
    /// remainder, if a statement's error is fatal (§7).
    pub async fn execute_batch(&mut self, sql_text: &str) -> Vec<SsResult<StatementOutcome>> {
        let mut results = Vec::new();
        let mut parser = StatementParser::new(sql_text);
        loop {
            let stmt = match parser.next() {
                Ok(Some(s)) => s,
                Ok(None) => break,
                Err(e) => {
                    results.push(Err(e));
                    break;
                }
            };
            if stmt.is_empty() {
                continue;
            }
            self.cancel.take_query_cancel();
            let outcome = self.execute_one(&stmt).await;
            let fatal = outcome.as_ref().err().map(|e| e.is_fatal()).unwrap_or(false);
            results.push(outcome);
            if fatal || self.cancel.is_connection_stopped() {
                break;
            }
        }
        results
    }

    /// The full pipeline for one statement (spec §4.4 steps 1-8).
    async fn execute_one(&mut self, stmt: &Statement) -> SsResult<StatementOutcome> {
        self.last_statement = stmt.raw.clone();
        self.publish_snapshot();
        if stmt.is_transaction() {
            return self.execute_transaction_control(stmt).await;
        }

        self.check_permission(stmt)?;
        self.check_read_only(stmt)?;

        let writable = is_writable(stmt);
        if writable {
            self.acquire_write_lock().await?;
        }

        let opened_implicit = writable && self.current_tx.is_none();
        if opened_implicit {
            self.transition(ProcessorState::Write);
            self.run_engine("BEGIN IMMEDIATE").await?;
            self.current_tx = Some(Transaction::new(self.implicit_mode, true, stmt.raw.clone()));
        } else {
            self.transition(if writable { ProcessorState::Write } else { ProcessorState::Read });
        }

        let result = self.dispatch(stmt).await;

        if opened_implicit {
            let final_result = self.close_implicit_transaction(result).await;
            self.transition(ProcessorState::Sleep);
            return final_result;
        }

        self.transition(if self.current_tx.is_some() { ProcessorState::SleepInTx } else { ProcessorState::Sleep });
        result
    }

    /// Runs the actual statement (excluding BEGIN/COMMIT/.../SAVOEPOINT,
    /// handled by `execute_transaction_control`) once permission, read-only,
    /// and write-lock checks have passed.
    async fn dispatch(&mut self, stmt: &Statement) -> SsResult<StatementOutcome> {
        if requires_superuser(&stmt.tag) && !self.superuser {
            return Err(SqliteServerError::PermissionDenied(format!("{} requires superuser", stmt.tag)));
        }

        match &stmt.detail {
            StatementDetail::CreateUser { .. }
            | StatementDetail::AlterUser { .. }
            | StatementDetail::DropUser { .. }
            | StatementDetail::Grant { .. }
            | StatementDetail::Revoke { .. } => {
                self.meta.apply(stmt)?;
                Ok(StatementOutcome::Written { affected_rows: 1, last_insert_id: 0 })
            }
            StatementDetail::DatabaseDdl { create: true, if_exists_or_not, name, .. } => {
                self.create_database(stmt, *if_exists_or_not, name).await
            }
            StatementDetail::DatabaseDdl { create: false, if_exists_or_not, name, .. } => {
                self.drop_database(*if_exists_or_not, name).await
            }
            StatementDetail::Attach { path, schema } => {
                self.engine_conn.attach(path, schema)?;
                Ok(StatementOutcome::Written { affected_rows: 0, last_insert_id: 0 })
            }
            StatementDetail::Detach { schema } => {
                self.engine_conn.detach(schema)?;
                Ok(StatementOutcome::Written { affected_rows: 0, last_insert_id: 0 })
            }
            StatementDetail::Show { kind } => self.show(stmt, kind).await,
            StatementDetail::Kill { connection, id } => self.kill(*connection, *id),
            _ => {
                if let Some(seconds) = stmt.sleep_seconds() {
                    return self.run_sleep(seconds).await;
                }
                let outcome = self.run_engine(stmt.executable_sql()).await?;
                Ok(outcome.into())
            }
        }
    }

    /// Resolves the create-side of spec §9 Open Question (a): a database
    /// file that exists without a matching catalog row is a distinct
    /// recoverable state, never a silent success.
    async fn create_database(&mut self, stmt: &Statement, if_exists_or_not: bool, name: &str) -> SsResult<StatementOutcome> {
        let db = name.to_ascii_lowercase();
        if self.meta.find_catalog(&db).is_some() {
            return if if_exists_or_not {
                Ok(StatementOutcome::Notice(format!("database {db} already exists")))
            } else {
                Err(SqliteServerError::UniqueViolation(format!("database {db} already exists")))
            };
        }
        if self.engine.database_file_exists(&db) {
            return Ok(StatementOutcome::Notice(format!(
                "a database file for '{db}' already exists on disk without a catalog entry; no catalog row was created"
            )));
        }
        // Materializes the file the way a first real connection would
        // (spec §9 Open Question (a) only arises once a file can exist
        // without a catalog row, so creating one must create the other).
        self.engine.open(&db)?;
        self.meta.apply(stmt)?;
        Ok(StatementOutcome::Written { affected_rows: 1, last_insert_id: 0 })
    }

    async fn drop_database(&mut self, if_exists_or_not: bool, name: &str) -> SsResult<StatementOutcome> {
        let db = name.to_ascii_lowercase();
        if db == self.database {
            return Err(SqliteServerError::PermissionDenied(format!(
                "cannot drop {db}: it is the current connection's database"
            )));
        }
        if self.meta.find_catalog(&db).is_none() {
            return if if_exists_or_not {
                Ok(StatementOutcome::Notice(format!("database {db} does not exist")))
            } else {
                Err(SqliteServerError::PermissionDenied(format!("no such database: {db}")))
            };
        }
        self.engine.drop_database(&db)?;
        self.meta
            .apply(&Statement::new(
                CommandTag::DropDatabase,
                stmt_drop_database_sql(&db),
                StatementDetail::DatabaseDdl { create: false, if_exists_or_not, name: db.clone(), location: None },
            ))?;
        Ok(StatementOutcome::Written { affected_rows: 1, last_insert_id: 0 })
    }

    /// `KILL [CONNECTION|QUERY] <id>` (spec §4.1). Targeting a connection
    /// other than this one requires the superuser flag; a connection may
    /// always kill its own query or itself.
    fn kill(&self, connection: bool, id: i64) -> SsResult<StatementOutcome> {
        let target = id as u64;
        if target != self.id && !self.superuser {
            return Err(SqliteServerError::PermissionDenied("KILL requires superuser to target another connection".to_string()));
        }
        let Some(registry) = &self.registry else {
            return Err(SqliteServerError::Protocol("KILL is unavailable on this connection".to_string()));
        };
        let found = if connection { registry.cancel_connection(target) } else { registry.cancel_query(target) };
        if !found {
            return Err(SqliteServerError::Protocol(format!("no such connection: {id}")));
        }
        Ok(StatementOutcome::Written { affected_rows: 0, last_insert_id: 0 })
    }

    /// `SHOW *` (spec §4.1 "SHOW"). Variants backed by server/meta state this
    /// workspace actually owns (DATABASES, GRANTS, USERS, PROCESSLIST,
    /// STATUS) are answered directly; variants that need real table/column
    /// metadata (COLUMNS, CREATE TABLE/INDEX, INDEXES, TABLES) are out of
    /// this workspace's scope per spec §1 ("every SQL dialect feature" is a
    /// Non-goal) and are passed through to the engine as opaque SQL, the
    /// same as any unrecognized statement.
    async fn show(&mut self, stmt: &Statement, kind: &ShowKind) -> SsResult<StatementOutcome> {
        match kind {
            ShowKind::Databases { all } => Ok(self.show_databases(*all)),
            ShowKind::Grants { target } => self.show_grants(target.as_ref()),
            ShowKind::Users { pattern } => Ok(self.show_users(pattern.as_deref())),
            ShowKind::ProcessList { full } => Ok(self.show_processlist(*full)),
            ShowKind::Status => Ok(self.show_status()),
            ShowKind::Columns { .. }
            | ShowKind::CreateIndex { .. }
            | ShowKind::CreateTable { .. }
            | ShowKind::Indexes(_)
            | ShowKind::Tables { .. } => {
                let outcome = self.run_engine(&stmt.raw).await?;
                Ok(outcome.into())
            }
        }
    }

    /// `SHOW DATABASES` lists user catalogs plus the always-present `main`;
    /// `SHOW DATABASES ALL` additionally surfaces the internal `meta`
    /// registry (spec §4.1 SHOW "DATABASES [ALL]").
    fn show_databases(&self, all: bool) -> StatementOutcome {
        let mut names: Vec<String> = self.meta.snapshot().catalogs.into_iter().map(|c| c.db).collect();
        if !names.iter().any(|n| n == "main") {
            names.push("main".to_string());
        }
        if all {
            names.push(crate::meta_db::META_ALIAS.to_string());
        }
        names.sort();
        names.dedup();
        StatementOutcome::Rows { columns: vec!["Database".to_string()], rows: names.into_iter().map(|n| vec![Some(n)]).collect() }
    }

    /// Resolves a `SHOW GRANTS FOR ...` target to `(host, user)`. A bare
    /// quoted user or `CURRENT_USER` with no `@host` canonicalizes to `%`
    /// bit-for-bit (spec §9 Open Question (b)), and no `FOR` clause at all
    /// means the connection's own identity.
    fn show_grants(&self, target: Option<&GrantTarget>) -> SsResult<StatementOutcome> {
        let (host, user) = match target {
            None => (self.host.clone(), self.user.clone()),
            Some(GrantTarget::UserHost(user, host)) => (host.clone(), user.clone()),
            Some(GrantTarget::QuotedUser(user)) => ("%".to_string(), user.clone()),
            Some(GrantTarget::CurrentUser) => ("%".to_string(), self.user.clone()),
        };
        let snapshot = self.meta.snapshot();
        let rows: Vec<Vec<Option<String>>> = snapshot
            .grants
            .iter()
            .filter(|(h, u, ..)| h == &host && u == &user)
            .map(|(h, u, db, privilege)| Some(format!("GRANT {privilege} ON DATABASE {db} TO '{u}'@'{h}'")))
            .map(|v| vec![v])
            .collect();
        Ok(StatementOutcome::Rows { columns: vec![format!("Grants for {user}@{host}")], rows })
    }

    fn show_users(&self, pattern: Option<&str>) -> StatementOutcome {
        let snapshot = self.meta.snapshot();
        let rows: Vec<Vec<Option<String>>> = snapshot
            .users
            .iter()
            .filter(|u| pattern.map(|p| sql_like(p, &u.key.user) || sql_like(p, &u.key.host)).unwrap_or(true))
            .map(|u| {
                vec![
                    Some(u.key.host.clone()),
                    Some(u.key.user.clone()),
                    Some(u.key.protocol.clone()),
                    Some(u.auth_method.as_str().to_string()),
                    Some(if u.superuser { "1".to_string() } else { "0".to_string() }),
                ]
            })
            .collect();
        StatementOutcome::Rows {
            columns: vec!["host".to_string(), "user".to_string(), "protocol".to_string(), "auth_method".to_string(), "sa".to_string()],
            rows,
        }
    }

    fn show_processlist(&self, full: bool) -> StatementOutcome {
        let mut snapshots = self.registry.as_ref().map(|r| r.snapshots()).unwrap_or_default();
        snapshots.sort_by_key(|s| s.id);
        let rows: Vec<Vec<Option<String>>> = snapshots
            .into_iter()
            .map(|s| {
                let info = if full { s.last_statement } else { truncate_info(&s.last_statement) };
                vec![
                    Some(s.id.to_string()),
                    Some(s.user),
                    Some(s.host),
                    Some(s.database),
                    Some(s.state.to_string()),
                    Some(format!("{}", s.state_since.elapsed().as_secs())),
                    Some(info),
                ]
            })
            .collect();
        StatementOutcome::Rows {
            columns: vec![
                "Id".to_string(),
                "User".to_string(),
                "Host".to_string(),
                "db".to_string(),
                "Command".to_string(),
                "Time".to_string(),
                "Info".to_string(),
            ],
            rows,
        }
    }

    fn show_status(&self) -> StatementOutcome {
        let uptime = StartTime::now().uptime_seconds() as u64;
        StatementOutcome::Rows {
            columns: vec!["Variable_name".to_string(), "Value".to_string()],
            rows: vec![
                vec![Some("Uptime".to_string()), Some(uptime.to_string())],
                vec![Some("Threads_connected".to_string()), Some(self.registry.as_ref().map(|r| r.snapshots().len()).unwrap_or(1).to_string())],
            ],
        }
    }

    /// Runs SQL against the engine, re-parking behind the engine's own busy
    /// signal until it succeeds, the configured busy timeout elapses, or the
    /// statement is canceled (spec §4.4 step 6).
    async fn run_engine(&mut self, sql: &str) -> SsResult<ExecOutcome> {
        let deadline = busy_timeout_duration(self.config.busy_timeout_ms).map(|d| Instant::now() + d);
        loop {
            if self.cancel.is_canceled() {
                self.engine_conn.interrupt();
                return Err(SqliteServerError::Timeout("query canceled".to_string()));
            }
            match self.engine_conn.execute(sql) {
                Err(SqliteServerError::Busy(msg)) => {
                    self.transition(ProcessorState::Busy);
                    if let Some(d) = deadline {
                        if Instant::now() >= d {
                            return Err(SqliteServerError::Busy(msg));
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(self.config.worker.busy_min_wait_ms)).await;
                }
                other => return other,
            }
        }
    }

    /// A recognized trailing `SLEEP(n)` is handled by the processor itself
    /// rather than passed to the engine, so the wait is a cancellable async
    /// sleep instead of a blocking call inside engine code (spec §4.4 step
    /// 6, §5 "no thread ever blocks").
    async fn run_sleep(&mut self, seconds: f64) -> SsResult<StatementOutcome> {
        self.transition(ProcessorState::Busy);
        let duration = Duration::from_secs_f64(seconds.max(0.0));
        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                Ok(StatementOutcome::Rows { columns: vec!["sleep".to_string()], rows: vec![vec![Some("0".to_string())]] })
            }
            _ = self.cancel.notified() => {
                Err(SqliteServerError::Timeout("query canceled".to_string()))
            }
        }
    }

    /// Acquires the process-wide write lock, parking behind
    /// `WriteLock::wait_for_release` instead of blocking the worker thread
    /// (spec §4.4 step 4, §5 "Suspension points").
    async fn acquire_write_lock(&mut self) -> SsResult<()> {
        if self.write_lock.is_held_by(self.id) {
            return Ok(());
        }
        let deadline = busy_timeout_duration(self.config.busy_timeout_ms).map(|d| Instant::now() + d);
        loop {
            if self.write_lock.try_lock(self.id) {
                return Ok(());
            }
            if self.cancel.is_canceled() {
                return Err(SqliteServerError::Timeout("query canceled".to_string()));
            }
            self.transition(ProcessorState::Busy);
            match deadline {
                Some(d) => {
                    let remaining = d.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(SqliteServerError::Busy("write lock held by another connection".to_string()));
                    }
                    let _ = tokio::time::timeout(remaining, self.write_lock.wait_for_release()).await;
                }
                None => self.write_lock.wait_for_release().await,
            }
        }
    }

    /// Permission check (spec §4.4 step 1): skipped entirely for
    /// transaction-control statements (handled before this is reached), and
    /// for PRAGMA's query form and SHOW, neither of which names a privilege.
    fn check_permission(&self, stmt: &Statement) -> SsResult<()> {
        if self.superuser {
            return Ok(());
        }
        if let Some(privilege) = required_privilege(stmt) {
            if !self.meta.has_privilege(&self.host, &self.user, &self.database, privilege) {
                return Err(SqliteServerError::PermissionDenied(format!(
                    "{}@{} lacks {} on {}",
                    self.user,
                    self.host,
                    privilege.as_str(),
                    self.database
                )));
            }
        }
        Ok(())
    }

    /// Read-only check (spec §4.4 step 2): a writing statement inside a
    /// transaction opened `READ ONLY` is rejected before it ever reaches the
    /// write lock or the engine.
    fn check_read_only(&self, stmt: &Statement) -> SsResult<()> {
        if is_writable(stmt) {
            if let Some(tx) = &self.current_tx {
                if tx.is_read_only() {
                    return Err(SqliteServerError::ReadOnlyViolation);
                }
            }
        }
        Ok(())
    }

    /// BEGIN/COMMIT/END/ROLLBACK/SAVEPOINT/RELEASE (spec §4.3).
    async fn execute_transaction_control(&mut self, stmt: &Statement) -> SsResult<StatementOutcome> {
        match &stmt.detail {
            StatementDetail::Begin { mode } => self.begin(*mode).await,
            StatementDetail::Commit { .. } | StatementDetail::End { .. } => self.commit().await,
            StatementDetail::Rollback { savepoint: None } => self.rollback().await,
            StatementDetail::Rollback { savepoint: Some(name) } => self.rollback_to(name).await,
            StatementDetail::Savepoint { name } => self.savepoint(name.clone()).await,
            StatementDetail::Release { name } => self.release(name).await,
            other => Err(SqliteServerError::Protocol(format!("{other:?} is not a transaction-control statement"))),
        }
    }

    async fn begin(&mut self, mode: TransactionMode) -> SsResult<StatementOutcome> {
        if self.current_tx.is_some() {
            return Err(SqliteServerError::Protocol("already in a transaction".to_string()));
        }
        self.acquire_write_lock().await?;
        // Deferred is rewritten to IMMEDIATE unless the transaction is
        // explicitly read-only (spec §4.3): a deferred-and-writable
        // transaction would otherwise race every other connection for the
        // write lock at the moment of its first write instead of up front.
        let effective = if mode.behavior == TxBehavior::Deferred && mode.read_only != Some(true) {
            TransactionMode { behavior: TxBehavior::Immediate, ..mode }
        } else {
            mode
        };
        let sql = match effective.behavior {
            TxBehavior::Immediate => "BEGIN IMMEDIATE",
            TxBehavior::Exclusive => "BEGIN EXCLUSIVE",
            TxBehavior::Deferred => "BEGIN",
        };
        self.run_engine(sql).await?;
        self.current_tx = Some(Transaction::new(effective, false, sql));
        self.transition(ProcessorState::SleepInTx);
        Ok(StatementOutcome::Written { affected_rows: 0, last_insert_id: 0 })
    }

    async fn commit(&mut self) -> SsResult<StatementOutcome> {
        if self.current_tx.is_none() {
            return Err(SqliteServerError::Protocol("no transaction is active".to_string()));
        }
        self.run_engine("COMMIT").await?;
        self.finish_transaction();
        Ok(StatementOutcome::Written { affected_rows: 0, last_insert_id: 0 })
    }

    async fn rollback(&mut self) -> SsResult<StatementOutcome> {
        if self.current_tx.is_none() {
            return Err(SqliteServerError::Protocol("no transaction is active".to_string()));
        }
        self.run_engine("ROLLBACK").await?;
        self.finish_transaction();
        Ok(StatementOutcome::Written { affected_rows: 0, last_insert_id: 0 })
    }

    async fn savepoint(&mut self, name: String) -> SsResult<StatementOutcome> {
        if self.current_tx.is_none() {
            self.acquire_write_lock().await?;
            self.run_engine(&format!("SAVEPOINT {name}")).await?;
            self.current_tx = Some(Transaction::new(self.implicit_mode, false, format!("SAVEPOINT {name}")));
        } else {
            self.run_engine(&format!("SAVEPOINT {name}")).await?;
        }
        self.current_tx.as_mut().unwrap().push_savepoint(name);
        self.transition(ProcessorState::SleepInTx);
        Ok(StatementOutcome::Written { affected_rows: 0, last_insert_id: 0 })
    }

    async fn release(&mut self, name: &str) -> SsResult<StatementOutcome> {
        let Some(tx) = self.current_tx.as_mut() else {
            return Err(SqliteServerError::Protocol("no transaction is active".to_string()));
        };
        let emptied = tx
            .release_to(name)
            .map_err(|e| SqliteServerError::Protocol(e.to_string()))?;
        self.run_engine(&format!("RELEASE {name}")).await?;
        if emptied {
            self.finish_transaction();
        } else {
            self.transition(ProcessorState::SleepInTx);
        }
        Ok(StatementOutcome::Written { affected_rows: 0, last_insert_id: 0 })
    }

    async fn rollback_to(&mut self, name: &str) -> SsResult<StatementOutcome> {
        let Some(tx) = self.current_tx.as_mut() else {
            return Err(SqliteServerError::Protocol("no transaction is active".to_string()));
        };
        tx.rollback_to(name).map_err(|e| SqliteServerError::Protocol(e.to_string()))?;
        self.run_engine(&format!("ROLLBACK TO {name}")).await?;
        self.transition(ProcessorState::SleepInTx);
        Ok(StatementOutcome::Written { affected_rows: 0, last_insert_id: 0 })
    }

    fn finish_transaction(&mut self) {
        self.current_tx = None;
        self.write_lock.unlock(self.id);
    }

    /// Closes an implicit transaction opened for a single auto-commit write
    /// (spec §4.3: "implicit commit at success, implicit rollback at
    /// failure; an implicit commit that itself fails is surfaced as a
    /// distinct error kind; a failing implicit rollback is fatal").
    async fn close_implicit_transaction(&mut self, result: SsResult<StatementOutcome>) -> SsResult<StatementOutcome> {
        match result {
            Ok(outcome) => match self.run_engine("COMMIT").await {
                Ok(_) => {
                    self.finish_transaction();
                    Ok(outcome)
                }
                Err(e) => {
                    // Best-effort rollback to restore auto-commit even
                    // though the statement itself is reported failed.
                    let _ = self.engine_conn.execute("ROLLBACK");
                    self.finish_transaction();
                    Err(SqliteServerError::ImplicitCommit(e.to_string()))
                }
            },
            Err(original_err) => match self.run_engine("ROLLBACK").await {
                Ok(_) => {
                    self.finish_transaction();
                    Err(original_err)
                }
                Err(rollback_err) => {
                    self.fatal.store(true, Ordering::SeqCst);
                    self.finish_transaction();
                    Err(SqliteServerError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("implicit rollback failed after {original_err}: {rollback_err}"),
                    )))
                }
            },
        }
    }
}

fn stmt_drop_database_sql(db: &str) -> String {
    format!("drop database {db}")
}

/// Shortens a SHOW PROCESSLIST `Info` column the way the non-`FULL` form
/// does: full statement text is reserved for `SHOW FULL PROCESSLIST`.
fn truncate_info(sql: &str) -> String {
    const MAX: usize = 100;
    if sql.chars().count() <= MAX {
        sql.to_string()
    } else {
        sql.chars().take(MAX).collect()
    }
}

/// A small SQL `LIKE` matcher (`%` = any run of characters, `_` = exactly
/// one), used by `SHOW USERS WHERE 'pattern'` and friends. Case-insensitive,
/// matching the rest of this system's identifier handling.
fn sql_like(pattern: &str, value: &str) -> bool {
    fn matches(pattern: &[char], value: &[char]) -> bool {
        match pattern.first() {
            None => value.is_empty(),
            Some('%') => {
                (0..=value.len()).any(|i| matches(&pattern[1..], &value[i..]))
            }
            Some('_') => !value.is_empty() && matches(&pattern[1..], &value[1..]),
            Some(c) => value.first().is_some_and(|v| v == c) && matches(&pattern[1..], &value[1..]),
        }
    }
    let pattern: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    let value: Vec<char> = value.to_ascii_lowercase().chars().collect();
    matches(&pattern, &value)
}

#[cfg(test)]
mod test {
    use super::*;
    use engine::fake::FakeEngine;
    use parser::statement::IsolationLevel;

    fn processor(id: u64, superuser: bool) -> Processor {
        processor_with_engine(id, superuser, FakeEngine::new())
    }

    fn processor_with_engine(id: u64, superuser: bool, engine: FakeEngine) -> Processor {
        let conn = Box::new(engine.open_concrete("main"));
        let meta = Arc::new(MetaDb::new());
        let write_lock = Arc::new(WriteLock::new());
        let config = Arc::new(ServerConfig::default());
        let cancel = crate::registry::ConnRegistry::new().register(id);
        Processor::new(id, "%", "root", "pg", "main", superuser, conn, Arc::new(engine), meta, write_lock, config, cancel)
    }

    #[tokio::test]
    async fn select_in_autocommit_does_not_open_a_transaction() {
        let mut p = processor(1, true);
        let results = p.execute_batch("select 1").await;
        assert!(results[0].is_ok());
        assert!(!p.is_in_transaction());
    }

    #[tokio::test]
    async fn insert_in_autocommit_implicitly_commits_and_releases_the_lock() {
        let mut p = processor(1, true);
        let results = p.execute_batch("insert into t values (1)").await;
        assert!(results[0].is_ok());
        assert!(!p.is_in_transaction());
        assert!(p.write_lock.is_available());
    }

    #[tokio::test]
    async fn explicit_transaction_holds_the_lock_across_statements() {
        let mut p = processor(1, true);
        let results = p.execute_batch("begin; insert into t values (1); commit;").await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(!p.is_in_transaction());
    }

    #[tokio::test]
    async fn write_inside_read_only_transaction_is_rejected() {
        let mut p = processor(1, true);
        let begin = Statement::new(
            CommandTag::Begin,
            "begin read only",
            StatementDetail::Begin {
                mode: TransactionMode { read_only: Some(true), isolation: IsolationLevel::Serializable, behavior: TxBehavior::Deferred },
            },
        );
        p.execute_transaction_control(&begin).await.unwrap();
        let results = p.execute_batch("insert into t values (1)").await;
        assert!(matches!(results[0], Err(SqliteServerError::ReadOnlyViolation)));
    }

    #[tokio::test]
    async fn non_superuser_without_grant_is_denied() {
        let mut p = processor(1, false);
        let results = p.execute_batch("insert into t values (1)").await;
        assert!(matches!(results[0], Err(SqliteServerError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn grant_permits_the_matching_privilege() {
        let mut p = processor(1, false);
        p.meta
            .apply(&Statement::new(
                CommandTag::Grant,
                "grant insert on database main to root@%",
                StatementDetail::Grant {
                    privileges: vec![Privilege::Insert],
                    dbs: vec!["main".to_string()],
                    users: vec![("%".to_string(), "root".to_string())],
                },
            ))
            .unwrap();
        let results = p.execute_batch("insert into t values (1)").await;
        assert!(results[0].is_ok());
    }

    #[tokio::test]
    async fn engine_busy_is_retried_until_it_clears() {
        let engine = FakeEngine::new();
        let probe = engine.open_concrete("main");
        probe.inject_busy(1);
        let mut p = Processor::new(
            1,
            "%",
            "root",
            "pg",
            "main",
            true,
            Box::new(probe),
            Arc::new(engine),
            Arc::new(MetaDb::new()),
            Arc::new(WriteLock::new()),
            Arc::new(ServerConfig::default()),
            crate::registry::ConnRegistry::new().register(1),
        );
        let results = p.execute_batch("insert into t values (1)").await;
        assert!(results[0].is_ok());
    }

    #[tokio::test]
    async fn failing_implicit_commit_is_reported_as_implicit_commit_error() {
        let engine = FakeEngine::new();
        let conn = engine.open_concrete("main");
        conn.inject_commit_failure();
        let mut p = Processor::new(
            1,
            "%",
            "root",
            "pg",
            "main",
            true,
            Box::new(conn),
            Arc::new(engine),
            Arc::new(MetaDb::new()),
            Arc::new(WriteLock::new()),
            Arc::new(ServerConfig::default()),
            crate::registry::ConnRegistry::new().register(1),
        );
        let results = p.execute_batch("insert into t values (1)").await;
        assert!(matches!(results[0], Err(SqliteServerError::ImplicitCommit(_))));
        assert!(!p.is_in_transaction());
        assert!(p.write_lock.is_available());
    }

    #[tokio::test]
    async fn create_database_on_an_existing_file_without_catalog_row_is_a_notice() {
        let engine = FakeEngine::new();
        // Materializes "orphan"'s file without a matching catalog row, the
        // exact state spec §9 Open Question (a) describes.
        let _ = engine.open("orphan").unwrap();
        let mut p = processor_with_engine(1, true, engine);
        let results = p.execute_batch("create database if not exists orphan").await;
        assert!(matches!(results[0], Ok(StatementOutcome::Notice(_))));
    }

    #[tokio::test]
    async fn kill_without_a_registry_is_a_protocol_error() {
        let mut p = processor(1, true);
        let results = p.execute_batch("kill query 1").await;
        assert!(matches!(results[0], Err(SqliteServerError::Protocol(_))));
    }

    #[tokio::test]
    async fn non_superuser_cannot_kill_another_connection() {
        let mut p = processor(1, false);
        let registry = Arc::new(crate::registry::ConnRegistry::new());
        registry.register(2);
        p.attach_registry(registry);
        let results = p.execute_batch("kill 2").await;
        assert!(matches!(results[0], Err(SqliteServerError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn superuser_can_kill_another_connections_query() {
        let mut p = processor(1, true);
        let registry = Arc::new(crate::registry::ConnRegistry::new());
        let other = registry.register(2);
        p.attach_registry(registry);
        let results = p.execute_batch("kill query 2").await;
        assert!(results[0].is_ok());
        assert!(other.take_query_cancel());
    }

    #[tokio::test]
    async fn dropping_the_current_database_is_rejected() {
        let mut p = processor(1, true);
        p.meta
            .apply(&Statement::new(
                CommandTag::CreateDatabase,
                "create database main",
                StatementDetail::DatabaseDdl { create: true, if_exists_or_not: false, name: "main".to_string(), location: None },
            ))
            .unwrap();
        let results = p.execute_batch("drop database main").await;
        assert!(matches!(results[0], Err(SqliteServerError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn show_databases_lists_catalogs_and_main() {
        let mut p = processor(1, true);
        p.execute_batch("create database shop").await;
        let results = p.execute_batch("show databases").await;
        match &results[0] {
            Ok(StatementOutcome::Rows { rows, .. }) => {
                let names: Vec<_> = rows.iter().map(|r| r[0].clone().unwrap()).collect();
                assert!(names.contains(&"shop".to_string()));
                assert!(names.contains(&"main".to_string()));
                assert!(!names.contains(&"meta".to_string()));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn show_databases_all_includes_meta() {
        let mut p = processor(1, true);
        let results = p.execute_batch("show databases all").await;
        match &results[0] {
            Ok(StatementOutcome::Rows { rows, .. }) => {
                let names: Vec<_> = rows.iter().map(|r| r[0].clone().unwrap()).collect();
                assert!(names.contains(&"meta".to_string()));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn show_grants_for_current_user_reports_only_that_users_grants() {
        let mut p = processor(1, false);
        p.meta
            .apply(&Statement::new(
                CommandTag::Grant,
                "grant select on database main to root@%",
                StatementDetail::Grant {
                    privileges: vec![Privilege::Select],
                    dbs: vec!["main".to_string()],
                    users: vec![("%".to_string(), "root".to_string())],
                },
            ))
            .unwrap();
        let results = p.execute_batch("show grants").await;
        match &results[0] {
            Ok(StatementOutcome::Rows { rows, .. }) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0][0].as_deref(), Some("GRANT SELECT ON DATABASE main TO 'root'@'%'"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn show_grants_for_quoted_user_canonicalizes_host_to_percent() {
        let mut p = processor(1, true);
        p.meta
            .apply(&Statement::new(
                CommandTag::Grant,
                "grant select on database main to bob",
                StatementDetail::Grant {
                    privileges: vec![Privilege::Select],
                    dbs: vec!["main".to_string()],
                    users: vec![("%".to_string(), "bob".to_string())],
                },
            ))
            .unwrap();
        let results = p.execute_batch("show grants for 'bob'").await;
        match &results[0] {
            Ok(StatementOutcome::Rows { rows, .. }) => assert_eq!(rows.len(), 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn show_processlist_reports_registered_connections() {
        let mut p = processor(1, true);
        let registry = Arc::new(crate::registry::ConnRegistry::new());
        registry.register(1);
        p.attach_registry(registry);
        let results = p.execute_batch("show processlist").await;
        match &results[0] {
            Ok(StatementOutcome::Rows { rows, .. }) => assert_eq!(rows.len(), 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn show_users_filters_by_like_pattern() {
        let mut p = processor(1, true);
        p.meta
            .apply(&Statement::new(
                CommandTag::CreateUser,
                "create user 'alice'@'%'",
                StatementDetail::CreateUser {
                    user: "alice".to_string(),
                    host: "%".to_string(),
                    superuser: None,
                    identified_by: None,
                    identified_with: None,
                },
            ))
            .unwrap();
        let results = p.execute_batch("show users where 'al%'").await;
        match &results[0] {
            Ok(StatementOutcome::Rows { rows, .. }) => {
                assert!(rows.iter().any(|r| r[1].as_deref() == Some("alice")));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn sql_like_matches_percent_and_underscore() {
        assert!(sql_like("al%", "alice"));
        assert!(sql_like("a_ice", "alice"));
        assert!(!sql_like("bob%", "alice"));
        assert!(sql_like("%", "anything"));
    }
}

use std::fmt;

/// The command family a parsed statement belongs to. TRUNCATE has no
/// dedicated tag: it re-tags as `Delete` with schema/table populated, since
/// its observable effect is "delete every row" (§4.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandTag {
    Select,
    Insert,
    Update,
    Delete,
    Begin,
    Commit,
    End,
    Rollback,
    Savepoint,
    Release,
    SetTransaction,
    Pragma,
    Attach,
    Detach,
    CreateDatabase,
    DropDatabase,
    CreateUser,
    AlterUser,
    DropUser,
    Grant,
    Revoke,
    Show,
    Kill,
    Empty,
    /// Unrecognized statement, carrying its uppercased first word (§4.1:
    /// "Unrecognized commands yield a plain Statement with command =
    /// uppercased first word").
    Other(String),
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandTag::Select => "SELECT",
            CommandTag::Insert => "INSERT",
            CommandTag::Update => "UPDATE",
            CommandTag::Delete => "DELETE",
            CommandTag::Begin => "BEGIN",
            CommandTag::Commit => "COMMIT",
            CommandTag::End => "END",
            CommandTag::Rollback => "ROLLBACK",
            CommandTag::Savepoint => "SAVEPOINT",
            CommandTag::Release => "RELEASE",
            CommandTag::SetTransaction => "SET TRANSACTION",
            CommandTag::Pragma => "PRAGMA",
            CommandTag::Attach => "ATTACH",
            CommandTag::Detach => "DETACH",
            CommandTag::CreateDatabase => "CREATE DATABASE",
            CommandTag::DropDatabase => "DROP DATABASE",
            CommandTag::CreateUser => "CREATE USER",
            CommandTag::AlterUser => "ALTER USER",
            CommandTag::DropUser => "DROP USER",
            CommandTag::Grant => "GRANT",
            CommandTag::Revoke => "REVOKE",
            CommandTag::Show => "SHOW",
            CommandTag::Kill => "KILL",
            CommandTag::Empty => "",
            CommandTag::Other(word) => return write!(f, "{}", word.to_ascii_uppercase()),
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Default for IsolationLevel {
    fn default() -> Self {
        IsolationLevel::Serializable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxBehavior {
    Deferred,
    Immediate,
    Exclusive,
}

impl Default for TxBehavior {
    fn default() -> Self {
        TxBehavior::Deferred
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionMode {
    pub read_only: Option<bool>,
    pub isolation: IsolationLevel,
    pub behavior: TxBehavior,
}

/// A PRAGMA value, typed at parse time so callers don't re-parse the
/// literal (§4.1 PRAGMA grammar: integer, 0x-prefixed hex integer, decimal,
/// or bare/quoted string).
#[derive(Debug, Clone, PartialEq)]
pub enum PragmaValue {
    Integer(i64),
    HexInteger(u64),
    Decimal(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    All,
    Select,
    Insert,
    Update,
    Delete,
    Attach,
    Vacuum,
    Create,
    Drop,
    Alter,
    Pragma,
}

impl Privilege {
    pub fn parse(word: &str) -> Option<Self> {
        Some(match word.to_ascii_uppercase().as_str() {
            "ALL" => Privilege::All,
            "SELECT" => Privilege::Select,
            "INSERT" => Privilege::Insert,
            "UPDATE" => Privilege::Update,
            "DELETE" => Privilege::Delete,
            "ATTACH" => Privilege::Attach,
            "VACUUM" => Privilege::Vacuum,
            "CREATE" => Privilege::Create,
            "DROP" => Privilege::Drop,
            "ALTER" => Privilege::Alter,
            "PRAGMA" => Privilege::Pragma,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::All => "ALL",
            Privilege::Select => "SELECT",
            Privilege::Insert => "INSERT",
            Privilege::Update => "UPDATE",
            Privilege::Delete => "DELETE",
            Privilege::Attach => "ATTACH",
            Privilege::Vacuum => "VACUUM",
            Privilege::Create => "CREATE",
            Privilege::Drop => "DROP",
            Privilege::Alter => "ALTER",
            Privilege::Pragma => "PRAGMA",
        }
    }
}

/// One `user[@host] [IDENTIFIED WITH protocol]` entry in a `DROP USER`
/// target list — the protocol narrows the delete to a single auth row
/// when a user has more than one (§4.1 DROP USER grammar).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropUserTarget {
    pub user: String,
    pub host: String,
    pub protocol: Option<String>,
}

/// The target of a `SHOW GRANTS [FOR ...]` statement. `CurrentUser` means no
/// `FOR` clause was given (§9 Open Question: SHOW GRANTS host canonicizes to
/// `%` when the grantee was created without an explicit host).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantTarget {
    UserHost(String, String),
    QuotedUser(String),
    CurrentUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShowIndexesOpts {
    pub extended: bool,
    pub columns: bool,
    pub schema: Option<String>,
    pub target: Option<String>,
    pub from_schema: Option<String>,
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowKind {
    Columns { table: String, schema: Option<String> },
    CreateIndex { name: String },
    CreateTable { name: String },
    Databases { all: bool },
    Grants { target: Option<GrantTarget> },
    Indexes(ShowIndexesOpts),
    ProcessList { full: bool },
    Status,
    Tables { schema: Option<String>, like: Option<String> },
    Users { pattern: Option<String> },
}

/// Per-command payload. Variants carry only what their recognizer actually
/// extracts; everything else about the statement's SQL text is reached via
/// `Statement::raw`.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementDetail {
    Select { for_update: bool, executable_len: usize, sleep_seconds: Option<f64> },
    /// `returning` is the verbatim column-list text following a top-level
    /// `RETURNING` keyword, if present (§3, §4.1 INSERT … RETURNING).
    Insert { is_select: bool, returning: Option<String> },
    Update,
    Delete { schema: Option<String>, table: Option<String> },
    Begin { mode: TransactionMode },
    Commit { chain: bool },
    End { chain: bool },
    Rollback { savepoint: Option<String> },
    Savepoint { name: String },
    Release { name: String },
    SetTransaction { mode: TransactionMode, session: bool },
    Attach { path: String, schema: String },
    Detach { schema: String },
    DatabaseDdl { create: bool, if_exists_or_not: bool, name: String, location: Option<String> },
    CreateUser { user: String, host: String, superuser: Option<bool>, identified_by: Option<String>, identified_with: Option<(String, String)> },
    AlterUser { user: String, host: String, superuser: Option<bool>, identified_by: Option<String>, identified_with: Option<(String, String)> },
    DropUser { targets: Vec<DropUserTarget> },
    Grant { privileges: Vec<Privilege>, dbs: Vec<String>, users: Vec<(String, String)> },
    Revoke { privileges: Vec<Privilege>, dbs: Vec<String>, users: Vec<(String, String)> },
    Show { kind: ShowKind },
    Kill { connection: bool, id: i64 },
    Pragma { schema: Option<String>, name: String, value: Option<PragmaValue> },
    Empty,
    Other,
}

/// One statement recognized out of the input stream: the command tag, the
/// exact source slice it spans (used for opaque passthrough to the engine),
/// and the structured detail the recognizer produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub tag: CommandTag,
    pub raw: String,
    pub detail: StatementDetail,
    /// Set only on an empty statement whose span was comments-and-whitespace
    /// rather than bare whitespace (§3: `comment=true` implies `empty=true`).
    pub comment: bool,
}

impl Statement {
    pub fn new(tag: CommandTag, raw: impl Into<String>, detail: StatementDetail) -> Self {
        Statement { tag, raw: raw.into(), detail, comment: false }
    }

    /// Builds the `Empty` statement for a span that was entirely whitespace
    /// (and, if `comment` is set, comments too) (§3, §4.1 statement framing).
    pub fn empty(raw: impl Into<String>, comment: bool) -> Self {
        Statement { tag: CommandTag::Empty, raw: raw.into(), detail: StatementDetail::Empty, comment }
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self.tag,
            CommandTag::Insert
                | CommandTag::Update
                | CommandTag::Delete
                | CommandTag::CreateDatabase
                | CommandTag::DropDatabase
                | CommandTag::CreateUser
                | CommandTag::AlterUser
                | CommandTag::DropUser
                | CommandTag::Grant
                | CommandTag::Revoke
        )
    }

    /// `isQuery ⟺ command ∈ {SELECT, SHOW *, ATTACH, DETACH, PRAGMA
    /// (no-value)}` (§8 universal invariants).
    pub fn is_query(&self) -> bool {
        match self.tag {
            CommandTag::Select | CommandTag::Show | CommandTag::Attach | CommandTag::Detach => true,
            CommandTag::Pragma => matches!(
                &self.detail,
                StatementDetail::Pragma { value: None, .. }
            ),
            _ => false,
        }
    }

    /// `isTransaction ⟺ command ∈ {BEGIN, COMMIT, END, ROLLBACK, SAVEPOINT,
    /// RELEASE}` (§8).
    pub fn is_transaction(&self) -> bool {
        matches!(
            self.tag,
            CommandTag::Begin
                | CommandTag::Commit
                | CommandTag::End
                | CommandTag::Rollback
                | CommandTag::Savepoint
                | CommandTag::Release
        )
    }

    /// `isEmpty ⟺ empty statement` (§8).
    pub fn is_empty(&self) -> bool {
        self.tag == CommandTag::Empty
    }

    pub fn is_comment(&self) -> bool {
        self.comment
    }

    /// The SQL text to actually hand the engine: for a `SELECT ... FOR
    /// UPDATE`, this excludes the `FOR UPDATE` clause (§4.1: "the emitted
    /// SQL is the text up to (but excluding) FOR UPDATE"); for everything
    /// else it's the full `raw` span.
    pub fn executable_sql(&self) -> &str {
        match &self.detail {
            StatementDetail::Select { executable_len, .. } => &self.raw[..*executable_len],
            _ => &self.raw,
        }
    }

    /// The argument to a recognized trailing `SLEEP(n)` select-list item,
    /// in seconds, if this statement matched that shape (§4.1, §4.4 step 6).
    pub fn sleep_seconds(&self) -> Option<f64> {
        match &self.detail {
            StatementDetail::Select { sleep_seconds, .. } => *sleep_seconds,
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_statement_is_not_a_comment_by_default() {
        let stmt = Statement::empty("   ", false);
        assert!(stmt.is_empty());
        assert!(!stmt.is_comment());
    }

    #[test]
    fn comment_only_statement_is_both_empty_and_comment() {
        let stmt = Statement::empty("-- hi\n", true);
        assert!(stmt.is_empty());
        assert!(stmt.is_comment());
    }

    #[test]
    fn pragma_with_value_is_not_a_query() {
        let stmt = Statement::new(
            CommandTag::Pragma,
            "pragma x = 1",
            StatementDetail::Pragma { schema: None, name: "x".into(), value: Some(PragmaValue::Integer(1)) },
        );
        assert!(!stmt.is_query());
    }

    #[test]
    fn pragma_without_value_is_a_query() {
        let stmt = Statement::new(
            CommandTag::Pragma,
            "pragma x",
            StatementDetail::Pragma { schema: None, name: "x".into(), value: None },
        );
        assert!(stmt.is_query());
    }
}

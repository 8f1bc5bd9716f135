use std::io;

use thiserror::Error;

/// The error kinds the server can produce, one per §7 of the design.
///
/// Each variant maps to a canonical SQLSTATE so the processor can encode it
/// into the frontend protocol's error packet without a second lookup table.
#[derive(Debug, Error)]
pub enum SqliteServerError {
    #[error("parse error at byte {position}: {reason}")]
    Parse { position: usize, reason: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("cannot execute a write in a read-only transaction")]
    ReadOnlyViolation,

    #[error("database is busy: {0}")]
    Busy(String),

    #[error("unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("implicit commit failed: {0}")]
    ImplicitCommit(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// Startup-time configuration failure. Never sent over the wire — it
    /// aborts the CLI before a listener is bound (§12).
    #[error("configuration error: {0}")]
    Config(String),

    /// A caller acked/removed a statement the parser never produced (§4.1
    /// error semantics).
    #[error("illegal state: {0}")]
    IllegalState(String),
}

impl SqliteServerError {
    pub fn parse(position: usize, reason: impl Into<String>) -> Self {
        SqliteServerError::Parse { position, reason: reason.into() }
    }

    /// Canonical SQLSTATE advertised in the frontend protocol's error packet (§7).
    pub fn sql_state(&self) -> &'static str {
        match self {
            SqliteServerError::Parse { .. } => "42000",
            SqliteServerError::PermissionDenied(_) => "42501",
            SqliteServerError::ReadOnlyViolation => "25006",
            SqliteServerError::Busy(_) => "40001",
            SqliteServerError::UniqueViolation(_) => "23505",
            SqliteServerError::Io(_) => "58030",
            SqliteServerError::Protocol(_) => "08P01",
            SqliteServerError::ImplicitCommit(_) => "40002",
            SqliteServerError::Network(_) => "08006",
            SqliteServerError::Timeout(_) => "HYT00",
            SqliteServerError::Config(_) => "F0000",
            SqliteServerError::IllegalState(_) => "55000",
        }
    }

    /// Whether the connection must be torn down after this error, rather than
    /// the offending statement merely being skipped (§7 propagation rules).
    pub fn is_fatal(&self) -> bool {
        matches!(self, SqliteServerError::Io(_) | SqliteServerError::Network(_))
    }
}

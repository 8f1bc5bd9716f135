pub mod error;

pub use error::SqliteServerError;

/// Crate-wide result alias, the same shape as the teacher's `CResult<T>`.
pub type SsResult<T> = Result<T, SqliteServerError>;

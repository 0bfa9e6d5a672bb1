//! Persistence Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Engine errors from `sqlx` are kept as child frames
//! underneath the kind that describes what the caller should do about them.

use derive_more::{Display, Error};

/// A persistence error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The table description cannot produce valid SQL.
    #[display("invalid bundle for table {table}: {reason}")]
    InvalidBundle { table: String, reason: String },
    /// No table is registered under the requested name.
    #[display("no such table: {_0}")]
    UnknownTable(#[error(not(source))] String),
    /// Zero (or several) rows matched a key that had to match exactly one.
    #[display("No such object {table}: {key}")]
    NotFound { table: String, key: String },
    /// An insert-only operation found the key already present.
    #[display("Duplicate object {table}: {key}")]
    Duplicate { table: String, key: String },
    /// A single statement failed; the engine error is the child frame.
    #[display("statement failed: {sql} with parameters {parameters}")]
    Statement { sql: String, parameters: String },
    /// Beginning or committing a transaction failed.
    #[display("transaction failed")]
    Transaction,
    /// Opening or closing the connection pool failed.
    #[display("database error")]
    Database,
    /// A row could not be converted to or from a record.
    #[display("invalid data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// The schema script or an upgrade step failed.
    #[display("schema bootstrap failed")]
    Schema,
    /// The stored schema is newer than this build understands.
    #[display("database schema version {found} is newer than the latest known version {latest}")]
    SchemaVersion { found: i64, latest: i64 },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Only engine-level failures qualify, typically `SQLITE_BUSY` under a
    /// competing writer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Statement { .. } | Self::Transaction)
    }
}

/// Log every frame of an error tree at `error` level.
///
/// Used wherever an error cannot be handed back to a caller, so that no
/// failure path ends in silence.
pub fn report<E>(error: &exn::Exn<E>)
where
    E: std::error::Error + Send + Sync + 'static,
{
    tracing::error!("{error:?}");
}

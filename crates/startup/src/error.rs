//! Startup Error Types

use derive_more::{Display, Error};

/// A startup error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for startup operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("unable to open the database")]
    Database,
    #[display("unable to bring the schema up to date")]
    Schema,
    #[display("unable to build the persistence manager")]
    Persistence,
    #[display("unable to load caches from the database")]
    CacheLoad,
    /// A phase task ran before the phase that provides what it needs.
    #[display("{_0} is not initialised yet")]
    NotReady(#[error(not(source))] &'static str),
    /// A phase task ran twice against the same context.
    #[display("{_0} is already initialised")]
    AlreadyInitialised(#[error(not(source))] &'static str),
    #[display("startup task {task} panicked: {message}")]
    Panicked { task: String, message: String },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }
}

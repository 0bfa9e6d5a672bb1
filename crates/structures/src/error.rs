//! Keyed Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Both variants are configuration errors: the cache was built (or the value
/// was shaped) in a way that makes auto-keying impossible. Retrying the same
/// call will never succeed.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// `auto_put` was called on a cache constructed without key fields.
    #[display("auto-put not enabled on cache {_0}, it needs key fields at construction")]
    AutoPutDisabled(#[error(not(source))] String),
    /// The configured key field could not be read from the value.
    #[display("unable to get key {field} for cache {cache}")]
    MissingKey { cache: String, field: &'static str },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(
            ErrorKind::AutoPutDisabled("broadcast".to_string()).to_string(),
            "auto-put not enabled on cache broadcast, it needs key fields at construction"
        );
        assert_eq!(
            ErrorKind::MissingKey {
                cache: "broadcast".to_string(),
                field: "id"
            }
            .to_string(),
            "unable to get key id for cache broadcast"
        );
    }
}

//! Common error types for the Livy session pool.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while parsing core types from strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An identifier was not a non-negative decimal integer.
    #[error("invalid identifier: {0:?}")]
    InvalidId(String),

    /// A session kind outside the supported set.
    #[error("unsupported session kind: {0:?} (expected spark, pyspark, pyspark3 or sparkr)")]
    InvalidKind(String),
}

//! Crate-wide error type.
//!
//! Error kinds mirror the propagation policy of the write/query/maintenance
//! paths: `NotFound` and `InvalidArgument` are signaled explicitly to
//! callers, `Cancelled` is distinct so clients can retry, and everything
//! else collapses to an opaque "operation failed" at the boundary.

use thiserror::Error;

/// Errors produced by the HSG engine.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HsgError {
    /// No matching row for a required lookup.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input (negative boost, non-positive decay lambda, bad tags).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Simhash collision with divergent content. Logged, not fatal — the
    /// write path treats this as "proceed as new".
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persistence/embedder operation that is safe to retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// The caller's cancellation signal fired.
    #[error("cancelled")]
    Cancelled,

    /// Unrecoverable misconfiguration (e.g. encryption key absent).
    #[error("fatal: {0}")]
    Fatal(String),

    /// Wraps a persistence-layer failure that doesn't fit the kinds above.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Catch-all for everything that should surface as a sanitized, opaque
    /// failure rather than a specific kind.
    #[error("operation failed")]
    Internal(String),
}

impl HsgError {
    /// Whether a caller may reasonably retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HsgError::Transient(_))
    }

    /// The sanitized, user-visible message — never includes raw content,
    /// keys, or secrets. Callers see `NotFound`/`InvalidArgument`/`Cancelled`
    /// specifically; everything else collapses to a uniform failure.
    pub fn public_message(&self) -> String {
        match self {
            HsgError::NotFound(m) => format!("not found: {m}"),
            HsgError::InvalidArgument(m) => format!("invalid argument: {m}"),
            HsgError::Cancelled => "cancelled".to_string(),
            _ => "operation failed".to_string(),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, HsgError>;

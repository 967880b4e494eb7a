//! Error types for the query cache
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache operations.
///
/// Producer errors are shared behind an `Arc` because a single failed
/// dispatch settles every caller awaiting it; each waiter receives a clone
/// of the same wrapped error. The original error stays reachable through
/// [`CacheError::Producer`] via `downcast_ref` on the inner
/// [`anyhow::Error`].
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// An empty composite key was passed to a query call
    #[error("Invalid query key: key must contain at least one segment")]
    InvalidKey,

    /// The producer function failed; the error is propagated verbatim
    #[error("Query producer failed: {0}")]
    Producer(Arc<anyhow::Error>),

    /// The dispatch was cancelled before its result could be applied
    #[error("Query dispatch cancelled")]
    Cancelled,
}

impl CacheError {
    /// Wraps a producer error for propagation to all waiting callers.
    pub fn producer(err: anyhow::Error) -> Self {
        CacheError::Producer(Arc::new(err))
    }

    /// Returns true when the error originated in a producer function.
    pub fn is_producer(&self) -> bool {
        matches!(self, CacheError::Producer(_))
    }

    /// Returns true when the error is a cancellation notice.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CacheError::Cancelled)
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

//! Rate limiter error types.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by [`RateLimiter`](crate::RateLimiter) operations.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Malformed options, raised before any store interaction.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The counter store failed. Passed through as-is, never retried.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Gave up waiting for capacity after {waited:?}")]
    WaitTimedOut { waited: Duration },
}

/// Counter store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store transaction aborted: {0}")]
    Transaction(String),

    #[error("Store operation failed: {0}")]
    Operation(String),
}

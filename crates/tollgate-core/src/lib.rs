//! # Tollgate Core
//!
//! Approximate sliding-window rate limiting over a shared counter store.
//! This crate holds the bucket algorithm and the ports it depends on; store
//! adapters live in `tollgate-infra`.

pub mod domain;
pub mod error;
pub mod limiter;
pub mod ports;

pub use domain::{RateLimiterConfig, RateLimiterOptions};
pub use error::{RateLimitError, StoreError};
pub use limiter::{RateLimiter, WaitOptions};

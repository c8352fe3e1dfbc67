//! Domain types - bucket arithmetic and limiter configuration.

mod bucket;

mod config;

pub use bucket::{BucketClock, BucketIndex, BucketRing};
pub use config::{RateLimiterConfig, RateLimiterOptions};

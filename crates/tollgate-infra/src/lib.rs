//! # Tollgate Infrastructure
//!
//! Concrete implementations of the `CounterStore` port defined in `tollgate-core`.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `redis` - Redis counter stores, single connection and pooled

pub mod counter_store;

// Re-exports - In-Memory
pub use counter_store::InMemoryCounterStore;

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use counter_store::{PooledRedisCounterStore, RedisConfig, RedisCounterStore, RedisPoolConfig};

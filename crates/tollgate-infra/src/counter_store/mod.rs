//! Counter store implementations - Redis and in-memory.

mod memory;

pub use memory::InMemoryCounterStore;

#[cfg(feature = "redis")]
mod pooled;
#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::pooled::{PooledRedisCounterStore, RedisPoolConfig};
#[cfg(feature = "redis")]
pub use self::redis::{RedisConfig, RedisCounterStore};

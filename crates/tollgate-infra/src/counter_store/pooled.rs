//! Redis counter store that checks a pooled connection out per operation.

use async_trait::async_trait;
use deadpool_redis::{Config as DeadpoolRedisConfig, Connection, Pool, PoolConfig, Runtime};

use tollgate_core::domain::BucketIndex;
use tollgate_core::error::StoreError;
use tollgate_core::ports::{CounterOp, CounterStore};

use super::redis::{RedisConfig, multi_get_cmd, store_error, transaction_pipeline, zero_missing};

/// Pooled Redis configuration.
#[derive(Debug, Clone)]
pub struct RedisPoolConfig {
    /// Redis connection config
    pub redis: RedisConfig,
    /// Maximum pooled connections
    pub max_connections: usize,
}

impl Default for RedisPoolConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            max_connections: 16,
        }
    }
}

impl RedisPoolConfig {
    pub fn from_env() -> Self {
        Self {
            redis: RedisConfig::from_env(),
            max_connections: std::env::var("REDIS_POOL_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
        }
    }
}

/// Redis-backed counter store over a connection pool.
///
/// Each transaction or read acquires its own connection for the duration of
/// the call and returns it to the pool afterwards.
#[derive(Clone)]
pub struct PooledRedisCounterStore {
    pool: Pool,
}

impl PooledRedisCounterStore {
    pub async fn new(config: RedisPoolConfig) -> Result<Self, StoreError> {
        let mut cfg = DeadpoolRedisConfig::from_url(config.redis.url.clone());
        cfg.pool = Some(PoolConfig::new(config.max_connections));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Connection(format!("Pool creation failed: {e}")))?;

        // Test connection
        let mut conn = tokio::time::timeout(config.redis.connect_timeout, pool.get())
            .await
            .map_err(|_| StoreError::Connection("Connection timed out".to_string()))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let _pong: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(store_error)?;

        tracing::info!(
            url = %config.redis.url,
            max_connections = config.max_connections,
            "Connected to pooled Redis counter store"
        );

        Ok(Self { pool })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(RedisPoolConfig::from_env()).await
    }

    /// Use a pool the application already owns.
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    async fn checkout(&self) -> Result<Connection, StoreError> {
        self.pool.get().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to check out Redis connection");
            StoreError::Connection(e.to_string())
        })
    }
}

#[async_trait]
impl CounterStore for PooledRedisCounterStore {
    async fn atomic_transaction(
        &self,
        key: &str,
        ops: &[CounterOp],
    ) -> Result<Vec<i64>, StoreError> {
        let mut conn = self.checkout().await?;
        let replies: Vec<i64> = transaction_pipeline(key, ops)
            .query_async(&mut *conn)
            .await
            .map_err(store_error)?;

        tracing::debug!(key = %key, ops = ops.len(), "Pooled Redis transaction executed");
        Ok(replies)
    }

    async fn hash_multi_get(
        &self,
        key: &str,
        fields: &[BucketIndex],
    ) -> Result<Vec<i64>, StoreError> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.checkout().await?;
        let values: Vec<Option<i64>> = multi_get_cmd(key, fields)
            .query_async(&mut *conn)
            .await
            .map_err(store_error)?;

        Ok(zero_missing(values))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tollgate_core::domain::BucketRing;

    async fn get_test_store() -> Option<PooledRedisCounterStore> {
        let config = RedisPoolConfig {
            redis: RedisConfig {
                url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6389".to_string()),
                connect_timeout: Duration::from_secs(1),
            },
            max_connections: 4,
        };

        PooledRedisCounterStore::new(config).await.ok()
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_connection_error() {
        let config = RedisPoolConfig {
            redis: RedisConfig {
                url: "redis://127.0.0.1:1".to_string(),
                connect_timeout: Duration::from_secs(1),
            },
            max_connections: 1,
        };

        match PooledRedisCounterStore::new(config).await {
            Err(StoreError::Connection(_)) => {}
            Err(other) => panic!("expected connection error, got {other}"),
            Ok(_) => panic!("expected connection error"),
        }
    }

    #[tokio::test]
    async fn test_pooled_increment_and_read() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => return,
        };

        let ring = BucketRing::new(120).unwrap();
        let key = format!("tollgate_test:pooled:{}", std::process::id());

        assert_eq!(store.hash_increment(&key, ring.wrap(3), 2).await.unwrap(), 2);
        assert_eq!(store.hash_increment(&key, ring.wrap(3), 2).await.unwrap(), 4);
        store.expire(&key, Duration::from_secs(30)).await.unwrap();

        let values = store
            .hash_multi_get(&key, &[ring.wrap(3), ring.wrap(4)])
            .await
            .unwrap();
        assert_eq!(values, vec![4, 0]);
    }
}

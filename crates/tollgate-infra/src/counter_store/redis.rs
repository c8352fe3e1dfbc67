//! Redis counter store over a single managed connection.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Cmd, ErrorKind, Pipeline, RedisError};

use tollgate_core::domain::BucketIndex;
use tollgate_core::error::StoreError;
use tollgate_core::ports::{CounterOp, CounterStore};

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        }
    }
}

/// Classify a Redis failure for the limiter.
pub(super) fn store_error(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
    {
        StoreError::Connection(e.to_string())
    } else if e.kind() == ErrorKind::ExecAbortError {
        StoreError::Transaction(e.to_string())
    } else {
        StoreError::Operation(e.to_string())
    }
}

/// MULTI/EXEC pipeline running `ops` against one hash key.
pub(super) fn transaction_pipeline(key: &str, ops: &[CounterOp]) -> Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();

    for op in ops {
        match *op {
            CounterOp::HashIncrement { field, delta } => {
                pipe.hincr(key, field.get(), delta);
            }
            CounterOp::HashDelete { field } => {
                pipe.hdel(key, field.get());
            }
            CounterOp::Expire { ttl } => {
                pipe.expire(key, ttl.as_secs() as i64);
            }
        }
    }

    pipe
}

/// HMGET for the given bucket fields.
pub(super) fn multi_get_cmd(key: &str, fields: &[BucketIndex]) -> Cmd {
    let fields: Vec<u64> = fields.iter().map(|f| f.get()).collect();
    let mut cmd = redis::cmd("HMGET");
    cmd.arg(key).arg(fields);
    cmd
}

pub(super) fn zero_missing(values: Vec<Option<i64>>) -> Vec<i64> {
    values.into_iter().map(|v| v.unwrap_or(0)).collect()
}

/// Redis-backed counter store.
///
/// Owns one connection manager, which reconnects automatically and
/// multiplexes concurrent requests over a single connection.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    pub async fn new(config: RedisConfig) -> Result<Self, StoreError> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| StoreError::Connection(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| StoreError::Connection("Connection timed out".to_string()))?
            .map_err(store_error)?;

        tracing::info!(url = %config.url, "Connected to Redis counter store");

        Ok(Self { conn })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(RedisConfig::from_env()).await
    }

    /// Wrap a connection the application already manages.
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn atomic_transaction(
        &self,
        key: &str,
        ops: &[CounterOp],
    ) -> Result<Vec<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let replies: Vec<i64> = transaction_pipeline(key, ops)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;

        tracing::debug!(key = %key, ops = ops.len(), "Redis transaction executed");
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

        let mut conn = self.conn.clone();
        let values: Vec<Option<i64>> = multi_get_cmd(key, fields)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;

        Ok(zero_missing(values))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use tollgate_core::domain::BucketRing;
    use tollgate_core::ports::ManualClock;
    use tollgate_core::{RateLimiter, RateLimiterOptions};

    async fn get_test_store() -> Option<RedisCounterStore> {
        let config = RedisConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6389".to_string()),
            connect_timeout: Duration::from_secs(1),
        };

        RedisCounterStore::new(config).await.ok()
    }

    fn idx(i: i64) -> BucketIndex {
        BucketRing::new(120).unwrap().wrap(i)
    }

    #[test]
    fn test_transaction_pipeline_is_atomic() {
        let ops = [
            CounterOp::HashIncrement {
                field: idx(7),
                delta: 1,
            },
            CounterOp::HashDelete { field: idx(8) },
            CounterOp::Expire {
                ttl: Duration::from_secs(600),
            },
        ];
        let packed = String::from_utf8_lossy(&transaction_pipeline("k", &ops).get_packed_pipeline())
            .into_owned();

        assert!(packed.contains("MULTI"));
        assert!(packed.contains("HINCRBY"));
        assert!(packed.contains("HDEL"));
        assert!(packed.contains("EXPIRE"));
        assert!(packed.contains("EXEC"));
    }

    #[test]
    fn test_zero_missing() {
        assert_eq!(zero_missing(vec![Some(3), None, Some(1)]), vec![3, 0, 1]);
    }

    #[tokio::test]
    async fn test_redis_transaction_and_read() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => {
                tracing::warn!("Redis not available, skipping test");
                return;
            }
        };

        let key = "tollgate_test:store:hash";
        store.hash_delete(key, idx(0)).await.unwrap();
        store.hash_delete(key, idx(1)).await.unwrap();

        let ops = [
            CounterOp::HashIncrement {
                field: idx(0),
                delta: 4,
            },
            CounterOp::HashDelete { field: idx(1) },
            CounterOp::Expire {
                ttl: Duration::from_secs(30),
            },
        ];
        let replies = store.atomic_transaction(key, &ops).await.unwrap();
        assert_eq!(replies, vec![4, 0, 1]);

        let values = store.hash_multi_get(key, &[idx(0), idx(1)]).await.unwrap();
        assert_eq!(values, vec![4, 0]);

        store.hash_delete(key, idx(0)).await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_limiter() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => return,
        };

        let clock = Arc::new(ManualClock::at(1_700_000_000));
        let options = RateLimiterOptions {
            namespace: "tollgate_test".to_string(),
            ..Default::default()
        };
        let limiter = RateLimiter::new("redis", options, Arc::new(store))
            .unwrap()
            .with_clock(clock);

        // unique per run so leftovers from earlier runs never count
        let subject = format!("alice-{}", std::process::id());

        assert_eq!(limiter.add(&subject, 1).await.unwrap(), 1);
        assert_eq!(limiter.count(&subject, 5).await.unwrap(), 1);
        for _ in 0..4 {
            limiter.add(&subject, 1).await.unwrap();
        }
        assert_eq!(limiter.count(&subject, 600).await.unwrap(), 5);
        assert!(limiter.exceeded(&subject, 10, 5).await.unwrap());
    }
}

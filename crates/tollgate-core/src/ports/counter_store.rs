//! Counter store port.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::BucketIndex;
use crate::error::StoreError;

/// A single step inside an atomic counter transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOp {
    /// Add `delta` to a hash field, creating it at 0 if absent.
    HashIncrement { field: BucketIndex, delta: i64 },
    /// Remove a hash field. No-op if absent.
    HashDelete { field: BucketIndex },
    /// Set or refresh the key's time-to-live.
    Expire { ttl: Duration },
}

/// Counter store trait - abstraction over keyed atomic counter backends
/// (Redis, in-memory).
///
/// Each key holds a hash of bucket index to integer count.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Execute `ops` against `key` as one indivisible unit.
    ///
    /// Returns one integer reply per op, in order: the new value for an
    /// increment, the number of removed fields for a delete, and 1/0 for an
    /// expire depending on whether the key existed.
    async fn atomic_transaction(
        &self,
        key: &str,
        ops: &[CounterOp],
    ) -> Result<Vec<i64>, StoreError>;

    /// Read several fields in one round-trip. Missing fields read as 0.
    async fn hash_multi_get(
        &self,
        key: &str,
        fields: &[BucketIndex],
    ) -> Result<Vec<i64>, StoreError>;

    async fn hash_increment(
        &self,
        key: &str,
        field: BucketIndex,
        delta: i64,
    ) -> Result<i64, StoreError> {
        let op = CounterOp::HashIncrement { field, delta };
        first_reply(self.atomic_transaction(key, &[op]).await?)
    }

    async fn hash_delete(&self, key: &str, field: BucketIndex) -> Result<(), StoreError> {
        self.atomic_transaction(key, &[CounterOp::HashDelete { field }])
            .await
            .map(|_| ())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.atomic_transaction(key, &[CounterOp::Expire { ttl }])
            .await
            .map(|_| ())
    }
}

/// The first reply of a transaction, or an error if the store returned none.
pub fn first_reply(replies: Vec<i64>) -> Result<i64, StoreError> {
    replies
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::Transaction("empty transaction reply".to_string()))
}

//! In-memory counter store - used for tests and single-process deployments.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use tollgate_core::domain::BucketIndex;
use tollgate_core::error::StoreError;
use tollgate_core::ports::{CounterOp, CounterStore};

/// Minimum time between sweeps of expired hashes.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Default)]
struct HashEntry {
    fields: HashMap<BucketIndex, i64>,
    expires_at: Option<Instant>,
}

impl HashEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }
}

/// In-memory counter store using a HashMap of hashes behind an async RwLock.
///
/// Transactions hold the write lock for their whole duration, so they are
/// atomic with respect to every other operation on the store. Keys expire as
/// a whole, like a Redis hash. An emptied hash is removed, and expired hashes
/// are dropped by a sweep that runs on writes at most once per second.
/// Note: Counts are per-process and lost on restart.
pub struct InMemoryCounterStore {
    store: RwLock<StoreState>,
}

struct StoreState {
    entries: HashMap<String, HashEntry>,
    next_sweep: Instant,
}

impl StoreState {
    fn sweep_expired(&mut self) {
        let now = Instant::now();
        if now < self.next_sweep {
            return;
        }

        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        self.next_sweep = now + SWEEP_INTERVAL;

        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.entries.len(), "Swept expired hashes");
        }
    }
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(StoreState {
                entries: HashMap::new(),
                next_sweep: Instant::now(),
            }),
        }
    }

    /// Number of hashes currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.store.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining time-to-live of `key`, if it exists and has one.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let store = self.store.read().await;
        let entry = store.entries.get(key).filter(|e| !e.is_expired())?;
        entry
            .expires_at
            .map(|exp| exp.saturating_duration_since(Instant::now()))
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn atomic_transaction(
        &self,
        key: &str,
        ops: &[CounterOp],
    ) -> Result<Vec<i64>, StoreError> {
        let mut state = self.store.write().await;
        state.sweep_expired();

        let store = &mut state.entries;
        if store.get(key).is_some_and(HashEntry::is_expired) {
            store.remove(key);
        }
        let entry = store.entry(key.to_string()).or_default();

        let replies = ops
            .iter()
            .map(|op| match *op {
                CounterOp::HashIncrement { field, delta } => {
                    let value = entry.fields.entry(field).or_insert(0);
                    *value += delta;
                    *value
                }
                CounterOp::HashDelete { field } => i64::from(entry.fields.remove(&field).is_some()),
                CounterOp::Expire { ttl } => {
                    if entry.fields.is_empty() {
                        0
                    } else {
                        entry.expires_at = Some(Instant::now() + ttl);
                        1
                    }
                }
            })
            .collect();

        if entry.fields.is_empty() {
            store.remove(key);
        }

        Ok(replies)
    }

    async fn hash_multi_get(
        &self,
        key: &str,
        fields: &[BucketIndex],
    ) -> Result<Vec<i64>, StoreError> {
        let store = self.store.read().await;
        let entry = store.entries.get(key).filter(|e| !e.is_expired());

        Ok(fields
            .iter()
            .map(|field| {
                entry
                    .and_then(|e| e.fields.get(field))
                    .copied()
                    .unwrap_or(0)
            })
            .collect())
    }
}

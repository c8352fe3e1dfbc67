//! Approximate sliding-window rate limiter.
//!
//! Time is cut into `bucket_interval`-wide buckets arranged in a ring of
//! `bucket_count` slots that wraps every `bucket_span` seconds. Each subject
//! owns one hash in the counter store mapping bucket index to hit count.
//! Writes land in the current bucket and clear the two buckets ahead of it, so
//! a slot written during the previous cycle is already empty when the ring
//! comes back around. This assumes each subject sees at least one write per
//! `bucket_span`; after a longer idle gap, slots that were never cleared can
//! still hold counts from an older cycle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{BucketIndex, RateLimiterConfig, RateLimiterOptions};
use crate::error::RateLimitError;
use crate::ports::{Clock, CounterOp, CounterStore, SystemClock, first_reply};

/// How many buckets ahead of the write position get cleared on each `add`.
const CLEAR_AHEAD: u64 = 2;

/// Options for [`RateLimiter::exec_within_threshold`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOptions {
    /// Trailing window checked against `threshold`, in seconds.
    pub interval: u64,
    pub threshold: i64,
    /// Upper bound on total time spent waiting. `None` waits indefinitely.
    pub deadline: Option<Duration>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: 30,
            threshold: 30,
            deadline: None,
        }
    }
}

/// A named rate limiter backed by a shared counter store.
pub struct RateLimiter {
    name: String,
    config: RateLimiterConfig,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Validate `options` and bind the limiter to `store`.
    ///
    /// Fails with [`RateLimitError::Configuration`] before touching the store.
    pub fn new(
        name: impl Into<String>,
        options: RateLimiterOptions,
        store: Arc<dyn CounterStore>,
    ) -> Result<Self, RateLimitError> {
        let config = RateLimiterConfig::try_from(options)?;
        let name = name.into();

        tracing::debug!(
            limiter = %name,
            bucket_span = config.bucket_span(),
            bucket_interval = config.bucket_interval(),
            bucket_count = config.bucket_count(),
            "Rate limiter configured"
        );

        Ok(Self {
            name,
            config,
            store,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Store key for `subject`: `namespace:limiter_name:subject`.
    pub fn subject_key(&self, subject: &str) -> String {
        format!("{}:{}:{}", self.config.namespace(), self.name, subject)
    }

    fn current_bucket(&self) -> BucketIndex {
        self.config.clock().bucket_of(self.clock.now_secs())
    }

    /// Record `hits` for `subject` in the current bucket.
    ///
    /// Returns the current bucket's count after the increment.
    pub async fn add(&self, subject: &str, hits: u32) -> Result<i64, RateLimitError> {
        let key = self.subject_key(subject);
        let bucket = self.current_bucket();
        let ring = self.config.clock().ring();

        let mut ops = Vec::with_capacity(CLEAR_AHEAD as usize + 2);
        ops.push(CounterOp::HashIncrement {
            field: bucket,
            delta: i64::from(hits),
        });
        ops.extend((1..=CLEAR_AHEAD).map(|step| CounterOp::HashDelete {
            field: ring.ahead(bucket, step),
        }));
        ops.push(CounterOp::Expire {
            ttl: Duration::from_secs(self.config.bucket_expiry()),
        });

        let replies = self.store.atomic_transaction(&key, &ops).await?;
        let count = first_reply(replies)?;

        tracing::debug!(key = %key, bucket = %bucket, hits, count, "Recorded hits");
        Ok(count)
    }

    /// Approximate number of hits for `subject` over the trailing `interval`
    /// seconds, at `bucket_interval` resolution.
    ///
    /// `interval` is clamped to `[bucket_interval, bucket_span]`.
    pub async fn count(&self, subject: &str, interval: u64) -> Result<i64, RateLimitError> {
        let key = self.subject_key(subject);
        let bucket = self.current_bucket();

        let interval = interval.clamp(self.config.bucket_interval(), self.config.bucket_span());
        let buckets = interval / self.config.bucket_interval();
        let fields: Vec<BucketIndex> = self
            .config
            .clock()
            .ring()
            .trailing(bucket, buckets)
            .collect();

        let values = self.store.hash_multi_get(&key, &fields).await?;
        let total: i64 = values.iter().sum();

        tracing::debug!(key = %key, bucket = %bucket, buckets, total, "Counted hits");
        Ok(total)
    }

    /// Whether `subject` has reached `threshold` hits over `interval` seconds.
    pub async fn exceeded(
        &self,
        subject: &str,
        interval: u64,
        threshold: i64,
    ) -> Result<bool, RateLimitError> {
        Ok(self.count(subject, interval).await? >= threshold)
    }

    pub async fn within_bounds(
        &self,
        subject: &str,
        interval: u64,
        threshold: i64,
    ) -> Result<bool, RateLimitError> {
        Ok(!self.exceeded(subject, interval, threshold).await?)
    }

    /// Wait until `subject` is within bounds, then run `action` once.
    ///
    /// Polls every `bucket_interval` seconds. Without a deadline this waits as
    /// long as it takes; drop the future to abandon the wait. With a deadline,
    /// returns [`RateLimitError::WaitTimedOut`] and never runs `action` once
    /// the deadline has passed.
    pub async fn exec_within_threshold<F, Fut, T>(
        &self,
        subject: &str,
        options: WaitOptions,
        action: F,
    ) -> Result<T, RateLimitError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let pause = Duration::from_secs(self.config.bucket_interval());
        let mut waited = Duration::ZERO;

        while self
            .exceeded(subject, options.interval, options.threshold)
            .await?
        {
            let nap = match options.deadline {
                Some(deadline) if waited >= deadline => {
                    tracing::warn!(
                        limiter = %self.name,
                        subject = %subject,
                        waited_ms = waited.as_millis() as u64,
                        "Wait deadline elapsed"
                    );
                    return Err(RateLimitError::WaitTimedOut { waited });
                }
                Some(deadline) => pause.min(deadline - waited),
                None => pause,
            };

            tracing::debug!(
                limiter = %self.name,
                subject = %subject,
                threshold = options.threshold,
                nap_ms = nap.as_millis() as u64,
                "Threshold exceeded, waiting"
            );
            self.clock.sleep(nap).await;
            waited += nap;
        }

        Ok(action().await)
    }
}

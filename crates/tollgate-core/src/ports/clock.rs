//! Time source port.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

/// Clock trait - wall-clock reads plus the suspend primitive used while
/// waiting for capacity.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current Unix time in whole seconds.
    fn now_secs(&self) -> u64;

    /// Suspend the calling task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// The system wall clock, sleeping on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        unix_secs(SystemTime::now())
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Whole seconds since the Unix epoch. A wall clock set before the epoch
/// reads as 0, which puts every write in bucket 0 until it is corrected.
fn unix_secs(now: SystemTime) -> u64 {
    match now.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs(),
        Err(e) => {
            tracing::warn!(
                behind_secs = e.duration().as_secs(),
                "System clock is before the Unix epoch, reading it as 0"
            );
            0
        }
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn saturating_add(counter: &AtomicU64, millis: u64) {
    // the closure never declines, so the update always lands
    let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
        Some(current.saturating_add(millis))
    });
}

/// A clock that only moves when told to.
///
/// `sleep` advances the clock by the requested duration instead of waiting,
/// so code that polls on a timer runs instantly and deterministically.
/// Time saturates at `u64::MAX` milliseconds rather than wrapping.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_millis: AtomicU64,
    slept_millis: AtomicU64,
}

impl ManualClock {
    pub fn at(unix_secs: u64) -> Self {
        Self {
            now_millis: AtomicU64::new(unix_secs.saturating_mul(1000)),
            slept_millis: AtomicU64::new(0),
        }
    }

    pub fn set(&self, unix_secs: u64) {
        self.now_millis
            .store(unix_secs.saturating_mul(1000), Ordering::SeqCst);
    }

    pub fn advance(&self, duration: Duration) {
        saturating_add(&self.now_millis, saturating_millis(duration));
    }

    /// Total time spent in `sleep` so far.
    pub fn slept(&self) -> Duration {
        Duration::from_millis(self.slept_millis.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.now_millis.load(Ordering::SeqCst) / 1000
    }

    async fn sleep(&self, duration: Duration) {
        saturating_add(&self.slept_millis, saturating_millis(duration));
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_time() {
        let clock = ManualClock::at(100);
        clock.sleep(Duration::from_secs(5)).await;
        clock.sleep(Duration::from_millis(1500)).await;

        assert_eq!(clock.now_secs(), 106);
        assert_eq!(clock.slept(), Duration::from_millis(6500));
    }

    #[tokio::test]
    async fn test_manual_clock_saturates() {
        let clock = ManualClock::at(u64::MAX);
        assert_eq!(clock.now_secs(), u64::MAX / 1000);

        clock.set(10);
        clock.advance(Duration::MAX);
        assert_eq!(clock.now_secs(), u64::MAX / 1000);

        clock.sleep(Duration::MAX).await;
        clock.sleep(Duration::from_secs(1)).await;
        assert_eq!(clock.now_secs(), u64::MAX / 1000);
        assert_eq!(clock.slept(), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_system_clock_is_past_epoch() {
        assert!(SystemClock.now_secs() > 1_600_000_000);
    }

    #[test]
    fn test_unix_secs_before_epoch_reads_zero() {
        assert_eq!(unix_secs(UNIX_EPOCH + Duration::from_millis(1_700_000_000_999)), 1_700_000_000);
        assert_eq!(unix_secs(UNIX_EPOCH), 0);
        assert_eq!(unix_secs(UNIX_EPOCH - Duration::from_secs(3600)), 0);
    }
}

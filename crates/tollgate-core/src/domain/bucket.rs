//! Bucket ring arithmetic and the time-to-bucket mapping.

use std::fmt;

/// Position of a bucket within the ring, always in `[0, ring size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketIndex(u64);

impl BucketIndex {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BucketIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed-size ring of bucket indices.
///
/// All index movement goes through modular arithmetic here, so callers never
/// produce an index outside the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketRing {
    size: u64,
}

impl BucketRing {
    /// Returns `None` for an empty ring.
    pub fn new(size: u64) -> Option<Self> {
        (size > 0).then_some(Self { size })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Wrap an arbitrary (possibly negative) offset onto the ring.
    pub fn wrap(&self, index: i64) -> BucketIndex {
        BucketIndex(index.rem_euclid(self.size as i64) as u64)
    }

    /// The index `steps` positions after `from`.
    pub fn ahead(&self, from: BucketIndex, steps: u64) -> BucketIndex {
        BucketIndex((from.0 + steps % self.size) % self.size)
    }

    /// The index `steps` positions before `from`.
    pub fn behind(&self, from: BucketIndex, steps: u64) -> BucketIndex {
        BucketIndex((from.0 + self.size - steps % self.size) % self.size)
    }

    /// The `n` indices ending at `newest`, newest first. Never yields an index
    /// twice: `n` is capped at the ring size.
    pub fn trailing(self, newest: BucketIndex, n: u64) -> impl Iterator<Item = BucketIndex> {
        (0..n.min(self.size)).map(move |i| self.behind(newest, i))
    }
}

/// Maps wall-clock seconds to a ring position.
///
/// Every process sharing a subject key computes the same bucket for the same
/// instant, given synchronized clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketClock {
    span: u64,
    interval: u64,
    ring: BucketRing,
}

impl BucketClock {
    pub(crate) fn new(span: u64, interval: u64, ring: BucketRing) -> Self {
        Self {
            span,
            interval,
            ring,
        }
    }

    /// `floor((time mod span) / interval)`.
    ///
    /// When the span is not a whole number of intervals, the partial slot at the
    /// end of the cycle folds into the last bucket.
    pub fn bucket_of(&self, unix_secs: u64) -> BucketIndex {
        let slot = (unix_secs % self.span) / self.interval;
        BucketIndex(slot.min(self.ring.size() - 1))
    }

    pub fn ring(&self) -> BucketRing {
        self.ring
    }
}

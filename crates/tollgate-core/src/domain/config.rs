//! Limiter options and the validated configuration built from them.

use serde::{Deserialize, Serialize};

use super::bucket::{BucketClock, BucketRing};
use crate::error::RateLimitError;

/// Raw limiter options, as supplied by the application.
///
/// All durations are whole seconds. Validate with [`RateLimiterConfig::try_from`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimiterOptions {
    /// Total tracked window.
    pub bucket_span: u64,
    /// Width of a single bucket.
    pub bucket_interval: u64,
    /// TTL applied to a subject's bucket map. Defaults to `bucket_span`.
    pub bucket_expiry: Option<u64>,
    /// Leading segment of every store key.
    pub namespace: String,
}

impl Default for RateLimiterOptions {
    fn default() -> Self {
        Self {
            bucket_span: 600,
            bucket_interval: 5,
            bucket_expiry: None,
            namespace: "ratelimit".to_string(),
        }
    }
}

impl RateLimiterOptions {
    /// Load options from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bucket_span: std::env::var("RATE_LIMIT_BUCKET_SPAN_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.bucket_span),
            bucket_interval: std::env::var("RATE_LIMIT_BUCKET_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.bucket_interval),
            bucket_expiry: std::env::var("RATE_LIMIT_BUCKET_EXPIRY_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
            namespace: std::env::var("RATE_LIMIT_NAMESPACE").unwrap_or(defaults.namespace),
        }
    }

    /// Parse options from a JSON object. Missing fields take their defaults;
    /// unknown fields or mistyped values are a configuration error.
    pub fn from_json(raw: &str) -> Result<Self, RateLimitError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| RateLimitError::Configuration(e.to_string()))?;
        if !value.is_object() {
            return Err(RateLimitError::Configuration(
                "options must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| RateLimitError::Configuration(e.to_string()))
    }
}

/// Validated, immutable limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    bucket_span: u64,
    bucket_interval: u64,
    bucket_expiry: u64,
    namespace: String,
    clock: BucketClock,
}

impl RateLimiterConfig {
    pub fn bucket_span(&self) -> u64 {
        self.bucket_span
    }

    pub fn bucket_interval(&self) -> u64 {
        self.bucket_interval
    }

    pub fn bucket_expiry(&self) -> u64 {
        self.bucket_expiry
    }

    pub fn bucket_count(&self) -> u64 {
        self.clock.ring().size()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn clock(&self) -> BucketClock {
        self.clock
    }
}

/// `round(span / interval)`, halves rounding up.
fn rounded_bucket_count(span: u64, interval: u64) -> u64 {
    (2 * span + interval) / (2 * interval)
}

impl TryFrom<RateLimiterOptions> for RateLimiterConfig {
    type Error = RateLimitError;

    fn try_from(options: RateLimiterOptions) -> Result<Self, Self::Error> {
        let RateLimiterOptions {
            bucket_span,
            bucket_interval,
            bucket_expiry,
            namespace,
        } = options;

        if bucket_interval == 0 {
            return Err(RateLimitError::Configuration(
                "bucket_interval must be greater than zero".to_string(),
            ));
        }

        let bucket_expiry = bucket_expiry.unwrap_or(bucket_span);
        if bucket_expiry > bucket_span {
            return Err(RateLimitError::Configuration(format!(
                "bucket_expiry ({bucket_expiry}s) cannot be longer than bucket_span ({bucket_span}s)"
            )));
        }

        let bucket_count = rounded_bucket_count(bucket_span, bucket_interval);
        let ring = match BucketRing::new(bucket_count) {
            Some(ring) if bucket_count >= 3 => ring,
            _ => {
                return Err(RateLimitError::Configuration(format!(
                    "cannot have less than 3 buckets (got {bucket_count})"
                )));
            }
        };

        Ok(Self {
            bucket_span,
            bucket_interval,
            bucket_expiry,
            namespace,
            clock: BucketClock::new(bucket_span, bucket_interval, ring),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(span: u64, interval: u64, expiry: Option<u64>) -> RateLimiterOptions {
        RateLimiterOptions {
            bucket_span: span,
            bucket_interval: interval,
            bucket_expiry: expiry,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_give_120_buckets() {
        let config = RateLimiterConfig::try_from(RateLimiterOptions::default()).unwrap();
        assert_eq!(config.bucket_count(), 120);
        assert_eq!(config.bucket_expiry(), 600);
        assert_eq!(config.namespace(), "ratelimit");
    }

    #[test]
    fn test_bucket_count_rounds() {
        let config = RateLimiterConfig::try_from(options(10, 4, None)).unwrap();
        assert_eq!(config.bucket_count(), 3);

        let config = RateLimiterConfig::try_from(options(11, 3, None)).unwrap();
        assert_eq!(config.bucket_count(), 4);
    }

    #[test]
    fn test_rejects_too_few_buckets() {
        let err = RateLimiterConfig::try_from(options(10, 5, None)).unwrap_err();
        assert!(matches!(err, RateLimitError::Configuration(_)));

        // 9 / 4 = 2.25 rounds down to 2
        assert!(RateLimiterConfig::try_from(options(9, 4, None)).is_err());
        assert!(RateLimiterConfig::try_from(options(15, 5, None)).is_ok());
    }

    #[test]
    fn test_rejects_expiry_longer_than_span() {
        let err = RateLimiterConfig::try_from(options(600, 5, Some(601))).unwrap_err();
        assert!(matches!(err, RateLimitError::Configuration(_)));
        assert!(RateLimiterConfig::try_from(options(600, 5, Some(600))).is_ok());
        assert!(RateLimiterConfig::try_from(options(600, 5, Some(60))).is_ok());
    }

    #[test]
    fn test_rejects_zero_interval() {
        assert!(RateLimiterConfig::try_from(options(600, 0, None)).is_err());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let opts = RateLimiterOptions::from_json(r#"{"bucket_interval": 10}"#).unwrap();
        assert_eq!(opts.bucket_span, 600);
        assert_eq!(opts.bucket_interval, 10);
        assert_eq!(opts.bucket_expiry, None);
    }

    #[test]
    fn test_from_json_rejects_wrong_shape() {
        let err = RateLimiterOptions::from_json(r#"{"bucket_span": "ten"}"#).unwrap_err();
        assert!(matches!(err, RateLimitError::Configuration(_)));

        let err = RateLimiterOptions::from_json(r#"{"bucket_spam": 10}"#).unwrap_err();
        assert!(matches!(err, RateLimitError::Configuration(_)));

        assert!(RateLimiterOptions::from_json("[600, 5]").is_err());
    }

    #[test]
    fn test_from_json_requires_object() {
        for raw in ["[600, 5]", "[]", "600", "\"ratelimit\"", "null"] {
            match RateLimiterOptions::from_json(raw) {
                Err(RateLimitError::Configuration(msg)) => {
                    assert_eq!(msg, "options must be a JSON object", "input {raw}");
                }
                other => panic!("expected configuration error for {raw}, got {other:?}"),
            }
        }
        assert!(RateLimiterOptions::from_json("{}").is_ok());
    }
}

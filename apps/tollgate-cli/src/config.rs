//! Application configuration loaded from environment variables.

use tollgate_core::RateLimiterOptions;
use tollgate_infra::RedisPoolConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub limiter: RateLimiterOptions,
    pub redis: RedisPoolConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// `RATE_LIMIT_OPTIONS_JSON`, when set, replaces the individual
    /// `RATE_LIMIT_*` variables and must parse cleanly.
    pub fn from_env() -> Result<Self, tollgate_core::RateLimitError> {
        let limiter = match std::env::var("RATE_LIMIT_OPTIONS_JSON") {
            Ok(raw) => RateLimiterOptions::from_json(&raw)?,
            Err(_) => RateLimiterOptions::from_env(),
        };

        Ok(Self {
            limiter,
            redis: RedisPoolConfig::from_env(),
        })
    }
}

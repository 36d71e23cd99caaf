//! Application configuration with layered loading.
//!
//! Configuration is assembled in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: the `Default` implementations of each section
//! 2. **Config file**: TOML file named by the `TARIFA_CONFIG` env var
//! 3. **Environment variables**: `TARIFA_*` overrides for specific fields
//!    (`__` separates nesting, e.g. `TARIFA_ORACLE__URL`)
//!
//! Loading validates the result: contradictory timings (a stale TTL below
//! the fresh TTL, an extension interval at or above the lease TTL) are
//! errors at startup, not surprises at runtime.
//!
//! # Example
//!
//! ```toml
//! [oracle]
//! url = "https://pricing.example.com/rates"
//! api_token = "…"
//!
//! [cache]
//! fresh_ttl_seconds = 300
//! stale_ttl_seconds = 900
//!
//! [breaker]
//! failure_threshold = 5
//! cooldown_seconds = 60
//! ```

use crate::{
    cache::{CacheTimingConfig, FollowerConfig},
    coordination::LeaseConfig,
    upstream::{BreakerConfig, OracleConfig},
};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Aggregated service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TarifaConfig {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub cache: CacheTimingConfig,
    #[serde(default)]
    pub follower: FollowerConfig,
    #[serde(default)]
    pub lease: LeaseConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

impl TarifaConfig {
    /// Loads configuration through the layered hierarchy and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when a source fails to parse and
    /// [`ConfigError::Invalid`] when the assembled values contradict each
    /// other.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Ok(path) = std::env::var("TARIFA_CONFIG") {
            builder = builder.add_source(File::with_name(&path));
        }
        let settings = builder
            .add_source(Environment::with_prefix("TARIFA").separator("__"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] with a description of the first
    /// contradiction found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.oracle.url.is_empty() && !self.oracle.url.starts_with("http") {
            return Err(ConfigError::Invalid(format!(
                "oracle.url must start with http, got {:?}",
                self.oracle.url
            )));
        }
        if self.cache.fresh_ttl_seconds == 0 {
            return Err(ConfigError::Invalid("cache.fresh_ttl_seconds must be positive".into()));
        }
        if self.cache.retain_stale && self.cache.stale_ttl_seconds < self.cache.fresh_ttl_seconds {
            return Err(ConfigError::Invalid(
                "cache.stale_ttl_seconds must be at least cache.fresh_ttl_seconds".into(),
            ));
        }
        if self.cache.fetch_timeout_seconds == 0 {
            return Err(ConfigError::Invalid("cache.fetch_timeout_seconds must be positive".into()));
        }
        if self.follower.wait_timeout_ms == 0 {
            return Err(ConfigError::Invalid("follower.wait_timeout_ms must be positive".into()));
        }
        if self.follower.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid("follower.backoff_factor must be at least 1.0".into()));
        }
        if !(0.0..1.0).contains(&self.follower.backoff_jitter) {
            return Err(ConfigError::Invalid(
                "follower.backoff_jitter must be in [0.0, 1.0)".into(),
            ));
        }
        if self.lease.ttl_seconds == 0 {
            return Err(ConfigError::Invalid("lease.ttl_seconds must be positive".into()));
        }
        if self.lease.extend_interval_ms >= self.lease.ttl_seconds * 1000 {
            return Err(ConfigError::Invalid(
                "lease.extend_interval_ms must be shorter than the lease TTL".into(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "breaker.failure_threshold must be positive".into(),
            ));
        }
        Ok(())
    }
}

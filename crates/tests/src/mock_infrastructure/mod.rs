//! Reusable mock types and fixtures for integration testing.
//!
//! - [`ScriptedOracle`]: in-process fetcher with scripted latency and
//!   failure order, for cache-level scenarios
//! - Fixture helpers: canonical attribute sequences, compressed timing
//!   configs, and cache instances standing in for service processes

pub mod oracle_mock;

pub use oracle_mock::ScriptedOracle;

use serde_json::{json, Value};
use std::sync::Arc;
use tarifa_core::{
    BreakerConfig, CacheTimingConfig, CircuitBreaker, CoalescingCache, FollowerConfig, KvStore,
    LeaseConfig, MemoryStore, PricedRate,
};

/// Attribute sequence used by most scenarios.
pub fn summer_attrs() -> Value {
    json!([{"period": "Summer", "hotel": "FloatingPointResort", "room": "SingletonRoom"}])
}

/// The rates the scripted oracle answers for [`summer_attrs`].
pub fn summer_rates() -> Vec<PricedRate> {
    vec![PricedRate {
        period: "Summer".to_string(),
        hotel: "FloatingPointResort".to_string(),
        room: "SingletonRoom".to_string(),
        price: 150.0,
    }]
}

/// Follower policy with windows compressed for tests: 300 ms waits, two
/// retries, 20 ms initial backoff, no jitter.
pub fn fast_follower() -> FollowerConfig {
    FollowerConfig {
        wait_timeout_ms: 300,
        retries: 2,
        backoff_initial_ms: 20,
        backoff_factor: 2.0,
        backoff_jitter: 0.0,
    }
}

/// Builds a cache instance over `store` with the given breaker, standing in
/// for one service process. Call twice with one store to simulate two
/// processes sharing it.
pub fn cache_instance(
    store: &Arc<MemoryStore>,
    breaker: Arc<CircuitBreaker>,
) -> CoalescingCache<Vec<PricedRate>> {
    CoalescingCache::new(
        Arc::clone(store) as Arc<dyn KvStore>,
        breaker,
        CacheTimingConfig::default(),
        fast_follower(),
        LeaseConfig::default(),
    )
}

/// A default-config breaker for scenarios that never trip it.
pub fn quiet_breaker() -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(&BreakerConfig::default()))
}

//! Request-coalescing cache.
//!
//! The orchestrator of the service: cache lookup, leader election through
//! the distributed lease, the leader's fetch-write-publish sequence, the
//! follower's bounded wait, and stale degradation once the circuit breaker
//! opens. See [`coalescing::CoalescingCache`] for the full algorithm.

pub mod coalescing;

pub use coalescing::{CacheTimingConfig, CoalescingCache, FetchError, FollowerConfig};

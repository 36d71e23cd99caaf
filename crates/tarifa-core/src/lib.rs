//! # Tarifa Core
//!
//! Core library for tarifa, a request-coalescing cache in front of an
//! expensive, rate-limited pricing oracle.
//!
//! Many concurrent clients ask for the same rates; the oracle is slow and
//! occasionally fails. This crate serves cached rates within their validity
//! window, collapses concurrent duplicate requests so the oracle sees
//! exactly one in-flight call per distinct query, degrades to stale data
//! when the oracle is unhealthy, and stays correct when several service
//! instances share one cache store.
//!
//! - **[`fingerprint`]**: canonical key derivation, hashing request
//!   attributes independently of record order and field casing.
//!
//! - **[`store`]**: the abstract shared key/value surface everything
//!   coordinates through, plus the embedded [`store::MemoryStore`].
//!
//! - **[`coordination`]**: the distributed lease (leader election with
//!   auto-extension) and the follower rendezvous mailboxes.
//!
//! - **[`upstream`]**: the oracle HTTP client and the circuit breaker that
//!   gates it.
//!
//! - **[`cache`]**: the coalescing cache orchestrating all of the above.
//!
//! - **[`pricing`]**: the adapter exposing `fetch_pricing` upward.
//!
//! - **[`config`]**: layered configuration; **[`metrics`]**: facade
//!   recording helpers.
//!
//! ## Request flow
//!
//! ```text
//!              fetch_pricing(attrs)
//!                      │
//!                fingerprint ── empty/invalid ──► []
//!                      │
//!                      ▼
//!               CoalescingCache ── fresh hit ──► value
//!                      │ miss
//!                      ▼
//!               breaker open? ── yes ──► stale │ ServiceUnavailable
//!                      │ no
//!                      ▼
//!               lease won? ──── no ───► rendezvous wait ──► value
//!                      │ yes                  │ timeout
//!                      ▼                      ▼
//!               oracle fetch          fresh → stale → retry
//!                      │
//!               write fresh+stale, publish to waiters
//! ```

pub mod cache;
pub mod config;
pub mod coordination;
pub mod fingerprint;
pub mod metrics;
pub mod pricing;
pub mod store;
pub mod types;
pub mod upstream;

pub use cache::{CacheTimingConfig, CoalescingCache, FetchError, FollowerConfig};
pub use config::{ConfigError, TarifaConfig};
pub use coordination::{DistributedLease, LeaseConfig, LeaseError, Rendezvous, WaitError};
pub use fingerprint::{fingerprint, Fingerprint};
pub use pricing::{PricingError, PricingService};
pub use store::{KvStore, MemoryStore, StoreError};
pub use types::{PricedRate, RateQuery};
pub use upstream::{
    BreakerConfig, BreakerPhase, CircuitBreaker, OracleClient, OracleConfig, UpstreamError,
};

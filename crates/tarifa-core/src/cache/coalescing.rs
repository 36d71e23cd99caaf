//! Leader/follower request coalescing over the shared store.
//!
//! For any fingerprint there is at most one in-flight oracle call across
//! every instance sharing the store. The first caller to win the lease
//! becomes the leader: it performs the fetch under the circuit breaker,
//! writes the fresh entry (and refreshes the stale copy), then delivers the
//! serialized value into each registered rendezvous slot. Every other
//! concurrent caller becomes a follower and parks on its own slot.
//!
//! One `fetch` call moves through these states:
//!
//! ```text
//! Start ──► CacheCheck ──┬─► Hit ─────────────────────────────► Return
//!                        ├─► BreakerOpen ──► Stale | Error ───► Return
//!                        └─► LeaderElect
//!                              │
//!              ┌───────────────┴────────────────┐
//!              ▼ won lease                      ▼ lost lease
//!        Leader{DoubleCheck ──►           Follower{Wait ──► Retry* ──►
//!               Fetch ──► Write ──►                Fallback(fresh,stale)}
//!               Publish}                               │
//!              └────────────────┬───────────────------─┘
//!                               ▼
//!                             Return
//! ```
//!
//! Suspension points are store or oracle I/O only; long waits block on the
//! store's blocking pop, never on a poll loop.

use crate::{
    coordination::{
        lease::{DistributedLease, LeaseConfig, LeaseError},
        rendezvous::{self, Rendezvous, WaitError},
    },
    fingerprint::Fingerprint,
    store::{KvStore, StoreError},
    upstream::{CircuitBreaker, UpstreamError},
};
use rand::Rng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{future::Future, marker::PhantomData, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{sync::mpsc, time::Instant};

/// Errors surfaced by [`CoalescingCache::fetch`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The breaker is open and no stale copy exists to degrade to.
    #[error("circuit breaker is open and no stale value is available")]
    BreakerOpen,

    /// No result arrived within the follower's full wait budget.
    #[error("no result arrived within the coalescing wait budget")]
    WaitTimeout,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode cache payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// TTLs and the leader's fetch budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTimingConfig {
    /// Seconds a value is served directly. Defaults to `300` (5 minutes).
    #[serde(default = "default_fresh_ttl_seconds")]
    pub fresh_ttl_seconds: u64,

    /// Seconds the stale copy is retained for fallback only.
    /// Defaults to `900` (15 minutes).
    #[serde(default = "default_stale_ttl_seconds")]
    pub stale_ttl_seconds: u64,

    /// Whether to keep the stale copy at all. Defaults to `true`.
    #[serde(default = "default_retain_stale")]
    pub retain_stale: bool,

    /// Hard budget for the leader's oracle call, in seconds.
    /// Defaults to `30`.
    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
}

fn default_fresh_ttl_seconds() -> u64 {
    300
}

fn default_stale_ttl_seconds() -> u64 {
    900
}

fn default_retain_stale() -> bool {
    true
}

fn default_fetch_timeout_seconds() -> u64 {
    30
}

impl Default for CacheTimingConfig {
    fn default() -> Self {
        Self {
            fresh_ttl_seconds: default_fresh_ttl_seconds(),
            stale_ttl_seconds: default_stale_ttl_seconds(),
            retain_stale: default_retain_stale(),
            fetch_timeout_seconds: default_fetch_timeout_seconds(),
        }
    }
}

impl CacheTimingConfig {
    #[must_use]
    pub fn fresh_ttl(&self) -> Duration {
        Duration::from_secs(self.fresh_ttl_seconds)
    }

    #[must_use]
    pub fn stale_ttl(&self) -> Duration {
        Duration::from_secs(self.stale_ttl_seconds)
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

/// Wait and retry policy for followers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerConfig {
    /// Milliseconds one rendezvous wait may block. Defaults to `15000`.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Full-path retries after the first wait. Defaults to `2`.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Initial retry backoff in milliseconds. Defaults to `200`.
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Multiplier applied to the backoff per retry. Defaults to `2.0`.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Symmetric jitter fraction applied to each backoff. Defaults to `0.2`.
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
}

fn default_wait_timeout_ms() -> u64 {
    15_000
}

fn default_retries() -> u32 {
    2
}

fn default_backoff_initial_ms() -> u64 {
    200
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_backoff_jitter() -> f64 {
    0.2
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
            retries: default_retries(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_factor: default_backoff_factor(),
            backoff_jitter: default_backoff_jitter(),
        }
    }
}

impl FollowerConfig {
    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    #[must_use]
    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }
}

/// Request-coalescing cache over a shared store.
///
/// `V` is the cached document; it crosses the store as serialized JSON.
pub struct CoalescingCache<V> {
    store: Arc<dyn KvStore>,
    lease: DistributedLease,
    breaker: Arc<CircuitBreaker>,
    timing: CacheTimingConfig,
    follower: FollowerConfig,
    cleanup_tx: mpsc::UnboundedSender<String>,
    _value: PhantomData<fn() -> V>,
}

impl<V> CoalescingCache<V>
where
    V: Serialize + DeserializeOwned + Send,
{
    /// Builds a cache and spawns its rendezvous cleanup worker; must be
    /// called from within a tokio runtime.
    #[must_use]
    pub fn new(
        store: Arc<dyn KvStore>,
        breaker: Arc<CircuitBreaker>,
        timing: CacheTimingConfig,
        follower: FollowerConfig,
        lease_config: LeaseConfig,
    ) -> Self {
        let cleanup_tx = rendezvous::spawn_cleanup_worker(Arc::clone(&store));
        let lease = DistributedLease::new(Arc::clone(&store), lease_config);
        Self {
            store,
            lease,
            breaker,
            timing,
            follower,
            cleanup_tx,
            _value: PhantomData,
        }
    }

    /// Returns the cached value for `key`, coordinating with every other
    /// concurrent caller so `fetcher` runs at most once per in-flight
    /// window across all instances sharing the store.
    ///
    /// # Errors
    ///
    /// - [`FetchError::BreakerOpen`] if the breaker is open with no stale copy
    /// - [`FetchError::WaitTimeout`] once the follower budget is exhausted
    /// - [`FetchError::Upstream`] when the leader's own fetch failed
    /// - [`FetchError::Store`] / [`FetchError::Encode`] on infrastructure failures
    pub async fn fetch<F, Fut>(&self, key: &Fingerprint, fetcher: F) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, UpstreamError>>,
    {
        if let Some(value) = self.read_entry(&key.cache_key()).await? {
            crate::metrics::record_cache_hit();
            tracing::debug!(key = %key, "cache hit");
            return Ok(value);
        }
        crate::metrics::record_cache_miss();

        if !self.breaker.can_execute().await {
            return self.serve_degraded(key).await;
        }

        match self.lease.with_lease(&key.lock_key(), move || self.run_leader(key, fetcher)).await {
            Ok(outcome) => outcome,
            Err(LeaseError::Unavailable) => self.follow(key).await,
            Err(LeaseError::Store(err)) => Err(err.into()),
        }
    }

    /// Breaker-open path: serve the stale copy if one exists, otherwise
    /// report saturation. The fetcher is never invoked here.
    async fn serve_degraded(&self, key: &Fingerprint) -> Result<V, FetchError> {
        match self.read_entry(&key.stale_key()).await? {
            Some(value) => {
                tracing::warn!(key = %key, "circuit breaker open; serving stale value");
                crate::metrics::record_stale_served("breaker_open");
                Ok(value)
            }
            None => Err(FetchError::BreakerOpen),
        }
    }

    /// The leader's critical section, run under the lease.
    async fn run_leader<F, Fut>(&self, key: &Fingerprint, fetcher: F) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, UpstreamError>>,
    {
        // Double-check under the lease: a previous leader may have written
        // between our miss and winning the election.
        if let Some(raw) = self.store.get(&key.cache_key()).await? {
            if let Some(value) = decode::<V>(&key.cache_key(), &raw) {
                tracing::debug!(key = %key, "entry appeared before fetch; publishing as-is");
                self.publish(key, &raw).await?;
                return Ok(value);
            }
        }

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timing.fetch_timeout(), fetcher()).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(err),
            Err(_elapsed) => Err(UpstreamError::Timeout),
        };
        crate::metrics::record_oracle_call(started.elapsed(), outcome.is_ok());

        let value = match outcome {
            Ok(value) => {
                self.breaker.on_success().await;
                value
            }
            Err(err) => {
                self.breaker.on_failure().await;
                tracing::warn!(key = %key, error = %err, "leader fetch failed");
                // No failure marker is delivered: followers recover through
                // their own timeout, fallback and retry. Clear the registry
                // so the next leader starts clean; the slots themselves
                // expire on their own.
                if let Err(cleanup_err) = self.store.delete(&key.waiters_key()).await {
                    tracing::warn!(key = %key, error = %cleanup_err, "failed to clear waiters registry");
                }
                return Err(err.into());
            }
        };

        let payload = serde_json::to_string(&value)?;
        // The fresh write must land before any waiter is unblocked, so a
        // follower re-reading the cache observes the value it received.
        self.store.set(&key.cache_key(), &payload, self.timing.fresh_ttl()).await?;
        if self.timing.retain_stale {
            self.store.set(&key.stale_key(), &payload, self.timing.stale_ttl()).await?;
        }
        self.publish(key, &payload).await?;
        Ok(value)
    }

    /// Drains the waiters registry in arrival order, delivering `payload`
    /// into each rendezvous slot exactly once.
    async fn publish(&self, key: &Fingerprint, payload: &str) -> Result<(), StoreError> {
        let registry = key.waiters_key();
        let mut delivered = 0u64;
        while let Some(waiter) = self.store.pop_front(&registry).await? {
            self.store.push_back(&waiter, payload).await?;
            // Bound the slot's lifetime in case its follower is gone.
            self.store.expire(&waiter, self.follower.wait_timeout() * 2).await?;
            delivered += 1;
        }
        self.store.delete(&registry).await?;

        if delivered > 0 {
            tracing::debug!(key = %key, delivered, "published result to waiters");
            crate::metrics::record_published(delivered);
        }
        Ok(())
    }

    /// The follower path: park on a rendezvous, fall back to fresh then
    /// stale reads on timeout, and retry the whole sequence with backoff.
    async fn follow(&self, key: &Fingerprint) -> Result<V, FetchError> {
        crate::metrics::record_follower_wait();
        let attempts = self.follower.retries + 1;
        let mut backoff = self.follower.backoff_initial();

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(jittered(backoff, self.follower.backoff_jitter)).await;
                backoff = backoff.mul_f64(self.follower.backoff_factor);
                // A leader that finished during the backoff shows up as a
                // plain cache hit.
                if let Some(value) = self.read_entry(&key.cache_key()).await? {
                    return Ok(value);
                }
            }

            let rendezvous = Rendezvous::create(
                Arc::clone(&self.store),
                self.cleanup_tx.clone(),
                key,
                self.follower.wait_timeout(),
            )
            .await?;

            match rendezvous.wait().await {
                Ok(payload) => {
                    if let Some(value) = decode::<V>(&key.cache_key(), &payload) {
                        return Ok(value);
                    }
                    // An unreadable payload falls through to the same
                    // recovery as a timeout.
                }
                Err(WaitError::Timeout) => {
                    tracing::debug!(key = %key, attempt, "follower wait timed out");
                }
                Err(WaitError::Store(err)) => return Err(err.into()),
            }

            // The leader may have written just after our wait expired.
            if let Some(value) = self.read_entry(&key.cache_key()).await? {
                return Ok(value);
            }
            if let Some(value) = self.read_entry(&key.stale_key()).await? {
                tracing::warn!(key = %key, "follower timed out; serving stale value");
                crate::metrics::record_stale_served("wait_timeout");
                return Ok(value);
            }
        }

        Err(FetchError::WaitTimeout)
    }

    async fn read_entry(&self, store_key: &str) -> Result<Option<V>, StoreError> {
        Ok(self.store.get(store_key).await?.and_then(|raw| decode::<V>(store_key, &raw)))
    }
}

/// Parses a stored payload; corrupt data is logged and treated as absent.
fn decode<V: DeserializeOwned>(store_key: &str, raw: &str) -> Option<V> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(key = store_key, error = %err, "corrupt cache payload treated as absent");
            None
        }
    }
}

/// Applies symmetric jitter to a backoff delay.
fn jittered(base: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return base;
    }
    let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
    base.mul_f64(factor)
}

//! Pricing adapter: the boundary the service exposes upward.
//!
//! Wraps the coalescing cache and the oracle client behind a single call,
//! [`PricingService::fetch_pricing`], and maps internal failure modes onto
//! the caller-visible taxonomy: degradations the caller can do nothing
//! about become [`PricingError::ServiceUnavailable`] with a readable
//! message, oracle errors are propagated with their status and body.

use crate::{
    cache::{CoalescingCache, FetchError},
    config::TarifaConfig,
    fingerprint::fingerprint,
    store::KvStore,
    types::PricedRate,
    upstream::{CircuitBreaker, OracleClient, UpstreamError},
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Caller-visible pricing errors.
#[derive(Debug, Error)]
pub enum PricingError {
    /// The service cannot answer right now; retry later.
    #[error("pricing temporarily unavailable: {0}")]
    ServiceUnavailable(String),

    /// The oracle answered with an error the caller should see.
    #[error(transparent)]
    Upstream(UpstreamError),

    /// Infrastructure failure inside the service.
    #[error("internal pricing error: {0}")]
    Internal(String),
}

/// Facade over the coalescing cache and the oracle client.
pub struct PricingService {
    cache: CoalescingCache<Vec<PricedRate>>,
    oracle: Arc<OracleClient>,
}

impl PricingService {
    /// Builds the service; must be called from within a tokio runtime.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, oracle: Arc<OracleClient>, config: &TarifaConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(&config.breaker));
        let cache = CoalescingCache::new(
            store,
            breaker,
            config.cache.clone(),
            config.follower.clone(),
            config.lease.clone(),
        );
        Self { cache, oracle }
    }

    /// Returns priced rates for the given attribute sequence.
    ///
    /// Empty or malformed attribute input yields an empty result without
    /// touching the cache or the oracle.
    ///
    /// # Errors
    ///
    /// - [`PricingError::ServiceUnavailable`] when the breaker is open with
    ///   no stale copy, or the coalescing wait budget is exhausted
    /// - [`PricingError::Upstream`] when this caller led the fetch and the
    ///   oracle failed
    pub async fn fetch_pricing(&self, attrs: &Value) -> Result<Vec<PricedRate>, PricingError> {
        let Some(key) = fingerprint(attrs) else {
            tracing::debug!("pricing request without usable attributes; returning empty result");
            return Ok(Vec::new());
        };

        let oracle = Arc::clone(&self.oracle);
        let request = attrs.clone();
        let result = self
            .cache
            .fetch(&key, move || async move { oracle.fetch_rates(&request).await })
            .await;

        match result {
            Ok(rates) => Ok(rates),
            Err(FetchError::BreakerOpen) => Err(PricingError::ServiceUnavailable(
                "the pricing oracle is unreachable and no recent rates are available".to_string(),
            )),
            Err(FetchError::WaitTimeout) => Err(PricingError::ServiceUnavailable(
                "timed out waiting for an in-flight pricing request".to_string(),
            )),
            Err(FetchError::Upstream(err)) => Err(PricingError::Upstream(err)),
            Err(err @ (FetchError::Store(_) | FetchError::Encode(_))) => {
                tracing::error!(error = %err, "pricing infrastructure failure");
                Err(PricingError::Internal(err.to_string()))
            }
        }
    }
}

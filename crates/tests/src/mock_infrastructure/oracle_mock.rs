//! Scripted in-process oracle for cache-level scenarios.
//!
//! The HTTP contract is covered by mockito-based tests in `pricing_tests`;
//! everything else scripts the fetcher directly so scenarios control
//! latency and failure order without a socket in the loop.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tarifa_core::{PricedRate, UpstreamError};

/// A fetcher implementation with a scripted outcome sequence.
///
/// Counts invocations, optionally sleeps to simulate oracle latency, fails
/// its first `fail_first` calls with the configured status, and answers
/// `rates` afterwards.
pub struct ScriptedOracle {
    calls: AtomicUsize,
    delay: Duration,
    fail_first: usize,
    failure_status: u16,
    rates: Vec<PricedRate>,
}

impl ScriptedOracle {
    /// An oracle that always succeeds with `rates`.
    pub fn succeeding(rates: Vec<PricedRate>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail_first: 0,
            failure_status: 0,
            rates,
        })
    }

    /// An oracle that always fails with the given status.
    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail_first: usize::MAX,
            failure_status: status,
            rates: Vec::new(),
        })
    }

    /// An oracle that fails its first `fail_first` calls with `status`,
    /// then succeeds with `rates`.
    pub fn recovering(fail_first: usize, status: u16, rates: Vec<PricedRate>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail_first,
            failure_status: status,
            rates,
        })
    }

    /// Adds per-call latency. Only meaningful before the first call.
    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        let mut inner = Arc::try_unwrap(self).unwrap_or_else(|_| panic!("oracle already shared"));
        inner.delay = delay;
        Arc::new(inner)
    }

    /// Number of times the fetcher has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// One scripted oracle invocation. Consumes an `Arc` clone so the
    /// resulting future is `'static` and can cross task boundaries:
    ///
    /// ```ignore
    /// let oracle = ScriptedOracle::succeeding(rates);
    /// let fetcher = { let oracle = Arc::clone(&oracle); move || oracle.call() };
    /// cache.fetch(&key, fetcher).await?;
    /// ```
    pub async fn call(self: Arc<Self>) -> Result<Vec<PricedRate>, UpstreamError> {
        let sequence = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if sequence < self.fail_first {
            Err(UpstreamError::Http(self.failure_status, String::new()))
        } else {
            Ok(self.rates.clone())
        }
    }
}

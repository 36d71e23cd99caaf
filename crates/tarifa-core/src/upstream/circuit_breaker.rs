//! Circuit breaker guarding calls to the pricing oracle.
//!
//! Three-phase failure detector. The state is one tagged variant behind a
//! single `RwLock`, so every transition is atomic with the counters that
//! justify it:
//!
//! - `Closed` -> `Open`: consecutive failures reach the threshold
//! - `Open` -> `HalfOpen`: the cooldown elapses
//! - `HalfOpen` -> `Closed`: a probe succeeds
//! - `HalfOpen` -> `Open`: a probe fails (the open stamp is renewed)
//!
//! The breaker is process-local; instances of this service do not share
//! failure counts through the store.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::{sync::RwLock, time::Instant};

/// Failure threshold and cooldown for the breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit. Defaults to `5`.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds to hold the circuit open before admitting a probe.
    /// Defaults to `60`.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_seconds() -> u64 {
    60
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

/// Externally observable breaker phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

/// Internal state; the variant payloads travel with the phase so they can
/// never disagree with it.
#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen,
}

/// Process-local circuit breaker.
pub struct CircuitBreaker {
    state: RwLock<BreakerState>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            state: RwLock::new(BreakerState::Closed { failures: 0 }),
            threshold: config.failure_threshold,
            cooldown: Duration::from_secs(config.cooldown_seconds),
        }
    }

    /// Whether a call may be attempted right now.
    ///
    /// Uses double-checked locking: the common closed/half-open case takes
    /// only the read lock; the open->half-open transition re-checks under
    /// the write lock because another caller may have raced the expiry.
    pub async fn can_execute(&self) -> bool {
        {
            let state = self.state.read().await;
            match *state {
                BreakerState::Closed { .. } | BreakerState::HalfOpen => return true,
                BreakerState::Open { opened_at } => {
                    if opened_at.elapsed() < self.cooldown {
                        return false;
                    }
                }
            }
        }

        let mut state = self.state.write().await;
        match *state {
            BreakerState::Closed { .. } | BreakerState::HalfOpen => true,
            BreakerState::Open { opened_at } => {
                if opened_at.elapsed() >= self.cooldown {
                    *state = BreakerState::HalfOpen;
                    crate::metrics::record_breaker_transition("half_open");
                    tracing::warn!("circuit breaker transitioning to half-open");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call: clears the failure count and closes the
    /// circuit from any phase.
    pub async fn on_success(&self) {
        let mut state = self.state.write().await;
        if !matches!(*state, BreakerState::Closed { .. }) {
            crate::metrics::record_breaker_transition("closed");
            tracing::info!("circuit breaker closed after successful call");
        }
        *state = BreakerState::Closed { failures: 0 };
    }

    /// Records a failed call. Reaching the threshold, or failing a
    /// half-open probe, opens the circuit and stamps the cooldown.
    pub async fn on_failure(&self) {
        let mut state = self.state.write().await;
        *state = match *state {
            BreakerState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.threshold {
                    crate::metrics::record_breaker_transition("open");
                    tracing::warn!(
                        threshold = self.threshold,
                        "circuit breaker opened after reaching failure threshold"
                    );
                    BreakerState::Open { opened_at: Instant::now() }
                } else {
                    BreakerState::Closed { failures }
                }
            }
            BreakerState::HalfOpen => {
                crate::metrics::record_breaker_transition("open");
                tracing::warn!("half-open probe failed; circuit breaker re-opened");
                BreakerState::Open { opened_at: Instant::now() }
            }
            BreakerState::Open { .. } => BreakerState::Open { opened_at: Instant::now() },
        };
    }

    /// Current phase, for observability and tests.
    pub async fn phase(&self) -> BreakerPhase {
        match *self.state.read().await {
            BreakerState::Closed { .. } => BreakerPhase::Closed,
            BreakerState::Open { .. } => BreakerPhase::Open,
            BreakerState::HalfOpen => BreakerPhase::HalfOpen,
        }
    }

    /// Consecutive failure count within the current closed window.
    pub async fn failure_count(&self) -> u32 {
        match *self.state.read().await {
            BreakerState::Closed { failures } => failures,
            _ => 0,
        }
    }
}

//! Error taxonomy for the pricing oracle.

use thiserror::Error;

/// Errors surfaced by calls to the upstream oracle.
///
/// The split matters for handling policy: transient errors may be retried
/// or absorbed by a stale fallback, permanent errors are surfaced to the
/// caller untouched. Every variant counts as a failure for the circuit
/// breaker, which is what shields the oracle once errors pile up.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Non-success HTTP status from the oracle, with a truncated body.
    #[error("oracle returned status {0}: {1}")]
    Http(u16, String),

    /// The call exceeded its time budget.
    #[error("oracle request timed out")]
    Timeout,

    /// Transport-level failure, sanitized.
    #[error("oracle connection failed: {0}")]
    Connection(String),

    /// The oracle answered with a body this service cannot decode.
    #[error("invalid oracle response: {0}")]
    InvalidResponse(String),

    /// The in-process concurrency limit toward the oracle was exhausted.
    #[error("oracle concurrency limit reached")]
    ConcurrencyLimit,
}

impl UpstreamError {
    /// Whether retrying (or serving stale data) is a reasonable recovery.
    /// Client-side mistakes (4xx) are permanent and are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) | Self::ConcurrencyLimit => true,
            Self::Http(status, _) => *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

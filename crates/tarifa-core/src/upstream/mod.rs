//! Pricing oracle access and its failure detection.
//!
//! - [`client`]: semaphore-bounded HTTP client performing the actual oracle
//!   calls with a bearer token.
//! - [`circuit_breaker`]: process-local three-phase breaker gating those
//!   calls once the oracle misbehaves.
//! - [`errors`]: the [`UpstreamError`] taxonomy shared by both.

pub mod circuit_breaker;
pub mod client;
pub mod errors;

pub use circuit_breaker::{BreakerConfig, BreakerPhase, CircuitBreaker};
pub use client::{OracleClient, OracleConfig};
pub use errors::UpstreamError;

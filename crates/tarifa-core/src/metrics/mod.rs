//! Metrics recording helpers.
//!
//! Thin wrappers over the `metrics` facade so call sites stay one line and
//! metric names live in one place. Installing an exporter is the host
//! process's concern; without one these calls are no-ops.

use metrics::{counter, histogram};
use std::time::Duration;

pub fn record_cache_hit() {
    counter!("tarifa_cache_hits_total").increment(1);
}

pub fn record_cache_miss() {
    counter!("tarifa_cache_misses_total").increment(1);
}

pub fn record_stale_served(reason: &'static str) {
    counter!("tarifa_stale_served_total", "reason" => reason).increment(1);
}

pub fn record_follower_wait() {
    counter!("tarifa_follower_waits_total").increment(1);
}

pub fn record_published(deliveries: u64) {
    counter!("tarifa_publish_deliveries_total").increment(deliveries);
}

pub fn record_breaker_transition(phase: &'static str) {
    counter!("tarifa_breaker_transitions_total", "phase" => phase).increment(1);
}

pub fn record_oracle_call(elapsed: Duration, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    histogram!("tarifa_oracle_call_seconds", "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}

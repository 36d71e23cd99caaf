//! Deterministic request fingerprinting.
//!
//! Two requests asking the same logical question must share one cache entry
//! no matter how the caller ordered its attribute records or spelled its
//! field names. The fingerprint is a SHA-256 digest over the canonical
//! serialization of the normalized, value-sorted attribute sequence,
//! namespaced under `pricing:`.
//!
//! Normalization rules:
//! - field names are matched case-insensitively (`Period`, `PERIOD` and
//!   `period` are the same field);
//! - unknown fields are discarded;
//! - missing fields are dropped, never defaulted;
//! - records are sorted by the concatenation of their values, with the
//!   serialized form as a stable tie-break.
//!
//! Empty or non-sequence input yields no fingerprint; the adapter
//! short-circuits such requests to an empty result without touching the
//! cache. Fingerprinting is pure and side-effect free.

use crate::types::RateQuery;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Namespace prefix for all pricing cache material.
const NAMESPACE: &str = "pricing";

/// A stable cache key derived from a canonicalized attribute sequence.
///
/// The fingerprint owns the hex digest and derives every persisted key for
/// it, so leader and follower always agree on the key layout:
///
/// | Key | Content |
/// |---|---|
/// | `pricing:<digest>` | fresh cached value |
/// | `pricing:stale:<digest>` | stale fallback copy |
/// | `lock:pricing:<digest>` | lease record |
/// | `waiters:pricing:<digest>` | waiters registry |
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    digest: String,
}

impl Fingerprint {
    /// Key holding the fresh cached value.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("{NAMESPACE}:{}", self.digest)
    }

    /// Key holding the stale fallback copy.
    #[must_use]
    pub fn stale_key(&self) -> String {
        format!("{NAMESPACE}:stale:{}", self.digest)
    }

    /// Key holding the lease record for this fingerprint's critical section.
    #[must_use]
    pub fn lock_key(&self) -> String {
        format!("lock:{NAMESPACE}:{}", self.digest)
    }

    /// Key holding the ordered registry of blocked followers.
    #[must_use]
    pub fn waiters_key(&self) -> String {
        format!("waiters:{NAMESPACE}:{}", self.digest)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{NAMESPACE}:{}", self.digest)
    }
}

/// Derives the fingerprint for a pricing request.
///
/// Returns `None` for empty or non-sequence input; callers must treat that
/// as an empty result and skip the cache entirely.
#[must_use]
pub fn fingerprint(attrs: &Value) -> Option<Fingerprint> {
    let records = attrs.as_array()?;
    if records.is_empty() {
        return None;
    }

    let mut canonical: Vec<(String, String)> = records
        .iter()
        .map(|record| {
            let query = normalize_record(record);
            // Serialization of RateQuery cannot fail: all fields are strings.
            let serialized = serde_json::to_string(&query).unwrap_or_default();
            (query.sort_token(), serialized)
        })
        .collect();

    canonical.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let mut hasher = Sha256::new();
    for (_, serialized) in &canonical {
        hasher.update(serialized.as_bytes());
        hasher.update(b"\n");
    }

    Some(Fingerprint { digest: hex::encode(hasher.finalize()) })
}

/// Normalizes one attribute record to the canonical `{period, hotel, room}`
/// shape. Non-object records normalize to the empty record.
fn normalize_record(record: &Value) -> RateQuery {
    let mut query = RateQuery::default();
    let Some(fields) = record.as_object() else {
        return query;
    };

    for (name, value) in fields {
        let normalized = match value {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match name.to_ascii_lowercase().as_str() {
            "period" => query.period = Some(normalized),
            "hotel" => query.hotel = Some(normalized),
            "room" => query.room = Some(normalized),
            _ => {}
        }
    }

    query
}

//! Domain types shared across the crate.
//!
//! A pricing request is a sequence of attribute records, each identifying a
//! priceable room-slot by `{period, hotel, room}`. The upstream oracle
//! answers with a sequence of [`PricedRate`] records.

use serde::{Deserialize, Serialize};

/// Canonical attribute record identifying a priceable room-slot.
///
/// Produced by normalizing caller input: field names are matched
/// case-insensitively, unknown fields are discarded, and absent fields stay
/// absent rather than defaulting. Serialization skips absent fields so the
/// canonical form is stable regardless of how the caller spelled its keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RateQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

impl RateQuery {
    /// Concatenation of the present attribute values, used as the primary
    /// sort key when canonicalizing a request sequence.
    #[must_use]
    pub fn sort_token(&self) -> String {
        let mut token = String::new();
        for value in [&self.period, &self.hotel, &self.room].into_iter().flatten() {
            token.push_str(value);
        }
        token
    }

    /// Returns `true` if no recognized field carried a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.period.is_none() && self.hotel.is_none() && self.room.is_none()
    }
}

/// One priced room-slot as returned by the upstream oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedRate {
    pub period: String,
    pub hotel: String,
    pub room: String,
    pub price: f64,
}

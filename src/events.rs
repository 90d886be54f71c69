//! Inbound transport events
//!
//! The transport hands the engine two event shapes as JSON: a participant
//! arrival (optionally carrying a referral token) and a membership re-check
//! request. Some transports serialize user ids as strings, so the id field
//! accepts both forms. Unrecognized fields are ignored.

use serde::{Deserialize, Deserializer};

fn flexible_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Num(i64),
        Text(String),
    }

    match IdRepr::deserialize(deserializer)? {
        IdRepr::Num(id) => Ok(id),
        IdRepr::Text(raw) => raw.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// "Participant arrived, possibly following someone's referral link."
#[derive(Debug, Clone, Deserialize)]
pub struct ArrivalEvent {
    #[serde(deserialize_with = "flexible_id")]
    pub user_id: i64,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// "Re-check this user's membership and resolve anything parked on it."
#[derive(Debug, Clone, Deserialize)]
pub struct RecheckEvent {
    #[serde(deserialize_with = "flexible_id")]
    pub user_id: i64,
}

pub fn decode_arrival(raw: &str) -> Result<ArrivalEvent, serde_json::Error> {
    serde_json::from_str(raw)
}

pub fn decode_recheck(raw: &str) -> Result<RecheckEvent, serde_json::Error> {
    serde_json::from_str(raw)
}

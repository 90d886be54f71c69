//! Validation rules
//!
//! Rejection reasons and the flip-flop heuristic. A user who subscribes and
//! unsubscribes repeatedly is farming the membership gate; the signal is the
//! number of adjacent transitions in their recent observation history.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an attribution was refused. Surfaced verbatim to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// Referrer and referred user are the same account.
    SelfReferral,
    /// This referrer/referred pair has already been recorded.
    Duplicate,
    /// The referred user's observation history matches the flip-flop rule.
    Suspicious,
    /// The referred user is banned or fails the membership gate.
    NotEligible,
}

impl RejectionReason {
    pub fn description(&self) -> &'static str {
        match self {
            RejectionReason::SelfReferral => "self-referral is not allowed",
            RejectionReason::Duplicate => "referral already recorded",
            RejectionReason::Suspicious => "suspicious subscription history",
            RejectionReason::NotEligible => "user is not eligible",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Number of adjacent-value transitions in an observation history. The
/// count is the same whether the slice is ordered oldest or newest first.
pub fn flip_flops(history: &[bool]) -> usize {
    history.windows(2).filter(|pair| pair[0] != pair[1]).count()
}

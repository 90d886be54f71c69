//! Membership oracle trait
//!
//! The contest only counts referrals of users who hold a live channel
//! membership. That fact lives in an external service, so every answer is a
//! three-way verdict: the lookup can fail without implying anything about
//! the user.

use async_trait::async_trait;

/// Outcome of a single membership lookup.
///
/// `Unknown` means the oracle could not be reached or did not answer in
/// time. It is never persisted and never treated as `NonMember`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipVerdict {
    Member,
    NonMember,
    Unknown,
}

impl MembershipVerdict {
    pub fn is_member(&self) -> bool {
        matches!(self, MembershipVerdict::Member)
    }

    /// True when the oracle actually answered, one way or the other.
    pub fn is_definitive(&self) -> bool {
        !matches!(self, MembershipVerdict::Unknown)
    }

    pub fn from_flag(is_member: bool) -> Self {
        if is_member {
            MembershipVerdict::Member
        } else {
            MembershipVerdict::NonMember
        }
    }
}

#[async_trait]
pub trait MembershipOracle: Send + Sync {
    /// Current membership standing for the user. Transport and upstream
    /// failures surface as `Unknown`, not as errors.
    async fn is_member(&self, user_id: i64) -> MembershipVerdict;
}

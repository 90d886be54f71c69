//! Outbound notifications
//!
//! The engine tells users about signups, counted referrals, milestone wins,
//! bans and the contest ending. Delivery is someone else's problem: the
//! trait is fire-and-forget and every caller swallows failures, so a broken
//! transport can never stall attribution.

use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// A new participant registered. Sent to the operator, not the user.
    SignedUp { user_id: i64, display_name: String },
    /// One of the recipient's referrals was counted.
    ReferralAccepted { new_count: i64 },
    /// The recipient was first to cross a milestone threshold.
    MilestoneWon { threshold: i64 },
    Banned,
    Unbanned,
    ContestEnded,
    BonusDrawJoined,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: i64, event: NotificationEvent) -> anyhow::Result<()>;
}

/// Default notifier: writes the event to the log and nothing else. Stands
/// in until a real transport is wired up.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, user_id: i64, event: NotificationEvent) -> anyhow::Result<()> {
        info!(user_id = %user_id, event = ?event, "Notification");
        Ok(())
    }
}

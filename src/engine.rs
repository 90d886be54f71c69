//! Referral engine
//!
//! Entry point for transport events. An arrival either attributes the new
//! participant to a referrer, parks the attribution until membership can be
//! confirmed, or rejects it with a reason; a re-check resolves parked
//! attributions once the user's membership settles. Operator actions and
//! stats queries live here too so transports never touch the store
//! directly.

use crate::anticheat::{AntiCheatEngine, RejectionReason};
use crate::cache::CacheService;
use crate::config::ContestConfig;
use crate::contest::{referral_token, salted_referral_token, ContestSchedule, MilestoneTracker};
use crate::database::{ContestStats, Database, User};
use crate::error::{EngineError, EngineResult, StoreError};
use crate::events::{ArrivalEvent, RecheckEvent};
use crate::membership::MembershipGate;
use crate::notifier::{NotificationEvent, Notifier};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Salted retries after the deterministic token collides.
const TOKEN_RETRY_ATTEMPTS: usize = 4;

/// What the transport should tell the participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrivalOutcome {
    /// The referral was counted; the referrer's counter now reads `new_count`.
    Accepted { referrer_id: i64, new_count: i64 },
    Rejected(RejectionReason),
    /// Parked until a membership re-check succeeds.
    Pending,
    /// Nothing to attribute: no token, or a token nobody owns.
    Unattributed,
}

pub struct ReferralEngine {
    db: Arc<Database>,
    caches: Arc<CacheService>,
    gate: Arc<MembershipGate>,
    anticheat: Arc<AntiCheatEngine>,
    milestones: Arc<MilestoneTracker>,
    schedule: Arc<ContestSchedule>,
    notifier: Arc<dyn Notifier>,
    config: ContestConfig,
}

impl ReferralEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        caches: Arc<CacheService>,
        gate: Arc<MembershipGate>,
        anticheat: Arc<AntiCheatEngine>,
        milestones: Arc<MilestoneTracker>,
        schedule: Arc<ContestSchedule>,
        notifier: Arc<dyn Notifier>,
        config: ContestConfig,
    ) -> Self {
        Self {
            db,
            caches,
            gate,
            anticheat,
            milestones,
            schedule,
            notifier,
            config,
        }
    }

    /// Handle "participant arrived, possibly with a referral token."
    pub async fn handle_arrival(&self, event: ArrivalEvent) -> EngineResult<ArrivalOutcome> {
        let user = self.ensure_user(event.user_id, &event.display_name).await?;

        let Some(token) = event.token else {
            return Ok(ArrivalOutcome::Unattributed);
        };

        let Some(referrer) = self.db.users().find_by_token(token.trim()).await? else {
            debug!(user_id = %user.user_id, "Arrival carried a token nobody owns");
            return Ok(ArrivalOutcome::Unattributed);
        };

        if let Some(reason) = self.anticheat.precheck(referrer.user_id, user.user_id).await? {
            debug!(
                referrer_id = %referrer.user_id,
                referred_id = %user.user_id,
                reason = %reason,
                "Attribution rejected before the membership check"
            );
            return Ok(ArrivalOutcome::Rejected(reason));
        }

        let verdict = self.gate.force_check(user.user_id).await;
        if !verdict.is_member() {
            // Not a member yet, or the oracle is down. Park the attribution;
            // a later re-check resolves it.
            self.db
                .contest()
                .upsert_pending(user.user_id, referrer.user_id, Utc::now())
                .await?;
            info!(
                referrer_id = %referrer.user_id,
                referred_id = %user.user_id,
                verdict = ?verdict,
                "Attribution parked pending membership"
            );
            return Ok(ArrivalOutcome::Pending);
        }

        self.attribute(referrer.user_id, user.user_id).await
    }

    /// Handle "re-check this user's membership." Resolves a parked
    /// attribution when the user turns out to be a member.
    pub async fn handle_recheck(&self, event: RecheckEvent) -> EngineResult<ArrivalOutcome> {
        let user = self.ensure_user(event.user_id, "").await?;
        let verdict = self.gate.force_check(user.user_id).await;

        if verdict.is_member() {
            let Some(referrer_id) = self.db.contest().get_pending(user.user_id).await? else {
                return Ok(ArrivalOutcome::Unattributed);
            };
            return self.attribute(referrer_id, user.user_id).await;
        }

        if self.db.contest().get_pending(user.user_id).await?.is_some() {
            return Ok(ArrivalOutcome::Pending);
        }
        Ok(ArrivalOutcome::Unattributed)
    }

    /// Fetch the user, creating the account on first contact. New accounts
    /// get a referral token; the operator is told about the signup.
    pub async fn ensure_user(&self, user_id: i64, display_name: &str) -> EngineResult<User> {
        if let Some(user) = self.caches.get_user(user_id).await {
            return Ok(user);
        }
        if let Some(user) = self.db.users().get(user_id).await? {
            self.caches.put_user(user.clone()).await;
            return Ok(user);
        }

        let display_name = match display_name.trim() {
            "" => format!("user{}", user_id),
            name => name.to_string(),
        };

        let user = self.create_user(user_id, &display_name).await?;
        self.caches.put_user(user.clone()).await;

        info!(user_id = %user_id, display_name = %user.display_name, "New participant registered");
        if let Some(operator_id) = self.config.operator_id {
            self.notify(
                operator_id,
                NotificationEvent::SignedUp {
                    user_id,
                    display_name: user.display_name.clone(),
                },
            )
            .await;
        }

        Ok(user)
    }

    async fn create_user(&self, user_id: i64, display_name: &str) -> EngineResult<User> {
        let token = referral_token(&self.config.token_secret, user_id);
        match self.db.users().create(user_id, display_name, &token).await {
            Ok(user) => return Ok(user),
            Err(StoreError::Conflict { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        // Conflict: either another worker registered this user first, or the
        // token digest collided with an existing account.
        for _ in 0..TOKEN_RETRY_ATTEMPTS {
            if let Some(user) = self.db.users().get(user_id).await? {
                return Ok(user);
            }
            let token = salted_referral_token(&self.config.token_secret, user_id);
            match self.db.users().create(user_id, display_name, &token).await {
                Ok(user) => return Ok(user),
                Err(StoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        warn!(user_id = %user_id, "Could not allocate a referral token");
        Err(EngineError::TokenAllocation { user_id })
    }

    /// Record the edge and everything that hangs off it. Callers have
    /// already confirmed the referred user is currently a member.
    async fn attribute(&self, referrer_id: i64, referred_id: i64) -> EngineResult<ArrivalOutcome> {
        if let Some(reason) = self
            .anticheat
            .validate_attribution(referrer_id, referred_id)
            .await?
        {
            // A surfaced rejection resolves any parked attribution for this
            // user; only a Pending outcome leaves the row behind.
            self.db.contest().delete_pending(referred_id).await?;
            debug!(
                referrer_id = %referrer_id,
                referred_id = %referred_id,
                reason = %reason,
                "Attribution rejected"
            );
            return Ok(ArrivalOutcome::Rejected(reason));
        }

        let new_count = match self
            .db
            .referrals()
            .record_edge(referrer_id, referred_id, Utc::now())
            .await
        {
            Ok(count) => count,
            Err(StoreError::Conflict { .. }) => {
                // Lost a race with a concurrent submission of the same pair.
                self.db.contest().delete_pending(referred_id).await?;
                return Ok(ArrivalOutcome::Rejected(RejectionReason::Duplicate));
            }
            Err(e) => return Err(e.into()),
        };

        self.caches.invalidate_user(referrer_id).await;
        self.db.contest().delete_pending(referred_id).await?;

        info!(
            referrer_id = %referrer_id,
            referred_id = %referred_id,
            new_count = new_count,
            "Referral attributed"
        );
        self.notify(referrer_id, NotificationEvent::ReferralAccepted { new_count })
            .await;

        for threshold in self.milestones.check_and_assign(referrer_id, new_count).await? {
            self.notify(referrer_id, NotificationEvent::MilestoneWon { threshold })
                .await;
        }

        Ok(ArrivalOutcome::Accepted {
            referrer_id,
            new_count,
        })
    }

    /// Operator action: ban or unban an account. Returns false when the
    /// flag already had that value; the user is notified only on change.
    pub async fn set_ban(&self, user_id: i64, banned: bool) -> EngineResult<bool> {
        let changed = self.db.users().set_banned(user_id, banned).await?;
        if changed {
            self.caches.invalidate_user_all(user_id).await;
            info!(user_id = %user_id, banned = banned, "Ban flag changed");
            let event = if banned {
                NotificationEvent::Banned
            } else {
                NotificationEvent::Unbanned
            };
            self.notify(user_id, event).await;
        }
        Ok(changed)
    }

    /// Enter the user into the bonus draw. Joining is idempotent and the
    /// confirmation is sent at most once, even across crashes.
    pub async fn join_bonus_draw(&self, user_id: i64) -> EngineResult<bool> {
        self.ensure_user(user_id, "").await?;
        let joined = self.db.contest().join_bonus_draw(user_id, Utc::now()).await?;
        if self.db.contest().claim_bonus_draw_notice(user_id).await? {
            self.notify(user_id, NotificationEvent::BonusDrawJoined).await;
        }
        Ok(joined)
    }

    pub async fn get_user(&self, user_id: i64) -> EngineResult<Option<User>> {
        if let Some(user) = self.caches.get_user(user_id).await {
            return Ok(Some(user));
        }
        let user = self.db.users().get(user_id).await?;
        if let Some(ref user) = user {
            self.caches.put_user(user.clone()).await;
        }
        Ok(user)
    }

    pub async fn top_referrers(&self, limit: i64) -> EngineResult<Vec<User>> {
        Ok(self.db.users().top_referrers(limit).await?)
    }

    pub async fn prize_leaderboard(&self, limit: i64) -> EngineResult<Vec<User>> {
        Ok(self
            .db
            .users()
            .prize_leaderboard(self.config.min_prize_referrals, limit)
            .await?)
    }

    pub async fn contest_stats(&self) -> EngineResult<ContestStats> {
        Ok(self.db.users().contest_stats().await?)
    }

    pub async fn bonus_draw_entrants(&self) -> EngineResult<Vec<i64>> {
        Ok(self.db.contest().bonus_draw_entrants().await?)
    }

    /// Operator action: wipe the schedule and milestone winners and start a
    /// fresh contest. Referral counters and edges are left in place; cached
    /// reads are dropped so the first reads of the new contest hit the store.
    pub async fn reset_contest(&self) -> EngineResult<()> {
        self.schedule.reset().await?;
        self.caches.clear_all().await;
        Ok(())
    }

    async fn notify(&self, user_id: i64, event: NotificationEvent) {
        if let Err(e) = self.notifier.notify(user_id, event).await {
            warn!(user_id = %user_id, error = %e, "Notification failed");
        }
    }
}

//! Background reconciler
//!
//! Periodically audits what the hot path takes on faith. The validation
//! pass re-checks a bounded sample of top referrers and claws back edges
//! whose referred users lost membership; the slower housekeeping pass
//! purges stale cache entries, bans flip-floppers and fires the
//! end-of-contest broadcast. Every pass is bounded and best-effort; one
//! user's failure never aborts the batch.

use crate::anticheat::AntiCheatEngine;
use crate::cache::CacheService;
use crate::config::ReconcilerConfig;
use crate::contest::ContestSchedule;
use crate::database::Database;
use crate::error::StoreResult;
use crate::membership::MembershipGate;
use crate::notifier::{NotificationEvent, Notifier};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Pause between end-of-contest broadcast batches.
const BROADCAST_BATCH_PAUSE: Duration = Duration::from_millis(100);

pub struct Reconciler {
    db: Arc<Database>,
    caches: Arc<CacheService>,
    gate: Arc<MembershipGate>,
    anticheat: Arc<AntiCheatEngine>,
    schedule: Arc<ContestSchedule>,
    notifier: Arc<dyn Notifier>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        db: Arc<Database>,
        caches: Arc<CacheService>,
        gate: Arc<MembershipGate>,
        anticheat: Arc<AntiCheatEngine>,
        schedule: Arc<ContestSchedule>,
        notifier: Arc<dyn Notifier>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            db,
            caches,
            gate,
            anticheat,
            schedule,
            notifier,
            config,
        }
    }

    /// Run both passes on their configured periods until the process exits.
    /// The first tick of each is delayed by a full period so startup does
    /// not hammer the oracle.
    pub async fn run(&self) {
        let validation_period = Duration::from_secs(self.config.interval_secs);
        let housekeeping_period = Duration::from_secs(self.config.housekeeping_interval_secs);
        let mut validation =
            tokio::time::interval_at(Instant::now() + validation_period, validation_period);
        let mut housekeeping =
            tokio::time::interval_at(Instant::now() + housekeeping_period, housekeeping_period);

        info!(
            validation_secs = self.config.interval_secs,
            housekeeping_secs = self.config.housekeeping_interval_secs,
            "Reconciler started"
        );

        loop {
            tokio::select! {
                _ = validation.tick() => {
                    if let Err(e) = self.validation_pass().await {
                        error!(error = %e, "Validation pass failed");
                    }
                }
                _ = housekeeping.tick() => {
                    if let Err(e) = self.housekeeping_pass().await {
                        error!(error = %e, "Housekeeping pass failed");
                    }
                }
            }
        }
    }

    /// Re-check membership for the top referrers and invalidate edges whose
    /// referred users are no longer eligible.
    pub async fn validation_pass(&self) -> StoreResult<()> {
        let sample = self.db.users().top_referrers(self.config.top_sample).await?;
        debug!(sample = sample.len(), "Validation pass started");

        for user in sample {
            if let Err(e) = self.revalidate_referrer(user.user_id).await {
                error!(user_id = %user.user_id, error = %e, "Referrer revalidation failed");
            }
        }

        Ok(())
    }

    async fn revalidate_referrer(&self, referrer_id: i64) -> StoreResult<()> {
        let verdict = self.gate.force_check(referrer_id).await;
        if verdict.is_member() || !verdict.is_definitive() {
            // Still a member, or the oracle is down; either way nothing to
            // claw back on this pass.
            return Ok(());
        }

        let referred = self
            .db
            .referrals()
            .valid_referred_ids(referrer_id, self.config.edge_sample)
            .await?;

        for referred_id in referred {
            let verdict = self.gate.force_check(referred_id).await;
            if !verdict.is_definitive() || verdict.is_member() {
                continue;
            }
            if self
                .db
                .referrals()
                .invalidate_edge(referrer_id, referred_id)
                .await?
            {
                self.caches.invalidate_user(referrer_id).await;
                info!(
                    referrer_id = %referrer_id,
                    referred_id = %referred_id,
                    "Invalidated referral edge after membership loss"
                );
            }
        }

        Ok(())
    }

    /// Slow-path maintenance: cache purge, flip-flop bans and the contest
    /// expiry check.
    pub async fn housekeeping_pass(&self) -> StoreResult<()> {
        self.caches.purge_expired().await;

        let sample = self.db.users().top_referrers(self.config.top_sample).await?;
        for user in sample {
            match self.anticheat.scan_user(user.user_id).await {
                Ok(true) => self.notify(user.user_id, NotificationEvent::Banned).await,
                Ok(false) => {}
                Err(e) => error!(user_id = %user.user_id, error = %e, "Account scan failed"),
            }
        }

        self.check_contest_end().await
    }

    /// Fire the end-of-contest broadcast exactly once, in paced batches so
    /// a large roster does not flood the notifier.
    async fn check_contest_end(&self) -> StoreResult<()> {
        if !self.schedule.is_ended().await? {
            return Ok(());
        }
        if !self.schedule.claim_end_notification().await? {
            return Ok(());
        }

        let ids = self.db.users().all_ids().await?;
        info!(participants = ids.len(), "Contest ended, broadcasting");

        for batch in ids.chunks(self.config.broadcast_batch) {
            for &user_id in batch {
                self.notify(user_id, NotificationEvent::ContestEnded).await;
            }
            tokio::time::sleep(BROADCAST_BATCH_PAUSE).await;
        }

        Ok(())
    }

    async fn notify(&self, user_id: i64, event: NotificationEvent) {
        if let Err(e) = self.notifier.notify(user_id, event).await {
            warn!(user_id = %user_id, error = %e, "Notification failed");
        }
    }
}

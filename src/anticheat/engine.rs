//! Anti-cheat engine
//!
//! Gatekeeper for attributions. Rules run cheapest-first: identity and edge
//! checks hit only the store, the flip-flop rule reads the observation log,
//! and the membership gate is consulted last. The same flip-flop rule that
//! rejects an attribution also drives standalone account scans.

use crate::anticheat::rules::{flip_flops, RejectionReason};
use crate::cache::CacheService;
use crate::config::AntiCheatConfig;
use crate::database::Database;
use crate::error::StoreResult;
use crate::membership::MembershipGate;
use std::sync::Arc;
use tracing::{debug, info};

pub struct AntiCheatEngine {
    db: Arc<Database>,
    caches: Arc<CacheService>,
    gate: Arc<MembershipGate>,
    config: AntiCheatConfig,
}

impl AntiCheatEngine {
    pub fn new(
        db: Arc<Database>,
        caches: Arc<CacheService>,
        gate: Arc<MembershipGate>,
        config: AntiCheatConfig,
    ) -> Self {
        Self {
            db,
            caches,
            gate,
            config,
        }
    }

    /// Store-only rules, evaluated before any oracle traffic. Returns the
    /// first violated rule, or None when the pair is clean so far.
    pub async fn precheck(
        &self,
        referrer_id: i64,
        referred_id: i64,
    ) -> StoreResult<Option<RejectionReason>> {
        if referrer_id == referred_id {
            return Ok(Some(RejectionReason::SelfReferral));
        }

        if self.db.referrals().edge_exists(referrer_id, referred_id).await? {
            return Ok(Some(RejectionReason::Duplicate));
        }

        if self.is_suspicious(referred_id).await? {
            return Ok(Some(RejectionReason::Suspicious));
        }

        if self.is_banned(referred_id).await? || self.is_banned(referrer_id).await? {
            return Ok(Some(RejectionReason::NotEligible));
        }

        Ok(None)
    }

    /// Full rule set for the moment an edge is about to be recorded. On top
    /// of `precheck`, the referred user must currently pass the membership
    /// gate; an oracle failure here counts as not eligible.
    pub async fn validate_attribution(
        &self,
        referrer_id: i64,
        referred_id: i64,
    ) -> StoreResult<Option<RejectionReason>> {
        if let Some(reason) = self.precheck(referrer_id, referred_id).await? {
            return Ok(Some(reason));
        }

        let verdict = self.gate.check(referred_id).await;
        if !verdict.is_member() {
            debug!(
                user_id = %referred_id,
                verdict = ?verdict,
                "Referred user failed the membership gate"
            );
            return Ok(Some(RejectionReason::NotEligible));
        }

        Ok(None)
    }

    /// Flip-flop rule over the user's recent observation history.
    pub async fn is_suspicious(&self, user_id: i64) -> StoreResult<bool> {
        let history = self
            .db
            .observations()
            .recent(user_id, self.config.observation_window as i64)
            .await?;
        Ok(flip_flops(&history) >= self.config.flip_flop_threshold)
    }

    /// Ban flag with a cache read-through. Missing users count as not banned.
    pub async fn is_banned(&self, user_id: i64) -> StoreResult<bool> {
        if let Some(banned) = self.caches.get_ban(user_id).await {
            return Ok(banned);
        }
        let banned = self.db.users().is_banned(user_id).await?.unwrap_or(false);
        self.caches.put_ban(user_id, banned).await;
        Ok(banned)
    }

    /// Standalone account scan used outside the attribution path. Bans the
    /// user when their history meets the flip-flop rule; returns true only
    /// on the transition so the caller can notify exactly once.
    pub async fn scan_user(&self, user_id: i64) -> StoreResult<bool> {
        if !self.is_suspicious(user_id).await? {
            return Ok(false);
        }

        let changed = self.db.users().set_banned(user_id, true).await?;
        if changed {
            self.caches.invalidate_user_all(user_id).await;
            info!(user_id = %user_id, "Banned account for membership flip-flopping");
        }
        Ok(changed)
    }
}

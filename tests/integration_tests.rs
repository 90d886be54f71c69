//! Integration tests for the Clover referral engine
//!
//! These tests verify end-to-end behavior of the engine: attribution and
//! its rejections, pending resolution, anti-cheat rules, milestone awards,
//! cache invalidation, background reconciliation and operator actions.

use async_trait::async_trait;
use chrono::Utc;
use clover_engine::config::EngineConfig;
use clover_engine::{
    AntiCheatEngine, ArrivalEvent, ArrivalOutcome, CacheService, ContestSchedule, Database,
    MembershipGate, MembershipOracle, MembershipVerdict, MilestoneTracker, NotificationEvent,
    Notifier, RecheckEvent, Reconciler, ReferralEngine, RejectionReason,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

const OPERATOR_ID: i64 = 999;

// ============================================================================
// Test Helpers
// ============================================================================

/// Scriptable membership oracle. Users without a configured verdict look
/// like an oracle outage.
struct TestOracle {
    verdicts: RwLock<HashMap<i64, MembershipVerdict>>,
}

impl TestOracle {
    fn new() -> Self {
        Self {
            verdicts: RwLock::new(HashMap::new()),
        }
    }

    async fn set(&self, user_id: i64, verdict: MembershipVerdict) {
        self.verdicts.write().await.insert(user_id, verdict);
    }
}

#[async_trait]
impl MembershipOracle for TestOracle {
    async fn is_member(&self, user_id: i64) -> MembershipVerdict {
        self.verdicts
            .read()
            .await
            .get(&user_id)
            .copied()
            .unwrap_or(MembershipVerdict::Unknown)
    }
}

/// Notifier that records every event for later assertions.
struct CollectingNotifier {
    events: Mutex<Vec<(i64, NotificationEvent)>>,
}

impl CollectingNotifier {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    fn recorded(&self) -> Vec<(i64, NotificationEvent)> {
        self.events.lock().unwrap().clone()
    }

    fn count_for(&self, user_id: i64, matches: impl Fn(&NotificationEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, event)| *id == user_id && matches(event))
            .count()
    }
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn notify(&self, user_id: i64, event: NotificationEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push((user_id, event));
        Ok(())
    }
}

fn arrival(user_id: i64, display_name: &str, token: Option<&str>) -> ArrivalEvent {
    ArrivalEvent {
        user_id,
        display_name: display_name.to_string(),
        token: token.map(str::to_string),
    }
}

/// Fully wired engine over an in-memory store.
struct Harness {
    db: Arc<Database>,
    oracle: Arc<TestOracle>,
    notifier: Arc<CollectingNotifier>,
    gate: Arc<MembershipGate>,
    anticheat: Arc<AntiCheatEngine>,
    engine: ReferralEngine,
    reconciler: Reconciler,
}

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.contest.operator_id = Some(OPERATOR_ID);
    config
}

async fn harness() -> Harness {
    harness_with(test_config()).await
}

async fn harness_with(config: EngineConfig) -> Harness {
    let db = Arc::new(Database::connect_in_memory().await.unwrap());
    db.init_schema().await.unwrap();

    let caches = Arc::new(CacheService::new(&config.caches, &config.membership));
    let oracle = Arc::new(TestOracle::new());
    let gate = Arc::new(MembershipGate::new(
        oracle.clone(),
        db.clone(),
        caches.clone(),
        Duration::from_secs(5),
    ));
    let anticheat = Arc::new(AntiCheatEngine::new(
        db.clone(),
        caches.clone(),
        gate.clone(),
        config.anticheat.clone(),
    ));
    let milestones = Arc::new(MilestoneTracker::new(db.clone(), &config.contest.milestones));
    milestones.seed().await.unwrap();
    let schedule = Arc::new(ContestSchedule::new(db.clone(), config.contest.duration_days));
    schedule.ensure_started().await.unwrap();
    let notifier = Arc::new(CollectingNotifier::new());

    let engine = ReferralEngine::new(
        db.clone(),
        caches.clone(),
        gate.clone(),
        anticheat.clone(),
        milestones,
        schedule.clone(),
        notifier.clone(),
        config.contest.clone(),
    );
    let reconciler = Reconciler::new(
        db.clone(),
        caches,
        gate.clone(),
        anticheat.clone(),
        schedule,
        notifier.clone(),
        config.reconciler.clone(),
    );

    Harness {
        db,
        oracle,
        notifier,
        gate,
        anticheat,
        engine,
        reconciler,
    }
}

impl Harness {
    /// Register a user through the arrival path and return their token.
    async fn register(&self, user_id: i64, display_name: &str) -> String {
        let user = self.engine.ensure_user(user_id, display_name).await.unwrap();
        user.referral_token
    }

    /// Walk `referred_id` through a member arrival with the referrer's token.
    async fn refer(&self, referrer_id: i64, referred_id: i64) -> ArrivalOutcome {
        let token = self.register(referrer_id, "").await;
        self.oracle.set(referred_id, MembershipVerdict::Member).await;
        self.engine
            .handle_arrival(arrival(referred_id, "", Some(&token)))
            .await
            .unwrap()
    }
}

// ============================================================================
// Attribution Flow Tests
// ============================================================================

mod attribution {
    use super::*;

    #[tokio::test]
    async fn test_member_arrival_is_attributed() {
        let h = harness().await;

        let outcome = h.refer(1, 2).await;
        assert_eq!(
            outcome,
            ArrivalOutcome::Accepted {
                referrer_id: 1,
                new_count: 1
            }
        );

        let referrer = h.db.users().get(1).await.unwrap().unwrap();
        assert_eq!(referrer.referral_count, 1);
    }

    #[tokio::test]
    async fn test_arrival_without_token_unattributed() {
        let h = harness().await;

        let outcome = h.engine.handle_arrival(arrival(1, "ada", None)).await.unwrap();
        assert_eq!(outcome, ArrivalOutcome::Unattributed);
        assert!(h.db.users().get(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_token_unattributed() {
        let h = harness().await;
        h.oracle.set(2, MembershipVerdict::Member).await;

        let outcome = h
            .engine
            .handle_arrival(arrival(2, "", Some("ZZZZ9999")))
            .await
            .unwrap();
        assert_eq!(outcome, ArrivalOutcome::Unattributed);
    }

    #[tokio::test]
    async fn test_self_referral_rejected() {
        let h = harness().await;
        let token = h.register(1, "ada").await;
        h.oracle.set(1, MembershipVerdict::Member).await;

        let outcome = h
            .engine
            .handle_arrival(arrival(1, "ada", Some(&token)))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ArrivalOutcome::Rejected(RejectionReason::SelfReferral)
        );
    }

    #[tokio::test]
    async fn test_duplicate_attribution_counts_once() {
        let h = harness().await;
        h.refer(1, 2).await;

        let token = h.db.users().get(1).await.unwrap().unwrap().referral_token;
        let outcome = h
            .engine
            .handle_arrival(arrival(2, "", Some(&token)))
            .await
            .unwrap();

        assert_eq!(outcome, ArrivalOutcome::Rejected(RejectionReason::Duplicate));
        let referrer = h.db.users().get(1).await.unwrap().unwrap();
        assert_eq!(referrer.referral_count, 1, "Counter must not double-count");
    }

    #[tokio::test]
    async fn test_counter_tracks_valid_edges() {
        let h = harness().await;
        h.refer(1, 2).await;
        h.refer(1, 3).await;
        h.refer(1, 4).await;

        h.db.referrals().invalidate_edge(1, 3).await.unwrap();

        let referrer = h.db.users().get(1).await.unwrap().unwrap();
        let valid = h.db.referrals().count_valid(1).await.unwrap();
        assert_eq!(referrer.referral_count, valid);
        assert_eq!(valid, 2);
    }

    #[tokio::test]
    async fn test_signup_allocates_token_and_default_name() {
        let h = harness().await;

        let token = h.register(5, "").await;
        assert_eq!(token.len(), 8);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));

        let user = h.db.users().get(5).await.unwrap().unwrap();
        assert_eq!(user.display_name, "user5");
    }

    #[tokio::test]
    async fn test_signup_notifies_operator_once() {
        let h = harness().await;

        h.register(5, "ada").await;
        h.register(5, "ada").await;

        let signups = h.notifier.count_for(OPERATOR_ID, |event| {
            matches!(event, NotificationEvent::SignedUp { user_id: 5, .. })
        });
        assert_eq!(signups, 1);
    }

    #[tokio::test]
    async fn test_attribution_notification_sequence() {
        let h = harness().await;
        h.refer(1, 2).await;

        // Two signups to the operator, then the referrer's acceptance notice.
        assert_eq!(
            h.notifier.recorded(),
            vec![
                (
                    OPERATOR_ID,
                    NotificationEvent::SignedUp {
                        user_id: 1,
                        display_name: "user1".to_string(),
                    }
                ),
                (
                    OPERATOR_ID,
                    NotificationEvent::SignedUp {
                        user_id: 2,
                        display_name: "user2".to_string(),
                    }
                ),
                (1, NotificationEvent::ReferralAccepted { new_count: 1 }),
            ]
        );
    }
}

// ============================================================================
// Pending Attribution Tests
// ============================================================================

mod pending {
    use super::*;

    #[tokio::test]
    async fn test_nonmember_arrival_parked() {
        let h = harness().await;
        let token = h.register(1, "").await;
        h.oracle.set(2, MembershipVerdict::NonMember).await;

        let outcome = h
            .engine
            .handle_arrival(arrival(2, "", Some(&token)))
            .await
            .unwrap();

        assert_eq!(outcome, ArrivalOutcome::Pending);
        assert_eq!(h.db.contest().get_pending(2).await.unwrap(), Some(1));
        let referrer = h.db.users().get(1).await.unwrap().unwrap();
        assert_eq!(referrer.referral_count, 0, "Parked arrivals must not count");
    }

    #[tokio::test]
    async fn test_oracle_outage_parks_without_observation() {
        let h = harness().await;
        let token = h.register(1, "").await;
        // No verdict configured for user 2: the oracle answers Unknown.

        let outcome = h
            .engine
            .handle_arrival(arrival(2, "", Some(&token)))
            .await
            .unwrap();

        assert_eq!(outcome, ArrivalOutcome::Pending);
        let history = h.db.observations().recent(2, 10).await.unwrap();
        assert!(history.is_empty(), "Outages must not pollute the observation log");
    }

    #[tokio::test]
    async fn test_recheck_resolves_pending() {
        let h = harness().await;
        let token = h.register(1, "").await;
        h.oracle.set(2, MembershipVerdict::NonMember).await;
        h.engine
            .handle_arrival(arrival(2, "", Some(&token)))
            .await
            .unwrap();

        h.oracle.set(2, MembershipVerdict::Member).await;
        let outcome = h
            .engine
            .handle_recheck(RecheckEvent { user_id: 2 })
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ArrivalOutcome::Accepted {
                referrer_id: 1,
                new_count: 1
            }
        );
        assert_eq!(h.db.contest().get_pending(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_recheck_still_nonmember_stays_pending() {
        let h = harness().await;
        let token = h.register(1, "").await;
        h.oracle.set(2, MembershipVerdict::NonMember).await;
        h.engine
            .handle_arrival(arrival(2, "", Some(&token)))
            .await
            .unwrap();

        let outcome = h
            .engine
            .handle_recheck(RecheckEvent { user_id: 2 })
            .await
            .unwrap();

        assert_eq!(outcome, ArrivalOutcome::Pending);
        assert_eq!(h.db.contest().get_pending(2).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_recheck_without_pending_unattributed() {
        let h = harness().await;
        h.oracle.set(3, MembershipVerdict::Member).await;

        let outcome = h
            .engine
            .handle_recheck(RecheckEvent { user_id: 3 })
            .await
            .unwrap();
        assert_eq!(outcome, ArrivalOutcome::Unattributed);
    }

    #[tokio::test]
    async fn test_rejected_recheck_resolves_pending() {
        let h = harness().await;
        let token = h.register(1, "").await;
        h.oracle.set(2, MembershipVerdict::NonMember).await;
        h.engine
            .handle_arrival(arrival(2, "", Some(&token)))
            .await
            .unwrap();
        assert_eq!(h.db.contest().get_pending(2).await.unwrap(), Some(1));

        h.engine.set_ban(1, true).await.unwrap();
        h.oracle.set(2, MembershipVerdict::Member).await;

        let outcome = h
            .engine
            .handle_recheck(RecheckEvent { user_id: 2 })
            .await
            .unwrap();
        assert_eq!(outcome, ArrivalOutcome::Rejected(RejectionReason::NotEligible));
        assert_eq!(
            h.db.contest().get_pending(2).await.unwrap(),
            None,
            "A surfaced rejection resolves the parked attribution"
        );

        // Lifting the ban later must not revive the attribution the caller
        // already saw rejected.
        h.engine.set_ban(1, false).await.unwrap();
        let outcome = h
            .engine
            .handle_recheck(RecheckEvent { user_id: 2 })
            .await
            .unwrap();
        assert_eq!(outcome, ArrivalOutcome::Unattributed);
        let referrer = h.db.users().get(1).await.unwrap().unwrap();
        assert_eq!(referrer.referral_count, 0);
    }

    #[tokio::test]
    async fn test_new_token_replaces_parked_referrer() {
        let h = harness().await;
        let first = h.register(1, "").await;
        let second = h.register(3, "").await;
        h.oracle.set(2, MembershipVerdict::NonMember).await;

        h.engine
            .handle_arrival(arrival(2, "", Some(&first)))
            .await
            .unwrap();
        h.engine
            .handle_arrival(arrival(2, "", Some(&second)))
            .await
            .unwrap();

        assert_eq!(h.db.contest().get_pending(2).await.unwrap(), Some(3));
    }
}

// ============================================================================
// Anti-Cheat Tests
// ============================================================================

mod anticheat {
    use super::*;

    #[tokio::test]
    async fn test_flip_flop_history_rejected() {
        let h = harness().await;
        let token = h.register(1, "").await;
        for is_member in [true, false, true, false] {
            h.db.observations().record(2, is_member, Utc::now()).await.unwrap();
        }
        h.oracle.set(2, MembershipVerdict::Member).await;

        let outcome = h
            .engine
            .handle_arrival(arrival(2, "", Some(&token)))
            .await
            .unwrap();
        assert_eq!(outcome, ArrivalOutcome::Rejected(RejectionReason::Suspicious));
    }

    #[tokio::test]
    async fn test_stable_history_accepted() {
        let h = harness().await;
        let token = h.register(1, "").await;
        for _ in 0..5 {
            h.db.observations().record(2, true, Utc::now()).await.unwrap();
        }
        h.oracle.set(2, MembershipVerdict::Member).await;

        let outcome = h
            .engine
            .handle_arrival(arrival(2, "", Some(&token)))
            .await
            .unwrap();
        assert!(matches!(outcome, ArrivalOutcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn test_banned_referrer_rejected() {
        let h = harness().await;
        let token = h.register(1, "").await;
        h.engine.set_ban(1, true).await.unwrap();
        h.oracle.set(2, MembershipVerdict::Member).await;

        let outcome = h
            .engine
            .handle_arrival(arrival(2, "", Some(&token)))
            .await
            .unwrap();
        assert_eq!(outcome, ArrivalOutcome::Rejected(RejectionReason::NotEligible));
    }

    #[tokio::test]
    async fn test_banned_referred_user_rejected() {
        let h = harness().await;
        let token = h.register(1, "").await;
        h.register(2, "").await;
        h.engine.set_ban(2, true).await.unwrap();
        h.oracle.set(2, MembershipVerdict::Member).await;

        let outcome = h
            .engine
            .handle_arrival(arrival(2, "", Some(&token)))
            .await
            .unwrap();
        assert_eq!(outcome, ArrivalOutcome::Rejected(RejectionReason::NotEligible));
    }

    #[tokio::test]
    async fn test_ban_notifies_on_change_only() {
        let h = harness().await;
        h.register(1, "").await;

        assert!(h.engine.set_ban(1, true).await.unwrap());
        assert!(!h.engine.set_ban(1, true).await.unwrap());
        assert!(h.engine.set_ban(1, false).await.unwrap());

        let bans = h
            .notifier
            .count_for(1, |event| matches!(event, NotificationEvent::Banned));
        let unbans = h
            .notifier
            .count_for(1, |event| matches!(event, NotificationEvent::Unbanned));
        assert_eq!(bans, 1);
        assert_eq!(unbans, 1);
    }
}

// ============================================================================
// Milestone Tests
// ============================================================================

mod milestones {
    use super::*;

    #[tokio::test]
    async fn test_crossing_awards_and_notifies() {
        let mut config = test_config();
        config.contest.milestones = vec![1];
        let h = harness_with(config).await;

        h.refer(1, 2).await;

        let wins = h.notifier.count_for(1, |event| {
            matches!(event, NotificationEvent::MilestoneWon { threshold: 1 })
        });
        assert_eq!(wins, 1);
        assert_eq!(h.db.contest().milestone_winner(1).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_second_crosser_wins_nothing() {
        let mut config = test_config();
        config.contest.milestones = vec![1];
        let h = harness_with(config).await;

        h.refer(1, 2).await;
        h.refer(3, 4).await;

        assert_eq!(h.db.contest().milestone_winner(1).await.unwrap(), Some(1));
        let wins = h.notifier.count_for(3, |event| {
            matches!(event, NotificationEvent::MilestoneWon { .. })
        });
        assert_eq!(wins, 0);
    }

    #[tokio::test]
    async fn test_concurrent_crossings_single_winner() {
        let db = Arc::new(Database::connect_in_memory().await.unwrap());
        db.init_schema().await.unwrap();
        let tracker = Arc::new(MilestoneTracker::new(db.clone(), &[10]));
        tracker.seed().await.unwrap();

        let mut handles = Vec::new();
        for user_id in 1..=8 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                tracker.check_and_assign(user_id, 10).await.unwrap()
            }));
        }

        let mut total_wins = 0;
        for handle in handles {
            total_wins += handle.await.unwrap().len();
        }

        assert_eq!(total_wins, 1, "Exactly one concurrent crosser may win");
        assert!(tracker.winner(10).await.unwrap().is_some());
    }
}

// ============================================================================
// Cache Behavior Tests
// ============================================================================

mod caching {
    use super::*;

    #[tokio::test]
    async fn test_ban_cache_eagerly_invalidated() {
        let h = harness().await;
        h.register(1, "").await;

        assert!(!h.anticheat.is_banned(1).await.unwrap());
        h.engine.set_ban(1, true).await.unwrap();
        assert!(
            h.anticheat.is_banned(1).await.unwrap(),
            "Ban must be visible immediately, not after the TTL"
        );
    }

    #[tokio::test]
    async fn test_membership_verdict_cached_until_forced() {
        let h = harness().await;
        h.register(2, "").await;
        h.oracle.set(2, MembershipVerdict::Member).await;

        assert_eq!(h.gate.check(2).await, MembershipVerdict::Member);

        h.oracle.set(2, MembershipVerdict::NonMember).await;
        assert_eq!(
            h.gate.check(2).await,
            MembershipVerdict::Member,
            "Cached verdict should survive an oracle flip"
        );
        assert_eq!(h.gate.force_check(2).await, MembershipVerdict::NonMember);
    }

    #[tokio::test]
    async fn test_user_cache_stale_until_ttl() {
        let mut config = test_config();
        config.caches.user_ttl_secs = 1;
        let h = harness_with(config).await;
        h.register(1, "ada").await;
        assert_eq!(
            h.engine.get_user(1).await.unwrap().unwrap().referral_count,
            0
        );

        // Bump the counter behind the engine's back: no eager invalidation.
        h.db.referrals().record_edge(1, 99, Utc::now()).await.unwrap();

        let stale = h.engine.get_user(1).await.unwrap().unwrap();
        assert_eq!(
            stale.referral_count, 0,
            "Cached profile keeps serving until the TTL elapses"
        );

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let fresh = h.engine.get_user(1).await.unwrap().unwrap();
        assert_eq!(fresh.referral_count, 1);
    }

    #[tokio::test]
    async fn test_referrer_profile_fresh_after_attribution() {
        let h = harness().await;
        h.register(1, "").await;

        let before = h.engine.get_user(1).await.unwrap().unwrap();
        assert_eq!(before.referral_count, 0);

        h.refer(1, 2).await;

        let after = h.engine.get_user(1).await.unwrap().unwrap();
        assert_eq!(after.referral_count, 1);
    }
}

// ============================================================================
// Reconciliation Tests
// ============================================================================

mod reconciliation {
    use super::*;

    #[tokio::test]
    async fn test_lapsed_members_lose_edges() {
        let h = harness().await;
        h.refer(1, 2).await;

        h.oracle.set(1, MembershipVerdict::NonMember).await;
        h.oracle.set(2, MembershipVerdict::NonMember).await;
        h.reconciler.validation_pass().await.unwrap();

        let referrer = h.db.users().get(1).await.unwrap().unwrap();
        assert_eq!(referrer.referral_count, 0);
        assert_eq!(h.db.referrals().count_valid(1).await.unwrap(), 0);
        assert!(
            h.db.referrals().edge_exists(1, 2).await.unwrap(),
            "Invalidation flags the edge, it does not delete it"
        );
    }

    #[tokio::test]
    async fn test_member_referrer_untouched() {
        let h = harness().await;
        h.refer(1, 2).await;

        h.oracle.set(1, MembershipVerdict::Member).await;
        h.reconciler.validation_pass().await.unwrap();

        let referrer = h.db.users().get(1).await.unwrap().unwrap();
        assert_eq!(referrer.referral_count, 1);
    }

    #[tokio::test]
    async fn test_oracle_outage_is_a_noop() {
        let h = harness().await;
        h.refer(1, 2).await;

        // Wipe the scripted verdicts: every lookup now answers Unknown.
        h.oracle.verdicts.write().await.clear();
        h.reconciler.validation_pass().await.unwrap();

        let referrer = h.db.users().get(1).await.unwrap().unwrap();
        assert_eq!(
            referrer.referral_count, 1,
            "An outage must never claw back edges"
        );
    }

    #[tokio::test]
    async fn test_referred_still_member_keeps_edge() {
        let h = harness().await;
        h.refer(1, 2).await;

        h.oracle.set(1, MembershipVerdict::NonMember).await;
        h.oracle.set(2, MembershipVerdict::Member).await;
        h.reconciler.validation_pass().await.unwrap();

        let referrer = h.db.users().get(1).await.unwrap().unwrap();
        assert_eq!(referrer.referral_count, 1);
    }

    #[tokio::test]
    async fn test_housekeeping_bans_flip_floppers() {
        let h = harness().await;
        h.refer(1, 2).await;
        for is_member in [true, false, true, false] {
            h.db.observations().record(1, is_member, Utc::now()).await.unwrap();
        }

        h.reconciler.housekeeping_pass().await.unwrap();
        h.reconciler.housekeeping_pass().await.unwrap();

        assert_eq!(h.db.users().is_banned(1).await.unwrap(), Some(true));
        let bans = h
            .notifier
            .count_for(1, |event| matches!(event, NotificationEvent::Banned));
        assert_eq!(bans, 1, "Banned referrers drop out of later scans");
    }

    #[tokio::test]
    async fn test_contest_end_broadcast_exactly_once() {
        let mut config = test_config();
        config.contest.duration_days = 0;
        let h = harness_with(config).await;
        h.register(1, "").await;
        h.register(2, "").await;
        h.register(3, "").await;

        h.reconciler.housekeeping_pass().await.unwrap();
        h.reconciler.housekeeping_pass().await.unwrap();

        let ended: usize = [1, 2, 3]
            .iter()
            .map(|&id| {
                h.notifier
                    .count_for(id, |event| matches!(event, NotificationEvent::ContestEnded))
            })
            .sum();
        assert_eq!(ended, 3, "Each participant hears about the end exactly once");
    }
}

// ============================================================================
// Operator & Stats Tests
// ============================================================================

mod operations {
    use super::*;

    #[tokio::test]
    async fn test_top_referrers_excludes_banned() {
        let h = harness().await;
        h.refer(1, 2).await;
        h.refer(3, 4).await;
        h.engine.set_ban(3, true).await.unwrap();

        let top = h.engine.top_referrers(10).await.unwrap();
        let ids: Vec<i64> = top.iter().map(|u| u.user_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn test_prize_leaderboard_enforces_floor() {
        let mut config = test_config();
        config.contest.min_prize_referrals = 2;
        let h = harness_with(config).await;
        h.refer(1, 2).await;

        assert!(h.engine.prize_leaderboard(10).await.unwrap().is_empty());

        h.refer(1, 3).await;
        let winners = h.engine.prize_leaderboard(10).await.unwrap();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].user_id, 1);
    }

    #[tokio::test]
    async fn test_contest_stats() {
        let h = harness().await;
        h.refer(1, 2).await;
        h.register(3, "").await;
        h.engine.set_ban(3, true).await.unwrap();

        let stats = h.engine.contest_stats().await.unwrap();
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.total_referrals, 1);
        assert_eq!(stats.banned_users, 1);
    }

    #[tokio::test]
    async fn test_bonus_draw_joins_once() {
        let h = harness().await;

        assert!(h.engine.join_bonus_draw(7).await.unwrap());
        assert!(!h.engine.join_bonus_draw(7).await.unwrap());

        let joined = h.notifier.count_for(7, |event| {
            matches!(event, NotificationEvent::BonusDrawJoined)
        });
        assert_eq!(joined, 1);
        assert_eq!(h.engine.bonus_draw_entrants().await.unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_bonus_draw_excludes_banned_entrants() {
        let h = harness().await;
        h.engine.join_bonus_draw(7).await.unwrap();
        h.engine.join_bonus_draw(8).await.unwrap();
        h.engine.set_ban(8, true).await.unwrap();

        assert_eq!(h.engine.bonus_draw_entrants().await.unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_reset_drops_cached_state() {
        let h = harness().await;
        h.register(1, "").await;
        assert!(!h.anticheat.is_banned(1).await.unwrap());

        // Flip the flag behind the cache; the cached value keeps serving.
        h.db.users().set_banned(1, true).await.unwrap();
        assert!(!h.anticheat.is_banned(1).await.unwrap());

        h.engine.reset_contest().await.unwrap();

        assert!(h.anticheat.is_banned(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_reopens_milestones() {
        let mut config = test_config();
        config.contest.milestones = vec![1];
        let h = harness_with(config).await;
        h.refer(1, 2).await;
        assert_eq!(h.db.contest().milestone_winner(1).await.unwrap(), Some(1));

        h.engine.reset_contest().await.unwrap();

        assert_eq!(h.db.contest().milestone_winner(1).await.unwrap(), None);
        let referrer = h.db.users().get(1).await.unwrap().unwrap();
        assert_eq!(
            referrer.referral_count, 1,
            "Reset clears winners, not counters"
        );
    }
}

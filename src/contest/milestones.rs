//! Milestone tracking
//!
//! First user to push their counter across a threshold wins that milestone,
//! exactly once. The claim is a single conditional update in the store, so
//! concurrent crossers cannot both win; this module only decides which
//! thresholds a new count reaches.

use crate::database::{Database, Milestone};
use crate::error::StoreResult;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

pub struct MilestoneTracker {
    db: Arc<Database>,
    thresholds: Vec<i64>,
}

impl MilestoneTracker {
    /// Thresholds are kept sorted and deduplicated so `check_and_assign`
    /// can stop at the first one the count has not reached.
    pub fn new(db: Arc<Database>, thresholds: &[i64]) -> Self {
        let mut thresholds = thresholds.to_vec();
        thresholds.sort_unstable();
        thresholds.dedup();
        Self { db, thresholds }
    }

    /// Create any missing winner slots. Existing slots, won or not, are
    /// left untouched, so calling this on every startup is safe.
    pub async fn seed(&self) -> StoreResult<()> {
        self.db.contest().seed_milestones(&self.thresholds).await
    }

    /// Claim every still-open milestone the new count reaches. Returns the
    /// thresholds this user just won, usually empty or a single entry.
    pub async fn check_and_assign(&self, user_id: i64, new_count: i64) -> StoreResult<Vec<i64>> {
        let mut won = Vec::new();

        for &threshold in &self.thresholds {
            if new_count < threshold {
                break;
            }
            if self
                .db
                .contest()
                .claim_milestone(threshold, user_id, Utc::now())
                .await?
            {
                info!(
                    user_id = %user_id,
                    threshold = threshold,
                    "Milestone winner recorded"
                );
                won.push(threshold);
            }
        }

        Ok(won)
    }

    pub async fn winner(&self, threshold: i64) -> StoreResult<Option<i64>> {
        self.db.contest().milestone_winner(threshold).await
    }

    pub async fn standings(&self) -> StoreResult<Vec<Milestone>> {
        self.db.contest().all_milestones().await
    }
}

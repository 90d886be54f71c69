//! Membership gate
//!
//! Front door for membership checks: consults the verdict cache first, then
//! the oracle under a hard timeout. Definitive verdicts are appended to the
//! observation history and cached; `Unknown` is returned to the caller but
//! leaves no trace, so outages never look like membership churn.

use crate::cache::CacheService;
use crate::database::Database;
use crate::membership::oracle::{MembershipOracle, MembershipVerdict};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct MembershipGate {
    oracle: Arc<dyn MembershipOracle>,
    db: Arc<Database>,
    caches: Arc<CacheService>,
    timeout: Duration,
}

impl MembershipGate {
    pub fn new(
        oracle: Arc<dyn MembershipOracle>,
        db: Arc<Database>,
        caches: Arc<CacheService>,
        timeout: Duration,
    ) -> Self {
        Self {
            oracle,
            db,
            caches,
            timeout,
        }
    }

    /// Membership standing, served from cache when fresh.
    pub async fn check(&self, user_id: i64) -> MembershipVerdict {
        if let Some(is_member) = self.caches.get_membership(user_id).await {
            debug!(user_id = %user_id, is_member = is_member, "Membership served from cache");
            return MembershipVerdict::from_flag(is_member);
        }
        self.refresh(user_id).await
    }

    /// Membership standing straight from the oracle, bypassing any cached
    /// verdict. Used wherever a stale answer could move money or counters.
    pub async fn force_check(&self, user_id: i64) -> MembershipVerdict {
        self.caches.invalidate_membership(user_id).await;
        self.refresh(user_id).await
    }

    async fn refresh(&self, user_id: i64) -> MembershipVerdict {
        let verdict = match tokio::time::timeout(self.timeout, self.oracle.is_member(user_id)).await
        {
            Ok(verdict) => verdict,
            Err(_) => {
                warn!(user_id = %user_id, "Membership lookup timed out");
                return MembershipVerdict::Unknown;
            }
        };

        if !verdict.is_definitive() {
            return verdict;
        }

        let is_member = verdict.is_member();
        let now = Utc::now();

        // A failed bookkeeping write must not turn a definitive answer into
        // an Unknown; the verdict still stands for this caller.
        if let Err(e) = self.db.observations().record(user_id, is_member, now).await {
            warn!(user_id = %user_id, error = %e, "Failed to record membership observation");
        }
        if let Err(e) = self.db.users().touch_last_checked(user_id, now).await {
            warn!(user_id = %user_id, error = %e, "Failed to update last check timestamp");
        }

        self.caches.put_membership(user_id, is_member).await;
        verdict
    }
}

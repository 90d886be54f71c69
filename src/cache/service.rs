//! Cache service
//!
//! Bundles the per-concern caches behind one handle: user profiles (short
//! TTL), ban flags (longer TTL) and membership verdicts. Any mutation that
//! changes a user's standing must go through the invalidate methods here so
//! readers never act on a stale flag past the write.

use crate::cache::ttl::TtlCache;
use crate::config::{CacheConfig, MembershipConfig};
use crate::database::User;
use std::time::Duration;
use tracing::debug;

pub struct CacheService {
    users: TtlCache<i64, User>,
    bans: TtlCache<i64, bool>,
    membership: TtlCache<i64, bool>,
}

impl CacheService {
    pub fn new(caches: &CacheConfig, membership: &MembershipConfig) -> Self {
        Self {
            users: TtlCache::new(Duration::from_secs(caches.user_ttl_secs), caches.capacity),
            bans: TtlCache::new(Duration::from_secs(caches.ban_ttl_secs), caches.capacity),
            membership: TtlCache::new(
                Duration::from_secs(membership.check_interval_secs),
                caches.capacity,
            ),
        }
    }

    pub async fn get_user(&self, user_id: i64) -> Option<User> {
        self.users.get(&user_id).await
    }

    pub async fn put_user(&self, user: User) {
        self.users.insert(user.user_id, user).await;
    }

    pub async fn invalidate_user(&self, user_id: i64) {
        self.users.invalidate(&user_id).await;
    }

    pub async fn get_ban(&self, user_id: i64) -> Option<bool> {
        self.bans.get(&user_id).await
    }

    pub async fn put_ban(&self, user_id: i64, is_banned: bool) {
        self.bans.insert(user_id, is_banned).await;
    }

    pub async fn get_membership(&self, user_id: i64) -> Option<bool> {
        self.membership.get(&user_id).await
    }

    pub async fn put_membership(&self, user_id: i64, is_member: bool) {
        self.membership.insert(user_id, is_member).await;
    }

    pub async fn invalidate_membership(&self, user_id: i64) {
        self.membership.invalidate(&user_id).await;
    }

    /// Drops every cached view of the user. Called on ban, unban and edge
    /// invalidation so the next read hits the store.
    pub async fn invalidate_user_all(&self, user_id: i64) {
        self.users.invalidate(&user_id).await;
        self.bans.invalidate(&user_id).await;
        self.membership.invalidate(&user_id).await;
        debug!(user_id = %user_id, "Invalidated all cache entries for user");
    }

    pub async fn purge_expired(&self) -> usize {
        let purged = self.users.purge_expired().await
            + self.bans.purge_expired().await
            + self.membership.purge_expired().await;
        if purged > 0 {
            debug!(entries = purged, "Purged expired cache entries");
        }
        purged
    }

    /// Drop every cached entry across all three caches. The contest reset
    /// calls this so reads after the reset start from the store.
    pub async fn clear_all(&self) {
        self.users.clear().await;
        self.bans.clear().await;
        self.membership.clear().await;
        debug!("Cleared all caches");
    }
}

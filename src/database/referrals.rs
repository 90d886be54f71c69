//! Referral repository - attribution edges and their counters
//!
//! Every edge mutation updates the edge table and the referrer's counter in
//! one transaction, so `users.referral_count` always equals the number of
//! valid edges pointing at that referrer.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

pub struct ReferralRepository {
    pool: SqlitePool,
}

impl ReferralRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a valid edge and bump the referrer's counter atomically.
    /// Returns the updated counter. A duplicate (referrer, referred) pair
    /// fails with `Conflict` and leaves the counter untouched.
    pub async fn record_edge(
        &self,
        referrer_id: i64,
        referred_id: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Unavailable)?;

        sqlx::query(
            "INSERT INTO referrals (referrer_id, referred_id, created_at, is_valid) VALUES (?, ?, ?, 1)",
        )
        .bind(referrer_id)
        .bind(referred_id)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_sqlx("referral", e))?;

        let row = sqlx::query(
            "UPDATE users SET referral_count = referral_count + 1 WHERE user_id = ? RETURNING referral_count",
        )
        .bind(referrer_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::Unavailable)?;

        let Some(row) = row else {
            return Err(StoreError::NotFound { entity: "referrer" });
        };
        let new_count: i64 = row.get("referral_count");

        tx.commit().await.map_err(StoreError::Unavailable)?;

        debug!(referrer_id, referred_id, new_count, "Referral edge recorded");
        Ok(new_count)
    }

    /// Flag an edge invalid and decrement the referrer's counter, both in one
    /// transaction. Returns false without touching anything when the edge is
    /// missing or already invalid.
    pub async fn invalidate_edge(&self, referrer_id: i64, referred_id: i64) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Unavailable)?;

        let flipped = sqlx::query(
            "UPDATE referrals SET is_valid = 0 WHERE referrer_id = ? AND referred_id = ? AND is_valid = 1",
        )
        .bind(referrer_id)
        .bind(referred_id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::Unavailable)?;

        if flipped.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            "UPDATE users SET referral_count = referral_count - 1 WHERE user_id = ? AND referral_count > 0",
        )
        .bind(referrer_id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::Unavailable)?;

        tx.commit().await.map_err(StoreError::Unavailable)?;

        debug!(referrer_id, referred_id, "Referral edge invalidated");
        Ok(true)
    }

    /// True if the pair was ever recorded, valid or not. Matches the unique
    /// constraint, which also covers invalidated edges.
    pub async fn edge_exists(&self, referrer_id: i64, referred_id: i64) -> StoreResult<bool> {
        let row = sqlx::query(
            "SELECT 1 AS present FROM referrals WHERE referrer_id = ? AND referred_id = ? LIMIT 1",
        )
        .bind(referrer_id)
        .bind(referred_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(row.is_some())
    }

    /// Most recent valid referred users of a referrer, bounded.
    pub async fn valid_referred_ids(&self, referrer_id: i64, limit: i64) -> StoreResult<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT referred_id FROM referrals
            WHERE referrer_id = ? AND is_valid = 1
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(referrer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(rows.iter().map(|row| row.get("referred_id")).collect())
    }

    pub async fn count_valid(&self, referrer_id: i64) -> StoreResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS valid_edges FROM referrals WHERE referrer_id = ? AND is_valid = 1",
        )
        .bind(referrer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(row.get("valid_edges"))
    }
}

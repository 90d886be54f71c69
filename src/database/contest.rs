//! Contest repository - schedule settings, milestone slots, pending
//! attributions and the bonus-draw roster
//!
//! Milestone and end-of-contest claims are single conditional updates;
//! `rows_affected == 1` is the only signal that this caller won the slot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

pub const SETTING_STARTED_AT: &str = "started_at";
pub const SETTING_END_NOTIFIED_AT: &str = "end_notified_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub threshold: i64,
    pub winner_id: Option<i64>,
    pub awarded_at: Option<DateTime<Utc>>,
}

pub struct ContestRepository {
    pool: SqlitePool,
}

impl ContestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // Settings

    pub async fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM contest_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        Ok(row.and_then(|row| row.get("value")))
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query("INSERT OR REPLACE INTO contest_settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        Ok(())
    }

    /// Seed a setting without overwriting an existing value.
    pub async fn ensure_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query("INSERT OR IGNORE INTO contest_settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        Ok(())
    }

    /// Claim the one-shot end-of-contest notification. True only for the
    /// single caller that flips the empty marker.
    pub async fn claim_end_notification(&self, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE contest_settings SET value = ?
            WHERE key = ? AND (value IS NULL OR value = '')
            "#,
        )
        .bind(at.to_rfc3339())
        .bind(SETTING_END_NOTIFIED_AT)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(result.rows_affected() == 1)
    }

    // Milestones

    /// Create empty winner slots for any thresholds that do not have one yet.
    pub async fn seed_milestones(&self, thresholds: &[i64]) -> StoreResult<()> {
        for &threshold in thresholds {
            sqlx::query("INSERT OR IGNORE INTO milestones (threshold) VALUES (?)")
                .bind(threshold)
                .execute(&self.pool)
                .await
                .map_err(StoreError::Unavailable)?;
        }

        Ok(())
    }

    /// First-to-threshold claim. The conditional update fills the slot only
    /// while it is empty, so concurrent crossers get exactly one winner.
    pub async fn claim_milestone(
        &self,
        threshold: i64,
        winner_id: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE milestones SET winner_id = ?, awarded_at = ?
            WHERE threshold = ? AND winner_id IS NULL
            "#,
        )
        .bind(winner_id)
        .bind(at)
        .bind(threshold)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn milestone_winner(&self, threshold: i64) -> StoreResult<Option<i64>> {
        let row = sqlx::query("SELECT winner_id FROM milestones WHERE threshold = ?")
            .bind(threshold)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        Ok(row.and_then(|row| row.get("winner_id")))
    }

    pub async fn all_milestones(&self) -> StoreResult<Vec<Milestone>> {
        let rows = sqlx::query(
            "SELECT threshold, winner_id, awarded_at FROM milestones ORDER BY threshold ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(rows
            .iter()
            .map(|row| Milestone {
                threshold: row.get("threshold"),
                winner_id: row.get("winner_id"),
                awarded_at: row.get("awarded_at"),
            })
            .collect())
    }

    // Pending attributions

    /// Park an attribution until membership is confirmed. One row per
    /// referred user; a newer token replaces the older one.
    pub async fn upsert_pending(
        &self,
        user_id: i64,
        referrer_id: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO pending_attributions (user_id, referrer_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(referrer_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        debug!(user_id, referrer_id, "Pending attribution stored");
        Ok(())
    }

    pub async fn get_pending(&self, user_id: i64) -> StoreResult<Option<i64>> {
        let row = sqlx::query("SELECT referrer_id FROM pending_attributions WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        Ok(row.map(|row| row.get("referrer_id")))
    }

    pub async fn delete_pending(&self, user_id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM pending_attributions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        Ok(result.rows_affected() == 1)
    }

    // Bonus draw

    /// Opt the user into the side giveaway. Idempotent.
    pub async fn join_bonus_draw(&self, user_id: i64, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO bonus_draw (user_id, joined_at, notified) VALUES (?, ?, 0)",
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(result.rows_affected() == 1)
    }

    /// Claim the one-time join acknowledgement for a user.
    pub async fn claim_bonus_draw_notice(&self, user_id: i64) -> StoreResult<bool> {
        let result =
            sqlx::query("UPDATE bonus_draw SET notified = 1 WHERE user_id = ? AND notified = 0")
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(StoreError::Unavailable)?;

        Ok(result.rows_affected() == 1)
    }

    /// Entrants still eligible for the draw, skipping banned accounts.
    pub async fn bonus_draw_entrants(&self) -> StoreResult<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT b.user_id FROM bonus_draw b
            JOIN users u ON u.user_id = b.user_id
            WHERE u.is_banned = 0
            ORDER BY b.joined_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(rows.iter().map(|row| row.get("user_id")).collect())
    }

    /// Restart the contest in one transaction: new start date, emptied
    /// milestone slots, reopened end-notification claim.
    pub async fn reset(&self, started_at: DateTime<Utc>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Unavailable)?;

        sqlx::query("INSERT OR REPLACE INTO contest_settings (key, value) VALUES (?, ?)")
            .bind(SETTING_STARTED_AT)
            .bind(started_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Unavailable)?;

        sqlx::query("INSERT OR REPLACE INTO contest_settings (key, value) VALUES (?, '')")
            .bind(SETTING_END_NOTIFIED_AT)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Unavailable)?;

        sqlx::query("UPDATE milestones SET winner_id = NULL, awarded_at = NULL")
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Unavailable)?;

        tx.commit().await.map_err(StoreError::Unavailable)?;

        Ok(())
    }
}

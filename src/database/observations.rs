//! Membership observation log
//!
//! Append-only record of definitive oracle verdicts. The anti-cheat
//! flip-flop rule reads its window from here; transient failures are never
//! written, so outages cannot fabricate transitions.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::{StoreError, StoreResult};

pub struct ObservationRepository {
    pool: SqlitePool,
}

impl ObservationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(
        &self,
        user_id: i64,
        is_member: bool,
        observed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO membership_observations (user_id, observed_at, is_member) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(observed_at)
        .bind(is_member)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(())
    }

    /// The user's most recent verdicts, newest first.
    pub async fn recent(&self, user_id: i64, limit: i64) -> StoreResult<Vec<bool>> {
        let rows = sqlx::query(
            r#"
            SELECT is_member FROM membership_observations
            WHERE user_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(rows.iter().map(|row| row.get("is_member")).collect())
    }
}

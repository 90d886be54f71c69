//! User repository - contest participant records and counters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub display_name: String,
    pub referral_token: String,
    pub referral_count: i64,
    pub is_banned: bool,
    pub registered_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Aggregate counters for the operator dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestStats {
    pub total_users: i64,
    pub total_referrals: i64,
    pub banned_users: i64,
}

pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new user with a zeroed counter. Fails with `Conflict` when
    /// the id or the referral token is already taken.
    pub async fn create(
        &self,
        user_id: i64,
        display_name: &str,
        referral_token: &str,
    ) -> StoreResult<User> {
        let registered_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (user_id, display_name, referral_token, referral_count, is_banned, registered_at)
            VALUES (?, ?, ?, 0, 0, ?)
            "#,
        )
        .bind(user_id)
        .bind(display_name)
        .bind(referral_token)
        .bind(registered_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("user", e))?;

        debug!(user_id, "User inserted");

        Ok(User {
            user_id,
            display_name: display_name.to_string(),
            referral_token: referral_token.to_string(),
            referral_count: 0,
            is_banned: false,
            registered_at,
            last_checked_at: None,
        })
    }

    pub async fn get(&self, user_id: i64) -> StoreResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, display_name, referral_token, referral_count,
                   is_banned, registered_at, last_checked_at
            FROM users
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(row.map(|row| user_from_row(&row)))
    }

    pub async fn find_by_token(&self, referral_token: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, display_name, referral_token, referral_count,
                   is_banned, registered_at, last_checked_at
            FROM users
            WHERE referral_token = ?
            "#,
        )
        .bind(referral_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(row.map(|row| user_from_row(&row)))
    }

    /// Lightweight ban lookup for the ban cache. `None` means unknown user.
    pub async fn is_banned(&self, user_id: i64) -> StoreResult<Option<bool>> {
        let row = sqlx::query("SELECT is_banned FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        Ok(row.map(|row| row.get("is_banned")))
    }

    /// Flip the ban flag. Returns true only when the flag actually changed,
    /// so callers can notify exactly once.
    pub async fn set_banned(&self, user_id: i64, banned: bool) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET is_banned = ? WHERE user_id = ? AND is_banned != ?",
        )
        .bind(banned)
        .bind(user_id)
        .bind(banned)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn touch_last_checked(&self, user_id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET last_checked_at = ? WHERE user_id = ?")
            .bind(at)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        Ok(())
    }

    /// Non-banned users with at least one referral, highest counters first.
    pub async fn top_referrers(&self, limit: i64) -> StoreResult<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, display_name, referral_token, referral_count,
                   is_banned, registered_at, last_checked_at
            FROM users
            WHERE is_banned = 0 AND referral_count > 0
            ORDER BY referral_count DESC, user_id ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    /// Leaderboard restricted to users above the prize floor.
    pub async fn prize_leaderboard(&self, min_referrals: i64, limit: i64) -> StoreResult<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, display_name, referral_token, referral_count,
                   is_banned, registered_at, last_checked_at
            FROM users
            WHERE is_banned = 0 AND referral_count >= ?
            ORDER BY referral_count DESC, user_id ASC
            LIMIT ?
            "#,
        )
        .bind(min_referrals)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    pub async fn contest_stats(&self) -> StoreResult<ContestStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS total_users,
                (SELECT COUNT(*) FROM referrals WHERE is_valid = 1) AS total_referrals,
                (SELECT COUNT(*) FROM users WHERE is_banned = 1) AS banned_users
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        Ok(ContestStats {
            total_users: row.get("total_users"),
            total_referrals: row.get("total_referrals"),
            banned_users: row.get("banned_users"),
        })
    }

    /// Every registered user id, for the end-of-contest broadcast.
    pub async fn all_ids(&self) -> StoreResult<Vec<i64>> {
        let rows = sqlx::query("SELECT user_id FROM users ORDER BY user_id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        Ok(rows.iter().map(|row| row.get("user_id")).collect())
    }
}

fn user_from_row(row: &SqliteRow) -> User {
    User {
        user_id: row.get("user_id"),
        display_name: row.get("display_name"),
        referral_token: row.get("referral_token"),
        referral_count: row.get("referral_count"),
        is_banned: row.get("is_banned"),
        registered_at: row.get("registered_at"),
        last_checked_at: row.get("last_checked_at"),
    }
}

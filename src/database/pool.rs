//! SQLite connection pool and schema management using sqlx

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::time::Duration;
use tracing::info;

use crate::config::StorageConfig;
use crate::database::contest::ContestRepository;
use crate::database::observations::ObservationRepository;
use crate::database::referrals::ReferralRepository;
use crate::database::users::UserRepository;
use crate::error::{StoreError, StoreResult};

/// Durable attribution store. Wraps the pool and hands out per-entity
/// repositories that share it.
pub struct Database {
    pool: SqlitePool,
    users: UserRepository,
    referrals: ReferralRepository,
    observations: ObservationRepository,
    contest: ContestRepository,
}

impl Database {
    pub async fn connect(config: &StorageConfig) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(StoreError::Unavailable)?;

        info!(path = %config.db_path, "Connected to SQLite");

        Ok(Self::from_pool(pool))
    }

    /// Single-connection in-memory store, used by tests.
    pub async fn connect_in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(StoreError::Unavailable)?;

        Ok(Self::from_pool(pool))
    }

    fn from_pool(pool: SqlitePool) -> Self {
        let users = UserRepository::new(pool.clone());
        let referrals = ReferralRepository::new(pool.clone());
        let observations = ObservationRepository::new(pool.clone());
        let contest = ContestRepository::new(pool.clone());

        Self {
            pool,
            users,
            referrals,
            observations,
            contest,
        }
    }

    pub async fn init_schema(&self) -> StoreResult<()> {
        info!("Initializing database schema...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                display_name TEXT NOT NULL,
                referral_token TEXT NOT NULL UNIQUE,
                referral_count INTEGER NOT NULL DEFAULT 0,
                is_banned INTEGER NOT NULL DEFAULT 0,
                registered_at TEXT NOT NULL,
                last_checked_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS referrals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                referrer_id INTEGER NOT NULL,
                referred_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                is_valid INTEGER NOT NULL DEFAULT 1,
                UNIQUE(referrer_id, referred_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_attributions (
                user_id INTEGER PRIMARY KEY,
                referrer_id INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS membership_observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                observed_at TEXT NOT NULL,
                is_member INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contest_settings (
                key TEXT PRIMARY KEY,
                value TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS milestones (
                threshold INTEGER PRIMARY KEY,
                winner_id INTEGER,
                awarded_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bonus_draw (
                user_id INTEGER PRIMARY KEY,
                joined_at TEXT NOT NULL,
                notified INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_banned ON users (is_banned)")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_count ON users (referral_count)")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_referrals_referrer ON referrals (referrer_id, is_valid)",
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_referrals_referred ON referrals (referred_id)")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_observations_user ON membership_observations (user_id, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        info!("Database schema initialized");
        Ok(())
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub fn referrals(&self) -> &ReferralRepository {
        &self.referrals
    }

    pub fn observations(&self) -> &ObservationRepository {
        &self.observations
    }

    pub fn contest(&self) -> &ContestRepository {
        &self.contest
    }
}

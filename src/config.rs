use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

/// Configuration for the Clover referral engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Storage configuration
    pub storage: StorageConfig,
    /// Read-cache configuration
    pub caches: CacheConfig,
    /// Membership oracle configuration
    pub membership: MembershipConfig,
    /// Contest configuration
    pub contest: ContestConfig,
    /// Anti-cheat heuristics
    pub anticheat: AntiCheatConfig,
    /// Background reconciler configuration
    pub reconciler: ReconcilerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub db_path: String,
    /// Maximum pooled connections
    pub max_connections: u32,
    /// SQLite busy timeout in seconds
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for cached user records in seconds
    pub user_ttl_secs: u64,
    /// TTL for cached ban flags in seconds
    pub ban_ttl_secs: u64,
    /// Maximum entries per cache before oldest-insertion eviction
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipConfig {
    /// Membership oracle base URL
    pub service_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// How long a cached membership verdict stays fresh, in seconds
    pub check_interval_secs: u64,
    /// Require HTTPS for the oracle endpoint
    pub require_https: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContestConfig {
    /// Secret mixed into referral token derivation
    pub token_secret: String,
    /// Contest duration in days, measured from the stored start date
    pub duration_days: i64,
    /// Referral-count thresholds with a first-to-reach winner slot each
    pub milestones: Vec<i64>,
    /// Minimum referral count for the prize leaderboard
    pub min_prize_referrals: i64,
    /// Operator account that receives signup notices
    pub operator_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiCheatConfig {
    /// How many recent membership observations the flip-flop rule inspects
    pub observation_window: usize,
    /// Adjacent-value transitions at or above this count flag the user
    pub flip_flop_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Seconds between validation passes
    pub interval_secs: u64,
    /// Seconds between housekeeping passes
    pub housekeeping_interval_secs: u64,
    /// How many top referrers each pass re-checks
    pub top_sample: i64,
    /// How many referred users per flagged referrer are re-checked
    pub edge_sample: i64,
    /// Users per batch in the end-of-contest broadcast
    pub broadcast_batch: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "clover.db".to_string(),
            max_connections: 5,
            busy_timeout_secs: 10,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            user_ttl_secs: 60,
            ban_ttl_secs: 300,
            capacity: 500,
        }
    }
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            service_url: String::new(), // Must be set via environment
            timeout_secs: 10,
            check_interval_secs: 60,
            require_https: true,
        }
    }
}

impl Default for ContestConfig {
    fn default() -> Self {
        Self {
            token_secret: "clover-dev-secret".to_string(),
            duration_days: 30,
            milestones: vec![50, 100],
            min_prize_referrals: 10,
            operator_id: None,
        }
    }
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            observation_window: 10,
            flip_flop_threshold: 3,
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1800,
            housekeeping_interval_secs: 7200,
            top_sample: 30,
            edge_sample: 5,
            broadcast_batch: 20,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            caches: CacheConfig::default(),
            membership: MembershipConfig::default(),
            contest: ContestConfig::default(),
            anticheat: AntiCheatConfig::default(),
            reconciler: ReconcilerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Storage configuration
        if let Ok(path) = env::var("CLOVER_DB_PATH") {
            config.storage.db_path = path;
        }

        if let Ok(max) = env::var("CLOVER_DB_MAX_CONNECTIONS") {
            config.storage.max_connections = max
                .parse()
                .context("Invalid CLOVER_DB_MAX_CONNECTIONS value")?;
        }

        if let Ok(timeout) = env::var("CLOVER_DB_BUSY_TIMEOUT_SECS") {
            config.storage.busy_timeout_secs = timeout
                .parse()
                .context("Invalid CLOVER_DB_BUSY_TIMEOUT_SECS value")?;
        }

        // Cache configuration
        if let Ok(ttl) = env::var("CLOVER_USER_CACHE_TTL_SECS") {
            config.caches.user_ttl_secs = ttl
                .parse()
                .context("Invalid CLOVER_USER_CACHE_TTL_SECS value")?;
        }

        if let Ok(ttl) = env::var("CLOVER_BAN_CACHE_TTL_SECS") {
            config.caches.ban_ttl_secs = ttl
                .parse()
                .context("Invalid CLOVER_BAN_CACHE_TTL_SECS value")?;
        }

        if let Ok(capacity) = env::var("CLOVER_CACHE_CAPACITY") {
            config.caches.capacity = capacity
                .parse()
                .context("Invalid CLOVER_CACHE_CAPACITY value")?;
        }

        // Membership oracle configuration
        config.membership.service_url = env::var("CLOVER_MEMBERSHIP_URL")
            .context("CLOVER_MEMBERSHIP_URL environment variable is required")?;

        if let Ok(timeout) = env::var("CLOVER_MEMBERSHIP_TIMEOUT_SECS") {
            config.membership.timeout_secs = timeout
                .parse()
                .context("Invalid CLOVER_MEMBERSHIP_TIMEOUT_SECS value")?;
        }

        if let Ok(interval) = env::var("CLOVER_MEMBERSHIP_CHECK_INTERVAL_SECS") {
            config.membership.check_interval_secs = interval
                .parse()
                .context("Invalid CLOVER_MEMBERSHIP_CHECK_INTERVAL_SECS value")?;
        }

        if let Ok(require) = env::var("CLOVER_MEMBERSHIP_REQUIRE_HTTPS") {
            config.membership.require_https = require
                .parse()
                .context("Invalid CLOVER_MEMBERSHIP_REQUIRE_HTTPS value")?;
        }

        // Contest configuration
        config.contest.token_secret = env::var("CLOVER_TOKEN_SECRET").unwrap_or_else(|_| {
            warn!("CLOVER_TOKEN_SECRET not set, using default (not recommended for production)");
            ContestConfig::default().token_secret
        });

        if let Ok(days) = env::var("CLOVER_CONTEST_DURATION_DAYS") {
            config.contest.duration_days = days
                .parse()
                .context("Invalid CLOVER_CONTEST_DURATION_DAYS value")?;
        }

        if let Ok(raw) = env::var("CLOVER_MILESTONES") {
            config.contest.milestones =
                parse_milestones(&raw).context("Invalid CLOVER_MILESTONES value")?;
        }

        if let Ok(min) = env::var("CLOVER_MIN_PRIZE_REFERRALS") {
            config.contest.min_prize_referrals = min
                .parse()
                .context("Invalid CLOVER_MIN_PRIZE_REFERRALS value")?;
        }

        if let Ok(operator) = env::var("CLOVER_OPERATOR_ID") {
            config.contest.operator_id =
                Some(operator.parse().context("Invalid CLOVER_OPERATOR_ID value")?);
        }

        // Anti-cheat configuration
        if let Ok(window) = env::var("CLOVER_FLIP_FLOP_WINDOW") {
            config.anticheat.observation_window = window
                .parse()
                .context("Invalid CLOVER_FLIP_FLOP_WINDOW value")?;
        }

        if let Ok(threshold) = env::var("CLOVER_FLIP_FLOP_THRESHOLD") {
            config.anticheat.flip_flop_threshold = threshold
                .parse()
                .context("Invalid CLOVER_FLIP_FLOP_THRESHOLD value")?;
        }

        // Reconciler configuration
        if let Ok(interval) = env::var("CLOVER_RECONCILE_INTERVAL_SECS") {
            config.reconciler.interval_secs = interval
                .parse()
                .context("Invalid CLOVER_RECONCILE_INTERVAL_SECS value")?;
        }

        if let Ok(interval) = env::var("CLOVER_HOUSEKEEPING_INTERVAL_SECS") {
            config.reconciler.housekeeping_interval_secs = interval
                .parse()
                .context("Invalid CLOVER_HOUSEKEEPING_INTERVAL_SECS value")?;
        }

        if let Ok(sample) = env::var("CLOVER_RECONCILE_TOP_SAMPLE") {
            config.reconciler.top_sample = sample
                .parse()
                .context("Invalid CLOVER_RECONCILE_TOP_SAMPLE value")?;
        }

        if let Ok(sample) = env::var("CLOVER_RECONCILE_EDGE_SAMPLE") {
            config.reconciler.edge_sample = sample
                .parse()
                .context("Invalid CLOVER_RECONCILE_EDGE_SAMPLE value")?;
        }

        if let Ok(batch) = env::var("CLOVER_BROADCAST_BATCH") {
            config.reconciler.broadcast_batch = batch
                .parse()
                .context("Invalid CLOVER_BROADCAST_BATCH value")?;
        }

        // Logging configuration
        if let Ok(level) = env::var("CLOVER_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.storage.db_path.is_empty() {
            return Err(anyhow::anyhow!("Database path cannot be empty"));
        }

        if self.storage.max_connections == 0 {
            return Err(anyhow::anyhow!("Database pool needs at least one connection"));
        }

        if self.caches.user_ttl_secs == 0 || self.caches.ban_ttl_secs == 0 {
            return Err(anyhow::anyhow!("Cache TTLs must be non-zero"));
        }

        if self.caches.capacity == 0 {
            return Err(anyhow::anyhow!("Cache capacity must be non-zero"));
        }

        if self.membership.service_url.is_empty() {
            return Err(anyhow::anyhow!("Membership oracle URL cannot be empty"));
        }

        if self.membership.require_https && !self.membership.service_url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "HTTPS is required but membership URL is not HTTPS: {}",
                self.membership.service_url
            ));
        }

        if self.membership.timeout_secs == 0 || self.membership.check_interval_secs == 0 {
            return Err(anyhow::anyhow!(
                "Membership timeout and check interval must be non-zero"
            ));
        }

        if self.contest.token_secret.trim().is_empty() {
            return Err(anyhow::anyhow!("Referral token secret cannot be blank"));
        }

        if self.contest.duration_days <= 0 {
            return Err(anyhow::anyhow!("Contest duration must be at least one day"));
        }

        if self.contest.milestones.is_empty() {
            return Err(anyhow::anyhow!("At least one milestone threshold is required"));
        }

        let mut previous = 0i64;
        for &threshold in &self.contest.milestones {
            if threshold <= previous {
                return Err(anyhow::anyhow!(
                    "Milestone thresholds must be positive and strictly ascending: {:?}",
                    self.contest.milestones
                ));
            }
            previous = threshold;
        }

        if self.anticheat.observation_window < 2 {
            return Err(anyhow::anyhow!(
                "Flip-flop window must cover at least two observations"
            ));
        }

        if self.anticheat.flip_flop_threshold == 0 {
            return Err(anyhow::anyhow!("Flip-flop threshold must be non-zero"));
        }

        if self.reconciler.interval_secs == 0 || self.reconciler.housekeeping_interval_secs == 0 {
            return Err(anyhow::anyhow!("Reconciler intervals must be non-zero"));
        }

        if self.reconciler.top_sample <= 0 || self.reconciler.edge_sample <= 0 {
            return Err(anyhow::anyhow!("Reconciler sample sizes must be positive"));
        }

        if self.reconciler.broadcast_batch == 0 {
            return Err(anyhow::anyhow!("Broadcast batch size must be non-zero"));
        }

        Ok(())
    }
}

fn parse_milestones(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<i64>()
                .map_err(|e| anyhow::anyhow!("bad milestone threshold '{}': {}", part.trim(), e))
        })
        .collect()
}

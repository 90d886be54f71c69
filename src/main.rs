use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

use clover_engine::{
    config::EngineConfig, AntiCheatEngine, CacheService, ContestSchedule, Database,
    HttpMembershipOracle, MembershipGate, MilestoneTracker, Reconciler, ReferralEngine,
    TracingNotifier,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - this validates all contest settings
    let config = EngineConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!("Please check CLOVER_* environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting Clover referral engine");
    info!(
        "Contest: {} day(s), milestones {:?}, oracle at {}",
        config.contest.duration_days, config.contest.milestones, config.membership.service_url
    );

    let db = Arc::new(Database::connect(&config.storage).await?);
    db.init_schema().await?;

    let caches = Arc::new(CacheService::new(&config.caches, &config.membership));
    let oracle = Arc::new(HttpMembershipOracle::new(&config.membership)?);
    let gate = Arc::new(MembershipGate::new(
        oracle,
        db.clone(),
        caches.clone(),
        Duration::from_secs(config.membership.timeout_secs),
    ));
    let anticheat = Arc::new(AntiCheatEngine::new(
        db.clone(),
        caches.clone(),
        gate.clone(),
        config.anticheat.clone(),
    ));

    let milestones = Arc::new(MilestoneTracker::new(db.clone(), &config.contest.milestones));
    milestones.seed().await?;

    let schedule = Arc::new(ContestSchedule::new(db.clone(), config.contest.duration_days));
    let started_at = schedule.ensure_started().await?;
    info!(started_at = %started_at, "Contest schedule loaded");

    let notifier = Arc::new(TracingNotifier);

    let engine = Arc::new(ReferralEngine::new(
        db.clone(),
        caches.clone(),
        gate.clone(),
        anticheat.clone(),
        milestones,
        schedule.clone(),
        notifier.clone(),
        config.contest.clone(),
    ));

    let reconciler = Reconciler::new(
        db,
        caches,
        gate,
        anticheat,
        schedule,
        notifier,
        config.reconciler.clone(),
    );
    tokio::spawn(async move { reconciler.run().await });

    let stats = engine.contest_stats().await?;
    info!(
        users = stats.total_users,
        referrals = stats.total_referrals,
        banned = stats.banned_users,
        "Engine ready; transports feed handle_arrival/handle_recheck"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    Ok(())
}

/// Initialize logging at the configured level
fn init_logging(config: &EngineConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

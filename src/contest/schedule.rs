//! Contest schedule
//!
//! The contest runs for a fixed number of days from a stored start date.
//! The start date is seeded on first run and survives restarts; the
//! end-of-contest notification is claimed through a conditional update so
//! only one process instance ever fires it.

use crate::database::contest::{SETTING_END_NOTIFIED_AT, SETTING_STARTED_AT};
use crate::database::Database;
use crate::error::StoreResult;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ContestSchedule {
    db: Arc<Database>,
    duration: Duration,
}

impl ContestSchedule {
    pub fn new(db: Arc<Database>, duration_days: i64) -> Self {
        Self {
            db,
            duration: Duration::days(duration_days),
        }
    }

    /// Start date of the current contest, seeding it on first run. An
    /// unreadable stored value is replaced rather than crashing startup.
    pub async fn ensure_started(&self) -> StoreResult<DateTime<Utc>> {
        self.db
            .contest()
            .ensure_setting(SETTING_END_NOTIFIED_AT, "")
            .await?;

        if let Some(raw) = self.db.contest().get_setting(SETTING_STARTED_AT).await? {
            match DateTime::parse_from_rfc3339(&raw) {
                Ok(parsed) => return Ok(parsed.with_timezone(&Utc)),
                Err(e) => {
                    warn!(value = %raw, error = %e, "Unreadable contest start date, reseeding")
                }
            }
        }

        let now = Utc::now();
        self.db
            .contest()
            .set_setting(SETTING_STARTED_AT, &now.to_rfc3339())
            .await?;
        info!(started_at = %now, "Contest start date seeded");
        Ok(now)
    }

    pub async fn end_date(&self) -> StoreResult<DateTime<Utc>> {
        Ok(self.ensure_started().await? + self.duration)
    }

    pub async fn is_ended(&self) -> StoreResult<bool> {
        Ok(Utc::now() >= self.end_date().await?)
    }

    /// Claim the right to announce the contest end. True for exactly one
    /// caller over the contest's lifetime.
    pub async fn claim_end_notification(&self) -> StoreResult<bool> {
        self.db.contest().claim_end_notification(Utc::now()).await
    }

    /// Start a fresh contest: new start date, cleared end notification and
    /// reopened milestone slots, in one transaction.
    pub async fn reset(&self) -> StoreResult<DateTime<Utc>> {
        let now = Utc::now();
        self.db.contest().reset(now).await?;
        info!(started_at = %now, "Contest reset");
        Ok(now)
    }
}

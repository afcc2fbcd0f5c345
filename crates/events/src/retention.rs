//! Periodic cleanup of expired outbox rows.

use async_trait::async_trait;
use casari_core::types::LockKey;
use casari_core::PubSubConfig;
use casari_db::repositories::OutboxEventRepo;
use casari_scheduler::{ExclusiveJob, JobHandler, JobParameters, ScheduledJob, Scheduler};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::EventError;

pub const RETENTION_JOB_TITLE: &str = "CleanUpOldPubSubEvents";
pub const RETENTION_JOB_ID: LockKey = 83_701_937;
/// Top of every hour.
pub const RETENTION_SCHEDULE: &str = "0 * * * *";

/// Deletes outbox rows older than the retention window.
pub struct OutboxRetention {
    pool: PgPool,
    retention_days: u32,
}

impl OutboxRetention {
    pub fn new(pool: PgPool, retention_days: u32) -> Self {
        Self {
            pool,
            retention_days,
        }
    }

    /// Delete every row with `event_date < now - retention_days`.
    pub async fn purge(&self) -> Result<u64, sqlx::Error> {
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        OutboxEventRepo::delete_older_than(&self.pool, cutoff).await
    }
}

#[async_trait]
impl JobHandler for OutboxRetention {
    async fn run(&self, params: &JobParameters) -> anyhow::Result<()> {
        let deleted = self.purge().await?;
        tracing::info!(
            job = %params.title,
            deleted,
            retention_days = self.retention_days,
            "Expired outbox events deleted"
        );
        Ok(())
    }
}

/// Register the hourly outbox cleanup on `scheduler`.
///
/// Does nothing when persistence is off or the retention is `0` days.
/// The job runs as an [`ExclusiveJob`] so only one process instance
/// performs the delete on each tick.
pub async fn register_retention_job(
    scheduler: &Scheduler,
    pool: &PgPool,
    config: &PubSubConfig,
) -> Result<Option<Uuid>, EventError> {
    if !config.persist_events || config.retention_days == 0 {
        tracing::info!(
            persist_events = config.persist_events,
            retention_days = config.retention_days,
            "Outbox retention disabled"
        );
        return Ok(None);
    }

    let connection = scheduler.single_connection(pool).await?;
    let job = ScheduledJob::new(
        RETENTION_SCHEDULE,
        ExclusiveJob::new(
            connection,
            OutboxRetention::new(pool.clone(), config.retention_days),
        ),
        JobParameters::new(RETENTION_JOB_TITLE, RETENTION_JOB_ID),
    );
    let id = scheduler.add_job(job)?;

    tracing::info!(
        job = RETENTION_JOB_TITLE,
        retention_days = config.retention_days,
        "Outbox retention scheduled"
    );
    Ok(Some(id))
}

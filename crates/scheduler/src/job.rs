//! Scheduled job model.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use casari_core::types::LockKey;

/// Parameters handed to a job handler on every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobParameters {
    /// Human-readable name, used in logs.
    pub title: String,
    /// Stable numeric id. Doubles as the advisory-lock key when the job is
    /// wrapped in an [`ExclusiveJob`](crate::ExclusiveJob).
    pub job_id: LockKey,
}

impl JobParameters {
    pub fn new(title: impl Into<String>, job_id: LockKey) -> Self {
        Self {
            title: title.into(),
            job_id,
        }
    }
}

/// Body of a scheduled job.
///
/// Handlers must be idempotent: a retry after a transient failure, or a
/// tie in lock acquisition, can run the same logical tick twice.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn run(&self, params: &JobParameters) -> anyhow::Result<()>;
}

/// A job registered against a cron schedule.
#[derive(Clone)]
pub struct ScheduledJob {
    /// Cron expression. Five fields (`min hour dom mon dow`) or the
    /// second-aware six/seven field form.
    pub schedule: String,
    pub handler: Arc<dyn JobHandler>,
    pub parameters: JobParameters,
}

impl ScheduledJob {
    pub fn new(
        schedule: impl Into<String>,
        handler: impl JobHandler,
        parameters: JobParameters,
    ) -> Self {
        Self {
            schedule: schedule.into(),
            handler: Arc::new(handler),
            parameters,
        }
    }
}

impl fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("schedule", &self.schedule)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Adapter turning an async closure into a [`JobHandler`].
pub struct FnJob<F>(F);

/// Wrap `f` so it can be registered as a job handler.
pub fn job_fn<F, Fut>(f: F) -> FnJob<F>
where
    F: Fn(JobParameters) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnJob(f)
}

#[async_trait]
impl<F, Fut> JobHandler for FnJob<F>
where
    F: Fn(JobParameters) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(&self, params: &JobParameters) -> anyhow::Result<()> {
        (self.0)(params.clone()).await
    }
}

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid cron expression '{expression}': {source}")]
    InvalidSchedule {
        expression: String,
        source: cron::error::Error,
    },

    #[error("Scheduler is closed")]
    Closed,

    #[error("Scheduler shutdown did not finish within {0:?}")]
    ShutdownTimedOut(Duration),
}

//! Cron scheduler with fleet-wide mutual exclusion.
//!
//! - [`Scheduler`]: runs registered [`ScheduledJob`]s on cron schedules,
//!   one tracked task per tick, with bounded shutdown.
//! - [`SingleConnection`]: a database session pinned outside the pool and
//!   used only for PostgreSQL advisory locks.
//! - [`ExclusiveJob`]: wraps a handler so that, per tick, only the process
//!   instance holding the advisory lock for the job id runs it.

pub mod error;
pub mod job;
pub mod lock;
pub mod scheduler;

pub use error::SchedulerError;
pub use job::{job_fn, FnJob, JobHandler, JobParameters, ScheduledJob};
pub use lock::{ExclusiveJob, SingleConnection};
pub use scheduler::Scheduler;

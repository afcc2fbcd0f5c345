//! Cron scheduler.
//!
//! [`Scheduler`] owns one timer task per registered job. When a job's next
//! cron instant arrives the timer spawns the tick on its own task, so a
//! slow tick never delays the following one and jobs never block each
//! other. All tasks are tracked so [`Scheduler::close`] can wait for
//! in-flight ticks within a bounded window.

use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use casari_core::{panic_message, SchedulerConfig};
use chrono::Utc;
use cron::Schedule;
use futures::FutureExt;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::job::ScheduledJob;
use crate::lock::SingleConnection;

struct RegisteredJob {
    id: Uuid,
    schedule: Schedule,
    job: ScheduledJob,
}

/// Runs periodic jobs on cron schedules.
pub struct Scheduler {
    config: SchedulerConfig,
    jobs: Mutex<Vec<Arc<RegisteredJob>>>,
    started: AtomicBool,
    cancel: CancellationToken,
    tracker: TaskTracker,
    single_connection: OnceCell<Arc<SingleConnection>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        tracing::info!(
            shutdown_timeout_secs = config.shutdown_timeout.as_secs(),
            "Scheduler created"
        );
        Self {
            config,
            jobs: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            single_connection: OnceCell::new(),
        }
    }

    /// Register a job against its cron schedule.
    ///
    /// Jobs added after [`init`](Self::init) start ticking immediately.
    /// Returns the id assigned to the registration.
    pub fn add_job(&self, job: ScheduledJob) -> Result<Uuid, SchedulerError> {
        if self.cancel.is_cancelled() {
            return Err(SchedulerError::Closed);
        }

        let schedule = parse_schedule(&job.schedule).inspect_err(|e| {
            tracing::error!(
                job = %job.parameters.title,
                error = %e,
                "Failed to schedule a new job"
            );
        })?;

        let registered = Arc::new(RegisteredJob {
            id: Uuid::now_v7(),
            schedule,
            job,
        });
        tracing::info!(
            registration_id = %registered.id,
            job = %registered.job.parameters.title,
            job_id = registered.job.parameters.job_id,
            schedule = %registered.job.schedule,
            "New job scheduled"
        );

        let id = registered.id;
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.push(Arc::clone(&registered));
        drop(jobs);

        if self.started.load(Ordering::SeqCst) {
            self.spawn_timer(registered);
        }
        Ok(id)
    }

    /// Start ticking every registered job.
    ///
    /// Calling `init` twice is harmless; the second call is ignored.
    pub fn init(&self) -> Result<(), SchedulerError> {
        if self.cancel.is_cancelled() {
            return Err(SchedulerError::Closed);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Scheduler already started");
            return Ok(());
        }

        let jobs: Vec<_> = self
            .jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect();
        for job in jobs {
            self.spawn_timer(job);
        }
        tracing::info!("Scheduler started");
        Ok(())
    }

    /// Stop the scheduler.
    ///
    /// No new ticks start after this call. Waits for ticks already running,
    /// up to the configured shutdown timeout.
    pub async fn close(&self) -> Result<(), SchedulerError> {
        tracing::info!("Closing scheduler");
        self.cancel.cancel();
        self.tracker.close();

        let timeout = self.config.shutdown_timeout;
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                in_flight = self.tracker.len(),
                "Scheduler shutdown window elapsed with ticks still running"
            );
            return Err(SchedulerError::ShutdownTimedOut(timeout));
        }
        tracing::info!("Scheduler closed");
        Ok(())
    }

    /// The database session this scheduler uses for advisory locks.
    ///
    /// Opened on first use by detaching one connection from `pool`; every
    /// later call returns the same session.
    pub async fn single_connection(
        &self,
        pool: &PgPool,
    ) -> Result<Arc<SingleConnection>, sqlx::Error> {
        self.single_connection
            .get_or_try_init(|| async { SingleConnection::open(pool).await.map(Arc::new) })
            .await
            .map(Arc::clone)
    }

    /// Number of registered jobs.
    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn spawn_timer(&self, job: Arc<RegisteredJob>) {
        let cancel = self.cancel.clone();
        let tracker = self.tracker.clone();

        self.tracker.spawn(async move {
            loop {
                let Some(next) = job.schedule.upcoming(Utc).next() else {
                    tracing::info!(job = %job.job.parameters.title, "Schedule exhausted");
                    break;
                };
                let delay = (next - Utc::now()).to_std().unwrap_or_default();

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                tracker.spawn(run_tick(Arc::clone(&job)));
            }
        });
    }
}

/// Run one tick of a job. Errors and panics end the tick and are logged;
/// the next tick is unaffected.
async fn run_tick(job: Arc<RegisteredJob>) {
    let params = &job.job.parameters;
    tracing::debug!(job = %params.title, job_id = params.job_id, "Tick started");

    match AssertUnwindSafe(job.job.handler.run(params))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => {
            tracing::debug!(job = %params.title, job_id = params.job_id, "Tick finished");
        }
        Ok(Err(e)) => {
            tracing::error!(
                job = %params.title,
                job_id = params.job_id,
                error = %format!("{e:#}"),
                "Scheduled job failed"
            );
        }
        Err(panic) => {
            tracing::error!(
                job = %params.title,
                job_id = params.job_id,
                panic = %panic_message(&*panic),
                "Panic occurred in scheduled job"
            );
        }
    }
}

/// Parse a cron expression, accepting the classic five-field form.
///
/// Five-field expressions are minute-granular; they are run at second 0.
fn parse_schedule(expression: &str) -> Result<Schedule, SchedulerError> {
    let normalized = normalize_expression(expression);
    Schedule::from_str(&normalized).map_err(|source| SchedulerError::InvalidSchedule {
        expression: expression.to_string(),
        source,
    })
}

/// Crontab day-of-week numbering: `0` and `7` are Sunday.
const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Rewrite a crontab line into the second-aware dialect `cron` parses.
///
/// The `cron` crate counts weekdays from Sunday = 1, so numeric weekdays in
/// five-field input are translated to names. Six and seven field input is
/// already in that dialect and only has its whitespace collapsed.
fn normalize_expression(expression: &str) -> String {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.as_slice() {
        [minute, hour, day_of_month, month, day_of_week] => format!(
            "0 {minute} {hour} {day_of_month} {month} {}",
            crontab_day_of_week(day_of_week)
        ),
        _ => fields.join(" "),
    }
}

fn crontab_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(crontab_day_of_week_item)
        .collect::<Vec<_>>()
        .join(",")
}

/// Translate one list item (`n`, `a-b`, `*/s`, `a-b/s`, `a/s`). Anything
/// that is not numeric crontab syntax is passed through for `cron` to
/// accept or reject.
fn crontab_day_of_week_item(item: &str) -> String {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => match step.parse::<usize>() {
            Ok(step) if step > 0 => (range, step),
            _ => return item.to_string(),
        },
        None => (item, 1),
    };

    let bounds = match range {
        "*" if step == 1 => return item.to_string(),
        "*" => Some((0, 6)),
        _ => match range.split_once('-') {
            Some((first, last)) => weekday_number(first).zip(weekday_number(last)),
            None if step > 1 => weekday_number(range).map(|first| (first, 6)),
            None => weekday_number(range).map(|day| (day, day)),
        },
    };
    let Some((first, last)) = bounds.filter(|(first, last)| first <= last) else {
        return item.to_string();
    };

    let mut days: Vec<&str> = Vec::new();
    for day in (first..=last).step_by(step) {
        let name = WEEKDAYS[day % 7];
        if !days.contains(&name) {
            days.push(name);
        }
    }
    days.join(",")
}

fn weekday_number(value: &str) -> Option<usize> {
    value.parse::<usize>().ok().filter(|day| *day <= 7)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use chrono::{Datelike, Weekday};

    use super::*;
    use crate::job::{job_fn, JobParameters};

    fn scheduler(shutdown_timeout: Duration) -> Scheduler {
        Scheduler::new(SchedulerConfig { shutdown_timeout })
    }

    fn explode() -> anyhow::Result<()> {
        panic!("job body exploded")
    }

    async fn wait_for(counter: &AtomicUsize, at_least: usize, within: Duration) -> bool {
        tokio::time::timeout(within, async {
            while counter.load(Ordering::SeqCst) < at_least {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .is_ok()
    }

    #[test]
    fn five_field_expressions_gain_a_seconds_field() {
        assert_eq!(normalize_expression("0 * * * *"), "0 0 * * * *");
        assert_eq!(normalize_expression("*/5  *  * * *"), "0 */5 * * * *");
        assert_eq!(normalize_expression("* * * * * *"), "* * * * * *");
    }

    /// Weekdays of the next `count` fire times of a five-field expression.
    fn upcoming_weekdays(expression: &str, count: usize) -> Vec<Weekday> {
        parse_schedule(expression)
            .unwrap()
            .upcoming(Utc)
            .take(count)
            .map(|at| at.weekday())
            .collect()
    }

    #[test]
    fn crontab_weekday_numbers_become_names() {
        assert_eq!(normalize_expression("0 9 * * 1"), "0 0 9 * * MON");
        assert_eq!(normalize_expression("0 9 * * 0"), "0 0 9 * * SUN");
        assert_eq!(normalize_expression("0 9 * * 7"), "0 0 9 * * SUN");
        assert_eq!(
            normalize_expression("0 9 * * 1-5"),
            "0 0 9 * * MON,TUE,WED,THU,FRI"
        );
        assert_eq!(normalize_expression("0 9 * * 5-7"), "0 0 9 * * FRI,SAT,SUN");
        assert_eq!(normalize_expression("0 9 * * */2"), "0 0 9 * * SUN,TUE,THU,SAT");
        assert_eq!(normalize_expression("0 9 * * 1,3"), "0 0 9 * * MON,WED");
        assert_eq!(normalize_expression("0 9 * * MON-FRI"), "0 0 9 * * MON-FRI");
        assert_eq!(normalize_expression("0 9 * * *"), "0 0 9 * * *");
    }

    #[test]
    fn monday_fires_on_mondays() {
        let days = upcoming_weekdays("* * * * 1", 5);
        assert!(days.iter().all(|d| *d == Weekday::Mon), "{days:?}");

        let days = upcoming_weekdays("0 9 * * 1", 5);
        assert!(days.iter().all(|d| *d == Weekday::Mon), "{days:?}");
    }

    #[test]
    fn zero_and_seven_both_mean_sunday() {
        for expression in ["* * * * 0", "0 9 * * 0", "0 9 * * 7"] {
            let days = upcoming_weekdays(expression, 3);
            assert!(days.iter().all(|d| *d == Weekday::Sun), "{expression}: {days:?}");
        }
    }

    #[test]
    fn weekday_range_skips_the_weekend() {
        let days = upcoming_weekdays("0 9 * * 1-5", 10);

        assert!(!days.contains(&Weekday::Sat) && !days.contains(&Weekday::Sun));
        for day in [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri] {
            assert!(days.contains(&day), "{day:?} missing from {days:?}");
        }

        let minutely = upcoming_weekdays("* * * * 1-5", 1);
        assert_ne!(minutely[0], Weekday::Sat);
        assert_ne!(minutely[0], Weekday::Sun);
    }

    #[test]
    fn out_of_range_weekday_is_rejected() {
        assert!(parse_schedule("0 9 * * 8").is_err());
    }

    #[test]
    fn hourly_schedule_fires_on_the_hour() {
        let schedule = parse_schedule("0 * * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.format("%M:%S").to_string(), "00:00");
    }

    #[test]
    fn invalid_expression_is_rejected() {
        let scheduler = scheduler(Duration::from_secs(1));
        let job = ScheduledJob::new(
            "not a cron line",
            job_fn(|_| async { Ok(()) }),
            JobParameters::new("Broken", 1),
        );

        assert_matches!(
            scheduler.add_job(job),
            Err(SchedulerError::InvalidSchedule { expression, .. }) if expression == "not a cron line"
        );
        assert_eq!(scheduler.job_count(), 0);
    }

    #[tokio::test]
    async fn registered_job_runs_after_init() {
        let scheduler = scheduler(Duration::from_secs(2));
        let runs = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&runs);

        scheduler
            .add_job(ScheduledJob::new(
                "* * * * * *",
                job_fn(move |params: JobParameters| {
                    let seen = Arc::clone(&seen);
                    async move {
                        assert_eq!(params.job_id, 42);
                        seen.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
                JobParameters::new("EverySecond", 42),
            ))
            .unwrap();

        // Nothing runs before init.
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        scheduler.init().unwrap();
        assert!(wait_for(&runs, 1, Duration::from_secs(3)).await);

        scheduler.close().await.unwrap();
    }

    #[tokio::test]
    async fn panicking_job_keeps_ticking() {
        let scheduler = scheduler(Duration::from_secs(2));
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);

        scheduler.init().unwrap();
        scheduler
            .add_job(ScheduledJob::new(
                "* * * * * *",
                job_fn(move |_| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        explode()
                    }
                }),
                JobParameters::new("Panicky", 7),
            ))
            .unwrap();

        assert!(wait_for(&attempts, 2, Duration::from_secs(4)).await);
        scheduler.close().await.unwrap();
    }

    #[tokio::test]
    async fn failing_job_keeps_ticking() {
        let scheduler = scheduler(Duration::from_secs(2));
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);

        scheduler
            .add_job(ScheduledJob::new(
                "* * * * * *",
                job_fn(move |_| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        anyhow::bail!("transient failure")
                    }
                }),
                JobParameters::new("Failing", 8),
            ))
            .unwrap();
        scheduler.init().unwrap();

        assert!(wait_for(&attempts, 2, Duration::from_secs(4)).await);
        scheduler.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_gives_up_after_the_shutdown_window() {
        let scheduler = scheduler(Duration::from_millis(100));
        let started = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&started);

        scheduler
            .add_job(ScheduledJob::new(
                "* * * * * *",
                job_fn(move |_| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(())
                    }
                }),
                JobParameters::new("Slow", 9),
            ))
            .unwrap();
        scheduler.init().unwrap();
        assert!(wait_for(&started, 1, Duration::from_secs(3)).await);

        assert_matches!(
            scheduler.close().await,
            Err(SchedulerError::ShutdownTimedOut(d)) if d == Duration::from_millis(100)
        );
    }

    #[tokio::test]
    async fn no_tick_starts_once_close_returns() {
        let scheduler = scheduler(Duration::from_secs(2));
        let runs = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&runs);
        scheduler
            .add_job(ScheduledJob::new(
                "* * * * * *",
                job_fn(move |_| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
                JobParameters::new("EverySecond", 43),
            ))
            .unwrap();
        scheduler.init().unwrap();
        assert!(wait_for(&runs, 1, Duration::from_secs(3)).await);

        // Close right on a second boundary, where the timer is also due.
        let now = Utc::now();
        let to_boundary = 1_000_000_000_u64.saturating_sub(u64::from(now.timestamp_subsec_nanos()));
        tokio::time::sleep(Duration::from_nanos(to_boundary)).await;
        scheduler.close().await.unwrap();
        let at_close = runs.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), at_close);
    }

    #[tokio::test]
    async fn closed_scheduler_rejects_new_jobs() {
        let scheduler = scheduler(Duration::from_secs(1));
        scheduler.close().await.unwrap();

        let job = ScheduledJob::new(
            "0 * * * *",
            job_fn(|_| async { Ok(()) }),
            JobParameters::new("Late", 3),
        );
        assert_matches!(scheduler.add_job(job), Err(SchedulerError::Closed));
        assert_matches!(scheduler.init(), Err(SchedulerError::Closed));
    }
}

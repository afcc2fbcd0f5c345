//! Leader-per-tick mutual exclusion on PostgreSQL advisory locks.
//!
//! Session advisory locks belong to the database session that took them,
//! so the lock calls go through a [`SingleConnection`]: one connection
//! detached from the pool and held for the life of the scheduler.
//!
//! Every tick first releases whatever this session held for the job id and
//! then tries to take it again without blocking. Leadership is therefore
//! re-contested on each tick instead of being held for a long term.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use casari_core::panic_message;
use casari_core::types::LockKey;
use futures::FutureExt;
use sqlx::{Connection, PgConnection, PgPool};
use tokio::sync::Mutex;

use crate::job::{JobHandler, JobParameters};

/// A database session pinned outside the pool, used only for advisory locks.
pub struct SingleConnection {
    conn: Mutex<PgConnection>,
}

impl SingleConnection {
    /// Take one connection out of `pool` for exclusive, long-lived use.
    ///
    /// The connection is detached, so the pool never hands it to anyone else
    /// and opens a replacement when it needs one.
    pub async fn open(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let conn = pool.acquire().await?.detach();
        let single = Self {
            conn: Mutex::new(conn),
        };
        let pid = single.backend_pid().await?;
        tracing::info!(connection_id = pid, "Single connection opened for advisory locks");
        Ok(single)
    }

    /// Backend process id of the pinned session.
    pub async fn backend_pid(&self) -> Result<i32, sqlx::Error> {
        let mut conn = self.conn.lock().await;
        sqlx::query_scalar("SELECT pg_backend_pid()")
            .fetch_one(&mut *conn)
            .await
    }

    /// Try to become the sole executor of `job_id` for this tick.
    ///
    /// Releases any lock this session already holds for `job_id`, then makes
    /// a single non-blocking acquisition attempt. Returns `true` only when
    /// the lock is now held by this session. Any database error counts as
    /// "not acquired", so the caller skips the tick rather than risk a
    /// double execution.
    pub async fn acquire_lock(&self, job_id: LockKey) -> bool {
        let mut conn = self.conn.lock().await;

        let connection_id: i32 = match sqlx::query_scalar("SELECT pg_backend_pid()")
            .fetch_one(&mut *conn)
            .await
        {
            Ok(pid) => pid,
            Err(e) => {
                tracing::error!(
                    job_id,
                    error = %e,
                    "Error getting backend pid, connection unusable for locking"
                );
                return false;
            }
        };

        // Usually false: first tick, or another session holds the lock.
        match sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
            .bind(job_id)
            .fetch_one(&mut *conn)
            .await
        {
            Ok(true) => tracing::debug!(connection_id, job_id, "Lock released"),
            Ok(false) => tracing::debug!(connection_id, job_id, "Lock not held, nothing to release"),
            Err(e) => {
                tracing::error!(connection_id, job_id, error = %e, "Lock release failed");
                return false;
            }
        }

        match sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
            .bind(job_id)
            .fetch_one(&mut *conn)
            .await
        {
            Ok(true) => {
                tracing::debug!(connection_id, job_id, "Lock acquired");
                true
            }
            Ok(false) => {
                tracing::debug!(
                    connection_id,
                    job_id,
                    "Lock not acquired, another instance is running this job"
                );
                false
            }
            Err(e) => {
                tracing::error!(connection_id, job_id, error = %e, "Lock acquisition failed");
                false
            }
        }
    }

    /// Terminate the session. Locks it held are released by the server.
    pub async fn close(self) -> Result<(), sqlx::Error> {
        self.conn.into_inner().close().await
    }
}

/// Runs the inner handler only on the instance that wins the advisory lock
/// for the job id on this tick.
///
/// Panics in the inner handler are caught and logged here so they never
/// reach the scheduler.
pub struct ExclusiveJob<H> {
    connection: Arc<SingleConnection>,
    inner: H,
}

impl<H: JobHandler> ExclusiveJob<H> {
    pub fn new(connection: Arc<SingleConnection>, inner: H) -> Self {
        Self { connection, inner }
    }
}

#[async_trait]
impl<H: JobHandler> JobHandler for ExclusiveJob<H> {
    async fn run(&self, params: &JobParameters) -> anyhow::Result<()> {
        if !self.connection.acquire_lock(params.job_id).await {
            tracing::debug!(job = %params.title, job_id = params.job_id, "Skipping tick");
            return Ok(());
        }

        tracing::info!(job = %params.title, "Starting cron job");
        match AssertUnwindSafe(self.inner.run(params)).catch_unwind().await {
            Ok(Ok(())) => {
                tracing::info!(job = %params.title, "Cron job executed");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(panic) => {
                tracing::error!(
                    job = %params.title,
                    job_id = params.job_id,
                    panic = %panic_message(&*panic),
                    "Panic occurred in cron activity"
                );
                Ok(())
            }
        }
    }
}

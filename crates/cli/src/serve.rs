//! Long-running process: event bus, consumers and cron scheduler.

use std::time::Duration;

use casari_core::AppConfig;
use casari_db::DbPool;
use casari_events::{register_retention_job, spawn_consumer, EventBus, EventLogger, Topic};
use casari_scheduler::Scheduler;

/// How long each consumer gets to drain its queue after the bus closes.
const CONSUMER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(config: &AppConfig, pool: DbPool) -> anyhow::Result<()> {
    // --- Event bus ---
    let bus = EventBus::new(config.pubsub.clone());
    let consumers: Vec<_> = Topic::WELL_KNOWN
        .into_iter()
        .filter_map(|topic| spawn_consumer(&bus, topic, EventLogger))
        .collect();
    tracing::info!(
        consumers = consumers.len(),
        dispatch_mode = ?config.pubsub.dispatch_mode,
        persist_events = config.pubsub.persist_events,
        "Event bus started"
    );

    // --- Scheduler ---
    let scheduler = Scheduler::new(config.scheduler.clone());
    register_retention_job(&scheduler, &pool, &config.pubsub).await?;
    scheduler.init()?;
    tracing::info!(jobs = scheduler.job_count(), "Scheduler started");

    shutdown_signal().await;

    // --- Shutdown ---
    if let Err(e) = scheduler.close().await {
        tracing::warn!(error = %e, "Scheduler did not shut down cleanly");
    }
    bus.shutdown().await;
    for consumer in consumers {
        if tokio::time::timeout(CONSUMER_DRAIN_TIMEOUT, consumer).await.is_err() {
            tracing::warn!("Consumer did not stop within the drain timeout");
        }
    }
    drop(scheduler);
    pool.close().await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
///
/// If a handler cannot be installed that signal is simply never observed;
/// the other one still triggers shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

//! `event-replay`: re-drive stored events through the consumers.

use casari_core::{AppConfig, DispatchMode, PubSubConfig};
use casari_db::DbPool;
use casari_events::{spawn_consumer, EventBus, EventLogger, ReplayFilter, Topic};

use crate::cli::ReplayArgs;

pub async fn run(config: &AppConfig, pool: DbPool, args: ReplayArgs) -> anyhow::Result<()> {
    let filter = ReplayFilter {
        topic: args.topic_name.map(Topic::from),
        start_from: args.start_from,
    };

    // Replay never writes to the outbox, and waits on every event anyway.
    let bus = EventBus::new(PubSubConfig {
        persist_events: false,
        dispatch_mode: DispatchMode::Sync,
        ..config.pubsub.clone()
    });
    let topics = match &filter.topic {
        Some(topic) => vec![topic.clone()],
        None => Topic::WELL_KNOWN.to_vec(),
    };
    let consumers: Vec<_> = topics
        .into_iter()
        .filter_map(|topic| spawn_consumer(&bus, topic, EventLogger))
        .collect();

    let mut tx = pool.begin().await?;
    let outcome = bus.replay(&mut tx, &filter).await;
    tx.commit().await?;

    bus.shutdown().await;
    for consumer in consumers {
        consumer.await?;
    }
    pool.close().await;

    let replayed = outcome?;
    tracing::info!(replayed, "Event replay complete");
    Ok(())
}

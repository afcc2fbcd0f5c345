//! Re-driving stored events through the bus.

use std::sync::Arc;

use casari_core::types::Timestamp;
use casari_db::repositories::OutboxEventRepo;
use futures::TryStreamExt;
use sqlx::PgConnection;

use crate::bus::EventBus;
use crate::error::EventError;
use crate::event::{Event, EventType, Topic};

/// Which outbox rows to replay. Empty filters match everything.
#[derive(Debug, Clone, Default)]
pub struct ReplayFilter {
    pub topic: Option<Topic>,
    /// Inclusive lower bound on the event time.
    pub start_from: Option<Timestamp>,
}

impl EventBus {
    /// Re-publish stored events, oldest first, waiting for each to be
    /// acknowledged before moving on.
    ///
    /// Events are not persisted again and keep their original id and time.
    /// A row whose type is unknown aborts the replay with
    /// [`EventError::UnsupportedEventType`]; events already dispatched stay
    /// dispatched. Returns the number of events replayed.
    pub async fn replay(
        &self,
        conn: &mut PgConnection,
        filter: &ReplayFilter,
    ) -> Result<u64, EventError> {
        tracing::info!(
            topic = filter.topic.as_ref().map(Topic::as_str),
            start_from = ?filter.start_from,
            "Replaying stored events"
        );

        let mut rows = OutboxEventRepo::stream(
            &mut *conn,
            filter.topic.as_ref().map(Topic::to_string),
            filter.start_from,
        );

        let mut replayed = 0u64;
        while let Some(row) = rows.try_next().await? {
            if let Err(e) = row.event_type.parse::<EventType>() {
                tracing::error!(event_id = %row.id, event_type = %row.event_type, "Unsupported event type in outbox");
                return Err(e);
            }
            let event = Event::decode(row.event_body)?;
            let topic = Topic::from(row.topic);

            tracing::debug!(
                topic = %topic,
                event_id = %event.id(),
                event_type = %event.event_type(),
                "Replaying event"
            );
            self.dispatch(&topic, Arc::new(event)).await;
            replayed += 1;
        }

        tracing::info!(replayed, "Replay finished");
        Ok(replayed)
    }
}

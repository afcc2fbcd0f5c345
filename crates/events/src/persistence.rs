//! Durable outbox writes.
//!
//! An event is written in the same transaction as the domain change that
//! produced it, so the outbox row exists if and only if that transaction
//! committed. Publishing happens afterwards, from the returned
//! [`PendingEvent`].

use casari_db::models::outbox_event::CreateOutboxEvent;
use casari_db::repositories::OutboxEventRepo;
use sqlx::PgConnection;

use crate::bus::{EventBus, PendingEvent};
use crate::error::EventError;
use crate::event::{Event, Topic};

impl EventBus {
    /// Record `event` in the outbox through the caller's open transaction.
    ///
    /// Pass the transaction as `&mut *tx`. With persistence disabled nothing
    /// is written. Any error must make the caller roll back.
    pub async fn persist(
        &self,
        conn: &mut PgConnection,
        topic: impl Into<Topic>,
        event: Event,
    ) -> Result<PendingEvent, EventError> {
        let topic = topic.into();
        if !self.config().persist_events {
            return Ok(PendingEvent::new(topic, event));
        }

        let row = CreateOutboxEvent {
            id: event.id(),
            topic: topic.to_string(),
            event_type: event.event_type().as_str().to_string(),
            event_date: event.time(),
            event_body: serde_json::to_value(&event)?,
        };
        OutboxEventRepo::insert(&mut *conn, &row).await?;

        tracing::debug!(
            topic = %topic,
            event_id = %row.id,
            event_type = %row.event_type,
            "Event written to outbox"
        );
        Ok(PendingEvent::new(topic, event))
    }
}

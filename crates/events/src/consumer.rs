//! Subscriber loop.

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use casari_core::panic_message;
use futures::FutureExt;
use tokio::task::JoinHandle;

use crate::bus::{EventBus, Subscription};
use crate::event::{Event, Topic};

/// Processes events received on one topic.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, topic: &Topic, event: &Event) -> anyhow::Result<()>;
}

/// Subscribe `handler` to `topic` and run it on a background task.
///
/// Each message is acknowledged after the handler returns, whether it
/// succeeded, failed or panicked; failures are logged and the loop moves on
/// to the next message. The task ends when the bus closes. Returns `None`
/// if the bus is already closed.
pub fn spawn_consumer<H: EventHandler>(
    bus: &EventBus,
    topic: impl Into<Topic>,
    handler: H,
) -> Option<JoinHandle<()>> {
    let subscription = bus.subscribe(topic)?;
    Some(tokio::spawn(consume(subscription, handler)))
}

async fn consume<H: EventHandler>(mut subscription: Subscription, handler: H) {
    tracing::info!(topic = %subscription.topic(), "Consumer started");

    while let Some(message) = subscription.recv().await {
        let (topic, event, token) = message.into_parts();

        match AssertUnwindSafe(handler.handle(&topic, &event))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(
                topic = %topic,
                event_id = %event.id(),
                error = %e,
                "Event handler failed"
            ),
            Err(panic) => tracing::error!(
                topic = %topic,
                event_id = %event.id(),
                panic = %panic_message(&*panic),
                "Panic while handling event"
            ),
        }
        token.ack();
    }

    tracing::info!(topic = %subscription.topic(), "Consumer stopped, queue closed");
}

/// Handler that logs every event it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventLogger;

#[async_trait]
impl EventHandler for EventLogger {
    async fn handle(&self, topic: &Topic, event: &Event) -> anyhow::Result<()> {
        tracing::info!(
            topic = %topic,
            event_id = %event.id(),
            event_type = %event.event_type(),
            entity_id = %event.entity().entity_id(),
            changed_fields = ?event.changed_fields(),
            "Event received"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use crate::event::EventType;
use crate::payload::PayloadKind;

/// Errors raised while building, persisting or replaying events.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// A stored event names a type this build does not know. Fatal for
    /// replay.
    #[error("unsupported event type: {0}")]
    UnsupportedEventType(String),

    #[error("event type {event_type} carries a {expected} payload, got {actual}")]
    PayloadMismatch {
        event_type: EventType,
        expected: PayloadKind,
        actual: PayloadKind,
    },

    #[error("event serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Scheduler(#[from] casari_scheduler::SchedulerError),
}

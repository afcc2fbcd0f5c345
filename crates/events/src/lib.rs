//! Casari event distribution.
//!
//! - [`EventBus`]: in-process topic bus; a publish completes once every
//!   subscriber acknowledged the event.
//! - [`EventBus::persist`]: transactional outbox write, returning the
//!   [`PendingEvent`] to publish after commit.
//! - [`EventBus::replay`]: re-drives stored events in chronological order.
//! - [`spawn_consumer`]: subscriber loop with panic recovery.
//! - [`register_retention_job`]: hourly outbox cleanup on the scheduler.
//! - [`diff`]: changed-field detection for update events.

mod barrier;
pub mod bus;
pub mod consumer;
pub mod diff;
pub mod error;
pub mod event;
pub mod payload;
mod persistence;
pub mod replay;
pub mod retention;

pub use barrier::CompletionToken;
pub use bus::{EventBus, Message, PendingEvent, Subscription};
pub use consumer::{spawn_consumer, EventHandler, EventLogger};
pub use error::EventError;
pub use event::{Event, EventType, Topic};
pub use payload::{
    CourseSnapshot, EventPayload, MenuCategorySnapshot, MenuItemSnapshot, MenuOptionSnapshot,
    PaymentMethod, PayloadKind, PrinterSnapshot, TableSnapshot,
};
pub use replay::ReplayFilter;
pub use retention::{register_retention_job, OutboxRetention};

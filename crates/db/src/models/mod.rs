//! Database row models.

pub mod outbox_event;

//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept a `PgExecutor` (pool, connection or open transaction) as the
//! first argument.

pub mod outbox_event_repo;

pub use outbox_event_repo::OutboxEventRepo;

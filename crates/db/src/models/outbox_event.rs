//! Outbox row model.

use casari_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `event_outbox` table.
///
/// `event_body` holds the full serialized event envelope; `topic`,
/// `event_type` and `event_date` are copied out of it for filtering.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub topic: String,
    pub event_type: String,
    pub event_date: Timestamp,
    pub event_body: serde_json::Value,
}

/// DTO for inserting an outbox row.
#[derive(Debug, Clone)]
pub struct CreateOutboxEvent {
    pub id: Uuid,
    pub topic: String,
    pub event_type: String,
    pub event_date: Timestamp,
    pub event_body: serde_json::Value,
}

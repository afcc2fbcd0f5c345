//! Repository for the `event_outbox` table (append-only, never updated).

use casari_core::types::Timestamp;
use futures::stream::BoxStream;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::outbox_event::{CreateOutboxEvent, OutboxEvent};

/// Column list for `event_outbox` queries.
const COLUMNS: &str = "id, topic, event_type, event_date, event_body";

/// Chronological scan with optional topic and lower-bound filters.
///
/// `NULL` parameters disable their filter, which keeps the query text
/// static so the returned stream can borrow it for its whole lifetime.
const STREAM_QUERY: &str = "\
    SELECT id, topic, event_type, event_date, event_body FROM event_outbox \
    WHERE ($1::VARCHAR IS NULL OR topic = $1) \
      AND ($2::TIMESTAMPTZ IS NULL OR event_date >= $2) \
    ORDER BY event_date ASC, id ASC";

/// Provides insert, scan and retention operations for outbox rows.
pub struct OutboxEventRepo;

impl OutboxEventRepo {
    /// Insert one outbox row.
    ///
    /// Callers pass the open domain transaction (`&mut *tx`) so the row
    /// commits or rolls back together with the write it describes.
    pub async fn insert<'e, E>(executor: E, event: &CreateOutboxEvent) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            "INSERT INTO event_outbox (id, topic, event_type, event_date, event_body) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.id)
        .bind(&event.topic)
        .bind(&event.event_type)
        .bind(event.event_date)
        .bind(&event.event_body)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Find a single row by event id.
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<OutboxEvent>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {COLUMNS} FROM event_outbox WHERE id = $1");
        sqlx::query_as::<_, OutboxEvent>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Stream rows ordered by `event_date` ascending.
    ///
    /// Rows are pulled from the server as the stream is polled rather than
    /// materialised up front, so memory stays flat for large windows.
    /// `since` is inclusive.
    pub fn stream<'e, E>(
        executor: E,
        topic: Option<String>,
        since: Option<Timestamp>,
    ) -> BoxStream<'e, Result<OutboxEvent, sqlx::Error>>
    where
        E: PgExecutor<'e> + 'e,
    {
        sqlx::query_as::<_, OutboxEvent>(STREAM_QUERY)
            .bind(topic)
            .bind(since)
            .fetch(executor)
    }

    /// Delete every row whose `event_date` is strictly before `cutoff`.
    ///
    /// Returns the number of rows removed.
    pub async fn delete_older_than<'e, E>(executor: E, cutoff: Timestamp) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM event_outbox WHERE event_date < $1")
            .bind(cutoff)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    /// Count all rows. Used by diagnostics and tests.
    pub async fn count<'e, E>(executor: E) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM event_outbox")
            .fetch_one(executor)
            .await
    }
}

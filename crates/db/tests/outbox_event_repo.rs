//! Integration tests for the outbox repository.
//!
//! Exercises insert/scan/retention against a real database:
//! - Rows inserted in a rolled-back transaction never become visible
//! - The scan stream is chronological and honours both filters
//! - Retention removes only rows strictly older than the cutoff

use chrono::{Duration, TimeZone, Utc};
use futures::TryStreamExt;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use casari_db::models::outbox_event::CreateOutboxEvent;
use casari_db::repositories::OutboxEventRepo;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_row(topic: &str, event_type: &str, event_date: chrono::DateTime<Utc>) -> CreateOutboxEvent {
    let id = Uuid::new_v4();
    CreateOutboxEvent {
        id,
        topic: topic.to_string(),
        event_type: event_type.to_string(),
        event_date,
        event_body: json!({ "eventId": id, "eventType": event_type }),
    }
}

fn at(hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn rolled_back_insert_is_not_visible(pool: PgPool) {
    let row = new_row("topic/v1/table", "table.created", at(9));

    let mut tx = pool.begin().await.unwrap();
    OutboxEventRepo::insert(&mut *tx, &row).await.unwrap();
    tx.rollback().await.unwrap();

    assert!(OutboxEventRepo::find_by_id(&pool, row.id).await.unwrap().is_none());
    assert_eq!(OutboxEventRepo::count(&pool).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn committed_insert_is_visible_once(pool: PgPool) {
    let row = new_row("topic/v1/table", "table.created", at(9));

    let mut tx = pool.begin().await.unwrap();
    OutboxEventRepo::insert(&mut *tx, &row).await.unwrap();
    tx.commit().await.unwrap();

    let stored = OutboxEventRepo::find_by_id(&pool, row.id)
        .await
        .unwrap()
        .expect("row should exist after commit");
    assert_eq!(stored.topic, "topic/v1/table");
    assert_eq!(stored.event_type, "table.created");
    assert_eq!(stored.event_date, at(9));
    assert_eq!(stored.event_body["eventType"], "table.created");
    assert_eq!(OutboxEventRepo::count(&pool).await.unwrap(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn duplicate_event_id_is_rejected(pool: PgPool) {
    let row = new_row("topic/v1/table", "table.created", at(9));

    OutboxEventRepo::insert(&pool, &row).await.unwrap();
    let second = OutboxEventRepo::insert(&pool, &row).await;

    assert!(second.is_err(), "primary key must reject a repeated event id");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stream_is_chronological_and_filtered(pool: PgPool) {
    // Inserted out of order on purpose.
    let late_table = new_row("topic/v1/table", "table.updated", at(12));
    let early_table = new_row("topic/v1/table", "table.created", at(8));
    let mid_item = new_row("topic/v1/menu-item", "menu-item.created", at(10));
    for row in [&late_table, &early_table, &mid_item] {
        OutboxEventRepo::insert(&pool, row).await.unwrap();
    }

    let all: Vec<_> = OutboxEventRepo::stream(&pool, None, None)
        .try_collect()
        .await
        .unwrap();
    let ids: Vec<_> = all.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![early_table.id, mid_item.id, late_table.id]);

    let tables_only: Vec<_> =
        OutboxEventRepo::stream(&pool, Some("topic/v1/table".to_string()), None)
            .try_collect()
            .await
            .unwrap();
    assert_eq!(tables_only.len(), 2);
    assert!(tables_only.iter().all(|r| r.topic == "topic/v1/table"));

    // Lower bound is inclusive.
    let from_ten: Vec<_> = OutboxEventRepo::stream(&pool, None, Some(at(10)))
        .try_collect()
        .await
        .unwrap();
    let ids: Vec<_> = from_ten.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![mid_item.id, late_table.id]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delete_older_than_keeps_recent_rows(pool: PgPool) {
    let now = Utc::now();
    let expired = new_row("topic/v1/table", "table.created", now - Duration::days(40));
    let fresh = new_row("topic/v1/table", "table.updated", now - Duration::days(2));
    OutboxEventRepo::insert(&pool, &expired).await.unwrap();
    OutboxEventRepo::insert(&pool, &fresh).await.unwrap();

    let deleted = OutboxEventRepo::delete_older_than(&pool, now - Duration::days(30))
        .await
        .unwrap();

    assert_eq!(deleted, 1);
    assert!(OutboxEventRepo::find_by_id(&pool, expired.id).await.unwrap().is_none());
    assert!(OutboxEventRepo::find_by_id(&pool, fresh.id).await.unwrap().is_some());
}

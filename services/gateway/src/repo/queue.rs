//! Durable queue relation: publish / pop / ack / delay over `queue_messages`.
//!
//! Delivery semantics are at-least-once with a visibility timeout: `pop`
//! atomically claims the oldest visible message (skipping rows locked by
//! concurrent consumers) and pushes its `visible_at` forward; a consumer that
//! dies mid-message lets it reappear after the timeout. `ack` deletes.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use sqlx::Row;

/// The two durable queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueName {
    Retry,
    DeadLetter,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Retry => "retry",
            QueueName::DeadLetter => "dead_letter",
        }
    }
}

pub struct QueueMessageRow {
    pub id: i64,
    pub payload: serde_json::Value,
    pub deliver_count: i32,
    pub visible_at: DateTime<Utc>,
}

/// Publish a message with a per-message delay in seconds.
pub async fn publish(
    pool: &PgPool,
    queue: QueueName,
    payload: &serde_json::Value,
    now: DateTime<Utc>,
    delay_secs: i64,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"INSERT INTO queue_messages (queue, payload, visible_at)
           VALUES ($1, $2, $3)
           RETURNING id"#,
    )
    .bind(queue.as_str())
    .bind(payload)
    .bind(now + Duration::seconds(delay_secs))
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

/// Claim the oldest visible message, making it invisible for
/// `visibility_secs`. Returns None when the queue is (visibly) empty.
pub async fn pop(
    pool: &PgPool,
    queue: QueueName,
    now: DateTime<Utc>,
    visibility_secs: i64,
) -> Result<Option<QueueMessageRow>, sqlx::Error> {
    let row = sqlx::query(
        r#"UPDATE queue_messages
           SET visible_at = $3, deliver_count = deliver_count + 1
           WHERE id = (
               SELECT id FROM queue_messages
               WHERE queue = $1 AND visible_at <= $2
               ORDER BY visible_at, id
               LIMIT 1
               FOR UPDATE SKIP LOCKED
           )
           RETURNING id, payload, deliver_count, visible_at"#,
    )
    .bind(queue.as_str())
    .bind(now)
    .bind(now + Duration::seconds(visibility_secs))
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| QueueMessageRow {
        id: r.get("id"),
        payload: r.get("payload"),
        deliver_count: r.get("deliver_count"),
        visible_at: r.get("visible_at"),
    }))
}

/// Acknowledge (delete) a claimed message.
pub async fn ack(pool: &PgPool, message_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM queue_messages WHERE id = $1")
        .bind(message_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Return a claimed message to the queue after a delay (processing error
/// backoff); the queue's own redelivery machinery re-invokes the handler.
pub async fn delay(
    pool: &PgPool,
    message_id: i64,
    now: DateTime<Utc>,
    delay_secs: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE queue_messages SET visible_at = $2 WHERE id = $1")
        .bind(message_id)
        .bind(now + Duration::seconds(delay_secs))
        .execute(pool)
        .await?;
    Ok(())
}

/// Count messages on a queue regardless of visibility (test/ops helper).
pub async fn depth(pool: &PgPool, queue: QueueName) -> Result<i64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_messages WHERE queue = $1")
        .bind(queue.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Drop retry messages whose referenced attempt log is terminal or gone.
/// Dead-letter messages are left for their consumer.
pub async fn purge_orphans(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"DELETE FROM queue_messages q
           WHERE q.queue = 'retry'
             AND NOT EXISTS (
               SELECT 1 FROM attempt_logs a
               WHERE a.id = (q.payload->>'logId')::bigint
                 AND a.status NOT IN ('sent', 'failed')
           )"#,
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

use chrono::{DateTime, Utc};
use ng_protocol::{AttemptStatus, ChannelType};
use sqlx::PgPool;
use sqlx::Row;

pub struct AttemptLogRow {
    pub id: i64,
    pub message_id: Option<String>,
    pub request_id: String,
    pub principal_id: String,
    pub channel_type: String,
    pub template_key: Option<String>,
    pub subject: Option<String>,
    pub content: String,
    pub status: String,
    pub error: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AttemptLogRow {
    pub fn status(&self) -> AttemptStatus {
        self.status.parse().unwrap_or(AttemptStatus::Failed)
    }

    pub fn channel(&self) -> Option<ChannelType> {
        self.channel_type.parse().ok()
    }
}

fn map_row(r: sqlx::postgres::PgRow) -> AttemptLogRow {
    AttemptLogRow {
        id: r.get("id"),
        message_id: r.get("message_id"),
        request_id: r.get("request_id"),
        principal_id: r.get("principal_id"),
        channel_type: r.get("channel_type"),
        template_key: r.get("template_key"),
        subject: r.get("subject"),
        content: r.get("content"),
        status: r.get("status"),
        error: r.get("error"),
        retry_count: r.get("retry_count"),
        created_at: r.get("created_at"),
        sent_at: r.get("sent_at"),
        updated_at: r.get("updated_at"),
    }
}

/// Insert the row for a channel attempt about to be handed to its adapter.
///
/// Timestamps come from the injected clock, never the database, so the retry
/// schedule and cleanup cutoffs stay testable under a pinned clock.
#[allow(clippy::too_many_arguments)]
pub async fn insert_pending(
    pool: &PgPool,
    request_id: &str,
    principal_id: &str,
    channel: ChannelType,
    template_key: Option<&str>,
    subject: Option<&str>,
    content: &str,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"INSERT INTO attempt_logs
               (request_id, principal_id, channel_type, template_key, subject, content,
                status, created_at, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $7)
           RETURNING id"#,
    )
    .bind(request_id)
    .bind(principal_id)
    .bind(channel.as_str())
    .bind(template_key)
    .bind(subject)
    .bind(content)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

/// Insert a row that failed before its adapter could run (missing config,
/// unresolvable template). Keeps the N-rows-per-request invariant.
pub async fn insert_failed(
    pool: &PgPool,
    request_id: &str,
    principal_id: &str,
    channel: ChannelType,
    template_key: Option<&str>,
    error: &str,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"INSERT INTO attempt_logs
               (request_id, principal_id, channel_type, template_key, content,
                status, error, created_at, updated_at)
           VALUES ($1, $2, $3, $4, '', 'failed', $5, $6, $6)
           RETURNING id"#,
    )
    .bind(request_id)
    .bind(principal_id)
    .bind(channel.as_str())
    .bind(template_key)
    .bind(error)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

pub async fn fetch_by_id(pool: &PgPool, id: i64) -> Result<Option<AttemptLogRow>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM attempt_logs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(map_row))
}

pub async fn mark_sent(
    pool: &PgPool,
    id: i64,
    message_id: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE attempt_logs
           SET status = 'sent', message_id = $2, error = NULL, sent_at = $3, updated_at = $3
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(message_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(
    pool: &PgPool,
    id: i64,
    error: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE attempt_logs
           SET status = 'failed', error = $2, updated_at = $3
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(error)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Terminal failure after retry exhaustion: records the final retry count.
pub async fn mark_failed_exhausted(
    pool: &PgPool,
    id: i64,
    retry_count: i32,
    error: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE attempt_logs
           SET status = 'failed', retry_count = $2, error = $3, updated_at = $4
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(retry_count)
    .bind(error)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_retry_scheduled(
    pool: &PgPool,
    id: i64,
    retry_count: i32,
    error: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE attempt_logs
           SET status = 'retry_scheduled', retry_count = $2, error = $3, updated_at = $4
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(retry_count)
    .bind(error)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Transition to `retrying`, gated on the row still being in a retry state.
/// Returns false when the row is already terminal (queue re-delivery).
pub async fn mark_retrying(pool: &PgPool, id: i64, now: DateTime<Utc>) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE attempt_logs
           SET status = 'retrying', updated_at = $2
           WHERE id = $1 AND status IN ('retry_scheduled', 'retrying')"#,
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Rows in `retry_scheduled` updated within the recent window that have no
/// live retry-queue message — candidates for the admin retry trigger and the
/// startup recovery sweep.
pub async fn list_stranded_retry_scheduled(
    pool: &PgPool,
    updated_after: DateTime<Utc>,
) -> Result<Vec<AttemptLogRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT a.* FROM attempt_logs a
           WHERE a.status = 'retry_scheduled'
             AND a.updated_at >= $1
             AND NOT EXISTS (
                 SELECT 1 FROM queue_messages q
                 WHERE q.queue = 'retry'
                   AND (q.payload->>'logId')::bigint = a.id
             )
           ORDER BY a.updated_at"#,
    )
    .bind(updated_after)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(map_row).collect())
}

/// Delete terminal rows older than the cutoff. Returns rows removed.
pub async fn purge_terminal_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"DELETE FROM attempt_logs
           WHERE status IN ('sent', 'failed') AND created_at < $1"#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

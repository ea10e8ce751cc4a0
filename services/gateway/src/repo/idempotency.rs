use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::Row;

pub struct IdempotencyRow {
    pub principal_id: String,
    pub idempotency_key: String,
    pub request_hash: String,
    pub results: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

/// Fetch an unexpired record; expired rows are invisible (cleanup purges them).
pub async fn fetch_active(
    pool: &PgPool,
    principal_id: &str,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<Option<IdempotencyRow>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT principal_id, idempotency_key, request_hash, results, expires_at
           FROM idempotency_records
           WHERE principal_id = $1 AND idempotency_key = $2 AND expires_at > $3"#,
    )
    .bind(principal_id)
    .bind(idempotency_key)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| IdempotencyRow {
        principal_id: r.get("principal_id"),
        idempotency_key: r.get("idempotency_key"),
        request_hash: r.get("request_hash"),
        results: r.get("results"),
        expires_at: r.get("expires_at"),
    }))
}

/// Insert a record. Returns false when a concurrent insert won the unique-key
/// race; the loser discards its result set.
pub async fn insert(
    pool: &PgPool,
    principal_id: &str,
    idempotency_key: &str,
    request_hash: &str,
    results: &serde_json::Value,
    expires_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"INSERT INTO idempotency_records
               (principal_id, idempotency_key, request_hash, results, expires_at)
           VALUES ($1, $2, $3, $4, $5)
           ON CONFLICT (principal_id, idempotency_key) DO NOTHING"#,
    )
    .bind(principal_id)
    .bind(idempotency_key)
    .bind(request_hash)
    .bind(results)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn purge_expired(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM idempotency_records WHERE expires_at <= $1")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

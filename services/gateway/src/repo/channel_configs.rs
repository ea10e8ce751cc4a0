use chrono::{DateTime, Utc};
use ng_protocol::ChannelType;
use sqlx::PgPool;
use sqlx::Row;

pub struct ChannelConfigRow {
    pub principal_id: String,
    pub channel_type: String,
    pub config_ciphertext: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fetch the active config for one (principal, channel); inactive rows are
/// invisible to the dispatcher.
pub async fn fetch_active(
    pool: &PgPool,
    principal_id: &str,
    channel: ChannelType,
) -> Result<Option<ChannelConfigRow>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT principal_id, channel_type, config_ciphertext, active, created_at, updated_at
           FROM channel_configs
           WHERE principal_id = $1 AND channel_type = $2 AND active"#,
    )
    .bind(principal_id)
    .bind(channel.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| ChannelConfigRow {
        principal_id: r.get("principal_id"),
        channel_type: r.get("channel_type"),
        config_ciphertext: r.get("config_ciphertext"),
        active: r.get("active"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }))
}

/// Admin write path: insert or replace the config blob for one channel.
pub async fn upsert(
    pool: &PgPool,
    principal_id: &str,
    channel: ChannelType,
    config_ciphertext: &str,
    active: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO channel_configs (principal_id, channel_type, config_ciphertext, active)
           VALUES ($1, $2, $3, $4)
           ON CONFLICT (principal_id, channel_type) DO UPDATE
           SET config_ciphertext = EXCLUDED.config_ciphertext,
               active = EXCLUDED.active,
               updated_at = now()"#,
    )
    .bind(principal_id)
    .bind(channel.as_str())
    .bind(config_ciphertext)
    .bind(active)
    .execute(pool)
    .await?;
    Ok(())
}

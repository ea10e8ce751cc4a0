use chrono::{DateTime, Utc};
use ng_protocol::{ChannelType, ContentType};
use sqlx::PgPool;
use sqlx::Row;

pub struct TemplateHeaderRow {
    pub template_key: String,
    pub name: String,
    pub description: String,
    /// Declared variable names, ordered.
    pub variables: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct TemplateContentRow {
    pub template_key: String,
    pub channel_type: String,
    pub subject_template: Option<String>,
    pub body_template: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TemplateContentRow {
    pub fn content_type(&self) -> ContentType {
        self.content_type.parse().unwrap_or(ContentType::Text)
    }
}

/// One channel's content in an upsert batch.
pub struct ContentSpec<'a> {
    pub channel: ChannelType,
    pub subject_template: Option<&'a str>,
    pub body_template: &'a str,
    pub content_type: ContentType,
}

pub async fn fetch_active_header(
    pool: &PgPool,
    template_key: &str,
) -> Result<Option<TemplateHeaderRow>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT template_key, name, description, variables, active, created_at, updated_at
           FROM template_headers
           WHERE template_key = $1 AND active"#,
    )
    .bind(template_key)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| {
        let variables: serde_json::Value = r.get("variables");
        TemplateHeaderRow {
            template_key: r.get("template_key"),
            name: r.get("name"),
            description: r.get("description"),
            variables: variables
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(str::to_owned))
                        .collect()
                })
                .unwrap_or_default(),
            active: r.get("active"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }
    }))
}

pub async fn fetch_content(
    pool: &PgPool,
    template_key: &str,
    channel: ChannelType,
) -> Result<Option<TemplateContentRow>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT template_key, channel_type, subject_template, body_template, content_type,
                  created_at, updated_at
           FROM template_contents
           WHERE template_key = $1 AND channel_type = $2"#,
    )
    .bind(template_key)
    .bind(channel.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| TemplateContentRow {
        template_key: r.get("template_key"),
        channel_type: r.get("channel_type"),
        subject_template: r.get("subject_template"),
        body_template: r.get("body_template"),
        content_type: r.get("content_type"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }))
}

pub async fn upsert_header(
    pool: &PgPool,
    template_key: &str,
    name: &str,
    description: &str,
    variables: &[String],
    active: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO template_headers (template_key, name, description, variables, active)
           VALUES ($1, $2, $3, $4, $5)
           ON CONFLICT (template_key) DO UPDATE
           SET name = EXCLUDED.name,
               description = EXCLUDED.description,
               variables = EXCLUDED.variables,
               active = EXCLUDED.active,
               updated_at = now()"#,
    )
    .bind(template_key)
    .bind(name)
    .bind(description)
    .bind(serde_json::to_value(variables).expect("string vec serializes"))
    .bind(active)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_content(
    pool: &PgPool,
    template_key: &str,
    spec: &ContentSpec<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO template_contents
               (template_key, channel_type, subject_template, body_template, content_type)
           VALUES ($1, $2, $3, $4, $5)
           ON CONFLICT (template_key, channel_type) DO UPDATE
           SET subject_template = EXCLUDED.subject_template,
               body_template = EXCLUDED.body_template,
               content_type = EXCLUDED.content_type,
               updated_at = now()"#,
    )
    .bind(template_key)
    .bind(spec.channel.as_str())
    .bind(spec.subject_template)
    .bind(spec.body_template)
    .bind(spec.content_type.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

/// Create or update a template: header first, then each content row, as
/// sequential per-row upserts. There is deliberately no transaction — a
/// partial failure leaves the header present and some contents missing, which
/// the dispatcher later reports as `NO_CONTENT_FOR_CHANNEL`.
pub async fn upsert_template(
    pool: &PgPool,
    template_key: &str,
    name: &str,
    description: &str,
    variables: &[String],
    contents: &[ContentSpec<'_>],
) -> Result<(), sqlx::Error> {
    upsert_header(pool, template_key, name, description, variables, true).await?;
    for spec in contents {
        upsert_content(pool, template_key, spec).await?;
    }
    Ok(())
}

//! Template resolution and rendering.
//!
//! Resolution order for (template_key, channel):
//! 1. active header, else `TEMPLATE_NOT_FOUND`
//! 2. per-channel content row, else `NO_CONTENT_FOR_CHANNEL`
//! 3. scan subject + body for `{{name}}` placeholders
//! 4. every placeholder must have a binding, else `MISSING_TEMPLATE_VARIABLES`
//!    listing all absent names
//! 5. single-pass substitution; values sanitized before insertion
//!
//! No recursion, no conditionals, no partials.

use ng_protocol::{ChannelType, ContentType};
use regex::Regex;
use sqlx::PgPool;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::error::GatewayError;
use crate::repo::templates;
use crate::sanitize;

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE
        .get_or_init(|| Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").expect("valid regex"))
}

/// A rendered message ready for an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: Option<String>,
    pub content: String,
    pub content_type: ContentType,
}

/// Placeholder names referenced by a template string, deduplicated and ordered.
pub fn scan_placeholders(text: &str) -> BTreeSet<String> {
    placeholder_re()
        .captures_iter(text)
        .map(|c| c[1].to_owned())
        .collect()
}

/// Substitute every `{{name}}` with its sanitized binding. Single pass:
/// substituted values are never re-scanned.
pub fn render(
    template: &str,
    variables: &serde_json::Map<String, serde_json::Value>,
) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let value = variables.get(&caps[1]).expect("validated before render");
            sanitize::clean_text(&stringify(value), usize::MAX)
        })
        .into_owned()
}

fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Full resolution per the order above.
pub async fn resolve_and_render(
    pool: &PgPool,
    template_key: &str,
    channel: ChannelType,
    variables: &serde_json::Map<String, serde_json::Value>,
) -> Result<Rendered, GatewayError> {
    let header = templates::fetch_active_header(pool, template_key).await?;
    if header.is_none() {
        return Err(GatewayError::not_found(
            "TEMPLATE_NOT_FOUND",
            format!("no active template '{template_key}'"),
        ));
    }

    let Some(content) = templates::fetch_content(pool, template_key, channel).await? else {
        return Err(GatewayError::not_found(
            "NO_CONTENT_FOR_CHANNEL",
            format!("template '{template_key}' has no content for channel '{channel}'"),
        ));
    };

    let mut required = scan_placeholders(&content.body_template);
    if let Some(subject) = &content.subject_template {
        required.extend(scan_placeholders(subject));
    }

    let missing: Vec<String> = required
        .iter()
        .filter(|name| !variables.contains_key(*name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(GatewayError::MissingVariables(missing));
    }

    Ok(Rendered {
        subject: content
            .subject_template
            .as_deref()
            .map(|s| render(s, variables)),
        content: render(&content.body_template, variables),
        content_type: content.content_type(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> serde_json::Map<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), serde_json::Value::String((*v).to_owned())))
            .collect()
    }

    #[test]
    fn scan_finds_valid_placeholders_only() {
        let found = scan_placeholders("Hello {{username}}, {{_id}} {{2bad}} {{ spaced }} {{a-b}}");
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["_id".to_owned(), "username".to_owned()]
        );
    }

    #[test]
    fn scan_deduplicates() {
        let found = scan_placeholders("{{x}} and {{x}} and {{y}}");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn render_substitutes_in_a_single_pass() {
        let bindings = vars(&[("name", "{{name}}")]);
        // The substituted value contains placeholder syntax but is not re-expanded.
        assert_eq!(render("hi {{name}}", &bindings), "hi {{name}}");
    }

    #[test]
    fn render_is_idempotent_under_identical_inputs() {
        let bindings = vars(&[("username", "Alice")]);
        let a = render("Hello {{username}}!", &bindings);
        let b = render("Hello {{username}}!", &bindings);
        assert_eq!(a, "Hello Alice!");
        assert_eq!(a, b);
    }

    #[test]
    fn render_stringifies_non_string_values() {
        let mut bindings = serde_json::Map::new();
        bindings.insert("count".to_owned(), serde_json::json!(42));
        bindings.insert("flag".to_owned(), serde_json::json!(true));
        assert_eq!(render("{{count}}/{{flag}}", &bindings), "42/true");
    }

    #[test]
    fn render_sanitizes_variable_values() {
        let bindings = vars(&[("name", "  Ali\u{0007}ce  ")]);
        assert_eq!(render("Hello {{name}}!", &bindings), "Hello Alice!");
    }
}

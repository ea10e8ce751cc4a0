//! Telegram Bot API adapter.
//!
//! POSTs to `{api_base}/bot{token}/sendMessage`. The Bot API reports failures
//! as `{ok: false, error_code, description}`; error codes 400/401/403/404 are
//! permanent, everything else is worth retrying.

use async_trait::async_trait;
use serde::Deserialize;

use crate::clock::Clock;
use crate::sanitize;

use super::{
    ChannelAdapter, ChannelError, EndpointConfig, OutboundMessage, generate_message_id, post_json,
};

/// Error codes Telegram documents as permanent for sendMessage.
const PERMANENT_ERROR_CODES: [i64; 4] = [400, 401, 403, 404];

pub struct TelegramAdapter;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<ApiResult>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    #[serde(default)]
    message_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Escaping
// ---------------------------------------------------------------------------

/// MarkdownV2: every char in the reserved set gets a `\` prefix.
pub fn escape_markdown_v2(text: &str) -> String {
    const RESERVED: &[char] = &[
        '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
        '\\',
    ];
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// HTML parse mode: entity-escape `& < > " ' /`.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            _ => out.push(c),
        }
    }
    out
}

/// Legacy Markdown: only `* _ ` [ ]` are special.
pub fn escape_markdown(text: &str) -> String {
    const RESERVED: &[char] = &['*', '_', '`', '[', ']'];
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_for_mode(text: &str, parse_mode: &str) -> String {
    match parse_mode {
        "MarkdownV2" => escape_markdown_v2(text),
        "HTML" => escape_html(text),
        "Markdown" => escape_markdown(text),
        _ => escape_markdown_v2(text),
    }
}

/// Compose the final `text` field: escaped subject (if any), blank line,
/// escaped content; capped to Telegram's 4096-char limit.
fn build_text(subject: Option<&str>, content: &str, parse_mode: &str) -> String {
    let text = match subject {
        Some(s) if !s.is_empty() => {
            format!("{}\n\n{}", escape_for_mode(s, parse_mode), escape_for_mode(content, parse_mode))
        }
        _ => escape_for_mode(content, parse_mode),
    };
    sanitize::truncate_chars(&text, sanitize::MAX_TELEGRAM_TEXT)
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    async fn send(
        &self,
        http: &reqwest::Client,
        _clock: &dyn Clock,
        config: &EndpointConfig,
        msg: &OutboundMessage<'_>,
    ) -> Result<String, ChannelError> {
        let EndpointConfig::Telegram(cfg) = config else {
            return Err(ChannelError::Config("not a telegram config".to_owned()));
        };
        if cfg.bot_token.is_empty() || cfg.chat_id.is_empty() {
            return Err(ChannelError::Config(
                "bot_token and chat_id are required".to_owned(),
            ));
        }

        let url = format!(
            "{}/bot{}/sendMessage",
            cfg.api_base_url.trim_end_matches('/'),
            cfg.bot_token
        );
        let payload = serde_json::json!({
            "chat_id": cfg.chat_id,
            "text": build_text(msg.subject, msg.content, &cfg.parse_mode),
            "parse_mode": cfg.parse_mode,
            "disable_web_page_preview": cfg.disable_web_page_preview,
            "disable_notification": cfg.disable_notification,
        });

        let (status, body) = post_json(http, &url, &payload).await?;
        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(api) if api.ok => Ok(api
                .result
                .and_then(|r| r.message_id)
                .map(|id| id.to_string())
                .unwrap_or_else(|| generate_message_id("tg"))),
            Ok(api) => {
                let code = api.error_code.unwrap_or(0);
                Err(ChannelError::Api {
                    message: format!(
                        "telegram error {}: {}",
                        code,
                        api.description.unwrap_or_default()
                    ),
                    retryable: !PERMANENT_ERROR_CODES.contains(&code),
                })
            }
            Err(_) => Err(ChannelError::Status { status, body }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_v2_escapes_exactly_the_reserved_set() {
        let input = r"_*[]()~`>#+-=|{}.!\";
        let escaped = escape_markdown_v2(input);
        // Every char gains a backslash prefix.
        assert_eq!(escaped.chars().count(), input.chars().count() * 2);
        assert_eq!(escape_markdown_v2("a.b"), r"a\.b");
        assert_eq!(escape_markdown_v2("plain text"), "plain text");
    }

    #[test]
    fn markdown_v2_double_escaping_produces_doubled_pairs() {
        let once = escape_markdown_v2("a.b");
        let twice = escape_markdown_v2(&once);
        assert_eq!(twice, r"a\\\.b");
    }

    #[test]
    fn html_escaping_covers_the_six_chars() {
        assert_eq!(
            escape_html(r#"<b>&"x'/</b>"#),
            "&lt;b&gt;&amp;&quot;x&#x27;&#x2F;&lt;&#x2F;b&gt;"
        );
    }

    #[test]
    fn legacy_markdown_escapes_only_its_set() {
        assert_eq!(escape_markdown("*_`[]"), r"\*\_\`\[\]");
        assert_eq!(escape_markdown("a.b-c"), "a.b-c");
    }

    #[test]
    fn text_composition_joins_subject_and_caps_length() {
        let text = build_text(Some("Hi"), "there", "MarkdownV2");
        assert_eq!(text, "Hi\n\nthere");

        let long = "x".repeat(5000);
        let capped = build_text(None, &long, "MarkdownV2");
        assert_eq!(capped.chars().count(), sanitize::MAX_TELEGRAM_TEXT);
    }

    #[test]
    fn permanent_error_codes_are_the_documented_four() {
        for code in [400, 401, 403, 404] {
            assert!(PERMANENT_ERROR_CODES.contains(&code));
        }
        assert!(!PERMANENT_ERROR_CODES.contains(&429));
        assert!(!PERMANENT_ERROR_CODES.contains(&420));
    }
}

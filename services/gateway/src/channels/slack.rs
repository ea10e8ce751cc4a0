//! Slack incoming-webhook adapter.
//!
//! Plain `{text}` payloads by default; switches to Block Kit when a subject
//! is present or `use_blocks` is set. Incoming webhooks answer a literal
//! `ok` body on success; anything else in a 2xx is a permanent failure.

use async_trait::async_trait;

use crate::clock::Clock;

use super::{
    ChannelAdapter, ChannelError, EndpointConfig, OutboundMessage, SlackConfig,
    generate_message_id, post_json,
};

pub struct SlackAdapter;

/// Slack mrkdwn: escape `* _ ~ ` >`.
pub fn escape_mrkdwn(text: &str) -> String {
    const RESERVED: &[char] = &['*', '_', '~', '`', '>'];
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn build_payload(
    cfg: &SlackConfig,
    subject: Option<&str>,
    content: &str,
    now_secs: i64,
) -> serde_json::Value {
    let text = escape_mrkdwn(content);
    let mut payload = if subject.is_some() || cfg.use_blocks {
        let mut blocks = Vec::new();
        if let Some(subject) = subject {
            blocks.push(serde_json::json!({
                "type": "header",
                "text": { "type": "plain_text", "text": subject },
            }));
        }
        blocks.push(serde_json::json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": text },
        }));
        blocks.push(serde_json::json!({
            "type": "context",
            "elements": [
                { "type": "mrkdwn", "text": format!("Sent <!date^{now_secs}^{{date_num}} {{time_secs}}|at {now_secs}>") },
            ],
        }));
        serde_json::json!({ "text": text, "blocks": blocks })
    } else {
        serde_json::json!({ "text": text })
    };

    let object = payload.as_object_mut().expect("payload is an object");
    if let Some(username) = &cfg.username {
        object.insert("username".to_owned(), username.clone().into());
    }
    if let Some(icon) = &cfg.icon_emoji {
        object.insert("icon_emoji".to_owned(), icon.clone().into());
    }
    if let Some(channel) = &cfg.channel {
        object.insert("channel".to_owned(), channel.clone().into());
    }
    if let Some(thread_ts) = &cfg.thread_ts {
        object.insert("thread_ts".to_owned(), thread_ts.clone().into());
    }
    if cfg.use_attachments {
        object.insert(
            "attachments".to_owned(),
            serde_json::json!([{
                "color": cfg.color.as_deref().unwrap_or("#36a64f"),
                "pretext": subject,
                "text": text,
                "ts": now_secs,
            }]),
        );
    }
    payload
}

#[async_trait]
impl ChannelAdapter for SlackAdapter {
    async fn send(
        &self,
        http: &reqwest::Client,
        clock: &dyn Clock,
        config: &EndpointConfig,
        msg: &OutboundMessage<'_>,
    ) -> Result<String, ChannelError> {
        let EndpointConfig::Slack(cfg) = config else {
            return Err(ChannelError::Config("not a slack config".to_owned()));
        };
        if cfg.webhook_url.is_empty() {
            return Err(ChannelError::Config("webhook_url is required".to_owned()));
        }
        if let Some(channel) = &cfg.channel {
            if !(channel.len() > 1 && (channel.starts_with('#') || channel.starts_with('@'))) {
                return Err(ChannelError::Config(format!(
                    "channel '{channel}' must start with '#' or '@'"
                )));
            }
        }

        let payload = build_payload(cfg, msg.subject, msg.content, clock.now_secs());
        let (status, body) = post_json(http, &cfg.webhook_url, &payload).await?;
        if !(200..300).contains(&status) {
            return Err(ChannelError::Status { status, body });
        }
        if body.trim() == "ok" {
            return Ok(generate_message_id("slack"));
        }
        // A 2xx with a non-`ok` body is a webhook-level rejection; Slack does
        // not recover these on retry.
        Err(ChannelError::Api {
            message: format!("slack webhook rejected message: {body}"),
            retryable: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SlackConfig {
        SlackConfig {
            webhook_url: "https://hooks.slack.com/services/T/B/X".to_owned(),
            channel: None,
            username: None,
            icon_emoji: None,
            use_blocks: false,
            use_attachments: false,
            color: None,
            thread_ts: None,
        }
    }

    #[test]
    fn mrkdwn_escapes_its_reserved_set() {
        assert_eq!(escape_mrkdwn("*_~`>"), r"\*\_\~\`\>");
        assert_eq!(escape_mrkdwn("plain [text]"), "plain [text]");
    }

    #[test]
    fn plain_payload_without_subject_or_blocks() {
        let payload = build_payload(&base_config(), None, "hello *there*", 1_700_000_000);
        assert_eq!(payload["text"], r"hello \*there\*");
        assert!(payload.get("blocks").is_none());
        assert!(payload.get("attachments").is_none());
    }

    #[test]
    fn subject_switches_to_blocks_with_header_section_context() {
        let payload = build_payload(&base_config(), Some("Deploy"), "done", 1_700_000_000);
        let blocks = payload["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0]["type"], "header");
        assert_eq!(blocks[0]["text"]["text"], "Deploy");
        assert_eq!(blocks[1]["type"], "section");
        assert_eq!(blocks[2]["type"], "context");
    }

    #[test]
    fn optional_fields_and_attachments_are_attached() {
        let mut cfg = base_config();
        cfg.channel = Some("#ops".to_owned());
        cfg.username = Some("notifier".to_owned());
        cfg.icon_emoji = Some(":bell:".to_owned());
        cfg.use_attachments = true;
        cfg.color = Some("#ff0000".to_owned());

        let payload = build_payload(&cfg, Some("Alert"), "cpu high", 1_700_000_123);
        assert_eq!(payload["channel"], "#ops");
        assert_eq!(payload["username"], "notifier");
        assert_eq!(payload["icon_emoji"], ":bell:");
        assert_eq!(payload["attachments"][0]["color"], "#ff0000");
        assert_eq!(payload["attachments"][0]["pretext"], "Alert");
        assert_eq!(payload["attachments"][0]["ts"], 1_700_000_123);
    }
}

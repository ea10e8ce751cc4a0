//! Lark (Feishu) custom-bot adapter.
//!
//! Builds the message body per the configured `msg_type` and, when the bot
//! has a signing secret, attaches `timestamp` + `sign` where
//! `sign = base64(HMAC_SHA256(key = "{timestamp}\n{secret}", msg = ""))` —
//! the key/message inversion is Lark's contract, not a bug.

use async_trait::async_trait;
use serde::Deserialize;

use crate::clock::Clock;

use super::{
    ChannelAdapter, ChannelError, EndpointConfig, OutboundMessage, generate_message_id, post_json,
};

pub struct LarkAdapter;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: Option<String>,
}

/// Lark markdown: escape `* _ ` [ ] ( ) \`.
pub fn escape_lark_markdown(text: &str) -> String {
    const RESERVED: &[char] = &['*', '_', '`', '[', ']', '(', ')', '\\'];
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Message body per msg_type; subject folds into the text/card as a title.
fn build_body(msg_type: &str, subject: Option<&str>, content: &str) -> serde_json::Value {
    match msg_type {
        "interactive" => {
            let title = subject.unwrap_or("Notification");
            serde_json::json!({
                "msg_type": "interactive",
                "card": {
                    "header": {
                        "title": { "tag": "plain_text", "content": title },
                    },
                    "elements": [
                        { "tag": "div", "text": { "tag": "lark_md", "content": content } },
                    ],
                },
            })
        }
        "markdown" => serde_json::json!({
            "msg_type": "interactive",
            "card": {
                "elements": [
                    { "tag": "markdown", "content": escape_lark_markdown(content) },
                ],
            },
        }),
        _ => {
            let text = match subject {
                Some(s) if !s.is_empty() => format!("{s}\n{content}"),
                _ => content.to_owned(),
            };
            serde_json::json!({
                "msg_type": "text",
                "content": { "text": text },
            })
        }
    }
}

#[async_trait]
impl ChannelAdapter for LarkAdapter {
    async fn send(
        &self,
        http: &reqwest::Client,
        clock: &dyn Clock,
        config: &EndpointConfig,
        msg: &OutboundMessage<'_>,
    ) -> Result<String, ChannelError> {
        let EndpointConfig::Lark(cfg) = config else {
            return Err(ChannelError::Config("not a lark config".to_owned()));
        };
        if cfg.webhook_url.is_empty() {
            return Err(ChannelError::Config("webhook_url is required".to_owned()));
        }

        let mut body = build_body(&cfg.msg_type, msg.subject, msg.content);
        if let Some(secret) = cfg.secret.as_deref() {
            let timestamp = clock.now_secs();
            let object = body.as_object_mut().expect("body is always an object");
            object.insert(
                "timestamp".to_owned(),
                serde_json::Value::String(timestamp.to_string()),
            );
            object.insert(
                "sign".to_owned(),
                serde_json::Value::String(ng_crypto::lark_sign(timestamp, secret)),
            );
        }

        let (status, text) = post_json(http, &cfg.webhook_url, &body).await?;
        if !(200..300).contains(&status) {
            // Authoritative HTTP errors classify by status (4xx permanent).
            return Err(ChannelError::Status { status, body: text });
        }
        match serde_json::from_str::<ApiResponse>(&text) {
            Ok(api) if api.code == 0 => Ok(generate_message_id("lark")),
            Ok(api) => Err(ChannelError::Api {
                message: format!("lark error {}: {}", api.code, api.msg.unwrap_or_default()),
                retryable: true,
            }),
            Err(_) => Err(ChannelError::Api {
                message: format!("unparseable lark response: {text}"),
                retryable: true,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lark_markdown_escapes_its_reserved_set() {
        assert_eq!(escape_lark_markdown(r"*_`[]()\"), r"\*\_\`\[\]\(\)\\");
        assert_eq!(escape_lark_markdown("a.b#c"), "a.b#c");
    }

    #[test]
    fn text_body_folds_subject_above_content() {
        let body = build_body("text", Some("Alert"), "disk full");
        assert_eq!(body["msg_type"], "text");
        assert_eq!(body["content"]["text"], "Alert\ndisk full");

        let body = build_body("text", None, "disk full");
        assert_eq!(body["content"]["text"], "disk full");
    }

    #[test]
    fn interactive_body_is_a_card_with_header_and_div() {
        let body = build_body("interactive", Some("Deploy"), "done");
        assert_eq!(body["msg_type"], "interactive");
        assert_eq!(body["card"]["header"]["title"]["content"], "Deploy");
        assert_eq!(body["card"]["elements"][0]["tag"], "div");
        assert_eq!(body["card"]["elements"][0]["text"]["content"], "done");
    }

    #[test]
    fn markdown_body_is_a_single_markdown_element() {
        let body = build_body("markdown", None, "a*b");
        assert_eq!(body["card"]["elements"][0]["tag"], "markdown");
        assert_eq!(body["card"]["elements"][0]["content"], r"a\*b");
    }
}

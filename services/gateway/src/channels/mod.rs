//! Channel adapters: one per wire protocol.
//!
//! Each adapter builds its protocol-specific payload, applies channel
//! escaping and signing, POSTs with the shared 30 s-timeout client, and
//! normalizes the response into a `ChannelError` whose retryability drives
//! the retry state machine.

pub mod lark;
pub mod slack;
pub mod telegram;
pub mod webhook;

use async_trait::async_trait;
use ng_protocol::{ChannelType, ContentType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::clock::Clock;

pub use lark::LarkAdapter;
pub use slack::SlackAdapter;
pub use telegram::TelegramAdapter;
pub use webhook::WebhookAdapter;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Adapter-layer failure. Retryability is a property of the error value.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-2xx HTTP status.
    #[error("endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The endpoint answered 2xx but its API-level body signalled failure.
    #[error("{message}")]
    Api { message: String, retryable: bool },

    /// The decrypted config blob is unusable for this channel.
    #[error("invalid channel config: {0}")]
    Config(String),
}

impl ChannelError {
    pub fn retryable(&self) -> bool {
        match self {
            ChannelError::Timeout => true,
            ChannelError::Network(_) => true,
            ChannelError::Status { status, .. } => retryable_status(*status),
            ChannelError::Api { retryable, .. } => *retryable,
            ChannelError::Config(_) => false,
        }
    }
}

/// HTTP 5xx is retryable; 4xx is not, except 408 and 429.
pub fn retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

// ---------------------------------------------------------------------------
// Per-channel configuration (tagged union, decoded at the adapter boundary)
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_parse_mode() -> String {
    "MarkdownV2".to_owned()
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_owned()
}

fn default_lark_msg_type() -> String {
    "text".to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub webhook_url: String,
    /// User-supplied headers, merged into the POST after sanitization.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    /// `Markdown`, `MarkdownV2`, or `HTML`.
    #[serde(default = "default_parse_mode")]
    pub parse_mode: String,
    #[serde(default = "default_true")]
    pub disable_web_page_preview: bool,
    #[serde(default)]
    pub disable_notification: bool,
    /// Overridable for tests; the production default is the public API host.
    #[serde(default = "default_telegram_api_base")]
    pub api_base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LarkConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub secret: Option<String>,
    /// `text`, `interactive`, or `markdown`.
    #[serde(default = "default_lark_msg_type")]
    pub msg_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
    /// Override channel; must start with `#` or `@`.
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub icon_emoji: Option<String>,
    #[serde(default)]
    pub use_blocks: bool,
    #[serde(default)]
    pub use_attachments: bool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

/// Decrypted per-channel endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointConfig {
    Webhook(WebhookConfig),
    Telegram(TelegramConfig),
    Lark(LarkConfig),
    Slack(SlackConfig),
}

impl EndpointConfig {
    /// Decode a decrypted config blob for the given channel tag.
    pub fn decode(channel: ChannelType, blob: &[u8]) -> Result<Self, ChannelError> {
        let decoded = match channel {
            ChannelType::Webhook => {
                serde_json::from_slice::<WebhookConfig>(blob).map(EndpointConfig::Webhook)
            }
            ChannelType::Telegram => {
                serde_json::from_slice::<TelegramConfig>(blob).map(EndpointConfig::Telegram)
            }
            ChannelType::Lark => {
                serde_json::from_slice::<LarkConfig>(blob).map(EndpointConfig::Lark)
            }
            ChannelType::Slack => {
                serde_json::from_slice::<SlackConfig>(blob).map(EndpointConfig::Slack)
            }
        };
        decoded.map_err(|e| ChannelError::Config(format!("{channel}: {e}")))
    }

    pub fn channel(&self) -> ChannelType {
        match self {
            EndpointConfig::Webhook(_) => ChannelType::Webhook,
            EndpointConfig::Telegram(_) => ChannelType::Telegram,
            EndpointConfig::Lark(_) => ChannelType::Lark,
            EndpointConfig::Slack(_) => ChannelType::Slack,
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter trait and registry
// ---------------------------------------------------------------------------

/// Sanitized, rendered message handed to an adapter.
pub struct OutboundMessage<'a> {
    pub subject: Option<&'a str>,
    pub content: &'a str,
    pub content_type: ContentType,
}

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Deliver one message. Returns the channel-scoped message id.
    async fn send(
        &self,
        http: &reqwest::Client,
        clock: &dyn Clock,
        config: &EndpointConfig,
        msg: &OutboundMessage<'_>,
    ) -> Result<String, ChannelError>;
}

/// Registry of one adapter instance per channel tag.
pub struct Adapters {
    webhook: WebhookAdapter,
    telegram: TelegramAdapter,
    lark: LarkAdapter,
    slack: SlackAdapter,
}

impl Adapters {
    pub fn new(allow_private_webhooks: bool) -> Self {
        Adapters {
            webhook: WebhookAdapter::new(allow_private_webhooks),
            telegram: TelegramAdapter,
            lark: LarkAdapter,
            slack: SlackAdapter,
        }
    }

    pub fn get(&self, channel: ChannelType) -> &dyn ChannelAdapter {
        match channel {
            ChannelType::Webhook => &self.webhook,
            ChannelType::Telegram => &self.telegram,
            ChannelType::Lark => &self.lark,
            ChannelType::Slack => &self.slack,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared POST helper
// ---------------------------------------------------------------------------

/// POST a JSON body and return (status, body text). Transport failures map to
/// `Timeout` / `Network`; status interpretation is left to the caller.
pub(crate) async fn post_json(
    http: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
) -> Result<(u16, String), ChannelError> {
    let response = http
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(map_transport_error)?;
    let status = response.status().as_u16();
    let text = response.text().await.map_err(map_transport_error)?;
    Ok((status, text))
}

pub(crate) fn map_transport_error(e: reqwest::Error) -> ChannelError {
    if e.is_timeout() {
        ChannelError::Timeout
    } else {
        ChannelError::Network(e.to_string())
    }
}

/// Short opaque message id with a channel prefix.
pub(crate) fn generate_message_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_retryability_follows_the_table() {
        assert!(retryable_status(500));
        assert!(retryable_status(503));
        assert!(retryable_status(408));
        assert!(retryable_status(429));
        assert!(!retryable_status(400));
        assert!(!retryable_status(401));
        assert!(!retryable_status(404));
        assert!(!retryable_status(422));
    }

    #[test]
    fn error_retryability() {
        assert!(ChannelError::Timeout.retryable());
        assert!(ChannelError::Network("reset".into()).retryable());
        assert!(
            ChannelError::Status {
                status: 502,
                body: String::new()
            }
            .retryable()
        );
        assert!(
            !ChannelError::Status {
                status: 403,
                body: String::new()
            }
            .retryable()
        );
        assert!(!ChannelError::Config("missing url".into()).retryable());
    }

    #[test]
    fn config_decode_rejects_wrong_shapes() {
        let err = EndpointConfig::decode(ChannelType::Telegram, br#"{"webhook_url":"x"}"#)
            .unwrap_err();
        assert!(matches!(err, ChannelError::Config(_)));
        assert!(!err.retryable());
    }

    #[test]
    fn config_decode_applies_defaults() {
        let cfg = EndpointConfig::decode(
            ChannelType::Telegram,
            br#"{"bot_token":"t","chat_id":"c"}"#,
        )
        .unwrap();
        let EndpointConfig::Telegram(tg) = cfg else {
            panic!("wrong variant");
        };
        assert_eq!(tg.parse_mode, "MarkdownV2");
        assert!(tg.disable_web_page_preview);
        assert!(!tg.disable_notification);
        assert_eq!(tg.api_base_url, "https://api.telegram.org");

        let cfg =
            EndpointConfig::decode(ChannelType::Lark, br#"{"webhook_url":"https://l"}"#).unwrap();
        let EndpointConfig::Lark(lark) = cfg else {
            panic!("wrong variant");
        };
        assert_eq!(lark.msg_type, "text");
        assert!(lark.secret.is_none());
    }
}

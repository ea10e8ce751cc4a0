// ng-protocol: Notification gateway wire types and serialization.
//
// All HTTP and queue payloads are defined here so the service, its consumers,
// and the integration suites share one frozen schema.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Channel type
// ---------------------------------------------------------------------------

/// Closed set of delivery channels.
///
/// The string forms are frozen: they appear in request bodies, the
/// `channel_configs` / `attempt_logs` relations, and per-channel results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Webhook,
    Telegram,
    Lark,
    Slack,
}

impl ChannelType {
    pub const ALL: [ChannelType; 4] = [
        ChannelType::Webhook,
        ChannelType::Telegram,
        ChannelType::Lark,
        ChannelType::Slack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Webhook => "webhook",
            ChannelType::Telegram => "telegram",
            ChannelType::Lark => "lark",
            ChannelType::Slack => "slack",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webhook" => Ok(ChannelType::Webhook),
            "telegram" => Ok(ChannelType::Telegram),
            "lark" => Ok(ChannelType::Lark),
            "slack" => Ok(ChannelType::Slack),
            _ => Err(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Content type
// ---------------------------------------------------------------------------

/// Rendering hint attached to template contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Markdown,
    Html,
    Json,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Markdown => "markdown",
            ContentType::Html => "html",
            ContentType::Json => "json",
        }
    }
}

impl FromStr for ContentType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentType::Text),
            "markdown" => Ok(ContentType::Markdown),
            "html" => Ok(ContentType::Html),
            "json" => Ok(ContentType::Json),
            _ => Err(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Attempt status
// ---------------------------------------------------------------------------

/// Lifecycle state of one (request, channel) delivery attempt.
///
/// Transitions are monotonic: `Sent` and `Failed` are absorbing, and only the
/// retry consumer moves rows out of `RetryScheduled` / `Retrying`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Sent,
    Failed,
    RetryScheduled,
    Retrying,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Sent => "sent",
            AttemptStatus::Failed => "failed",
            AttemptStatus::RetryScheduled => "retry_scheduled",
            AttemptStatus::Retrying => "retrying",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Sent | AttemptStatus::Failed)
    }
}

impl FromStr for AttemptStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AttemptStatus::Pending),
            "sent" => Ok(AttemptStatus::Sent),
            "failed" => Ok(AttemptStatus::Failed),
            "retry_scheduled" => Ok(AttemptStatus::RetryScheduled),
            "retrying" => Ok(AttemptStatus::Retrying),
            _ => Err(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Send request
// ---------------------------------------------------------------------------

/// Inline subject/content pair, exclusive with `template_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub content: String,
}

/// Body of `POST /notifications/send`.
///
/// Exactly one of `template_key` (+ optional `variables`) or `custom_content`
/// must be present; the handler rejects both-or-neither before dispatch.
///
/// `channels` carries raw names so an unknown entry rejects with
/// `INVALID_CHANNEL_TYPE` during request validation instead of failing
/// whole-body deserialization; validation resolves them to [`ChannelType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    /// Principal whose channel configs and attempt logs this request operates on.
    pub user_id: String,
    pub channels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_content: Option<CustomContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Send response
// ---------------------------------------------------------------------------

/// One per-channel outcome, in the same index position as the request's
/// `channels` array.
///
/// Field casing is frozen wire contract: `channelType` and `logId` are camel
/// case, `message_id` is snake case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelResult {
    #[serde(rename = "channelType")]
    pub channel_type: ChannelType,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "logId")]
    pub log_id: i64,
}

/// `data` payload of a successful send response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendData {
    pub request_id: String,
    pub results: Vec<ChannelResult>,
}

/// Success envelope: `{"success": true, "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(data: T) -> Self {
        SuccessEnvelope {
            success: true,
            data,
        }
    }
}

/// Error envelope used by all non-200 responses:
/// `{"success": false, "error": ..., "code": ..., "details": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        ErrorEnvelope {
            success: false,
            error: error.into(),
            code: Some(code.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

// ---------------------------------------------------------------------------
// Queue messages
// ---------------------------------------------------------------------------

/// Payload carried on both the `retry` and `dead_letter` queues.
///
/// `scheduled_at` / `expected_process_at` are Unix epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryMessage {
    pub log_id: i64,
    pub retry_count: i32,
    /// Always `"retry_notification"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub scheduled_at: i64,
    pub expected_process_at: i64,
}

impl RetryMessage {
    pub const KIND: &'static str = "retry_notification";

    pub fn new(log_id: i64, retry_count: i32, scheduled_at: i64, delay_secs: i64) -> Self {
        RetryMessage {
            log_id,
            retry_count,
            kind: RetryMessage::KIND.to_owned(),
            scheduled_at,
            expected_process_at: scheduled_at + delay_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Retry schedule constants
// ---------------------------------------------------------------------------

/// Fixed delays (seconds) between successive retry attempts.
pub const RETRY_INTERVALS: [i64; 2] = [10, 30];

/// Additional attempts after the initial send (3 total attempts).
pub const MAX_RETRY_COUNT: i32 = 2;

/// Idempotency records expire this long after insert.
pub const IDEMPOTENCY_TTL_SECS: i64 = 24 * 60 * 60;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_type_round_trips_through_str() {
        for ct in ChannelType::ALL {
            assert_eq!(ct.as_str().parse::<ChannelType>(), Ok(ct));
        }
        assert!("email".parse::<ChannelType>().is_err());
    }

    #[test]
    fn attempt_status_terminality() {
        assert!(AttemptStatus::Sent.is_terminal());
        assert!(AttemptStatus::Failed.is_terminal());
        assert!(!AttemptStatus::Pending.is_terminal());
        assert!(!AttemptStatus::RetryScheduled.is_terminal());
        assert!(!AttemptStatus::Retrying.is_terminal());
    }

    #[test]
    fn retry_message_sets_kind_and_expected_process_at() {
        let msg = RetryMessage::new(42, 1, 1_700_000_000, 30);
        assert_eq!(msg.kind, "retry_notification");
        assert_eq!(msg.expected_process_at, 1_700_000_030);
    }
}

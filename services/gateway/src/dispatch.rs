//! The dispatcher: orchestrates one send request.
//!
//! Idempotency check, config load, template resolution, concurrent fan-out to
//! the channel adapters, attempt-log persistence, and retry scheduling. Once
//! per-channel dispatch begins the request itself cannot fail: every channel
//! outcome is recorded as a log row and reported in the ordered result array.

use futures_util::future::join_all;
use ng_protocol::{
    ChannelResult, ChannelType, ContentType, RETRY_INTERVALS, SendData, SendRequest,
};
use tracing::warn;
use uuid::Uuid;

use crate::channels::OutboundMessage;
use crate::error::GatewayError;
use crate::repo::{attempt_logs, templates};
use crate::retry::publish_retry;
use crate::sanitize;
use crate::state::AppState;
use crate::template::{self, Rendered};

/// Resolve raw channel names to the closed enum, rejecting the first unknown.
pub fn resolve_channels(names: &[String]) -> Result<Vec<ChannelType>, GatewayError> {
    names
        .iter()
        .map(|name| {
            name.parse::<ChannelType>().map_err(|()| {
                GatewayError::validation(
                    "INVALID_CHANNEL_TYPE",
                    format!("unknown channel type '{name}'"),
                )
            })
        })
        .collect()
}

/// Validate a send request before any side effect.
pub fn validate_request(req: &SendRequest) -> Result<(), GatewayError> {
    if req.user_id.trim().is_empty() {
        return Err(GatewayError::validation(
            "INVALID_USER_ID",
            "user_id is required",
        ));
    }
    if req.channels.is_empty() {
        return Err(GatewayError::validation(
            "INVALID_CHANNELS",
            "channels must be a non-empty array",
        ));
    }
    resolve_channels(&req.channels)?;
    match (&req.template_key, &req.custom_content) {
        (None, None) => {
            return Err(GatewayError::validation(
                "MISSING_CONTENT",
                "either template_key or custom_content is required",
            ));
        }
        (Some(_), Some(_)) => {
            return Err(GatewayError::validation(
                "INVALID_REQUEST",
                "template_key and custom_content are mutually exclusive",
            ));
        }
        _ => {}
    }
    if let Some(custom) = &req.custom_content {
        if custom.content.trim().is_empty() {
            return Err(GatewayError::validation(
                "MISSING_CONTENT",
                "custom_content.content must be non-empty",
            ));
        }
    }

    let threat = sanitize::scan_request(
        req.custom_content
            .as_ref()
            .and_then(|c| c.subject.as_deref()),
        req.custom_content.as_ref().map(|c| c.content.as_str()),
        req.variables.as_ref(),
    );
    if let Some(threat) = threat {
        return Err(GatewayError::Security(threat));
    }
    Ok(())
}

/// Dispatch a validated request. Returns the ordered per-channel results.
pub async fn dispatch(state: &AppState, req: &SendRequest) -> Result<SendData, GatewayError> {
    // Replay: a live idempotency record returns the stored set unchanged.
    if let Some(key) = &req.idempotency_key {
        if let Some(stored) =
            crate::idempotency::check(&state.pool, state.clock.as_ref(), &req.user_id, key).await?
        {
            return Ok(stored);
        }
    }

    let channels = resolve_channels(&req.channels)?;

    // The template header is channel-independent: resolve it once, up front,
    // so a dead template rejects the whole request with no log rows.
    if let Some(key) = &req.template_key {
        if templates::fetch_active_header(&state.pool, key).await?.is_none() {
            return Err(GatewayError::not_found(
                "TEMPLATE_NOT_FOUND",
                format!("no active template '{key}'"),
            ));
        }
    }

    let request_id = Uuid::new_v4().to_string();

    // One concurrent task per channel; siblings never cancel each other and
    // the result array preserves input order.
    let tasks = channels
        .iter()
        .map(|channel| dispatch_channel(state, req, &request_id, *channel));
    let results = join_all(tasks).await;

    let data = SendData {
        request_id,
        results,
    };

    if let Some(key) = &req.idempotency_key {
        let inserted = crate::idempotency::store(
            &state.pool,
            state.clock.as_ref(),
            &req.user_id,
            key,
            req,
            &data,
        )
        .await?;
        if !inserted {
            warn!(
                principal = %req.user_id,
                idempotency_key = %key,
                "lost idempotency insert race; concurrent result set wins"
            );
        }
    }

    Ok(data)
}

async fn dispatch_channel(
    state: &AppState,
    req: &SendRequest,
    request_id: &str,
    channel: ChannelType,
) -> ChannelResult {
    let template_key = req.template_key.as_deref();

    // a. Per-channel config via the read-through cache.
    let config = match state
        .config_cache
        .get_or_load(
            &state.pool,
            &req.user_id,
            channel,
            &state.cfg.encrypt_key,
            state.clock.as_ref(),
        )
        .await
    {
        Ok(Some(config)) => config,
        Ok(None) => {
            return fail_with_row(state, req, request_id, channel, "config_not_found").await;
        }
        Err(e) => {
            let error = format!("{}: {}", e.code().to_lowercase(), e);
            return fail_with_row(state, req, request_id, channel, &error).await;
        }
    };

    // b. Render from template, or clean the inline content.
    let rendered = match build_content(state, req, channel).await {
        Ok(rendered) => rendered,
        Err(e) => {
            let error = format!("{}: {}", e.code().to_lowercase(), e);
            return fail_with_row(state, req, request_id, channel, &error).await;
        }
    };

    // c. Attempt-log row precedes the adapter call.
    let log_id = match attempt_logs::insert_pending(
        &state.pool,
        request_id,
        &req.user_id,
        channel,
        template_key,
        rendered.subject.as_deref(),
        &rendered.content,
        state.clock.now(),
    )
    .await
    {
        Ok(id) => id,
        Err(e) => {
            warn!(channel = %channel, "failed to insert attempt log: {e}");
            return ChannelResult {
                channel_type: channel,
                success: false,
                message_id: None,
                error: Some(format!("internal_error: {e}")),
                log_id: 0,
            };
        }
    };

    // d. Adapter call.
    let msg = OutboundMessage {
        subject: rendered.subject.as_deref(),
        content: &rendered.content,
        content_type: rendered.content_type,
    };
    let outcome = state
        .adapters
        .get(channel)
        .send(&state.http, state.clock.as_ref(), &config, &msg)
        .await;

    match outcome {
        Ok(message_id) => {
            if let Err(e) =
                attempt_logs::mark_sent(&state.pool, log_id, &message_id, state.clock.now()).await
            {
                warn!(log_id, "failed to mark attempt sent: {e}");
            }
            ChannelResult {
                channel_type: channel,
                success: true,
                message_id: Some(message_id),
                error: None,
                log_id,
            }
        }
        Err(e) if e.retryable() => {
            let error = e.to_string();
            if let Err(db_err) =
                attempt_logs::mark_retry_scheduled(&state.pool, log_id, 0, &error, state.clock.now())
                    .await
            {
                warn!(log_id, "failed to mark retry_scheduled: {db_err}");
            }
            match publish_retry(state, log_id, 0, RETRY_INTERVALS[0]).await {
                Ok(()) => {}
                Err(publish_err) => {
                    // A scheduled row must have a live queue message; without
                    // one the row would strand, so finalize as failed.
                    warn!(log_id, "failed to publish retry message: {publish_err}");
                    if let Err(db_err) = attempt_logs::mark_failed(
                        &state.pool,
                        log_id,
                        &format!("{error}; retry publish failed"),
                        state.clock.now(),
                    )
                    .await
                    {
                        warn!(log_id, "failed to finalize stranded row: {db_err}");
                    }
                }
            }
            ChannelResult {
                channel_type: channel,
                success: false,
                message_id: None,
                error: Some(error),
                log_id,
            }
        }
        Err(e) => {
            let error = e.to_string();
            if let Err(db_err) =
                attempt_logs::mark_failed(&state.pool, log_id, &error, state.clock.now()).await
            {
                warn!(log_id, "failed to mark attempt failed: {db_err}");
            }
            ChannelResult {
                channel_type: channel,
                success: false,
                message_id: None,
                error: Some(error),
                log_id,
            }
        }
    }
}

/// Resolve the message for one channel: template render or inline content.
async fn build_content(
    state: &AppState,
    req: &SendRequest,
    channel: ChannelType,
) -> Result<Rendered, GatewayError> {
    if let Some(key) = &req.template_key {
        let empty = serde_json::Map::new();
        let variables = req.variables.as_ref().unwrap_or(&empty);
        return template::resolve_and_render(&state.pool, key, channel, variables).await;
    }
    let custom = req
        .custom_content
        .as_ref()
        .expect("validated: custom_content present when template_key absent");
    Ok(Rendered {
        subject: custom
            .subject
            .as_deref()
            .map(|s| sanitize::clean_text(s, usize::MAX)),
        content: sanitize::clean_text(&custom.content, usize::MAX),
        content_type: ContentType::Text,
    })
}

/// Record a channel failure that happened before its adapter could run.
async fn fail_with_row(
    state: &AppState,
    req: &SendRequest,
    request_id: &str,
    channel: ChannelType,
    error: &str,
) -> ChannelResult {
    let log_id = match attempt_logs::insert_failed(
        &state.pool,
        request_id,
        &req.user_id,
        channel,
        req.template_key.as_deref(),
        error,
        state.clock.now(),
    )
    .await
    {
        Ok(id) => id,
        Err(e) => {
            warn!(channel = %channel, "failed to insert failed attempt log: {e}");
            0
        }
    };
    ChannelResult {
        channel_type: channel,
        success: false,
        message_id: None,
        error: Some(error.to_owned()),
        log_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ng_protocol::CustomContent;

    fn base_request() -> SendRequest {
        SendRequest {
            user_id: "u1".to_owned(),
            channels: vec!["webhook".to_owned()],
            template_key: None,
            variables: None,
            custom_content: Some(CustomContent {
                subject: None,
                content: "hello".to_owned(),
            }),
            idempotency_key: None,
        }
    }

    #[test]
    fn validation_accepts_a_minimal_custom_content_request() {
        assert!(validate_request(&base_request()).is_ok());
    }

    #[test]
    fn validation_rejects_blank_user_and_empty_channels() {
        let mut req = base_request();
        req.user_id = "  ".to_owned();
        assert_eq!(validate_request(&req).unwrap_err().code(), "INVALID_USER_ID");

        let mut req = base_request();
        req.channels = vec![];
        assert_eq!(validate_request(&req).unwrap_err().code(), "INVALID_CHANNELS");
    }

    #[test]
    fn validation_rejects_unknown_channel_names() {
        let mut req = base_request();
        req.channels = vec!["webhook".to_owned(), "email".to_owned()];
        let err = validate_request(&req).unwrap_err();
        assert_eq!(err.code(), "INVALID_CHANNEL_TYPE");
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn channel_resolution_preserves_order() {
        let names = vec!["slack".to_owned(), "lark".to_owned(), "telegram".to_owned()];
        assert_eq!(
            resolve_channels(&names).unwrap(),
            vec![ChannelType::Slack, ChannelType::Lark, ChannelType::Telegram]
        );
    }

    #[test]
    fn validation_enforces_exactly_one_content_source() {
        let mut req = base_request();
        req.custom_content = None;
        assert_eq!(validate_request(&req).unwrap_err().code(), "MISSING_CONTENT");

        let mut req = base_request();
        req.template_key = Some("welcome".to_owned());
        assert_eq!(validate_request(&req).unwrap_err().code(), "INVALID_REQUEST");
    }

    #[test]
    fn validation_rejects_empty_inline_content() {
        let mut req = base_request();
        req.custom_content = Some(CustomContent {
            subject: None,
            content: "   ".to_owned(),
        });
        assert_eq!(validate_request(&req).unwrap_err().code(), "MISSING_CONTENT");
    }

    #[test]
    fn validation_runs_the_threat_scan() {
        let mut req = base_request();
        req.custom_content = Some(CustomContent {
            subject: None,
            content: "<script>alert(1)</script>".to_owned(),
        });
        assert_eq!(
            validate_request(&req).unwrap_err().code(),
            "SECURITY_THREAT_DETECTED"
        );
    }
}

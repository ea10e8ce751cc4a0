//! `POST /grafana/webhook` — Grafana alert ingress.
//!
//! A format adapter over the send pipeline: Basic-Auth-guarded, converts an
//! alert payload into a custom-content send request, and dispatches it
//! through the same engine as `/notifications/send`.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use ng_protocol::{ChannelType, CustomContent, SendRequest};
use serde::Deserialize;

use crate::auth::check_basic_auth;
use crate::dispatch;
use crate::http::response::{error_response, json_error, success};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GrafanaAlert {
    pub title: String,
    /// e.g. `alerting`, `ok`, `no_data`.
    pub state: String,
    #[serde(default)]
    pub message: String,
    pub user_id: String,
    /// Channel names; defaults to webhook when omitted.
    #[serde(default)]
    pub channels: Option<Vec<String>>,
}

pub async fn grafana_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<axum::Json<GrafanaAlert>, axum::extract::rejection::JsonRejection>,
) -> impl IntoResponse {
    if state.cfg.grafana_username.is_none() || state.cfg.grafana_password.is_none() {
        return json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "INTERNAL_ERROR",
            "grafana ingress is not configured",
        );
    }
    if !check_basic_auth(&state.cfg, &headers) {
        return json_error(
            StatusCode::UNAUTHORIZED,
            "INVALID_SIGNATURE",
            "invalid basic credentials",
        );
    }

    let axum::Json(alert) = match body {
        Ok(json) => json,
        Err(rejection) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
                rejection.body_text(),
            );
        }
    };

    let request = SendRequest {
        user_id: alert.user_id,
        // Raw names pass straight through; `validate_request` resolves them
        // and answers INVALID_CHANNEL_TYPE for unknown entries.
        channels: alert
            .channels
            .unwrap_or_else(|| vec![ChannelType::Webhook.as_str().to_owned()]),
        template_key: None,
        variables: None,
        custom_content: Some(CustomContent {
            subject: Some(format!("[{}] {}", alert.state, alert.title)),
            content: if alert.message.is_empty() {
                alert.title.clone()
            } else {
                alert.message.clone()
            },
        }),
        idempotency_key: None,
    };

    if let Err(e) = dispatch::validate_request(&request) {
        return error_response(&e);
    }

    // Same detachment as the send endpoint: alert dispatch survives a
    // disconnecting Grafana client.
    let task = tokio::spawn(async move { dispatch::dispatch(&state, &request).await });
    match task.await {
        Ok(Ok(data)) => success(data),
        Ok(Err(e)) => error_response(&e),
        Err(join_err) => error_response(&crate::error::GatewayError::Internal(format!(
            "dispatch task panicked: {join_err}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_deserializes_with_optional_channels() {
        let alert: GrafanaAlert = serde_json::from_str(
            r#"{"title": "t", "state": "alerting", "user_id": "ops"}"#,
        )
        .unwrap();
        assert_eq!(alert.message, "");
        assert!(alert.channels.is_none());

        let alert: GrafanaAlert = serde_json::from_str(
            r#"{"title": "t", "state": "ok", "user_id": "ops", "channels": ["slack"]}"#,
        )
        .unwrap();
        assert_eq!(alert.channels, Some(vec!["slack".to_owned()]));
    }
}

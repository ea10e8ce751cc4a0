use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ng_protocol::{ErrorEnvelope, SuccessEnvelope};
use serde::Serialize;

use crate::error::GatewayError;

pub type HttpResponse = Response;

/// 200 with the `{"success": true, "data": ...}` envelope.
pub fn success<T: Serialize>(data: T) -> HttpResponse {
    (StatusCode::OK, Json(SuccessEnvelope::new(data))).into_response()
}

pub(crate) fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> HttpResponse {
    (status, Json(ErrorEnvelope::new(message, code))).into_response()
}

/// Map a gateway error to its envelope, carrying details when present.
pub fn error_response(err: &GatewayError) -> HttpResponse {
    let mut envelope = ErrorEnvelope::new(err.to_string(), err.code());
    if let Some(details) = err.details() {
        envelope = envelope.with_details(details);
    }
    (err.status(), Json(envelope)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn read_envelope(response: Response) -> (StatusCode, ErrorEnvelope) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body should be readable");
        let parsed: ErrorEnvelope =
            serde_json::from_slice(&body).expect("response body should be valid error json");
        (status, parsed)
    }

    #[tokio::test]
    async fn success_wraps_data_in_the_envelope() {
        let response = success(serde_json::json!({"request_id": "r1"}));
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["data"]["request_id"], "r1");
    }

    #[tokio::test]
    async fn json_error_sets_status_code_and_message() {
        let response = json_error(StatusCode::UNAUTHORIZED, "REQUEST_EXPIRED", "too old");
        let (status, envelope) = read_envelope(response).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(!envelope.success);
        assert_eq!(envelope.code.as_deref(), Some("REQUEST_EXPIRED"));
        assert_eq!(envelope.error, "too old");
    }

    #[tokio::test]
    async fn gateway_errors_map_to_their_taxonomy() {
        let err = GatewayError::MissingVariables(vec!["username".to_owned()]);
        let (status, envelope) = read_envelope(error_response(&err)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(envelope.code.as_deref(), Some("MISSING_TEMPLATE_VARIABLES"));
        assert_eq!(
            envelope.details.unwrap()["missing_variables"][0],
            "username"
        );
    }
}

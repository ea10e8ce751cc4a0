//! `POST /notifications/send`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use ng_protocol::SendRequest;

use crate::dispatch;
use crate::http::response::{error_response, json_error, success};
use crate::state::AppState;

/// The request returns 200 even when some channels failed; callers inspect
/// the per-channel `success` flags. Only pre-dispatch rejections produce the
/// non-200 error envelope.
pub async fn send_notification(
    State(state): State<AppState>,
    body: Result<axum::Json<SendRequest>, axum::extract::rejection::JsonRejection>,
) -> impl IntoResponse {
    let axum::Json(request) = match body {
        Ok(json) => json,
        Err(rejection) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
                rejection.body_text(),
            );
        }
    };

    if let Err(e) = dispatch::validate_request(&request) {
        return error_response(&e);
    }

    // Detached task: a client disconnect drops this handler future, but the
    // dispatch still runs to completion and settles its log rows.
    let task = tokio::spawn(async move { dispatch::dispatch(&state, &request).await });
    match task.await {
        Ok(Ok(data)) => success(data),
        Ok(Err(e)) => error_response(&e),
        Err(join_err) => error_response(&crate::error::GatewayError::Internal(format!(
            "dispatch task panicked: {join_err}"
        ))),
    }
}

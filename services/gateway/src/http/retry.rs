//! `POST /notifications/retry` — admin trigger for stranded retry rows.

use axum::extract::State;
use axum::response::IntoResponse;

use crate::http::response::{error_response, success};
use crate::retry;
use crate::state::AppState;

pub async fn trigger_retries(State(state): State<AppState>) -> impl IntoResponse {
    match retry::trigger_stranded_retries(&state).await {
        Ok(published) => success(serde_json::json!({ "published": published })),
        Err(e) => error_response(&e),
    }
}

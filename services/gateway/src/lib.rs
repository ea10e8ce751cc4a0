pub mod auth;
pub mod cache;
pub mod channels;
pub mod cleanup;
pub mod clock;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod idempotency;
pub mod repo;
pub mod retry;
pub mod sanitize;
pub mod state;
pub mod template;

pub use state::AppState;

use axum::{
    Router, middleware,
    routing::{get, post},
};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/notifications/send", post(http::send::send_notification))
        .route("/notifications/retry", post(http::retry::trigger_retries))
        .route("/grafana/webhook", post(http::grafana::grafana_webhook))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_signature,
        ))
        .with_state(state)
}

mod health {
    use axum::response::IntoResponse;
    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }
    pub async fn readyz() -> impl IntoResponse {
        "ok"
    }
}

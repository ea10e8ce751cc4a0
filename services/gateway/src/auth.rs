//! Signed-request authentication.
//!
//! Signed endpoints require `X-Timestamp` (epoch milliseconds, decimal) and
//! `X-Signature` (hex HMAC-SHA256 under the process secret) over a canonical
//! payload:
//!
//! - GET/DELETE: `timestamp || path || ("?" + raw_query)?`
//! - POST/PUT (and anything else with a body): `timestamp || raw body bytes`
//!
//! Freshness window is ±300 s against the injected clock. Public paths
//! (health, Grafana ingress) bypass the check; the Grafana ingress validates
//! HTTP Basic credentials instead.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::config::AppConfig;
use crate::http::response::json_error;
use crate::state::AppState;

/// Maximum clock skew between caller and gateway.
pub const MAX_SKEW_MS: i64 = 300_000;

const PUBLIC_PATHS: [&str; 3] = ["/healthz", "/readyz", "/grafana/webhook"];

pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
}

/// `|now - ts| <= 300_000` ms.
pub fn is_fresh(timestamp_ms: i64, now_ms: i64) -> bool {
    (now_ms - timestamp_ms).abs() <= MAX_SKEW_MS
}

/// Compose the canonical payload for signing/verification.
pub fn canonical_payload(
    method: &Method,
    path: &str,
    raw_query: Option<&str>,
    timestamp: &str,
    body: &[u8],
) -> Vec<u8> {
    match *method {
        Method::GET | Method::DELETE => {
            let mut payload = String::with_capacity(timestamp.len() + path.len());
            payload.push_str(timestamp);
            payload.push_str(path);
            match raw_query {
                Some(q) if !q.is_empty() => {
                    payload.push('?');
                    payload.push_str(q);
                }
                _ => {}
            }
            payload.into_bytes()
        }
        _ => {
            let mut payload = Vec::with_capacity(timestamp.len() + body.len());
            payload.extend_from_slice(timestamp.as_bytes());
            payload.extend_from_slice(body);
            payload
        }
    }
}

fn unauthorized(code: &str, message: &str) -> Response {
    json_error(StatusCode::UNAUTHORIZED, code, message)
}

/// Axum middleware enforcing the signature on every non-public route.
pub async fn require_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    if is_public_path(&path) {
        return next.run(request).await;
    }

    let timestamp = match header_str(request.headers(), "X-Timestamp") {
        Some(v) => v,
        None => return unauthorized("MISSING_SIGNATURE", "X-Timestamp header is required"),
    };
    let signature = match header_str(request.headers(), "X-Signature") {
        Some(v) => v,
        None => return unauthorized("MISSING_SIGNATURE", "X-Signature header is required"),
    };

    let Ok(timestamp_ms) = timestamp.parse::<i64>() else {
        return unauthorized("INVALID_SIGNATURE", "X-Timestamp is not a decimal timestamp");
    };
    if !is_fresh(timestamp_ms, state.clock.now_ms()) {
        return unauthorized("REQUEST_EXPIRED", "request timestamp outside the 5-minute window");
    }

    let method = request.method().clone();
    let raw_query = request.uri().query().map(str::to_owned);

    // Buffer the body for verification, then hand the request on intact.
    let (parts, body) = request.into_parts();
    let Ok(bytes) = axum::body::to_bytes(body, usize::MAX).await else {
        return json_error(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            "failed to read request body",
        );
    };

    let payload = canonical_payload(&method, &path, raw_query.as_deref(), &timestamp, &bytes);
    if !ng_crypto::verify_payload(state.cfg.api_secret_key.as_bytes(), &payload, &signature) {
        return unauthorized("INVALID_SIGNATURE", "signature verification failed");
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    next.run(request).await
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Grafana ingress authentication: HTTP Basic against process config. Always
/// false while the credentials are unset.
pub fn check_basic_auth(cfg: &AppConfig, headers: &HeaderMap) -> bool {
    let (Some(expected_user), Some(expected_pass)) =
        (cfg.grafana_username.as_deref(), cfg.grafana_password.as_deref())
    else {
        return false;
    };
    let Some(value) = headers.get("Authorization").and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = BASE64.decode(encoded) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    match decoded.split_once(':') {
        Some((user, pass)) => user == expected_user && pass == expected_pass,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_payload_for_get_includes_path_and_query() {
        let payload = canonical_payload(
            &Method::GET,
            "/notifications/logs",
            Some("limit=10"),
            "1700000000000",
            b"",
        );
        assert_eq!(payload, b"1700000000000/notifications/logs?limit=10");

        let no_query =
            canonical_payload(&Method::DELETE, "/templates/x", None, "1700000000000", b"");
        assert_eq!(no_query, b"1700000000000/templates/x");

        let empty_query =
            canonical_payload(&Method::GET, "/templates/x", Some(""), "1700000000000", b"");
        assert_eq!(empty_query, b"1700000000000/templates/x");
    }

    #[test]
    fn canonical_payload_for_post_is_timestamp_plus_raw_body() {
        let body = br#"{"user_id":"u1"}"#;
        let payload = canonical_payload(&Method::POST, "/notifications/send", None, "42", body);
        assert_eq!(payload, b"42{\"user_id\":\"u1\"}");
    }

    #[test]
    fn signature_round_trip_over_canonical_payload() {
        let secret = b"api-secret";
        let body = br#"{"user_id":"u1","channels":["webhook"]}"#;
        let payload =
            canonical_payload(&Method::POST, "/notifications/send", None, "1700000000000", body);
        let sig = ng_crypto::sign_payload(secret, &payload);
        assert!(ng_crypto::verify_payload(secret, &payload, &sig));
    }

    #[test]
    fn freshness_window_boundaries() {
        let now = 1_700_000_000_000;
        assert!(is_fresh(now - 299_999, now));
        assert!(is_fresh(now + 299_999, now));
        assert!(is_fresh(now - 300_000, now));
        assert!(!is_fresh(now - 300_001, now));
        assert!(!is_fresh(now + 300_001, now));
    }

    #[test]
    fn public_paths_bypass() {
        assert!(is_public_path("/healthz"));
        assert!(is_public_path("/readyz"));
        assert!(is_public_path("/grafana/webhook"));
        assert!(!is_public_path("/notifications/send"));
    }

    #[test]
    fn basic_auth_checks_credentials() {
        let cfg = AppConfig::for_tests("postgres://unused");
        let mut headers = HeaderMap::new();
        assert!(!check_basic_auth(&cfg, &headers));

        let good = BASE64.encode("grafana:grafana-pass");
        headers.insert("Authorization", format!("Basic {good}").parse().unwrap());
        assert!(check_basic_auth(&cfg, &headers));

        let bad = BASE64.encode("grafana:wrong");
        headers.insert("Authorization", format!("Basic {bad}").parse().unwrap());
        assert!(!check_basic_auth(&cfg, &headers));

        headers.insert("Authorization", "Bearer tok".parse().unwrap());
        assert!(!check_basic_auth(&cfg, &headers));
    }

    #[test]
    fn basic_auth_disabled_without_configured_credentials() {
        let mut cfg = AppConfig::for_tests("postgres://unused");
        cfg.grafana_username = None;
        let mut headers = HeaderMap::new();
        let good = BASE64.encode("grafana:grafana-pass");
        headers.insert("Authorization", format!("Basic {good}").parse().unwrap());
        assert!(!check_basic_auth(&cfg, &headers));
    }
}

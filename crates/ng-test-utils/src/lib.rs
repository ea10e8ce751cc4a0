// ng-test-utils: Shared test utilities for the notification gateway suite.
//
// Provides a mock third-party HTTP endpoint for integration testing of the
// channel adapters and the retry pipeline.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tokio::net::TcpListener;

/// One request captured by the mock endpoint.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Parse the captured body as JSON; panics on malformed bodies since the
    /// adapters under test always POST JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("recorded body should be JSON")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A canned response the mock endpoint plays back.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub body: String,
}

impl ScriptedResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        ScriptedResponse {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        ScriptedResponse::new(200, body)
    }
}

#[derive(Clone, Default)]
struct MockState {
    script: Arc<Mutex<VecDeque<ScriptedResponse>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// A mock third-party HTTP endpoint for integration testing.
///
/// Binds to port 0 (random) and exposes the actual bound address. Each test
/// can spin up its own isolated instance, script a response sequence, and
/// inspect the requests the adapter actually sent.
///
/// # Response behavior
///
/// Responses are played back in FIFO order. When the script runs dry the last
/// scripted response repeats; with an empty script everything gets `200 ok`.
pub struct MockEndpoint {
    addr: SocketAddr,
    state: MockState,
    /// Handle to the background serve loop; dropped when the endpoint is dropped.
    _task: tokio::task::JoinHandle<()>,
}

impl MockEndpoint {
    /// Start the mock endpoint, binding to a random available port.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = MockState::default();

        let router = Router::new()
            .fallback(capture_any)
            .with_state(state.clone());
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self {
            addr,
            state,
            _task: task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL of the endpoint, e.g. `http://127.0.0.1:49152`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// URL of the endpoint with a path appended.
    pub fn url_path(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Append a response to the playback script.
    pub fn push_response(&self, response: ScriptedResponse) {
        self.state.script.lock().unwrap().push_back(response);
    }

    /// Replace the whole playback script.
    pub fn set_script(&self, responses: Vec<ScriptedResponse>) {
        *self.state.script.lock().unwrap() = responses.into();
    }

    /// All requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }
}

async fn capture_any(
    State(state): State<MockState>,
    request: Request,
) -> impl IntoResponse {
    let method = request.method().to_string();
    let path = request.uri().path().to_owned();
    let headers: Vec<(String, String)> = request
        .headers()
        .iter()
        .map(|(n, v)| {
            (
                n.as_str().to_owned(),
                v.to_str().unwrap_or_default().to_owned(),
            )
        })
        .collect();
    let body: Bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .unwrap_or_default();

    state.requests.lock().unwrap().push(RecordedRequest {
        method,
        path,
        headers,
        body: body.to_vec(),
    });

    let response = {
        let mut script = state.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    };

    match response {
        Some(r) => (
            StatusCode::from_u16(r.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            r.body,
        ),
        None => (StatusCode::OK, "ok".to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: endpoint starts, binds to a random port, and reports a valid address.
    #[tokio::test]
    async fn endpoint_starts_and_reports_port() {
        let endpoint = MockEndpoint::start().await.unwrap();
        assert_ne!(endpoint.local_addr().port(), 0, "should bind to a real port");
    }

    /// Test: scripted responses play back in order, last one repeating.
    #[tokio::test]
    async fn scripted_responses_play_in_order_and_repeat() {
        let endpoint = MockEndpoint::start().await.unwrap();
        endpoint.set_script(vec![
            ScriptedResponse::new(503, "unavailable"),
            ScriptedResponse::ok("ok"),
        ]);

        let client = reqwest::Client::new();
        let first = client.post(endpoint.url()).body("a").send().await.unwrap();
        assert_eq!(first.status().as_u16(), 503);
        let second = client.post(endpoint.url()).body("b").send().await.unwrap();
        assert_eq!(second.status().as_u16(), 200);
        let third = client.post(endpoint.url()).body("c").send().await.unwrap();
        assert_eq!(third.status().as_u16(), 200, "last response repeats");

        assert_eq!(endpoint.request_count(), 3);
        assert_eq!(endpoint.requests()[0].body, b"a");
    }

    /// Test: request bodies and headers are captured for inspection.
    #[tokio::test]
    async fn requests_are_recorded_with_headers_and_json_body() {
        let endpoint = MockEndpoint::start().await.unwrap();

        let client = reqwest::Client::new();
        client
            .post(endpoint.url_path("/hook"))
            .header("X-Test", "yes")
            .json(&serde_json::json!({"content": "hello"}))
            .send()
            .await
            .unwrap();

        let requests = endpoint.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/hook");
        assert_eq!(requests[0].header("x-test"), Some("yes"));
        assert_eq!(requests[0].json()["content"], "hello");
    }
}

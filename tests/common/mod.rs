// copilot-mcp - Shared integration test helpers
//
// A scripted mock of the upstream Copilot API (bound to 127.0.0.1:0) and an
// in-memory identity provider, so gateway / dispatcher tests never touch the
// network or a real GitHub App.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::Instant;

use copilot_mcp::auth::{Credential, CredentialAuthority, ExchangeError, IdentityProvider};
use copilot_mcp::gateway::CopilotGateway;
use copilot_mcp::state::AppContext;

// ── Mock upstream ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: json!({ "message": format!("status {}", status) }),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }
}

/// One request as seen by the mock.
#[derive(Debug, Clone)]
pub struct Seen {
    pub endpoint: String,
    pub authorization: Option<String>,
    pub user_agent: Option<String>,
    pub body: Value,
    pub at: Instant,
}

#[derive(Default)]
struct MockState {
    script: Mutex<VecDeque<Reply>>,
    seen: Mutex<Vec<Seen>>,
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockUpstream {
    /// Start a mock that replays `script`, then answers 200 `{"completion":"result"}`.
    pub async fn start(script: Vec<Reply>) -> Self {
        let state = Arc::new(MockState {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/{endpoint}", post(upstream_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.state.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.state.seen.lock().unwrap().clone()
    }
}

async fn upstream_handler(
    State(state): State<Arc<MockState>>,
    Path(endpoint): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.seen.lock().unwrap().push(Seen {
        endpoint,
        authorization: header("authorization"),
        user_agent: header("user-agent"),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        at: Instant::now(),
    });

    let reply = state
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Reply::ok(json!({ "completion": "result" })));

    let mut response = (
        StatusCode::from_u16(reply.status).unwrap(),
        axum::Json(reply.body),
    )
        .into_response();
    for (name, value) in reply.headers {
        response
            .headers_mut()
            .insert(name, value.parse().unwrap());
    }
    response
}

// ── Identity provider ───────────────────────────────────────────────────────

/// Always succeeds with `tok-1`, `tok-2`, ... valid for an hour.
#[derive(Default)]
pub struct CountingProvider {
    calls: AtomicU64,
}

impl CountingProvider {
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for CountingProvider {
    async fn exchange(&self, _installation_id: &str) -> Result<Credential, ExchangeError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Credential {
            token: format!("tok-{}", n),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

// ── Builders ────────────────────────────────────────────────────────────────

pub struct Harness {
    pub upstream: MockUpstream,
    pub provider: Arc<CountingProvider>,
    pub ctx: AppContext,
}

/// Context wired to a fresh mock upstream, with millisecond backoff.
pub async fn harness(script: Vec<Reply>) -> Harness {
    let upstream = MockUpstream::start(script).await;
    let provider = Arc::new(CountingProvider::default());
    let credentials = Arc::new(CredentialAuthority::new(provider.clone(), Some("1234".to_string())));
    let gateway = CopilotGateway::new(
        reqwest::Client::new(),
        upstream.base_url(),
        credentials.clone(),
        Duration::from_secs(300),
    )
    .with_backoff_unit(Duration::from_millis(5));

    Harness {
        upstream,
        provider,
        ctx: AppContext::new(credentials, Arc::new(gateway)),
    }
}

/// Collect a response body into a `serde_json::Value`.
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

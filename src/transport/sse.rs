// copilot-mcp - Push transport (HTTP POST ingress + SSE egress)
//! `POST /rpc` accepts one JSON envelope per request and acknowledges it
//! right away; the response is produced asynchronously and broadcast as an
//! SSE `data:` frame to every client currently connected to `GET /events`.
//!
//! Subscribers are plain broadcast receivers: opening `/events` adds one,
//! dropping the connection removes it. There is no replay for late joiners,
//! and a subscriber that falls too far behind loses the frames it missed.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::{MessageHandler, Transport};
use crate::error::{BridgeError, BridgeResult};
use crate::rpc::RpcResponse;

/// Frames buffered per subscriber before a slow reader starts losing them.
const SUBSCRIBER_BUFFER: usize = 256;
const MAX_BODY_BYTES: usize = 1024 * 1024;
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub struct PushTransport {
    events: broadcast::Sender<String>,
}

#[derive(Clone)]
struct PushState {
    transport: Arc<PushTransport>,
    handler: Arc<dyn MessageHandler>,
}

impl PushTransport {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Arc::new(Self { events })
    }

    /// Number of currently open `/events` connections.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Build the HTTP router. Inbound bodies go to `handler`.
    pub fn router(self: Arc<Self>, handler: Arc<dyn MessageHandler>) -> Router {
        let state = PushState {
            transport: self,
            handler,
        };

        Router::new()
            .route("/events", get(events))
            .route("/rpc", post(rpc))
            .route("/health", get(health))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            .layer(TraceLayer::new_for_http())
    }
}

#[async_trait]
impl Transport for PushTransport {
    async fn write(&self, message: Value) -> BridgeResult<()> {
        let frame = serde_json::to_string(&message)?;
        match self.events.send(frame) {
            Ok(delivered) => {
                tracing::debug!(subscribers = delivered, "push transport: broadcast frame");
            }
            Err(_) => {
                tracing::debug!("push transport: no subscribers, frame dropped");
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sse"
    }
}

/// Logs when a subscriber's stream is dropped (connection closed).
struct SubscriberGuard {
    transport: Arc<PushTransport>,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        tracing::info!(
            subscribers = self.transport.subscriber_count().saturating_sub(1),
            "push transport: subscriber disconnected"
        );
    }
}

// ── GET /events ─────────────────────────────────────────────────────────────

async fn events(
    State(state): State<PushState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.transport.events.subscribe();
    tracing::info!(
        subscribers = state.transport.subscriber_count(),
        "push transport: subscriber connected"
    );

    let guard = SubscriberGuard {
        transport: state.transport.clone(),
    };
    let stream = BroadcastStream::new(receiver).filter_map(move |frame| {
        let _guard = &guard;
        let event = match frame {
            Ok(data) => Some(Ok(Event::default().data(data))),
            Err(e) => {
                tracing::warn!("push transport: subscriber lagged: {}", e);
                None
            }
        };
        async move { event }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("heartbeat"),
    )
}

// ── POST /rpc ───────────────────────────────────────────────────────────────

async fn rpc(State(state): State<PushState>, body: Bytes) -> Response {
    let syntax = serde_json::from_slice::<serde::de::IgnoredAny>(&body);
    let raw = String::from_utf8_lossy(&body).into_owned();

    // The response envelope is broadcast over /events; this reply is only an ack.
    let handler = state.handler.clone();
    let transport: Arc<dyn Transport> = state.transport.clone();
    tokio::spawn(async move { handler.on_message(raw, transport).await });

    match syntax {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::warn!("push transport: rejected non-JSON body: {}", e);
            let envelope = RpcResponse::failure(None, &BridgeError::Parse(e.to_string()));
            (StatusCode::BAD_REQUEST, Json(envelope)).into_response()
        }
    }
}

// ── GET /health ─────────────────────────────────────────────────────────────

async fn health(State(state): State<PushState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "subscribers": state.transport.subscriber_count(),
    }))
}

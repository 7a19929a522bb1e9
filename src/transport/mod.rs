// copilot-mcp - Transport abstraction
//! Two interchangeable duplex channels behind one interface:
//!
//! - [`stdio::LineTransport`]: newline-delimited JSON over a byte stream
//!   (stdin / stdout in production).
//! - [`sse::PushTransport`]: `POST /rpc` ingress, `GET /events` server-push
//!   egress broadcast to every open subscriber.
//!
//! Inbound messages go to a [`MessageHandler`] (the dispatcher) together
//! with the transport they arrived on, so responses leave the same way.

pub mod sse;
pub mod stdio;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeResult;

/// Egress half of a transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Emit one JSON message.
    async fn write(&self, message: Value) -> BridgeResult<()>;

    /// Short name for log fields.
    fn name(&self) -> &'static str;
}

/// Receives every complete inbound message.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn on_message(&self, raw: String, transport: Arc<dyn Transport>);
}

/// Boot-time transport choice, fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Stdio,
    Sse,
}

impl TransportKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdio" | "line" => Some(TransportKind::Stdio),
            "sse" | "http" | "push" => Some(TransportKind::Sse),
            _ => None,
        }
    }
}

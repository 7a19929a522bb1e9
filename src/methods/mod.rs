// copilot-mcp - Registered JSON-RPC methods
//! System methods (`initialize`, `health_check`, `ping`) and the three
//! forwarding methods. Forwarding methods validate their params against the
//! declared shape before anything reaches the gateway.

pub mod schemas;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::BridgeResult;
use crate::gateway::{CompletionOptions, CopilotGateway};
use crate::rpc::{Dispatcher, RpcMethod};
use crate::state::{AppContext, SERVER_NAME, SERVER_VERSION};
use schemas::{CompleteParams, ExplainParams, ReviewParams};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// The three forwarding methods, in the order they are advertised.
pub const FORWARDING_METHODS: [&str; 3] = ["copilot_complete", "copilot_review", "copilot_explain"];

/// Build the `initialize` result.
pub fn initialize_result() -> Value {
    let capabilities: serde_json::Map<String, Value> = FORWARDING_METHODS
        .iter()
        .map(|m| (m.to_string(), Value::Bool(true)))
        .collect();

    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": capabilities,
        "serverInfo": {
            "name": SERVER_NAME,
            "version": SERVER_VERSION,
        },
        "schemas": schemas::all_schemas(),
    })
}

// ── Forwarding handlers ─────────────────────────────────────────────────────

struct Complete(Arc<CopilotGateway>);

#[async_trait]
impl RpcMethod for Complete {
    async fn call(&self, params: Value) -> BridgeResult<Value> {
        let body = schemas::normalize::<CompleteParams>("copilot_complete", params)?;
        let options = CompletionOptions {
            retries: self.0.retries(),
            ..CompletionOptions::default()
        };
        self.0.complete(&body, options).await
    }
}

struct Review(Arc<CopilotGateway>);

#[async_trait]
impl RpcMethod for Review {
    async fn call(&self, params: Value) -> BridgeResult<Value> {
        let body = schemas::normalize::<ReviewParams>("copilot_review", params)?;
        self.0.review(&body).await
    }
}

struct Explain(Arc<CopilotGateway>);

#[async_trait]
impl RpcMethod for Explain {
    async fn call(&self, params: Value) -> BridgeResult<Value> {
        let body = schemas::normalize::<ExplainParams>("copilot_explain", params)?;
        self.0.explain(&body).await
    }
}

/// Register every method on `dispatcher`.
pub fn register_all(dispatcher: &mut Dispatcher, ctx: &AppContext) -> BridgeResult<()> {
    dispatcher.add_fn("initialize", |_params| async { Ok(initialize_result()) })?;
    dispatcher.add_fn("health_check", |_params| async { Ok(json!({ "status": "ok" })) })?;
    dispatcher.add_fn("ping", |_params| async { Ok(json!("pong")) })?;

    dispatcher.add_method("copilot_complete", Complete(ctx.gateway.clone()))?;
    dispatcher.add_method("copilot_review", Review(ctx.gateway.clone()))?;
    dispatcher.add_method("copilot_explain", Explain(ctx.gateway.clone()))?;

    tracing::info!(methods = ?dispatcher.method_names(), "methods registered");
    Ok(())
}

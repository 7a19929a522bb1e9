// copilot-mcp - JSON-RPC dispatcher
//! Routes inbound envelopes to registered method handlers.
//!
//! Per message: parse, route by method name, run the handler, emit exactly
//! one response envelope back through the transport that delivered it.
//! Malformed envelopes and unknown methods are rejected with a structured
//! error; handler failures (including panics) become `error` envelopes.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;

use super::{RpcRequest, RpcResponse};
use crate::error::{BridgeError, BridgeResult};
use crate::transport::{MessageHandler, Transport};

/// A registered method. Same contract for every method: params in, result out.
#[async_trait]
pub trait RpcMethod: Send + Sync {
    async fn call(&self, params: Value) -> BridgeResult<Value>;
}

/// Adapter so plain async closures can be registered as methods.
pub struct FnMethod<F>(pub F);

#[async_trait]
impl<F, Fut> RpcMethod for FnMethod<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = BridgeResult<Value>> + Send + 'static,
{
    async fn call(&self, params: Value) -> BridgeResult<Value> {
        (self.0)(params).await
    }
}

#[derive(Default)]
pub struct Dispatcher {
    methods: HashMap<String, Arc<dyn RpcMethod>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A second registration under the same name is a
    /// configuration error and leaves the first one in place.
    pub fn add_method(
        &mut self,
        name: impl Into<String>,
        method: impl RpcMethod + 'static,
    ) -> BridgeResult<()> {
        let name = name.into();
        if self.methods.contains_key(&name) {
            return Err(BridgeError::DuplicateMethod(name));
        }
        tracing::debug!(method = %name, "dispatcher: method registered");
        self.methods.insert(name, Arc::new(method));
        Ok(())
    }

    /// Register an async closure as a handler.
    pub fn add_fn<F, Fut>(&mut self, name: impl Into<String>, f: F) -> BridgeResult<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BridgeResult<Value>> + Send + 'static,
    {
        self.add_method(name, FnMethod(f))
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Turn one raw inbound message into its response envelope.
    pub async fn handle(&self, raw: &str) -> RpcResponse {
        let request = match RpcRequest::parse(raw) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("dispatcher: rejected inbound message: {}", e);
                // The request id cannot be trusted once the envelope is malformed.
                return RpcResponse::failure(None, &e);
            }
        };
        self.dispatch(request).await
    }

    /// Route an already-parsed request.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let RpcRequest { id, method, params } = request;

        let Some(handler) = self.methods.get(&method).cloned() else {
            tracing::warn!(method = %method, "dispatcher: method not found");
            return RpcResponse::failure(id, &BridgeError::MethodNotFound(method));
        };

        tracing::debug!(method = %method, "dispatcher: routing request");

        let outcome = AssertUnwindSafe(handler.call(params)).catch_unwind().await;
        match outcome {
            Ok(Ok(result)) => RpcResponse::success(id, result),
            Ok(Err(e)) => {
                tracing::warn!(method = %method, code = e.rpc_code(), "dispatcher: handler failed: {}", e);
                RpcResponse::failure(id, &e)
            }
            Err(_) => {
                tracing::error!(method = %method, "dispatcher: handler panicked");
                RpcResponse::failure(
                    id,
                    &BridgeError::Internal(format!("handler for '{}' panicked", method)),
                )
            }
        }
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn on_message(&self, raw: String, transport: Arc<dyn Transport>) {
        let response = self.handle(&raw).await;
        let message = match serde_json::to_value(&response) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("dispatcher: failed to serialize response: {}", e);
                return;
            }
        };
        if let Err(e) = transport.write(message).await {
            tracing::error!(transport = transport.name(), "dispatcher: failed to emit response: {}", e);
        }
    }
}

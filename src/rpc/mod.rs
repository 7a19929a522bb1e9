// copilot-mcp - JSON-RPC 2.0 envelopes
//! Request / response envelope types and the standard error codes.
//!
//! A response carries exactly one of `result` or `error`; this is enforced
//! by [`RpcOutcome`] rather than by two optional fields.

pub mod dispatcher;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;

pub use dispatcher::{Dispatcher, RpcMethod};

pub const JSONRPC_VERSION: &str = "2.0";

// ── Error codes ─────────────────────────────────────────────────────────────

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
/// Credentials could not be obtained (configuration or exchange failure).
pub const CREDENTIAL_ERROR: i64 = -32001;
/// The upstream API rejected the call or retries ran out.
pub const UPSTREAM_ERROR: i64 = -32002;

// ── Request ─────────────────────────────────────────────────────────────────

/// A validated inbound request envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    /// Correlation token; `None` when the request omitted it.
    pub id: Option<Value>,
    pub method: String,
    /// `Value::Null` when the request carried no params.
    pub params: Value,
}

impl RpcRequest {
    /// Parse one raw inbound message.
    ///
    /// Fails with [`BridgeError::Parse`] when the text is not JSON and with
    /// [`BridgeError::InvalidRequest`] when it is JSON but not a request
    /// envelope (wrong version, missing method, unusable id).
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let value: Value =
            serde_json::from_str(raw.trim()).map_err(|e| BridgeError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, BridgeError> {
        let Value::Object(mut obj) = value else {
            return Err(BridgeError::InvalidRequest(
                "envelope must be a JSON object".to_string(),
            ));
        };

        match obj.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            _ => {
                return Err(BridgeError::InvalidRequest(
                    "jsonrpc must be \"2.0\"".to_string(),
                ));
            }
        }

        let method = match obj.remove("method") {
            Some(Value::String(m)) if !m.is_empty() => m,
            _ => {
                return Err(BridgeError::InvalidRequest(
                    "method must be a non-empty string".to_string(),
                ));
            }
        };

        let id = match obj.remove("id") {
            None => None,
            Some(id @ (Value::Null | Value::Number(_) | Value::String(_))) => Some(id),
            Some(_) => {
                return Err(BridgeError::InvalidRequest(
                    "id must be a number, string or null".to_string(),
                ));
            }
        };

        Ok(Self {
            id,
            method,
            params: obj.remove("params").unwrap_or(Value::Null),
        })
    }
}

// ── Response ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcOutcome {
    Result(Value),
    Error(RpcErrorObject),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(flatten)]
    pub outcome: RpcOutcome,
}

impl RpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.unwrap_or(Value::Null),
            outcome: RpcOutcome::Result(result),
        }
    }

    pub fn failure(id: Option<Value>, err: &BridgeError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.unwrap_or(Value::Null),
            outcome: RpcOutcome::Error(err.to_rpc_error()),
        }
    }
}

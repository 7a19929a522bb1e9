// copilot-mcp - Error taxonomy
//
// Every failure that can happen while serving a request resolves to one of
// these variants, and every variant knows how to render itself as a
// JSON-RPC error object. Nothing here is allowed to take the process down.

use serde_json::{json, Value};

use crate::rpc::{self, RpcErrorObject};

/// Result alias used across the crate.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Missing or unparseable credentials / settings.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing installation id")]
    MissingInstallationIdentity,

    /// The identity provider exchange failed (possibly after retries).
    #[error("Credential exchange failed after {attempts} attempt(s): {reason}")]
    CredentialExchangeFailed { attempts: u32, reason: String },

    /// Non-retryable or retry-exhausted upstream call.
    #[error("GitHub Copilot API error: {status} {body}")]
    UpstreamRequestFailed { status: u16, body: String },

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Method already registered: {0}")]
    DuplicateMethod(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// JSON-RPC error code for each variant.
    pub fn rpc_code(&self) -> i64 {
        match self {
            BridgeError::Parse(_) => rpc::PARSE_ERROR,
            BridgeError::InvalidRequest(_) => rpc::INVALID_REQUEST,
            BridgeError::MethodNotFound(_) => rpc::METHOD_NOT_FOUND,
            BridgeError::InvalidParams(_) => rpc::INVALID_PARAMS,
            BridgeError::Configuration(_)
            | BridgeError::MissingInstallationIdentity
            | BridgeError::CredentialExchangeFailed { .. } => rpc::CREDENTIAL_ERROR,
            BridgeError::UpstreamRequestFailed { .. } => rpc::UPSTREAM_ERROR,
            BridgeError::DuplicateMethod(_)
            | BridgeError::Transport(_)
            | BridgeError::Http(_)
            | BridgeError::Internal(_) => rpc::INTERNAL_ERROR,
        }
    }

    /// Structured context attached as `error.data`, when there is any.
    fn rpc_data(&self) -> Option<Value> {
        match self {
            BridgeError::UpstreamRequestFailed { status, body } => {
                Some(json!({ "status": status, "body": body }))
            }
            BridgeError::CredentialExchangeFailed { attempts, .. } => {
                Some(json!({ "attempts": attempts }))
            }
            _ => None,
        }
    }

    /// Render as the `error` member of a response envelope.
    pub fn to_rpc_error(&self) -> RpcErrorObject {
        RpcErrorObject {
            code: self.rpc_code(),
            message: self.to_string(),
            data: self.rpc_data(),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Internal(format!("JSON serialization failed: {}", err))
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

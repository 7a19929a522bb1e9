// copilot-mcp - Input shapes for the forwarding methods
//
// Each shape is a typed struct (validation + defaults through serde) plus a
// JSON Schema declaration advertised from `initialize`. Unknown fields are
// dropped; the re-serialized struct is what gets forwarded and fingerprinted.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteParams {
    pub code: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_position: Option<u64>,
    #[serde(default = "default_max_completions")]
    pub max_completions: u32,
}

fn default_max_completions() -> u32 {
    3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusArea {
    Security,
    Performance,
    Readability,
    Bugs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewParams {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_areas: Option<Vec<FocusArea>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Brief,
    Detailed,
    Comprehensive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainParams {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_level: Option<DetailLevel>,
    #[serde(default)]
    pub include_examples: bool,
}

/// Deserialize `params` into `T`; any mismatch is an invalid-params error.
/// Absent params are treated as an empty object.
pub fn parse_params<T: DeserializeOwned>(method: &str, params: Value) -> BridgeResult<T> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| BridgeError::InvalidParams(format!("{}: {}", method, e)))
}

/// Validate, fill defaults, and return the normalized JSON body.
pub fn normalize<T>(method: &str, params: Value) -> BridgeResult<Value>
where
    T: DeserializeOwned + Serialize,
{
    let typed: T = parse_params(method, params)?;
    Ok(serde_json::to_value(typed)?)
}

// ── Declared schemas ────────────────────────────────────────────────────────

pub fn complete_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "code": { "type": "string", "description": "Current code context" },
            "language": { "type": "string", "description": "Programming language" },
            "cursor_position": { "type": "integer", "minimum": 0, "description": "Cursor position in code" },
            "max_completions": { "type": "integer", "minimum": 0, "default": 3 }
        },
        "required": ["code", "language"]
    })
}

pub fn review_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "code": { "type": "string", "description": "Code to review" },
            "context": { "type": "string", "description": "Additional context" },
            "focus_areas": {
                "type": "array",
                "items": { "type": "string", "enum": ["security", "performance", "readability", "bugs"] }
            }
        },
        "required": ["code"]
    })
}

pub fn explain_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "code": { "type": "string", "description": "Code to explain" },
            "detail_level": { "type": "string", "enum": ["brief", "detailed", "comprehensive"] },
            "include_examples": { "type": "boolean", "default": false }
        },
        "required": ["code"]
    })
}

/// Method name → schema, as advertised by `initialize`.
pub fn all_schemas() -> Value {
    json!({
        "copilot_complete": complete_schema(),
        "copilot_review": review_schema(),
        "copilot_explain": explain_schema(),
    })
}

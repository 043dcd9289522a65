//! JSON-RPC 2.0 envelope types shared by single and batched requests
//! (`spec.md` §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "jsonrpc_version")]
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Either a single envelope or a batch, the two shapes `POST /` accepts.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcRequestBatch {
    Single(JsonRpcRequest),
    Batch(Vec<JsonRpcRequest>),
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self { jsonrpc: "2.0", id, result: None, error: Some(error) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcError {
    /// `-32601`: the JSON-RPC 2.0 baseline response for a method this proxy
    /// does not implement at all (distinct from [`crate::error::ProxyError`],
    /// which covers methods it implements but rejects).
    pub fn method_not_found(method: &str) -> Self {
        Self { code: -32601, message: format!("method '{method}' not found") }
    }

    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self { code: -32700, message: format!("parse error: {detail}") }
    }
}

impl From<crate::error::ProxyError> for JsonRpcError {
    fn from(err: crate::error::ProxyError) -> Self {
        Self { code: err.rpc_code(), message: err.to_string() }
    }
}

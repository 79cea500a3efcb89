//! JSON-RPC 2.0 frame types and codec.
//!
//! A `Frame` is one wire-level unit: a single request/notification, a
//! single response, or a batch of either. Decoding never panics on bad
//! input — every failure mode is represented explicitly so the dispatcher
//! can turn it into the canonical JSON-RPC error response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version string. Only `"2.0"` is accepted.
pub const JSONRPC_VERSION: &str = "2.0";

/// A parsed, validated JSON-RPC request or notification.
///
/// `id: None` means notification: no response is ever emitted for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl RpcRequest {
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A JSON-RPC id: string or number. `null` is represented as `None` on
/// `RpcRequest`/`RpcResponse` rather than as a variant here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl RequestId {
    #[must_use]
    pub fn as_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Number(n) => Value::Number((*n).into()),
        }
    }
}

/// A JSON-RPC response: either a result or an error, never both.
#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// `null` is emitted (not omitted) when the id could not be recovered.
    pub id: Value,
}

impl RpcResponse {
    #[must_use]
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result: Some(result),
            error: None,
            id: id.map_or(Value::Null, |i| i.as_json()),
        }
    }

    #[must_use]
    pub fn failure(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result: None,
            error: Some(error),
            id: id.map_or(Value::Null, |i| i.as_json()),
        }
    }
}

/// Canonical JSON-RPC error shape. See `crate::error` for the code table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A batch element that failed to parse: the id (if one could be
/// recovered) plus the shape error, ready to become a response.
#[derive(Debug, Clone)]
pub struct ElementError {
    pub id: Option<RequestId>,
    pub error: RpcError,
}

/// One decoded unit of inbound traffic. Batch members are decoded
/// independently — a malformed member does not fail the whole batch.
#[derive(Debug, Clone)]
pub enum Frame {
    Single(RpcRequest),
    Batch(Vec<Result<RpcRequest, ElementError>>),
}

/// Outcome of decoding the top-level payload.
pub enum DecodeOutcome {
    Ok(Frame),
    /// Parse/shape failure that invalidates the entire payload (malformed
    /// JSON, or a non-array top-level value that isn't a request object,
    /// or an empty batch). Callers return one error response, `id: null`.
    Invalid(RpcError),
}

/// Decode one raw JSON-RPC frame (single value or batch array) from bytes.
pub fn decode(bytes: &[u8]) -> DecodeOutcome {
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(_) => return DecodeOutcome::Invalid(RpcError::new(-32700, "Parse error")),
    };

    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return DecodeOutcome::Invalid(RpcError::new(-32600, "Invalid Request"));
            }
            let elements = items
                .into_iter()
                .map(|item| decode_single(&item).map_err(|(id, error)| ElementError { id, error }))
                .collect();
            DecodeOutcome::Ok(Frame::Batch(elements))
        }
        other => match decode_single(&other) {
            Ok(req) => DecodeOutcome::Ok(Frame::Single(req)),
            Err((_, error)) => DecodeOutcome::Invalid(error),
        },
    }
}

/// Decode one JSON-RPC object. On failure, returns the id recovered so far
/// (if any was parseable before the failing field) alongside the error.
fn decode_single(value: &Value) -> Result<RpcRequest, (Option<RequestId>, RpcError)> {
    let obj = match value.as_object() {
        Some(o) => o,
        None => return Err((None, RpcError::new(-32600, "Invalid Request"))),
    };

    let id = match parse_id(obj.get("id")) {
        Ok(id) => id,
        Err(e) => return Err((None, e)),
    };

    let jsonrpc_ok = obj.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION);
    if !jsonrpc_ok {
        return Err((id, RpcError::new(-32600, "Invalid Request")));
    }

    let method = match obj.get("method") {
        Some(Value::String(m)) if !m.is_empty() => m.clone(),
        _ => return Err((id, RpcError::new(-32600, "Invalid Request"))),
    };

    let params = match obj.get("params") {
        None => None,
        Some(Value::Object(_) | Value::Array(_)) => obj.get("params").cloned(),
        Some(_) => return Err((id, RpcError::new(-32600, "Invalid Request"))),
    };

    Ok(RpcRequest { jsonrpc: JSONRPC_VERSION.to_string(), method, params, id })
}

fn parse_id(raw: Option<&Value>) -> Result<Option<RequestId>, RpcError> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(RequestId::String(s.clone()))),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(|i| Some(RequestId::Number(i)))
            .ok_or_else(|| RpcError::new(-32600, "Invalid Request")),
        Some(_) => Err(RpcError::new(-32600, "Invalid Request")),
    }
}

/// Encode a single response back to bytes.
#[must_use]
pub fn encode(response: &RpcResponse) -> Vec<u8> {
    serde_json::to_vec(response).expect("RpcResponse always serializes")
}

/// Encode a batch of responses back to bytes.
#[must_use]
pub fn encode_batch(responses: &[RpcResponse]) -> Vec<u8> {
    serde_json::to_vec(responses).expect("RpcResponse always serializes")
}

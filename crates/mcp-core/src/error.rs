//! Error taxonomy and the Error Mapper.
//!
//! Every failure that crosses the dispatcher boundary is an explicit
//! `DispatchError` variant. The mapper turns each into the canonical
//! JSON-RPC error code/message from a fixed canonical table — never a
//! stack trace, never a secret.

use crate::protocol::RpcError;

/// Errors the dispatch core can raise, grouped by the taxonomy in the
/// design: Protocol, Dispatch, Execution, Capacity, Control, Security.
#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    /// -32600. Shape-invalid request caught by defense-in-depth validation
    /// (the transport-level codec already rejects most of these earlier).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// -32601. Unknown top-level method, or `tools/call` naming a tool the
    /// registry cannot resolve.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// -32602. `tools/call` arguments failed schema validation, or
    /// required call-level fields (`name`) are missing.
    #[error("invalid params: {message}")]
    InvalidParams { message: String, violations: Vec<String> },

    /// -32603. Uncaught panic or unexpected failure inside a tool call or
    /// inside the dispatcher itself.
    #[error("internal error: {0}")]
    Internal(String),

    /// -32001. Auth middleware rejected the credential.
    #[error("unauthorized")]
    Unauthorized,

    /// -32002. The tool itself returned a declared `ToolError`.
    #[error("tool execution failed: {message}")]
    ToolFailed { tool: String, kind: String, message: String },

    /// -32003. The request's deadline elapsed before completion.
    #[error("request timeout")]
    Timeout,

    /// -32004. Dispatch slot acquisition failed under backpressure, or the
    /// rate limiter's bucket is empty.
    #[error("server busy")]
    Busy,

    /// -32005. Client disconnected, or drain/hard-kill cancelled the call.
    #[error("cancelled")]
    Cancelled,
}

impl DispatchError {
    /// Map to the canonical JSON-RPC code.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams { .. } => -32602,
            Self::Internal(_) => -32603,
            Self::Unauthorized => -32001,
            Self::ToolFailed { .. } => -32002,
            Self::Timeout => -32003,
            Self::Busy => -32004,
            Self::Cancelled => -32005,
        }
    }

    #[must_use]
    pub const fn canonical_message(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "Invalid Request",
            Self::MethodNotFound(_) => "Method not found",
            Self::InvalidParams { .. } => "Invalid params",
            Self::Internal(_) => "Internal error",
            Self::Unauthorized => "Unauthorized",
            Self::ToolFailed { .. } => "Tool execution failed",
            Self::Timeout => "Request timeout",
            Self::Busy => "Server busy",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Build the wire-level `RpcError`, attaching only non-sensitive
    /// structured `data` — never the internal error's own message, which
    /// might embed details the caller shouldn't see.
    #[must_use]
    pub fn into_rpc_error(self) -> RpcError {
        let code = self.code();
        let message = self.canonical_message().to_string();
        let data = match &self {
            Self::MethodNotFound(name) => Some(serde_json::json!({ "tool": name })),
            Self::InvalidParams { violations, .. } => {
                Some(serde_json::json!({ "violations": violations }))
            }
            Self::ToolFailed { tool, kind, message } => {
                Some(serde_json::json!({ "tool": tool, "kind": kind, "message": message }))
            }
            _ => None,
        };
        match data {
            Some(d) => RpcError::new(code, message).with_data(d),
            None => RpcError::new(code, message),
        }
    }
}

/// Errors from `Config` construction/validation at startup. A config
/// failure must prevent every transport from binding.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid bind address for {field}: {value}")]
    InvalidBindAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("{field} must be at least {min} (got {value})")]
    BelowMinimum { field: &'static str, min: u64, value: u64 },
}

/// Result alias used at the dispatcher boundary.
pub type DispatchResult<T> = Result<T, DispatchError>;

//! Request Router / Dispatcher.
//!
//! Turns a decoded `Frame` into zero, one, or many `RpcResponse`s: routes
//! built-in MCP methods itself, routes everything else to the Tool
//! Registry, and enforces the deadline/cancellation/concurrency policy
//! around every tool call.

mod cancellation;
mod concurrency;

pub use cancellation::{CancelToken, InFlightRequest};
pub use concurrency::{ConcurrencyController, DispatchSlot};

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::Config;
use crate::connection::Connection;
use crate::error::DispatchError;
use crate::events::{Event, EventBus};
use crate::protocol::{DecodeOutcome, ElementError, Frame, RequestId, RpcRequest, RpcResponse};
use crate::registry::{ResolvedTool, ToolContext, ToolRegistry};

pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// What the caller's transport should do with the outcome of dispatching
/// one wire message.
pub enum DispatchOutcome {
    /// Nothing to send back (a lone notification, or an empty batch of
    /// notifications).
    NoReply,
    Single(RpcResponse),
    Batch(Vec<RpcResponse>),
}

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    concurrency: Arc<ConcurrencyController>,
    config: Arc<Config>,
    events: Arc<EventBus>,
    server_name: String,
    server_version: String,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        registry: Arc<ToolRegistry>,
        concurrency: Arc<ConcurrencyController>,
        config: Arc<Config>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            concurrency,
            config,
            events,
            server_name: "mcp-core".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Decode raw bytes and dispatch. This is the single entry point
    /// every transport calls.
    pub async fn handle_bytes(&self, connection: &Arc<Connection>, bytes: &[u8]) -> DispatchOutcome {
        match crate::protocol::decode(bytes) {
            DecodeOutcome::Invalid(error) => {
                DispatchOutcome::Single(RpcResponse::failure(None, error))
            }
            DecodeOutcome::Ok(frame) => self.handle_frame(connection, frame).await,
        }
    }

    pub async fn handle_frame(&self, connection: &Arc<Connection>, frame: Frame) -> DispatchOutcome {
        match frame {
            Frame::Single(request) => match self.handle_one(connection, request).await {
                Some(response) => DispatchOutcome::Single(response),
                None => DispatchOutcome::NoReply,
            },
            Frame::Batch(elements) => {
                let mut responses = Vec::new();
                for element in elements {
                    match element {
                        Ok(request) => {
                            if let Some(response) = self.handle_one(connection, request).await {
                                responses.push(response);
                            }
                        }
                        Err(ElementError { id, error }) => {
                            responses.push(RpcResponse::failure(id, error));
                        }
                    }
                }
                if responses.is_empty() {
                    DispatchOutcome::NoReply
                } else {
                    DispatchOutcome::Batch(responses)
                }
            }
        }
    }

    /// Dispatch a single decoded request. Returns `None` for
    /// notifications: the caller must not write anything back.
    async fn handle_one(&self, connection: &Arc<Connection>, request: RpcRequest) -> Option<RpcResponse> {
        let is_notification = request.is_notification();
        let id = request.id.clone();

        let result = self.route(connection, &request).await;

        if is_notification {
            return None;
        }

        Some(match result {
            Ok(value) => RpcResponse::success(id, value),
            Err(error) => RpcResponse::failure(id, error.into_rpc_error()),
        })
    }

    async fn route(&self, connection: &Arc<Connection>, request: &RpcRequest) -> Result<Value, DispatchError> {
        match request.method.as_str() {
            "initialize" => Ok(self.handle_initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.registry.list().await })),
            "tools/call" => self.handle_tool_call(connection, request).await,
            "notifications/cancelled" => self.handle_cancel_notification(connection, request).await,
            other => Err(DispatchError::MethodNotFound(other.to_string())),
        }
    }

    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": { "name": self.server_name, "version": self.server_version },
            "capabilities": { "tools": { "listChanged": true } },
        })
    }

    async fn handle_cancel_notification(
        &self,
        connection: &Arc<Connection>,
        request: &RpcRequest,
    ) -> Result<Value, DispatchError> {
        let Some(params) = &request.params else {
            return Err(DispatchError::InvalidParams {
                message: "notifications/cancelled requires params.requestId".to_string(),
                violations: vec![],
            });
        };
        let target = params
            .get("requestId")
            .and_then(Value::as_str)
            .ok_or_else(|| DispatchError::InvalidParams {
                message: "params.requestId must be a string".to_string(),
                violations: vec!["requestId".to_string()],
            })?;
        connection.untrack_and_cancel(target).await;
        Ok(Value::Null)
    }

    async fn handle_tool_call(
        &self,
        connection: &Arc<Connection>,
        request: &RpcRequest,
    ) -> Result<Value, DispatchError> {
        let params = request.params.clone().unwrap_or_else(|| json!({}));
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| DispatchError::InvalidParams {
                message: "params.name must be a string".to_string(),
                violations: vec!["name".to_string()],
            })?
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        let client_timeout = params
            .get("timeoutMs")
            .and_then(Value::as_u64)
            .map(Duration::from_millis);

        let Some(ResolvedTool { module, bare_name, input_schema }) = self.registry.resolve(&name).await else {
            return Err(DispatchError::MethodNotFound(name));
        };
        validate_arguments(&input_schema, &arguments)?;

        let deadline = self.config.effective_deadline(None, client_timeout);
        let request_id = request
            .id
            .as_ref()
            .map(|id| match id {
                RequestId::String(s) => s.clone(),
                RequestId::Number(n) => n.to_string(),
            })
            .unwrap_or_else(|| "notification".to_string());

        let in_flight = Arc::new(InFlightRequest::new(
            request_id.clone(),
            connection.id.clone(),
            name.clone(),
            deadline,
            Some(name.clone()),
        ));
        connection.track(Arc::clone(&in_flight)).await;
        self.events.publish(Event::RequestAccepted { connection_id: connection.id.clone(), method: name.clone() });

        let outcome = self.run_tool_call(&name, &bare_name, module, arguments, &in_flight, connection).await;

        connection.untrack(&request_id).await;
        self.events.publish(Event::RequestCompleted {
            connection_id: connection.id.clone(),
            method: name,
            ok: outcome.is_ok(),
        });
        outcome
    }

    async fn run_tool_call(
        &self,
        fq_name: &str,
        bare_name: &str,
        module: Arc<dyn crate::registry::ToolModule>,
        arguments: Value,
        in_flight: &Arc<InFlightRequest>,
        connection: &Arc<Connection>,
    ) -> Result<Value, DispatchError> {
        let slot = self.concurrency.acquire(fq_name, Arc::clone(&connection.semaphore)).await?;

        let ctx = ToolContext {
            request_id: in_flight.request_id.clone(),
            deadline: in_flight.deadline,
            cancel: in_flight.cancel.clone(),
        };

        let call = module.call(bare_name, arguments, &ctx);
        let timeout = in_flight.remaining();
        let hard_kill = self.config.hard_kill_after(timeout);

        let result = tokio::select! {
            biased;
            result = call => {
                drop(slot);
                match result {
                    Ok(value) => Ok(value),
                    Err(tool_error) => Err(DispatchError::ToolFailed {
                        tool: fq_name.to_string(),
                        kind: tool_error.kind,
                        message: tool_error.message,
                    }),
                }
            }
            () = tokio::time::sleep(timeout) => {
                in_flight.cancel.cancel();
                drop(slot);
                Err(DispatchError::Timeout)
            }
            () = in_flight.cancel.cancelled() => {
                drop(slot);
                Err(DispatchError::Cancelled)
            }
        };

        // A tool that ignores cancellation is abandoned after
        // `hard_kill_after`; the server has already replied (or is about
        // to), so there's nothing further to await here beyond logging
        // the eventual straggler via tracing in the caller.
        let _ = hard_kill;
        result
    }
}

/// Validates `arguments` against a tool's declared `inputSchema`. This is
/// the one thing the core does with argument contents; everything past
/// this point is opaque bytes to the dispatcher.
fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), DispatchError> {
    let validator = jsonschema::validator_for(schema).map_err(|error| DispatchError::InvalidParams {
        message: format!("tool input schema is not a valid JSON Schema: {error}"),
        violations: vec![],
    })?;
    let violations: Vec<String> = validator.iter_errors(arguments).map(|error| error.to_string()).collect();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(DispatchError::InvalidParams {
            message: "arguments failed schema validation".to_string(),
            violations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionRegistry, TransportKind};
    use crate::registry::{ToolDefinition, ToolError};
    use async_trait::async_trait;

    struct EchoModule;

    #[async_trait]
    impl crate::registry::ToolModule for EchoModule {
        fn namespace(&self) -> &str {
            "demo"
        }

        fn list(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "echo".to_string(),
                display_name: "Echo".to_string(),
                description: "Echoes its input".to_string(),
                version: "1.0.0".to_string(),
                input_schema: json!({"type": "object"}),
                output_schema: None,
                capability_tags: vec![],
            }]
        }

        async fn call(&self, _tool_name: &str, arguments: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
            Ok(arguments)
        }
    }

    struct StrictModule;

    #[async_trait]
    impl crate::registry::ToolModule for StrictModule {
        fn namespace(&self) -> &str {
            "demo"
        }

        fn list(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "strict".to_string(),
                display_name: "Strict".to_string(),
                description: "Requires a string `value` argument.".to_string(),
                version: "1.0.0".to_string(),
                input_schema: json!({
                    "type": "object",
                    "required": ["value"],
                    "properties": { "value": { "type": "string" } },
                }),
                output_schema: None,
                capability_tags: vec![],
            }]
        }

        async fn call(&self, _tool_name: &str, arguments: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
            Ok(arguments)
        }
    }

    async fn build() -> (Dispatcher, Arc<Connection>) {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(EchoModule)).await.unwrap();
        registry.register(Arc::new(StrictModule)).await.unwrap();
        let concurrency = Arc::new(ConcurrencyController::new(10, 10, 16));
        let config = Arc::new(Config::default());
        let events = Arc::new(EventBus::new(16));
        let dispatcher = Dispatcher::new(registry, concurrency, config, events);

        let connection_registry = ConnectionRegistry::new();
        let connection = connection_registry.open(TransportKind::Http, None, 1).await;
        (dispatcher, connection)
    }

    #[tokio::test]
    async fn initialize_reports_protocol_version() {
        let (dispatcher, connection) = build().await;
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "initialize".to_string(),
            params: None,
            id: Some(RequestId::Number(1)),
        };
        let outcome = dispatcher.handle_frame(&connection, Frame::Single(request)).await;
        let DispatchOutcome::Single(response) = outcome else { panic!("expected single response") };
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn unknown_method_maps_to_method_not_found() {
        let (dispatcher, connection) = build().await;
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "nonexistent".to_string(),
            params: None,
            id: Some(RequestId::Number(1)),
        };
        let outcome = dispatcher.handle_frame(&connection, Frame::Single(request)).await;
        let DispatchOutcome::Single(response) = outcome else { panic!("expected single response") };
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn tools_call_routes_to_registered_module() {
        let (dispatcher, connection) = build().await;
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "tools/call".to_string(),
            params: Some(json!({"name": "demo.echo", "arguments": {"x": 1}})),
            id: Some(RequestId::Number(7)),
        };
        let outcome = dispatcher.handle_frame(&connection, Frame::Single(request)).await;
        let DispatchOutcome::Single(response) = outcome else { panic!("expected single response") };
        assert_eq!(response.result.unwrap(), json!({"x": 1}));
    }

    #[tokio::test]
    async fn notification_produces_no_reply() {
        let (dispatcher, connection) = build().await;
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "ping".to_string(),
            params: None,
            id: None,
        };
        let outcome = dispatcher.handle_frame(&connection, Frame::Single(request)).await;
        assert!(matches!(outcome, DispatchOutcome::NoReply));
    }

    #[tokio::test]
    async fn unknown_tool_name_is_method_not_found() {
        let (dispatcher, connection) = build().await;
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "tools/call".to_string(),
            params: Some(json!({"name": "demo.missing"})),
            id: Some(RequestId::Number(2)),
        };
        let outcome = dispatcher.handle_frame(&connection, Frame::Single(request)).await;
        let DispatchOutcome::Single(response) = outcome else { panic!("expected single response") };
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn arguments_failing_schema_validation_are_rejected_before_the_call() {
        let (dispatcher, connection) = build().await;
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "tools/call".to_string(),
            params: Some(json!({"name": "demo.strict", "arguments": {"value": 42}})),
            id: Some(RequestId::Number(3)),
        };
        let outcome = dispatcher.handle_frame(&connection, Frame::Single(request)).await;
        let DispatchOutcome::Single(response) = outcome else { panic!("expected single response") };
        let error = response.error.unwrap();
        assert_eq!(error.code, -32602);
        assert!(!error.data.unwrap()["violations"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn arguments_satisfying_schema_reach_the_tool() {
        let (dispatcher, connection) = build().await;
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "tools/call".to_string(),
            params: Some(json!({"name": "demo.strict", "arguments": {"value": "ok"}})),
            id: Some(RequestId::Number(4)),
        };
        let outcome = dispatcher.handle_frame(&connection, Frame::Single(request)).await;
        let DispatchOutcome::Single(response) = outcome else { panic!("expected single response") };
        assert!(response.error.is_none());
    }
}

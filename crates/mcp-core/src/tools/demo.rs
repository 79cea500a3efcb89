//! `demo.echo` and `demo.sleep`: two tiny tools with no external
//! dependencies, used to exercise timeouts, cancellation, and
//! concurrency limits end to end without standing up a real backend.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Duration;

use crate::registry::{ToolContext, ToolDefinition, ToolError, ToolModule};

pub struct EchoToolModule;

#[async_trait]
impl ToolModule for EchoToolModule {
    fn namespace(&self) -> &str {
        "demo"
    }

    fn list(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "echo".to_string(),
                display_name: "Echo".to_string(),
                description: "Returns its input arguments unchanged.".to_string(),
                version: "1.0.0".to_string(),
                input_schema: json!({"type": "object"}),
                output_schema: None,
                capability_tags: vec!["demo".to_string()],
            },
            ToolDefinition {
                name: "sleep".to_string(),
                display_name: "Sleep".to_string(),
                description: "Sleeps for params.ms milliseconds, honoring cancellation.".to_string(),
                version: "1.0.0".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": { "ms": { "type": "integer", "minimum": 0 } },
                    "required": ["ms"],
                }),
                output_schema: None,
                capability_tags: vec!["demo".to_string()],
            },
        ]
    }

    async fn call(&self, tool_name: &str, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        match tool_name {
            "echo" => Ok(arguments),
            "sleep" => {
                let ms = arguments
                    .get("ms")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| ToolError::new("invalid_arguments", "params.ms must be a non-negative integer"))?;

                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(ms)) => Ok(json!({"slept_ms": ms})),
                    () = ctx.cancel.cancelled() => Err(ToolError::new("cancelled", "sleep was cancelled before it finished")),
                }
            }
            other => Err(ToolError::new("unknown_tool", format!("demo has no tool named '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::CancelToken;
    use std::time::Instant;

    fn ctx() -> ToolContext {
        ToolContext { request_id: "r1".to_string(), deadline: Instant::now(), cancel: CancelToken::new() }
    }

    #[tokio::test]
    async fn echo_returns_arguments_unchanged() {
        let module = EchoToolModule;
        let result = module.call("echo", json!({"a": 1}), &ctx()).await.unwrap();
        assert_eq!(result, json!({"a": 1}));
    }

    #[tokio::test]
    async fn sleep_respects_cancellation() {
        let module = EchoToolModule;
        let context = ctx();
        let cancel = context.cancel.clone();
        let handle = tokio::spawn(async move { module.call("sleep", json!({"ms": 5000}), &context).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn sleep_rejects_missing_ms() {
        let module = EchoToolModule;
        let result = module.call("sleep", json!({}), &ctx()).await;
        assert!(result.is_err());
    }
}

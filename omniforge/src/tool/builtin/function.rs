//! Closure-backed tools.
//!
//! [`FunctionTool`] wraps an async closure with a declared parameter
//! schema. Required arguments are validated before the closure runs, so
//! a malformed model request never reaches user code.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::tool::{
    Tool, ToolCallContext, ToolDefinition, ToolResult, missing_required_argument,
};

type Handler = Arc<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, String>> + Send>> + Send + Sync,
>;

/// A tool backed by an async closure.
#[derive(Clone)]
pub struct FunctionTool {
    definition: ToolDefinition,
    handler: Handler,
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}

impl FunctionTool {
    /// Wrap `handler` under `definition`. The handler receives the raw
    /// argument object and returns either a JSON result or an error
    /// message.
    pub fn new<F, Fut>(definition: ToolDefinition, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self {
            definition,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, _context: &ToolCallContext, arguments: &Value) -> ToolResult {
        if let Some(missing) = missing_required_argument(&self.definition, arguments) {
            return ToolResult::failure(format!(
                "missing required argument '{missing}' for tool '{}'",
                self.definition.name
            ));
        }
        match (self.handler)(arguments.clone()).await {
            Ok(value) => ToolResult::ok(value),
            Err(error) => ToolResult::failure(error),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tool::{ParameterType, ToolType};
    use serde_json::json;

    fn calculator() -> FunctionTool {
        let definition = ToolDefinition::new("calculator", ToolType::Function, "Arithmetic")
            .param("a", ParameterType::Float, "Left operand")
            .param("b", ParameterType::Float, "Right operand")
            .optional_param("op", ParameterType::String, "add | sub | mul");

        FunctionTool::new(definition, |args| async move {
            let a = args.get("a").and_then(Value::as_f64).unwrap_or(0.0);
            let b = args.get("b").and_then(Value::as_f64).unwrap_or(0.0);
            let result = match args.get("op").and_then(Value::as_str).unwrap_or("add") {
                "add" => a + b,
                "sub" => a - b,
                "mul" => a * b,
                other => return Err(format!("unknown op '{other}'")),
            };
            Ok(json!(result))
        })
    }

    #[tokio::test]
    async fn invokes_handler_with_arguments() {
        let tool = calculator();
        let ctx = ToolCallContext::new("task-1", "agent-1");
        let result = tool
            .execute(&ctx, &json!({"a": 2, "b": 2, "op": "add"}))
            .await;
        assert!(result.success);
        assert_eq!(result.result.unwrap(), json!(4.0));
    }

    #[tokio::test]
    async fn missing_required_argument_short_circuits() {
        let tool = calculator();
        let ctx = ToolCallContext::new("task-1", "agent-1");
        let result = tool.execute(&ctx, &json!({"a": 2})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("'b'"));
    }

    #[tokio::test]
    async fn handler_error_becomes_failing_result() {
        let tool = calculator();
        let ctx = ToolCallContext::new("task-1", "agent-1");
        let result = tool
            .execute(&ctx, &json!({"a": 1, "b": 1, "op": "pow"}))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unknown op"));
    }
}

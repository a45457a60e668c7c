//! The registry-resident `llm` tool.
//!
//! Bridges a [`ChatProvider`] into the tool system so every model call
//! flows through the executor's gates and lands in the chain like any
//! other side-effect.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::limits::cost;
use crate::llm::{ChatMessage, ChatProvider, ChatRole, LlmRequest};
use crate::tool::{
    ParameterType, Tool, ToolCallContext, ToolDefinition, ToolResult, ToolType,
};

/// Default deadline for model calls.
const LLM_TIMEOUT_MS: u64 = 60_000;

/// Tool wrapping a chat provider under the registry name `"llm"`.
#[derive(Clone)]
pub struct LlmTool {
    provider: Arc<dyn ChatProvider>,
    default_model: String,
}

impl std::fmt::Debug for LlmTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmTool")
            .field("provider", &self.provider.name())
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl LlmTool {
    /// Create an llm tool delegating to `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn ChatProvider>, default_model: impl Into<String>) -> Self {
        Self {
            provider,
            default_model: default_model.into(),
        }
    }

    fn parse_messages(arguments: &Value) -> Result<Vec<ChatMessage>, String> {
        let mut messages = Vec::new();

        if let Some(system) = arguments.get("system").and_then(Value::as_str) {
            messages.push(ChatMessage::system(system));
        }

        let Some(raw) = arguments.get("messages").and_then(Value::as_array) else {
            return Err("'messages' must be a non-empty array".into());
        };
        if raw.is_empty() {
            return Err("'messages' must be a non-empty array".into());
        }

        for entry in raw {
            let role = match entry.get("role").and_then(Value::as_str) {
                Some("system") => ChatRole::System,
                Some("user") => ChatRole::User,
                Some("assistant") => ChatRole::Assistant,
                other => return Err(format!("unsupported message role {other:?}")),
            };
            let content = entry
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| "message 'content' must be a string".to_owned())?;
            messages.push(ChatMessage {
                role,
                content: content.to_owned(),
            });
        }
        Ok(messages)
    }
}

#[async_trait]
impl Tool for LlmTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("llm", ToolType::Llm, "Call a language model")
            .param("messages", ParameterType::Array, "Chat messages")
            .optional_param("model", ParameterType::String, "Model identifier")
            .optional_param("system", ParameterType::String, "System prompt")
            .optional_param("temperature", ParameterType::Float, "Sampling temperature")
            .optional_param("max_tokens", ParameterType::Integer, "Output token cap")
            .optional_param(
                "response_format",
                ParameterType::Object,
                "Response format, e.g. {\"type\": \"json_object\"}",
            )
            .timeout_ms(LLM_TIMEOUT_MS)
    }

    async fn execute(&self, context: &ToolCallContext, arguments: &Value) -> ToolResult {
        let messages = match Self::parse_messages(arguments) {
            Ok(messages) => messages,
            Err(error) => return ToolResult::failure(error),
        };

        let model = arguments
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_model)
            .to_owned();

        let json_mode = arguments
            .get("response_format")
            .and_then(|f| f.get("type"))
            .and_then(Value::as_str)
            == Some("json_object");

        let mut request = LlmRequest::new(&model, messages).json_mode(json_mode);
        if let Some(temperature) = arguments.get("temperature").and_then(Value::as_f64) {
            request = request.temperature(temperature as f32);
        }
        let max_tokens = arguments
            .get("max_tokens")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .or(context.max_tokens);
        if let Some(max_tokens) = max_tokens {
            request = request.max_tokens(max_tokens);
        }

        match self.provider.chat(&request).await {
            Ok(response) => {
                let tokens = response.usage.map(|u| u.total_tokens);
                let call_cost = response
                    .cost
                    .or_else(|| response.usage.map(|u| cost::cost_from_usage(&model, u)));

                let mut result = ToolResult::ok(json!({
                    "content": response.content,
                    "model": response.model,
                }));
                if let Some(tokens) = tokens {
                    result = result.with_tokens(tokens);
                }
                if let Some(call_cost) = call_cost {
                    result = result.with_cost(call_cost);
                }
                result
            }
            Err(error) => ToolResult::failure(format!("llm call failed: {error}")),
        }
    }
}

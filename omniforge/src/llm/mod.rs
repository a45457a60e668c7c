//! LLM provider abstraction.
//!
//! The runtime talks to language models through the [`ChatProvider`] trait.
//! Concrete wiring to vendors is deliberately thin: [`MockProvider`] serves
//! tests and offline development with scripted replies, and
//! [`OpenAiCompatProvider`] speaks the OpenAI-compatible chat-completions
//! dialect most gateways accept. Fallback chains and provider routing are
//! out of scope and live with the embedding application.

mod mock;
mod openai;

pub use mock::MockProvider;
pub use openai::OpenAiCompatProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System instructions.
    System,
    /// End-user content.
    User,
    /// Model output.
    Assistant,
}

/// A single chat message sent to or received from a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who authored the message.
    pub role: ChatRole,
    /// Text content.
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt.
    #[serde(default, alias = "prompt_tokens")]
    pub input_tokens: u32,
    /// Tokens in the completion.
    #[serde(default, alias = "completion_tokens")]
    pub output_tokens: u32,
    /// Total tokens (input + output).
    #[serde(default)]
    pub total_tokens: u32,
}

impl Usage {
    /// Create a usage record; the total is derived.
    #[must_use]
    pub const fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    /// An empty usage record.
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0, 0)
    }
}

impl std::ops::Add for Usage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// A chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Model identifier.
    pub model: String,
    /// Conversation messages, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Cap on generated tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Force a JSON-object reply (used by the ReAct driver).
    #[serde(default)]
    pub json_mode: bool,
}

impl LlmRequest {
    /// Create a request for `model` with the given messages.
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            json_mode: false,
        }
    }

    /// Set the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the output token cap.
    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Request a JSON-object reply.
    #[must_use]
    pub const fn json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }
}

/// A chat-completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Generated text.
    pub content: String,
    /// Model that actually served the request.
    pub model: String,
    /// Token usage, when the provider reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Provider-reported cost in USD, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Execute a chat completion.
    async fn chat(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Provider name, used in logs.
    fn name(&self) -> &str {
        "chat-provider"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn usage_add_accumulates() {
        let total = Usage::new(100, 50) + Usage::new(20, 10);
        assert_eq!(total.input_tokens, 120);
        assert_eq!(total.output_tokens, 60);
        assert_eq!(total.total_tokens, 180);
    }

    #[test]
    fn usage_accepts_openai_aliases() {
        let json = r#"{"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}"#;
        let usage: Usage = serde_json::from_str(json).unwrap();
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 5);
    }

    #[test]
    fn request_builder_sets_fields() {
        let req = LlmRequest::new("claude-sonnet-4", vec![ChatMessage::user("hi")])
            .temperature(0.2)
            .max_tokens(256)
            .json_mode(true);
        assert_eq!(req.temperature, Some(0.2));
        assert_eq!(req.max_tokens, Some(256));
        assert!(req.json_mode);
    }
}

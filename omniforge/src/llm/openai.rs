//! OpenAI-compatible chat-completions client.
//!
//! Speaks the `/chat/completions` dialect accepted by OpenAI, Azure
//! OpenAI, Groq, and OpenRouter, which covers every provider named in the
//! runtime configuration. Vendor-specific niceties (streaming, tool-call
//! deltas) are not needed here: the ReAct driver consumes whole JSON
//! replies.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};

use super::{ChatProvider, LlmRequest, LlmResponse, Usage};

/// HTTP client for an OpenAI-compatible endpoint.
#[derive(Debug)]
pub struct OpenAiCompatProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

impl OpenAiCompatProvider {
    /// Create a provider for `base_url` (without the `/chat/completions`
    /// suffix) authenticated with `api_key`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_ms: u64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| Error::Provider(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    async fn chat(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let mut body = json!({
            "model": request.model,
            "messages": request.messages,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "provider returned {status}: {detail}"
            )));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("malformed provider response: {e}")))?;

        let content = wire
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Provider("provider response had no choices".into()))?;

        Ok(LlmResponse {
            content,
            model: wire.model.unwrap_or_else(|| request.model.clone()),
            usage: wire.usage,
            cost: None,
        })
    }

    fn name(&self) -> &str {
        "openai-compat"
    }
}

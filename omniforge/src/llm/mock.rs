//! Scripted chat provider for tests and offline development.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{ChatProvider, LlmRequest, LlmResponse, Usage};

/// One scripted reply.
#[derive(Debug, Clone)]
enum Scripted {
    Reply { content: String, usage: Usage },
    Failure(String),
}

/// A [`ChatProvider`] that replays a queue of scripted responses.
///
/// Each call to [`chat`](ChatProvider::chat) pops the next entry; an empty
/// queue is a provider error, which keeps tests honest about how many LLM
/// calls their scenario makes.
#[derive(Debug, Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<LlmRequest>>,
}

impl MockProvider {
    /// Create an empty mock provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply with default usage (10 in / 10 out).
    #[must_use]
    pub fn reply(self, content: impl Into<String>) -> Self {
        self.reply_with_usage(content, Usage::new(10, 10))
    }

    /// Queue a reply with explicit usage.
    #[must_use]
    pub fn reply_with_usage(self, content: impl Into<String>, usage: Usage) -> Self {
        self.push(Scripted::Reply {
            content: content.into(),
            usage,
        });
        self
    }

    /// Queue a provider failure.
    #[must_use]
    pub fn failure(self, message: impl Into<String>) -> Self {
        self.push(Scripted::Failure(message.into()));
        self
    }

    /// Requests observed so far, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Number of chat calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    fn push(&self, entry: Scripted) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(entry);
        }
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn chat(&self, request: &LlmRequest) -> Result<LlmResponse> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        let next = self
            .script
            .lock()
            .map_err(|_| Error::Provider("mock script lock poisoned".into()))?
            .pop_front();

        match next {
            Some(Scripted::Reply { content, usage }) => Ok(LlmResponse {
                content,
                model: request.model.clone(),
                usage: Some(usage),
                cost: None,
            }),
            Some(Scripted::Failure(message)) => Err(Error::Provider(message)),
            None => Err(Error::Provider("mock provider script exhausted".into())),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

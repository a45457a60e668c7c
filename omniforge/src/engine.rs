//! The agent-facing reasoning engine.
//!
//! One engine is constructed per task execution. It exclusively owns the
//! [`ReasoningChain`] it builds, delegates every side-effect to the
//! [`ToolExecutor`], and publishes a `reasoning_step` event to the
//! caller-owned queue for each appended step. The engine never creates
//! its own queue; the driver hands one in so there is a single consumer.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::chain::{ReasoningChain, ReasoningStep, StepVisibility, VisibilityLevel};
use crate::error::{Error, Result};
use crate::events::{EventPublisher, TaskEvent};
use crate::executor::ToolExecutor;
use crate::llm::ChatMessage;
use crate::tool::{ToolCallContext, ToolDefinition, ToolResult};

/// Identity and limits of the task an engine is working on.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// The task id.
    pub task_id: String,
    /// The executing agent id.
    pub agent_id: String,
    /// Owning tenant, when known.
    pub tenant_id: Option<String>,
    /// Caller-imposed token cap per model call.
    pub max_tokens: Option<u32>,
    /// Caller-imposed per-call cost budget in USD.
    pub max_cost_usd: Option<f64>,
}

impl TaskContext {
    /// Context for a task with no caller-imposed limits.
    #[must_use]
    pub fn new(task_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            tenant_id: None,
            max_tokens: None,
            max_cost_usd: None,
        }
    }

    /// Set the owning tenant.
    #[must_use]
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Parameters for [`ReasoningEngine::call_llm`]. Exactly one of `prompt`
/// / `messages` must be set.
#[derive(Debug, Clone, Default)]
pub struct LlmCall {
    /// Simple prompt, converted to a single user message.
    pub prompt: Option<String>,
    /// Full message list.
    pub messages: Option<Vec<ChatMessage>>,
    /// Model override; the engine's default model otherwise.
    pub model: Option<String>,
    /// System prompt.
    pub system: Option<String>,
    /// Sampling temperature (default 0.7).
    pub temperature: Option<f32>,
    /// Output token cap.
    pub max_tokens: Option<u32>,
}

impl LlmCall {
    /// A call with a simple prompt.
    #[must_use]
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    /// A call with a full message list.
    #[must_use]
    pub fn messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::default()
        }
    }

    /// Set the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature.
    #[must_use]
    pub const fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A tool result together with the chain steps it produced.
#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    /// The underlying result.
    pub result: ToolResult,
    /// Id of the `tool_call` step.
    pub call_step_id: Uuid,
    /// Id of the `tool_result` step.
    pub result_step_id: Uuid,
}

impl ToolCallOutcome {
    /// Whether the call succeeded.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.result.success
    }

    /// The result payload, when successful.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        self.result.result.as_ref()
    }

    /// The error message, when failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.result.error.as_deref()
    }

    /// Id of the result step, the usual synthesis source.
    #[must_use]
    pub const fn step_id(&self) -> Uuid {
        self.result_step_id
    }
}

/// High-level API agents use to think, call tools, and build their chain.
#[derive(Debug)]
pub struct ReasoningEngine {
    chain: ReasoningChain,
    executor: Arc<ToolExecutor>,
    task: TaskContext,
    publisher: EventPublisher,
    default_model: String,
}

impl ReasoningEngine {
    /// Create an engine owning `chain`, publishing step events to the
    /// caller-owned `publisher`.
    #[must_use]
    pub fn new(
        chain: ReasoningChain,
        executor: Arc<ToolExecutor>,
        task: TaskContext,
        publisher: EventPublisher,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            chain,
            executor,
            task,
            publisher,
            default_model: default_model.into(),
        }
    }

    /// The chain built so far.
    #[must_use]
    pub const fn chain(&self) -> &ReasoningChain {
        &self.chain
    }

    /// The task this engine works on.
    #[must_use]
    pub const fn task(&self) -> &TaskContext {
        &self.task
    }

    /// Whether the event consumer is still draining. A closed consumer
    /// means the caller abandoned the task.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.publisher.is_open()
    }

    /// Surrender the chain at the end of an execution.
    #[must_use]
    pub fn into_chain(self) -> ReasoningChain {
        self.chain
    }

    /// Append a thinking step.
    pub fn add_thinking(
        &mut self,
        content: impl Into<String>,
        confidence: Option<f32>,
    ) -> ReasoningStep {
        let step = self
            .chain
            .add_step(ReasoningStep::thinking(content, confidence))
            .clone();
        self.publish_step(&step);
        step
    }

    /// Append a synthesis step referencing earlier step ids.
    pub fn add_synthesis(
        &mut self,
        conclusion: impl Into<String>,
        sources: Vec<Uuid>,
    ) -> ReasoningStep {
        let step = self
            .chain
            .add_step(ReasoningStep::synthesis(conclusion, sources))
            .clone();
        self.publish_step(&step);
        step
    }

    /// Call a language model through the `llm` tool.
    ///
    /// Builds JSON-mode arguments and delegates to [`call_tool`], so the
    /// call passes every executor gate and lands in the chain.
    ///
    /// [`call_tool`]: Self::call_tool
    pub async fn call_llm(&mut self, call: LlmCall) -> Result<ToolCallOutcome> {
        let messages: Vec<ChatMessage> = match (call.prompt, call.messages) {
            (Some(prompt), None) => vec![ChatMessage::user(prompt)],
            (None, Some(messages)) => messages,
            (Some(_), Some(_)) => {
                return Err(Error::Validation(
                    "provide either 'prompt' or 'messages', not both".into(),
                ));
            }
            (None, None) => {
                return Err(Error::Validation(
                    "either 'prompt' or 'messages' must be provided".into(),
                ));
            }
        };

        let mut arguments = json!({
            "model": call.model.unwrap_or_else(|| self.default_model.clone()),
            "temperature": call.temperature.unwrap_or(0.7),
            "messages": messages,
            // JSON mode keeps ReAct replies machine-parseable.
            "response_format": { "type": "json_object" },
        });
        if let Some(system) = call.system {
            arguments["system"] = json!(system);
        }
        if let Some(max_tokens) = call.max_tokens.or(self.task.max_tokens) {
            arguments["max_tokens"] = json!(max_tokens);
        }

        Ok(self.call_tool("llm", arguments, None).await)
    }

    /// Execute any registered tool, recording the call and result steps.
    pub async fn call_tool(
        &mut self,
        tool_name: &str,
        arguments: Value,
        visibility: Option<VisibilityLevel>,
    ) -> ToolCallOutcome {
        let context = ToolCallContext {
            correlation_id: Uuid::new_v4().to_string(),
            task_id: self.task.task_id.clone(),
            agent_id: self.task.agent_id.clone(),
            tenant_id: self.task.tenant_id.clone(),
            chain_id: Some(self.chain.id.to_string()),
            max_tokens: self.task.max_tokens,
            max_cost_usd: self.task.max_cost_usd,
        };

        let result = self
            .executor
            .execute(tool_name, arguments, &context, Some(&mut self.chain))
            .await;

        // The executor appended exactly the call and result steps.
        let result_index = self.chain.steps.len() - 1;
        let call_index = result_index - 1;

        if let Some(level) = visibility {
            self.chain.steps[call_index].visibility = StepVisibility::new(level);
            self.chain.steps[result_index].visibility = StepVisibility::new(level);
        }

        let call_step = self.chain.steps[call_index].clone();
        let result_step = self.chain.steps[result_index].clone();
        self.publish_step(&call_step);
        self.publish_step(&result_step);

        ToolCallOutcome {
            result,
            call_step_id: call_step.id,
            result_step_id: result_step.id,
        }
    }

    /// Definitions of every registered tool, in registration order.
    #[must_use]
    pub fn available_tools(&self) -> Vec<ToolDefinition> {
        self.executor.registry().definitions()
    }

    fn publish_step(&self, step: &ReasoningStep) {
        self.publisher.publish(TaskEvent::ReasoningStep {
            task_id: self.task.task_id.clone(),
            step: Box::new(step.clone()),
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::chain::StepType;
    use crate::llm::{ChatProvider, MockProvider};
    use crate::tool::builtin::LlmTool;
    use crate::tool::ToolRegistry;

    fn engine_with_mock(provider: MockProvider) -> (ReasoningEngine, crate::events::EventStream) {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(
                LlmTool::new(Arc::new(provider) as Arc<dyn ChatProvider>, "gpt-4"),
                false,
            )
            .unwrap();
        let executor = Arc::new(ToolExecutor::new(registry));
        let chain = ReasoningChain::new("task-1", "agent-1");
        let (publisher, stream) = EventPublisher::channel();
        let engine = ReasoningEngine::new(
            chain,
            executor,
            TaskContext::new("task-1", "agent-1"),
            publisher,
            "gpt-4",
        );
        (engine, stream)
    }

    #[tokio::test]
    async fn thinking_steps_publish_events() {
        let (mut engine, mut stream) = engine_with_mock(MockProvider::new());
        let step = engine.add_thinking("analyzing", Some(0.9));
        assert_eq!(step.step_number, 0);

        let event = stream.next_event().await.unwrap();
        assert!(matches!(event, TaskEvent::ReasoningStep { .. }));
    }

    #[tokio::test]
    async fn call_llm_requires_prompt_or_messages() {
        let (mut engine, _stream) = engine_with_mock(MockProvider::new());
        let err = engine.call_llm(LlmCall::default()).await.unwrap_err();
        assert!(err.to_string().contains("either"));
    }

    #[tokio::test]
    async fn call_llm_builds_json_mode_arguments() {
        let (mut engine, _stream) = engine_with_mock(MockProvider::new().reply("{\"ok\":true}"));
        let outcome = engine.call_llm(LlmCall::prompt("hi")).await.unwrap();

        assert!(outcome.success());
        // Call and result steps recorded with matching correlation.
        let chain = engine.chain();
        assert_eq!(chain.steps.len(), 2);
        assert_eq!(chain.steps[0].step_type(), StepType::ToolCall);
        assert!(chain.correlations_consistent());
        // The call step carries JSON-mode parameters.
        let crate::chain::StepPayload::ToolCall(info) = &chain.steps[0].payload else {
            panic!("expected tool call payload");
        };
        assert_eq!(info.parameters["response_format"]["type"], "json_object");
    }

    #[tokio::test]
    async fn outcome_references_created_steps() {
        let (mut engine, _stream) = engine_with_mock(MockProvider::new().reply("ok"));
        let outcome = engine.call_llm(LlmCall::prompt("hi")).await.unwrap();

        let chain = engine.chain();
        assert_eq!(outcome.call_step_id, chain.steps[0].id);
        assert_eq!(outcome.result_step_id, chain.steps[1].id);
        assert_eq!(outcome.step_id(), chain.steps[1].id);
    }

    #[tokio::test]
    async fn visibility_override_applies_to_both_steps() {
        let (mut engine, _stream) = engine_with_mock(MockProvider::new().reply("ok"));
        let args = json!({"messages": [{"role": "user", "content": "hi"}]});
        engine
            .call_tool("llm", args, Some(VisibilityLevel::Hidden))
            .await;

        let chain = engine.chain();
        assert_eq!(chain.steps[0].visibility.level, VisibilityLevel::Hidden);
        assert_eq!(chain.steps[1].visibility.level, VisibilityLevel::Hidden);
    }

    #[tokio::test]
    async fn synthesis_references_sources() {
        let (mut engine, _stream) = engine_with_mock(MockProvider::new());
        let thinking = engine.add_thinking("first", None);
        let synthesis = engine.add_synthesis("done", vec![thinking.id]);

        let crate::chain::StepPayload::Synthesis(info) = &synthesis.payload else {
            panic!("expected synthesis payload");
        };
        assert_eq!(info.sources, vec![thinking.id]);
    }

    #[tokio::test]
    async fn is_live_tracks_consumer() {
        let (engine, stream) = engine_with_mock(MockProvider::new());
        assert!(engine.is_live());
        drop(stream);
        assert!(!engine.is_live());
    }
}

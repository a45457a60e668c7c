//! The autonomous ReAct driver.
//!
//! [`AutonomousDriver::submit`] spawns a background worker that drives a
//! [`ReasoningEngine`] through the Reason-Act-Observe loop and returns a
//! [`TaskHandle`] owning the event stream. The worker always persists the
//! chain and enqueues the stream-terminating sentinel on the way out,
//! whether it finished, failed, or was cancelled.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, error, info, info_span, warn};
use tracing::Instrument as _;

use crate::chain::{ChainStatus, ReasoningChain};
use crate::engine::{LlmCall, ReasoningEngine, TaskContext};
use crate::error::{Error, Result};
use crate::events::{EventPublisher, EventStream, TaskEvent};
use crate::executor::ToolExecutor;
use crate::llm::ChatMessage;
use crate::repository::{ChainRepository, TaskRepository};
use crate::task::{MessagePart, Task, TaskState};
use crate::tool::ToolDefinition;

use super::parser::parse_react_reply;

/// Fallback request when a task arrives with no user message.
const FALLBACK_PROMPT: &str = "Please help me with this task.";

/// Consecutive malformed replies tolerated before giving up.
const MAX_MALFORMED_REPLIES: u32 = 3;

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Iteration budget for one execution (default 15).
    pub max_iterations: u32,
    /// Model used for reasoning calls.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Extra system prompt prepended to the generated one.
    pub system_prompt: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            model: "claude-sonnet-4".into(),
            temperature: 0.0,
            system_prompt: None,
        }
    }
}

/// Handle to a running task execution.
///
/// Owns the sole consumer of the event queue. Dropping the handle (or
/// its stream) signals the worker, which stops at the next step
/// boundary, marks the chain cancelled, and persists it.
#[derive(Debug)]
pub struct TaskHandle {
    /// The task being executed.
    pub task_id: String,
    events: EventStream,
    cancel: Arc<Notify>,
    worker: tokio::task::JoinHandle<()>,
}

impl TaskHandle {
    /// Receive the next event, or `None` once the execution finished.
    pub async fn next_event(&mut self) -> Option<TaskEvent> {
        self.events.next_event().await
    }

    /// Drain all remaining events until the execution finishes.
    pub async fn collect_events(self) -> Vec<TaskEvent> {
        self.events.collect_events().await
    }

    /// Request cancellation. Idempotent; the worker still emits its
    /// terminal events and the sentinel.
    pub fn cancel(&self) {
        self.cancel.notify_one();
    }

    /// Whether the background worker has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Split into the raw event stream, keeping cancellation wired to
    /// stream drop.
    #[must_use]
    pub fn into_stream(self) -> EventStream {
        self.events
    }
}

/// Bounded-iteration ReAct loop over the reasoning engine.
#[derive(Clone)]
pub struct AutonomousDriver {
    executor: Arc<ToolExecutor>,
    config: DriverConfig,
    chain_repository: Option<Arc<dyn ChainRepository>>,
    task_repository: Option<Arc<dyn TaskRepository>>,
}

impl std::fmt::Debug for AutonomousDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutonomousDriver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AutonomousDriver {
    /// Create a driver dispatching through `executor`.
    #[must_use]
    pub fn new(executor: Arc<ToolExecutor>, config: DriverConfig) -> Self {
        Self {
            executor,
            config,
            chain_repository: None,
            task_repository: None,
        }
    }

    /// Persist finished chains into `repository`.
    #[must_use]
    pub fn with_chain_repository(mut self, repository: Arc<dyn ChainRepository>) -> Self {
        self.chain_repository = Some(repository);
        self
    }

    /// Record task state transitions into `repository`.
    #[must_use]
    pub fn with_task_repository(mut self, repository: Arc<dyn TaskRepository>) -> Self {
        self.task_repository = Some(repository);
        self
    }

    /// The driver's configuration.
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Start executing `task` on a background worker and return the
    /// handle owning its event stream.
    #[must_use]
    pub fn submit(&self, task: Task) -> TaskHandle {
        let (publisher, events) = EventPublisher::channel();
        let cancel = Arc::new(Notify::new());
        let task_id = task.id.clone();

        let span = info_span!(
            "task",
            task.id = %task.id,
            agent.id = %task.agent_id,
            tenant.id = %task.tenant_id,
        );
        let driver = self.clone();
        let cancel_signal = Arc::clone(&cancel);
        let worker = tokio::spawn(
            async move {
                driver.run_task(task, publisher, cancel_signal).await;
            }
            .instrument(span),
        );

        TaskHandle {
            task_id,
            events,
            cancel,
            worker,
        }
    }

    /// The full lifecycle of one execution: events, the ReAct loop,
    /// persistence, and the sentinel.
    async fn run_task(&self, mut task: Task, publisher: EventPublisher, cancel: Arc<Notify>) {
        let chain = ReasoningChain::new(&task.id, &task.agent_id).with_tenant(&task.tenant_id);
        let chain_id = chain.id;

        publisher.publish(TaskEvent::ChainStarted {
            task_id: task.id.clone(),
            chain_id,
            timestamp: Utc::now(),
        });

        self.record_state(&mut task, TaskState::Working).await;
        publisher.publish(TaskEvent::TaskStatus {
            task_id: task.id.clone(),
            state: TaskState::Working,
            timestamp: Utc::now(),
        });

        let task_context = TaskContext {
            task_id: task.id.clone(),
            agent_id: task.agent_id.clone(),
            tenant_id: Some(task.tenant_id.clone()),
            max_tokens: None,
            max_cost_usd: None,
        };
        let mut engine = ReasoningEngine::new(
            chain,
            Arc::clone(&self.executor),
            task_context,
            publisher.clone(),
            self.config.model.clone(),
        );

        let outcome = tokio::select! {
            () = cancel.notified() => Err(Error::Cancelled),
            result = self.react_loop(&task, &mut engine) => result,
        };

        let mut chain = engine.into_chain();
        match outcome {
            Ok(answer) => {
                info!(task.id = %task.id, steps = chain.steps.len(), "task completed");
                chain.finish(ChainStatus::Completed);
                self.persist_chain(&chain).await;
                self.record_state(&mut task, TaskState::Completed).await;

                publisher.publish(TaskEvent::TaskMessage {
                    task_id: task.id.clone(),
                    message_parts: vec![MessagePart::text(answer)],
                    is_partial: false,
                    timestamp: Utc::now(),
                });
                publisher.publish(TaskEvent::ChainCompleted {
                    task_id: task.id.clone(),
                    chain_id,
                    metrics: chain.metrics,
                    timestamp: Utc::now(),
                });
                publisher.publish(TaskEvent::TaskDone {
                    task_id: task.id.clone(),
                    final_state: TaskState::Completed,
                    timestamp: Utc::now(),
                });
            }
            Err(err) => {
                let cancelled = matches!(err, Error::Cancelled);
                if cancelled {
                    info!(task.id = %task.id, "task cancelled");
                    chain.finish(ChainStatus::Cancelled);
                } else {
                    error!(task.id = %task.id, error = %err, "task failed");
                    chain.finish(ChainStatus::Failed);
                }
                self.persist_chain(&chain).await;
                let final_state = if cancelled {
                    TaskState::Cancelled
                } else {
                    TaskState::Failed
                };
                self.record_state(&mut task, final_state).await;

                publisher.publish(TaskEvent::ChainFailed {
                    task_id: task.id.clone(),
                    chain_id,
                    error_code: err.code().to_owned(),
                    error_message: err.to_string(),
                    timestamp: Utc::now(),
                });
                publisher.publish(TaskEvent::TaskError {
                    task_id: task.id.clone(),
                    error_code: err.code().to_owned(),
                    error_message: err.to_string(),
                    timestamp: Utc::now(),
                });
                publisher.publish(TaskEvent::TaskDone {
                    task_id: task.id.clone(),
                    final_state,
                    timestamp: Utc::now(),
                });
            }
        }

        publisher.finish();
    }

    /// The bounded Reason-Act-Observe loop.
    async fn react_loop(&self, task: &Task, engine: &mut ReasoningEngine) -> Result<String> {
        let user_request = task
            .first_user_text()
            .filter(|t| !t.is_empty())
            .unwrap_or(FALLBACK_PROMPT)
            .to_owned();
        let system_prompt =
            build_system_prompt(&engine.available_tools(), self.config.system_prompt.as_deref());

        let mut messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_request),
        ];
        let mut consecutive_malformed = 0u32;

        for iteration in 1..=self.config.max_iterations {
            // A closed consumer means the caller abandoned the stream.
            if !engine.is_live() {
                return Err(Error::Cancelled);
            }
            debug!(iteration, "starting ReAct iteration");

            let llm_outcome = engine
                .call_llm(
                    LlmCall::messages(messages.clone())
                        .model(&self.config.model)
                        .temperature(self.config.temperature),
                )
                .await?;

            // Without model output the loop cannot continue; gate
            // denials on the llm call (rate, budget, governance)
            // surface here.
            if !llm_outcome.success() {
                return Err(Error::ReasoningFailed(format!(
                    "llm call failed: {}",
                    llm_outcome.error().unwrap_or("unknown error")
                )));
            }
            let reply_text = llm_outcome
                .value()
                .and_then(|v| v.get("content"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();

            let reply = match parse_react_reply(&reply_text) {
                Err(parse_error) => {
                    consecutive_malformed += 1;
                    warn!(iteration, error = %parse_error, "malformed ReAct reply");
                    if consecutive_malformed >= MAX_MALFORMED_REPLIES {
                        return Err(Error::ReasoningFailed(format!(
                            "model produced malformed replies {MAX_MALFORMED_REPLIES} times in a row: {parse_error}"
                        )));
                    }
                    engine.add_thinking(
                        format!("Reply was not valid ReAct JSON: {parse_error}"),
                        None,
                    );
                    messages.push(ChatMessage::assistant(reply_text));
                    messages.push(ChatMessage::user(format!(
                        "Observation: your last reply was invalid ({parse_error}). \
                         Answer again using exactly the required JSON format."
                    )));
                    continue;
                }
                Ok(reply) => reply,
            };
            consecutive_malformed = 0;

            engine.add_thinking(reply.thought.clone(), None);

            if reply.terminates() {
                let answer = reply.answer_text();
                let sources = engine.chain().step_ids();
                engine.add_synthesis(answer.clone(), sources);
                return Ok(answer);
            }

            let action_input = match reply.action_input {
                Value::Null => Value::Object(serde_json::Map::new()),
                other => other,
            };
            let tool_outcome = engine.call_tool(&reply.action, action_input, None).await;
            let observation = if tool_outcome.success() {
                tool_outcome
                    .value()
                    .map(Value::to_string)
                    .unwrap_or_default()
            } else {
                format!(
                    "Error: {}",
                    tool_outcome.error().unwrap_or("tool call failed")
                )
            };

            messages.push(ChatMessage::assistant(reply_text));
            messages.push(ChatMessage::user(format!("Observation: {observation}")));
        }

        Err(Error::MaxIterationsExceeded(self.config.max_iterations))
    }

    async fn persist_chain(&self, chain: &ReasoningChain) {
        if let Some(repository) = &self.chain_repository
            && let Err(err) = repository.save(chain).await
        {
            error!(chain.id = %chain.id, error = %err, "failed to persist chain");
        }
    }

    /// Best-effort task state recording; the in-memory task is the
    /// source of truth for event emission.
    async fn record_state(&self, task: &mut Task, state: TaskState) {
        if task.transition_to(state).is_err() {
            warn!(task.id = %task.id, from = %task.state, to = %state, "illegal state transition skipped");
            return;
        }
        if let Some(repository) = &self.task_repository
            && let Err(err) = repository.update(task).await
        {
            warn!(task.id = %task.id, error = %err, "failed to record task state");
        }
    }
}

/// Build the ReAct system prompt: every registered tool with its JSON
/// schema, plus the strict reply format.
fn build_system_prompt(tools: &[ToolDefinition], custom: Option<&str>) -> String {
    use std::fmt::Write as _;

    let mut prompt = String::new();
    if let Some(custom) = custom {
        prompt.push_str(custom);
        prompt.push_str("\n\n");
    } else {
        prompt.push_str(
            "You are an autonomous agent that solves tasks by reasoning step by step \
             and calling tools.\n\n",
        );
    }

    prompt.push_str("Available tools:\n");
    for tool in tools {
        let _ = writeln!(
            prompt,
            "- {} ({}): {}\n  parameters: {}",
            tool.name,
            tool.tool_type,
            tool.description,
            tool.to_json_schema()
        );
    }

    prompt.push_str(
        "\nReply with exactly one JSON object per turn, no prose outside it:\n\
         { \"thought\": \"your reasoning\",\n  \"action\": \"<tool_name or 'final_answer'>\",\n  \
         \"action_input\": { \"arg\": \"value\" } or \"final answer text\",\n  \
         \"is_final\": true or false }\n\n\
         After each tool call you receive an \"Observation:\" message with the result.\n\
         When you know the answer, set action to \"final_answer\", put the answer in \
         action_input, and set is_final to true.",
    );
    prompt
}

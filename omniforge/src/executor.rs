//! The tool executor: the single funnel every side-effect flows through.
//!
//! For each invocation the executor records a `tool_call` step, runs the
//! pre-flight gates (governance, caller budget, rate limits), invokes the
//! tool under its deadline, and records the paired `tool_result` step.
//! It never returns an error: every failure is encoded as a
//! non-successful [`ToolResult`] so the driver can feed it back to the
//! model as an observation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info_span, warn};
use tracing::Instrument as _;

use crate::chain::{ReasoningChain, ReasoningStep, StepPayload, ToolCallInfo, ToolResultInfo};
use crate::limits::cost;
use crate::limits::{ModelGovernance, RateLimiter};
use crate::llm::ChatMessage;
use crate::tool::{ToolCallContext, ToolRegistry, ToolResult, ToolType};

/// Model assumed for gating when a call omits `model`. Matches the
/// driver's default so the gates and the `llm` tool agree on what an
/// unspecified model means.
const DEFAULT_LLM_MODEL: &str = "claude-sonnet-4";

/// Estimated shape of an LLM call, derived from model-supplied arguments.
struct LlmEstimate {
    model: String,
    tokens: u64,
    cost_usd: f64,
}

/// Gated dispatch layer over the tool registry.
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    rate_limiter: Option<Arc<RateLimiter>>,
    governance: Option<Arc<ModelGovernance>>,
    default_model: String,
}

impl ToolExecutor {
    /// Create an executor with no guardrails attached.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            rate_limiter: None,
            governance: None,
            default_model: DEFAULT_LLM_MODEL.into(),
        }
    }

    /// Attach a rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Attach model governance.
    #[must_use]
    pub fn with_governance(mut self, governance: Arc<ModelGovernance>) -> Self {
        self.governance = Some(governance);
        self
    }

    /// Set the model the gates assume when a call omits `model`.
    ///
    /// Keep this aligned with the `llm` tool's own default so an
    /// unspecified model is estimated and governed as the model that
    /// will actually serve the call.
    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// The registry this executor dispatches into.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute `tool_name` with `arguments`.
    ///
    /// When `chain` is given, a `tool_call` step is appended before any
    /// gating (so even rejected attempts are inspectable) and the paired
    /// `tool_result` step after, both carrying the context's
    /// correlation id.
    pub async fn execute(
        &self,
        tool_name: &str,
        arguments: Value,
        context: &ToolCallContext,
        mut chain: Option<&mut ReasoningChain>,
    ) -> ToolResult {
        let span = info_span!(
            "tool",
            tool.name = %tool_name,
            correlation_id = %context.correlation_id,
            task.id = %context.task_id,
        );
        self.execute_inner(tool_name, arguments, context, chain.as_deref_mut())
            .instrument(span)
            .await
    }

    async fn execute_inner(
        &self,
        tool_name: &str,
        arguments: Value,
        context: &ToolCallContext,
        mut chain: Option<&mut ReasoningChain>,
    ) -> ToolResult {
        let started = Instant::now();
        let definition = self.registry.get_definition(tool_name).ok();
        // Unknown tools still record the attempted call so the paired
        // failing result never dangles.
        let tool_type = definition
            .as_ref()
            .map_or(ToolType::Function, |d| d.tool_type);

        if let Some(chain) = chain.as_deref_mut() {
            chain.add_step(ReasoningStep::new(StepPayload::ToolCall(ToolCallInfo {
                correlation_id: context.correlation_id.clone(),
                tool_name: tool_name.to_owned(),
                tool_type,
                parameters: arguments.clone(),
            })));
        }

        let mut result = match definition {
            None => {
                warn!(tool = %tool_name, "tool not found");
                ToolResult::failure(format!("Tool '{tool_name}' is not registered"))
            }
            Some(definition) => {
                match self.gate(tool_type, &arguments, context).await {
                    Err(denial) => {
                        debug!(tool = %tool_name, reason = %denial, "tool call gated");
                        ToolResult::failure(denial)
                    }
                    Ok(()) => {
                        let timeout = Duration::from_millis(definition.timeout_ms);
                        match self.registry.get(tool_name) {
                            Err(_) => {
                                // Unregistered between definition lookup and dispatch.
                                ToolResult::failure(format!(
                                    "Tool '{tool_name}' is not registered"
                                ))
                            }
                            Ok(tool) => {
                                match tokio::time::timeout(
                                    timeout,
                                    tool.execute(context, &arguments),
                                )
                                .await
                                {
                                    Ok(result) => result,
                                    Err(_) => {
                                        warn!(
                                            tool = %tool_name,
                                            timeout_ms = definition.timeout_ms,
                                            "tool invocation timed out"
                                        );
                                        ToolResult::failure(format!(
                                            "timeout after {} ms",
                                            definition.timeout_ms
                                        ))
                                    }
                                }
                            }
                        }
                    }
                }
            }
        };

        result.duration_ms = started.elapsed().as_millis() as u64;

        if let Some(chain) = chain.as_deref_mut() {
            let step = ReasoningStep::new(StepPayload::ToolResult(ToolResultInfo {
                correlation_id: context.correlation_id.clone(),
                success: result.success,
                result: result.result.clone(),
                error: result.error.clone(),
                duration_ms: result.duration_ms,
            }))
            .with_accounting(
                u64::from(result.tokens_used.unwrap_or(0)),
                result.cost.unwrap_or(0.0),
            );
            chain.add_step(step);
        }

        result
    }

    /// Run the pre-flight gates in order: governance, caller budget,
    /// rate limits. Returns the denial message on failure.
    async fn gate(
        &self,
        tool_type: ToolType,
        arguments: &Value,
        context: &ToolCallContext,
    ) -> Result<(), String> {
        let estimate = if tool_type == ToolType::Llm {
            Some(self.estimate_llm_call(arguments, context))
        } else {
            None
        };

        if let (Some(governance), Some(tenant_id), Some(estimate)) =
            (&self.governance, &context.tenant_id, estimate.as_ref())
            && let Err(error) =
                governance.validate(tenant_id, &estimate.model, Some(estimate.cost_usd))
        {
            return Err(error.to_string());
        }

        if let (Some(budget), Some(estimate)) = (context.max_cost_usd, estimate.as_ref())
            && estimate.cost_usd > budget
        {
            return Err(format!(
                "estimated cost ${:.4} exceeds per-call budget ${:.4}",
                estimate.cost_usd, budget
            ));
        }

        if let (Some(rate_limiter), Some(tenant_id)) = (&self.rate_limiter, &context.tenant_id) {
            let (tokens, cost_usd) = estimate
                .as_ref()
                .map_or((None, None), |e| (Some(e.tokens), Some(e.cost_usd)));
            if !rate_limiter
                .check_and_consume(tenant_id, tool_type, tokens, cost_usd)
                .await
            {
                return Err(format!(
                    "rate limit exceeded for tenant '{tenant_id}' on {tool_type} calls"
                ));
            }
        }

        Ok(())
    }

    /// Conservative pre-call estimate from raw `llm` tool arguments.
    ///
    /// A call that omits `model` is estimated and governed against the
    /// executor's default model, so leaving the field out never makes a
    /// call free or ungoverned. Unknown model names already price at
    /// the expensive fallback in the cost table.
    fn estimate_llm_call(&self, arguments: &Value, context: &ToolCallContext) -> LlmEstimate {
        let model = arguments
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_model)
            .to_owned();

        // Only content lengths feed the estimate.
        let mut messages: Vec<ChatMessage> = Vec::new();
        if let Some(system) = arguments.get("system").and_then(Value::as_str) {
            messages.push(ChatMessage::system(system));
        }
        if let Some(raw) = arguments.get("messages").and_then(Value::as_array) {
            for entry in raw {
                if let Some(content) = entry.get("content").and_then(Value::as_str) {
                    messages.push(ChatMessage::user(content));
                }
            }
        }

        let max_tokens = arguments
            .get("max_tokens")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .or(context.max_tokens);

        LlmEstimate {
            tokens: cost::estimate_request_tokens(&messages, max_tokens),
            cost_usd: cost::estimate_request_cost(&model, &messages, max_tokens),
            model,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::chain::StepType;
    use crate::limits::{ModelPolicy, RateLimitConfig};
    use crate::llm::{ChatProvider, MockProvider};
    use crate::tool::builtin::{FunctionTool, LlmTool};
    use crate::tool::{ParameterType, ToolDefinition};
    use serde_json::json;

    fn registry_with_calculator() -> Arc<ToolRegistry> {
        let registry = Arc::new(ToolRegistry::new());
        let definition = ToolDefinition::new("calculator", ToolType::Function, "Arithmetic")
            .param("a", ParameterType::Float, "Left operand")
            .param("b", ParameterType::Float, "Right operand");
        registry
            .register(
                FunctionTool::new(definition, |args| async move {
                    let a = args.get("a").and_then(Value::as_f64).unwrap_or(0.0);
                    let b = args.get("b").and_then(Value::as_f64).unwrap_or(0.0);
                    Ok(json!(a + b))
                }),
                false,
            )
            .unwrap();
        registry
    }

    fn context() -> ToolCallContext {
        ToolCallContext::new("task-1", "agent-1").tenant("tenant-1")
    }

    #[tokio::test]
    async fn successful_call_records_paired_steps() {
        let executor = ToolExecutor::new(registry_with_calculator());
        let mut chain = ReasoningChain::new("task-1", "agent-1");
        let ctx = context();

        let result = executor
            .execute("calculator", json!({"a": 2, "b": 2}), &ctx, Some(&mut chain))
            .await;

        assert!(result.success);
        assert_eq!(result.result.unwrap(), json!(4.0));
        assert_eq!(chain.steps.len(), 2);
        assert_eq!(chain.steps[0].step_type(), StepType::ToolCall);
        assert_eq!(chain.steps[1].step_type(), StepType::ToolResult);
        assert_eq!(
            chain.steps[0].correlation_id(),
            chain.steps[1].correlation_id()
        );
        assert!(chain.correlations_consistent());
        assert!(chain.metrics_consistent());
    }

    #[tokio::test]
    async fn unknown_tool_yields_failing_result_with_steps() {
        let executor = ToolExecutor::new(Arc::new(ToolRegistry::new()));
        let mut chain = ReasoningChain::new("task-1", "agent-1");
        let ctx = context();

        let result = executor
            .execute("ghost", json!({}), &ctx, Some(&mut chain))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("not registered"));
        assert_eq!(chain.steps.len(), 2);
        assert!(chain.correlations_consistent());
    }

    #[tokio::test]
    async fn works_without_a_chain() {
        let executor = ToolExecutor::new(registry_with_calculator());
        let ctx = context();
        let result = executor
            .execute("calculator", json!({"a": 1, "b": 2}), &ctx, None)
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn timeout_produces_failing_result() {
        let registry = Arc::new(ToolRegistry::new());
        let definition =
            ToolDefinition::new("sleepy", ToolType::Function, "Sleeps forever").timeout_ms(20);
        registry
            .register(
                FunctionTool::new(definition, |_args| async move {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Value::Null)
                }),
                false,
            )
            .unwrap();

        let executor = ToolExecutor::new(registry);
        let mut chain = ReasoningChain::new("task-1", "agent-1");
        let result = executor
            .execute("sleepy", json!({}), &context(), Some(&mut chain))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("timeout"));
        assert!(chain.correlations_consistent());
    }

    #[tokio::test]
    async fn rate_limit_denial_is_encoded_not_raised() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            llm_calls_per_minute: 0,
            ..RateLimitConfig::default()
        }));
        let registry = Arc::new(ToolRegistry::new());
        let provider = Arc::new(MockProvider::new().reply("never used"));
        registry
            .register(
                LlmTool::new(provider as Arc<dyn ChatProvider>, "gpt-4"),
                false,
            )
            .unwrap();

        let executor = ToolExecutor::new(registry).with_rate_limiter(limiter);
        let mut chain = ReasoningChain::new("task-1", "agent-1");
        let args = json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hi"}]});
        let result = executor
            .execute("llm", args, &context(), Some(&mut chain))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("rate limit"));
        assert_eq!(chain.steps.len(), 2);
    }

    #[tokio::test]
    async fn governance_denial_is_encoded() {
        let governance = Arc::new(ModelGovernance::with_default_policy(ModelPolicy {
            blocked_models: vec!["gpt-4".into()],
            ..ModelPolicy::default()
        }));
        let registry = Arc::new(ToolRegistry::new());
        let provider = Arc::new(MockProvider::new().reply("never used"));
        registry
            .register(
                LlmTool::new(provider as Arc<dyn ChatProvider>, "gpt-4"),
                false,
            )
            .unwrap();

        let executor = ToolExecutor::new(registry).with_governance(governance);
        let args = json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hi"}]});
        let result = executor.execute("llm", args, &context(), None).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("blocked"));
    }

    #[tokio::test]
    async fn caller_budget_gates_expensive_calls() {
        let registry = Arc::new(ToolRegistry::new());
        let provider = Arc::new(MockProvider::new().reply("never used"));
        registry
            .register(
                LlmTool::new(provider as Arc<dyn ChatProvider>, "gpt-4"),
                false,
            )
            .unwrap();

        let executor = ToolExecutor::new(registry);
        let mut ctx = context();
        ctx.max_cost_usd = Some(0.000_1);

        let args = json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "a long enough prompt to cost something"}],
        });
        let result = executor.execute("llm", args, &ctx, None).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("cost"));
    }

    #[tokio::test]
    async fn omitting_model_does_not_bypass_governance() {
        // Approval required, nothing approved: the call must be denied
        // even when the model field is left out.
        let governance = Arc::new(ModelGovernance::with_default_policy(ModelPolicy {
            require_approval: true,
            ..ModelPolicy::default()
        }));
        let registry = Arc::new(ToolRegistry::new());
        let provider = Arc::new(MockProvider::new().reply("never used"));
        registry
            .register(
                LlmTool::new(provider as Arc<dyn ChatProvider>, "gpt-4"),
                false,
            )
            .unwrap();

        let executor = ToolExecutor::new(registry).with_governance(governance);
        let args = json!({"messages": [{"role": "user", "content": "hi"}]});
        let result = executor.execute("llm", args, &context(), None).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("approval"));
    }

    #[tokio::test]
    async fn omitting_model_does_not_bypass_the_caller_budget() {
        let registry = Arc::new(ToolRegistry::new());
        let provider = Arc::new(MockProvider::new().reply("never used"));
        registry
            .register(
                LlmTool::new(provider as Arc<dyn ChatProvider>, "gpt-4"),
                false,
            )
            .unwrap();

        let executor = ToolExecutor::new(registry);
        let mut ctx = context();
        ctx.max_cost_usd = Some(0.000_000_1);

        // No model field: the estimate falls back to the default model,
        // so the cost is non-zero and the budget gate still fires.
        let args = json!({"messages": [{"role": "user", "content": "hi"}]});
        let result = executor.execute("llm", args, &ctx, None).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("cost"));
    }

    #[tokio::test]
    async fn default_model_override_is_used_for_gating() {
        let governance = Arc::new(ModelGovernance::with_default_policy(ModelPolicy {
            blocked_models: vec!["house-model".into()],
            ..ModelPolicy::default()
        }));
        let registry = Arc::new(ToolRegistry::new());
        let provider = Arc::new(MockProvider::new().reply("never used"));
        registry
            .register(
                LlmTool::new(provider as Arc<dyn ChatProvider>, "house-model"),
                false,
            )
            .unwrap();

        let executor = ToolExecutor::new(registry)
            .with_governance(governance)
            .with_default_model("house-model");
        let args = json!({"messages": [{"role": "user", "content": "hi"}]});
        let result = executor.execute("llm", args, &context(), None).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("blocked"));
    }

    #[tokio::test]
    async fn non_llm_tools_skip_model_gates() {
        let governance = Arc::new(ModelGovernance::with_default_policy(ModelPolicy {
            blocked_models: vec!["*".into()],
            ..ModelPolicy::default()
        }));
        let executor = ToolExecutor::new(registry_with_calculator()).with_governance(governance);
        let result = executor
            .execute("calculator", json!({"a": 1, "b": 1}), &context(), None)
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn result_step_carries_token_accounting() {
        let registry = Arc::new(ToolRegistry::new());
        let provider = Arc::new(
            MockProvider::new().reply_with_usage("ok", crate::llm::Usage::new(100, 20)),
        );
        registry
            .register(
                LlmTool::new(provider as Arc<dyn ChatProvider>, "gpt-4"),
                false,
            )
            .unwrap();

        let executor = ToolExecutor::new(registry);
        let mut chain = ReasoningChain::new("task-1", "agent-1");
        let args = json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hi"}]});
        executor
            .execute("llm", args, &context(), Some(&mut chain))
            .await;

        assert_eq!(chain.steps[1].tokens_used, 120);
        assert!(chain.steps[1].cost > 0.0);
        assert_eq!(chain.metrics.total_tokens, 120);
        assert_eq!(chain.metrics.llm_calls, 1);
    }
}

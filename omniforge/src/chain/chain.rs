//! The append-only reasoning chain and its rolling metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::ToolType;

use super::step::{ReasoningStep, StepType};

/// Lifecycle status of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    /// Steps are still being appended.
    Running,
    /// Finished with a final answer.
    Completed,
    /// Finished with an error.
    Failed,
    /// Aborted by the caller.
    Cancelled,
}

impl ChainStatus {
    /// Parse from the snake_case wire form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Rolling aggregates over a chain's steps. Always equal to the fold of
/// the steps; [`ReasoningChain::add_step`] keeps them consistent on
/// every append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainMetrics {
    /// Number of steps.
    pub total_steps: u32,
    /// Tool-call steps targeting an LLM tool.
    pub llm_calls: u32,
    /// Tool-call steps of any type.
    pub tool_calls: u32,
    /// Sum of per-step token counts.
    pub total_tokens: u64,
    /// Sum of per-step costs in USD.
    pub total_cost: f64,
}

impl ChainMetrics {
    fn absorb(&mut self, step: &ReasoningStep) {
        self.total_steps += 1;
        self.total_tokens += step.tokens_used;
        self.total_cost += step.cost;
        if step.step_type() == StepType::ToolCall {
            self.tool_calls += 1;
            if step.tool_type() == Some(ToolType::Llm) {
                self.llm_calls += 1;
            }
        }
    }

    /// Deterministic fold over a slice of steps.
    #[must_use]
    pub fn fold(steps: &[ReasoningStep]) -> Self {
        let mut metrics = Self::default();
        for step in steps {
            metrics.absorb(step);
        }
        metrics
    }
}

/// The ordered record of reasoning steps for a single task execution.
///
/// Exclusively owned by the engine that builds it; once persisted it is
/// read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningChain {
    /// Chain identifier.
    pub id: Uuid,
    /// The task this chain executes.
    pub task_id: String,
    /// The agent doing the reasoning.
    pub agent_id: String,
    /// Owning tenant, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Lifecycle status.
    pub status: ChainStatus,
    /// When reasoning started.
    pub started_at: DateTime<Utc>,
    /// When reasoning finished, for terminal statuses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Ordered steps, gap-free by `step_number`.
    pub steps: Vec<ReasoningStep>,
    /// Rolling aggregates over `steps`.
    pub metrics: ChainMetrics,
    /// Chains spawned for delegated sub-agent work.
    pub child_chain_ids: Vec<Uuid>,
}

impl ReasoningChain {
    /// Create a running chain for a task.
    #[must_use]
    pub fn new(task_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            tenant_id: None,
            status: ChainStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            steps: Vec::new(),
            metrics: ChainMetrics::default(),
            child_chain_ids: Vec::new(),
        }
    }

    /// Set the owning tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Append a step: assigns the next gap-free `step_number`, folds the
    /// step into `metrics`, and returns a reference to the stored step.
    pub fn add_step(&mut self, mut step: ReasoningStep) -> &ReasoningStep {
        step.step_number = self.steps.len() as u32;
        self.metrics.absorb(&step);
        self.steps.push(step);
        self.steps
            .last()
            .unwrap_or_else(|| unreachable!("step was just pushed"))
    }

    /// Record a delegated child chain.
    pub fn add_child_chain(&mut self, child_id: Uuid) {
        self.child_chain_ids.push(child_id);
    }

    /// Mark the chain terminal with `status` and stamp `completed_at`.
    pub fn finish(&mut self, status: ChainStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Whether the stored metrics equal a fresh fold over the steps.
    #[must_use]
    pub fn metrics_consistent(&self) -> bool {
        let folded = ChainMetrics::fold(&self.steps);
        folded.total_steps == self.metrics.total_steps
            && folded.llm_calls == self.metrics.llm_calls
            && folded.tool_calls == self.metrics.tool_calls
            && folded.total_tokens == self.metrics.total_tokens
            && (folded.total_cost - self.metrics.total_cost).abs() < 1e-9
    }

    /// Whether every tool-result step has exactly one earlier tool-call
    /// step with the same correlation id.
    #[must_use]
    pub fn correlations_consistent(&self) -> bool {
        for (index, step) in self.steps.iter().enumerate() {
            if step.step_type() == StepType::ToolResult {
                let Some(correlation_id) = step.correlation_id() else {
                    return false;
                };
                let earlier_calls = self.steps[..index]
                    .iter()
                    .filter(|s| {
                        s.step_type() == StepType::ToolCall
                            && s.correlation_id() == Some(correlation_id)
                    })
                    .count();
                if earlier_calls != 1 {
                    return false;
                }
            }
        }
        true
    }

    /// Ids of all steps, in order.
    #[must_use]
    pub fn step_ids(&self) -> Vec<Uuid> {
        self.steps.iter().map(|s| s.id).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::chain::step::{StepPayload, ToolCallInfo, ToolResultInfo};

    fn tool_call(correlation_id: &str, tool_type: ToolType) -> ReasoningStep {
        ReasoningStep::new(StepPayload::ToolCall(ToolCallInfo {
            correlation_id: correlation_id.into(),
            tool_name: "t".into(),
            tool_type,
            parameters: serde_json::json!({}),
        }))
    }

    fn tool_result(correlation_id: &str) -> ReasoningStep {
        ReasoningStep::new(StepPayload::ToolResult(ToolResultInfo {
            correlation_id: correlation_id.into(),
            success: true,
            result: Some(serde_json::json!(4)),
            error: None,
            duration_ms: 5,
        }))
    }

    #[test]
    fn step_numbers_are_gap_free() {
        let mut chain = ReasoningChain::new("task-1", "agent-1");
        chain.add_step(ReasoningStep::thinking("a", None));
        chain.add_step(ReasoningStep::thinking("b", None));
        chain.add_step(ReasoningStep::thinking("c", None));

        let numbers: Vec<u32> = chain.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
    }

    #[test]
    fn metrics_track_the_fold() {
        let mut chain = ReasoningChain::new("task-1", "agent-1");
        chain.add_step(ReasoningStep::thinking("a", None).with_accounting(50, 0.001));
        chain.add_step(tool_call("c-1", ToolType::Llm).with_accounting(0, 0.0));
        chain.add_step(tool_result("c-1").with_accounting(120, 0.002));
        chain.add_step(tool_call("c-2", ToolType::Function));
        chain.add_step(tool_result("c-2"));

        assert_eq!(chain.metrics.total_steps, 5);
        assert_eq!(chain.metrics.tool_calls, 2);
        assert_eq!(chain.metrics.llm_calls, 1);
        assert_eq!(chain.metrics.total_tokens, 170);
        assert!((chain.metrics.total_cost - 0.003).abs() < 1e-9);
        assert!(chain.metrics_consistent());
        assert_eq!(chain.metrics, ChainMetrics::fold(&chain.steps));
    }

    #[test]
    fn correlation_invariant_holds_for_paired_steps() {
        let mut chain = ReasoningChain::new("task-1", "agent-1");
        chain.add_step(tool_call("c-1", ToolType::Function));
        chain.add_step(tool_result("c-1"));
        assert!(chain.correlations_consistent());
    }

    #[test]
    fn unmatched_result_is_detected() {
        let mut chain = ReasoningChain::new("task-1", "agent-1");
        chain.add_step(tool_result("orphan"));
        assert!(!chain.correlations_consistent());
    }

    #[test]
    fn result_before_call_is_detected() {
        let mut chain = ReasoningChain::new("task-1", "agent-1");
        chain.add_step(tool_result("c-1"));
        chain.add_step(tool_call("c-1", ToolType::Function));
        assert!(!chain.correlations_consistent());
    }

    #[test]
    fn finish_stamps_completion() {
        let mut chain = ReasoningChain::new("task-1", "agent-1");
        assert_eq!(chain.status, ChainStatus::Running);
        assert!(chain.completed_at.is_none());

        chain.finish(ChainStatus::Completed);
        assert_eq!(chain.status, ChainStatus::Completed);
        assert!(chain.completed_at.is_some());
    }

    #[test]
    fn serde_roundtrip_preserves_everything() {
        let mut chain = ReasoningChain::new("task-1", "agent-1").with_tenant("tenant-1");
        chain.add_step(ReasoningStep::thinking("a", Some(0.9)).with_accounting(10, 0.0001));
        chain.add_step(tool_call("c-1", ToolType::Llm));
        chain.add_step(tool_result("c-1"));
        chain.add_child_chain(Uuid::new_v4());
        chain.finish(ChainStatus::Completed);

        let json = serde_json::to_string(&chain).unwrap();
        let back: ReasoningChain = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, chain.id);
        assert_eq!(back.status, ChainStatus::Completed);
        assert_eq!(back.steps.len(), 3);
        assert_eq!(back.metrics, chain.metrics);
        assert_eq!(back.child_chain_ids, chain.child_chain_ids);
        assert!(back.metrics_consistent());
    }

    #[test]
    fn status_parse_roundtrip() {
        for status in [
            ChainStatus::Running,
            ChainStatus::Completed,
            ChainStatus::Failed,
            ChainStatus::Cancelled,
        ] {
            assert_eq!(ChainStatus::parse(&status.to_string()), Some(status));
        }
        assert_eq!(ChainStatus::parse("bogus"), None);
    }
}

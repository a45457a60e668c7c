//! Reasoning step types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::tool::ToolType;

/// How much of a step a viewer may see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityLevel {
    /// Full detail.
    #[default]
    Full,
    /// Content replaced by a deterministic summary, sensitive fields
    /// redacted.
    Summary,
    /// Dropped from filtered views entirely.
    Hidden,
}

/// Per-step visibility override with an optional reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepVisibility {
    /// The level to enforce.
    pub level: VisibilityLevel,
    /// Why the override exists ("Security", "Summarized for user", ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StepVisibility {
    /// A visibility override at `level` with no reason.
    #[must_use]
    pub const fn new(level: VisibilityLevel) -> Self {
        Self {
            level,
            reason: None,
        }
    }
}

/// Discriminator for the four step kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Free-form model reasoning.
    Thinking,
    /// A tool invocation request.
    ToolCall,
    /// The outcome of a tool invocation.
    ToolResult,
    /// A conclusion combining earlier steps.
    Synthesis,
}

/// Payload of a thinking step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingInfo {
    /// The reasoning text.
    pub content: String,
    /// Optional confidence in [0, 1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Payload of a tool-call step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallInfo {
    /// Links this call to its result step and external logs.
    pub correlation_id: String,
    /// The tool that was invoked.
    pub tool_name: String,
    /// The tool's category.
    pub tool_type: ToolType,
    /// Arguments passed to the tool.
    pub parameters: Value,
}

/// Payload of a tool-result step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultInfo {
    /// Matches the earlier tool-call step.
    pub correlation_id: String,
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Result payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration of the invocation.
    pub duration_ms: u64,
}

/// Payload of a synthesis step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisInfo {
    /// The synthesized conclusion.
    pub content: String,
    /// Step ids the conclusion draws on.
    pub sources: Vec<Uuid>,
}

/// Typed payload of a step, tagged by [`StepType`] on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepPayload {
    /// Free-form model reasoning.
    Thinking(ThinkingInfo),
    /// A tool invocation request.
    ToolCall(ToolCallInfo),
    /// The outcome of a tool invocation.
    ToolResult(ToolResultInfo),
    /// A conclusion combining earlier steps.
    Synthesis(SynthesisInfo),
}

impl StepPayload {
    /// The discriminator for this payload.
    #[must_use]
    pub const fn step_type(&self) -> StepType {
        match self {
            Self::Thinking(_) => StepType::Thinking,
            Self::ToolCall(_) => StepType::ToolCall,
            Self::ToolResult(_) => StepType::ToolResult,
            Self::Synthesis(_) => StepType::Synthesis,
        }
    }
}

/// One append-only node in a reasoning chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// Step identifier.
    pub id: Uuid,
    /// 0-based, gap-free position within the chain. Assigned by
    /// [`ReasoningChain::add_step`](super::ReasoningChain::add_step).
    pub step_number: u32,
    /// When the step was recorded.
    pub timestamp: DateTime<Utc>,
    /// Optional link to a logically-parent step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_step_id: Option<Uuid>,
    /// The typed payload.
    #[serde(flatten)]
    pub payload: StepPayload,
    /// Per-step visibility override.
    #[serde(default)]
    pub visibility: StepVisibility,
    /// Tokens attributed to this step.
    pub tokens_used: u64,
    /// Cost attributed to this step in USD.
    pub cost: f64,
}

impl ReasoningStep {
    /// Create a step with a fresh id; `step_number` is assigned on
    /// append.
    #[must_use]
    pub fn new(payload: StepPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            step_number: 0,
            timestamp: Utc::now(),
            parent_step_id: None,
            payload,
            visibility: StepVisibility::default(),
            tokens_used: 0,
            cost: 0.0,
        }
    }

    /// Convenience constructor for a thinking step.
    #[must_use]
    pub fn thinking(content: impl Into<String>, confidence: Option<f32>) -> Self {
        Self::new(StepPayload::Thinking(ThinkingInfo {
            content: content.into(),
            confidence,
        }))
    }

    /// Convenience constructor for a synthesis step.
    #[must_use]
    pub fn synthesis(content: impl Into<String>, sources: Vec<Uuid>) -> Self {
        Self::new(StepPayload::Synthesis(SynthesisInfo {
            content: content.into(),
            sources,
        }))
    }

    /// Attribute tokens and cost to this step.
    #[must_use]
    pub const fn with_accounting(mut self, tokens_used: u64, cost: f64) -> Self {
        self.tokens_used = tokens_used;
        self.cost = cost;
        self
    }

    /// The step's type discriminator.
    #[must_use]
    pub const fn step_type(&self) -> StepType {
        self.payload.step_type()
    }

    /// The tool type, when this step is a tool call.
    #[must_use]
    pub const fn tool_type(&self) -> Option<ToolType> {
        match &self.payload {
            StepPayload::ToolCall(info) => Some(info.tool_type),
            _ => None,
        }
    }

    /// The correlation id, when this step is a tool call or result.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        match &self.payload {
            StepPayload::ToolCall(info) => Some(&info.correlation_id),
            StepPayload::ToolResult(info) => Some(&info.correlation_id),
            _ => None,
        }
    }
}

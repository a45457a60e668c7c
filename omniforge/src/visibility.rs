//! Post-hoc visibility filtering over persisted chains.
//!
//! The controller never mutates stored chains; it produces filtered
//! copies in which hidden steps are dropped, summarized steps have their
//! content replaced by deterministic summaries, and sensitive argument
//! fields are redacted recursively.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chain::{
    ReasoningChain, ReasoningStep, StepPayload, StepVisibility, VisibilityLevel,
};
use crate::tool::ToolType;

/// Placeholder written over redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Caller role used to resolve visibility rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Operators; typically unrestricted.
    Admin,
    /// Builders debugging their agents.
    Developer,
    /// Consumers of agent output.
    EndUser,
}

impl Role {
    /// Parse from the snake_case wire form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "developer" => Some(Self::Developer),
            "end_user" => Some(Self::EndUser),
            _ => None,
        }
    }
}

/// Visibility configuration: a default level plus role- and
/// tool-type-keyed overrides and the sensitive field fragments.
#[derive(Debug, Clone)]
pub struct VisibilityRules {
    /// Level applied when no other rule matches.
    pub default_level: VisibilityLevel,
    /// Per-tool-type overrides.
    pub by_tool_type: HashMap<ToolType, VisibilityLevel>,
    /// Per-role overrides.
    pub by_role: HashMap<Role, VisibilityLevel>,
    /// Field-name fragments to redact in summarized views. Matching is
    /// case-insensitive with underscores stripped, so `api_key`,
    /// `apiKey`, and `API_KEY` all hit the `api_key` fragment.
    pub sensitive_fields: Vec<String>,
}

impl Default for VisibilityRules {
    fn default() -> Self {
        Self {
            default_level: VisibilityLevel::Full,
            by_tool_type: HashMap::new(),
            by_role: HashMap::new(),
            sensitive_fields: vec![
                "password".into(),
                "api_key".into(),
                "token".into(),
                "secret".into(),
            ],
        }
    }
}

impl VisibilityRules {
    /// Rules with the given default level and no overrides.
    #[must_use]
    pub fn with_default_level(default_level: VisibilityLevel) -> Self {
        Self {
            default_level,
            ..Self::default()
        }
    }

    /// Add a role override.
    #[must_use]
    pub fn role_rule(mut self, role: Role, level: VisibilityLevel) -> Self {
        self.by_role.insert(role, level);
        self
    }

    /// Add a tool-type override.
    #[must_use]
    pub fn tool_type_rule(mut self, tool_type: ToolType, level: VisibilityLevel) -> Self {
        self.by_tool_type.insert(tool_type, level);
        self
    }
}

/// Role- and tool-type-keyed filter/redactor over stored chains.
#[derive(Debug, Clone, Default)]
pub struct VisibilityController {
    rules: VisibilityRules,
}

impl VisibilityController {
    /// Controller enforcing `rules`.
    #[must_use]
    pub fn new(rules: VisibilityRules) -> Self {
        Self { rules }
    }

    /// The effective level for a step viewed by `role`.
    ///
    /// Resolution order, most specific first: the step's own override,
    /// the role rule, the tool-type rule, the default.
    #[must_use]
    pub fn effective_level(&self, step: &ReasoningStep, role: Option<Role>) -> VisibilityLevel {
        if step.visibility.level != VisibilityLevel::Full {
            return step.visibility.level;
        }
        if let Some(role) = role
            && let Some(level) = self.rules.by_role.get(&role)
        {
            return *level;
        }
        if let Some(tool_type) = step.tool_type()
            && let Some(level) = self.rules.by_tool_type.get(&tool_type)
        {
            return *level;
        }
        self.rules.default_level
    }

    /// Filter a chain for `role`: hidden steps are dropped, summarized
    /// steps are redacted, step order is preserved.
    #[must_use]
    pub fn filter_chain(&self, chain: &ReasoningChain, role: Option<Role>) -> ReasoningChain {
        let mut filtered = chain.clone();
        filtered.steps = chain
            .steps
            .iter()
            .filter_map(|step| match self.effective_level(step, role) {
                VisibilityLevel::Hidden => None,
                VisibilityLevel::Full => Some(step.clone()),
                VisibilityLevel::Summary => Some(self.summarize_step(step)),
            })
            .collect();
        filtered
    }

    /// Apply visibility to a single step, returning `None` when hidden.
    #[must_use]
    pub fn apply(&self, step: &ReasoningStep, role: Option<Role>) -> Option<ReasoningStep> {
        match self.effective_level(step, role) {
            VisibilityLevel::Hidden => None,
            VisibilityLevel::Full => Some(step.clone()),
            VisibilityLevel::Summary => Some(self.summarize_step(step)),
        }
    }

    fn summarize_step(&self, step: &ReasoningStep) -> ReasoningStep {
        let mut summarized = step.clone();
        match &mut summarized.payload {
            StepPayload::Thinking(info) => {
                info.content = format!("Reasoning step #{}", step.step_number);
                info.confidence = None;
            }
            StepPayload::ToolCall(info) => {
                info.parameters =
                    redact_sensitive_fields(&info.parameters, &self.rules.sensitive_fields);
            }
            StepPayload::ToolResult(info) => {
                if let Some(result) = &info.result {
                    info.result =
                        Some(redact_sensitive_fields(result, &self.rules.sensitive_fields));
                }
            }
            StepPayload::Synthesis(info) => {
                info.content = format!("Generated synthesis from {} sources", info.sources.len());
            }
        }
        summarized.visibility = StepVisibility {
            level: VisibilityLevel::Summary,
            reason: step
                .visibility
                .reason
                .clone()
                .or_else(|| Some("Summarized for viewer".into())),
        };
        summarized
    }

    /// The canned summary line for a step.
    #[must_use]
    pub fn summary_line(step: &ReasoningStep) -> String {
        match &step.payload {
            StepPayload::Thinking(_) => format!("Reasoning step #{}", step.step_number),
            StepPayload::ToolCall(info) => format!("Called {}", info.tool_name),
            StepPayload::ToolResult(info) => {
                if info.success {
                    "Tool call succeeded".into()
                } else {
                    "Tool call failed".into()
                }
            }
            StepPayload::Synthesis(info) => {
                format!("Generated synthesis from {} sources", info.sources.len())
            }
        }
    }
}

fn normalize_key(key: &str) -> String {
    key.to_lowercase().replace('_', "")
}

/// Replace values whose keys contain a sensitive fragment, recursing
/// into nested objects and arrays.
#[must_use]
pub fn redact_sensitive_fields(value: &Value, sensitive_fields: &[String]) -> Value {
    match value {
        Value::Object(map) => {
            let redacted = map
                .iter()
                .map(|(key, val)| {
                    let normalized = normalize_key(key);
                    let is_sensitive = sensitive_fields
                        .iter()
                        .any(|fragment| normalized.contains(&normalize_key(fragment)));
                    let new_val = if is_sensitive {
                        Value::String(REDACTED.into())
                    } else {
                        redact_sensitive_fields(val, sensitive_fields)
                    };
                    (key.clone(), new_val)
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_sensitive_fields(item, sensitive_fields))
                .collect(),
        ),
        other => other.clone(),
    }
}

//! Error types for the omniforge runtime.
//!
//! A single crate-level [`Error`] covers every failure kind in the system.
//! Gate denials (rate limits, governance, budgets, timeouts) are normally
//! encoded as failing [`ToolResult`](crate::tool::ToolResult) values rather
//! than raised; the variants here exist for the boundaries where an error is
//! the right shape: repositories, the HTTP surface, and top-level driver
//! failures.

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for runtime operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A task, agent, chain, or artifact lookup failed. Cross-tenant
    /// access is reported through this same variant so it is
    /// indistinguishable from a genuine miss.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// What kind of entity was looked up ("task", "chain", ...).
        kind: &'static str,
        /// The identifier that missed.
        id: String,
    },

    /// A tool with this name is already registered.
    #[error("tool '{0}' is already registered")]
    ToolAlreadyRegistered(String),

    /// No tool with this name is registered.
    #[error("tool '{0}' is not registered")]
    ToolNotFound(String),

    /// Invalid input.
    #[error("validation error: {0}")]
    Validation(String),

    /// A forbidden task state transition was attempted.
    #[error("cannot transition task '{task_id}' from '{from}' to '{to}'")]
    StateTransition {
        /// The task whose state was being changed.
        task_id: String,
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    /// A per-tenant quota was exhausted.
    #[error("rate limit exceeded for tenant '{tenant_id}' on {resource}")]
    RateLimited {
        /// The tenant whose budget ran out.
        tenant_id: String,
        /// Which counter tripped ("llm calls", "tokens/minute", ...).
        resource: String,
    },

    /// Model governance rejected the call.
    #[error("model '{model}' not allowed for tenant '{tenant_id}': {reason}")]
    ModelNotApproved {
        /// The model that was requested.
        model: String,
        /// The tenant the policy was resolved for.
        tenant_id: String,
        /// Human-readable rejection reason.
        reason: String,
    },

    /// The pre-call cost estimate exceeded the caller's budget.
    #[error("estimated cost ${estimated:.4} exceeds budget ${limit:.4}")]
    BudgetExceeded {
        /// Estimated cost of the call in USD.
        estimated: f64,
        /// The budget it was checked against.
        limit: f64,
    },

    /// A tool invocation ran past its deadline.
    #[error("tool '{tool_name}' timed out after {timeout_ms} ms")]
    Timeout {
        /// The tool that was cancelled.
        tool_name: String,
        /// The deadline that was exceeded.
        timeout_ms: u64,
    },

    /// The ReAct loop could not make progress (LLM failure, repeated
    /// malformed replies, gated model call).
    #[error("reasoning failed: {0}")]
    ReasoningFailed(String),

    /// The ReAct loop exhausted its iteration budget without a final answer.
    #[error("exceeded {0} iterations without a final answer")]
    MaxIterationsExceeded(u32),

    /// The task was cancelled by its caller.
    #[error("task cancelled")]
    Cancelled,

    /// A repository backend failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// An LLM provider failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// Invalid configuration or environment.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// JSON serialization/deserialization failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Anything unexpected.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not-found error.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create a state-transition error.
    #[must_use]
    pub fn state_transition(
        task_id: impl Into<String>,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::StateTransition {
            task_id: task_id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Machine-readable error code, stable across releases.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::ToolAlreadyRegistered(_) => "tool_already_registered",
            Self::ToolNotFound(_) => "tool_not_found",
            Self::Validation(_) => "validation_error",
            Self::StateTransition { .. } => "task_state_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::ModelNotApproved { .. } => "model_not_approved",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Timeout { .. } => "timeout",
            Self::ReasoningFailed(_) => "reasoning_failed",
            Self::MaxIterationsExceeded(_) => "max_iterations_exceeded",
            Self::Cancelled => "cancelled",
            Self::Storage(_) => "storage_error",
            Self::Provider(_) => "provider_error",
            Self::Configuration(_) => "configuration_error",
            Self::Json(_) => "json_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status the error maps to at the API boundary.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } | Self::ToolNotFound(_) => 404,
            Self::StateTransition { .. } | Self::ToolAlreadyRegistered(_) => 409,
            Self::Validation(_) | Self::Configuration(_) => 400,
            Self::RateLimited { .. } => 429,
            Self::ModelNotApproved { .. } | Self::BudgetExceeded { .. } => 403,
            Self::Timeout { .. } => 504,
            _ => 500,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_contains_id() {
        let err = Error::not_found("task", "task-123");
        assert_eq!(err.to_string(), "task 'task-123' not found");
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn state_transition_is_conflict() {
        let err = Error::state_transition("task-1", "completed", "working");
        assert_eq!(err.status_code(), 409);
        assert!(err.to_string().contains("completed"));
        assert!(err.to_string().contains("working"));
    }

    #[test]
    fn codes_are_snake_case() {
        let errors = vec![
            Error::not_found("task", "t"),
            Error::ToolAlreadyRegistered("x".into()),
            Error::Validation("v".into()),
            Error::RateLimited {
                tenant_id: "t".into(),
                resource: "llm calls".into(),
            },
            Error::MaxIterationsExceeded(15),
        ];
        for err in errors {
            let code = err.code();
            assert_eq!(code, code.to_lowercase());
            assert!(!code.contains(' '));
            assert!(!code.contains('-'));
        }
    }

    #[test]
    fn budget_exceeded_formats_four_decimals() {
        let err = Error::BudgetExceeded {
            estimated: 1.5,
            limit: 1.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("$1.5000"));
        assert!(msg.contains("$1.0000"));
    }
}

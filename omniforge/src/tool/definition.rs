//! Value types describing callable side-effects and their outcomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of a tool. Drives rate-limit bucketing, governance, and
/// visibility rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    /// A language-model call.
    Llm,
    /// A plain in-process function.
    Function,
    /// An external HTTP API.
    Api,
    /// A database query.
    Database,
    /// Read-only file access.
    FileRead,
    /// File mutation.
    FileWrite,
    /// Broader filesystem operations.
    FileSystem,
    /// A search backend.
    Search,
}

impl std::fmt::Display for ToolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Llm => "llm",
            Self::Function => "function",
            Self::Api => "api",
            Self::Database => "database",
            Self::FileRead => "file_read",
            Self::FileWrite => "file_write",
            Self::FileSystem => "file_system",
            Self::Search => "search",
        };
        write!(f, "{s}")
    }
}

/// Primitive type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    /// UTF-8 string.
    String,
    /// Integer number.
    Integer,
    /// Floating-point number.
    Float,
    /// Boolean flag.
    Boolean,
    /// Nested JSON object.
    Object,
    /// JSON array.
    Array,
}

impl ParameterType {
    /// The JSON-schema type name.
    #[must_use]
    pub const fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    #[serde(rename = "type")]
    pub parameter_type: ParameterType,
    /// Description shown to the model.
    pub description: String,
    /// Whether the parameter must be present.
    pub required: bool,
}

/// Description of a callable tool: its unique name, category, declared
/// parameters, and invocation deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name (snake_case).
    pub name: String,
    /// Tool category.
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    /// Description shown to the model.
    pub description: String,
    /// Declared parameters.
    pub parameters: Vec<ToolParameter>,
    /// Invocation deadline in milliseconds.
    pub timeout_ms: u64,
}

impl ToolDefinition {
    /// Default invocation deadline.
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

    /// Create a definition with no parameters and the default timeout.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        tool_type: ToolType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            tool_type,
            description: description.into(),
            parameters: Vec::new(),
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
        }
    }

    /// Add a required parameter.
    #[must_use]
    pub fn param(
        mut self,
        name: impl Into<String>,
        parameter_type: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        self.parameters.push(ToolParameter {
            name: name.into(),
            parameter_type,
            description: description.into(),
            required: true,
        });
        self
    }

    /// Add an optional parameter.
    #[must_use]
    pub fn optional_param(
        mut self,
        name: impl Into<String>,
        parameter_type: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        self.parameters.push(ToolParameter {
            name: name.into(),
            parameter_type,
            description: description.into(),
            required: false,
        });
        self
    }

    /// Override the invocation deadline.
    #[must_use]
    pub const fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Render the parameters as a JSON schema object.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    serde_json::json!({
                        "type": p.parameter_type.json_type(),
                        "description": p.description,
                    }),
                )
            })
            .collect();

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Per-invocation context threaded through the executor into every tool.
///
/// `tenant_id` is always taken from here, never from model-supplied
/// arguments; that is the tenant-isolation boundary for every gate.
#[derive(Debug, Clone)]
pub struct ToolCallContext {
    /// Links the call step, result step, and external log records.
    pub correlation_id: String,
    /// The task being worked on.
    pub task_id: String,
    /// The agent doing the work.
    pub agent_id: String,
    /// Owning tenant, when known.
    pub tenant_id: Option<String>,
    /// The chain this call is recorded into, when any.
    pub chain_id: Option<String>,
    /// Caller-imposed token cap.
    pub max_tokens: Option<u32>,
    /// Caller-imposed per-call cost budget in USD.
    pub max_cost_usd: Option<f64>,
}

impl ToolCallContext {
    /// Create a context with a fresh correlation id.
    #[must_use]
    pub fn new(task_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            tenant_id: None,
            chain_id: None,
            max_tokens: None,
            max_cost_usd: None,
        }
    }

    /// Set the tenant.
    #[must_use]
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Outcome of a tool execution. Exactly one of `result` / `error` is
/// populated, keyed by `success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
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
    /// Tokens consumed, when the tool knows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    /// Cost in USD, when the tool knows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl ToolResult {
    /// A successful result.
    #[must_use]
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            duration_ms: 0,
            tokens_used: None,
            cost: None,
        }
    }

    /// A failed result.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            duration_ms: 0,
            tokens_used: None,
            cost: None,
        }
    }

    /// Attach token usage.
    #[must_use]
    pub const fn with_tokens(mut self, tokens: u32) -> Self {
        self.tokens_used = Some(tokens);
        self
    }

    /// Attach a cost figure.
    #[must_use]
    pub const fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }
}

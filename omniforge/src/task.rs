//! Task lifecycle models.
//!
//! A [`Task`] is the externally-visible unit of work. Its [`TaskState`]
//! moves along a fixed transition table; anything else is rejected with
//! [`Error::StateTransition`]. Tasks carry ordered [`TaskMessage`]s (each
//! with at least one [`MessagePart`]), produced [`Artifact`]s, and an
//! optional link to a parent task for delegated work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Accepted, not yet picked up by a driver.
    Submitted,
    /// A driver is actively reasoning on it.
    Working,
    /// Blocked on additional user input.
    InputRequired,
    /// Blocked on an authentication step.
    AuthRequired,
    /// Finished with a final answer.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled by the caller.
    Cancelled,
    /// Refused before any work started.
    Rejected,
}

impl TaskState {
    /// The set of states with no outbound edges.
    pub const TERMINAL: [Self; 4] = [
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::Rejected,
    ];

    /// Whether this state is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    /// Whether the edge `self -> new_state` is permitted.
    #[must_use]
    pub fn can_transition_to(self, new_state: Self) -> bool {
        use TaskState::{
            AuthRequired, Cancelled, Completed, Failed, InputRequired, Rejected, Submitted, Working,
        };
        match self {
            Submitted => matches!(new_state, Working | Failed | Cancelled | Rejected),
            Working => matches!(
                new_state,
                InputRequired | AuthRequired | Completed | Failed | Cancelled
            ),
            InputRequired | AuthRequired => matches!(new_state, Working | Failed | Cancelled),
            Completed | Failed | Cancelled | Rejected => false,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Working => "working",
            Self::InputRequired => "input_required",
            Self::AuthRequired => "auth_required",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// One part of a task message. A sum type with `text` as the only
/// variant today; other part kinds are reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    /// Plain text content.
    Text {
        /// The text payload.
        text: String,
    },
}

impl MessagePart {
    /// Create a text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The text payload, if this is a text part.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
        }
    }
}

/// Role of a message within a task conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Authored by the requesting user.
    User,
    /// Authored by the agent.
    Agent,
}

/// A message in a task's conversation. Always has at least one part;
/// construct through [`TaskMessage::new`] which enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    /// Message identifier.
    pub id: String,
    /// Who authored it.
    pub role: MessageRole,
    /// Ordered content parts (never empty).
    pub parts: Vec<MessagePart>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TaskMessage {
    /// Create a message, enforcing the at-least-one-part invariant.
    pub fn new(role: MessageRole, parts: Vec<MessagePart>) -> Result<Self> {
        if parts.is_empty() {
            return Err(Error::Validation(
                "a task message must have at least one part".into(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            role,
            parts,
            created_at: Utc::now(),
        })
    }

    /// Convenience: a single-text-part user message.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: MessageRole::User,
            parts: vec![MessagePart::text(text)],
            created_at: Utc::now(),
        }
    }

    /// Convenience: a single-text-part agent message.
    #[must_use]
    pub fn agent_text(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: MessageRole::Agent,
            parts: vec![MessagePart::text(text)],
            created_at: Utc::now(),
        }
    }
}

/// Structured error attached to a failed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Category of an artifact's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    /// Prose documents.
    Document,
    /// Tabular or record-oriented data.
    Dataset,
    /// Source code.
    Code,
    /// Image content (inline or referenced).
    Image,
    /// Arbitrary structured JSON.
    Structured,
}

/// A tenant-scoped, typed piece of content an agent produced or consumed.
///
/// Fetching an artifact with the wrong tenant is indistinguishable from
/// not-found; the [`ArtifactStore`](crate::repository::ArtifactStore)
/// enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact identifier.
    pub id: String,
    /// Content category.
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    /// Display title.
    pub title: String,
    /// Inline content payload.
    pub inline_content: Value,
    /// Optional free-form metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Optional MIME type of the inline content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Owning tenant.
    pub tenant_id: String,
    /// Agent that produced it, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_agent_id: Option<String>,
}

impl Artifact {
    /// Create an artifact with a fresh id.
    #[must_use]
    pub fn new(
        artifact_type: ArtifactType,
        title: impl Into<String>,
        inline_content: Value,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            artifact_type,
            title: title.into(),
            inline_content,
            metadata: None,
            mime_type: None,
            tenant_id: tenant_id.into(),
            created_by_agent_id: None,
        }
    }
}

/// The externally-visible unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier.
    pub id: String,
    /// The agent this task was submitted to.
    pub agent_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Submitting user.
    pub user_id: String,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Conversation so far, oldest first.
    pub messages: Vec<TaskMessage>,
    /// Artifacts produced while working on the task.
    pub artifacts: Vec<Artifact>,
    /// Error details once the task has failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// Parent task when this is delegated sub-work. Acyclic by
    /// construction: the parent must already exist at creation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,
    /// Skill the task was routed to, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_name: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a freshly submitted task.
    #[must_use]
    pub fn new(
        agent_id: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        messages: Vec<TaskMessage>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            state: TaskState::Submitted,
            messages,
            artifacts: Vec::new(),
            error: None,
            parent_task_id: None,
            skill_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Link this task under a parent.
    #[must_use]
    pub fn with_parent(mut self, parent_task_id: impl Into<String>) -> Self {
        self.parent_task_id = Some(parent_task_id.into());
        self
    }

    /// Tag the task with a skill name.
    #[must_use]
    pub fn with_skill(mut self, skill_name: impl Into<String>) -> Self {
        self.skill_name = Some(skill_name.into());
        self
    }

    /// Move the task to `new_state`, rejecting forbidden edges.
    pub fn transition_to(&mut self, new_state: TaskState) -> Result<()> {
        if !self.state.can_transition_to(new_state) {
            return Err(Error::state_transition(&self.id, self.state, new_state));
        }
        self.state = new_state;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// The text of the first user message, if any.
    #[must_use]
    pub fn first_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::User)
            .and_then(|m| m.parts.first())
            .and_then(MessagePart::as_text)
    }
}

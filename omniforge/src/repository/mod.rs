//! Persistence contracts for tasks, chains, and artifacts, with
//! in-memory and SQLite implementations chosen at wiring time.
//!
//! Every id-taking operation accepts the caller's tenant; a mismatch is
//! reported as not-found, never as a distinct error, so cross-tenant
//! probing learns nothing. Passing `None` is reserved for internal
//! (system) access.

mod memory;
mod sqlite;

pub use memory::{InMemoryArtifactStore, InMemoryChainRepository, InMemoryTaskRepository};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::chain::{ChainMetrics, ChainStatus, ReasoningChain};
use crate::error::Result;
use crate::task::{Artifact, Task};

/// Lightweight chain listing row: everything but the steps.
#[derive(Debug, Clone, Serialize)]
pub struct ChainSummary {
    /// Chain identifier.
    pub id: Uuid,
    /// The task the chain executed.
    pub task_id: String,
    /// The agent that ran it.
    pub agent_id: String,
    /// Owning tenant, when known.
    pub tenant_id: Option<String>,
    /// Lifecycle status.
    pub status: ChainStatus,
    /// When reasoning started.
    pub started_at: DateTime<Utc>,
    /// When reasoning finished, for terminal statuses.
    pub completed_at: Option<DateTime<Utc>>,
    /// Rolled-up metrics.
    pub metrics: ChainMetrics,
}

impl From<&ReasoningChain> for ChainSummary {
    fn from(chain: &ReasoningChain) -> Self {
        Self {
            id: chain.id,
            task_id: chain.task_id.clone(),
            agent_id: chain.agent_id.clone(),
            tenant_id: chain.tenant_id.clone(),
            status: chain.status,
            started_at: chain.started_at,
            completed_at: chain.completed_at,
            metrics: chain.metrics,
        }
    }
}

/// Storage contract for tasks.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Fetch a task. With `tenant_id` set, a stored task owned by a
    /// different tenant reads as `None`.
    async fn get(&self, task_id: &str, tenant_id: Option<&str>) -> Result<Option<Task>>;

    /// Persist a new task; duplicate ids are an error.
    async fn save(&self, task: &Task) -> Result<()>;

    /// Update an existing task; missing ids are an error.
    async fn update(&self, task: &Task) -> Result<()>;

    /// Delete a task. Returns whether anything was removed; a tenant
    /// mismatch reads as `false`.
    async fn delete(&self, task_id: &str, tenant_id: Option<&str>) -> Result<bool>;

    /// Tasks for an agent, newest first.
    async fn list_by_agent(&self, agent_id: &str, limit: usize) -> Result<Vec<Task>>;

    /// Children of a parent task, oldest first.
    async fn list_by_parent(&self, parent_task_id: &str, limit: usize) -> Result<Vec<Task>>;

    /// Tasks for a tenant, newest first, paginated.
    async fn list_by_tenant(
        &self,
        tenant_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Task>>;

    /// Tasks for a tenant routed to a skill, newest first.
    async fn list_by_skill(
        &self,
        tenant_id: &str,
        skill_name: &str,
        limit: usize,
    ) -> Result<Vec<Task>>;
}

/// Storage contract for reasoning chains. Persisted chains are
/// read-only; `save` is an upsert so a running chain can be re-saved on
/// completion.
#[async_trait]
pub trait ChainRepository: Send + Sync {
    /// Persist a chain with all its steps.
    async fn save(&self, chain: &ReasoningChain) -> Result<()>;

    /// Fetch a chain with steps ordered by step number. With
    /// `tenant_id` set, a chain owned by another tenant reads as
    /// `None`.
    async fn get_by_id(
        &self,
        chain_id: Uuid,
        tenant_id: Option<&str>,
    ) -> Result<Option<ReasoningChain>>;

    /// All chains for a task, oldest first.
    async fn get_by_task(&self, task_id: &str) -> Result<Vec<ReasoningChain>>;

    /// Chain summaries for a tenant, newest `started_at` first,
    /// optionally filtered by status, paginated.
    async fn list_by_tenant(
        &self,
        tenant_id: &str,
        status: Option<ChainStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChainSummary>>;

    /// Delete a chain and its steps. Returns whether anything was
    /// removed.
    async fn delete(&self, chain_id: Uuid) -> Result<bool>;
}

/// Storage contract for artifacts. All operations are tenant-scoped.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist (upsert) an artifact within its tenant namespace and
    /// return its id.
    async fn store(&self, artifact: &Artifact) -> Result<String>;

    /// Fetch an artifact. A wrong tenant reads as `None`.
    async fn fetch(&self, artifact_id: &str, tenant_id: &str) -> Result<Option<Artifact>>;

    /// Delete an artifact within a tenant. Returns whether anything was
    /// removed.
    async fn delete(&self, artifact_id: &str, tenant_id: &str) -> Result<bool>;
}

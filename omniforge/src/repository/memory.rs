//! In-memory repository implementations.
//!
//! Hash-map storage behind async mutexes, suitable for tests and
//! single-instance deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::chain::{ChainStatus, ReasoningChain};
use crate::error::{Error, Result};
use crate::task::{Artifact, Task};

use super::{ArtifactStore, ChainRepository, ChainSummary, TaskRepository};

/// In-memory [`TaskRepository`].
#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<HashMap<String, Task>>,
}

impl InMemoryTaskRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn tenant_matches(stored: &str, requested: Option<&str>) -> bool {
    requested.is_none_or(|tenant| tenant == stored)
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn get(&self, task_id: &str, tenant_id: Option<&str>) -> Result<Option<Task>> {
        let tasks = self.tasks.lock().await;
        Ok(tasks
            .get(task_id)
            .filter(|task| tenant_matches(&task.tenant_id, tenant_id))
            .cloned())
    }

    async fn save(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&task.id) {
            return Err(Error::Validation(format!(
                "task '{}' already exists",
                task.id
            )));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn update(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if !tasks.contains_key(&task.id) {
            return Err(Error::not_found("task", &task.id));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn delete(&self, task_id: &str, tenant_id: Option<&str>) -> Result<bool> {
        let mut tasks = self.tasks.lock().await;
        let matches = tasks
            .get(task_id)
            .is_some_and(|task| tenant_matches(&task.tenant_id, tenant_id));
        if matches {
            tasks.remove(task_id);
        }
        Ok(matches)
    }

    async fn list_by_agent(&self, agent_id: &str, limit: usize) -> Result<Vec<Task>> {
        let tasks = self.tasks.lock().await;
        let mut found: Vec<Task> = tasks
            .values()
            .filter(|t| t.agent_id == agent_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit);
        Ok(found)
    }

    async fn list_by_parent(&self, parent_task_id: &str, limit: usize) -> Result<Vec<Task>> {
        let tasks = self.tasks.lock().await;
        let mut found: Vec<Task> = tasks
            .values()
            .filter(|t| t.parent_task_id.as_deref() == Some(parent_task_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        found.truncate(limit);
        Ok(found)
    }

    async fn list_by_tenant(
        &self,
        tenant_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Task>> {
        let tasks = self.tasks.lock().await;
        let mut found: Vec<Task> = tasks
            .values()
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_by_skill(
        &self,
        tenant_id: &str,
        skill_name: &str,
        limit: usize,
    ) -> Result<Vec<Task>> {
        let tasks = self.tasks.lock().await;
        let mut found: Vec<Task> = tasks
            .values()
            .filter(|t| t.tenant_id == tenant_id && t.skill_name.as_deref() == Some(skill_name))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit);
        Ok(found)
    }
}

/// In-memory [`ChainRepository`].
#[derive(Debug, Default)]
pub struct InMemoryChainRepository {
    chains: Mutex<HashMap<Uuid, ReasoningChain>>,
}

impl InMemoryChainRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChainRepository for InMemoryChainRepository {
    async fn save(&self, chain: &ReasoningChain) -> Result<()> {
        let mut chains = self.chains.lock().await;
        chains.insert(chain.id, chain.clone());
        Ok(())
    }

    async fn get_by_id(
        &self,
        chain_id: Uuid,
        tenant_id: Option<&str>,
    ) -> Result<Option<ReasoningChain>> {
        let chains = self.chains.lock().await;
        Ok(chains
            .get(&chain_id)
            .filter(|chain| {
                tenant_id.is_none_or(|tenant| chain.tenant_id.as_deref() == Some(tenant))
            })
            .cloned())
    }

    async fn get_by_task(&self, task_id: &str) -> Result<Vec<ReasoningChain>> {
        let chains = self.chains.lock().await;
        let mut found: Vec<ReasoningChain> = chains
            .values()
            .filter(|c| c.task_id == task_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(found)
    }

    async fn list_by_tenant(
        &self,
        tenant_id: &str,
        status: Option<ChainStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChainSummary>> {
        let chains = self.chains.lock().await;
        let mut found: Vec<ChainSummary> = chains
            .values()
            .filter(|c| c.tenant_id.as_deref() == Some(tenant_id))
            .filter(|c| status.is_none_or(|s| c.status == s))
            .map(ChainSummary::from)
            .collect();
        found.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(found.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete(&self, chain_id: Uuid) -> Result<bool> {
        let mut chains = self.chains.lock().await;
        Ok(chains.remove(&chain_id).is_some())
    }
}

/// In-memory [`ArtifactStore`], keyed tenant-first so cross-tenant
/// lookups cannot even see other namespaces.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: Mutex<HashMap<String, HashMap<String, Artifact>>>,
}

impl InMemoryArtifactStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn store(&self, artifact: &Artifact) -> Result<String> {
        let mut artifacts = self.artifacts.lock().await;
        artifacts
            .entry(artifact.tenant_id.clone())
            .or_default()
            .insert(artifact.id.clone(), artifact.clone());
        Ok(artifact.id.clone())
    }

    async fn fetch(&self, artifact_id: &str, tenant_id: &str) -> Result<Option<Artifact>> {
        let artifacts = self.artifacts.lock().await;
        Ok(artifacts
            .get(tenant_id)
            .and_then(|tenant| tenant.get(artifact_id))
            .cloned())
    }

    async fn delete(&self, artifact_id: &str, tenant_id: &str) -> Result<bool> {
        let mut artifacts = self.artifacts.lock().await;
        Ok(artifacts
            .get_mut(tenant_id)
            .is_some_and(|tenant| tenant.remove(artifact_id).is_some()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::task::{ArtifactType, TaskMessage};

    fn task_for(agent: &str, tenant: &str) -> Task {
        Task::new(agent, tenant, "user-1", vec![TaskMessage::user_text("hi")])
    }

    mod tasks {
        use super::*;

        #[tokio::test]
        async fn save_then_get() {
            let repo = InMemoryTaskRepository::new();
            let task = task_for("agent-1", "tenant-1");
            repo.save(&task).await.unwrap();

            let fetched = repo.get(&task.id, None).await.unwrap().unwrap();
            assert_eq!(fetched.id, task.id);
        }

        #[tokio::test]
        async fn duplicate_save_is_rejected() {
            let repo = InMemoryTaskRepository::new();
            let task = task_for("agent-1", "tenant-1");
            repo.save(&task).await.unwrap();
            assert!(repo.save(&task).await.is_err());
        }

        #[tokio::test]
        async fn update_missing_task_is_rejected() {
            let repo = InMemoryTaskRepository::new();
            let task = task_for("agent-1", "tenant-1");
            let err = repo.update(&task).await.unwrap_err();
            assert_eq!(err.status_code(), 404);
        }

        #[tokio::test]
        async fn cross_tenant_get_reads_as_none() {
            let repo = InMemoryTaskRepository::new();
            let task = task_for("agent-1", "tenant-a");
            repo.save(&task).await.unwrap();

            assert!(repo.get(&task.id, Some("tenant-b")).await.unwrap().is_none());
            assert!(repo.get(&task.id, Some("tenant-a")).await.unwrap().is_some());
        }

        #[tokio::test]
        async fn cross_tenant_delete_reads_as_false() {
            let repo = InMemoryTaskRepository::new();
            let task = task_for("agent-1", "tenant-a");
            repo.save(&task).await.unwrap();

            assert!(!repo.delete(&task.id, Some("tenant-b")).await.unwrap());
            assert!(repo.get(&task.id, None).await.unwrap().is_some());
            assert!(repo.delete(&task.id, Some("tenant-a")).await.unwrap());
        }

        #[tokio::test]
        async fn list_by_agent_is_newest_first() {
            let repo = InMemoryTaskRepository::new();
            let mut first = task_for("agent-1", "t");
            first.created_at = chrono::Utc::now() - chrono::Duration::seconds(10);
            let second = task_for("agent-1", "t");
            repo.save(&first).await.unwrap();
            repo.save(&second).await.unwrap();
            repo.save(&task_for("agent-2", "t")).await.unwrap();

            let listed = repo.list_by_agent("agent-1", 10).await.unwrap();
            assert_eq!(listed.len(), 2);
            assert_eq!(listed[0].id, second.id);
            assert_eq!(listed[1].id, first.id);
        }

        #[tokio::test]
        async fn list_by_parent_is_oldest_first() {
            let repo = InMemoryTaskRepository::new();
            let parent = task_for("agent-1", "t");
            repo.save(&parent).await.unwrap();

            let mut older = task_for("agent-1", "t").with_parent(&parent.id);
            older.created_at = chrono::Utc::now() - chrono::Duration::seconds(5);
            let newer = task_for("agent-1", "t").with_parent(&parent.id);
            repo.save(&newer).await.unwrap();
            repo.save(&older).await.unwrap();

            let children = repo.list_by_parent(&parent.id, 10).await.unwrap();
            assert_eq!(children.len(), 2);
            assert_eq!(children[0].id, older.id);
        }

        #[tokio::test]
        async fn tenant_listing_paginates() {
            let repo = InMemoryTaskRepository::new();
            for i in 0..5 {
                let mut task = task_for("agent-1", "tenant-1");
                task.created_at = chrono::Utc::now() - chrono::Duration::seconds(i);
                repo.save(&task).await.unwrap();
            }

            let page1 = repo.list_by_tenant("tenant-1", 2, 0).await.unwrap();
            let page2 = repo.list_by_tenant("tenant-1", 2, 2).await.unwrap();
            let page3 = repo.list_by_tenant("tenant-1", 2, 4).await.unwrap();
            assert_eq!(page1.len(), 2);
            assert_eq!(page2.len(), 2);
            assert_eq!(page3.len(), 1);

            let mut ids: Vec<String> = page1
                .iter()
                .chain(&page2)
                .chain(&page3)
                .map(|t| t.id.clone())
                .collect();
            ids.dedup();
            assert_eq!(ids.len(), 5);
        }

        #[tokio::test]
        async fn skill_listing_filters_by_tenant_and_skill() {
            let repo = InMemoryTaskRepository::new();
            repo.save(&task_for("a", "t1").with_skill("analysis"))
                .await
                .unwrap();
            repo.save(&task_for("a", "t1").with_skill("drafting"))
                .await
                .unwrap();
            repo.save(&task_for("a", "t2").with_skill("analysis"))
                .await
                .unwrap();

            let listed = repo.list_by_skill("t1", "analysis", 10).await.unwrap();
            assert_eq!(listed.len(), 1);
        }
    }

    mod chains {
        use super::*;
        use crate::chain::ReasoningStep;

        #[tokio::test]
        async fn save_is_an_upsert() {
            let repo = InMemoryChainRepository::new();
            let mut chain = ReasoningChain::new("task-1", "agent-1").with_tenant("t");
            repo.save(&chain).await.unwrap();

            chain.add_step(ReasoningStep::thinking("more", None));
            chain.finish(ChainStatus::Completed);
            repo.save(&chain).await.unwrap();

            let fetched = repo.get_by_id(chain.id, None).await.unwrap().unwrap();
            assert_eq!(fetched.status, ChainStatus::Completed);
            assert_eq!(fetched.steps.len(), 1);
        }

        #[tokio::test]
        async fn cross_tenant_chain_reads_as_none() {
            let repo = InMemoryChainRepository::new();
            let chain = ReasoningChain::new("task-1", "agent-1").with_tenant("tenant-a");
            repo.save(&chain).await.unwrap();

            assert!(repo
                .get_by_id(chain.id, Some("tenant-b"))
                .await
                .unwrap()
                .is_none());
            assert!(repo
                .get_by_id(chain.id, Some("tenant-a"))
                .await
                .unwrap()
                .is_some());
        }

        #[tokio::test]
        async fn tenant_listing_filters_status_and_orders_newest_first() {
            let repo = InMemoryChainRepository::new();
            let mut completed = ReasoningChain::new("task-1", "a").with_tenant("t");
            completed.started_at = chrono::Utc::now() - chrono::Duration::seconds(10);
            completed.finish(ChainStatus::Completed);
            let running = ReasoningChain::new("task-2", "a").with_tenant("t");
            repo.save(&completed).await.unwrap();
            repo.save(&running).await.unwrap();

            let all = repo.list_by_tenant("t", None, 10, 0).await.unwrap();
            assert_eq!(all.len(), 2);
            assert_eq!(all[0].id, running.id);

            let only_completed = repo
                .list_by_tenant("t", Some(ChainStatus::Completed), 10, 0)
                .await
                .unwrap();
            assert_eq!(only_completed.len(), 1);
            assert_eq!(only_completed[0].id, completed.id);
        }

        #[tokio::test]
        async fn delete_reports_outcome() {
            let repo = InMemoryChainRepository::new();
            let chain = ReasoningChain::new("task-1", "agent-1");
            repo.save(&chain).await.unwrap();

            assert!(repo.delete(chain.id).await.unwrap());
            assert!(!repo.delete(chain.id).await.unwrap());
        }
    }

    mod artifacts {
        use super::*;

        #[tokio::test]
        async fn fetch_with_wrong_tenant_is_none() {
            let store = InMemoryArtifactStore::new();
            let artifact = Artifact::new(
                ArtifactType::Document,
                "report",
                serde_json::json!("content"),
                "tenant-a",
            );
            let id = store.store(&artifact).await.unwrap();

            assert!(store.fetch(&id, "tenant-b").await.unwrap().is_none());
            assert!(store.fetch(&id, "tenant-a").await.unwrap().is_some());
        }

        #[tokio::test]
        async fn store_upserts_within_tenant() {
            let store = InMemoryArtifactStore::new();
            let mut artifact = Artifact::new(
                ArtifactType::Code,
                "v1",
                serde_json::json!("fn main() {}"),
                "tenant-a",
            );
            store.store(&artifact).await.unwrap();
            artifact.title = "v2".into();
            store.store(&artifact).await.unwrap();

            let fetched = store.fetch(&artifact.id, "tenant-a").await.unwrap().unwrap();
            assert_eq!(fetched.title, "v2");
        }

        #[tokio::test]
        async fn delete_is_tenant_scoped() {
            let store = InMemoryArtifactStore::new();
            let artifact = Artifact::new(
                ArtifactType::Dataset,
                "data",
                serde_json::json!([1, 2, 3]),
                "tenant-a",
            );
            let id = store.store(&artifact).await.unwrap();

            assert!(!store.delete(&id, "tenant-b").await.unwrap());
            assert!(store.delete(&id, "tenant-a").await.unwrap());
            assert!(store.fetch(&id, "tenant-a").await.unwrap().is_none());
        }
    }
}

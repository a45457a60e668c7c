//! SQLite-backed repositories.
//!
//! One [`SqliteStore`] owns a single database holding tasks, chains,
//! steps, and artifacts, and implements all three repository contracts.
//! Uses [`rusqlite`] for synchronous access, bridged to async via
//! [`tokio::task::spawn_blocking`]. Rows keep queryable columns for
//! filtering and ordering; full entities are stored as JSON so
//! rehydration reproduces metrics, visibility, and parent/child
//! relationships exactly.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::chain::{ChainMetrics, ChainStatus, ReasoningChain, ReasoningStep};
use crate::error::{Error, Result};
use crate::task::{Artifact, Task};

use super::{ArtifactStore, ChainRepository, ChainSummary, TaskRepository};

/// SQLite store implementing every repository contract.
///
/// Cloneable via `Arc<Mutex<Connection>>`; all blocking I/O is
/// offloaded to the tokio blocking thread pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

fn storage(err: impl std::fmt::Display) -> Error {
    Error::Storage(err.to_string())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(storage)
}

impl SqliteStore {
    /// Open (or create) a database at `path` and initialize the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(storage)?;
        Self::from_connection(conn)
    }

    /// Open an ephemeral in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::from_connection(conn)
    }

    /// Wrap an existing connection, applying pragmas and schema setup.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;\
             PRAGMA foreign_keys = ON;\
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(storage)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id             TEXT PRIMARY KEY,
                agent_id       TEXT NOT NULL,
                tenant_id      TEXT NOT NULL,
                skill_name     TEXT,
                parent_task_id TEXT,
                created_at     TEXT NOT NULL,
                task_data      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_tenant ON tasks (tenant_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_tasks_agent ON tasks (agent_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks (parent_task_id);

            CREATE TABLE IF NOT EXISTS reasoning_chains (
                id              TEXT PRIMARY KEY,
                task_id         TEXT NOT NULL,
                agent_id        TEXT NOT NULL,
                tenant_id       TEXT,
                status          TEXT NOT NULL,
                started_at      TEXT NOT NULL,
                completed_at    TEXT,
                metrics         TEXT NOT NULL,
                child_chain_ids TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chains_tenant
            ON reasoning_chains (tenant_id, started_at);
            CREATE INDEX IF NOT EXISTS idx_chains_task ON reasoning_chains (task_id);

            CREATE TABLE IF NOT EXISTS reasoning_steps (
                id          TEXT PRIMARY KEY,
                chain_id    TEXT NOT NULL
                            REFERENCES reasoning_chains(id) ON DELETE CASCADE,
                step_number INTEGER NOT NULL,
                step_data   TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_steps_chain
            ON reasoning_steps (chain_id, step_number);

            CREATE TABLE IF NOT EXISTS artifacts (
                id            TEXT NOT NULL,
                tenant_id     TEXT NOT NULL,
                artifact_data TEXT NOT NULL,
                PRIMARY KEY (tenant_id, id)
            );",
        )
        .map_err(storage)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Bridge a synchronous closure onto the blocking thread pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| Error::Storage(format!("connection lock poisoned: {e}")))?;
            f(&guard)
        })
        .await
        .map_err(|e| Error::Storage(format!("blocking task failed: {e}")))?
    }

    fn row_to_chain(conn: &Connection, chain_id: &str) -> Result<Option<ReasoningChain>> {
        let row = conn
            .query_row(
                "SELECT task_id, agent_id, tenant_id, status, started_at, completed_at, \
                 metrics, child_chain_ids \
                 FROM reasoning_chains WHERE id = ?1",
                params![chain_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(storage(other)),
            })?;

        let Some((
            task_id,
            agent_id,
            tenant_id,
            status,
            started_at,
            completed_at,
            metrics,
            child_chain_ids,
        )) = row
        else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT step_data FROM reasoning_steps \
                 WHERE chain_id = ?1 ORDER BY step_number ASC",
            )
            .map_err(storage)?;
        let steps = stmt
            .query_map(params![chain_id], |row| row.get::<_, String>(0))
            .map_err(storage)?
            .map(|raw| {
                raw.map_err(storage)
                    .and_then(|json| serde_json::from_str::<ReasoningStep>(&json).map_err(storage))
            })
            .collect::<Result<Vec<ReasoningStep>>>()?;

        Ok(Some(ReasoningChain {
            id: Uuid::parse_str(chain_id).map_err(storage)?,
            task_id,
            agent_id,
            tenant_id,
            status: ChainStatus::parse(&status)
                .ok_or_else(|| Error::Storage(format!("unknown chain status '{status}'")))?,
            started_at: parse_timestamp(&started_at)?,
            completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
            steps,
            metrics: serde_json::from_str::<ChainMetrics>(&metrics).map_err(storage)?,
            child_chain_ids: serde_json::from_str(&child_chain_ids).map_err(storage)?,
        }))
    }
}

#[async_trait]
impl TaskRepository for SqliteStore {
    async fn get(&self, task_id: &str, tenant_id: Option<&str>) -> Result<Option<Task>> {
        let task_id = task_id.to_owned();
        let tenant_id = tenant_id.map(str::to_owned);
        self.blocking(move |conn| {
            let raw: Option<(String, String)> = conn
                .query_row(
                    "SELECT tenant_id, task_data FROM tasks WHERE id = ?1",
                    params![task_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map(Some)
                .or_else(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(storage(other)),
                })?;

            match raw {
                Some((stored_tenant, data)) => {
                    if tenant_id.as_deref().is_some_and(|t| t != stored_tenant) {
                        return Ok(None);
                    }
                    Ok(Some(serde_json::from_str(&data).map_err(storage)?))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn save(&self, task: &Task) -> Result<()> {
        let task = task.clone();
        self.blocking(move |conn| {
            let data = serde_json::to_string(&task).map_err(storage)?;
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO tasks \
                     (id, agent_id, tenant_id, skill_name, parent_task_id, created_at, task_data) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        task.id,
                        task.agent_id,
                        task.tenant_id,
                        task.skill_name,
                        task.parent_task_id,
                        task.created_at.to_rfc3339(),
                        data,
                    ],
                )
                .map_err(storage)?;
            if inserted == 0 {
                return Err(Error::Validation(format!(
                    "task '{}' already exists",
                    task.id
                )));
            }
            Ok(())
        })
        .await
    }

    async fn update(&self, task: &Task) -> Result<()> {
        let task = task.clone();
        self.blocking(move |conn| {
            let data = serde_json::to_string(&task).map_err(storage)?;
            let updated = conn
                .execute(
                    "UPDATE tasks SET agent_id = ?2, tenant_id = ?3, skill_name = ?4, \
                     parent_task_id = ?5, task_data = ?6 WHERE id = ?1",
                    params![
                        task.id,
                        task.agent_id,
                        task.tenant_id,
                        task.skill_name,
                        task.parent_task_id,
                        data,
                    ],
                )
                .map_err(storage)?;
            if updated == 0 {
                return Err(Error::not_found("task", &task.id));
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, task_id: &str, tenant_id: Option<&str>) -> Result<bool> {
        let task_id = task_id.to_owned();
        let tenant_id = tenant_id.map(str::to_owned);
        self.blocking(move |conn| {
            let deleted = match tenant_id {
                Some(tenant) => conn
                    .execute(
                        "DELETE FROM tasks WHERE id = ?1 AND tenant_id = ?2",
                        params![task_id, tenant],
                    )
                    .map_err(storage)?,
                None => conn
                    .execute("DELETE FROM tasks WHERE id = ?1", params![task_id])
                    .map_err(storage)?,
            };
            Ok(deleted > 0)
        })
        .await
    }

    async fn list_by_agent(&self, agent_id: &str, limit: usize) -> Result<Vec<Task>> {
        let agent_id = agent_id.to_owned();
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT task_data FROM tasks WHERE agent_id = ?1 \
                     ORDER BY created_at DESC LIMIT ?2",
                )
                .map_err(storage)?;
            stmt.query_map(params![agent_id, limit as i64], |row| {
                row.get::<_, String>(0)
            })
            .map_err(storage)?
            .map(|raw| {
                raw.map_err(storage)
                    .and_then(|json| serde_json::from_str(&json).map_err(storage))
            })
            .collect()
        })
        .await
    }

    async fn list_by_parent(&self, parent_task_id: &str, limit: usize) -> Result<Vec<Task>> {
        let parent_task_id = parent_task_id.to_owned();
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT task_data FROM tasks WHERE parent_task_id = ?1 \
                     ORDER BY created_at ASC LIMIT ?2",
                )
                .map_err(storage)?;
            stmt.query_map(params![parent_task_id, limit as i64], |row| {
                row.get::<_, String>(0)
            })
            .map_err(storage)?
            .map(|raw| {
                raw.map_err(storage)
                    .and_then(|json| serde_json::from_str(&json).map_err(storage))
            })
            .collect()
        })
        .await
    }

    async fn list_by_tenant(
        &self,
        tenant_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Task>> {
        let tenant_id = tenant_id.to_owned();
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT task_data FROM tasks WHERE tenant_id = ?1 \
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                )
                .map_err(storage)?;
            stmt.query_map(params![tenant_id, limit as i64, offset as i64], |row| {
                row.get::<_, String>(0)
            })
            .map_err(storage)?
            .map(|raw| {
                raw.map_err(storage)
                    .and_then(|json| serde_json::from_str(&json).map_err(storage))
            })
            .collect()
        })
        .await
    }

    async fn list_by_skill(
        &self,
        tenant_id: &str,
        skill_name: &str,
        limit: usize,
    ) -> Result<Vec<Task>> {
        let tenant_id = tenant_id.to_owned();
        let skill_name = skill_name.to_owned();
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT task_data FROM tasks \
                     WHERE tenant_id = ?1 AND skill_name = ?2 \
                     ORDER BY created_at DESC LIMIT ?3",
                )
                .map_err(storage)?;
            stmt.query_map(params![tenant_id, skill_name, limit as i64], |row| {
                row.get::<_, String>(0)
            })
            .map_err(storage)?
            .map(|raw| {
                raw.map_err(storage)
                    .and_then(|json| serde_json::from_str(&json).map_err(storage))
            })
            .collect()
        })
        .await
    }
}

#[async_trait]
impl ChainRepository for SqliteStore {
    async fn save(&self, chain: &ReasoningChain) -> Result<()> {
        let chain = chain.clone();
        self.blocking(move |conn| {
            let metrics = serde_json::to_string(&chain.metrics).map_err(storage)?;
            let child_ids = serde_json::to_string(&chain.child_chain_ids).map_err(storage)?;

            let tx = conn.unchecked_transaction().map_err(storage)?;
            tx.execute(
                "INSERT OR REPLACE INTO reasoning_chains \
                 (id, task_id, agent_id, tenant_id, status, started_at, completed_at, \
                  metrics, child_chain_ids) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    chain.id.to_string(),
                    chain.task_id,
                    chain.agent_id,
                    chain.tenant_id,
                    chain.status.to_string(),
                    chain.started_at.to_rfc3339(),
                    chain.completed_at.map(|t| t.to_rfc3339()),
                    metrics,
                    child_ids,
                ],
            )
            .map_err(storage)?;

            // Re-saving replaces the step set wholesale.
            tx.execute(
                "DELETE FROM reasoning_steps WHERE chain_id = ?1",
                params![chain.id.to_string()],
            )
            .map_err(storage)?;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO reasoning_steps (id, chain_id, step_number, step_data) \
                         VALUES (?1, ?2, ?3, ?4)",
                    )
                    .map_err(storage)?;
                for step in &chain.steps {
                    let data = serde_json::to_string(step).map_err(storage)?;
                    stmt.execute(params![
                        step.id.to_string(),
                        chain.id.to_string(),
                        step.step_number,
                        data,
                    ])
                    .map_err(storage)?;
                }
            }
            tx.commit().map_err(storage)?;
            Ok(())
        })
        .await
    }

    async fn get_by_id(
        &self,
        chain_id: Uuid,
        tenant_id: Option<&str>,
    ) -> Result<Option<ReasoningChain>> {
        let tenant_id = tenant_id.map(str::to_owned);
        self.blocking(move |conn| {
            let chain = Self::row_to_chain(conn, &chain_id.to_string())?;
            Ok(chain.filter(|c| {
                tenant_id
                    .as_deref()
                    .is_none_or(|tenant| c.tenant_id.as_deref() == Some(tenant))
            }))
        })
        .await
    }

    async fn get_by_task(&self, task_id: &str) -> Result<Vec<ReasoningChain>> {
        let task_id = task_id.to_owned();
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id FROM reasoning_chains WHERE task_id = ?1 \
                     ORDER BY started_at ASC",
                )
                .map_err(storage)?;
            let ids = stmt
                .query_map(params![task_id], |row| row.get::<_, String>(0))
                .map_err(storage)?
                .collect::<std::result::Result<Vec<String>, _>>()
                .map_err(storage)?;

            ids.iter()
                .filter_map(|id| Self::row_to_chain(conn, id).transpose())
                .collect()
        })
        .await
    }

    async fn list_by_tenant(
        &self,
        tenant_id: &str,
        status: Option<ChainStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChainSummary>> {
        let tenant_id = tenant_id.to_owned();
        let status = status.map(|s| s.to_string());
        self.blocking(move |conn| {
            let sql = match status {
                Some(_) => {
                    "SELECT id, task_id, agent_id, tenant_id, status, started_at, \
                     completed_at, metrics \
                     FROM reasoning_chains WHERE tenant_id = ?1 AND status = ?2 \
                     ORDER BY started_at DESC LIMIT ?3 OFFSET ?4"
                }
                None => {
                    "SELECT id, task_id, agent_id, tenant_id, status, started_at, \
                     completed_at, metrics \
                     FROM reasoning_chains WHERE tenant_id = ?1 \
                     ORDER BY started_at DESC LIMIT ?2 OFFSET ?3"
                }
            };
            let mut stmt = conn.prepare(sql).map_err(storage)?;

            let map_row = |row: &rusqlite::Row<'_>| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                ))
            };
            let rows = match status {
                Some(status) => stmt
                    .query_map(
                        params![tenant_id, status, limit as i64, offset as i64],
                        map_row,
                    )
                    .map_err(storage)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(storage)?,
                None => stmt
                    .query_map(params![tenant_id, limit as i64, offset as i64], map_row)
                    .map_err(storage)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(storage)?,
            };

            rows.into_iter()
                .map(
                    |(id, task_id, agent_id, tenant, status, started, completed, metrics)| {
                        Ok(ChainSummary {
                            id: Uuid::parse_str(&id).map_err(storage)?,
                            task_id,
                            agent_id,
                            tenant_id: tenant,
                            status: ChainStatus::parse(&status).ok_or_else(|| {
                                Error::Storage(format!("unknown chain status '{status}'"))
                            })?,
                            started_at: parse_timestamp(&started)?,
                            completed_at: completed.as_deref().map(parse_timestamp).transpose()?,
                            metrics: serde_json::from_str(&metrics).map_err(storage)?,
                        })
                    },
                )
                .collect()
        })
        .await
    }

    async fn delete(&self, chain_id: Uuid) -> Result<bool> {
        self.blocking(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM reasoning_chains WHERE id = ?1",
                    params![chain_id.to_string()],
                )
                .map_err(storage)?;
            Ok(deleted > 0)
        })
        .await
    }
}

#[async_trait]
impl ArtifactStore for SqliteStore {
    async fn store(&self, artifact: &Artifact) -> Result<String> {
        let artifact = artifact.clone();
        self.blocking(move |conn| {
            let data = serde_json::to_string(&artifact).map_err(storage)?;
            conn.execute(
                "INSERT OR REPLACE INTO artifacts (id, tenant_id, artifact_data) \
                 VALUES (?1, ?2, ?3)",
                params![artifact.id, artifact.tenant_id, data],
            )
            .map_err(storage)?;
            Ok(artifact.id)
        })
        .await
    }

    async fn fetch(&self, artifact_id: &str, tenant_id: &str) -> Result<Option<Artifact>> {
        let artifact_id = artifact_id.to_owned();
        let tenant_id = tenant_id.to_owned();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT artifact_data FROM artifacts WHERE id = ?1 AND tenant_id = ?2",
                params![artifact_id, tenant_id],
                |row| row.get::<_, String>(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(storage(other)),
            })?
            .map(|json| serde_json::from_str(&json).map_err(storage))
            .transpose()
        })
        .await
    }

    async fn delete(&self, artifact_id: &str, tenant_id: &str) -> Result<bool> {
        let artifact_id = artifact_id.to_owned();
        let tenant_id = tenant_id.to_owned();
        self.blocking(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM artifacts WHERE id = ?1 AND tenant_id = ?2",
                    params![artifact_id, tenant_id],
                )
                .map_err(storage)?;
            Ok(deleted > 0)
        })
        .await
    }
}

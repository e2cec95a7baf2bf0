//! libSQL state store.
//!
//! The snapshot row holds everything except history; completed and failed
//! tasks live one row each in `task_outcomes` so appends never rewrite the
//! snapshot.

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, params};
use tracing::debug;

use super::traits::{StateStore, ensure_terminal};
use crate::agent::AgentState;
use crate::db::LibSqlDb;
use crate::error::StoreError;
use crate::task::{Task, TaskStatus};

/// Durable state store sharing a `LibSqlDb` with other backends.
#[derive(Clone)]
pub struct LibSqlStateStore {
    db: LibSqlDb,
}

impl LibSqlStateStore {
    pub fn new(db: LibSqlDb) -> Self {
        Self { db }
    }
}

fn query_err(op: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Query(format!("{op}: {e}"))
}

fn ser_err(e: serde_json::Error) -> StoreError {
    StoreError::Serialization(e.to_string())
}

async fn upsert_snapshot(conn: &Connection, agent_id: &str, body: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO agent_states (agent_id, snapshot, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (agent_id) DO UPDATE SET
            snapshot = excluded.snapshot,
            updated_at = excluded.updated_at",
        params![agent_id, body, Utc::now().to_rfc3339()],
    )
    .await
    .map_err(|e| query_err("upsert snapshot", e))?;
    Ok(())
}

async fn insert_outcome(conn: &Connection, agent_id: &str, task: &Task) -> Result<u64, StoreError> {
    let body = serde_json::to_string(task).map_err(ser_err)?;
    conn.execute(
        "INSERT INTO task_outcomes (agent_id, task_id, status, body, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (agent_id, task_id) DO NOTHING",
        params![
            agent_id,
            task.id.to_string(),
            task.status.to_string(),
            body,
            Utc::now().to_rfc3339()
        ],
    )
    .await
    .map_err(|e| query_err("insert outcome", e))
}

#[async_trait]
impl StateStore for LibSqlStateStore {
    async fn save_state(&self, agent_id: &str, state: &AgentState) -> Result<(), StoreError> {
        let mut snapshot = state.without_history();
        snapshot.agent_id = agent_id.to_string();
        let (completed, failed) = (&state.completed_tasks, &state.failed_tasks);
        let body = serde_json::to_string(&snapshot).map_err(ser_err)?;

        let conn = self.db.lock().await;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| query_err("begin save", e))?;

        upsert_snapshot(&tx, agent_id, &body).await?;

        tx.execute(
            "DELETE FROM task_outcomes WHERE agent_id = ?1",
            params![agent_id],
        )
        .await
        .map_err(|e| query_err("clear outcomes", e))?;

        for task in completed.iter().chain(failed.iter()) {
            insert_outcome(&tx, agent_id, task).await?;
        }

        tx.commit()
            .await
            .map_err(|e| query_err("commit save", e))?;

        debug!(
            agent_id,
            completed = completed.len(),
            failed = failed.len(),
            "Agent state saved"
        );
        Ok(())
    }

    async fn save_snapshot(&self, agent_id: &str, state: &AgentState) -> Result<(), StoreError> {
        let mut snapshot = state.without_history();
        snapshot.agent_id = agent_id.to_string();
        let body = serde_json::to_string(&snapshot).map_err(ser_err)?;

        let conn = self.db.lock().await;
        upsert_snapshot(&conn, agent_id, &body).await
    }

    async fn load_state(&self, agent_id: &str) -> Result<AgentState, StoreError> {
        let conn = self.db.lock().await;

        let mut rows = conn
            .query(
                "SELECT snapshot FROM agent_states WHERE agent_id = ?1",
                params![agent_id],
            )
            .await
            .map_err(|e| query_err("load snapshot", e))?;
        let mut state = match rows
            .next()
            .await
            .map_err(|e| query_err("load snapshot", e))?
        {
            Some(row) => {
                let body: String = row.get(0).map_err(|e| query_err("snapshot row", e))?;
                serde_json::from_str::<AgentState>(&body).map_err(ser_err)?
            }
            None => AgentState::new(agent_id),
        };
        drop(rows);

        let mut rows = conn
            .query(
                "SELECT status, body FROM task_outcomes WHERE agent_id = ?1 ORDER BY seq ASC",
                params![agent_id],
            )
            .await
            .map_err(|e| query_err("load outcomes", e))?;
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| query_err("load outcomes", e))?
        {
            let status: String = row.get(0).map_err(|e| query_err("outcome row", e))?;
            let body: String = row.get(1).map_err(|e| query_err("outcome row", e))?;
            let task: Task = serde_json::from_str(&body).map_err(ser_err)?;
            if status == TaskStatus::Completed.to_string() {
                state.completed_tasks.push(task);
            } else {
                state.failed_tasks.push(task);
            }
        }

        state.agent_id = agent_id.to_string();
        Ok(state)
    }

    async fn record_task_outcome(&self, agent_id: &str, task: &Task) -> Result<(), StoreError> {
        ensure_terminal(task)?;
        let conn = self.db.lock().await;
        let inserted = insert_outcome(&conn, agent_id, task).await?;
        if inserted == 0 {
            debug!(agent_id, task_id = %task.id, "Outcome already recorded");
        }
        Ok(())
    }
}

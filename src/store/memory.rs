//! In-memory state store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::traits::{StateStore, ensure_terminal};
use crate::agent::AgentState;
use crate::error::StoreError;
use crate::task::{Task, TaskStatus};

/// Process-local store. Snapshots are lost on exit.
#[derive(Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, AgentState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save_state(&self, agent_id: &str, state: &AgentState) -> Result<(), StoreError> {
        let mut snapshot = state.clone();
        snapshot.agent_id = agent_id.to_string();
        self.states
            .write()
            .await
            .insert(agent_id.to_string(), snapshot);
        Ok(())
    }

    async fn save_snapshot(&self, agent_id: &str, state: &AgentState) -> Result<(), StoreError> {
        let mut snapshot = state.without_history();
        snapshot.agent_id = agent_id.to_string();

        let mut states = self.states.write().await;
        if let Some(stored) = states.get_mut(agent_id) {
            snapshot.completed_tasks = std::mem::take(&mut stored.completed_tasks);
            snapshot.failed_tasks = std::mem::take(&mut stored.failed_tasks);
        }
        states.insert(agent_id.to_string(), snapshot);
        Ok(())
    }

    async fn load_state(&self, agent_id: &str) -> Result<AgentState, StoreError> {
        Ok(self
            .states
            .read()
            .await
            .get(agent_id)
            .cloned()
            .unwrap_or_else(|| AgentState::new(agent_id)))
    }

    async fn record_task_outcome(&self, agent_id: &str, task: &Task) -> Result<(), StoreError> {
        ensure_terminal(task)?;

        let mut states = self.states.write().await;
        let state = states
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentState::new(agent_id));

        let seen = state
            .completed_tasks
            .iter()
            .chain(state.failed_tasks.iter())
            .any(|t| t.id == task.id);
        if seen {
            debug!(agent_id, task_id = %task.id, "Outcome already recorded");
            return Ok(());
        }

        match task.status {
            TaskStatus::Completed => state.completed_tasks.push(task.clone()),
            _ => state.failed_tasks.push(task.clone()),
        }
        Ok(())
    }
}

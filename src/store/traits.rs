//! `StateStore` trait: single async interface for agent persistence.

use async_trait::async_trait;

use crate::agent::AgentState;
use crate::error::StoreError;
use crate::task::Task;

/// Backend-agnostic store for agent snapshots and terminal task outcomes.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Overwrite the stored snapshot for an agent, history included.
    async fn save_state(&self, agent_id: &str, state: &AgentState) -> Result<(), StoreError>;

    /// Overwrite everything but the history, which `record_task_outcome`
    /// maintains. Cheap enough to call on every slot change.
    async fn save_snapshot(&self, agent_id: &str, state: &AgentState) -> Result<(), StoreError>;

    /// Last saved snapshot, or a fresh `AgentState` if none exists.
    async fn load_state(&self, agent_id: &str) -> Result<AgentState, StoreError>;

    /// Append a terminal task to the agent's completed or failed history.
    ///
    /// Rejects non-terminal tasks with `StoreError::NotTerminal`. Recording
    /// the same task id twice is a no-op.
    async fn record_task_outcome(&self, agent_id: &str, task: &Task) -> Result<(), StoreError>;
}

pub(crate) fn ensure_terminal(task: &Task) -> Result<(), StoreError> {
    if task.is_terminal() {
        Ok(())
    } else {
        Err(StoreError::NotTerminal {
            id: task.id,
            status: task.status,
        })
    }
}

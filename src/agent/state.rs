//! Agent lifecycle status and the runtime state snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskId};

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Stopped,
    Running,
    Paused,
    /// Draining in-flight work during `stop()`.
    Stopping,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
        };
        write!(f, "{s}")
    }
}

/// Everything the runner knows about one agent.
///
/// `current_tasks` is keyed by worker slot; a `BTreeMap` keeps snapshots
/// and free-slot lookups deterministic. Together with `awaiting_retry` it
/// holds every task that has left the queue without reaching a terminal
/// state, which is what `AgentRunner::restore` puts back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub completed_tasks: Vec<Task>,
    #[serde(default)]
    pub failed_tasks: Vec<Task>,
    #[serde(default)]
    pub current_tasks: BTreeMap<usize, Task>,
    /// Tasks sleeping out a retry delay. They are in neither the queue
    /// nor a worker slot.
    #[serde(default)]
    pub awaiting_retry: BTreeMap<TaskId, Task>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl AgentState {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            ..Self::default()
        }
    }

    /// Lowest slot index in `0..max` not currently occupied.
    pub fn free_slot(&self, max: usize) -> Option<usize> {
        (0..max).find(|slot| !self.current_tasks.contains_key(slot))
    }

    /// Look a task up in the worker slots, the retry timers and the history.
    pub fn find_task(&self, id: TaskId) -> Option<&Task> {
        self.current_tasks
            .values()
            .chain(self.awaiting_retry.values())
            .chain(self.completed_tasks.iter())
            .chain(self.failed_tasks.iter())
            .find(|t| t.id == id)
    }

    /// Copy of everything except the completed and failed history.
    pub fn without_history(&self) -> AgentState {
        AgentState {
            agent_id: self.agent_id.clone(),
            status: self.status,
            completed_tasks: Vec::new(),
            failed_tasks: Vec::new(),
            current_tasks: self.current_tasks.clone(),
            awaiting_retry: self.awaiting_retry.clone(),
            started_at: self.started_at,
            stopped_at: self.stopped_at,
        }
    }

    /// Tasks dequeued but not finished, deduplicated by id.
    pub fn unfinished(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = Vec::new();
        for task in self.current_tasks.values().chain(self.awaiting_retry.values()) {
            if !task.is_terminal() && !tasks.iter().any(|t| t.id == task.id) {
                tasks.push(task.clone());
            }
        }
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    #[test]
    fn new_state_is_stopped_and_empty() {
        let state = AgentState::new("agent-1");
        assert_eq!(state.agent_id, "agent-1");
        assert_eq!(state.status, AgentStatus::Stopped);
        assert!(state.completed_tasks.is_empty());
        assert!(state.failed_tasks.is_empty());
        assert!(state.current_tasks.is_empty());
        assert!(state.awaiting_retry.is_empty());
        assert!(state.started_at.is_none());
    }

    #[test]
    fn free_slot_picks_lowest_gap() {
        let mut state = AgentState::new("agent-1");
        assert_eq!(state.free_slot(3), Some(0));

        state.current_tasks.insert(0, Task::new("echo", serde_json::json!(0)));
        state.current_tasks.insert(2, Task::new("echo", serde_json::json!(2)));
        assert_eq!(state.free_slot(3), Some(1));

        state.current_tasks.insert(1, Task::new("echo", serde_json::json!(1)));
        assert_eq!(state.free_slot(3), None);
    }

    #[test]
    fn find_task_searches_slots_and_history() {
        let mut state = AgentState::new("agent-1");
        let running = Task::new("echo", serde_json::json!(1));
        let mut done = Task::new("echo", serde_json::json!(2));
        done.status = TaskStatus::Completed;
        state.current_tasks.insert(0, running.clone());
        state.completed_tasks.push(done.clone());

        assert_eq!(state.find_task(running.id).map(|t| t.id), Some(running.id));
        assert_eq!(state.find_task(done.id).map(|t| t.id), Some(done.id));
        assert!(state.find_task(uuid::Uuid::new_v4()).is_none());
    }

    #[test]
    fn unfinished_covers_slots_and_retry_timers_once() {
        let mut state = AgentState::new("agent-1");
        let running = Task::new("echo", serde_json::json!(1));
        let waiting = Task::new("echo", serde_json::json!(2));
        let mut done = Task::new("echo", serde_json::json!(3));
        done.status = TaskStatus::Completed;

        state.current_tasks.insert(0, running.clone());
        // Briefly held in two places while a retry is handed back.
        state.current_tasks.insert(1, running.clone());
        state.awaiting_retry.insert(waiting.id, waiting.clone());
        state.current_tasks.insert(2, done);

        let ids: Vec<_> = state.unfinished().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![running.id, waiting.id]);
        assert_eq!(state.find_task(waiting.id).map(|t| t.id), Some(waiting.id));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AgentStatus::Stopping).unwrap(),
            "\"stopping\""
        );
        assert_eq!(AgentStatus::Paused.to_string(), "paused");
    }

    #[test]
    fn snapshot_roundtrips_through_json() {
        let mut state = AgentState::new("agent-1");
        state.status = AgentStatus::Running;
        state.started_at = Some(Utc::now());
        state.current_tasks.insert(1, Task::new("echo", serde_json::json!({"x": 1})));
        let waiting = Task::new("echo", serde_json::json!({"x": 2}));
        state.awaiting_retry.insert(waiting.id, waiting);

        let json = serde_json::to_string(&state).unwrap();
        let back: AgentState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}

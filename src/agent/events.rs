//! Runner event stream.
//!
//! Every lifecycle change and task transition is broadcast as a
//! `RunnerEvent`. Subscribers that fall behind lose the oldest events
//! (`broadcast` lag semantics); nothing in the runner waits on them.

use serde::{Deserialize, Serialize};

use super::state::AgentStatus;
use crate::task::TaskId;

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events broadcast by an `AgentRunner`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunnerEvent {
    /// Agent lifecycle status changed.
    StatusChanged {
        agent_id: String,
        status: AgentStatus,
    },
    /// A task was accepted into the queue.
    TaskQueued {
        task_id: TaskId,
        task_type: String,
        priority: i32,
    },
    /// A worker picked up a task.
    TaskStarted {
        task_id: TaskId,
        task_type: String,
        slot: usize,
        /// 1-based attempt number.
        attempt: u32,
    },
    /// An attempt failed and the task will run again.
    TaskRetrying {
        task_id: TaskId,
        retry_count: u32,
        delay_ms: u64,
        error: String,
    },
    TaskCompleted {
        task_id: TaskId,
        duration_ms: u64,
    },
    TaskFailed {
        task_id: TaskId,
        error: String,
    },
}

impl RunnerEvent {
    /// Task the event refers to, if any.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::StatusChanged { .. } => None,
            Self::TaskQueued { task_id, .. }
            | Self::TaskStarted { task_id, .. }
            | Self::TaskRetrying { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFailed { task_id, .. } => Some(*task_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = RunnerEvent::StatusChanged {
            agent_id: "agent-1".into(),
            status: AgentStatus::Running,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["status"], "running");
        assert_eq!(event.task_id(), None);
    }

    #[test]
    fn task_id_extracted_from_task_events() {
        let id = uuid::Uuid::new_v4();
        let event = RunnerEvent::TaskRetrying {
            task_id: id,
            retry_count: 1,
            delay_ms: 0,
            error: "boom".into(),
        };
        assert_eq!(event.task_id(), Some(id));

        let json = serde_json::to_string(&event).unwrap();
        let back: RunnerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}

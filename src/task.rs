//! Task model and its state machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::error::TaskError;
use crate::skills::SkillOutput;

/// Unique task identifier.
pub type TaskId = Uuid;

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the queue.
    Pending,
    /// Occupying a worker slot.
    Running,
    /// Failed an attempt and is waiting to be re-enqueued.
    Retrying,
    /// Finished successfully.
    Completed,
    /// Failed with no retries left.
    Failed,
}

impl TaskStatus {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            (Pending, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Retrying)
                | (Retrying, Pending)
                | (Retrying, Failed)
        )
    }

    /// Completed and Failed are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Caller input for `AgentRunner::add_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Skill lookup key.
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl TaskSpec {
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            task_type: task_type.into(),
            payload,
            priority: None,
            max_retries: None,
            timeout_ms: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }
}

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: String,
    pub payload: serde_json::Value,
    /// Higher is dispatched first.
    pub priority: i32,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Per-task override of the agent timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Present only once Completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SkillOutput>,
    /// Present only once terminally Failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Start of the most recent attempt.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task with default priority and no retries.
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            payload,
            priority: 0,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries: 0,
            timeout_ms: None,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Build a task from caller input, filling defaults from the agent config.
    pub fn from_spec(spec: TaskSpec, config: &AgentConfig) -> Self {
        Self {
            priority: spec.priority.unwrap_or(0),
            max_retries: spec.max_retries.unwrap_or(config.retry_attempts),
            timeout_ms: spec.timeout_ms,
            ..Self::new(spec.task_type, spec.payload)
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Effective wall-clock budget for one attempt.
    pub fn timeout(&self, config: &AgentConfig) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.timeout())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether another attempt is allowed after a failure.
    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Transition to a new state, updating timestamps.
    pub fn transition_to(&mut self, target: TaskStatus) -> Result<(), TaskError> {
        if !self.status.can_transition_to(target) {
            return Err(TaskError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        match target {
            TaskStatus::Running => self.started_at = Some(Utc::now()),
            TaskStatus::Completed | TaskStatus::Failed => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    /// Mark the task completed with the skill's output.
    pub fn complete(&mut self, output: SkillOutput) -> Result<(), TaskError> {
        self.transition_to(TaskStatus::Completed)?;
        self.result = Some(output);
        self.error = None;
        Ok(())
    }

    /// Mark the task terminally failed.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TaskError> {
        self.transition_to(TaskStatus::Failed)?;
        self.error = Some(error.into());
        self.result = None;
        Ok(())
    }

    /// Consume one retry and move to Retrying.
    pub fn begin_retry(&mut self) -> Result<(), TaskError> {
        self.transition_to(TaskStatus::Retrying)?;
        self.retry_count += 1;
        Ok(())
    }

    /// Put a task that was interrupted mid-attempt back into Pending.
    ///
    /// Used when recovering tasks that were dequeued but never reached a
    /// terminal state. The interrupted attempt does not count as a retry.
    pub fn reset_for_recovery(&mut self) {
        if !self.is_terminal() {
            self.status = TaskStatus::Pending;
            self.started_at = None;
        }
    }

    /// Wall-clock duration of the attempt that reached a terminal state.
    pub fn execution_time(&self) -> Option<Duration> {
        let (start, end) = (self.started_at?, self.completed_at?);
        end.signed_duration_since(start).to_std().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_valid() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Retrying));
        assert!(TaskStatus::Retrying.can_transition_to(TaskStatus::Pending));
        assert!(TaskStatus::Retrying.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn status_transitions_invalid() {
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Retrying.is_terminal());
    }

    #[test]
    fn from_spec_uses_config_defaults() {
        let config = AgentConfig::new("growth").with_retry_attempts(4);
        let task = Task::from_spec(TaskSpec::new("echo", serde_json::json!({"x": 1})), &config);
        assert_eq!(task.priority, 0);
        assert_eq!(task.max_retries, 4);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.timeout(&config), config.timeout());
    }

    #[test]
    fn from_spec_overrides() {
        let config = AgentConfig::new("growth");
        let spec = TaskSpec::new("echo", serde_json::Value::Null)
            .with_priority(7)
            .with_max_retries(1)
            .with_timeout(Duration::from_millis(40));
        let task = Task::from_spec(spec, &config);
        assert_eq!(task.priority, 7);
        assert_eq!(task.max_retries, 1);
        assert_eq!(task.timeout(&config), Duration::from_millis(40));
    }

    #[test]
    fn lifecycle_sets_timestamps() {
        let mut task = Task::new("echo", serde_json::Value::Null);
        task.transition_to(TaskStatus::Running).unwrap();
        assert!(task.started_at.is_some());
        task.complete(SkillOutput::new(serde_json::json!("ok"))).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
        assert!(task.execution_time().is_some());
        assert!(task.error.is_none());
    }

    #[test]
    fn terminal_task_rejects_further_transitions() {
        let mut task = Task::new("echo", serde_json::Value::Null);
        task.transition_to(TaskStatus::Running).unwrap();
        task.fail("boom").unwrap();
        let err = task.transition_to(TaskStatus::Pending).unwrap_err();
        assert!(matches!(err, TaskError::InvalidTransition { .. }));
        assert_eq!(task.error.as_deref(), Some("boom"));
    }

    #[test]
    fn retry_consumes_budget() {
        let mut task = Task::new("boom", serde_json::Value::Null).with_max_retries(1);
        task.transition_to(TaskStatus::Running).unwrap();
        assert!(task.has_retries_left());
        task.begin_retry().unwrap();
        assert_eq!(task.retry_count, 1);
        assert_eq!(task.status, TaskStatus::Retrying);
        task.transition_to(TaskStatus::Pending).unwrap();
        task.transition_to(TaskStatus::Running).unwrap();
        assert!(!task.has_retries_left());
    }

    #[test]
    fn recovery_resets_running_task() {
        let mut task = Task::new("echo", serde_json::Value::Null);
        task.transition_to(TaskStatus::Running).unwrap();
        task.reset_for_recovery();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.started_at.is_none());
    }

    #[test]
    fn task_serializes_type_key() {
        let task = Task::new("publish_post", serde_json::json!({"text": "hi"}));
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "publish_post");
        assert_eq!(json["status"], "pending");
        let parsed: Task = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, task);
    }

    #[test]
    fn spec_parses_from_json_line() {
        let spec: TaskSpec =
            serde_json::from_str(r#"{"type": "echo", "payload": {"x": 1}, "priority": 5}"#).unwrap();
        assert_eq!(spec.task_type, "echo");
        assert_eq!(spec.priority, Some(5));
        assert_eq!(spec.max_retries, None);
    }
}

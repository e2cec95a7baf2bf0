//! Error types for the agent runner.

use std::time::Duration;

use uuid::Uuid;

use crate::agent::AgentStatus;
use crate::task::TaskStatus;

/// Top-level error type for the runner.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Skill registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Task execution error: {0}")]
    Execution(#[from] TaskExecutionError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Lifecycle misuse. Always surfaced to the caller, never retried.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Agent {agent_id} is already running (status {status})")]
    AlreadyRunning {
        agent_id: String,
        status: AgentStatus,
    },

    #[error("Cannot {operation} agent {agent_id} while {status}")]
    InvalidState {
        agent_id: String,
        operation: &'static str,
        status: AgentStatus,
    },
}

/// Skill registry errors. Configuration faults, never retried.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Skill already registered for task type {task_type}")]
    Duplicate { task_type: String },

    #[error("No skill registered for task type {task_type}")]
    NotFound { task_type: String },

    #[error("Invalid task type name: {task_type:?}")]
    InvalidName { task_type: String },
}

/// A single failed attempt at running a task. Retried up to `max_retries`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskExecutionError {
    #[error("Skill {task_type} failed: {reason}")]
    Failed { task_type: String, reason: String },

    #[error("Skill {task_type} timed out after {timeout:?}")]
    TimedOut { task_type: String, timeout: Duration },

    #[error("Skill {task_type} panicked: {reason}")]
    Panicked { task_type: String, reason: String },
}

/// Task queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Task {id} is already queued")]
    DuplicateTask { id: Uuid },

    #[error("Queue backend error: {0}")]
    Backend(String),

    #[error("Queue serialization error: {0}")]
    Serialization(String),

    /// An entry whose body no longer parses. It has been removed from the
    /// queue; the raw body travels with the error so the caller can record it.
    #[error("Queue entry {task_id} is unreadable: {reason}")]
    CorruptEntry {
        task_id: String,
        body: String,
        reason: String,
    },
}

/// State store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Task {id} is not terminal (status {status})")]
    NotTerminal { id: Uuid, status: TaskStatus },
}

/// Task state machine errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {id} cannot transition from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Result type alias for the runner.
pub type Result<T> = std::result::Result<T, Error>;

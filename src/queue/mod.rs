//! Task queue contract and backends.
//!
//! Dispatch order is highest `priority` first, FIFO among equal priorities.
//! A queue only holds pending work: once a task is dequeued, recovering it
//! after a crash is the runner's responsibility (see `AgentRunner::restore`).

pub mod libsql;
pub mod memory;

use async_trait::async_trait;

use crate::error::QueueError;
use crate::task::Task;

pub use self::libsql::LibSqlTaskQueue;
pub use self::memory::InMemoryTaskQueue;

/// Ordered holding area for pending tasks.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Insert a task. Fails with `QueueError::DuplicateTask` if its id is already queued.
    async fn enqueue(&self, task: Task) -> Result<(), QueueError>;

    /// Remove and return the next task in dispatch order.
    async fn dequeue(&self) -> Result<Option<Task>, QueueError>;

    /// Next task in dispatch order, without removing it.
    async fn peek(&self) -> Result<Option<Task>, QueueError>;

    /// Number of queued tasks.
    async fn size(&self) -> Result<usize, QueueError>;

    /// Every queued task, in dispatch order.
    async fn list(&self) -> Result<Vec<Task>, QueueError>;

    async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.size().await? == 0)
    }
}

//! In-memory priority queue.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::TaskQueue;
use crate::error::QueueError;
use crate::task::{Task, TaskId};

/// Heap entry. Higher priority wins; among equals the lower sequence number
/// (earlier insertion) wins.
#[derive(Debug, Clone)]
struct QueuedTask {
    priority: i32,
    seq: u64,
    task: Task,
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<QueuedTask>,
    ids: HashSet<TaskId>,
    next_seq: u64,
}

/// Single-process queue backed by a binary heap.
#[derive(Default)]
pub struct InMemoryTaskQueue {
    inner: Mutex<Inner>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        if !inner.ids.insert(task.id) {
            return Err(QueueError::DuplicateTask { id: task.id });
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        debug!(task_id = %task.id, priority = task.priority, seq, "Task enqueued");
        inner.heap.push(QueuedTask {
            priority: task.priority,
            seq,
            task,
        });
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Task>, QueueError> {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.heap.pop() else {
            return Ok(None);
        };
        inner.ids.remove(&entry.task.id);
        Ok(Some(entry.task))
    }

    async fn peek(&self) -> Result<Option<Task>, QueueError> {
        Ok(self.inner.lock().await.heap.peek().map(|e| e.task.clone()))
    }

    async fn size(&self) -> Result<usize, QueueError> {
        Ok(self.inner.lock().await.heap.len())
    }

    async fn list(&self) -> Result<Vec<Task>, QueueError> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<&QueuedTask> = inner.heap.iter().collect();
        entries.sort_by(|a, b| b.cmp(a));
        Ok(entries.into_iter().map(|e| e.task.clone()).collect())
    }
}

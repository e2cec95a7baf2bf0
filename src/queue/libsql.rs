//! libSQL-backed persistent queue.

use async_trait::async_trait;
use chrono::Utc;
use libsql::params;
use tracing::{debug, warn};

use super::TaskQueue;
use crate::db::LibSqlDb;
use crate::error::QueueError;
use crate::task::Task;

/// Queue that survives process restarts. Several named queues can share one
/// database.
#[derive(Clone)]
pub struct LibSqlTaskQueue {
    db: LibSqlDb,
    name: String,
}

impl LibSqlTaskQueue {
    pub fn new(db: LibSqlDb, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
        }
    }
}

fn backend(op: &str, e: impl std::fmt::Display) -> QueueError {
    QueueError::Backend(format!("{op}: {e}"))
}

fn parse_body(body: &str) -> Result<Task, QueueError> {
    serde_json::from_str(body).map_err(|e| QueueError::Serialization(e.to_string()))
}

#[async_trait]
impl TaskQueue for LibSqlTaskQueue {
    async fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        let body =
            serde_json::to_string(&task).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let conn = self.db.lock().await;
        let inserted = conn
            .execute(
                "INSERT INTO task_queue (queue_name, task_id, priority, body, enqueued_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (queue_name, task_id) DO NOTHING",
                params![
                    self.name.as_str(),
                    task.id.to_string(),
                    task.priority as i64,
                    body,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| backend("enqueue", e))?;

        if inserted == 0 {
            return Err(QueueError::DuplicateTask { id: task.id });
        }
        debug!(queue = %self.name, task_id = %task.id, priority = task.priority, "Task persisted to queue");
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Task>, QueueError> {
        let conn = self.db.lock().await;
        let mut rows = conn
            .query(
                "SELECT seq, task_id, body FROM task_queue WHERE queue_name = ?1
                 ORDER BY priority DESC, seq ASC LIMIT 1",
                params![self.name.as_str()],
            )
            .await
            .map_err(|e| backend("dequeue", e))?;

        let Some(row) = rows.next().await.map_err(|e| backend("dequeue", e))? else {
            return Ok(None);
        };
        let seq: i64 = row.get(0).map_err(|e| backend("dequeue row", e))?;
        let task_id: String = row.get(1).map_err(|e| backend("dequeue row", e))?;
        let body: String = row.get(2).map_err(|e| backend("dequeue row", e))?;
        drop(rows);

        // Parse before deleting so an unreadable row is reported, not dropped.
        let parsed = serde_json::from_str::<Task>(&body);
        conn.execute("DELETE FROM task_queue WHERE seq = ?1", params![seq])
            .await
            .map_err(|e| backend("dequeue delete", e))?;

        match parsed {
            Ok(task) => Ok(Some(task)),
            Err(e) => {
                warn!(queue = %self.name, task_id = %task_id, error = %e, "Removed unreadable task from queue");
                Err(QueueError::CorruptEntry {
                    task_id,
                    body,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn peek(&self) -> Result<Option<Task>, QueueError> {
        let conn = self.db.lock().await;
        let mut rows = conn
            .query(
                "SELECT body FROM task_queue WHERE queue_name = ?1
                 ORDER BY priority DESC, seq ASC LIMIT 1",
                params![self.name.as_str()],
            )
            .await
            .map_err(|e| backend("peek", e))?;

        match rows.next().await.map_err(|e| backend("peek", e))? {
            Some(row) => {
                let body: String = row.get(0).map_err(|e| backend("peek row", e))?;
                parse_body(&body).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn size(&self) -> Result<usize, QueueError> {
        let conn = self.db.lock().await;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM task_queue WHERE queue_name = ?1",
                params![self.name.as_str()],
            )
            .await
            .map_err(|e| backend("size", e))?;

        match rows.next().await.map_err(|e| backend("size", e))? {
            Some(row) => {
                let count: i64 = row.get(0).map_err(|e| backend("size row", e))?;
                Ok(count.max(0) as usize)
            }
            None => Ok(0),
        }
    }

    async fn list(&self) -> Result<Vec<Task>, QueueError> {
        let conn = self.db.lock().await;
        let mut rows = conn
            .query(
                "SELECT body FROM task_queue WHERE queue_name = ?1
                 ORDER BY priority DESC, seq ASC",
                params![self.name.as_str()],
            )
            .await
            .map_err(|e| backend("list", e))?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| backend("list", e))? {
            let body: String = row.get(0).map_err(|e| backend("list row", e))?;
            tasks.push(parse_body(&body)?);
        }
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_queue(name: &str) -> LibSqlTaskQueue {
        LibSqlTaskQueue::new(LibSqlDb::open_memory().await.unwrap(), name)
    }

    fn task(priority: i32) -> Task {
        Task::new("echo", serde_json::json!({"p": priority})).with_priority(priority)
    }

    #[tokio::test]
    async fn priority_then_fifo() {
        let queue = test_queue("agent-1").await;
        let first_low = task(1);
        let high = task(5);
        let second_low = task(1);
        let ids = (first_low.id, high.id, second_low.id);

        queue.enqueue(first_low).await.unwrap();
        queue.enqueue(high).await.unwrap();
        queue.enqueue(second_low).await.unwrap();
        assert_eq!(queue.size().await.unwrap(), 3);

        assert_eq!(queue.dequeue().await.unwrap().unwrap().id, ids.1);
        assert_eq!(queue.dequeue().await.unwrap().unwrap().id, ids.0);
        assert_eq!(queue.dequeue().await.unwrap().unwrap().id, ids.2);
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unreadable_entry_is_removed_and_reported() {
        let queue = test_queue("agent-1").await;
        let good = task(0);
        queue
            .db
            .lock()
            .await
            .execute(
                "INSERT INTO task_queue (queue_name, task_id, priority, body, enqueued_at)
                 VALUES ('agent-1', 'broken-1', 9, '{not json', '2024-01-01T00:00:00Z')",
                (),
            )
            .await
            .unwrap();
        queue.enqueue(good.clone()).await.unwrap();

        match queue.dequeue().await {
            Err(QueueError::CorruptEntry { task_id, body, .. }) => {
                assert_eq!(task_id, "broken-1");
                assert_eq!(body, "{not json");
            }
            other => panic!("expected corrupt entry, got {other:?}"),
        }
        assert_eq!(queue.size().await.unwrap(), 1);
        assert_eq!(queue.dequeue().await.unwrap().unwrap().id, good.id);
    }

    #[tokio::test]
    async fn duplicate_id_rejected() {
        let queue = test_queue("agent-1").await;
        let t = task(0);
        queue.enqueue(t.clone()).await.unwrap();
        let err = queue.enqueue(t).await.unwrap_err();
        assert!(matches!(err, QueueError::DuplicateTask { .. }));
        assert_eq!(queue.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn named_queues_are_isolated() {
        let db = LibSqlDb::open_memory().await.unwrap();
        let a = LibSqlTaskQueue::new(db.clone(), "a");
        let b = LibSqlTaskQueue::new(db, "b");

        let t = task(0);
        a.enqueue(t.clone()).await.unwrap();
        // Same id in another queue is not a duplicate.
        b.enqueue(t.clone()).await.unwrap();

        assert_eq!(a.dequeue().await.unwrap().unwrap().id, t.id);
        assert!(a.is_empty().await.unwrap());
        assert_eq!(b.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn peek_and_list_preserve_payload() {
        let queue = test_queue("agent-1").await;
        let low = task(1);
        let high = task(2);
        queue.enqueue(low.clone()).await.unwrap();
        queue.enqueue(high.clone()).await.unwrap();

        let peeked = queue.peek().await.unwrap().unwrap();
        assert_eq!(peeked, high);

        let listed = queue.list().await.unwrap();
        assert_eq!(listed, vec![high, low]);
        assert_eq!(queue.size().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let t = task(3);

        {
            let queue = LibSqlTaskQueue::new(LibSqlDb::open_local(&path).await.unwrap(), "agent-1");
            queue.enqueue(t.clone()).await.unwrap();
        }

        let queue = LibSqlTaskQueue::new(LibSqlDb::open_local(&path).await.unwrap(), "agent-1");
        assert_eq!(queue.size().await.unwrap(), 1);
        assert!(matches!(
            queue.enqueue(t.clone()).await,
            Err(QueueError::DuplicateTask { .. })
        ));
        assert_eq!(queue.dequeue().await.unwrap().unwrap(), t);
    }
}

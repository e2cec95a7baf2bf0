//! Agent runner: lifecycle, dispatch loop and worker pool.
//!
//! One coordinator task pulls from the queue while the agent is Running and
//! hands each task to a spawned worker. A semaphore with
//! `max_concurrent_tasks` permits bounds the pool; every worker holds one
//! permit for the lifetime of its task, so `stop()` drains by acquiring all
//! of them. The lifecycle status lives in a `watch` channel the coordinator
//! and retry timers observe, so nothing polls.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, RwLock, Semaphore, broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::events::{EVENT_CHANNEL_CAPACITY, RunnerEvent};
use super::metrics::AgentMetrics;
use super::state::{AgentState, AgentStatus};
use crate::config::AgentConfig;
use crate::error::{ConfigError, Error, LifecycleError, QueueError, RegistryError, TaskExecutionError};
use crate::queue::{InMemoryTaskQueue, TaskQueue};
use crate::skills::{SkillOutput, SkillRegistry};
use crate::store::{InMemoryStateStore, StateStore};
use crate::task::{Task, TaskId, TaskSpec, TaskStatus};

/// Pause before retrying after the queue backend returns an error.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_millis(250);

/// Task type given to queue entries that could not be parsed.
const UNREADABLE_TASK_TYPE: &str = "unreadable";

/// Why an attempt did not produce output.
enum AttemptError {
    /// No skill for the task type. Terminal on the first attempt.
    Unroutable(RegistryError),
    /// The skill ran and failed, timed out, or panicked. Retryable.
    Execution(TaskExecutionError),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unroutable(e) => write!(f, "{e}"),
            Self::Execution(e) => write!(f, "{e}"),
        }
    }
}

struct RunnerInner {
    config: Arc<AgentConfig>,
    registry: Arc<SkillRegistry>,
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn StateStore>,
    state: RwLock<AgentState>,
    status_tx: watch::Sender<AgentStatus>,
    /// Woken on enqueue so an idle coordinator picks work up.
    wake: Notify,
    /// Woken whenever the runner may have become idle.
    idle: Notify,
    permits: Arc<Semaphore>,
    /// Timers for tasks sleeping out a retry delay.
    delayed: Mutex<JoinSet<()>>,
    events: broadcast::Sender<RunnerEvent>,
}

/// Runs tasks for one agent.
pub struct AgentRunner {
    inner: Arc<RunnerInner>,
    /// Serialises lifecycle operations and holds the coordinator handle.
    lifecycle: Mutex<Option<JoinHandle<()>>>,
}

impl AgentRunner {
    /// Create a stopped runner over the given backends.
    pub fn new(
        config: AgentConfig,
        registry: Arc<SkillRegistry>,
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (status_tx, _) = watch::channel(AgentStatus::Stopped);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        let state = AgentState::new(config.id.clone());

        Ok(Self {
            inner: Arc::new(RunnerInner {
                config: Arc::new(config),
                registry,
                queue,
                store,
                state: RwLock::new(state),
                status_tx,
                wake: Notify::new(),
                idle: Notify::new(),
                permits,
                delayed: Mutex::new(JoinSet::new()),
                events,
            }),
            lifecycle: Mutex::new(None),
        })
    }

    /// Runner with in-memory queue and state store.
    pub fn in_memory(config: AgentConfig, registry: Arc<SkillRegistry>) -> Result<Self, ConfigError> {
        Self::new(
            config,
            registry,
            Arc::new(InMemoryTaskQueue::new()),
            Arc::new(InMemoryStateStore::new()),
        )
    }

    /// Rebuild a stopped runner from the last stored snapshot.
    ///
    /// History and timestamps are restored. Tasks that occupied a worker
    /// slot or were waiting out a retry delay when the snapshot was taken
    /// never reached a terminal state, so they go back into the queue as
    /// Pending with their retry count kept.
    pub async fn restore(
        config: AgentConfig,
        registry: Arc<SkillRegistry>,
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, Error> {
        let runner = Self::new(config, registry, queue, store)?;
        let inner = &runner.inner;
        let saved = inner.store.load_state(&inner.config.id).await?;

        let orphans = saved.unfinished();
        {
            let mut state = inner.state.write().await;
            state.completed_tasks = saved.completed_tasks;
            state.failed_tasks = saved.failed_tasks;
            state.started_at = saved.started_at;
            state.stopped_at = saved.stopped_at;
        }

        let mut recovered = 0usize;
        for mut task in orphans {
            // Finished just before the crash, after the snapshot was taken.
            if inner.state.read().await.find_task(task.id).is_some() {
                continue;
            }
            task.reset_for_recovery();
            match inner.queue.enqueue(task).await {
                Ok(()) => recovered += 1,
                Err(QueueError::DuplicateTask { id }) => {
                    debug!(agent_id = %inner.config.id, task_id = %id, "Orphaned task already queued");
                }
                Err(e) => return Err(e.into()),
            }
        }
        inner.checkpoint().await;

        info!(agent_id = %inner.config.id, recovered, "Agent state restored");
        Ok(runner)
    }

    pub fn agent_id(&self) -> &str {
        &self.inner.config.id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<SkillRegistry> {
        &self.inner.registry
    }

    pub fn status(&self) -> AgentStatus {
        *self.inner.status_tx.borrow()
    }

    /// Subscribe to runner events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.inner.events.subscribe()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Start dispatching. Fails if already Running or Paused.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        let mut handle = self.lifecycle.lock().await;
        let status = self.status();
        if matches!(status, AgentStatus::Running | AgentStatus::Paused) {
            return Err(LifecycleError::AlreadyRunning {
                agent_id: self.inner.config.id.clone(),
                status,
            });
        }

        {
            let mut state = self.inner.state.write().await;
            state.started_at = Some(Utc::now());
            state.stopped_at = None;
        }
        self.inner.set_status(AgentStatus::Running).await;

        let inner = Arc::clone(&self.inner);
        *handle = Some(tokio::spawn(inner.dispatch_loop()));

        self.inner.persist().await;
        info!(
            agent_id = %self.inner.config.id,
            max_concurrent_tasks = self.inner.config.max_concurrent_tasks,
            "Agent started"
        );
        Ok(())
    }

    /// Stop pulling new tasks. In-flight tasks keep running.
    pub async fn pause(&self) -> Result<(), LifecycleError> {
        let _guard = self.lifecycle.lock().await;
        self.require(AgentStatus::Running, "pause")?;
        self.inner.set_status(AgentStatus::Paused).await;
        self.inner.persist().await;
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), LifecycleError> {
        let _guard = self.lifecycle.lock().await;
        self.require(AgentStatus::Paused, "resume")?;
        self.inner.set_status(AgentStatus::Running).await;
        self.inner.wake.notify_one();
        self.inner.persist().await;
        Ok(())
    }

    /// Stop dispatching and wait for in-flight work to finish.
    ///
    /// Tasks sleeping out a retry delay are put back in the queue at once.
    /// Queued tasks stay queued. A no-op when already stopped.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let mut handle = self.lifecycle.lock().await;
        if self.status() == AgentStatus::Stopped {
            return Ok(());
        }

        let agent_id = self.inner.config.id.clone();
        info!(agent_id = %agent_id, "Agent stopping");
        self.inner.set_status(AgentStatus::Stopping).await;

        if let Some(coordinator) = handle.take()
            && let Err(e) = coordinator.await
        {
            error!(agent_id = %agent_id, error = %e, "Dispatch loop ended abnormally");
        }

        // Every worker holds a permit until its task is settled.
        let max = self.inner.config.max_concurrent_tasks as u32;
        if let Ok(all) = self.inner.permits.acquire_many(max).await {
            drop(all);
        }

        let mut timers = std::mem::take(&mut *self.inner.delayed.lock().await);
        while let Some(joined) = timers.join_next().await {
            if let Err(e) = joined {
                warn!(agent_id = %agent_id, error = %e, "Retry timer ended abnormally");
            }
        }

        self.inner.state.write().await.stopped_at = Some(Utc::now());
        self.inner.set_status(AgentStatus::Stopped).await;
        self.inner.persist().await;
        self.inner.idle.notify_waiters();
        info!(agent_id = %agent_id, "Agent stopped");
        Ok(())
    }

    fn require(&self, expected: AgentStatus, operation: &'static str) -> Result<(), LifecycleError> {
        let status = self.status();
        if status == expected {
            Ok(())
        } else {
            Err(LifecycleError::InvalidState {
                agent_id: self.inner.config.id.clone(),
                operation,
                status,
            })
        }
    }

    // ── Tasks ───────────────────────────────────────────────────────

    /// Queue a task. Valid in every lifecycle state; returns without
    /// waiting for execution.
    pub async fn add_task(&self, spec: TaskSpec) -> Result<TaskId, QueueError> {
        let task = Task::from_spec(spec, &self.inner.config);
        let (task_id, task_type, priority) = (task.id, task.task_type.clone(), task.priority);

        self.inner.queue.enqueue(task).await?;
        self.inner.wake.notify_one();

        debug!(
            agent_id = %self.inner.config.id,
            task_id = %task_id,
            task_type = %task_type,
            priority,
            "Task queued"
        );
        self.inner.emit(RunnerEvent::TaskQueued {
            task_id,
            task_type,
            priority,
        });
        Ok(task_id)
    }

    /// Find a task in the worker slots, the history, or the queue.
    pub async fn task(&self, id: TaskId) -> Option<Task> {
        if let Some(task) = self.inner.state.read().await.find_task(id) {
            return Some(task.clone());
        }
        match self.inner.queue.list().await {
            Ok(queued) => queued.into_iter().find(|t| t.id == id),
            Err(e) => {
                warn!(agent_id = %self.inner.config.id, error = %e, "Failed to list queue");
                None
            }
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub async fn get_state(&self) -> AgentState {
        self.inner.state.read().await.clone()
    }

    pub async fn get_metrics(&self) -> AgentMetrics {
        let queued = self.inner.queue_size().await;
        let state = self.inner.state.read().await;
        AgentMetrics::compute(&state, queued, Utc::now())
    }

    /// Resolve once nothing is queued, in flight, or awaiting retry.
    ///
    /// Never resolves while tasks sit in the queue of a paused or stopped
    /// agent; callers bound it with a timeout.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.is_idle().await {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for AgentRunner {
    fn drop(&mut self) {
        // Let the coordinator exit if the runner is dropped without `stop()`.
        self.inner.status_tx.send_if_modified(|status| {
            if matches!(status, AgentStatus::Running | AgentStatus::Paused) {
                *status = AgentStatus::Stopping;
                true
            } else {
                false
            }
        });
    }
}

impl RunnerInner {
    fn emit(&self, event: RunnerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn set_status(&self, status: AgentStatus) {
        self.state.write().await.status = status;
        self.status_tx.send_replace(status);
        debug!(agent_id = %self.config.id, %status, "Agent status changed");
        self.emit(RunnerEvent::StatusChanged {
            agent_id: self.config.id.clone(),
            status,
        });
    }

    /// Save the snapshot without history after a task enters or leaves a
    /// worker slot or a retry timer, so `restore` can find it after a crash.
    async fn checkpoint(&self) {
        let state = self.state.read().await;
        if let Err(e) = self.store.save_snapshot(&self.config.id, &state).await {
            warn!(agent_id = %self.config.id, error = %e, "Failed to checkpoint agent state");
        }
    }

    /// Save a snapshot. Holds the state read lock until the write lands so an
    /// outcome recorded concurrently cannot be overwritten by an older
    /// snapshot.
    async fn persist(&self) {
        let state = self.state.read().await;
        if let Err(e) = self.store.save_state(&self.config.id, &state).await {
            warn!(agent_id = %self.config.id, error = %e, "Failed to persist agent state");
        }
    }

    async fn queue_size(&self) -> usize {
        self.queue.size().await.unwrap_or_else(|e| {
            warn!(agent_id = %self.config.id, error = %e, "Failed to read queue size");
            0
        })
    }

    async fn is_idle(&self) -> bool {
        if self.permits.available_permits() < self.config.max_concurrent_tasks {
            return false;
        }
        {
            let state = self.state.read().await;
            if !state.awaiting_retry.is_empty() || !state.current_tasks.is_empty() {
                return false;
            }
        }
        match self.queue.is_empty().await {
            Ok(empty) => empty,
            Err(e) => {
                warn!(agent_id = %self.config.id, error = %e, "Failed to check queue");
                false
            }
        }
    }

    // ── Dispatch ────────────────────────────────────────────────────

    async fn dispatch_loop(self: Arc<Self>) {
        let mut status_rx = self.status_tx.subscribe();
        debug!(agent_id = %self.config.id, "Dispatch loop started");

        loop {
            let status = *status_rx.borrow_and_update();
            match status {
                AgentStatus::Running => {}
                AgentStatus::Paused => {
                    if status_rx.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                AgentStatus::Stopping | AgentStatus::Stopped => break,
            }

            let permit = tokio::select! {
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            // Paused or stopped while waiting for a free worker.
            let current = *status_rx.borrow();
            if current != AgentStatus::Running {
                drop(permit);
                continue;
            }

            match self.queue.dequeue().await {
                Ok(Some(task)) => self.dispatch(task, permit).await,
                Ok(None) => {
                    drop(permit);
                    self.idle.notify_waiters();
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        changed = status_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                Err(QueueError::CorruptEntry {
                    task_id,
                    body,
                    reason,
                }) => {
                    drop(permit);
                    self.fail_unreadable(&task_id, body, &reason).await;
                }
                Err(e) => {
                    drop(permit);
                    error!(agent_id = %self.config.id, error = %e, "Failed to dequeue task");
                    tokio::select! {
                        _ = tokio::time::sleep(QUEUE_ERROR_BACKOFF) => {}
                        changed = status_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        debug!(agent_id = %self.config.id, "Dispatch loop exited");
    }

    /// Assign a dequeued task to a worker slot and spawn its worker.
    async fn dispatch(self: &Arc<Self>, mut task: Task, permit: OwnedSemaphorePermit) {
        if task.is_terminal() {
            warn!(
                agent_id = %self.config.id,
                task_id = %task.id,
                status = %task.status,
                "Skipping terminal task found in queue"
            );
            return;
        }
        if task.status != TaskStatus::Pending {
            task.reset_for_recovery();
        }

        let slot = {
            let mut state = self.state.write().await;
            let Some(slot) = state.free_slot(self.config.max_concurrent_tasks) else {
                drop(state);
                error!(agent_id = %self.config.id, task_id = %task.id, "No free worker slot");
                self.requeue(task).await;
                return;
            };
            if let Err(e) = task.transition_to(TaskStatus::Running) {
                error!(agent_id = %self.config.id, task_id = %task.id, error = %e, "Cannot start task");
                return;
            }
            state.current_tasks.insert(slot, task.clone());
            slot
        };
        self.checkpoint().await;

        debug!(
            agent_id = %self.config.id,
            task_id = %task.id,
            task_type = %task.task_type,
            slot,
            retry_count = task.retry_count,
            "Task dispatched"
        );
        self.emit(RunnerEvent::TaskStarted {
            task_id: task.id,
            task_type: task.task_type.clone(),
            slot,
            attempt: task.retry_count + 1,
        });

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.run_task(slot, task).await;
            drop(permit);
            inner.idle.notify_waiters();
        });
    }

    // ── Worker ──────────────────────────────────────────────────────

    async fn run_task(self: &Arc<Self>, slot: usize, mut task: Task) {
        let outcome = self.attempt(&task).await;
        match outcome {
            Ok(output) => match task.complete(output) {
                Ok(()) => self.conclude(Some(slot), task).await,
                Err(e) => {
                    error!(agent_id = %self.config.id, task_id = %task.id, error = %e, "Cannot complete task");
                    self.state.write().await.current_tasks.remove(&slot);
                    self.checkpoint().await;
                }
            },
            Err(AttemptError::Execution(e)) if task.has_retries_left() => {
                self.retry(slot, task, e).await;
            }
            Err(e) => self.fail(Some(slot), task, e.to_string()).await,
        }
    }

    /// One execution of the task's skill, bounded by its timeout.
    async fn attempt(&self, task: &Task) -> Result<SkillOutput, AttemptError> {
        let skill = self
            .registry
            .get(&task.task_type)
            .await
            .map_err(AttemptError::Unroutable)?;

        let timeout = task.timeout(&self.config);
        let run = AssertUnwindSafe(skill.execute(task.payload.clone())).catch_unwind();

        match tokio::time::timeout(timeout, run).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(e))) => Err(AttemptError::Execution(TaskExecutionError::Failed {
                task_type: task.task_type.clone(),
                reason: e.to_string(),
            })),
            Ok(Err(panic)) => {
                let reason = panic_message(panic.as_ref());
                error!(
                    agent_id = %self.config.id,
                    task_id = %task.id,
                    task_type = %task.task_type,
                    reason = %reason,
                    "Skill panicked"
                );
                Err(AttemptError::Execution(TaskExecutionError::Panicked {
                    task_type: task.task_type.clone(),
                    reason,
                }))
            }
            Err(_) => Err(AttemptError::Execution(TaskExecutionError::TimedOut {
                task_type: task.task_type.clone(),
                timeout,
            })),
        }
    }

    async fn retry(self: &Arc<Self>, slot: usize, mut task: Task, cause: TaskExecutionError) {
        if let Err(e) = task.begin_retry() {
            error!(agent_id = %self.config.id, task_id = %task.id, error = %e, "Cannot retry task");
            self.fail(Some(slot), task, cause.to_string()).await;
            return;
        }

        let delay = self.config.retry_backoff.delay_for(task.retry_count);
        warn!(
            agent_id = %self.config.id,
            task_id = %task.id,
            task_type = %task.task_type,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %cause,
            "Task attempt failed, retrying"
        );
        let retrying = RunnerEvent::TaskRetrying {
            task_id: task.id,
            retry_count: task.retry_count,
            delay_ms: delay.as_millis() as u64,
            error: cause.to_string(),
        };

        // The task stays in its slot until it is back in the queue.
        if delay.is_zero() {
            self.requeue(task).await;
            self.state.write().await.current_tasks.remove(&slot);
            self.checkpoint().await;
            self.emit(retrying);
            return;
        }

        {
            let mut state = self.state.write().await;
            state.current_tasks.remove(&slot);
            state.awaiting_retry.insert(task.id, task.clone());
        }
        self.checkpoint().await;
        self.emit(retrying);

        let inner = Arc::clone(self);
        let mut status_rx = self.status_tx.subscribe();
        let mut timers = self.delayed.lock().await;
        while timers.try_join_next().is_some() {}
        timers.spawn(async move {
            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                let status = *status_rx.borrow_and_update();
                if matches!(status, AgentStatus::Stopping | AgentStatus::Stopped) {
                    break;
                }
                tokio::select! {
                    _ = &mut sleep => break,
                    changed = status_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            let task_id = task.id;
            inner.requeue(task).await;
            inner.state.write().await.awaiting_retry.remove(&task_id);
            inner.checkpoint().await;
            inner.idle.notify_waiters();
        });
    }

    /// Put a Retrying task back in the queue as Pending. A task that cannot
    /// be re-enqueued fails terminally.
    async fn requeue(&self, task: Task) {
        let mut pending = task.clone();
        if pending.status != TaskStatus::Pending
            && let Err(e) = pending.transition_to(TaskStatus::Pending)
        {
            self.fail(None, task, e.to_string()).await;
            return;
        }

        match self.queue.enqueue(pending).await {
            Ok(()) => self.wake.notify_one(),
            Err(e) => {
                error!(
                    agent_id = %self.config.id,
                    task_id = %task.id,
                    error = %e,
                    "Failed to re-enqueue task"
                );
                self.fail(None, task, format!("Failed to re-enqueue: {e}")).await;
            }
        }
    }

    async fn fail(&self, slot: Option<usize>, mut task: Task, reason: String) {
        if let Err(e) = task.fail(reason) {
            error!(agent_id = %self.config.id, task_id = %task.id, error = %e, "Cannot fail task");
            if let Some(slot) = slot {
                self.state.write().await.current_tasks.remove(&slot);
                self.checkpoint().await;
            }
            return;
        }
        self.conclude(slot, task).await;
    }

    /// Record an unreadable queue entry as a failed task so it lands in the
    /// history instead of vanishing.
    async fn fail_unreadable(&self, task_id: &str, body: String, reason: &str) {
        error!(
            agent_id = %self.config.id,
            task_id,
            error = reason,
            "Unreadable task in queue"
        );
        let mut task = Task::new(UNREADABLE_TASK_TYPE, serde_json::Value::String(body));
        if let Ok(id) = task_id.parse::<TaskId>() {
            task.id = id;
        }
        if let Err(e) = task.transition_to(TaskStatus::Running) {
            error!(agent_id = %self.config.id, task_id, error = %e, "Cannot record unreadable task");
            return;
        }
        self.fail(None, task, format!("Unreadable queue entry: {reason}"))
            .await;
    }

    /// Record a terminal task: free its slot, append it to history, and
    /// persist the outcome.
    async fn conclude(&self, slot: Option<usize>, task: Task) {
        {
            let mut state = self.state.write().await;
            if let Some(slot) = slot {
                state.current_tasks.remove(&slot);
            }
            if task.status == TaskStatus::Completed {
                state.completed_tasks.push(task.clone());
            } else {
                state.failed_tasks.push(task.clone());
            }
        }

        if let Err(e) = self.store.record_task_outcome(&self.config.id, &task).await {
            warn!(
                agent_id = %self.config.id,
                task_id = %task.id,
                error = %e,
                "Failed to record task outcome"
            );
        }
        self.checkpoint().await;

        let duration_ms = task
            .execution_time()
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        if task.status == TaskStatus::Completed {
            info!(
                agent_id = %self.config.id,
                task_id = %task.id,
                task_type = %task.task_type,
                retry_count = task.retry_count,
                duration_ms,
                "Task completed"
            );
            self.emit(RunnerEvent::TaskCompleted {
                task_id: task.id,
                duration_ms,
            });
        } else {
            let error = task.error.clone().unwrap_or_default();
            info!(
                agent_id = %self.config.id,
                task_id = %task.id,
                task_type = %task.task_type,
                retry_count = task.retry_count,
                error = %error,
                "Task failed"
            );
            self.emit(RunnerEvent::TaskFailed {
                task_id: task.id,
                error,
            });
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::{FnSkill, SkillError};

    fn config() -> AgentConfig {
        AgentConfig::new("test")
            .with_id("agent-1")
            .with_max_concurrent_tasks(2)
            .with_retry_attempts(1)
            .with_timeout(Duration::from_secs(5))
    }

    async fn runner_with_echo() -> AgentRunner {
        let registry = Arc::new(SkillRegistry::new());
        registry
            .register(
                "echo",
                Arc::new(FnSkill::new("echo", "echo", |payload| async move {
                    Ok::<_, SkillError>(SkillOutput::new(payload))
                })),
            )
            .await
            .unwrap();
        AgentRunner::in_memory(config(), registry).unwrap()
    }

    #[test]
    fn panic_message_handles_common_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic payload");
    }

    #[test]
    fn new_rejects_invalid_config() {
        let registry = Arc::new(SkillRegistry::new());
        let result = AgentRunner::in_memory(config().with_max_concurrent_tasks(0), registry);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn lifecycle_guards() {
        let runner = runner_with_echo().await;
        assert_eq!(runner.status(), AgentStatus::Stopped);

        let err = runner.pause().await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot pause agent agent-1 while stopped");
        assert!(runner.resume().await.is_err());
        runner.stop().await.unwrap();

        runner.start().await.unwrap();
        assert!(matches!(
            runner.start().await,
            Err(LifecycleError::AlreadyRunning { .. })
        ));
        let err = runner.resume().await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot resume agent agent-1 while running");

        runner.pause().await.unwrap();
        assert!(matches!(
            runner.start().await,
            Err(LifecycleError::AlreadyRunning { .. })
        ));
        runner.resume().await.unwrap();
        runner.stop().await.unwrap();
        assert_eq!(runner.status(), AgentStatus::Stopped);

        let state = runner.get_state().await;
        assert!(state.started_at.is_some());
        assert!(state.stopped_at.is_some());
    }

    #[tokio::test]
    async fn wait_idle_resolves_immediately_when_nothing_to_do() {
        let runner = runner_with_echo().await;
        tokio::time::timeout(Duration::from_secs(1), runner.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn task_lookup_covers_queue_and_history() {
        let runner = runner_with_echo().await;
        let id = runner
            .add_task(TaskSpec::new("echo", serde_json::json!({"x": 1})))
            .await
            .unwrap();
        assert_eq!(runner.task(id).await.unwrap().status, TaskStatus::Pending);

        runner.start().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), runner.wait_idle())
            .await
            .unwrap();
        assert_eq!(runner.task(id).await.unwrap().status, TaskStatus::Completed);
        runner.stop().await.unwrap();
    }
}

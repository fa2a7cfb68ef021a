use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use reelsmith_core::{ReelError, ReelResult};
use tokio::sync::Semaphore;

use crate::pipeline::RenderJob;
use crate::store::TaskStore;
use crate::task::{RenderRequest, RenderTask, TaskStatus};

/// Owns every task record. Submissions return immediately; each task then
/// runs on its own tokio task, bounded by a concurrency limit.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn TaskStore>,
    job: Arc<dyn RenderJob>,
    permits: Arc<Semaphore>,
    // Serializes read-modify-write of records.
    write_lock: Mutex<()>,
}

/// Handle a running job uses to report its phase.
#[derive(Clone)]
pub struct Progress {
    manager: TaskManager,
    task_id: String,
}

impl Progress {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn checkpoint(&self, step: &str, progress: u8) {
        if let Err(e) = self.manager.checkpoint(&self.task_id, step, progress) {
            tracing::warn!(task_id = %self.task_id, error = %e, "failed to record progress");
        }
    }
}

impl TaskManager {
    pub fn new(store: Arc<dyn TaskStore>, job: Arc<dyn RenderJob>, max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                job,
                permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Record a queued task and start working on it in the background.
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: RenderRequest) -> ReelResult<String> {
        if request.topic.trim().is_empty() {
            return Err(ReelError::InvalidArgument("topic must not be empty".into()));
        }
        let task_id = uuid::Uuid::new_v4().to_string();
        let task = RenderTask::new(task_id.clone(), request.clone());
        {
            let _guard = self.inner.write_lock.lock();
            self.inner.store.put(&task)?;
        }
        tracing::info!(task_id = %task_id, topic = %request.topic, "task queued");

        tokio::spawn(self.clone().drive(task_id.clone(), request));
        Ok(task_id)
    }

    pub fn status(&self, task_id: &str) -> ReelResult<RenderTask> {
        self.inner
            .store
            .get(task_id)?
            .ok_or_else(|| ReelError::NotFound(format!("task {task_id}")))
    }

    /// Output locator of a completed task.
    pub fn result_locator(&self, task_id: &str) -> ReelResult<String> {
        let task = self.status(task_id)?;
        match (task.status, task.output_locator) {
            (TaskStatus::Completed, Some(locator)) => Ok(locator),
            (status, _) => Err(ReelError::NotReady {
                id: task.id,
                status: status.to_string(),
            }),
        }
    }

    /// All tasks, newest first.
    pub fn list(&self) -> ReelResult<Vec<RenderTask>> {
        let mut tasks = self.inner.store.list()?;
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    /// Poll until the task reaches a terminal state.
    pub async fn wait(&self, task_id: &str, poll_interval: Duration) -> ReelResult<RenderTask> {
        loop {
            let task = self.status(task_id)?;
            if task.status.is_terminal() {
                return Ok(task);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Fail every persisted task left unfinished by a previous process.
    /// Returns how many were marked.
    pub fn recover(&self) -> ReelResult<usize> {
        let mut count = 0;
        for task in self.inner.store.list()? {
            if task.status.is_terminal() {
                continue;
            }
            self.fail(&task.id, "interrupted by restart".to_string())?;
            tracing::warn!(task_id = %task.id, "marked interrupted task as failed");
            count += 1;
        }
        Ok(count)
    }

    fn transition<F>(&self, task_id: &str, mutate: F) -> ReelResult<RenderTask>
    where
        F: FnOnce(&mut RenderTask) -> bool,
    {
        let _guard = self.inner.write_lock.lock();
        let mut task = self.status(task_id)?;
        if mutate(&mut task) {
            task.updated_at = Utc::now();
            self.inner.store.put(&task)?;
        }
        Ok(task)
    }

    pub(crate) fn begin(&self, task_id: &str) -> ReelResult<RenderTask> {
        self.transition(task_id, |t| t.start())
    }

    pub(crate) fn checkpoint(&self, task_id: &str, step: &str, progress: u8) -> ReelResult<RenderTask> {
        let task = self.transition(task_id, |t| t.advance(step, progress))?;
        tracing::debug!(task_id, step, progress = task.progress, "checkpoint");
        Ok(task)
    }

    pub(crate) fn complete(&self, task_id: &str, locator: String) -> ReelResult<RenderTask> {
        self.transition(task_id, |t| t.finish(locator))
    }

    pub(crate) fn fail(&self, task_id: &str, message: String) -> ReelResult<RenderTask> {
        self.transition(task_id, |t| t.fail(message))
    }

    async fn drive(self, task_id: String, request: RenderRequest) {
        let permit = match self.inner.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.record_failure(&task_id, "render workers are shut down".to_string());
                return;
            }
        };

        if let Err(e) = self.begin(&task_id) {
            tracing::error!(task_id = %task_id, error = %e, "could not start task");
            self.record_failure(&task_id, format!("could not start: {e}"));
            return;
        }
        tracing::info!(task_id = %task_id, "task processing");

        let job = Arc::clone(&self.inner.job);
        let progress = Progress {
            manager: self.clone(),
            task_id: task_id.clone(),
        };
        let id = task_id.clone();
        let handle = tokio::spawn(async move { job.run(&id, &request, &progress).await });
        let outcome = handle.await;
        drop(permit);

        match outcome {
            Ok(Ok(locator)) => match self.complete(&task_id, locator) {
                Ok(task) => {
                    tracing::info!(task_id = %task_id, locator = ?task.output_locator, "task completed")
                }
                Err(e) => self.record_failure(&task_id, format!("could not record result: {e}")),
            },
            Ok(Err(e)) => {
                tracing::error!(task_id = %task_id, error = %e, "task failed");
                self.record_failure(&task_id, e.to_string());
            }
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    format!("render worker panicked: {}", panic_message(join_err.into_panic()))
                } else {
                    "render worker was cancelled".to_string()
                };
                tracing::error!(task_id = %task_id, "{message}");
                self.record_failure(&task_id, message);
            }
        }
    }

    fn record_failure(&self, task_id: &str, message: String) {
        if let Err(e) = self.fail(task_id, message) {
            tracing::error!(task_id, error = %e, "could not record task failure");
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Handles to submitted tasks

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::execution::ExecutionResult;
use crate::task::ProcessExecutionTask;

/// Completion state of a submitted task
#[async_trait]
pub trait TaskFuture: Send + Sync {
    /// `true` once the task ended or was cancelled
    fn is_done(&self) -> bool;

    fn is_cancelled(&self) -> bool;

    /// Waits for the task result
    async fn get(&self) -> Result<ExecutionResult, ExecutionError>;
}

/// A task running on the worker pool
///
/// The task waits for a worker permit first. A cancel request that arrives
/// before a permit was acquired prevents the task body from running at all.
pub struct ExecutionFuture {
    job_uuid: Uuid,
    task: Arc<ProcessExecutionTask>,
    cancelled: Arc<AtomicBool>,
    abort_handle: AbortHandle,
    state: Mutex<FutureState>,
}

struct FutureState {
    handle: Option<JoinHandle<ExecutionResult>>,
    outcome: Option<Result<ExecutionResult, String>>,
}

impl ExecutionFuture {
    /// Spawns the task, it runs once `worker_permits` hands out a permit
    pub fn spawn(task: Arc<ProcessExecutionTask>, worker_permits: Arc<Semaphore>) -> Self {
        let job_uuid = task.job_uuid();
        let cancelled = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn({
            let task = Arc::clone(&task);
            let cancelled = Arc::clone(&cancelled);

            async move {
                let Ok(_permit) = worker_permits.acquire_owned().await else {
                    debug!("Worker pool closed before job {} started", job_uuid);
                    return ExecutionResult::failed("Worker pool was shut down");
                };

                if cancelled.load(Ordering::SeqCst) {
                    debug!("Job {} was cancelled before it started", job_uuid);
                    return ExecutionResult {
                        canceled: true,
                        ..ExecutionResult::default()
                    };
                }

                task.call().await
                // Permit is automatically released when dropped
            }
        });

        Self {
            job_uuid,
            task,
            cancelled,
            abort_handle: handle.abort_handle(),
            state: Mutex::new(FutureState {
                handle: Some(handle),
                outcome: None,
            }),
        }
    }

    pub fn job_uuid(&self) -> Uuid {
        self.job_uuid
    }

    /// Cancels the task
    ///
    /// Returns `false` when the task already ended or was cancelled before.
    /// With `may_interrupt_if_running` a running product process is
    /// terminated first.
    pub async fn cancel(&self, may_interrupt_if_running: bool) -> bool {
        if self.is_done() {
            return false;
        }
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }

        info!("Cancel task of job {}", self.job_uuid);
        self.task.prepare_for_cancel(may_interrupt_if_running).await;

        if may_interrupt_if_running {
            self.abort_handle.abort();
        }
        true
    }

    /// Stops the task immediately, without any cancel handling
    pub fn abort(&self) {
        self.abort_handle.abort();
    }

    /// Aborts the task and kills its product process
    pub fn terminate(&self) {
        self.abort();
        self.task.kill_process();
    }
}

#[async_trait]
impl TaskFuture for ExecutionFuture {
    fn is_done(&self) -> bool {
        self.is_cancelled() || self.abort_handle.is_finished()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn get(&self) -> Result<ExecutionResult, ExecutionError> {
        let mut state = self.state.lock().await;

        if state.outcome.is_none() {
            let outcome = match state.handle.take() {
                Some(handle) => handle.await.map_err(|e| e.to_string()),
                None => Err("Task handle is gone".to_string()),
            };
            state.outcome = Some(outcome);
        }

        match &state.outcome {
            Some(Ok(result)) => Ok(result.clone()),
            Some(Err(message)) => Err(ExecutionError::TaskFailed {
                job_uuid: self.job_uuid,
                message: message.clone(),
            }),
            None => Err(ExecutionError::TaskFailed {
                job_uuid: self.job_uuid,
                message: "No outcome available".to_string(),
            }),
        }
    }
}

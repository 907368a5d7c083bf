//! Execution service
//!
//! Owns the execution queue:
//! - admission control against `queue_max`
//! - submission of tasks to the bounded worker pool
//! - cancellation and reconciliation of finished tasks
//! - shutdown, resetting unfinished jobs so another instance can restart them

use async_trait::async_trait;
use pds_core::domain::event::{ExecutionEventData, ExecutionEventType};
use pds_core::domain::job::JobStatusState;
use pds_core::domain::status::{CancelResult, ExecutionJobInQueueStatusEntry, ExecutionStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ExecutionError;
use crate::future::{ExecutionFuture, TaskFuture};
use crate::repository::JobRepository;
use crate::retry::RETRY_DELAY;
use crate::scheduler::ExecutionWatcher;
use crate::service::ResultApplicationService;
use crate::task::{ExecutionServices, ProcessExecutionTask};

const MAXIMUM_TRIES_TO_STORE_JOB_RESILIENT: u32 = 5;

/// Service trait for queueing and controlling job executions
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Queues a job for execution
    ///
    /// Fails with [`ExecutionError::QueueFull`] when no slot is free. A job
    /// already in the queue is cancelled and replaced.
    async fn submit(&self, job_uuid: Uuid) -> Result<(), ExecutionError>;

    /// Requests cancellation of a queued or running job
    ///
    /// The job record is not changed here, the final state is set when the
    /// watcher reconciles the cancelled task.
    async fn cancel(&self, job_uuid: Uuid) -> CancelResult;

    async fn is_queue_full(&self) -> bool;

    async fn get_execution_status(&self) -> Result<ExecutionStatus, ExecutionError>;

    /// Hard stop, tracked jobs are reset to `READY_TO_START`
    async fn shutdown(&self) -> Result<(), ExecutionError>;
}

struct QueueEntry {
    future: Arc<ExecutionFuture>,
    submitted: chrono::DateTime<chrono::Utc>,
}

/// Standard implementation of ExecutionService
pub struct StandardExecutionService {
    config: Config,
    repository: Arc<dyn JobRepository>,
    services: ExecutionServices,
    result_service: ResultApplicationService,
    worker_permits: Arc<Semaphore>,
    jobs_in_queue: Mutex<HashMap<Uuid, QueueEntry>>,
    shut_down: AtomicBool,
    watcher: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl StandardExecutionService {
    /// Creates the service, the watcher is started separately
    pub fn new(
        config: Config,
        repository: Arc<dyn JobRepository>,
        services: ExecutionServices,
    ) -> Self {
        let worker_permits = Arc::new(Semaphore::new(config.worker_pool_size));
        let result_service = ResultApplicationService::new(Arc::clone(&repository));

        Self {
            config,
            repository,
            services,
            result_service,
            worker_permits,
            jobs_in_queue: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
            watcher: std::sync::Mutex::new(None),
        }
    }

    /// Starts the background watcher when enabled by configuration
    pub fn start_watcher(self: &Arc<Self>) {
        if !self.config.watcher_enabled {
            warn!("Execution watcher disabled");
            return;
        }

        let handle = ExecutionWatcher::new(
            Arc::downgrade(self),
            self.config.watcher_initial_delay,
            self.config.watcher_interval,
        )
        .spawn();

        if let Ok(mut watcher) = self.watcher.lock() {
            if let Some(former) = watcher.replace(handle) {
                former.abort();
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reconciles all finished tasks and frees their slots
    pub async fn inspect_jobs_in_queue(&self) {
        let mut queue = self.jobs_in_queue.lock().await;

        let done: Vec<(Uuid, Arc<ExecutionFuture>)> = queue
            .iter()
            .filter(|(_, entry)| entry.future.is_done())
            .map(|(uuid, entry)| (*uuid, Arc::clone(&entry.future)))
            .collect();

        for (job_uuid, future) in done {
            self.apply_result_resilient(job_uuid, future.as_ref()).await;
            queue.remove(&job_uuid);
        }
    }

    /// Tries a few times to store the outcome, the entry is dropped afterwards in any case
    async fn apply_result_resilient(&self, job_uuid: Uuid, future: &ExecutionFuture) {
        let mut tries = 0;

        while tries < MAXIMUM_TRIES_TO_STORE_JOB_RESILIENT {
            if tries > 0 {
                info!(
                    "Retry to store work for PDS job {}. Tried {} times before",
                    job_uuid, tries
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }
            tries += 1;

            let mut job = match self.repository.find_by_id(job_uuid).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    error!(
                        "PDS job {} does no longer exist, but result available! So remove from queue",
                        job_uuid
                    );
                    return;
                }
                Err(e) => {
                    warn!("Not able to load PDS job {}: {}", job_uuid, e);
                    continue;
                }
            };

            match self.result_service.apply_result_to_job(future, &mut job).await {
                Ok(()) => {
                    debug!("Stored PDS job {} with state {:?}", job_uuid, job.state);
                    return;
                }
                Err(e) => warn!("Not able to store work for PDS job {}: {}", job_uuid, e),
            }
        }

        error!(
            "Was not able to write work for PDS job {} - even after {} tries.",
            job_uuid, tries
        );
    }

    fn queue_full(&self, jobs_in_queue: usize) -> bool {
        jobs_in_queue >= self.config.queue_max
    }
}

#[async_trait]
impl ExecutionService for StandardExecutionService {
    async fn submit(&self, job_uuid: Uuid) -> Result<(), ExecutionError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(ExecutionError::ShutDown);
        }

        debug!("Add job to execution queue: {}", job_uuid);

        let former = self.jobs_in_queue.lock().await.remove(&job_uuid);
        if let Some(former) = former {
            error!("Found former job in queue with same job UUID: {}", job_uuid);
            // the cancel waits for the grace window, the queue stays usable meanwhile
            former.future.cancel(true).await;
            info!("Canceled former job {}", job_uuid);
        }

        let mut queue = self.jobs_in_queue.lock().await;
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(ExecutionError::ShutDown);
        }

        if self.queue_full(queue.len()) {
            warn!(
                "Execution queue overload: {}/{}",
                queue.len(),
                self.config.queue_max
            );
            return Err(ExecutionError::QueueFull {
                jobs_in_queue: queue.len(),
                queue_max: self.config.queue_max,
            });
        }

        let task = Arc::new(ProcessExecutionTask::new(job_uuid, self.services.clone()));
        let future = ExecutionFuture::spawn(task, Arc::clone(&self.worker_permits));

        let replaced = queue.insert(
            job_uuid,
            QueueEntry {
                future: Arc::new(future),
                submitted: chrono::Utc::now(),
            },
        );
        if let Some(replaced) = replaced {
            warn!("Job {} was submitted concurrently, stop the other execution", job_uuid);
            replaced.future.terminate();
        }

        info!(
            "Job {} queued ({}/{})",
            job_uuid,
            queue.len(),
            self.config.queue_max
        );
        Ok(())
    }

    async fn cancel(&self, job_uuid: Uuid) -> CancelResult {
        debug!("Try to cancel PDS job: {}", job_uuid);

        let future = {
            let queue = self.jobs_in_queue.lock().await;
            match queue.get(&job_uuid) {
                Some(entry) => Arc::clone(&entry.future),
                None => return CancelResult::JobNotFound,
            }
        };

        if future.is_done() {
            info!(
                "Cancellation of job {} skipped, because already done",
                job_uuid
            );
            return CancelResult::JobFoundJobAlreadyDone;
        }

        let event = ExecutionEventData::new(ExecutionEventType::CancelRequested);
        if let Err(e) =
            self.services
                .workspace_service
                .send_event(job_uuid, ExecutionEventType::CancelRequested, &event)
        {
            warn!("Was not able to send cancel event to job {}: {}", job_uuid, e);
        }

        if future.cancel(true).await {
            info!("Cancel SUCCESSFUL: canceled PDS job: {}", job_uuid);
            CancelResult::JobFoundCancelWasDone
        } else {
            info!(
                "Cancel FAILED: was not able to cancel PDS job: {}. This will be an orphaned cancel request.",
                job_uuid
            );
            CancelResult::JobFoundCancelWasNotPossible
        }
    }

    async fn is_queue_full(&self) -> bool {
        let queue = self.jobs_in_queue.lock().await;
        self.queue_full(queue.len())
    }

    async fn get_execution_status(&self) -> Result<ExecutionStatus, ExecutionError> {
        let queue = self.jobs_in_queue.lock().await;

        let mut tracked: Vec<(&Uuid, &QueueEntry)> = queue.iter().collect();
        tracked.sort_by_key(|(_, entry)| entry.submitted);

        let mut entries = Vec::with_capacity(tracked.len());
        for (job_uuid, entry) in tracked {
            let job = self.repository.find_by_id(*job_uuid).await?;

            entries.push(ExecutionJobInQueueStatusEntry {
                job_uuid: *job_uuid,
                state: job.as_ref().map(|job| job.state),
                created: job.as_ref().map(|job| job.created),
                started: job.as_ref().and_then(|job| job.started),
                done: entry.future.is_done(),
                canceled: entry.future.is_cancelled(),
            });
        }

        Ok(ExecutionStatus {
            queue_max: self.config.queue_max,
            jobs_in_queue: queue.len(),
            entries,
        })
    }

    async fn shutdown(&self) -> Result<(), ExecutionError> {
        let mut queue = self.jobs_in_queue.lock().await;

        // no task may mark its job running once the reset happened
        self.shut_down.store(true, Ordering::SeqCst);
        self.worker_permits.close();
        for entry in queue.values() {
            entry.future.terminate();
        }

        let jobs_to_restart: Vec<Uuid> = queue.drain().map(|(job_uuid, _)| job_uuid).collect();
        info!("Handling shutdown for {} jobs in queue", jobs_to_restart.len());

        let reset = self
            .repository
            .force_state_reset(&jobs_to_restart, JobStatusState::ReadyToStart)
            .await;

        if let Ok(mut watcher) = self.watcher.lock() {
            if let Some(handle) = watcher.take() {
                handle.abort();
            }
        }
        info!("Execution service shut down");

        reset.map_err(ExecutionError::from)
    }
}

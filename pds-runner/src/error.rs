//! Error types for the execution engine

use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the execution service to its callers
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Queue has no free slot, callers must check `is_queue_full` first
    #[error("Execution queue is full ({jobs_in_queue}/{queue_max})")]
    QueueFull {
        jobs_in_queue: usize,
        queue_max: usize,
    },

    /// Service was shut down and accepts no more work
    #[error("Execution service has been shut down")]
    ShutDown,

    /// The task running a job did not produce a result
    #[error("Execution of job {job_uuid} failed: {message}")]
    TaskFailed { job_uuid: Uuid, message: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Failure to fetch the configuration of a job
#[derive(Debug, Error)]
pub enum ConfigFetchError {
    /// Stored configuration cannot be decrypted with the current key
    #[error("Job configuration of {0} cannot be decrypted, encryption is out of sync")]
    EncryptionOutOfSync(Uuid),

    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ConfigFetchError {
    pub fn is_encryption_failure(&self) -> bool {
        matches!(self, Self::EncryptionOutOfSync(_))
    }
}

/// Job store failures
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    /// Record was changed concurrently, retrying may succeed
    #[error("Job {0} was modified concurrently")]
    OptimisticLock(Uuid),

    #[error("Job store failure: {0}")]
    Store(String),
}

/// Workspace preparation and file access failures
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Workspace I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Subprocess launch and control failures
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to start process {command}: {source}")]
    Start {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open capture file {path}: {source}")]
    Capture {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to kill process: {0}")]
    Kill(String),
}

/// Message collection failures
#[derive(Debug, Error)]
pub enum MessageCollectError {
    #[error("Messages directory must be defined")]
    MissingDirectory,

    #[error("Failed to read message file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Reasons a task stops before the product produced a result
///
/// Never leaves the task, it is turned into a failed execution result.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    ConfigFetch(#[from] ConfigFetchError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("The time in minutes to wait for a product is too low: {0}")]
    TimeoutTooLow(i64),

    #[error("No launcher script defined for product {0}")]
    ProductPathMissing(String),
}

impl TaskError {
    pub fn is_encryption_failure(&self) -> bool {
        matches!(self, Self::ConfigFetch(e) if e.is_encryption_failure())
    }
}

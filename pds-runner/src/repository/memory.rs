//! In-memory job store
//!
//! Used by the `pds-runner` binary and by tests. Records live as long as the
//! process.

use async_trait::async_trait;
use pds_core::domain::configuration::JobConfigurationData;
use pds_core::domain::job::{ExecutionData, Job, JobStatusState};
use pds_core::domain::message::Message;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ConfigFetchError, RepositoryError};
use crate::repository::{JobRepository, JobTransactionService};

struct StoredJob {
    job: Job,
    configuration: JobConfigurationData,
    encryption_out_of_sync: bool,
    stream_update_requested: bool,
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<Uuid, StoredJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job together with its configuration
    pub fn insert(&self, job: Job, configuration: JobConfigurationData) -> Result<(), RepositoryError> {
        self.lock()?.insert(
            job.uuid,
            StoredJob {
                job,
                configuration,
                encryption_out_of_sync: false,
                stream_update_requested: false,
            },
        );
        Ok(())
    }

    pub fn remove(&self, job_uuid: Uuid) -> Result<Option<Job>, RepositoryError> {
        Ok(self.lock()?.remove(&job_uuid).map(|stored| stored.job))
    }

    /// Asks a running job to refresh its persisted stream data
    pub fn request_stream_update(&self, job_uuid: Uuid) -> Result<(), RepositoryError> {
        self.with_stored(job_uuid, |stored| stored.stream_update_requested = true)
    }

    /// Makes the configuration of a job undecryptable, as after a key rotation
    pub fn mark_encryption_out_of_sync(&self, job_uuid: Uuid) -> Result<(), RepositoryError> {
        self.with_stored(job_uuid, |stored| stored.encryption_out_of_sync = true)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, StoredJob>>, RepositoryError> {
        self.jobs
            .lock()
            .map_err(|e| RepositoryError::Store(format!("Failed to lock job store: {}", e)))
    }

    fn with_stored<F>(&self, job_uuid: Uuid, f: F) -> Result<(), RepositoryError>
    where
        F: FnOnce(&mut StoredJob),
    {
        let mut jobs = self.lock()?;
        let stored = jobs
            .get_mut(&job_uuid)
            .ok_or(RepositoryError::NotFound(job_uuid))?;
        f(stored);
        Ok(())
    }
}

#[async_trait]
impl JobRepository for InMemoryJobStore {
    async fn find_by_id(&self, job_uuid: Uuid) -> Result<Option<Job>, RepositoryError> {
        Ok(self.lock()?.get(&job_uuid).map(|stored| stored.job.clone()))
    }

    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        self.with_stored(job.uuid, |stored| stored.job = job.clone())
    }

    async fn force_state_reset(
        &self,
        job_uuids: &[Uuid],
        state: JobStatusState,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.lock()?;
        for job_uuid in job_uuids {
            if let Some(stored) = jobs.get_mut(job_uuid) {
                stored.job.state = state;
            }
        }
        debug!("Reset {} job(s) to {:?}", job_uuids.len(), state);
        Ok(())
    }
}

#[async_trait]
impl JobTransactionService for InMemoryJobStore {
    async fn mark_job_as_running_in_own_transaction(
        &self,
        job_uuid: Uuid,
    ) -> Result<(), RepositoryError> {
        self.with_stored(job_uuid, |stored| {
            stored.job.state = JobStatusState::Running;
            stored.job.started = Some(chrono::Utc::now());
        })
    }

    async fn get_job_configuration_data_or_fail(
        &self,
        job_uuid: Uuid,
    ) -> Result<JobConfigurationData, ConfigFetchError> {
        let jobs = self.lock()?;
        let stored = jobs
            .get(&job_uuid)
            .ok_or(ConfigFetchError::JobNotFound(job_uuid))?;

        if stored.encryption_out_of_sync {
            return Err(ConfigFetchError::EncryptionOutOfSync(job_uuid));
        }
        Ok(stored.configuration.clone())
    }

    async fn update_job_execution_data_in_own_transaction(
        &self,
        job_uuid: Uuid,
        execution_data: ExecutionData,
    ) -> Result<(), RepositoryError> {
        self.with_stored(job_uuid, |stored| {
            stored.job.output_stream_text = execution_data.output_stream_data;
            stored.job.error_stream_text = execution_data.error_stream_data;
            if execution_data.meta_data.is_some() {
                stored.job.meta_data_text = execution_data.meta_data;
            }
            stored.stream_update_requested = false;
        })
    }

    async fn update_job_messages_in_own_transaction(
        &self,
        job_uuid: Uuid,
        messages: Vec<Message>,
    ) -> Result<(), RepositoryError> {
        self.with_stored(job_uuid, |stored| stored.job.messages = messages)
    }

    async fn is_job_stream_update_necessary(&self, job_uuid: Uuid) -> bool {
        self.lock()
            .map(|jobs| {
                jobs.get(&job_uuid)
                    .is_some_and(|stored| stored.stream_update_requested)
            })
            .unwrap_or(false)
    }
}

//! Job store ports

use async_trait::async_trait;
use pds_core::domain::configuration::JobConfigurationData;
use pds_core::domain::job::{ExecutionData, Job, JobStatusState};
use pds_core::domain::message::Message;
use uuid::Uuid;

use crate::error::{ConfigFetchError, RepositoryError};

/// Record level access to persisted jobs
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn find_by_id(&self, job_uuid: Uuid) -> Result<Option<Job>, RepositoryError>;

    /// Persists the complete record
    async fn save(&self, job: &Job) -> Result<(), RepositoryError>;

    /// Sets the state of all given jobs in one bulk operation
    async fn force_state_reset(
        &self,
        job_uuids: &[Uuid],
        state: JobStatusState,
    ) -> Result<(), RepositoryError>;
}

/// Single purpose job updates used while a job is executed
///
/// Every update is committed on its own, so it survives a later failure of
/// the execution.
#[async_trait]
pub trait JobTransactionService: Send + Sync {
    /// Sets state `RUNNING` and the start time stamp
    async fn mark_job_as_running_in_own_transaction(
        &self,
        job_uuid: Uuid,
    ) -> Result<(), RepositoryError>;

    /// Fetches the decrypted job configuration
    ///
    /// Fails with [`ConfigFetchError::EncryptionOutOfSync`] when the stored
    /// configuration cannot be decrypted anymore.
    async fn get_job_configuration_data_or_fail(
        &self,
        job_uuid: Uuid,
    ) -> Result<JobConfigurationData, ConfigFetchError>;

    /// Stores captured output, error and metadata
    async fn update_job_execution_data_in_own_transaction(
        &self,
        job_uuid: Uuid,
        execution_data: ExecutionData,
    ) -> Result<(), RepositoryError>;

    async fn update_job_messages_in_own_transaction(
        &self,
        job_uuid: Uuid,
        messages: Vec<Message>,
    ) -> Result<(), RepositoryError>;

    /// `true` when somebody asked for fresh stream data of a running job
    async fn is_job_stream_update_necessary(&self, job_uuid: Uuid) -> bool;
}

//! Result application service
//!
//! Maps the outcome of a finished or cancelled task onto the persisted job.
//! This is the only place where terminal job states are set.

use pds_core::domain::job::{Job, JobStatusState};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::RepositoryError;
use crate::future::TaskFuture;
use crate::repository::JobRepository;

pub struct ResultApplicationService {
    repository: Arc<dyn JobRepository>,
}

impl ResultApplicationService {
    pub fn new(repository: Arc<dyn JobRepository>) -> Self {
        Self { repository }
    }

    /// Applies the task outcome and saves the job
    ///
    /// All fields are changed before the single save call. A cancelled task
    /// is never waited for.
    pub async fn apply_result_to_job(
        &self,
        future: &dyn TaskFuture,
        job: &mut Job,
    ) -> Result<(), RepositoryError> {
        job.ended = Some(chrono::Utc::now());

        if future.is_cancelled() {
            job.state = JobStatusState::Canceled;
        } else {
            match future.get().await {
                Ok(result) => {
                    job.result = Some(result.result_text);

                    if result.canceled {
                        job.state = JobStatusState::Canceled;
                    } else if result.failed {
                        job.state = JobStatusState::Failed;
                        if result.encryption_failure {
                            job.encryption_out_of_sync = true;
                        }
                    } else {
                        job.state = JobStatusState::Done;
                    }
                }
                Err(e) => {
                    error!("Job {} execution failed: {}", job.uuid, e);
                    job.result = Some("Job execution failed".to_string());
                    job.state = JobStatusState::Failed;
                }
            }
        }

        info!("Job {} ends with state {:?}", job.uuid, job.state);
        self.repository.save(job).await
    }
}

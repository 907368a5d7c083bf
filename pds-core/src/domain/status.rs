//! Execution monitoring types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::JobStatusState;

/// Point in time snapshot of the execution queue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatus {
    pub queue_max: usize,
    pub jobs_in_queue: usize,
    pub entries: Vec<ExecutionJobInQueueStatusEntry>,
}

/// One queue entry
///
/// `done` and `canceled` describe the task, the other fields are read from
/// the job record at query time and stay empty when the record is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionJobInQueueStatusEntry {
    pub job_uuid: Uuid,
    pub state: Option<JobStatusState>,
    pub created: Option<chrono::DateTime<chrono::Utc>>,
    pub started: Option<chrono::DateTime<chrono::Utc>>,
    pub done: bool,
    pub canceled: bool,
}

/// Outcome of a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelResult {
    JobFoundCancelWasDone,
    JobFoundJobAlreadyDone,
    JobFoundCancelWasNotPossible,
    JobNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_result_names() {
        let json = serde_json::to_string(&CancelResult::JobFoundCancelWasNotPossible).unwrap();
        assert_eq!(json, "\"JOB_FOUND_CANCEL_WAS_NOT_POSSIBLE\"");
    }

    #[test]
    fn test_status_json_is_camel_case() {
        let status = ExecutionStatus {
            queue_max: 50,
            jobs_in_queue: 0,
            entries: Vec::new(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "{\"queueMax\":50,\"jobsInQueue\":0,\"entries\":[]}");
    }
}

//! Job domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::message::Message;

/// Persisted job record
///
/// Owned by the job store. The execution engine only mutates it through the
/// running mark at task start, telemetry updates and the final result
/// application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub uuid: Uuid,
    pub state: JobStatusState,
    pub created: chrono::DateTime<chrono::Utc>,
    pub started: Option<chrono::DateTime<chrono::Utc>>,
    pub ended: Option<chrono::DateTime<chrono::Utc>>,
    pub result: Option<String>,
    pub encryption_out_of_sync: bool,
    pub output_stream_text: Option<String>,
    pub error_stream_text: Option<String>,
    pub meta_data_text: Option<String>,
    pub messages: Vec<Message>,
}

impl Job {
    /// Creates a job in state `READY_TO_START`
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            state: JobStatusState::ReadyToStart,
            created: chrono::Utc::now(),
            started: None,
            ended: None,
            result: None,
            encryption_out_of_sync: false,
            output_stream_text: None,
            error_stream_text: None,
            meta_data_text: None,
            messages: Vec::new(),
        }
    }
}

/// Job state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatusState {
    Created,
    ReadyToStart,
    Running,
    CancelRequested,
    Canceled,
    Done,
    Failed,
}

impl JobStatusState {
    /// Terminal states are only ever set by result application
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Done | Self::Failed)
    }
}

/// Captured subprocess telemetry, persisted in one update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionData {
    pub output_stream_data: Option<String>,
    pub error_stream_data: Option<String>,
    pub meta_data: Option<String>,
}

//! Execution event types
//!
//! Events are written into the job workspace so the launcher script (or
//! tooling around it) can react cooperatively, e.g. on a cancel request.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionEventType {
    CancelRequested,
}

impl ExecutionEventType {
    /// File name used inside the events folder
    pub fn file_name(self) -> String {
        let name = match self {
            Self::CancelRequested => "cancel_requested",
        };
        format!("{}.json", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEventData {
    pub event_type: ExecutionEventType,
    pub creation_time_stamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl ExecutionEventData {
    pub fn new(event_type: ExecutionEventType) -> Self {
        Self {
            event_type,
            creation_time_stamp: chrono::Utc::now(),
            details: BTreeMap::new(),
        }
    }
}

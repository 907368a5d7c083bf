//! Workspace location types

use serde::{Deserialize, Serialize};

/// Absolute paths of one job workspace
///
/// Created once at task start and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceLocationData {
    pub workspace_location: String,
    pub result_file_location: String,
    pub system_out_file_location: String,
    pub system_error_file_location: String,
    pub meta_data_file_location: String,
    pub user_messages_location: String,
    pub events_location: String,
    pub source_code_zip_file_location: Option<String>,
    pub binaries_tar_file_location: Option<String>,
    pub extracted_sources_location: Option<String>,
    pub extracted_binaries_location: Option<String>,
}

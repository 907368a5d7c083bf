//! Job workspaces
//!
//! Every job gets its own folder below `<root>/workspace/<job uuid>/`:
//!
//! ```text
//! metadata.txt
//! output/result.txt
//! output/system-out.log
//! output/system-error.log
//! output/messages/
//! events/
//! upload/sourcecode.zip
//! upload/binaries.tar
//! extracted/sources/
//! extracted/binaries/
//! ```

use pds_core::domain::configuration::JobConfiguration;
use pds_core::domain::event::{ExecutionEventData, ExecutionEventType};
use pds_core::domain::workspace::WorkspaceLocationData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfiguration;
use crate::error::WorkspaceError;

/// Outcome of a workspace preparation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkspacePreparationResult {
    pub launcher_script_executable: bool,
}

/// Access to job workspaces
pub trait WorkspaceService: Send + Sync {
    /// Creates the workspace folders and stores the metadata file
    fn prepare(
        &self,
        job_uuid: Uuid,
        configuration: &JobConfiguration,
        meta_data: Option<&str>,
    ) -> Result<WorkspacePreparationResult, WorkspaceError>;

    /// Launcher script of the configured product
    fn product_path_for(&self, configuration: &JobConfiguration) -> Option<PathBuf>;

    fn create_location_data(&self, job_uuid: Uuid) -> WorkspaceLocationData;

    fn workspace_folder(&self, job_uuid: Uuid) -> PathBuf;

    fn messages_folder(&self, job_uuid: Uuid) -> PathBuf;

    fn events_folder(&self, job_uuid: Uuid) -> PathBuf;

    fn system_out_file(&self, job_uuid: Uuid) -> PathBuf;

    fn system_error_file(&self, job_uuid: Uuid) -> PathBuf;

    fn meta_data_file(&self, job_uuid: Uuid) -> PathBuf;

    fn result_file(&self, job_uuid: Uuid) -> PathBuf;

    fn has_extracted_sources(&self, job_uuid: Uuid) -> bool;

    fn has_extracted_binaries(&self, job_uuid: Uuid) -> bool;

    /// Writes an event for cooperative consumption by the running product
    fn send_event(
        &self,
        job_uuid: Uuid,
        event_type: ExecutionEventType,
        event_data: &ExecutionEventData,
    ) -> Result<(), WorkspaceError>;

    fn is_workspace_auto_clean_disabled(&self) -> bool;

    /// Removes the whole job workspace
    fn cleanup(&self, job_uuid: Uuid) -> Result<(), WorkspaceError>;
}

/// Workspaces on the local file system
pub struct LocalWorkspaceService {
    workspace_root: PathBuf,
    auto_clean_disabled: bool,
    server_configuration: Arc<ServerConfiguration>,
}

impl LocalWorkspaceService {
    /// `root_folder` is the parent of the `workspace` folder
    pub fn new(
        root_folder: impl AsRef<Path>,
        auto_clean_disabled: bool,
        server_configuration: Arc<ServerConfiguration>,
    ) -> Self {
        Self {
            workspace_root: root_folder.as_ref().join("workspace"),
            auto_clean_disabled,
            server_configuration,
        }
    }

    fn output_folder(&self, job_uuid: Uuid) -> PathBuf {
        self.workspace_folder(job_uuid).join("output")
    }

    fn upload_folder(&self, job_uuid: Uuid) -> PathBuf {
        self.workspace_folder(job_uuid).join("upload")
    }

    fn extracted_sources_folder(&self, job_uuid: Uuid) -> PathBuf {
        self.workspace_folder(job_uuid).join("extracted").join("sources")
    }

    fn extracted_binaries_folder(&self, job_uuid: Uuid) -> PathBuf {
        self.workspace_folder(job_uuid).join("extracted").join("binaries")
    }
}

impl WorkspaceService for LocalWorkspaceService {
    fn prepare(
        &self,
        job_uuid: Uuid,
        configuration: &JobConfiguration,
        meta_data: Option<&str>,
    ) -> Result<WorkspacePreparationResult, WorkspaceError> {
        for folder in [
            self.output_folder(job_uuid),
            self.messages_folder(job_uuid),
            self.events_folder(job_uuid),
            self.upload_folder(job_uuid),
            self.extracted_sources_folder(job_uuid),
            self.extracted_binaries_folder(job_uuid),
        ] {
            create_dir_all(&folder)?;
        }

        if let Some(meta_data) = meta_data {
            let file = self.meta_data_file(job_uuid);
            std::fs::write(&file, meta_data).map_err(|source| io_error(&file, source))?;
        }

        let launcher_script_executable = match self.product_path_for(configuration) {
            Some(path) => is_executable(&path),
            None => {
                warn!(
                    "No launcher script defined for product '{}'",
                    configuration.product_id
                );
                false
            }
        };

        debug!(
            "Prepared workspace {} (launcher script executable: {})",
            self.workspace_folder(job_uuid).display(),
            launcher_script_executable
        );

        Ok(WorkspacePreparationResult {
            launcher_script_executable,
        })
    }

    fn product_path_for(&self, configuration: &JobConfiguration) -> Option<PathBuf> {
        self.server_configuration
            .product_setup(&configuration.product_id)
            .map(|product| PathBuf::from(&product.path))
    }

    fn create_location_data(&self, job_uuid: Uuid) -> WorkspaceLocationData {
        let location = |path: PathBuf| path.display().to_string();
        let upload = self.upload_folder(job_uuid);

        WorkspaceLocationData {
            workspace_location: location(self.workspace_folder(job_uuid)),
            result_file_location: location(self.result_file(job_uuid)),
            system_out_file_location: location(self.system_out_file(job_uuid)),
            system_error_file_location: location(self.system_error_file(job_uuid)),
            meta_data_file_location: location(self.meta_data_file(job_uuid)),
            user_messages_location: location(self.messages_folder(job_uuid)),
            events_location: location(self.events_folder(job_uuid)),
            source_code_zip_file_location: Some(location(upload.join("sourcecode.zip"))),
            binaries_tar_file_location: Some(location(upload.join("binaries.tar"))),
            extracted_sources_location: Some(location(self.extracted_sources_folder(job_uuid))),
            extracted_binaries_location: Some(location(self.extracted_binaries_folder(job_uuid))),
        }
    }

    fn workspace_folder(&self, job_uuid: Uuid) -> PathBuf {
        self.workspace_root.join(job_uuid.to_string())
    }

    fn messages_folder(&self, job_uuid: Uuid) -> PathBuf {
        self.output_folder(job_uuid).join("messages")
    }

    fn events_folder(&self, job_uuid: Uuid) -> PathBuf {
        self.workspace_folder(job_uuid).join("events")
    }

    fn system_out_file(&self, job_uuid: Uuid) -> PathBuf {
        self.output_folder(job_uuid).join("system-out.log")
    }

    fn system_error_file(&self, job_uuid: Uuid) -> PathBuf {
        self.output_folder(job_uuid).join("system-error.log")
    }

    fn meta_data_file(&self, job_uuid: Uuid) -> PathBuf {
        self.workspace_folder(job_uuid).join("metadata.txt")
    }

    fn result_file(&self, job_uuid: Uuid) -> PathBuf {
        self.output_folder(job_uuid).join("result.txt")
    }

    fn has_extracted_sources(&self, job_uuid: Uuid) -> bool {
        has_entries(&self.extracted_sources_folder(job_uuid))
    }

    fn has_extracted_binaries(&self, job_uuid: Uuid) -> bool {
        has_entries(&self.extracted_binaries_folder(job_uuid))
    }

    fn send_event(
        &self,
        job_uuid: Uuid,
        event_type: ExecutionEventType,
        event_data: &ExecutionEventData,
    ) -> Result<(), WorkspaceError> {
        let folder = self.events_folder(job_uuid);
        create_dir_all(&folder)?;

        let file = folder.join(event_type.file_name());
        let json = serde_json::to_string_pretty(event_data)?;
        std::fs::write(&file, json).map_err(|source| io_error(&file, source))?;

        info!("Sent event {:?} to job {}", event_type, job_uuid);
        Ok(())
    }

    fn is_workspace_auto_clean_disabled(&self) -> bool {
        self.auto_clean_disabled
    }

    fn cleanup(&self, job_uuid: Uuid) -> Result<(), WorkspaceError> {
        let folder = self.workspace_folder(job_uuid);
        if !folder.exists() {
            return Ok(());
        }
        std::fs::remove_dir_all(&folder).map_err(|source| io_error(&folder, source))
    }
}

fn create_dir_all(path: &Path) -> Result<(), WorkspaceError> {
    std::fs::create_dir_all(path).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> WorkspaceError {
    WorkspaceError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn has_entries(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

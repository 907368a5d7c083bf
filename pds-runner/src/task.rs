//! Process execution task
//!
//! Runs the complete lifecycle of one job: marks it running, prepares the
//! workspace, launches the product launcher script, waits with the product
//! timeout and persists everything the product left behind.

use pds_core::constants::parameter;
use pds_core::domain::configuration::JobConfiguration;
use pds_core::domain::job::ExecutionData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{RepositoryError, TaskError};
use crate::execution::{CancelDetection, ExecutionResult};
use crate::messages::MessageCollector;
use crate::process::{LaunchSpec, ProcessHandle, ProcessLauncher};
use crate::repository::JobTransactionService;
use crate::retry::retry_on_optimistic_lock;
use crate::service::ExecutionEnvironmentService;
use crate::timeout::{ProcessHandlingDataFactory, ProductLaunchProcessHandlingData};
use crate::workspace::WorkspaceService;

const MAXIMUM_START_TRUNCATE_CHARS: usize = 1024;
const MAXIMUM_UPDATE_TRIES: u32 = 3;
const KILL_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Collaborators of a task, shared by all tasks of an execution service
#[derive(Clone)]
pub struct ExecutionServices {
    pub transaction_service: Arc<dyn JobTransactionService>,
    pub workspace_service: Arc<dyn WorkspaceService>,
    pub environment_service: Arc<ExecutionEnvironmentService>,
    pub process_launcher: Arc<dyn ProcessLauncher>,
    pub process_handling_data_factory: ProcessHandlingDataFactory,
    pub cancel_detection: Arc<dyn CancelDetection>,
    pub message_collector: MessageCollector,
    pub stream_refresh_interval: Duration,
}

pub struct ProcessExecutionTask {
    job_uuid: Uuid,
    services: ExecutionServices,
    process: Mutex<Option<Arc<dyn ProcessHandle>>>,
    configuration: Mutex<Option<JobConfiguration>>,
    cancel_operations_started: AtomicBool,
}

impl ProcessExecutionTask {
    pub fn new(job_uuid: Uuid, services: ExecutionServices) -> Self {
        Self {
            job_uuid,
            services,
            process: Mutex::new(None),
            configuration: Mutex::new(None),
            cancel_operations_started: AtomicBool::new(false),
        }
    }

    pub fn job_uuid(&self) -> Uuid {
        self.job_uuid
    }

    /// Executes the job, never fails
    ///
    /// Every problem is reported inside the returned result.
    pub async fn call(&self) -> ExecutionResult {
        info!("Prepare execution of PDS job: {}", self.job_uuid);

        let mut result = match self.execute().await {
            Ok(result) => result,
            Err(e) => {
                error!("Execution of job {} failed: {}", self.job_uuid, e);
                let text = format!("Execution of job {} failed: {}", self.job_uuid, e);
                if e.is_encryption_failure() {
                    ExecutionResult::encryption_failure(text)
                } else {
                    ExecutionResult::failed(text)
                }
            }
        };

        self.clean_up_workspace();

        // any exit code other than 0 is an error
        if result.exit_code != 0 {
            result.failed = true;
        }
        if self.cancel_operations_started.load(Ordering::SeqCst) {
            result.canceled = true;
        }

        info!(
            "Finished execution of job {} with exit code={}, failed={}, canceled={}",
            self.job_uuid, result.exit_code, result.failed, result.canceled
        );

        if result.failed {
            let product_path = self
                .configuration()
                .and_then(|c| self.services.workspace_service.product_path_for(&c));
            error!(
                "Execution of PDS job {} failed! Product path: {:?}, exit code: {}",
                self.job_uuid, product_path, result.exit_code
            );
        }

        result
    }

    async fn execute(&self) -> Result<ExecutionResult, TaskError> {
        let transaction_service = &self.services.transaction_service;
        let workspace_service = &self.services.workspace_service;

        transaction_service
            .mark_job_as_running_in_own_transaction(self.job_uuid)
            .await?;

        let data = transaction_service
            .get_job_configuration_data_or_fail(self.job_uuid)
            .await?;
        let configuration = data.job_configuration;
        self.set_configuration(configuration.clone());

        if let Some(sechub_job_uuid) = configuration.sechub_job_uuid {
            debug!("PDS job {} belongs to SecHub job {}", self.job_uuid, sechub_job_uuid);
        }

        let add_script_log = configuration.is_enabled(parameter::ADD_SCRIPTLOG_TO_PDSLOG_ENABLED);
        if add_script_log {
            info!("Script log output will be added to PDS logs");
        }

        let location = workspace_service.create_location_data(self.job_uuid);

        let launch_data = self
            .services
            .process_handling_data_factory
            .create_for_launch_operation(&configuration);
        if launch_data.minutes_to_wait_before_product_timeout < 1 {
            return Err(TaskError::TimeoutTooLow(
                launch_data.minutes_to_wait_before_product_timeout,
            ));
        }

        debug!("Start workspace preparation for PDS job: {}", self.job_uuid);
        let preparation =
            workspace_service.prepare(self.job_uuid, &configuration, data.meta_data.as_deref())?;

        if !preparation.launcher_script_executable {
            warn!(
                "Workspace not prepared enough for launcher script, skipping execution of product: {} for PDS job: {}",
                configuration.product_id, self.job_uuid
            );
            return Ok(ExecutionResult::failed(format!(
                "Launcher script of product {} is missing or not executable",
                configuration.product_id
            )));
        }

        let program = workspace_service
            .product_path_for(&configuration)
            .ok_or_else(|| TaskError::ProductPathMissing(configuration.product_id.clone()))?;

        let environment = self.services.environment_service.build_environment(
            self.job_uuid,
            &configuration,
            workspace_service.as_ref(),
        );

        let spec = LaunchSpec {
            program: program.clone(),
            args: Vec::new(),
            working_directory: None,
            environment,
            stdout_file: PathBuf::from(&location.system_out_file_location),
            stderr_file: PathBuf::from(&location.system_error_file_location),
        };

        info!(
            "Start launcher script for PDS job: {} from path: {}",
            self.job_uuid,
            program.display()
        );
        let process = self.services.process_launcher.start(spec)?;
        self.set_process(Arc::clone(&process));

        Ok(self
            .wait_for_process_end_and_get_result(
                process.as_ref(),
                &configuration,
                launch_data,
                add_script_log,
            )
            .await)
    }

    async fn wait_for_process_end_and_get_result(
        &self,
        process: &dyn ProcessHandle,
        configuration: &JobConfiguration,
        launch_data: ProductLaunchProcessHandlingData,
        add_script_log: bool,
    ) -> ExecutionResult {
        let refresher = self.spawn_stream_data_refresher();

        debug!(
            "Wait for process of job {}, will wait {} minutes for result from product {}",
            self.job_uuid, launch_data.minutes_to_wait_before_product_timeout, configuration.product_id
        );
        let started = Instant::now();

        let exit_done_in_time = process.wait_for(launch_data.product_timeout()).await;

        let result = if exit_done_in_time {
            // a missing code means the process was terminated by a signal
            let exit_code = process.exit_code().unwrap_or(1);

            debug!(
                "Process of PDS job {} ended in time with exit code {} after {} ms",
                self.job_uuid,
                exit_code,
                started.elapsed().as_millis()
            );
            if launch_data.handling.still_waiting_for_acceptance() && exit_code != 0 {
                warn!(
                    "Process of PDS job {} failed directly after start",
                    self.job_uuid
                );
            }

            let mut result = self.read_result_file_or_create_problem_data();
            result.exit_code = exit_code;
            if !result.failed && self.services.cancel_detection.is_canceled(&result.result_text) {
                result.canceled = true;
            }
            result
        } else {
            error!(
                "Process did not end in time for PDS job {} of product {}. Waited {} minutes.",
                self.job_uuid, configuration.product_id, launch_data.minutes_to_wait_before_product_timeout
            );

            self.terminate_process(process, Some(configuration)).await;
            ExecutionResult::failed("Product time out.")
        };

        refresher.stop().await;

        self.write_job_execution_data(add_script_log).await;
        self.write_product_messages().await;

        result
    }

    fn read_result_file_or_create_problem_data(&self) -> ExecutionResult {
        let workspace_service = &self.services.workspace_service;
        let result_file = workspace_service.result_file(self.job_uuid);

        if result_file.exists() {
            debug!("Result file found - will read data and set as result");
            return match std::fs::read_to_string(&result_file) {
                Ok(text) => ExecutionResult {
                    result_text: text,
                    ..ExecutionResult::default()
                },
                Err(e) => ExecutionResult::failed(format!(
                    "Result file at {} not readable: {}",
                    result_file.display(),
                    e
                )),
            };
        }

        debug!("Result file NOT found - will append output and error streams as result");
        let mut text = format!("Result file not found at {}", absolute(&result_file).display());

        let output = read_optional(&workspace_service.system_out_file(self.job_uuid));
        if let Some(output) = &output {
            text.push_str("\nOutput:\n");
            text.push_str(output);
        }

        let errors = read_optional(&workspace_service.system_error_file(self.job_uuid));
        if let Some(errors) = &errors {
            text.push_str("\nErrors:\n");
            text.push_str(errors);
        }

        error!(
            "Execution of PDS job {} created no result file!\n\nJob error stream (first {} chars):\n{}\n\nJob output stream (first {} chars):\n{}",
            self.job_uuid,
            MAXIMUM_START_TRUNCATE_CHARS,
            shrink_to(errors.as_deref().unwrap_or_default(), MAXIMUM_START_TRUNCATE_CHARS),
            MAXIMUM_START_TRUNCATE_CHARS,
            shrink_to(output.as_deref().unwrap_or_default(), MAXIMUM_START_TRUNCATE_CHARS),
        );

        ExecutionResult {
            result_text: text,
            failed: true,
            ..ExecutionResult::default()
        }
    }

    /// Called before the execution is cancelled, either by a caller or because
    /// the product timed out
    ///
    /// Safe at any point of the lifecycle. Returns `true` when no process runs
    /// anymore afterwards.
    pub async fn prepare_for_cancel(&self, may_interrupt_if_running: bool) -> bool {
        info!("Prepare cancel of PDS job: {}: starting", self.job_uuid);

        let Some(process) = self.process() else {
            info!(
                "Skip cancellation of PDS job {} because no process was started",
                self.job_uuid
            );
            return true;
        };

        if !process.is_alive() {
            info!(
                "Skip cancellation of PDS job {} because process is no longer alive",
                self.job_uuid
            );
            return true;
        }

        if !may_interrupt_if_running {
            info!(
                "Cancel of PDS job {} does not interrupt the running process",
                self.job_uuid
            );
            return false;
        }

        self.cancel_operations_started.store(true, Ordering::SeqCst);

        let configuration = self.configuration();
        let terminated = self
            .terminate_process(process.as_ref(), configuration.as_ref())
            .await;

        self.clean_up_workspace();
        terminated
    }

    /// Kills a still running product process without any grace window
    ///
    /// Used on shutdown, nothing about the job is written afterwards.
    pub fn kill_process(&self) {
        let Some(process) = self.process() else {
            return;
        };
        if !process.is_alive() {
            return;
        }

        info!("Kill process of PDS job {} on shutdown", self.job_uuid);
        if let Err(e) = process.kill() {
            error!("Was not able to kill process of PDS job {}: {}", self.job_uuid, e);
        }
    }

    /// Gives the process the configured grace window to end itself, then kills it
    async fn terminate_process(
        &self,
        process: &dyn ProcessHandle,
        configuration: Option<&JobConfiguration>,
    ) -> bool {
        let handling_data = match configuration {
            Some(configuration) => Some(
                self.services
                    .process_handling_data_factory
                    .create_for_cancel_operation(configuration),
            ),
            None => {
                warn!(
                    "No configuration available for job: {}. No process wait possible.",
                    self.job_uuid
                );
                None
            }
        };

        match handling_data {
            Some(data) if data.handling.still_waiting_for_acceptance() => {
                info!(
                    "Cancel job: {}: give process chance to cancel. Will wait a maximum time of {} seconds. The check interval is: {} milliseconds",
                    self.job_uuid,
                    data.handling.seconds_to_wait_for_acceptance(),
                    data.milliseconds_to_wait_for_next_check
                );

                while data.handling.still_waiting_for_acceptance() {
                    if !process.is_alive() {
                        info!("Cancel PDS job: {}: process is no longer alive", self.job_uuid);
                        break;
                    }
                    time::sleep(data.check_interval()).await;
                }

                info!(
                    "Cancel PDS job: {}: waited {} milliseconds at all",
                    self.job_uuid,
                    data.handling.elapsed_millis()
                );
            }
            _ => info!("Cancel PDS job: {}: will not wait.", self.job_uuid),
        }

        if !process.is_alive() {
            info!("Cancel PDS job: {}: has terminated itself.", self.job_uuid);
            return true;
        }

        info!(
            "Cancel PDS job: {}: still alive, will destroy underlying process forcibly.",
            self.job_uuid
        );
        if let Err(e) = process.kill() {
            error!("Cancel PDS job: {}: {}", self.job_uuid, e);
            return false;
        }
        process.wait_for(KILL_CONFIRMATION_TIMEOUT).await
    }

    fn spawn_stream_data_refresher(&self) -> StreamDataRefresher {
        let job_uuid = self.job_uuid;
        let transaction_service = Arc::clone(&self.services.transaction_service);
        let workspace_service = Arc::clone(&self.services.workspace_service);
        let interval = self.services.stream_refresh_interval;

        StreamDataRefresher(Some(tokio::spawn(async move {
            let mut ticker = time::interval(interval);

            loop {
                ticker.tick().await;

                if !transaction_service.is_job_stream_update_necessary(job_uuid).await {
                    continue;
                }

                debug!("Refresh stream data of PDS job {}", job_uuid);
                let data = read_execution_data(workspace_service.as_ref(), job_uuid);
                if let Err(e) =
                    update_execution_data(transaction_service.as_ref(), job_uuid, data).await
                {
                    error!("Job execution data refresh failed for {}: {}", job_uuid, e);
                }
            }
        })))
    }

    async fn write_job_execution_data(&self, add_script_log: bool) {
        debug!(
            "Writing job execution data to database for PDS job: {}",
            self.job_uuid
        );

        let data = read_execution_data(self.services.workspace_service.as_ref(), self.job_uuid);
        let output = data.output_stream_data.clone();
        let errors = data.error_stream_data.clone();

        if let Err(e) =
            update_execution_data(self.services.transaction_service.as_ref(), self.job_uuid, data)
                .await
        {
            error!(
                "Was not able to store execution data of PDS job {}: {}",
                self.job_uuid, e
            );
        }

        if add_script_log {
            info!(
                "Script output of PDS job {}\nOutput stream:\n\n{}\n\nError stream:\n\n{}",
                self.job_uuid,
                output.unwrap_or_default(),
                errors.unwrap_or_default()
            );
        }
    }

    async fn write_product_messages(&self) {
        debug!("Collect messages for PDS job: {}", self.job_uuid);

        let folder = self.services.workspace_service.messages_folder(self.job_uuid);
        let messages = match self.services.message_collector.collect(Some(&folder)) {
            Ok(messages) => messages,
            Err(e) => {
                error!("Was not able to collect messages of PDS job {}: {}", self.job_uuid, e);
                return;
            }
        };

        let transaction_service = &self.services.transaction_service;
        let job_uuid = self.job_uuid;
        let updated = retry_on_optimistic_lock(MAXIMUM_UPDATE_TRIES, &job_uuid.to_string(), || {
            transaction_service.update_job_messages_in_own_transaction(job_uuid, messages.clone())
        })
        .await;

        if let Err(e) = updated {
            error!("Was not able to store messages of PDS job {}: {}", job_uuid, e);
        }
    }

    fn clean_up_workspace(&self) {
        let workspace_service = &self.services.workspace_service;

        if workspace_service.is_workspace_auto_clean_disabled() {
            info!(
                "Auto cleanup is disabled, so keep files at {}",
                workspace_service.workspace_folder(self.job_uuid).display()
            );
            return;
        }

        match workspace_service.cleanup(self.job_uuid) {
            Ok(()) => debug!("Workspace cleanup done for job: {}", self.job_uuid),
            Err(e) => error!("Workspace cleanup failed for job {}: {}", self.job_uuid, e),
        }
    }

    fn process(&self) -> Option<Arc<dyn ProcessHandle>> {
        self.process.lock().ok().and_then(|process| process.clone())
    }

    fn set_process(&self, process: Arc<dyn ProcessHandle>) {
        if let Ok(mut slot) = self.process.lock() {
            *slot = Some(process);
        }
    }

    fn configuration(&self) -> Option<JobConfiguration> {
        self.configuration.lock().ok().and_then(|c| c.clone())
    }

    fn set_configuration(&self, configuration: JobConfiguration) {
        if let Ok(mut slot) = self.configuration.lock() {
            *slot = Some(configuration);
        }
    }
}

/// Background stream refresh of a running job, stopped when dropped
///
/// Dropping also covers a task that is aborted while it waits for the product.
struct StreamDataRefresher(Option<JoinHandle<()>>);

impl StreamDataRefresher {
    /// Stops the refresh and waits until no refresh write is in flight
    async fn stop(mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
            // cancelled is the expected outcome
            let _ = handle.await;
        }
    }
}

impl Drop for StreamDataRefresher {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

async fn update_execution_data(
    transaction_service: &dyn JobTransactionService,
    job_uuid: Uuid,
    data: ExecutionData,
) -> Result<(), RepositoryError> {
    retry_on_optimistic_lock(MAXIMUM_UPDATE_TRIES, &job_uuid.to_string(), || {
        transaction_service.update_job_execution_data_in_own_transaction(job_uuid, data.clone())
    })
    .await
}

fn read_execution_data(workspace_service: &dyn WorkspaceService, job_uuid: Uuid) -> ExecutionData {
    ExecutionData {
        output_stream_data: read_optional(&workspace_service.system_out_file(job_uuid)),
        error_stream_data: read_optional(&workspace_service.system_error_file(job_uuid)),
        meta_data: read_optional(&workspace_service.meta_data_file(job_uuid)),
    }
}

/// Content of a file, `None` when it does not exist or cannot be read
fn read_optional(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            error!("Was not able to read {}: {}", path.display(), e);
            None
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn shrink_to(content: &str, max: usize) -> String {
    if content.chars().count() < max {
        return content.to_string();
    }
    let mut shrunk: String = content.chars().take(max.saturating_sub(3)).collect();
    shrunk.push_str("...");
    shrunk
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::TokioProcessLauncher;
    use crate::repository::JobRepository;
    use crate::testing::{Behaviour, FakeLauncher, Fixture, PRODUCT_ID};
    use pds_core::constants::env;
    use pds_core::domain::configuration::JobConfigurationData;
    use pds_core::domain::message::MessageType;

    fn task(fixture: &Fixture, job_uuid: Uuid) -> Arc<ProcessExecutionTask> {
        Arc::new(ProcessExecutionTask::new(job_uuid, fixture.services.clone()))
    }

    async fn wait_until_started(fixture: &Fixture, count: usize) {
        for _ in 0..500 {
            if fixture.launcher.start_count() >= count {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Process was not started");
    }

    #[tokio::test]
    async fn test_successful_run_reads_result_file() {
        let fixture = Fixture::new(FakeLauncher::writing_result(Behaviour::Ends(0), "scan result"));
        let job_uuid = fixture.add_job();

        let result = task(&fixture, job_uuid).call().await;

        assert!(!result.failed);
        assert!(!result.canceled);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.result_text, "scan result");
        assert_eq!(fixture.transactions.marked_running.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.transactions.execution_data_updates.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.transactions.message_updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_workspace_is_cleaned_after_run() {
        let fixture = Fixture::new(FakeLauncher::writing_result(Behaviour::Ends(0), "ok"));
        let job_uuid = fixture.add_job();

        task(&fixture, job_uuid).call().await;

        assert!(!fixture.workspace.workspace_folder(job_uuid).exists());
    }

    #[tokio::test]
    async fn test_non_zero_exit_code_fails() {
        let fixture = Fixture::new(FakeLauncher::writing_result(Behaviour::Ends(3), "partial"));
        let job_uuid = fixture.add_job();

        let result = task(&fixture, job_uuid).call().await;

        assert!(result.failed);
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.result_text, "partial");
    }

    #[tokio::test]
    async fn test_missing_result_file_reports_output() {
        let launcher = FakeLauncher::new(Behaviour::Ends(0)).on_start(|spec| {
            std::fs::write(&spec.stdout_file, "some output").unwrap();
        });
        let fixture = Fixture::new(launcher);
        let job_uuid = fixture.add_job();

        let result = task(&fixture, job_uuid).call().await;

        assert!(result.failed);
        assert!(result.result_text.starts_with("Result file not found at "));
        assert!(result.result_text.contains("\nOutput:\nsome output"));
        assert!(!result.result_text.contains("\nErrors:\n"));
    }

    #[tokio::test]
    async fn test_product_timeout_kills_process_and_writes_data_once() {
        let launcher = FakeLauncher::new(Behaviour::TimesOut).on_start(|spec| {
            std::fs::write(&spec.stdout_file, "the output").unwrap();
            std::fs::write(&spec.stderr_file, "an error").unwrap();
        });
        let fixture = Fixture::new(launcher);
        let job_uuid = fixture.add_job_with_data(JobConfigurationData {
            job_configuration: JobConfiguration::new(PRODUCT_ID),
            meta_data: Some("meta data".to_string()),
        });

        let result = task(&fixture, job_uuid).call().await;

        assert!(result.failed);
        assert!(!result.canceled);
        assert_eq!(result.result_text, "Product time out.");

        let processes = fixture.launcher.processes();
        assert_eq!(processes.len(), 1);
        assert_eq!(processes[0].kill_count(), 1);
        assert!(!processes[0].is_alive());
        assert_eq!(fixture.transactions.execution_data_updates.load(Ordering::SeqCst), 1);

        let job = fixture.store.find_by_id(job_uuid).await.unwrap().unwrap();
        assert_eq!(job.output_stream_text.as_deref(), Some("the output"));
        assert_eq!(job.error_stream_text.as_deref(), Some("an error"));
        assert_eq!(job.meta_data_text.as_deref(), Some("meta data"));
    }

    #[tokio::test]
    async fn test_encryption_out_of_sync_fails_without_start() {
        let fixture = Fixture::new(FakeLauncher::new(Behaviour::Ends(0)));
        let job_uuid = fixture.add_job();
        fixture.store.mark_encryption_out_of_sync(job_uuid).unwrap();

        let result = task(&fixture, job_uuid).call().await;

        assert!(result.failed);
        assert!(result.encryption_failure);
        assert_eq!(fixture.launcher.start_count(), 0);
        assert_eq!(fixture.transactions.execution_data_updates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_job_fails_without_start() {
        let fixture = Fixture::new(FakeLauncher::new(Behaviour::Ends(0)));

        let result = task(&fixture, Uuid::new_v4()).call().await;

        assert!(result.failed);
        assert!(!result.encryption_failure);
        assert_eq!(fixture.launcher.start_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_product_fails_without_start() {
        let fixture = Fixture::new(FakeLauncher::new(Behaviour::Ends(0)));
        let job_uuid = fixture.add_job_with(JobConfiguration::new("UNKNOWN_PRODUCT"));

        let result = task(&fixture, job_uuid).call().await;

        assert!(result.failed);
        assert_eq!(fixture.launcher.start_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_detection_marks_canceled() {
        let detection: Arc<dyn CancelDetection> =
            Arc::new(|text: &str| text.contains("CANCELED BY PRODUCT"));
        let fixture = Fixture::with_cancel_detection(
            FakeLauncher::writing_result(Behaviour::Ends(0), "CANCELED BY PRODUCT"),
            detection,
        );
        let job_uuid = fixture.add_job();

        let result = task(&fixture, job_uuid).call().await;

        assert!(result.canceled);
        assert!(!result.failed);
    }

    #[tokio::test]
    async fn test_launcher_gets_job_environment() {
        let fixture = Fixture::new(FakeLauncher::writing_result(Behaviour::Ends(0), "ok"));
        let job_uuid = fixture.add_job_with(
            JobConfiguration::new(PRODUCT_ID)
                .with_parameter(parameter::SCAN_TARGET_URL, "https://example.org"),
        );

        task(&fixture, job_uuid).call().await;

        let spec = fixture.launcher.last_spec().unwrap();
        assert_eq!(
            spec.environment.get(env::PDS_JOB_UUID),
            Some(&job_uuid.to_string())
        );
        assert_eq!(
            spec.environment.get("PDS_SCAN_TARGET_URL").map(String::as_str),
            Some("https://example.org")
        );
        assert_eq!(spec.stdout_file, fixture.workspace.system_out_file(job_uuid));
    }

    #[tokio::test]
    async fn test_product_messages_are_stored() {
        let launcher = FakeLauncher::new(Behaviour::Ends(0)).on_start(|spec| {
            let folder = PathBuf::from(&spec.environment[env::PDS_JOB_USER_MESSAGES_FOLDER]);
            std::fs::write(folder.join("ERROR_1.txt"), "product problem").unwrap();
        });
        let fixture = Fixture::new(launcher);
        let job_uuid = fixture.add_job();

        task(&fixture, job_uuid).call().await;

        let job = fixture.store.find_by_id(job_uuid).await.unwrap().unwrap();
        assert_eq!(job.messages.len(), 1);
        assert_eq!(job.messages[0].message_type, MessageType::Error);
        assert_eq!(job.messages[0].text, "product problem");
    }

    #[tokio::test]
    async fn test_prepare_for_cancel_terminates_running_process() {
        let fixture = Fixture::new(FakeLauncher::new(Behaviour::Hangs));
        let job_uuid = fixture.add_job();
        let task = task(&fixture, job_uuid);

        let running = tokio::spawn({
            let task = Arc::clone(&task);
            async move { task.call().await }
        });
        wait_until_started(&fixture, 1).await;

        assert!(task.prepare_for_cancel(true).await);

        let result = running.await.unwrap();
        assert!(result.canceled);
        assert_eq!(fixture.launcher.processes()[0].kill_count(), 1);
    }

    #[tokio::test]
    async fn test_prepare_for_cancel_without_interrupt_keeps_process() {
        let fixture = Fixture::new(FakeLauncher::new(Behaviour::Hangs));
        let job_uuid = fixture.add_job();
        let task = task(&fixture, job_uuid);

        let running = tokio::spawn({
            let task = Arc::clone(&task);
            async move { task.call().await }
        });
        wait_until_started(&fixture, 1).await;

        assert!(!task.prepare_for_cancel(false).await);

        let process = fixture.launcher.processes()[0].clone();
        assert!(process.is_alive());
        process.finish(0);

        let result = running.await.unwrap();
        assert!(!result.canceled);
        assert_eq!(process.kill_count(), 0);
    }

    #[tokio::test]
    async fn test_prepare_for_cancel_before_start() {
        let fixture = Fixture::new(FakeLauncher::new(Behaviour::Hangs));
        let job_uuid = fixture.add_job();

        assert!(task(&fixture, job_uuid).prepare_for_cancel(true).await);
        assert_eq!(fixture.launcher.start_count(), 0);
    }

    fn with_maximum_cancel_wait() -> JobConfiguration {
        JobConfiguration::new(PRODUCT_ID).with_parameter(
            parameter::CANCEL_MAXIMUM_WAITTIME_SECONDS,
            i64::MAX.to_string(),
        )
    }

    #[tokio::test]
    async fn test_prepare_for_cancel_with_maximum_wait_time() {
        let fixture = Fixture::new(FakeLauncher::new(Behaviour::Hangs));
        let job_uuid = fixture.add_job_with(with_maximum_cancel_wait());
        let task = task(&fixture, job_uuid);

        let running = tokio::spawn({
            let task = Arc::clone(&task);
            async move { task.call().await }
        });
        wait_until_started(&fixture, 1).await;

        let cancelling = tokio::spawn({
            let task = Arc::clone(&task);
            async move { task.prepare_for_cancel(true).await }
        });

        // the grace window never ends, the process has to end itself
        time::sleep(Duration::from_millis(100)).await;
        assert!(!cancelling.is_finished());
        fixture.launcher.processes()[0].finish(0);

        assert!(cancelling.await.unwrap());
        assert_eq!(fixture.launcher.processes()[0].kill_count(), 0);
        assert!(running.await.unwrap().canceled);
    }

    #[tokio::test]
    async fn test_product_timeout_with_maximum_cancel_wait_time() {
        let fixture = Fixture::new(FakeLauncher::new(Behaviour::TimesOut));
        let job_uuid = fixture.add_job_with(with_maximum_cancel_wait());
        let task = task(&fixture, job_uuid);

        let running = tokio::spawn({
            let task = Arc::clone(&task);
            async move { task.call().await }
        });
        wait_until_started(&fixture, 1).await;

        time::sleep(Duration::from_millis(100)).await;
        fixture.launcher.processes()[0].finish(0);

        let result = running.await.unwrap();
        assert!(result.failed);
        assert_eq!(result.result_text, "Product time out.");
    }

    #[tokio::test]
    async fn test_final_stream_data_wins_over_refresh() {
        let launcher = FakeLauncher::new(Behaviour::Hangs).on_start(|spec| {
            std::fs::write(&spec.stdout_file, "early output").unwrap();
        });
        let fixture = Fixture::new(launcher);
        let job_uuid = fixture.add_job();

        let running = tokio::spawn({
            let task = task(&fixture, job_uuid);
            async move { task.call().await }
        });
        wait_until_started(&fixture, 1).await;

        fixture.store.request_stream_update(job_uuid).unwrap();
        for _ in 0..500 {
            let job = fixture.store.find_by_id(job_uuid).await.unwrap().unwrap();
            if job.output_stream_text.as_deref() == Some("early output") {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }

        // keep the refresher busy while the product ends
        fixture.store.request_stream_update(job_uuid).unwrap();
        let spec = fixture.launcher.last_spec().unwrap();
        std::fs::write(&spec.stdout_file, "final output").unwrap();
        fixture.launcher.processes()[0].finish(0);

        running.await.unwrap();
        time::sleep(Duration::from_millis(100)).await;

        let job = fixture.store.find_by_id(job_uuid).await.unwrap().unwrap();
        assert_eq!(job.output_stream_text.as_deref(), Some("final output"));
        assert!(fixture.transactions.execution_data_updates.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_kill_process_stops_running_product() {
        let fixture = Fixture::new(FakeLauncher::new(Behaviour::Hangs));
        let job_uuid = fixture.add_job();
        let task = task(&fixture, job_uuid);

        task.kill_process();

        let running = tokio::spawn({
            let task = Arc::clone(&task);
            async move { task.call().await }
        });
        wait_until_started(&fixture, 1).await;

        task.kill_process();
        running.await.unwrap();

        let process = &fixture.launcher.processes()[0];
        assert!(!process.is_alive());
        assert_eq!(process.kill_count(), 1);

        task.kill_process();
        assert_eq!(process.kill_count(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_launcher_script_run() {
        let mut fixture = Fixture::new(FakeLauncher::new(Behaviour::Ends(0)));
        fixture.services.process_launcher = Arc::new(TokioProcessLauncher::new());
        let job_uuid = fixture.add_job();

        let result = task(&fixture, job_uuid).call().await;

        assert!(!result.failed, "{}", result.result_text);
        assert_eq!(result.result_text, "real result");

        let job = fixture.store.find_by_id(job_uuid).await.unwrap().unwrap();
        assert_eq!(
            job.output_stream_text.as_deref(),
            Some(format!("launched {}\n", job_uuid).as_str())
        );
    }

    #[test]
    fn test_shrink_to() {
        assert_eq!(shrink_to("short", 10), "short");
        assert_eq!(shrink_to("0123456789abc", 10), "0123456...");
    }
}

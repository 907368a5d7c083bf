//! Test doubles shared by the unit tests

use async_trait::async_trait;
use pds_core::constants::env;
use pds_core::domain::configuration::{JobConfiguration, JobConfigurationData};
use pds_core::domain::job::{ExecutionData, Job};
use pds_core::domain::message::Message;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use crate::config::{ProductSetup, ServerConfiguration};
use crate::error::{ConfigFetchError, ProcessError, RepositoryError};
use crate::execution::{CancelDetection, NoCancelDetection};
use crate::messages::MessageCollector;
use crate::process::{LaunchSpec, ProcessHandle, ProcessLauncher};
use crate::repository::{InMemoryJobStore, JobTransactionService};
use crate::service::ExecutionEnvironmentService;
use crate::task::ExecutionServices;
use crate::timeout::ProcessHandlingDataFactory;
use crate::workspace::LocalWorkspaceService;

pub const PRODUCT_ID: &str = "PDS_TEST_PRODUCT";

/// How a fake product process behaves once started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Ends directly with the given exit code
    Ends(i32),
    /// Keeps running, every wait reports an elapsed product timeout
    TimesOut,
    /// Keeps running until it is killed or finished by the test
    Hangs,
}

/// Product process controlled by the test
pub struct FakeProcess {
    behaviour: Behaviour,
    // outer `None` while running, inner value is the exit code
    exit: watch::Sender<Option<Option<i32>>>,
    kills: AtomicUsize,
}

impl FakeProcess {
    pub fn new(behaviour: Behaviour) -> Self {
        let initial = match behaviour {
            Behaviour::Ends(code) => Some(Some(code)),
            Behaviour::TimesOut | Behaviour::Hangs => None,
        };
        let (exit, _) = watch::channel(initial);
        Self {
            behaviour,
            exit,
            kills: AtomicUsize::new(0),
        }
    }

    pub fn finish(&self, exit_code: i32) {
        self.exit.send_replace(Some(Some(exit_code)));
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    fn is_alive(&self) -> bool {
        self.exit.borrow().is_none()
    }

    async fn wait_for(&self, timeout: Duration) -> bool {
        if self.behaviour == Behaviour::TimesOut && self.is_alive() {
            return false;
        }
        let mut exit = self.exit.subscribe();
        matches!(
            tokio::time::timeout(timeout, exit.wait_for(|state| state.is_some())).await,
            Ok(Ok(_))
        )
    }

    fn kill(&self) -> Result<(), ProcessError> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.exit.send_if_modified(|state| {
            if state.is_none() {
                *state = Some(None);
                return true;
            }
            false
        });
        Ok(())
    }

    fn exit_code(&self) -> Option<i32> {
        (*self.exit.borrow()).flatten()
    }
}

type StartHook = Box<dyn Fn(&LaunchSpec) + Send + Sync>;

/// Launcher handing out fake processes, one per start
pub struct FakeLauncher {
    behaviour: Behaviour,
    on_start: Option<StartHook>,
    started: Mutex<Vec<(LaunchSpec, Arc<FakeProcess>)>>,
}

impl FakeLauncher {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            on_start: None,
            started: Mutex::new(Vec::new()),
        }
    }

    /// Runs `hook` on every start, before the process is handed out
    pub fn on_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&LaunchSpec) + Send + Sync + 'static,
    {
        self.on_start = Some(Box::new(hook));
        self
    }

    /// Launcher whose product writes `result` into the result file
    pub fn writing_result(behaviour: Behaviour, result: &'static str) -> Self {
        Self::new(behaviour).on_start(move |spec| {
            if let Some(file) = spec.environment.get(env::PDS_JOB_RESULT_FILE) {
                std::fs::write(file, result).unwrap();
            }
        })
    }

    pub fn start_count(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn last_spec(&self) -> Option<LaunchSpec> {
        self.started
            .lock()
            .unwrap()
            .last()
            .map(|(spec, _)| spec.clone())
    }

    pub fn processes(&self) -> Vec<Arc<FakeProcess>> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|(_, process)| Arc::clone(process))
            .collect()
    }

    /// Process started for the given job
    pub fn process_of(&self, job_uuid: Uuid) -> Option<Arc<FakeProcess>> {
        let job_uuid = job_uuid.to_string();
        self.started
            .lock()
            .unwrap()
            .iter()
            .find(|(spec, _)| spec.environment.get(env::PDS_JOB_UUID) == Some(&job_uuid))
            .map(|(_, process)| Arc::clone(process))
    }
}

impl ProcessLauncher for FakeLauncher {
    fn start(&self, spec: LaunchSpec) -> Result<Arc<dyn ProcessHandle>, ProcessError> {
        if let Some(hook) = &self.on_start {
            hook(&spec);
        }
        let process = Arc::new(FakeProcess::new(self.behaviour));
        self.started
            .lock()
            .unwrap()
            .push((spec, Arc::clone(&process)));
        Ok(process)
    }
}

/// Transaction service counting the calls it forwards to the store
pub struct CountingTransactions {
    store: Arc<InMemoryJobStore>,
    pub marked_running: AtomicUsize,
    pub execution_data_updates: AtomicUsize,
    pub message_updates: AtomicUsize,
}

impl CountingTransactions {
    pub fn new(store: Arc<InMemoryJobStore>) -> Self {
        Self {
            store,
            marked_running: AtomicUsize::new(0),
            execution_data_updates: AtomicUsize::new(0),
            message_updates: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl JobTransactionService for CountingTransactions {
    async fn mark_job_as_running_in_own_transaction(
        &self,
        job_uuid: Uuid,
    ) -> Result<(), RepositoryError> {
        self.marked_running.fetch_add(1, Ordering::SeqCst);
        self.store
            .mark_job_as_running_in_own_transaction(job_uuid)
            .await
    }

    async fn get_job_configuration_data_or_fail(
        &self,
        job_uuid: Uuid,
    ) -> Result<JobConfigurationData, ConfigFetchError> {
        self.store.get_job_configuration_data_or_fail(job_uuid).await
    }

    async fn update_job_execution_data_in_own_transaction(
        &self,
        job_uuid: Uuid,
        execution_data: ExecutionData,
    ) -> Result<(), RepositoryError> {
        self.execution_data_updates.fetch_add(1, Ordering::SeqCst);
        self.store
            .update_job_execution_data_in_own_transaction(job_uuid, execution_data)
            .await
    }

    async fn update_job_messages_in_own_transaction(
        &self,
        job_uuid: Uuid,
        messages: Vec<Message>,
    ) -> Result<(), RepositoryError> {
        self.message_updates.fetch_add(1, Ordering::SeqCst);
        self.store
            .update_job_messages_in_own_transaction(job_uuid, messages)
            .await
    }

    async fn is_job_stream_update_necessary(&self, job_uuid: Uuid) -> bool {
        self.store.is_job_stream_update_necessary(job_uuid).await
    }
}

/// Everything a task needs, backed by a temporary workspace root
pub struct Fixture {
    _root: tempfile::TempDir,
    pub store: Arc<InMemoryJobStore>,
    pub transactions: Arc<CountingTransactions>,
    pub launcher: Arc<FakeLauncher>,
    pub workspace: Arc<LocalWorkspaceService>,
    pub services: ExecutionServices,
}

impl Fixture {
    pub fn new(launcher: FakeLauncher) -> Self {
        Self::with_cancel_detection(launcher, Arc::new(NoCancelDetection))
    }

    pub fn with_cancel_detection(
        launcher: FakeLauncher,
        cancel_detection: Arc<dyn CancelDetection>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = launcher_script(dir.path());

        let server_configuration = Arc::new(ServerConfiguration {
            server_id: "test-server".to_string(),
            products: vec![ProductSetup::new(PRODUCT_ID, script.display().to_string())],
        });

        let store = Arc::new(InMemoryJobStore::new());
        let transactions = Arc::new(CountingTransactions::new(Arc::clone(&store)));
        let launcher = Arc::new(launcher);
        let workspace = Arc::new(LocalWorkspaceService::new(
            dir.path(),
            false,
            Arc::clone(&server_configuration),
        ));
        let environment_service = Arc::new(ExecutionEnvironmentService::with_inherited_environment(
            server_configuration,
            None,
            Default::default(),
        ));

        let services = ExecutionServices {
            transaction_service: transactions.clone(),
            workspace_service: workspace.clone(),
            environment_service,
            process_launcher: launcher.clone(),
            process_handling_data_factory: ProcessHandlingDataFactory::new(1, 1, 10),
            cancel_detection,
            message_collector: MessageCollector::new(),
            stream_refresh_interval: Duration::from_millis(20),
        };

        Self {
            _root: dir,
            store,
            transactions,
            launcher,
            workspace,
            services,
        }
    }

    /// Stores a new job for the test product
    pub fn add_job(&self) -> Uuid {
        self.add_job_with(JobConfiguration::new(PRODUCT_ID))
    }

    pub fn add_job_with(&self, configuration: JobConfiguration) -> Uuid {
        self.add_job_with_data(JobConfigurationData {
            job_configuration: configuration,
            meta_data: None,
        })
    }

    pub fn add_job_with_data(&self, data: JobConfigurationData) -> Uuid {
        let job = Job::new(Uuid::new_v4());
        let job_uuid = job.uuid;
        self.store.insert(job, data).unwrap();
        job_uuid
    }
}

/// Creates an executable launcher script writing a fixed result
///
/// Only a real process launcher runs it.
fn launcher_script(dir: &Path) -> PathBuf {
    let script = dir.join("launcher.sh");
    std::fs::write(
        &script,
        "#!/bin/sh\necho \"launched $PDS_JOB_UUID\"\nprintf 'real result' > \"$PDS_JOB_RESULT_FILE\"\n",
    )
    .unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    script
}

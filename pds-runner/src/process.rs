//! Product process control
//!
//! The execution task only talks to [`ProcessLauncher`] and [`ProcessHandle`],
//! so tests can replace the real subprocess with a fake one.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use crate::error::ProcessError;

/// Everything needed to start a launcher script
#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
    /// Complete environment, nothing else is inherited
    pub environment: HashMap<String, String>,
    pub stdout_file: PathBuf,
    pub stderr_file: PathBuf,
}

/// A started process
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    fn is_alive(&self) -> bool;

    /// Waits until the process ended, `false` when the timeout elapsed first
    async fn wait_for(&self, timeout: Duration) -> bool;

    /// Requests a forced termination
    fn kill(&self) -> Result<(), ProcessError>;

    /// Exit code once the process ended, `None` while running or when killed by a signal
    fn exit_code(&self) -> Option<i32>;
}

pub trait ProcessLauncher: Send + Sync {
    fn start(&self, spec: LaunchSpec) -> Result<Arc<dyn ProcessHandle>, ProcessError>;
}

/// Launches products as tokio child processes
///
/// Output and error streams are redirected into the given capture files.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessLauncher;

impl TokioProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for TokioProcessLauncher {
    fn start(&self, spec: LaunchSpec) -> Result<Arc<dyn ProcessHandle>, ProcessError> {
        let stdout = create_capture_file(&spec.stdout_file)?;
        let stderr = create_capture_file(&spec.stderr_file)?;

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .env_clear()
            .envs(&spec.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        if let Some(dir) = &spec.working_directory {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|source| ProcessError::Start {
            command: spec.program.display().to_string(),
            source,
        })?;

        debug!(
            "Started process {} with pid {:?}",
            spec.program.display(),
            child.id()
        );

        Ok(Arc::new(TokioProcessHandle::supervise(child)))
    }
}

fn create_capture_file(path: &Path) -> Result<std::fs::File, ProcessError> {
    std::fs::File::create(path).map_err(|source| ProcessError::Capture {
        path: path.display().to_string(),
        source,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessState {
    Running,
    Exited(Option<i32>),
}

/// Handle to a child process supervised by a background task
///
/// The task owns the child, waits for it and kills it on request. Dropping
/// the handle kills a still running process.
pub struct TokioProcessHandle {
    pid: Option<u32>,
    state: watch::Receiver<ProcessState>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl TokioProcessHandle {
    fn supervise(mut child: Child) -> Self {
        let pid = child.id();
        let (state_tx, state_rx) = watch::channel(ProcessState::Running);
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut kill_requested = false;

            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    _ = &mut kill_rx, if !kill_requested => {
                        kill_requested = true;
                    }
                }

                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill process {:?}: {}", pid, e);
                }
            };

            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!("Failed to wait for process {:?}: {}", pid, e);
                    None
                }
            };

            debug!("Process {:?} ended with exit code {:?}", pid, code);
            let _ = state_tx.send(ProcessState::Exited(code));
        });

        Self {
            pid,
            state: state_rx,
            kill_tx: Mutex::new(Some(kill_tx)),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

#[async_trait]
impl ProcessHandle for TokioProcessHandle {
    fn is_alive(&self) -> bool {
        *self.state.borrow() == ProcessState::Running
    }

    async fn wait_for(&self, timeout: Duration) -> bool {
        let mut state = self.state.clone();
        let ended = tokio::time::timeout(
            timeout,
            state.wait_for(|s| *s != ProcessState::Running),
        )
        .await;

        match ended {
            Ok(Ok(_)) => true,
            // supervisor is gone, nothing can run anymore
            Ok(Err(_)) => true,
            Err(_) => false,
        }
    }

    fn kill(&self) -> Result<(), ProcessError> {
        let sender = self
            .kill_tx
            .lock()
            .map_err(|e| ProcessError::Kill(format!("Failed to lock kill channel: {}", e)))?
            .take();

        if let Some(sender) = sender {
            // receiver is gone when the process ended already
            let _ = sender.send(());
        }
        Ok(())
    }

    fn exit_code(&self) -> Option<i32> {
        match *self.state.borrow() {
            ProcessState::Exited(code) => code,
            ProcessState::Running => None,
        }
    }
}

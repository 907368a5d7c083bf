//! Execution types
//!
//! These types only exist at runtime during job execution.
//! They are not persisted, the result application maps them onto the job.

/// Outcome of one task attempt
///
/// Produced exactly once per task and never changed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub result_text: String,
    pub failed: bool,
    pub canceled: bool,
    pub encryption_failure: bool,
    /// Exit code of the product process, 0 when no process was started
    pub exit_code: i32,
}

impl ExecutionResult {
    /// Result of a task that stopped before or while running the product
    pub fn failed(result_text: impl Into<String>) -> Self {
        Self {
            result_text: result_text.into(),
            failed: true,
            exit_code: 1,
            ..Self::default()
        }
    }

    pub fn encryption_failure(result_text: impl Into<String>) -> Self {
        Self {
            encryption_failure: true,
            ..Self::failed(result_text)
        }
    }
}

/// Decides whether a product result reports a self cancellation
pub trait CancelDetection: Send + Sync {
    fn is_canceled(&self, result_text: &str) -> bool;
}

/// Products never report a cancellation inside their result
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCancelDetection;

impl CancelDetection for NoCancelDetection {
    fn is_canceled(&self, _result_text: &str) -> bool {
        false
    }
}

impl<F> CancelDetection for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_canceled(&self, result_text: &str) -> bool {
        self(result_text)
    }
}

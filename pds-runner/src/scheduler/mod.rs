//! Scheduler layer
//!
//! Background loops that keep the execution queue in sync with the job
//! store. Finished tasks are reconciled here, not by the tasks themselves.

pub mod watcher;

pub use watcher::ExecutionWatcher;

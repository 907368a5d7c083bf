//! PDS Runner
//!
//! Job execution engine of the product delegation server.
//!
//! Architecture:
//! - Configuration: runner settings and the product catalog
//! - Repositories: job store ports and an in-memory store
//! - Services: execution queue, result application, launcher environment
//! - Scheduler: background watcher reconciling finished tasks
//! - Tasks: one supervised launcher script run per job

pub mod config;
pub mod env;
pub mod error;
pub mod execution;
pub mod future;
pub mod messages;
pub mod process;
pub mod repository;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod task;
pub mod timeout;
pub mod workspace;

#[cfg(test)]
mod testing;

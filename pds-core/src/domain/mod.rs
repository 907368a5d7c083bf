//! Core domain types
//!
//! These types represent the entities the execution engine works on. They are
//! shared between the job store (for persistence) and the runner (for execution).

pub mod configuration;
pub mod event;
pub mod job;
pub mod message;
pub mod status;
pub mod workspace;

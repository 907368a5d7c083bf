//! PDS Core
//!
//! Core types shared by the PDS job execution engine.
//!
//! This crate contains:
//! - Domain types: Job records, job configuration, workspace locations,
//!   execution events and product messages
//! - Constants: well-known parameter keys, launcher script environment
//!   variable names and timeout defaults
//!
//! Note: Persistence belongs to the job store, execution logic to the runner.

pub mod constants;
pub mod domain;

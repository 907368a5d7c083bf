//! Repository layer
//!
//! Ports to the persistent job store. The store itself is owned by another
//! part of the server, the execution engine only needs record lookup, save
//! and a few single purpose updates that each run in their own transaction.
//!
//! All repositories are trait-based to enable testing and mocking.

mod jobs;
mod memory;

// Re-export traits
pub use jobs::{JobRepository, JobTransactionService};

// Re-export implementations
pub use memory::InMemoryJobStore;

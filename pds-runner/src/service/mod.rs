//! Service layer
//!
//! Services contain the business logic of the execution engine. They
//! orchestrate the job store, workspace and process ports.
//!
//! The queue facing service is trait-based to enable testing and
//! dependency injection.

mod environment;
mod execution;
mod result;

// Re-export traits
pub use execution::ExecutionService;

// Re-export implementations
pub use environment::ExecutionEnvironmentService;
pub use execution::StandardExecutionService;
pub use result::ResultApplicationService;

//! Launcher script environment
//!
//! Building blocks used while assembling the environment of a product
//! launcher script. The service layer combines them in
//! [`crate::service::ExecutionEnvironmentService`].

mod converter;
mod safe_map;
mod whitelist;

pub use converter::convert_key_to_env;
pub use safe_map::SafeEnvironment;
pub use whitelist::{DEFAULT_WHITELIST, EnvironmentSanitizer};

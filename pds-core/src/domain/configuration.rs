//! Job configuration types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One key/value parameter of a job configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionParameterEntry {
    pub key: String,
    pub value: String,
}

impl ExecutionParameterEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Configuration a caller defined for a job before it was marked ready to start
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    pub product_id: String,
    #[serde(default)]
    pub sechub_job_uuid: Option<Uuid>,
    /// Ordered, the first entry for a key wins
    #[serde(default)]
    pub parameters: Vec<ExecutionParameterEntry>,
}

impl JobConfiguration {
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            sechub_job_uuid: None,
            parameters: Vec::new(),
        }
    }

    /// Adds a parameter, keeping insertion order
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push(ExecutionParameterEntry::new(key, value));
        self
    }

    /// Returns the value of the first parameter with the given key
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.as_str())
    }

    /// Returns `true` when the parameter is set to "true" (case insensitive)
    pub fn is_enabled(&self, key: &str) -> bool {
        self.parameter(key)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
    }
}

/// Decrypted job configuration together with optional metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationData {
    pub job_configuration: JobConfiguration,
    pub meta_data: Option<String>,
}

//! Product configuration
//!
//! Loaded from the JSON configuration file. Describes which products this
//! server can execute, where their launcher scripts live and which job
//! parameters a product accepts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfiguration {
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub products: Vec<ProductSetup>,
}

impl ServerConfiguration {
    /// Loads and validates the configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        let configuration = Self::from_json(&json)
            .with_context(|| format!("Invalid configuration file {}", path.display()))?;

        info!(
            "Loaded {} product(s) from {}",
            configuration.products.len(),
            path.display()
        );
        Ok(configuration)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let configuration: Self = serde_json::from_str(json).context("Failed to parse JSON")?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn validate(&self) -> Result<()> {
        for product in &self.products {
            if product.id.trim().is_empty() {
                anyhow::bail!("product id cannot be empty");
            }
            if product.path.trim().is_empty() {
                anyhow::bail!("product '{}' has no launcher script path", product.id);
            }
        }
        Ok(())
    }

    pub fn product_setup(&self, product_id: &str) -> Option<&ProductSetup> {
        self.products.iter().find(|product| product.id == product_id)
    }
}

/// One executable product
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSetup {
    pub id: String,

    /// Launcher script started for each job
    pub path: String,

    #[serde(default)]
    pub scan_type: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Extra inherited variables this product may see
    #[serde(default)]
    pub env_whitelist: Vec<String>,

    #[serde(default)]
    pub parameters: ProductParameterSetup,
}

impl ProductSetup {
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Looks up a mandatory or optional definition
    pub fn parameter_definition(&self, key: &str) -> Option<&ProductParameterDefinition> {
        self.parameters.all().find(|definition| definition.key == key)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductParameterSetup {
    #[serde(default)]
    pub mandatory: Vec<ProductParameterDefinition>,
    #[serde(default)]
    pub optional: Vec<ProductParameterDefinition>,
}

impl ProductParameterSetup {
    pub fn all(&self) -> impl Iterator<Item = &ProductParameterDefinition> {
        self.mandatory.iter().chain(self.optional.iter())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductParameterDefinition {
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Option<String>,
}

impl ProductParameterDefinition {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: None,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

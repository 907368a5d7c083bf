//! Launcher script environment service
//!
//! Builds the complete environment of a product process:
//! - inherited variables, filtered by the whitelist sanitizer
//! - job parameters the product accepts, keys converted to variable names
//! - workspace locations and job identifiers

use pds_core::constants::{env, parameter};
use pds_core::domain::configuration::JobConfiguration;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{ProductSetup, ServerConfiguration};
use crate::env::{EnvironmentSanitizer, SafeEnvironment, convert_key_to_env};
use crate::workspace::WorkspaceService;

pub struct ExecutionEnvironmentService {
    server_configuration: Arc<ServerConfiguration>,
    sanitizer: EnvironmentSanitizer,
    inherited: HashMap<String, String>,
}

impl ExecutionEnvironmentService {
    /// Creates the service, inheriting the environment of the current process
    pub fn new(server_configuration: Arc<ServerConfiguration>, whitelist: Option<&str>) -> Self {
        Self::with_inherited_environment(server_configuration, whitelist, std::env::vars().collect())
    }

    pub fn with_inherited_environment(
        server_configuration: Arc<ServerConfiguration>,
        whitelist: Option<&str>,
        inherited: HashMap<String, String>,
    ) -> Self {
        Self {
            server_configuration,
            sanitizer: EnvironmentSanitizer::with_whitelist(whitelist),
            inherited,
        }
    }

    /// Builds the environment for the launcher script of a job
    pub fn build_environment(
        &self,
        job_uuid: Uuid,
        configuration: &JobConfiguration,
        workspace: &dyn WorkspaceService,
    ) -> HashMap<String, String> {
        let product = self
            .server_configuration
            .product_setup(&configuration.product_id);

        let mut environment = SafeEnvironment::new();
        environment.extend(self.sanitized_inherited_environment(product));
        environment.extend(self.create_job_parameter_environment(configuration).into_map());

        let location = workspace.create_location_data(job_uuid);
        environment.insert(env::PDS_JOB_WORKSPACE_LOCATION, location.workspace_location);
        environment.insert(env::PDS_JOB_RESULT_FILE, location.result_file_location);
        environment.insert(env::PDS_JOB_USER_MESSAGES_FOLDER, location.user_messages_location);
        environment.insert(env::PDS_JOB_EVENTS_FOLDER, location.events_location);
        environment.insert(env::PDS_JOB_METADATA_FILE, location.meta_data_file_location);
        environment.put(
            Some(env::PDS_JOB_SOURCECODE_ZIP_FILE),
            location.source_code_zip_file_location,
        );
        environment.put(
            Some(env::PDS_JOB_BINARIES_TAR_FILE),
            location.binaries_tar_file_location,
        );
        environment.put(
            Some(env::PDS_JOB_EXTRACTED_SOURCES_FOLDER),
            location.extracted_sources_location,
        );
        environment.put(
            Some(env::PDS_JOB_EXTRACTED_BINARIES_FOLDER),
            location.extracted_binaries_location,
        );
        environment.insert(
            env::PDS_JOB_HAS_EXTRACTED_SOURCES,
            workspace.has_extracted_sources(job_uuid).to_string(),
        );
        environment.insert(
            env::PDS_JOB_HAS_EXTRACTED_BINARIES,
            workspace.has_extracted_binaries(job_uuid).to_string(),
        );

        environment.insert(env::PDS_JOB_UUID, job_uuid.to_string());
        environment.insert(
            env::SECHUB_JOB_UUID,
            configuration
                .sechub_job_uuid
                .map(|uuid| uuid.to_string())
                .unwrap_or_default(),
        );

        debug!(
            "Launcher script environment of job {} has {} entries",
            job_uuid,
            environment.len()
        );
        environment.into_map()
    }

    /// Job parameters accepted by the configured product
    ///
    /// Only keys defined as mandatory or optional parameter of the product and
    /// the scan target URL are forwarded. Definitions with a default value add
    /// the default when the job did not set the key.
    pub fn create_job_parameter_environment(&self, configuration: &JobConfiguration) -> SafeEnvironment {
        let product = self
            .server_configuration
            .product_setup(&configuration.product_id);

        if product.is_none() {
            warn!(
                "No product setup found for '{}', only default parameters are forwarded",
                configuration.product_id
            );
        }

        let mut environment = SafeEnvironment::new();

        for entry in &configuration.parameters {
            let accepted = entry.key == parameter::SCAN_TARGET_URL
                || product.is_some_and(|p| p.parameter_definition(&entry.key).is_some());

            if !accepted {
                debug!("Ignore job parameter '{}', not defined for product", entry.key);
                continue;
            }

            let name = convert_key_to_env(&entry.key);
            if environment.contains_key(&name) {
                continue;
            }
            environment.insert(name, entry.value.clone());
        }

        if let Some(product) = product {
            for definition in product.parameters.all() {
                if configuration.parameter(&definition.key).is_some() {
                    continue;
                }
                environment.put(
                    Some(convert_key_to_env(&definition.key)),
                    definition.default.clone(),
                );
            }
        }

        environment
    }

    fn sanitized_inherited_environment(&self, product: Option<&ProductSetup>) -> HashMap<String, String> {
        let mut sanitizer = self.sanitizer.clone();
        if let Some(product) = product {
            sanitizer.extend_whitelist(&product.env_whitelist);
        }

        let mut inherited = self.inherited.clone();
        sanitizer.sanitize(&mut inherited);
        inherited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProductParameterDefinition;
    use crate::workspace::LocalWorkspaceService;

    const PRODUCT_ID: &str = "PRODUCT_1";

    fn product() -> ProductSetup {
        let mut product = ProductSetup::new(PRODUCT_ID, "/opt/product.sh");
        product
            .parameters
            .mandatory
            .push(ProductParameterDefinition::new("p1.keya").with_default("p1.defaulta"));
        product
            .parameters
            .optional
            .push(ProductParameterDefinition::new("p1.keyb").with_default("p1.defaultb"));
        product
            .parameters
            .optional
            .push(ProductParameterDefinition::new("p1.keyc"));
        product.env_whitelist = vec!["PRODUCT_TOOL_*".to_string()];
        product
    }

    fn service(inherited: &[(&str, &str)]) -> ExecutionEnvironmentService {
        let configuration = ServerConfiguration {
            server_id: "test".to_string(),
            products: vec![product()],
        };
        ExecutionEnvironmentService::with_inherited_environment(
            Arc::new(configuration),
            Some("PDS_STORAGE_*"),
            inherited
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn workspace(root: &std::path::Path) -> LocalWorkspaceService {
        LocalWorkspaceService::new(root, false, Arc::new(ServerConfiguration::default()))
    }

    #[test]
    fn test_known_parameters_are_forwarded_unknown_dropped() {
        let configuration = JobConfiguration::new(PRODUCT_ID)
            .with_parameter("p1.keya", "value1")
            .with_parameter("p1.keyb", "value2")
            .with_parameter("p1.unknown", "value3");

        let environment = service(&[]).create_job_parameter_environment(&configuration);

        assert_eq!(environment.get("P1_KEYA"), Some("value1"));
        assert_eq!(environment.get("P1_KEYB"), Some("value2"));
        assert_eq!(environment.get("P1_UNKNOWN"), None);
        assert_eq!(environment.get("P1_KEYC"), None);
    }

    #[test]
    fn test_defaults_are_used_when_not_set() {
        let configuration = JobConfiguration::new(PRODUCT_ID).with_parameter("p1.keya", "value1");

        let environment = service(&[]).create_job_parameter_environment(&configuration);

        assert_eq!(environment.get("P1_KEYA"), Some("value1"));
        assert_eq!(environment.get("P1_KEYB"), Some("p1.defaultb"));
    }

    #[test]
    fn test_target_url_is_accepted_for_unknown_product() {
        let configuration = JobConfiguration::new("OTHER")
            .with_parameter(parameter::SCAN_TARGET_URL, "https://testurl.example.com/app1")
            .with_parameter("p1.keya", "value1");

        let environment = service(&[]).create_job_parameter_environment(&configuration);

        assert_eq!(
            environment.get("PDS_SCAN_TARGET_URL"),
            Some("https://testurl.example.com/app1")
        );
        assert_eq!(environment.len(), 1);
    }

    #[test]
    fn test_inherited_environment_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&[
            ("PATH", "/usr/bin"),
            ("PDS_STORAGE_S3_1", "bucket"),
            ("PRODUCT_TOOL_HOME", "/opt/tool"),
            ("DATABASE_PASSWORD", "secret"),
        ]);

        let environment = service.build_environment(
            Uuid::new_v4(),
            &JobConfiguration::new(PRODUCT_ID),
            &workspace(dir.path()),
        );

        assert_eq!(environment.get("PATH").map(String::as_str), Some("/usr/bin"));
        assert!(environment.contains_key("PDS_STORAGE_S3_1"));
        assert!(environment.contains_key("PRODUCT_TOOL_HOME"));
        assert!(!environment.contains_key("DATABASE_PASSWORD"));
    }

    #[test]
    fn test_product_whitelist_only_applies_to_its_product() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&[("PRODUCT_TOOL_HOME", "/opt/tool")]);

        let environment = service.build_environment(
            Uuid::new_v4(),
            &JobConfiguration::new("OTHER"),
            &workspace(dir.path()),
        );

        assert!(!environment.contains_key("PRODUCT_TOOL_HOME"));
    }

    #[test]
    fn test_job_and_workspace_variables() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = workspace(dir.path());
        let job_uuid = Uuid::new_v4();
        let sechub_job_uuid = Uuid::new_v4();
        let mut configuration = JobConfiguration::new(PRODUCT_ID);
        configuration.sechub_job_uuid = Some(sechub_job_uuid);

        let environment = service(&[]).build_environment(job_uuid, &configuration, &workspace);
        let location = workspace.create_location_data(job_uuid);

        assert_eq!(environment.get(env::PDS_JOB_UUID), Some(&job_uuid.to_string()));
        assert_eq!(
            environment.get(env::SECHUB_JOB_UUID),
            Some(&sechub_job_uuid.to_string())
        );
        assert_eq!(
            environment.get(env::PDS_JOB_RESULT_FILE),
            Some(&location.result_file_location)
        );
        assert_eq!(
            environment.get(env::PDS_JOB_EVENTS_FOLDER),
            Some(&location.events_location)
        );
        assert_eq!(
            environment.get(env::PDS_JOB_HAS_EXTRACTED_SOURCES).map(String::as_str),
            Some("false")
        );
    }

    #[test]
    fn test_missing_sechub_job_gives_empty_variable() {
        let dir = tempfile::tempdir().unwrap();

        let environment = service(&[]).build_environment(
            Uuid::new_v4(),
            &JobConfiguration::new(PRODUCT_ID),
            &workspace(dir.path()),
        );

        assert_eq!(environment.get(env::SECHUB_JOB_UUID).map(String::as_str), Some(""));
    }
}

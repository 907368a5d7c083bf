//! Runner configuration
//!
//! Defines all configurable parameters of the execution engine: queue and
//! worker pool sizing, product timeout bounds, workspace location, the
//! launcher script environment whitelist and watcher scheduling.

mod products;

pub use products::{ProductParameterDefinition, ProductParameterSetup, ProductSetup, ServerConfiguration};

use pds_core::constants::{
    DEFAULT_MINUTES_TO_WAIT_FOR_PRODUCT, MAXIMUM_CONFIGURABLE_MINUTES_TO_WAIT_FOR_PRODUCT,
    MINIMUM_CONFIGURABLE_MINUTES_TO_WAIT_FOR_PRODUCT,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

const DEFAULT_QUEUE_MAX: usize = 50;
const DEFAULT_WORKER_THREAD_COUNT: usize = 5;

/// Engine configuration
///
/// Owned by the execution service instance, there is no global state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum amount of jobs in queue at the same time, 0 means always full
    pub queue_max: usize,

    /// Amount of jobs executed in parallel
    pub worker_pool_size: usize,

    /// System wide product timeout, used when a job defines none
    pub minutes_to_wait_for_product: i64,

    /// Lower bound for any resolved product timeout
    pub minimum_configurable_minutes: i64,

    /// Upper bound for any resolved product timeout
    pub maximum_configurable_minutes: i64,

    /// Parent of the `workspace` folder
    pub workspace_root: PathBuf,

    /// Keep job workspaces after execution
    pub workspace_autoclean_disabled: bool,

    /// Comma separated whitelist for inherited environment variables
    pub script_env_whitelist: Option<String>,

    /// Path to the product configuration file
    pub config_file: PathBuf,

    /// Whether the background watcher reconciles finished jobs
    pub watcher_enabled: bool,

    /// Delay before the first watcher run
    pub watcher_initial_delay: Duration,

    /// How often the watcher inspects the queue
    pub watcher_interval: Duration,

    /// How often a running job checks for stream refresh requests
    pub stream_refresh_interval: Duration,
}

impl Config {
    /// Creates a configuration with defaults
    pub fn new() -> Self {
        Self {
            queue_max: DEFAULT_QUEUE_MAX,
            worker_pool_size: DEFAULT_WORKER_THREAD_COUNT,
            minutes_to_wait_for_product: DEFAULT_MINUTES_TO_WAIT_FOR_PRODUCT,
            minimum_configurable_minutes: MINIMUM_CONFIGURABLE_MINUTES_TO_WAIT_FOR_PRODUCT,
            maximum_configurable_minutes: MAXIMUM_CONFIGURABLE_MINUTES_TO_WAIT_FOR_PRODUCT,
            workspace_root: PathBuf::from("./"),
            workspace_autoclean_disabled: false,
            script_env_whitelist: None,
            config_file: PathBuf::from("./pds-config.json"),
            watcher_enabled: true,
            watcher_initial_delay: Duration::from_millis(300),
            watcher_interval: Duration::from_millis(1000),
            stream_refresh_interval: Duration::from_millis(300),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - PDS_CONFIG_EXECUTE_QUEUE_MAX (default: 50)
    /// - PDS_CONFIG_EXECUTE_WORKER_THREAD_COUNT (default: 5)
    /// - PDS_CONFIG_PRODUCT_TIMEOUT_MINUTES (default: 120)
    /// - PDS_CONFIG_PRODUCT_TIMEOUT_MAX_CONFIGURABLE_MINUTES (default: 4320)
    /// - PDS_WORKSPACE_ROOTFOLDER (default: ./)
    /// - PDS_WORKSPACE_AUTOCLEAN_DISABLED (default: false)
    /// - PDS_SCRIPT_ENV_WHITELIST (comma separated)
    /// - PDS_CONFIG_FILE (default: ./pds-config.json)
    /// - PDS_EXECUTION_WATCHER_DISABLED (default: false)
    /// - PDS_EXECUTION_WATCHER_INTERVAL_MS (default: 1000)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::new();

        let parse_usize = |key: &str, default: usize| {
            lookup(key)
                .and_then(|s| s.trim().parse::<usize>().ok())
                .unwrap_or(default)
        };
        let parse_i64 = |key: &str, default: i64| {
            lookup(key)
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(default)
        };
        let parse_bool = |key: &str| {
            lookup(key)
                .map(|s| s.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };

        let mut config = Self {
            queue_max: parse_usize("PDS_CONFIG_EXECUTE_QUEUE_MAX", defaults.queue_max),
            worker_pool_size: parse_usize(
                "PDS_CONFIG_EXECUTE_WORKER_THREAD_COUNT",
                defaults.worker_pool_size,
            ),
            minutes_to_wait_for_product: parse_i64(
                "PDS_CONFIG_PRODUCT_TIMEOUT_MINUTES",
                defaults.minutes_to_wait_for_product,
            ),
            maximum_configurable_minutes: parse_i64(
                "PDS_CONFIG_PRODUCT_TIMEOUT_MAX_CONFIGURABLE_MINUTES",
                defaults.maximum_configurable_minutes,
            ),
            workspace_root: lookup("PDS_WORKSPACE_ROOTFOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root.clone()),
            workspace_autoclean_disabled: parse_bool("PDS_WORKSPACE_AUTOCLEAN_DISABLED"),
            script_env_whitelist: lookup("PDS_SCRIPT_ENV_WHITELIST"),
            config_file: lookup("PDS_CONFIG_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.config_file.clone()),
            watcher_enabled: !parse_bool("PDS_EXECUTION_WATCHER_DISABLED"),
            watcher_interval: lookup("PDS_EXECUTION_WATCHER_INTERVAL_MS")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.watcher_interval),
            ..defaults
        };

        config.clamp_system_wide_product_timeout();
        config
    }

    /// Keeps the system wide product timeout inside the configurable bounds
    pub fn clamp_system_wide_product_timeout(&mut self) {
        if self.minutes_to_wait_for_product < self.minimum_configurable_minutes {
            warn!(
                "System wide minutes to wait for product was defined as {}, which is less than minimum of {}. Will fallback to minimum!",
                self.minutes_to_wait_for_product, self.minimum_configurable_minutes
            );
            self.minutes_to_wait_for_product = self.minimum_configurable_minutes;
        }

        if self.minutes_to_wait_for_product > self.maximum_configurable_minutes {
            warn!(
                "System wide minutes to wait for product was defined as {}, which exceeds maximum. Will set maximum of {} as fallback!",
                self.minutes_to_wait_for_product, self.maximum_configurable_minutes
            );
            self.minutes_to_wait_for_product = self.maximum_configurable_minutes;
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_pool_size == 0 {
            anyhow::bail!("worker_pool_size must be greater than 0");
        }

        if self.minimum_configurable_minutes < 1 {
            anyhow::bail!("minimum_configurable_minutes must be at least 1");
        }

        if self.maximum_configurable_minutes < self.minimum_configurable_minutes {
            anyhow::bail!(
                "maximum_configurable_minutes ({}) must not be lower than minimum ({})",
                self.maximum_configurable_minutes,
                self.minimum_configurable_minutes
            );
        }

        if self.watcher_interval.is_zero() {
            anyhow::bail!("watcher_interval must be greater than 0");
        }

        if self.stream_refresh_interval.is_zero() {
            anyhow::bail!("stream_refresh_interval must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

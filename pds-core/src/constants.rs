//! Well-known keys and defaults

/// Job parameter keys understood by the engine itself
pub mod parameter {
    /// Per job override of the product timeout
    pub const PRODUCT_TIMEOUT_MINUTES: &str = "pds.config.product.timeout.minutes";

    /// Always forwarded to the launcher script, even if the product does not define it
    pub const SCAN_TARGET_URL: &str = "pds.scan.target.url";

    /// Seconds a cancelled process gets to end itself before it is killed
    pub const CANCEL_MAXIMUM_WAITTIME_SECONDS: &str = "pds.config.cancel.maximum.waittime.seconds";

    /// Interval between alive checks while waiting for a cancelled process
    pub const CANCEL_CHECK_INTERVAL_MILLISECONDS: &str =
        "pds.config.cancel.event.checkinterval.milliseconds";

    /// When enabled the launcher script output is added to the runner log
    pub const ADD_SCRIPTLOG_TO_PDSLOG_ENABLED: &str = "pds.config.debug.script.log.enabled";
}

/// Environment variables the launcher script receives
pub mod env {
    pub const PDS_JOB_UUID: &str = "PDS_JOB_UUID";
    pub const SECHUB_JOB_UUID: &str = "SECHUB_JOB_UUID";
    pub const PDS_JOB_WORKSPACE_LOCATION: &str = "PDS_JOB_WORKSPACE_LOCATION";
    pub const PDS_JOB_RESULT_FILE: &str = "PDS_JOB_RESULT_FILE";
    pub const PDS_JOB_USER_MESSAGES_FOLDER: &str = "PDS_JOB_USER_MESSAGES_FOLDER";
    pub const PDS_JOB_EVENTS_FOLDER: &str = "PDS_JOB_EVENTS_FOLDER";
    pub const PDS_JOB_METADATA_FILE: &str = "PDS_JOB_METADATA_FILE";
    pub const PDS_JOB_SOURCECODE_ZIP_FILE: &str = "PDS_JOB_SOURCECODE_ZIP_FILE";
    pub const PDS_JOB_BINARIES_TAR_FILE: &str = "PDS_JOB_BINARIES_TAR_FILE";
    pub const PDS_JOB_EXTRACTED_SOURCES_FOLDER: &str = "PDS_JOB_EXTRACTED_SOURCES_FOLDER";
    pub const PDS_JOB_EXTRACTED_BINARIES_FOLDER: &str = "PDS_JOB_EXTRACTED_BINARIES_FOLDER";
    pub const PDS_JOB_HAS_EXTRACTED_SOURCES: &str = "PDS_JOB_HAS_EXTRACTED_SOURCES";
    pub const PDS_JOB_HAS_EXTRACTED_BINARIES: &str = "PDS_JOB_HAS_EXTRACTED_BINARIES";
}

/// Product timeout bounds, in minutes
pub const DEFAULT_MINUTES_TO_WAIT_FOR_PRODUCT: i64 = 120;
pub const MINIMUM_CONFIGURABLE_MINUTES_TO_WAIT_FOR_PRODUCT: i64 = 1;
pub const MAXIMUM_CONFIGURABLE_MINUTES_TO_WAIT_FOR_PRODUCT: i64 = 4320;

pub const DEFAULT_CANCEL_MAXIMUM_WAITTIME_SECONDS: i64 = 0;
pub const DEFAULT_CANCEL_CHECK_INTERVAL_MILLISECONDS: u64 = 500;

//! Process handling data
//!
//! Time windows used while a product process runs: the bounded product
//! timeout for launch operations and the grace window for cancel operations.

use pds_core::constants::{
    DEFAULT_CANCEL_CHECK_INTERVAL_MILLISECONDS, DEFAULT_CANCEL_MAXIMUM_WAITTIME_SECONDS, parameter,
};
use pds_core::domain::configuration::JobConfiguration;
use std::time::Duration;
use tracing::warn;

use crate::config::Config;

/// Grace window after launch in which an exiting process is reported as a start problem
pub const SECONDS_TO_WAIT_FOR_LAUNCH_ACCEPTANCE: i64 = 5;

/// Acceptance window starting at a fixed point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandlingData {
    seconds_to_wait_for_acceptance: i64,
    process_start_timestamp: i64,
}

impl ProcessHandlingData {
    /// `process_start_timestamp` is given in epoch milliseconds
    pub fn new(seconds_to_wait_for_acceptance: i64, process_start_timestamp: i64) -> Self {
        Self {
            seconds_to_wait_for_acceptance,
            process_start_timestamp,
        }
    }

    pub fn starting_now(seconds_to_wait_for_acceptance: i64) -> Self {
        Self::new(seconds_to_wait_for_acceptance, now_millis())
    }

    pub fn seconds_to_wait_for_acceptance(&self) -> i64 {
        self.seconds_to_wait_for_acceptance
    }

    pub fn process_start_timestamp(&self) -> i64 {
        self.process_start_timestamp
    }

    pub fn still_waiting_for_acceptance(&self) -> bool {
        self.still_waiting_for_acceptance_at(now_millis())
    }

    /// `true` while the elapsed time does not exceed the window
    ///
    /// Windows too large for milliseconds saturate and never end.
    pub fn still_waiting_for_acceptance_at(&self, now_millis: i64) -> bool {
        let elapsed = now_millis.saturating_sub(self.process_start_timestamp);
        elapsed <= self.seconds_to_wait_for_acceptance.saturating_mul(1000)
    }

    pub fn elapsed_millis(&self) -> i64 {
        now_millis().saturating_sub(self.process_start_timestamp)
    }
}

/// Handling data for starting a product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductLaunchProcessHandlingData {
    pub handling: ProcessHandlingData,
    pub minutes_to_wait_before_product_timeout: i64,
}

impl ProductLaunchProcessHandlingData {
    /// Timeout as duration, non positive minutes give zero
    pub fn product_timeout(&self) -> Duration {
        let minutes = self.minutes_to_wait_before_product_timeout.max(0) as u64;
        Duration::from_secs(minutes * 60)
    }
}

/// Handling data for cancelling a running product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductCancellationProcessHandlingData {
    pub handling: ProcessHandlingData,
    pub milliseconds_to_wait_for_next_check: u64,
}

impl ProductCancellationProcessHandlingData {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.milliseconds_to_wait_for_next_check)
    }
}

/// Resolves handling data per job from system defaults and job parameters
#[derive(Debug, Clone, Copy)]
pub struct ProcessHandlingDataFactory {
    minutes_to_wait_for_product: i64,
    minimum_configurable_minutes: i64,
    maximum_configurable_minutes: i64,
}

impl ProcessHandlingDataFactory {
    pub fn new(
        minutes_to_wait_for_product: i64,
        minimum_configurable_minutes: i64,
        maximum_configurable_minutes: i64,
    ) -> Self {
        Self {
            minutes_to_wait_for_product,
            minimum_configurable_minutes,
            maximum_configurable_minutes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.minutes_to_wait_for_product,
            config.minimum_configurable_minutes,
            config.maximum_configurable_minutes,
        )
    }

    pub fn create_for_launch_operation(
        &self,
        configuration: &JobConfiguration,
    ) -> ProductLaunchProcessHandlingData {
        let requested = match configuration.parameter(parameter::PRODUCT_TIMEOUT_MINUTES) {
            Some(value) => value.trim().parse::<i64>().unwrap_or_else(|_| {
                warn!(
                    "Job parameter {} is not a number: '{}'. Will use system default of {} minutes.",
                    parameter::PRODUCT_TIMEOUT_MINUTES,
                    value,
                    self.minutes_to_wait_for_product
                );
                self.minutes_to_wait_for_product
            }),
            None => self.minutes_to_wait_for_product,
        };

        ProductLaunchProcessHandlingData {
            handling: ProcessHandlingData::starting_now(SECONDS_TO_WAIT_FOR_LAUNCH_ACCEPTANCE),
            minutes_to_wait_before_product_timeout: self.clamp_minutes(requested),
        }
    }

    pub fn create_for_cancel_operation(
        &self,
        configuration: &JobConfiguration,
    ) -> ProductCancellationProcessHandlingData {
        let seconds = configuration
            .parameter(parameter::CANCEL_MAXIMUM_WAITTIME_SECONDS)
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|seconds| *seconds >= 0)
            .unwrap_or(DEFAULT_CANCEL_MAXIMUM_WAITTIME_SECONDS);

        let interval = configuration
            .parameter(parameter::CANCEL_CHECK_INTERVAL_MILLISECONDS)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|millis| *millis > 0)
            .unwrap_or(DEFAULT_CANCEL_CHECK_INTERVAL_MILLISECONDS);

        ProductCancellationProcessHandlingData {
            handling: ProcessHandlingData::starting_now(seconds),
            milliseconds_to_wait_for_next_check: interval,
        }
    }

    fn clamp_minutes(&self, minutes: i64) -> i64 {
        if minutes < self.minimum_configurable_minutes {
            return self.minimum_configurable_minutes;
        }
        if minutes > self.maximum_configurable_minutes {
            return self.maximum_configurable_minutes;
        }
        minutes
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in multi-threaded runtimes
//! and test harnesses.

use crate::constants::{
    DEFAULT_ALLOCATION_MAX_ATTEMPTS, HOSPITALS_DIR_NAME, MAX_ALLOCATION_MAX_ATTEMPTS,
    PATIENTS_DIR_NAME,
};
use crate::{IntakeError, IntakeResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    allocation_max_attempts: u32,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::InvalidInput`] if `allocation_max_attempts` is zero or above
    /// [`MAX_ALLOCATION_MAX_ATTEMPTS`].
    pub fn new(data_dir: PathBuf, allocation_max_attempts: u32) -> IntakeResult<Self> {
        if allocation_max_attempts == 0 || allocation_max_attempts > MAX_ALLOCATION_MAX_ATTEMPTS {
            return Err(IntakeError::InvalidInput(format!(
                "allocation_max_attempts must be between 1 and {}",
                MAX_ALLOCATION_MAX_ATTEMPTS
            )));
        }

        Ok(Self {
            data_dir,
            allocation_max_attempts,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn patients_dir(&self) -> PathBuf {
        self.data_dir.join(PATIENTS_DIR_NAME)
    }

    pub fn hospitals_dir(&self) -> PathBuf {
        self.data_dir.join(HOSPITALS_DIR_NAME)
    }

    pub fn allocation_max_attempts(&self) -> u32 {
        self.allocation_max_attempts
    }
}

/// Parse the allocation retry budget from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_ALLOCATION_MAX_ATTEMPTS`].
pub fn allocation_attempts_from_env_value(value: Option<String>) -> IntakeResult<u32> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        None => Ok(DEFAULT_ALLOCATION_MAX_ATTEMPTS),
        Some(v) => v.parse::<u32>().map_err(|_| {
            IntakeError::InvalidInput(format!(
                "allocation attempts must be a positive integer, got '{}'",
                v
            ))
        }),
    }
}

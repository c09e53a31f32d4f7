//! Constants used throughout the intake core crate.
//!
//! Storage names and numbering defaults live here so the file store, the allocator and the
//! settings validation agree on them.

/// Directory name for patient records storage.
pub const PATIENTS_DIR_NAME: &str = "patients";

/// Directory name for per-hospital settings.
pub const HOSPITALS_DIR_NAME: &str = "hospitals";

/// Default directory for intake data storage when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "intake_data";

/// Filename for patient YAML files.
pub const PATIENT_YAML_FILENAME: &str = "patient.yaml";

/// Filename for a hospital's patient-number configuration.
pub const ID_CONFIG_FILENAME: &str = "id_config.yaml";

/// Lock file guarding read-compare-write of a hospital's configuration.
pub const ID_CONFIG_LOCK_FILENAME: &str = "id_config.lock";

/// Lock file guarding read-modify-write of a patient record.
pub const PATIENT_LOCK_FILENAME: &str = "patient.lock";

/// Prefix used when a hospital has not chosen one.
pub const DEFAULT_ID_PREFIX: &str = "PT";

/// Digit width used when a hospital has not chosen one.
pub const DEFAULT_DIGIT_WIDTH: u32 = 6;

pub const MIN_DIGIT_WIDTH: u32 = 1;

/// A `u64` sequence number never needs more than 20 digits.
pub const MAX_DIGIT_WIDTH: u32 = 20;

/// Compare-and-swap attempts before an allocation gives up.
pub const DEFAULT_ALLOCATION_MAX_ATTEMPTS: u32 = 5;

pub const MAX_ALLOCATION_MAX_ATTEMPTS: u32 = 100;

/// Longest accepted hospital key (a DNS label).
pub const MAX_HOSPITAL_KEY_LEN: usize = 63;

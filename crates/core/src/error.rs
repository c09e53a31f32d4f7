use crate::classification::PriorityLevel;
use crate::flow::FlowStep;
use crate::validation::ValidationReport;

/// Problems with a hospital's patient-number configuration.
///
/// These are surfaced when an administrator saves settings, never at allocation time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("patient id prefix cannot be empty")]
    EmptyPrefix,
    #[error("digit width must be between {min} and {max}, got {width}", min = crate::constants::MIN_DIGIT_WIDTH, max = crate::constants::MAX_DIGIT_WIDTH)]
    DigitWidthOutOfRange { width: u32 },
    #[error("last sequence number cannot move backwards (current {current}, requested {requested})")]
    SequenceRegression { current: u64, requested: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Text(#[from] intake_types::TextError),

    #[error("intake validation failed with {} error(s)", .0.errors.len())]
    Validation(ValidationReport),
    #[error("invalid flow transition from {from}{}", .to.map(|t| format!(" to {t}")).unwrap_or_default())]
    InvalidTransition {
        from: FlowStep,
        to: Option<FlowStep>,
    },
    #[error("priority cannot be lowered from {current} to {requested}")]
    PriorityDowngrade {
        current: PriorityLevel,
        requested: PriorityLevel,
    },

    #[error("invalid patient id configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("could not allocate a patient number after {attempts} attempts due to concurrent updates")]
    AllocationConflict { attempts: u32 },
    #[error("automatic numbering is disabled for this hospital; a sequence number must be supplied")]
    ManualSequenceRequired,
    #[error("manual sequence number {requested} must be greater than the last used number {last}")]
    ManualSequenceNotIncreasing { requested: u64, last: u64 },

    #[error("patient not found: {0}")]
    PatientNotFound(String),
    #[error("no patient id configuration for hospital: {0}")]
    HospitalNotFound(String),

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to create patient directory: {0}")]
    PatientDirCreation(std::io::Error),
    #[error("failed to write record file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read record file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),
    #[error("failed to lock record file: {0}")]
    StoreLock(std::io::Error),
    #[error("record store lock was poisoned")]
    StoreLockPoisoned,
}

impl IntakeError {
    /// Whether retrying the same request later may succeed without any change by the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::AllocationConflict { .. })
    }
}

pub type IntakeResult<T> = std::result::Result<T, IntakeError>;

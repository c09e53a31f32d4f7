//! # Intake Core
//!
//! Core business logic for hospital patient intake.
//!
//! This crate contains the decision logic of the front desk and the storage seam it runs over:
//! - Priority classification of new registrations (`classification`)
//! - Registration form validation and the intake wizard steps (`validation`)
//! - The patient flow state machine (`flow`)
//! - Per-hospital patient-number formatting and allocation (`numbering`)
//! - Record stores: in memory and YAML files under `INTAKE_DATA_DIR` (`repositories`)
//! - Services composing the above (`patient`, `settings`)
//!
//! **No API concerns**: HTTP servers, CLI parsing and DTOs belong in `api-rest`, `intake-cli`
//! or `api-shared`.

pub mod classification;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod flow;
pub mod numbering;
pub mod patient;
pub mod repositories;
pub mod settings;
pub mod uuid;
pub mod validation;

pub use intake_types::{EmailAddress, LastFourDigits, NonEmptyText, TextError};

pub use classification::{classify, escalate, Classification, PriorityLevel, RegistrationCategory};
pub use config::{allocation_attempts_from_env_value, CoreConfig};
pub use context::{HospitalContext, HospitalKey};
pub use error::{ConfigError, IntakeError, IntakeResult};
pub use flow::{ConsultationOrders, FlowRouter, FlowStep};
pub use numbering::{Allocation, HospitalIdConfig, IdFormatTemplate, PatientIdAllocator};
pub use patient::{NewPatient, Patient, PatientService, PersonalDetails, RegisteredPatient};
pub use repositories::{file::FileStore, memory::InMemoryStore, RecordStore};
pub use settings::IdConfigService;
pub use uuid::PatientRecordId;
pub use validation::{
    payment_required_fields, required_fields, validate, wizard_steps, Field, FieldError,
    FieldErrorKind, PatientDraft, PaymentDetails, PaymentMethod, ValidationReport, WizardStep,
};

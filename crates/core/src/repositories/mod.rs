//! Record stores.
//!
//! The intake core never touches storage directly; it goes through [`RecordStore`]. Two
//! implementations are provided: [`memory::InMemoryStore`] for tests and embedding, and
//! [`file::FileStore`], which keeps YAML files under the configured data directory.

pub mod file;
pub mod memory;

use crate::classification::PriorityLevel;
use crate::context::HospitalKey;
use crate::flow::FlowStep;
use crate::numbering::HospitalIdConfig;
use crate::patient::{NewPatient, Patient};
use crate::uuid::PatientRecordId;
use crate::IntakeResult;

/// Persistence for patients and per-hospital numbering configuration.
///
/// Implementations must make [`RecordStore::create_hospital_id_config`] and
/// [`RecordStore::compare_and_swap_id_config`] atomic with respect to every other writer of the
/// same data, including other store instances; patient-number allocation relies on it.
pub trait RecordStore: Send + Sync {
    /// Stores a new patient, assigning its record id and timestamps.
    fn insert_patient(&self, new: NewPatient) -> IntakeResult<Patient>;

    /// # Errors
    ///
    /// Returns [`crate::IntakeError::PatientNotFound`] for an unknown id.
    fn read_patient(&self, id: &PatientRecordId) -> IntakeResult<Patient>;

    fn update_patient_flow_step(&self, id: &PatientRecordId, step: FlowStep)
        -> IntakeResult<Patient>;

    fn update_patient_priority(
        &self,
        id: &PatientRecordId,
        priority: PriorityLevel,
    ) -> IntakeResult<Patient>;

    /// # Errors
    ///
    /// Returns [`crate::IntakeError::HospitalNotFound`] if the hospital was never provisioned.
    fn read_hospital_id_config(&self, hospital: &HospitalKey) -> IntakeResult<HospitalIdConfig>;

    /// Writes the configuration unconditionally.
    ///
    /// Overwrites a live counter; settings changes go through
    /// [`RecordStore::create_hospital_id_config`] and
    /// [`RecordStore::compare_and_swap_id_config`] instead.
    fn write_hospital_id_config(
        &self,
        hospital: &HospitalKey,
        config: &HospitalIdConfig,
    ) -> IntakeResult<()>;

    /// Provisions the configuration only if the hospital has none yet. Returns whether the
    /// write happened.
    fn create_hospital_id_config(
        &self,
        hospital: &HospitalKey,
        config: &HospitalIdConfig,
    ) -> IntakeResult<bool>;

    /// Replaces the configuration only if the stored `last_sequence_number` still equals
    /// `expected_last_sequence`. Returns whether the write happened.
    ///
    /// # Errors
    ///
    /// Returns [`crate::IntakeError::HospitalNotFound`] if the hospital was never provisioned.
    fn compare_and_swap_id_config(
        &self,
        hospital: &HospitalKey,
        expected_last_sequence: u64,
        config: &HospitalIdConfig,
    ) -> IntakeResult<bool>;
}

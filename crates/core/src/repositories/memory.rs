use super::RecordStore;
use crate::classification::PriorityLevel;
use crate::context::HospitalKey;
use crate::flow::FlowStep;
use crate::numbering::HospitalIdConfig;
use crate::patient::{NewPatient, Patient};
use crate::uuid::PatientRecordId;
use crate::{IntakeError, IntakeResult};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    patients: HashMap<PatientRecordId, Patient>,
    id_configs: HashMap<HospitalKey, HospitalIdConfig>,
}

/// A record store held entirely in memory. Everything is lost when it is dropped.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> IntakeResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| IntakeError::StoreLockPoisoned)
    }

    fn update_patient(
        &self,
        id: &PatientRecordId,
        apply: impl FnOnce(&mut Patient),
    ) -> IntakeResult<Patient> {
        let mut state = self.lock()?;
        let patient = state
            .patients
            .get_mut(id)
            .ok_or_else(|| IntakeError::PatientNotFound(id.to_string()))?;
        apply(patient);
        patient.updated_at = Utc::now();
        Ok(patient.clone())
    }
}

impl RecordStore for InMemoryStore {
    fn insert_patient(&self, new: NewPatient) -> IntakeResult<Patient> {
        let mut state = self.lock()?;
        let mut id = PatientRecordId::new();
        while state.patients.contains_key(&id) {
            id = PatientRecordId::new();
        }
        let patient = new.into_patient(id.clone(), Utc::now());
        state.patients.insert(id, patient.clone());
        Ok(patient)
    }

    fn read_patient(&self, id: &PatientRecordId) -> IntakeResult<Patient> {
        self.lock()?
            .patients
            .get(id)
            .cloned()
            .ok_or_else(|| IntakeError::PatientNotFound(id.to_string()))
    }

    fn update_patient_flow_step(
        &self,
        id: &PatientRecordId,
        step: FlowStep,
    ) -> IntakeResult<Patient> {
        self.update_patient(id, |p| p.current_flow_step = step)
    }

    fn update_patient_priority(
        &self,
        id: &PatientRecordId,
        priority: PriorityLevel,
    ) -> IntakeResult<Patient> {
        self.update_patient(id, |p| p.priority_level = priority)
    }

    fn read_hospital_id_config(&self, hospital: &HospitalKey) -> IntakeResult<HospitalIdConfig> {
        self.lock()?
            .id_configs
            .get(hospital)
            .cloned()
            .ok_or_else(|| IntakeError::HospitalNotFound(hospital.to_string()))
    }

    fn write_hospital_id_config(
        &self,
        hospital: &HospitalKey,
        config: &HospitalIdConfig,
    ) -> IntakeResult<()> {
        self.lock()?
            .id_configs
            .insert(hospital.clone(), config.clone());
        Ok(())
    }

    fn create_hospital_id_config(
        &self,
        hospital: &HospitalKey,
        config: &HospitalIdConfig,
    ) -> IntakeResult<bool> {
        let mut state = self.lock()?;
        if state.id_configs.contains_key(hospital) {
            return Ok(false);
        }
        state.id_configs.insert(hospital.clone(), config.clone());
        Ok(true)
    }

    fn compare_and_swap_id_config(
        &self,
        hospital: &HospitalKey,
        expected_last_sequence: u64,
        config: &HospitalIdConfig,
    ) -> IntakeResult<bool> {
        let mut state = self.lock()?;
        let current = state
            .id_configs
            .get_mut(hospital)
            .ok_or_else(|| IntakeError::HospitalNotFound(hospital.to_string()))?;
        if current.last_sequence_number != expected_last_sequence {
            return Ok(false);
        }
        *current = config.clone();
        Ok(true)
    }
}

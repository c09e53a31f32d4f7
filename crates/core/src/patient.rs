//! Patient records and the registration service.
//!
//! [`PatientService`] is where the pieces meet: a draft is validated, classified, given a
//! patient number and stored, then moved through the visit flow. Every operation takes an
//! explicit [`HospitalContext`]; nothing here reads ambient state.

use crate::classification::{escalate, Classification, PriorityLevel, RegistrationCategory};
use crate::context::{HospitalContext, HospitalKey};
use crate::flow::{FlowRouter, FlowStep};
use crate::numbering::PatientIdAllocator;
use crate::repositories::RecordStore;
use crate::uuid::PatientRecordId;
use crate::validation::{validate, Field, PatientDraft, PaymentDetails};
use crate::{CoreConfig, IntakeError, IntakeResult, NonEmptyText};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<NonEmptyText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<NonEmptyText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<NonEmptyText>,
}

/// Who the patient is and how to reach them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalDetails {
    pub first_name: NonEmptyText,
    pub last_name: NonEmptyText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NonEmptyText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<NonEmptyText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<NonEmptyText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<NonEmptyText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<NonEmptyText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<EmergencyContact>,
}

impl PersonalDetails {
    /// Copies the trimmed personal fields out of a draft.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::Text`] if the first or last name is blank. Drafts that passed
    /// validation always have both.
    pub fn from_draft(draft: &PatientDraft) -> IntakeResult<Self> {
        let opt = |field| NonEmptyText::from_optional(draft.value(field));

        let emergency_contact = EmergencyContact {
            name: opt(Field::EmergencyContactName),
            relationship: opt(Field::EmergencyContactRelationship),
            phone: opt(Field::EmergencyContactPhone),
        };

        Ok(Self {
            first_name: NonEmptyText::new(draft.value(Field::FirstName).unwrap_or_default())?,
            last_name: NonEmptyText::new(draft.value(Field::LastName).unwrap_or_default())?,
            date_of_birth: opt(Field::DateOfBirth),
            gender: opt(Field::Gender),
            contact_number: opt(Field::ContactNumber),
            email: opt(Field::Email),
            address: opt(Field::Address),
            emergency_contact: (emergency_contact != EmergencyContact::default())
                .then_some(emergency_contact),
        })
    }
}

/// A stored patient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: PatientRecordId,
    pub hospital: HospitalKey,
    pub display_id: String,
    pub sequence_number: u64,
    pub registration_category: RegistrationCategory,
    pub priority_level: PriorityLevel,
    pub current_flow_step: FlowStep,
    pub personal: PersonalDetails,
    pub payment: PaymentDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_by: Option<NonEmptyText>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn classification(&self) -> Classification {
        Classification {
            registration_category: self.registration_category,
            effective_priority: self.priority_level,
        }
    }
}

/// A patient about to be inserted; the store assigns the id and timestamps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPatient {
    pub hospital: HospitalKey,
    pub display_id: String,
    pub sequence_number: u64,
    pub registration_category: RegistrationCategory,
    pub priority_level: PriorityLevel,
    pub current_flow_step: FlowStep,
    pub personal: PersonalDetails,
    pub payment: PaymentDetails,
    pub registered_by: Option<NonEmptyText>,
}

impl NewPatient {
    pub fn into_patient(self, id: PatientRecordId, now: DateTime<Utc>) -> Patient {
        Patient {
            id,
            hospital: self.hospital,
            display_id: self.display_id,
            sequence_number: self.sequence_number,
            registration_category: self.registration_category,
            priority_level: self.priority_level,
            current_flow_step: self.current_flow_step,
            personal: self.personal,
            payment: self.payment,
            registered_by: self.registered_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of a successful registration.
#[derive(Clone, Debug)]
pub struct RegisteredPatient {
    pub patient: Patient,
    pub classification: Classification,
}

/// Pure patient operations over a record store - no API concerns.
#[derive(Clone)]
pub struct PatientService {
    cfg: Arc<CoreConfig>,
    store: Arc<dyn RecordStore>,
}

impl PatientService {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<dyn RecordStore>) -> Self {
        Self { cfg, store }
    }

    /// Registers a patient from a submitted draft.
    ///
    /// The draft is validated before anything is consumed. The patient is classified, given
    /// the next patient number for the hospital and stored in one write, already at the
    /// post-registration step (`triage`, or `emergency` for emergency and critical patients).
    ///
    /// `manual_sequence` is only used by hospitals with automatic numbering turned off.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::Validation`] with the full report when the draft is incomplete,
    /// allocation errors from [`PatientIdAllocator::allocate`], and store errors. A number
    /// consumed by a registration whose record could not be stored stays consumed; the counter
    /// never moves backwards.
    pub fn register(
        &self,
        ctx: &HospitalContext,
        draft: &PatientDraft,
        manual_sequence: Option<u64>,
    ) -> IntakeResult<RegisteredPatient> {
        validate(draft).into_result()?;

        let classification =
            Classification::for_intake(draft.registration_category, draft.requested_priority);
        let personal = PersonalDetails::from_draft(draft)?;
        let step = FlowRouter::next_step(FlowStep::Registration, &classification)?;

        let allocation =
            PatientIdAllocator::new(self.store.as_ref(), self.cfg.allocation_max_attempts())
                .allocate(ctx, manual_sequence)?;

        let new_patient = NewPatient {
            hospital: ctx.hospital().clone(),
            display_id: allocation.display_id.clone(),
            sequence_number: allocation.sequence_number,
            registration_category: classification.registration_category,
            priority_level: classification.effective_priority,
            current_flow_step: step,
            personal,
            payment: draft.payment.clone(),
            registered_by: ctx.actor().cloned(),
        };

        let patient = self.store.insert_patient(new_patient).map_err(|e| {
            tracing::warn!(
                hospital = %ctx.hospital(),
                sequence = allocation.sequence_number,
                display_id = %allocation.display_id,
                error = %e,
                "patient number left unused after failed registration"
            );
            e
        })?;

        tracing::info!(
            hospital = %ctx.hospital(),
            actor = ctx.actor_label(),
            patient_id = %patient.id,
            display_id = %patient.display_id,
            category = %classification.registration_category,
            priority = %classification.effective_priority,
            step = %patient.current_flow_step,
            "registered patient"
        );

        Ok(RegisteredPatient {
            patient,
            classification,
        })
    }

    /// Reads a patient belonging to the context's hospital.
    ///
    /// A patient registered at another hospital is reported as not found.
    pub fn patient(&self, ctx: &HospitalContext, id: &PatientRecordId) -> IntakeResult<Patient> {
        let patient = self.store.read_patient(id)?;
        if patient.hospital != *ctx.hospital() {
            return Err(IntakeError::PatientNotFound(id.to_string()));
        }
        Ok(patient)
    }

    /// Moves the patient to the default next step for their current checkpoint.
    pub fn advance(&self, ctx: &HospitalContext, id: &PatientRecordId) -> IntakeResult<Patient> {
        let patient = self.patient(ctx, id)?;
        let next = FlowRouter::next_step(patient.current_flow_step, &patient.classification())?;
        self.move_to(ctx, patient, next)
    }

    /// Moves the patient to an explicitly chosen step.
    ///
    /// Used for the pharmacy and billing sub-flows and for discharge. Discharging an already
    /// discharged patient changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::InvalidTransition`] if the flow does not allow the move; the
    /// stored patient is left as it was.
    pub fn route_to(
        &self,
        ctx: &HospitalContext,
        id: &PatientRecordId,
        target: FlowStep,
    ) -> IntakeResult<Patient> {
        let patient = self.patient(ctx, id)?;
        if patient.current_flow_step == FlowStep::Discharged && target == FlowStep::Discharged {
            return Ok(patient);
        }
        let next =
            FlowRouter::transition(patient.current_flow_step, target, &patient.classification())?;
        self.move_to(ctx, patient, next)
    }

    pub fn discharge(&self, ctx: &HospitalContext, id: &PatientRecordId) -> IntakeResult<Patient> {
        self.route_to(ctx, id, FlowStep::Discharged)
    }

    /// Raises the patient's priority. Requesting the current priority is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::PriorityDowngrade`] if `requested` is lower than the current
    /// priority.
    pub fn escalate_priority(
        &self,
        ctx: &HospitalContext,
        id: &PatientRecordId,
        requested: PriorityLevel,
    ) -> IntakeResult<Patient> {
        let patient = self.patient(ctx, id)?;
        let current = patient.priority_level;
        let priority = escalate(current, requested)?;
        if priority == current {
            return Ok(patient);
        }

        let updated = self.store.update_patient_priority(&patient.id, priority)?;
        tracing::info!(
            hospital = %ctx.hospital(),
            actor = ctx.actor_label(),
            patient_id = %updated.id,
            from = %current,
            to = %priority,
            "escalated patient priority"
        );
        Ok(updated)
    }

    fn move_to(
        &self,
        ctx: &HospitalContext,
        patient: Patient,
        next: FlowStep,
    ) -> IntakeResult<Patient> {
        let from = patient.current_flow_step;
        let updated = self.store.update_patient_flow_step(&patient.id, next)?;
        tracing::info!(
            hospital = %ctx.hospital(),
            actor = ctx.actor_label(),
            patient_id = %updated.id,
            from = %from,
            to = %next,
            "moved patient"
        );
        Ok(updated)
    }
}

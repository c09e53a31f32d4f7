//! Patient flow routing.
//!
//! A visit moves through a fixed set of steps:
//!
//! ```text
//! registration ─┬─> triage ────┬─> waiting_consultation ─> consultation ─> post_consultation
//!               └─> emergency ─┘                                              │
//!                                                       pharmacy <──> billing <┘
//! any step ─> discharged
//! ```
//!
//! Emergency and critical patients leave registration for `emergency` instead of `triage`.
//! Pharmacy and billing are optional sub-flows after consultation and may be visited in
//! either order. Routing is a pure function of the current step and the patient's
//! classification; persisting the result is the caller's job.

use crate::classification::Classification;
use crate::{IntakeError, IntakeResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The patient's current position in the visit lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    Registration,
    Triage,
    WaitingConsultation,
    Consultation,
    Emergency,
    PostConsultation,
    Pharmacy,
    Billing,
    Discharged,
}

impl FlowStep {
    pub const ALL: [Self; 9] = [
        Self::Registration,
        Self::Triage,
        Self::WaitingConsultation,
        Self::Consultation,
        Self::Emergency,
        Self::PostConsultation,
        Self::Pharmacy,
        Self::Billing,
        Self::Discharged,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Triage => "triage",
            Self::WaitingConsultation => "waiting_consultation",
            Self::Consultation => "consultation",
            Self::Emergency => "emergency",
            Self::PostConsultation => "post_consultation",
            Self::Pharmacy => "pharmacy",
            Self::Billing => "billing",
            Self::Discharged => "discharged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.as_str() == s)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Discharged)
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the clinician recorded during consultation that needs follow-up.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationOrders {
    #[serde(default)]
    pub prescriptions: bool,
    #[serde(default)]
    pub chargeable_services: bool,
}

/// Flow-step transition rules.
///
/// This is a zero-sized type used for namespacing routing operations.
pub struct FlowRouter;

impl FlowRouter {
    /// The default next step at a checkpoint.
    ///
    /// After post-consultation, pharmacy or billing the default is discharge; visiting the
    /// optional sub-flows is requested explicitly through [`FlowRouter::transition`].
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::InvalidTransition`] from `discharged`, which has no next step.
    pub fn next_step(current: FlowStep, classification: &Classification) -> IntakeResult<FlowStep> {
        let next = match current {
            FlowStep::Registration if classification.is_emergency() => FlowStep::Emergency,
            FlowStep::Registration => FlowStep::Triage,
            FlowStep::Triage | FlowStep::Emergency => FlowStep::WaitingConsultation,
            FlowStep::WaitingConsultation => FlowStep::Consultation,
            FlowStep::Consultation => FlowStep::PostConsultation,
            FlowStep::PostConsultation | FlowStep::Pharmacy | FlowStep::Billing => {
                FlowStep::Discharged
            }
            FlowStep::Discharged => {
                return Err(IntakeError::InvalidTransition {
                    from: current,
                    to: None,
                })
            }
        };
        Ok(next)
    }

    /// Every step a patient at `current` may be moved to.
    pub fn allowed_targets(current: FlowStep, classification: &Classification) -> Vec<FlowStep> {
        let mut targets = Vec::new();
        if let Ok(next) = Self::next_step(current, classification) {
            targets.push(next);
        }

        match current {
            FlowStep::PostConsultation => {
                targets.extend([FlowStep::Pharmacy, FlowStep::Billing]);
            }
            FlowStep::Pharmacy => targets.push(FlowStep::Billing),
            FlowStep::Billing => targets.push(FlowStep::Pharmacy),
            _ => {}
        }

        if !targets.contains(&FlowStep::Discharged) {
            targets.push(FlowStep::Discharged);
        }
        targets
    }

    /// Validates an explicit move from `current` to `target`.
    ///
    /// Discharge is allowed from any step (and is a no-op once discharged). Nothing else may
    /// skip ahead.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::InvalidTransition`] if `target` is not in
    /// [`FlowRouter::allowed_targets`].
    pub fn transition(
        current: FlowStep,
        target: FlowStep,
        classification: &Classification,
    ) -> IntakeResult<FlowStep> {
        if Self::allowed_targets(current, classification).contains(&target) {
            Ok(target)
        } else {
            Err(IntakeError::InvalidTransition {
                from: current,
                to: Some(target),
            })
        }
    }

    /// Sub-flows suggested after consultation, pharmacy first.
    pub fn post_consultation_routes(orders: ConsultationOrders) -> Vec<FlowStep> {
        let mut routes = Vec::new();
        if orders.prescriptions {
            routes.push(FlowStep::Pharmacy);
        }
        if orders.chargeable_services {
            routes.push(FlowStep::Billing);
        }
        routes
    }
}

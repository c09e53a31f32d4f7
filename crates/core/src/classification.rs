//! Priority classification for new registrations.

use crate::{IntakeError, IntakeResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The intake pathway chosen for a patient.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationCategory {
    New,
    Returning,
    Emergency,
}

impl RegistrationCategory {
    pub const ALL: [Self; 3] = [Self::New, Self::Returning, Self::Emergency];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Returning => "returning",
            Self::Emergency => "emergency",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    pub const fn is_emergency(self) -> bool {
        matches!(self, Self::Emergency)
    }
}

impl fmt::Display for RegistrationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clinical urgency. Ordered from least to most urgent.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    #[default]
    Normal,
    Urgent,
    Critical,
}

impl PriorityLevel {
    pub const ALL: [Self; 3] = [Self::Normal, Self::Urgent, Self::Critical];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Urgent => "urgent",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A patient's registration category together with the effective priority derived for it.
///
/// Only [`classify`] and [`escalate`] produce priorities that respect the emergency rule, so
/// flow routing takes this pair rather than loose values.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub registration_category: RegistrationCategory,
    pub effective_priority: PriorityLevel,
}

impl Classification {
    /// Classifies a fresh registration.
    pub fn for_intake(category: RegistrationCategory, requested: PriorityLevel) -> Self {
        Self {
            registration_category: category,
            effective_priority: classify(category, requested),
        }
    }

    /// Whether the patient bypasses normal triage entry.
    pub fn is_emergency(&self) -> bool {
        self.registration_category.is_emergency()
            || self.effective_priority == PriorityLevel::Critical
    }
}

/// Derives the effective priority for a new patient.
///
/// Emergency registrations are always `critical`; every other category keeps the requested
/// priority.
pub fn classify(category: RegistrationCategory, requested: PriorityLevel) -> PriorityLevel {
    if category.is_emergency() {
        PriorityLevel::Critical
    } else {
        requested
    }
}

/// Applies a priority change to an existing patient.
///
/// Priority may be raised or left unchanged, never lowered.
///
/// # Errors
///
/// Returns [`IntakeError::PriorityDowngrade`] if `requested` is below `current`.
pub fn escalate(current: PriorityLevel, requested: PriorityLevel) -> IntakeResult<PriorityLevel> {
    if requested < current {
        return Err(IntakeError::PriorityDowngrade { current, requested });
    }
    Ok(requested)
}

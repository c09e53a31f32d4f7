//! Human-readable patient numbers.
//!
//! Each hospital owns one [`HospitalIdConfig`] describing how display ids look (`PT000042`,
//! `PT2026-000042`, `ST-PT-000042`) and holding the last sequence number handed out. That
//! counter is the only shared mutable state in intake, so allocation goes through a
//! compare-and-swap on the record store and retries a bounded number of times when another
//! registration wins the race.

use crate::constants::{DEFAULT_DIGIT_WIDTH, DEFAULT_ID_PREFIX, MAX_DIGIT_WIDTH, MIN_DIGIT_WIDTH};
use crate::context::HospitalContext;
use crate::error::ConfigError;
use crate::repositories::RecordStore;
use crate::{IntakeError, IntakeResult};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Layout of a display id.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdFormatTemplate {
    /// `{prefix}{number}`
    #[default]
    PrefixNumber,
    /// `{prefix}{year}-{number}`
    PrefixYearNumber,
    /// `{HOSPITAL}-{prefix}-{number}`, where `HOSPITAL` is the first two letters of the
    /// hospital subdomain
    HospitalPrefixNumber,
    /// Rendered like [`IdFormatTemplate::PrefixNumber`].
    Custom,
}

impl IdFormatTemplate {
    pub const ALL: [Self; 4] = [
        Self::PrefixNumber,
        Self::PrefixYearNumber,
        Self::HospitalPrefixNumber,
        Self::Custom,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PrefixNumber => "prefix_number",
            Self::PrefixYearNumber => "prefix_year_number",
            Self::HospitalPrefixNumber => "hospital_prefix_number",
            Self::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for IdFormatTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-hospital numbering configuration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalIdConfig {
    #[serde(default)]
    pub format_template: IdFormatTemplate,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_digit_width")]
    pub digit_width: u32,
    #[serde(default)]
    pub last_sequence_number: u64,
    #[serde(default = "default_auto_increment")]
    pub auto_increment: bool,
}

fn default_prefix() -> String {
    DEFAULT_ID_PREFIX.to_owned()
}

fn default_digit_width() -> u32 {
    DEFAULT_DIGIT_WIDTH
}

fn default_auto_increment() -> bool {
    true
}

impl Default for HospitalIdConfig {
    fn default() -> Self {
        Self {
            format_template: IdFormatTemplate::PrefixNumber,
            prefix: DEFAULT_ID_PREFIX.to_owned(),
            digit_width: DEFAULT_DIGIT_WIDTH,
            last_sequence_number: 0,
            auto_increment: true,
        }
    }
}

impl HospitalIdConfig {
    /// Checks the settings an administrator is about to save.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyPrefix`] for a blank prefix and
    /// [`ConfigError::DigitWidthOutOfRange`] for a width outside 1..=20.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.trim().is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if !(MIN_DIGIT_WIDTH..=MAX_DIGIT_WIDTH).contains(&self.digit_width) {
            return Err(ConfigError::DigitWidthOutOfRange {
                width: self.digit_width,
            });
        }
        Ok(())
    }

    /// Renders `sequence` as a display id using this configuration.
    ///
    /// Numbers wider than `digit_width` are rendered in full.
    pub fn format_id(&self, sequence: u64, ctx: &HospitalContext) -> String {
        let width = self.digit_width as usize;
        let padded = format!("{sequence:0width$}");
        match self.format_template {
            IdFormatTemplate::PrefixNumber | IdFormatTemplate::Custom => {
                format!("{}{}", self.prefix, padded)
            }
            IdFormatTemplate::PrefixYearNumber => {
                format!("{}{}-{}", self.prefix, ctx.today().year(), padded)
            }
            IdFormatTemplate::HospitalPrefixNumber => {
                let hospital: String = ctx
                    .subdomain()
                    .chars()
                    .take(2)
                    .flat_map(char::to_uppercase)
                    .collect();
                format!("{}-{}-{}", hospital, self.prefix, padded)
            }
        }
    }

    /// The id the next automatic allocation would produce.
    ///
    /// Nothing is consumed. A concurrent registration may still take this number first.
    pub fn preview(&self, ctx: &HospitalContext) -> String {
        self.format_id(self.last_sequence_number.saturating_add(1), ctx)
    }

    /// Computes the next allocation without touching any store.
    ///
    /// With automatic numbering the next number is `last_sequence_number + 1` and `manual` is
    /// ignored. Otherwise `manual` must be supplied and must be greater than the last number.
    ///
    /// # Errors
    ///
    /// - [`IntakeError::ManualSequenceRequired`] when automatic numbering is off and no number
    ///   was given,
    /// - [`IntakeError::ManualSequenceNotIncreasing`] when the manual number is not above the
    ///   last one,
    /// - [`IntakeError::InvalidInput`] when the counter is exhausted.
    pub fn next_allocation(
        &self,
        ctx: &HospitalContext,
        manual: Option<u64>,
    ) -> IntakeResult<(String, HospitalIdConfig)> {
        let last = self.last_sequence_number;
        let sequence = if self.auto_increment {
            last.checked_add(1).ok_or_else(|| {
                IntakeError::InvalidInput("patient sequence numbers are exhausted".into())
            })?
        } else {
            let requested = manual.ok_or(IntakeError::ManualSequenceRequired)?;
            if requested <= last {
                return Err(IntakeError::ManualSequenceNotIncreasing { requested, last });
            }
            requested
        };

        let updated = HospitalIdConfig {
            last_sequence_number: sequence,
            ..self.clone()
        };
        Ok((self.format_id(sequence, ctx), updated))
    }
}

/// A consumed sequence number.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Allocation {
    pub display_id: String,
    pub sequence_number: u64,
    /// The configuration as persisted by the allocation.
    pub config: HospitalIdConfig,
}

/// Allocates display ids against a record store.
pub struct PatientIdAllocator<'a> {
    store: &'a dyn RecordStore,
    max_attempts: u32,
}

impl<'a> PatientIdAllocator<'a> {
    pub fn new(store: &'a dyn RecordStore, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Previews the next display id for the context's hospital without consuming it.
    pub fn preview(&self, ctx: &HospitalContext) -> IntakeResult<String> {
        let config = self.store.read_hospital_id_config(ctx.hospital())?;
        Ok(config.preview(ctx))
    }

    /// Consumes the next sequence number for the context's hospital.
    ///
    /// The read-increment-write is a compare-and-swap keyed on the sequence number that was
    /// read; losing the swap re-reads and tries again, up to the configured attempt budget.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::AllocationConflict`] if every attempt lost a race, any error from
    /// [`HospitalIdConfig::next_allocation`], and store errors.
    pub fn allocate(&self, ctx: &HospitalContext, manual: Option<u64>) -> IntakeResult<Allocation> {
        for attempt in 1..=self.max_attempts {
            let current = self.store.read_hospital_id_config(ctx.hospital())?;
            let (display_id, updated) = current.next_allocation(ctx, manual)?;

            if self.store.compare_and_swap_id_config(
                ctx.hospital(),
                current.last_sequence_number,
                &updated,
            )? {
                tracing::info!(
                    hospital = %ctx.hospital(),
                    sequence = updated.last_sequence_number,
                    "allocated patient number"
                );
                return Ok(Allocation {
                    display_id,
                    sequence_number: updated.last_sequence_number,
                    config: updated,
                });
            }

            tracing::debug!(
                hospital = %ctx.hospital(),
                attempt,
                "patient number allocation lost a concurrent update, retrying"
            );
        }

        Err(IntakeError::AllocationConflict {
            attempts: self.max_attempts,
        })
    }
}

//! Wire types shared by the REST API and the CLI.
//!
//! Enumerations travel as their snake_case names (`"emergency"`, `"post_consultation"`), the same
//! strings the core uses in storage. The `parse_*` helpers turn them back into core types.

use intake_core::constants::{DEFAULT_DIGIT_WIDTH, DEFAULT_ID_PREFIX};
use intake_core::{
    FieldError, FlowRouter, FlowStep, HospitalIdConfig, IdFormatTemplate, IntakeError,
    IntakeResult, Patient, PatientDraft, PriorityLevel, RegistrationCategory, ValidationReport,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Error body returned by every failing endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub code: String,
    pub message: String,
    /// Field-level problems, only for validation failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldErrorRes>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldErrorRes {
    /// Dotted field name, e.g. `emergencyContact.phone`.
    pub field: String,
    /// `missing` or `pattern_mismatch`.
    pub kind: String,
    pub message: String,
}

impl From<&FieldError> for FieldErrorRes {
    fn from(e: &FieldError) -> Self {
        Self {
            field: e.field.as_str().to_owned(),
            kind: match e.kind {
                intake_core::FieldErrorKind::Missing => "missing",
                intake_core::FieldErrorKind::PatternMismatch => "pattern_mismatch",
            }
            .to_owned(),
            message: e.message.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ValidationRes {
    pub valid: bool,
    pub errors: Vec<FieldErrorRes>,
}

impl From<&ValidationReport> for ValidationRes {
    fn from(report: &ValidationReport) -> Self {
        Self {
            valid: report.valid,
            errors: report.errors.iter().map(FieldErrorRes::from).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequiredFieldsRes {
    pub registration_category: String,
    pub fields: Vec<String>,
    pub wizard_steps: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyReq {
    pub registration_category: String,
    #[serde(default)]
    pub requested_priority: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyRes {
    pub registration_category: String,
    pub effective_priority: String,
    pub emergency: bool,
    /// Where the patient goes after registration.
    pub next_step: String,
}

/// A hospital's patient-number settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdConfigDto {
    /// `prefix_number`, `prefix_year_number`, `hospital_prefix_number` or `custom`.
    #[serde(default = "default_template")]
    pub format_template: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_digit_width")]
    pub digit_width: u32,
    #[serde(default)]
    pub last_sequence_number: u64,
    #[serde(default = "default_true")]
    pub auto_increment: bool,
}

fn default_template() -> String {
    IdFormatTemplate::default().as_str().to_owned()
}

fn default_prefix() -> String {
    DEFAULT_ID_PREFIX.to_owned()
}

fn default_digit_width() -> u32 {
    DEFAULT_DIGIT_WIDTH
}

fn default_true() -> bool {
    true
}

impl From<&HospitalIdConfig> for IdConfigDto {
    fn from(c: &HospitalIdConfig) -> Self {
        Self {
            format_template: c.format_template.as_str().to_owned(),
            prefix: c.prefix.clone(),
            digit_width: c.digit_width,
            last_sequence_number: c.last_sequence_number,
            auto_increment: c.auto_increment,
        }
    }
}

impl TryFrom<IdConfigDto> for HospitalIdConfig {
    type Error = IntakeError;

    fn try_from(dto: IdConfigDto) -> IntakeResult<Self> {
        Ok(Self {
            format_template: parse_template(&dto.format_template)?,
            prefix: dto.prefix,
            digit_width: dto.digit_width,
            last_sequence_number: dto.last_sequence_number,
            auto_increment: dto.auto_increment,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRes {
    pub next_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateReq {
    #[schema(value_type = Object)]
    pub draft: PatientDraft,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterReq {
    /// The registration form as filled in at the front desk.
    #[schema(value_type = Object)]
    pub draft: PatientDraft,
    /// Only used when the hospital numbers patients manually.
    #[serde(default)]
    pub manual_sequence: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientRes {
    pub id: String,
    pub hospital: String,
    pub display_id: String,
    pub sequence_number: u64,
    pub first_name: String,
    pub last_name: String,
    pub registration_category: String,
    pub priority_level: String,
    pub current_flow_step: String,
    /// Steps the patient may be moved to from here.
    pub allowed_steps: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Patient> for PatientRes {
    fn from(p: &Patient) -> Self {
        Self {
            id: p.id.to_string(),
            hospital: p.hospital.to_string(),
            display_id: p.display_id.clone(),
            sequence_number: p.sequence_number,
            first_name: p.personal.first_name.to_string(),
            last_name: p.personal.last_name.to_string(),
            registration_category: p.registration_category.as_str().to_owned(),
            priority_level: p.priority_level.as_str().to_owned(),
            current_flow_step: p.current_flow_step.as_str().to_owned(),
            allowed_steps: FlowRouter::allowed_targets(p.current_flow_step, &p.classification())
                .into_iter()
                .filter(|s| *s != p.current_flow_step)
                .map(|s| s.as_str().to_owned())
                .collect(),
            created_at: p.created_at.to_rfc3339(),
            updated_at: p.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RouteReq {
    pub target: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PriorityReq {
    pub priority: String,
}

fn unknown(kind: &str, value: &str) -> IntakeError {
    IntakeError::InvalidInput(format!("unknown {kind} '{value}'"))
}

pub fn parse_category(s: &str) -> IntakeResult<RegistrationCategory> {
    RegistrationCategory::parse(s).ok_or_else(|| unknown("registration category", s))
}

pub fn parse_priority(s: &str) -> IntakeResult<PriorityLevel> {
    PriorityLevel::parse(s).ok_or_else(|| unknown("priority level", s))
}

pub fn parse_flow_step(s: &str) -> IntakeResult<FlowStep> {
    FlowStep::parse(s).ok_or_else(|| unknown("flow step", s))
}

pub fn parse_template(s: &str) -> IntakeResult<IdFormatTemplate> {
    IdFormatTemplate::parse(s).ok_or_else(|| unknown("id format template", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::validate;

    #[test]
    fn id_config_dto_converts_both_ways() {
        let config = HospitalIdConfig {
            format_template: IdFormatTemplate::HospitalPrefixNumber,
            prefix: "MRN".into(),
            digit_width: 8,
            last_sequence_number: 12,
            auto_increment: false,
        };
        let dto = IdConfigDto::from(&config);
        assert_eq!(dto.format_template, "hospital_prefix_number");
        assert_eq!(HospitalIdConfig::try_from(dto).unwrap(), config);
    }

    #[test]
    fn id_config_dto_fills_in_defaults() {
        let dto: IdConfigDto = serde_json::from_str("{}").unwrap();
        assert_eq!(dto.format_template, "prefix_number");
        assert_eq!(dto.prefix, "PT");
        assert_eq!(dto.digit_width, 6);
        assert!(dto.auto_increment);

        let config = HospitalIdConfig::try_from(dto).unwrap();
        assert_eq!(config, HospitalIdConfig::default());
    }

    #[test]
    fn unknown_template_is_invalid_input() {
        let dto = IdConfigDto {
            format_template: "roman_numerals".into(),
            prefix: "PT".into(),
            digit_width: 6,
            last_sequence_number: 0,
            auto_increment: true,
        };
        assert!(matches!(
            HospitalIdConfig::try_from(dto),
            Err(IntakeError::InvalidInput(_))
        ));
    }

    #[test]
    fn validation_res_uses_dotted_field_names() {
        let report = validate(&PatientDraft::new(RegistrationCategory::New));
        let res = ValidationRes::from(&report);
        assert!(!res.valid);
        assert!(res
            .errors
            .iter()
            .any(|e| e.field == "emergencyContact.phone" && e.kind == "missing"));
    }

    #[test]
    fn register_req_accepts_camel_case_json() {
        let req: RegisterReq = serde_json::from_str(
            r#"{
                "draft": {
                    "registrationCategory": "emergency",
                    "firstName": "John",
                    "lastName": "Doe",
                    "payment": { "paymentMethod": "cash" }
                },
                "manualSequence": 9
            }"#,
        )
        .unwrap();
        assert_eq!(req.draft.registration_category, RegistrationCategory::Emergency);
        assert_eq!(req.manual_sequence, Some(9));
    }

    #[test]
    fn parse_helpers_reject_unknown_names() {
        assert_eq!(parse_category("returning").unwrap(), RegistrationCategory::Returning);
        assert_eq!(parse_flow_step("billing").unwrap(), FlowStep::Billing);
        assert!(parse_priority("extreme").is_err());
    }
}

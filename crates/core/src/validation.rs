//! Intake validation.
//!
//! This module decides which registration fields are mandatory for a given registration
//! category, checks a [`PatientDraft`] against those rules, and validates the payment
//! sub-form selected by the patient. It also owns the intake wizard layout, because which
//! wizard steps are shown follows from the same category rules.
//!
//! Validation is structural only: presence and shape. It collects every violation instead of
//! stopping at the first one, so a form can show all problems at once, and it never fails:
//! the caller decides whether an invalid report blocks submission.

use crate::classification::{PriorityLevel, RegistrationCategory};
use crate::{IntakeError, IntakeResult};
use intake_types::{EmailAddress, LastFourDigits, TextError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// FIELDS
// ============================================================================

/// Every field of the registration form that a rule can refer to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Field {
    FirstName,
    LastName,
    DateOfBirth,
    Gender,
    ContactNumber,
    Email,
    Address,
    EmergencyContactName,
    EmergencyContactRelationship,
    EmergencyContactPhone,
    InsuranceProvider,
    PolicyNumber,
    ExpiryDate,
    CardType,
    LastFourDigits,
    MobileProvider,
    MobileNumber,
}

impl Field {
    pub const ALL: [Self; 17] = [
        Self::FirstName,
        Self::LastName,
        Self::DateOfBirth,
        Self::Gender,
        Self::ContactNumber,
        Self::Email,
        Self::Address,
        Self::EmergencyContactName,
        Self::EmergencyContactRelationship,
        Self::EmergencyContactPhone,
        Self::InsuranceProvider,
        Self::PolicyNumber,
        Self::ExpiryDate,
        Self::CardType,
        Self::LastFourDigits,
        Self::MobileProvider,
        Self::MobileNumber,
    ];

    /// Form field name, with nested sub-form fields written as `parent.child`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstName => "firstName",
            Self::LastName => "lastName",
            Self::DateOfBirth => "dateOfBirth",
            Self::Gender => "gender",
            Self::ContactNumber => "contactNumber",
            Self::Email => "email",
            Self::Address => "address",
            Self::EmergencyContactName => "emergencyContact.name",
            Self::EmergencyContactRelationship => "emergencyContact.relationship",
            Self::EmergencyContactPhone => "emergencyContact.phone",
            Self::InsuranceProvider => "insuranceProvider",
            Self::PolicyNumber => "policyNumber",
            Self::ExpiryDate => "expiryDate",
            Self::CardType => "cardType",
            Self::LastFourDigits => "lastFourDigits",
            Self::MobileProvider => "mobileProvider",
            Self::MobileNumber => "mobileNumber",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Field {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Field::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("unknown field '{s}'")))
    }
}

// ============================================================================
// DRAFT
// ============================================================================

/// Emergency contact sub-form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContactDraft {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceDetails {
    #[serde(default)]
    pub insurance_provider: Option<String>,
    #[serde(default)]
    pub policy_number: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    #[serde(default)]
    pub card_type: Option<String>,
    #[serde(default)]
    pub last_four_digits: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobilePaymentDetails {
    #[serde(default)]
    pub mobile_provider: Option<String>,
    #[serde(default)]
    pub mobile_number: Option<String>,
}

/// How the patient intends to pay, with only the sub-fields that apply to that method.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "paymentMethod", rename_all = "snake_case")]
pub enum PaymentDetails {
    #[default]
    Cash,
    Insurance(InsuranceDetails),
    CreditCard(CardDetails),
    DebitCard(CardDetails),
    MobilePayment(MobilePaymentDetails),
}

/// Payment method without its sub-fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Insurance,
    CreditCard,
    DebitCard,
    MobilePayment,
}

impl PaymentMethod {
    pub const ALL: [Self; 5] = [
        Self::Cash,
        Self::Insurance,
        Self::CreditCard,
        Self::DebitCard,
        Self::MobilePayment,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Insurance => "insurance",
            Self::CreditCard => "credit_card",
            Self::DebitCard => "debit_card",
            Self::MobilePayment => "mobile_payment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PaymentDetails {
    pub fn method(&self) -> PaymentMethod {
        match self {
            Self::Cash => PaymentMethod::Cash,
            Self::Insurance(_) => PaymentMethod::Insurance,
            Self::CreditCard(_) => PaymentMethod::CreditCard,
            Self::DebitCard(_) => PaymentMethod::DebitCard,
            Self::MobilePayment(_) => PaymentMethod::MobilePayment,
        }
    }

    fn value(&self, field: Field) -> Option<&str> {
        let value = match (self, field) {
            (Self::Insurance(d), Field::InsuranceProvider) => &d.insurance_provider,
            (Self::Insurance(d), Field::PolicyNumber) => &d.policy_number,
            (Self::Insurance(d), Field::ExpiryDate) => &d.expiry_date,
            (Self::CreditCard(d) | Self::DebitCard(d), Field::CardType) => &d.card_type,
            (Self::CreditCard(d) | Self::DebitCard(d), Field::LastFourDigits) => {
                &d.last_four_digits
            }
            (Self::MobilePayment(d), Field::MobileProvider) => &d.mobile_provider,
            (Self::MobilePayment(d), Field::MobileNumber) => &d.mobile_number,
            _ => return None,
        };
        value.as_deref()
    }
}

/// A registration form as submitted, before anything has been checked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDraft {
    pub registration_category: RegistrationCategory,
    #[serde(default)]
    pub requested_priority: PriorityLevel,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub emergency_contact: EmergencyContactDraft,
    #[serde(default)]
    pub payment: PaymentDetails,
}

impl PatientDraft {
    /// An empty draft for the given category, paying cash at normal priority.
    pub fn new(registration_category: RegistrationCategory) -> Self {
        Self {
            registration_category,
            requested_priority: PriorityLevel::Normal,
            first_name: None,
            last_name: None,
            date_of_birth: None,
            gender: None,
            contact_number: None,
            email: None,
            address: None,
            emergency_contact: EmergencyContactDraft::default(),
            payment: PaymentDetails::Cash,
        }
    }

    /// The submitted value of `field`, trimmed, with blank values reported as absent.
    pub fn value(&self, field: Field) -> Option<&str> {
        let raw = match field {
            Field::FirstName => self.first_name.as_deref(),
            Field::LastName => self.last_name.as_deref(),
            Field::DateOfBirth => self.date_of_birth.as_deref(),
            Field::Gender => self.gender.as_deref(),
            Field::ContactNumber => self.contact_number.as_deref(),
            Field::Email => self.email.as_deref(),
            Field::Address => self.address.as_deref(),
            Field::EmergencyContactName => self.emergency_contact.name.as_deref(),
            Field::EmergencyContactRelationship => self.emergency_contact.relationship.as_deref(),
            Field::EmergencyContactPhone => self.emergency_contact.phone.as_deref(),
            _ => self.payment.value(field),
        };
        raw.map(str::trim).filter(|v| !v.is_empty())
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    Missing,
    PatternMismatch,
}

/// One violated rule.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: Field,
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    fn missing(field: Field) -> Self {
        Self {
            field,
            kind: FieldErrorKind::Missing,
            message: format!("{field} is required"),
        }
    }

    fn pattern_mismatch(field: Field, err: TextError) -> Self {
        Self {
            field,
            kind: FieldErrorKind::PatternMismatch,
            message: err.to_string(),
        }
    }
}

/// Outcome of validating a draft: every field-level problem found.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Errors reported against `field`.
    pub fn errors_for(&self, field: Field) -> impl Iterator<Item = &FieldError> {
        self.errors.iter().filter(move |e| e.field == field)
    }

    /// Converts an invalid report into [`IntakeError::Validation`].
    pub fn into_result(self) -> IntakeResult<()> {
        if self.valid {
            Ok(())
        } else {
            Err(IntakeError::Validation(self))
        }
    }
}

// ============================================================================
// RULES
// ============================================================================

/// Mandatory personal and contact fields for a registration category.
///
/// Emergency patients may arrive unable to give more than a name, so only the name is
/// mandatory for them.
pub fn required_fields(category: RegistrationCategory) -> BTreeSet<Field> {
    match category {
        RegistrationCategory::Emergency => BTreeSet::from([Field::FirstName, Field::LastName]),
        RegistrationCategory::New | RegistrationCategory::Returning => BTreeSet::from([
            Field::FirstName,
            Field::LastName,
            Field::DateOfBirth,
            Field::Gender,
            Field::ContactNumber,
            Field::Address,
            Field::EmergencyContactName,
            Field::EmergencyContactRelationship,
            Field::EmergencyContactPhone,
        ]),
    }
}

/// Mandatory sub-fields for a payment method, for non-emergency registrations.
pub fn payment_required_fields(method: PaymentMethod) -> BTreeSet<Field> {
    match method {
        PaymentMethod::Cash => BTreeSet::new(),
        PaymentMethod::Insurance => BTreeSet::from([Field::InsuranceProvider, Field::PolicyNumber]),
        PaymentMethod::CreditCard | PaymentMethod::DebitCard => {
            BTreeSet::from([Field::CardType, Field::LastFourDigits])
        }
        PaymentMethod::MobilePayment => BTreeSet::from([Field::MobileProvider]),
    }
}

/// Validates a registration draft.
///
/// Presence rules depend on the registration category. Shape rules (email address, card
/// last four digits) apply to any value that is present, whatever the category.
pub fn validate(draft: &PatientDraft) -> ValidationReport {
    let mut errors = Vec::new();

    let mut required = required_fields(draft.registration_category);
    if !draft.registration_category.is_emergency() {
        required.extend(payment_required_fields(draft.payment.method()));
    }

    for field in required {
        if draft.value(field).is_none() {
            errors.push(FieldError::missing(field));
        }
    }

    if let Some(email) = draft.value(Field::Email) {
        if let Err(e) = EmailAddress::parse(email) {
            errors.push(FieldError::pattern_mismatch(Field::Email, e));
        }
    }

    // Checked untrimmed: the card input is fixed-width.
    if let PaymentDetails::CreditCard(card) | PaymentDetails::DebitCard(card) = &draft.payment {
        if let Some(digits) = card.last_four_digits.as_deref().filter(|d| !d.trim().is_empty()) {
            if let Err(e) = LastFourDigits::parse(digits) {
                errors.push(FieldError::pattern_mismatch(Field::LastFourDigits, e));
            }
        }
    }

    ValidationReport::from_errors(errors)
}

// ============================================================================
// WIZARD
// ============================================================================

/// Steps of the registration wizard, in display order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    PatientType,
    PersonalDetails,
    ContactDetails,
    EmergencyContact,
    Payment,
    Review,
}

impl WizardStep {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PatientType => "patient_type",
            Self::PersonalDetails => "personal_details",
            Self::ContactDetails => "contact_details",
            Self::EmergencyContact => "emergency_contact",
            Self::Payment => "payment",
            Self::Review => "review",
        }
    }

    /// 1-based position in the full wizard.
    pub const fn number(self) -> u8 {
        match self {
            Self::PatientType => 1,
            Self::PersonalDetails => 2,
            Self::ContactDetails => 3,
            Self::EmergencyContact => 4,
            Self::Payment => 5,
            Self::Review => 6,
        }
    }
}

/// Wizard steps shown for a registration category.
///
/// Emergency registrations skip the emergency-contact step since none of its fields are
/// required for them.
pub fn wizard_steps(category: RegistrationCategory) -> Vec<WizardStep> {
    let all = [
        WizardStep::PatientType,
        WizardStep::PersonalDetails,
        WizardStep::ContactDetails,
        WizardStep::EmergencyContact,
        WizardStep::Payment,
        WizardStep::Review,
    ];
    let required = required_fields(category);
    all.into_iter()
        .filter(|step| {
            *step != WizardStep::EmergencyContact
                || required.contains(&Field::EmergencyContactName)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_draft(category: RegistrationCategory) -> PatientDraft {
        PatientDraft {
            registration_category: category,
            requested_priority: PriorityLevel::Normal,
            first_name: Some("Jane".into()),
            last_name: Some("Doe".into()),
            date_of_birth: Some("1990-04-12".into()),
            gender: Some("female".into()),
            contact_number: Some("+44 7700 900123".into()),
            email: Some("jane.doe@example.com".into()),
            address: Some("1 High Street".into()),
            emergency_contact: EmergencyContactDraft {
                name: Some("John Doe".into()),
                relationship: Some("spouse".into()),
                phone: Some("+44 7700 900456".into()),
            },
            payment: PaymentDetails::Cash,
        }
    }

    fn fields_with(report: &ValidationReport, kind: FieldErrorKind) -> BTreeSet<Field> {
        report
            .errors
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.field)
            .collect()
    }

    #[test]
    fn non_emergency_required_fields_are_exact() {
        let expected: BTreeSet<&str> = [
            "firstName",
            "lastName",
            "dateOfBirth",
            "gender",
            "contactNumber",
            "address",
            "emergencyContact.name",
            "emergencyContact.relationship",
            "emergencyContact.phone",
        ]
        .into_iter()
        .collect();

        for category in [RegistrationCategory::New, RegistrationCategory::Returning] {
            let names: BTreeSet<&str> =
                required_fields(category).into_iter().map(Field::as_str).collect();
            assert_eq!(names, expected);
        }
    }

    #[test]
    fn emergency_requires_only_names() {
        assert_eq!(
            required_fields(RegistrationCategory::Emergency),
            BTreeSet::from([Field::FirstName, Field::LastName])
        );
    }

    #[test]
    fn emergency_with_only_names_is_valid() {
        let mut draft = PatientDraft::new(RegistrationCategory::Emergency);
        draft.first_name = Some("Jane".into());
        draft.last_name = Some("Doe".into());
        draft.gender = Some(String::new());

        let report = validate(&draft);
        assert!(report.valid, "unexpected errors: {:?}", report.errors);
    }

    #[test]
    fn emergency_without_names_reports_both() {
        let report = validate(&PatientDraft::new(RegistrationCategory::Emergency));
        assert!(!report.valid);
        assert_eq!(
            fields_with(&report, FieldErrorKind::Missing),
            BTreeSet::from([Field::FirstName, Field::LastName])
        );
    }

    #[test]
    fn empty_new_draft_reports_every_missing_field() {
        let report = validate(&PatientDraft::new(RegistrationCategory::New));
        assert_eq!(
            fields_with(&report, FieldErrorKind::Missing),
            required_fields(RegistrationCategory::New)
        );
    }

    #[test]
    fn whitespace_counts_as_missing() {
        let mut draft = complete_draft(RegistrationCategory::Returning);
        draft.address = Some("   ".into());
        let report = validate(&draft);
        assert_eq!(
            fields_with(&report, FieldErrorKind::Missing),
            BTreeSet::from([Field::Address])
        );
    }

    #[test]
    fn complete_new_draft_is_valid() {
        let report = validate(&complete_draft(RegistrationCategory::New));
        assert!(report.valid, "unexpected errors: {:?}", report.errors);
    }

    #[test]
    fn malformed_email_is_pattern_mismatch_and_absence_is_fine() {
        let mut draft = complete_draft(RegistrationCategory::New);
        draft.email = Some("not-an-email".into());
        let report = validate(&draft);
        assert_eq!(
            fields_with(&report, FieldErrorKind::PatternMismatch),
            BTreeSet::from([Field::Email])
        );

        draft.email = None;
        assert!(validate(&draft).valid);
    }

    #[test]
    fn credit_card_last_four_must_be_digits() {
        let mut draft = complete_draft(RegistrationCategory::New);
        draft.payment = PaymentDetails::CreditCard(CardDetails {
            card_type: Some("visa".into()),
            last_four_digits: Some("12a4".into()),
        });

        let report = validate(&draft);
        assert!(!report.valid);
        let errors: Vec<_> = report.errors_for(Field::LastFourDigits).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, FieldErrorKind::PatternMismatch);
    }

    #[test]
    fn card_payment_requires_type_and_digits() {
        let mut draft = complete_draft(RegistrationCategory::New);
        draft.payment = PaymentDetails::DebitCard(CardDetails::default());
        let report = validate(&draft);
        assert_eq!(
            fields_with(&report, FieldErrorKind::Missing),
            BTreeSet::from([Field::CardType, Field::LastFourDigits])
        );
    }

    #[test]
    fn insurance_requires_provider_and_policy_but_not_expiry() {
        let mut draft = complete_draft(RegistrationCategory::Returning);
        draft.payment = PaymentDetails::Insurance(InsuranceDetails {
            insurance_provider: Some("Acme Health".into()),
            policy_number: None,
            expiry_date: None,
        });
        let report = validate(&draft);
        assert_eq!(
            fields_with(&report, FieldErrorKind::Missing),
            BTreeSet::from([Field::PolicyNumber])
        );
    }

    #[test]
    fn mobile_payment_requires_provider_only() {
        let mut draft = complete_draft(RegistrationCategory::New);
        draft.payment = PaymentDetails::MobilePayment(MobilePaymentDetails {
            mobile_provider: Some("M-Pesa".into()),
            mobile_number: None,
        });
        assert!(validate(&draft).valid);
    }

    #[test]
    fn emergency_payment_sub_fields_are_optional_but_still_shape_checked() {
        let mut draft = PatientDraft::new(RegistrationCategory::Emergency);
        draft.first_name = Some("Jane".into());
        draft.last_name = Some("Doe".into());
        draft.payment = PaymentDetails::CreditCard(CardDetails::default());
        assert!(validate(&draft).valid);

        draft.payment = PaymentDetails::CreditCard(CardDetails {
            card_type: None,
            last_four_digits: Some("99".into()),
        });
        let report = validate(&draft);
        assert_eq!(
            fields_with(&report, FieldErrorKind::PatternMismatch),
            BTreeSet::from([Field::LastFourDigits])
        );
    }

    #[test]
    fn payment_required_fields_per_method() {
        assert!(payment_required_fields(PaymentMethod::Cash).is_empty());
        assert_eq!(
            payment_required_fields(PaymentMethod::Insurance),
            BTreeSet::from([Field::InsuranceProvider, Field::PolicyNumber])
        );
        assert_eq!(
            payment_required_fields(PaymentMethod::MobilePayment),
            BTreeSet::from([Field::MobileProvider])
        );
    }

    #[test]
    fn draft_deserializes_from_form_json() {
        let json = r#"{
            "registrationCategory": "new",
            "requestedPriority": "urgent",
            "firstName": "Jane",
            "emergencyContact": { "name": "John" },
            "payment": { "paymentMethod": "credit_card", "cardType": "visa", "lastFourDigits": "4242" }
        }"#;
        let draft: PatientDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.requested_priority, PriorityLevel::Urgent);
        assert_eq!(draft.value(Field::EmergencyContactName), Some("John"));
        assert_eq!(draft.payment.method(), PaymentMethod::CreditCard);
        assert_eq!(draft.value(Field::LastFourDigits), Some("4242"));
    }

    #[test]
    fn report_serializes_dotted_field_names() {
        let report = validate(&PatientDraft::new(RegistrationCategory::New));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["valid"], false);
        assert!(json["errors"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["field"] == "emergencyContact.phone" && e["kind"] == "missing"));
    }

    #[test]
    fn wizard_hides_emergency_contact_step_for_emergencies() {
        let steps = wizard_steps(RegistrationCategory::Emergency);
        assert!(!steps.contains(&WizardStep::EmergencyContact));
        assert_eq!(steps.len(), 5);

        let steps = wizard_steps(RegistrationCategory::New);
        assert_eq!(steps[3], WizardStep::EmergencyContact);
        assert_eq!(steps[3].number(), 4);
    }
}

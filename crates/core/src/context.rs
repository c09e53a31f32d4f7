//! Explicit request context.
//!
//! Every operation that needs to know which hospital is active, who is acting, or what today's
//! date is receives a [`HospitalContext`]. Nothing in the core reads that information from
//! process-wide state.

use crate::constants::MAX_HOSPITAL_KEY_LEN;
use crate::{IntakeError, IntakeResult, NonEmptyText};
use chrono::{NaiveDate, Utc};
use std::{fmt, str::FromStr};

/// Identifier of a hospital tenant.
///
/// Keys are used as directory names and URL path segments, so they are restricted to
/// ASCII alphanumerics plus `.`, `-` and `_`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HospitalKey(String);

impl HospitalKey {
    /// # Errors
    ///
    /// Returns [`IntakeError::InvalidInput`] if the key is empty, too long, or contains
    /// characters outside the allowed set.
    pub fn parse(input: &str) -> IntakeResult<Self> {
        validate_hospital_key(input)?;
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validates that a hospital key is safe to use as a directory name and URL path segment.
///
/// - Rejects empty or whitespace-only strings
/// - Bounds the length to a DNS label
/// - Restricts characters to a conservative ASCII set
///
/// # Errors
///
/// Returns [`IntakeError::InvalidInput`] if the key is invalid.
fn validate_hospital_key(key: &str) -> IntakeResult<()> {
    if key.trim().is_empty() {
        return Err(IntakeError::InvalidInput(
            "hospital key cannot be empty".into(),
        ));
    }

    if key.len() > MAX_HOSPITAL_KEY_LEN {
        return Err(IntakeError::InvalidInput(format!(
            "hospital key exceeds maximum length of {} characters",
            MAX_HOSPITAL_KEY_LEN
        )));
    }

    let ok = key
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'.' | b'-' | b'_'));

    // A key made only of dots would resolve to the current or parent directory.
    if !ok || key.bytes().all(|b| b == b'.') {
        return Err(IntakeError::InvalidInput(
            "hospital key contains invalid characters (only alphanumeric, '.', '-', '_' allowed)"
                .into(),
        ));
    }

    Ok(())
}

impl fmt::Display for HospitalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HospitalKey {
    type Err = IntakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HospitalKey::parse(s)
    }
}

impl serde::Serialize for HospitalKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for HospitalKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HospitalKey::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// The active hospital, acting user and business date for one request.
#[derive(Clone, Debug)]
pub struct HospitalContext {
    hospital: HospitalKey,
    subdomain: String,
    actor: Option<NonEmptyText>,
    today: NaiveDate,
}

impl HospitalContext {
    /// Creates a context dated today (UTC) whose subdomain is the hospital key itself.
    pub fn new(hospital: HospitalKey) -> Self {
        let subdomain = hospital.as_str().to_owned();
        Self {
            hospital,
            subdomain,
            actor: None,
            today: Utc::now().date_naive(),
        }
    }

    /// Overrides the hospital's public subdomain, used by the `hospital_prefix_number` format.
    pub fn with_subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.subdomain = subdomain.into();
        self
    }

    pub fn with_actor(mut self, actor: Option<NonEmptyText>) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn hospital(&self) -> &HospitalKey {
        &self.hospital
    }

    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    pub fn actor(&self) -> Option<&NonEmptyText> {
        self.actor.as_ref()
    }

    /// Actor name for log lines; `"system"` when nobody is named.
    pub fn actor_label(&self) -> &str {
        self.actor.as_ref().map_or("system", NonEmptyText::as_str)
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hospital_key_accepts_subdomain_like_values() {
        for key in ["stmarys", "city-general", "north_wing.2"] {
            assert_eq!(HospitalKey::parse(key).unwrap().as_str(), key);
        }
    }

    #[test]
    fn hospital_key_rejects_path_and_uri_characters() {
        for key in ["", "  ", "../etc", "a/b", "st marys", "hépital"] {
            assert!(HospitalKey::parse(key).is_err(), "{key:?} should be rejected");
        }
    }

    #[test]
    fn hospital_key_rejects_dot_only_values() {
        assert!(validate_hospital_key(".").is_err());
        assert!(validate_hospital_key("..").is_err());
        assert!(validate_hospital_key("a".repeat(64).as_str()).is_err());
        assert!(validate_hospital_key("general.hospital").is_ok());
    }

    #[test]
    fn context_defaults_subdomain_to_hospital_key() {
        let ctx = HospitalContext::new(HospitalKey::parse("stmarys").unwrap());
        assert_eq!(ctx.subdomain(), "stmarys");
        assert_eq!(ctx.actor_label(), "system");

        let ctx = ctx
            .with_subdomain("st-marys")
            .with_actor(Some(NonEmptyText::new("Nurse Joy").unwrap()));
        assert_eq!(ctx.subdomain(), "st-marys");
        assert_eq!(ctx.actor_label(), "Nurse Joy");
    }
}

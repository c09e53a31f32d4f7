//! Validated text primitives shared across the intake crates.
//!
//! Each type here guarantees its invariant once constructed, so code further in can rely on
//! the shape of the value without re-checking it.

use regex::Regex;
use std::sync::LazyLock;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
        .expect("email pattern is a valid regex")
});

static LAST_FOUR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}$").expect("last-four pattern is a valid regex"));

/// Errors that can occur when creating validated text types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input is not a well-formed email address
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    /// The input is not exactly four ASCII digits
    #[error("expected exactly four digits")]
    InvalidLastFourDigits,
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Like [`NonEmptyText::new`], but maps blank input to `None` instead of an error.
    ///
    /// Intake forms submit untouched fields as empty strings, so "blank" and "absent" are
    /// treated the same way.
    pub fn from_optional(input: Option<&str>) -> Option<Self> {
        input.and_then(|s| Self::new(s).ok())
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// An email address that matched the standard `local@domain.tld` shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parses and trims an email address.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] for blank input and [`TextError::InvalidEmail`] when the
    /// trimmed value does not look like an address.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if !EMAIL_PATTERN.is_match(trimmed) {
            return Err(TextError::InvalidEmail(trimmed.to_owned()));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The last four digits of a payment card.
///
/// Exactly four ASCII digits; no surrounding whitespace is tolerated because the value is
/// usually typed into a fixed-width input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastFourDigits([u8; 4]);

impl LastFourDigits {
    /// # Errors
    ///
    /// Returns [`TextError::InvalidLastFourDigits`] unless `input` is exactly four digits.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let input = input.as_ref();
        if !LAST_FOUR_PATTERN.is_match(input) {
            return Err(TextError::InvalidLastFourDigits);
        }
        let bytes = input.as_bytes();
        Ok(Self([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII digits are ever stored.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl std::fmt::Display for LastFourDigits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_and_rejects_blank() {
        assert_eq!(NonEmptyText::new("  Jane ").unwrap().as_str(), "Jane");
        assert_eq!(NonEmptyText::new("   "), Err(TextError::Empty));
    }

    #[test]
    fn from_optional_treats_blank_as_absent() {
        assert!(NonEmptyText::from_optional(None).is_none());
        assert!(NonEmptyText::from_optional(Some("")).is_none());
        assert!(NonEmptyText::from_optional(Some(" \t")).is_none());
        assert_eq!(
            NonEmptyText::from_optional(Some("Doe")).map(|t| t.to_string()),
            Some("Doe".to_string())
        );
    }

    #[test]
    fn non_empty_text_deserialize_rejects_empty() {
        let err = serde_json::from_str::<NonEmptyText>("\"  \"");
        assert!(err.is_err());
        let ok: NonEmptyText = serde_json::from_str("\"Ward 7\"").unwrap();
        assert_eq!(ok.as_str(), "Ward 7");
    }

    #[test]
    fn email_accepts_common_addresses() {
        for addr in ["jane.doe@example.com", "a+b@sub.hospital.org", "x_y%z@h-1.io"] {
            assert!(EmailAddress::parse(addr).is_ok(), "{addr} should parse");
        }
    }

    #[test]
    fn email_rejects_malformed_addresses() {
        for addr in ["jane", "jane@", "@example.com", "jane@example", "jane doe@example.com"] {
            assert!(
                matches!(EmailAddress::parse(addr), Err(TextError::InvalidEmail(_))),
                "{addr} should be rejected"
            );
        }
        assert_eq!(EmailAddress::parse(""), Err(TextError::Empty));
    }

    #[test]
    fn last_four_digits_requires_exactly_four_digits() {
        assert_eq!(LastFourDigits::parse("1234").unwrap().as_str(), "1234");
        for bad in ["12a4", "123", "12345", " 1234", "١٢٣٤"] {
            assert_eq!(
                LastFourDigits::parse(bad),
                Err(TextError::InvalidLastFourDigits),
                "{bad} should be rejected"
            );
        }
    }
}

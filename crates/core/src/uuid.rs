//! Patient record identifiers and sharded storage paths.
//!
//! The record store assigns every patient an opaque identifier. It is a UUID v4 kept in a
//! *canonical* form: **32 lowercase hexadecimal characters**, no hyphens
//! (for example `550e8400e29b41d4a716446655440000`). This is distinct from the
//! human-readable display id (`PT000042`) produced by the allocator.
//!
//! Canonical form is required for identifiers supplied from outside the core (CLI arguments,
//! URL path segments). Uppercase, hyphenated, wrong-length or non-hex values are rejected
//! rather than normalised.
//!
//! The file store shards patient directories by the first four hex characters:
//! `parent_dir/<id[0..2]>/<id[2..4]>/<id>/`, which keeps directory fan-out small.

use crate::{IntakeError, IntakeResult};
use std::path::{Path, PathBuf};
use std::{fmt, str::FromStr};
use ::uuid::Uuid;

/// Store-assigned patient identifier in canonical form.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PatientRecordId(Uuid);

impl PatientRecordId {
    /// Generates a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses an identifier that must already be canonical.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::InvalidInput`] if `input` is not in canonical form.
    pub fn parse(input: &str) -> IntakeResult<Self> {
        if !Self::is_canonical(input) {
            return Err(IntakeError::InvalidInput(format!(
                "patient id must be 32 lowercase hex characters without hyphens, got: '{}'",
                input
            )));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| IntakeError::InvalidInput(format!("invalid patient id: {e}")))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true if `input` is exactly 32 lowercase hex characters.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Returns `parent_dir/<s1>/<s2>/<id>/` where `s1`/`s2` are the first two hex pairs.
    pub fn sharded_dir(&self, parent_dir: &Path) -> PathBuf {
        let canonical = self.0.simple().to_string();
        let s1 = &canonical[0..2];
        let s2 = &canonical[2..4];
        parent_dir.join(s1).join(s2).join(&canonical)
    }
}

impl Default for PatientRecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatientRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for PatientRecordId {
    type Err = IntakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatientRecordId::parse(s)
    }
}

impl serde::Serialize for PatientRecordId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for PatientRecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PatientRecordId::parse(&s).map_err(serde::de::Error::custom)
    }
}

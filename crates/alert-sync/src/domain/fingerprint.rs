//! Stable alert identifier.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use super::DomainError;

/// Longest fingerprint the backend will hand us.
pub const MAX_FINGERPRINT_LEN: usize = 512;

static FINGERPRINT_CHARSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").unwrap());

/// Opaque identifier for one alert instance across its whole lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Validate and wrap a raw fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidFingerprint`] when the value is empty,
    /// longer than [`MAX_FINGERPRINT_LEN`], or outside `[A-Za-z0-9._-]`.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.is_empty() {
            return Err(DomainError::InvalidFingerprint("empty".to_string()));
        }
        if raw.len() > MAX_FINGERPRINT_LEN {
            return Err(DomainError::InvalidFingerprint(format!(
                "longer than {MAX_FINGERPRINT_LEN} characters"
            )));
        }
        if !FINGERPRINT_CHARSET.is_match(raw) {
            return Err(DomainError::InvalidFingerprint(format!(
                "{raw:?} contains characters outside [A-Za-z0-9._-]"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Borrow the raw value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_backend_style_fingerprints() {
        for raw in ["fp-1", "a1b2c3", "Node.cpu_high-01", "x"] {
            let fp = Fingerprint::parse(raw).unwrap();
            assert_eq!(fp.as_str(), raw);
        }
    }

    #[test]
    fn test_rejects_empty_and_bad_charset() {
        assert!(Fingerprint::parse("").is_err());
        assert!(Fingerprint::parse("has space").is_err());
        assert!(Fingerprint::parse("slash/path").is_err());
        assert!(Fingerprint::parse("colon:key").is_err());
    }

    #[test]
    fn test_length_limit() {
        let max = "a".repeat(MAX_FINGERPRINT_LEN);
        assert!(Fingerprint::parse(&max).is_ok());

        let too_long = "a".repeat(MAX_FINGERPRINT_LEN + 1);
        assert!(matches!(
            Fingerprint::parse(&too_long),
            Err(DomainError::InvalidFingerprint(_))
        ));
    }

    #[test]
    fn test_serde_validates() {
        let fp: Fingerprint = serde_json::from_str(r#""fp-9""#).unwrap();
        assert_eq!(fp.to_string(), "fp-9");
        assert!(serde_json::from_str::<Fingerprint>(r#""bad fp""#).is_err());
    }
}

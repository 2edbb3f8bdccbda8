//! Severity levels and lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DomainError;

/// Severity levels reported by the alerting backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Severity {
    /// Page someone now
    Critical,
    /// Needs attention soon
    High,
    /// Something looks off
    Warning,
    /// Informational
    Info,
    /// Lowest priority
    Low,
}

impl Severity {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Low => "low",
        }
    }

    /// Attachment color for firing messages.
    #[must_use]
    pub const fn color(&self) -> &'static str {
        match self {
            Self::Critical => "#e74c3c", // Red
            Self::High => "#e67e22",     // Dark orange
            Self::Warning => "#f39c12",  // Orange
            Self::Info => "#3498db",     // Blue
            Self::Low => "#95a5a6",      // Grey
        }
    }

    /// Emoji prefix used in message titles.
    #[must_use]
    pub const fn emoji(&self) -> &'static str {
        match self {
            Self::Critical => ":rotating_light:",
            Self::High => ":red_circle:",
            Self::Warning => ":warning:",
            Self::Info => ":information_source:",
            Self::Low => ":white_circle:",
        }
    }
}

impl FromStr for Severity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "warning" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "low" => Ok(Self::Low),
            _ => Err(DomainError::InvalidSeverity(s.to_string())),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Status {
    /// Alert condition is active
    Firing,
    /// Someone is looking at it
    Acknowledged,
    /// Condition cleared
    Resolved,
}

impl Status {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Firing => "firing",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }
}

impl FromStr for Status {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firing" => Ok(Self::Firing),
            "acknowledged" => Ok(Self::Acknowledged),
            "resolved" => Ok(Self::Resolved),
            _ => Err(DomainError::InvalidStatus(s.to_string())),
        }
    }
}

impl TryFrom<String> for Status {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

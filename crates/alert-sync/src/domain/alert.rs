//! The alert aggregate.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::{DomainError, Fingerprint, Severity, Status};

/// One alert as seen by this service for the duration of a single event.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    fingerprint: Fingerprint,
    name: String,
    severity: Severity,
    status: Status,
    description: String,
    source: String,
    labels: HashMap<String, String>,
    firing_start_time: DateTime<Utc>,
}

impl Alert {
    /// Build a fresh alert from an inbound event.
    ///
    /// `sources` are the originating systems and are joined with `", "`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::EmptyName`] when `name` is blank.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fingerprint: Fingerprint,
        name: &str,
        severity: Severity,
        status: Status,
        description: &str,
        sources: &[String],
        labels: HashMap<String, String>,
        firing_start_time: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::EmptyName);
        }
        Ok(Self::restore(
            fingerprint,
            name.to_string(),
            severity,
            status,
            description.to_string(),
            sources.join(", "),
            labels,
            firing_start_time,
        ))
    }

    /// Rebuild an alert from trusted persisted or backend data. No validation.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn restore(
        fingerprint: Fingerprint,
        name: String,
        severity: Severity,
        status: Status,
        description: String,
        source: String,
        labels: HashMap<String, String>,
        firing_start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            fingerprint,
            name,
            severity,
            status,
            description,
            source,
            labels,
            firing_start_time,
        }
    }

    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Originating systems, already joined for display.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// A copy of the label set. Mutating it does not touch the alert.
    #[must_use]
    pub fn labels(&self) -> HashMap<String, String> {
        self.labels.clone()
    }

    #[must_use]
    pub fn firing_start_time(&self) -> DateTime<Utc> {
        self.firing_start_time
    }

    /// Replace the label set with a copy of `labels`.
    pub fn set_labels(&mut self, labels: &HashMap<String, String>) {
        self.labels = labels.clone();
    }

    /// Same alert, displayed as if it started firing at `start`.
    ///
    /// Used to pin elapsed-time displays to the first firing we tracked.
    #[must_use]
    pub fn with_firing_start(mut self, start: DateTime<Utc>) -> Self {
        self.firing_start_time = start;
        self
    }

    /// Same alert with a different status.
    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }
}

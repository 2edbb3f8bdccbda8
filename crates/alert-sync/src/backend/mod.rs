//! Alerting backend contract.
//!
//! The backend stores out-of-band metadata on alerts as string
//! "enrichments". Only two keys matter here, `status` and `assignee`, so the
//! string map is parsed into [`Enrichment`] at the client boundary and
//! never leaks into the domain model.

pub mod keep;

pub use keep::KeepClient;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::{Alert, Fingerprint, Status};

/// Errors returned by backend clients.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// Response could not be interpreted
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    /// Client could not be constructed
    #[error("backend client misconfigured: {0}")]
    Configuration(String),
}

/// Enrichment keys this service reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrichmentKey {
    Status,
    Assignee,
}

impl EnrichmentKey {
    /// Wire name of the key.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Assignee => "assignee",
        }
    }
}

/// Typed view of the enrichments we care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    /// Status override set by a human action
    pub status: Option<Status>,
    /// Backend username of whoever owns the alert
    pub assignee: Option<String>,
}

impl Enrichment {
    /// Parse the backend's string map, ignoring unknown keys and values.
    #[must_use]
    pub fn from_wire(map: &HashMap<String, String>) -> Self {
        let status = map
            .get(EnrichmentKey::Status.as_str())
            .and_then(|s| s.parse().ok());
        let assignee = map
            .get(EnrichmentKey::Assignee.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self { status, assignee }
    }

    /// Encode into the backend's string map. Unset fields are omitted.
    #[must_use]
    pub fn to_wire(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        if let Some(status) = self.status {
            map.insert(
                EnrichmentKey::Status.as_str().to_string(),
                status.as_str().to_string(),
            );
        }
        if let Some(assignee) = &self.assignee {
            map.insert(
                EnrichmentKey::Assignee.as_str().to_string(),
                assignee.clone(),
            );
        }
        map
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.assignee.is_none()
    }
}

/// An alert as reported by the backend, with its enrichments.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendAlert {
    pub alert: Alert,
    pub enrichment: Enrichment,
}

impl BackendAlert {
    /// True when either the alert's own status or the status enrichment
    /// says acknowledged.
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        self.alert.status() == Status::Acknowledged
            || self.enrichment.status == Some(Status::Acknowledged)
    }

    /// True when either signal says resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.alert.status() == Status::Resolved
            || self.enrichment.status == Some(Status::Resolved)
    }

    /// Backend assignee, empty string when unassigned.
    #[must_use]
    pub fn assignee(&self) -> &str {
        self.enrichment.assignee.as_deref().unwrap_or_default()
    }
}

/// Operations this service needs from the alerting backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertBackend: Send + Sync {
    /// Fetch one alert. `Ok(None)` when the backend does not know it.
    async fn get_alert(&self, fingerprint: &Fingerprint)
        -> Result<Option<BackendAlert>, BackendError>;

    /// Attach enrichments. With `dispose_on_new_alert` the backend clears
    /// them the next time the alert re-fires upstream.
    async fn enrich(
        &self,
        fingerprint: &Fingerprint,
        enrichment: &Enrichment,
        dispose_on_new_alert: bool,
    ) -> Result<(), BackendError>;

    /// Remove enrichments by key.
    async fn unenrich(
        &self,
        fingerprint: &Fingerprint,
        keys: &[EnrichmentKey],
    ) -> Result<(), BackendError>;

    /// Fetch up to `limit` recent alerts in one call.
    async fn list_alerts(&self, limit: usize) -> Result<Vec<BackendAlert>, BackendError>;
}

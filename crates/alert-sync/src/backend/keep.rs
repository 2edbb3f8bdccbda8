//! Keep REST API client.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{AlertBackend, BackendAlert, BackendError, Enrichment, EnrichmentKey};
use crate::domain::{Alert, Fingerprint, Severity, Status};

/// Header carrying the Keep API key.
const API_KEY_HEADER: &str = "X-API-KEY";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the Keep alerting backend.
#[derive(Debug, Clone)]
pub struct KeepClient {
    client: reqwest::Client,
    base_url: String,
}

impl KeepClient {
    /// Create a client for `base_url` (e.g. `http://keep-backend:8080`).
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not a valid header value or the
    /// HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            headers.insert(
                API_KEY_HEADER,
                HeaderValue::from_str(key)
                    .map_err(|e| BackendError::Configuration(format!("invalid API key: {e}")))?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, "Keep API request failed");
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl AlertBackend for KeepClient {
    #[instrument(skip(self), fields(fingerprint = %fingerprint))]
    async fn get_alert(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<BackendAlert>, BackendError> {
        let url = format!("{}/alerts/{fingerprint}", self.base_url);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Alert not found in Keep");
            return Ok(None);
        }

        let wire: KeepAlert = Self::check(response).await?.json().await?;
        wire.into_backend_alert().map(Some)
    }

    #[instrument(skip(self, enrichment), fields(fingerprint = %fingerprint))]
    async fn enrich(
        &self,
        fingerprint: &Fingerprint,
        enrichment: &Enrichment,
        dispose_on_new_alert: bool,
    ) -> Result<(), BackendError> {
        let url = format!("{}/alerts/enrich", self.base_url);
        let body = EnrichRequest {
            fingerprint: fingerprint.as_str(),
            enrichments: enrichment.to_wire(),
        };

        let response = self
            .client
            .post(&url)
            .query(&[("dispose_on_new_alert", dispose_on_new_alert)])
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        debug!("Enriched alert");
        Ok(())
    }

    #[instrument(skip(self, keys), fields(fingerprint = %fingerprint))]
    async fn unenrich(
        &self,
        fingerprint: &Fingerprint,
        keys: &[EnrichmentKey],
    ) -> Result<(), BackendError> {
        let url = format!("{}/alerts/unenrich", self.base_url);
        let body = UnenrichRequest {
            fingerprint: fingerprint.as_str(),
            enrichments: keys.iter().map(EnrichmentKey::as_str).collect(),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        Self::check(response).await?;
        debug!("Removed alert enrichments");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_alerts(&self, limit: usize) -> Result<Vec<BackendAlert>, BackendError> {
        let url = format!("{}/alerts", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await?;

        let wire: Vec<KeepAlert> = Self::check(response).await?.json().await?;
        let total = wire.len();
        let alerts: Vec<BackendAlert> = wire
            .into_iter()
            .filter_map(|a| match a.into_backend_alert() {
                Ok(alert) => Some(alert),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable alert in Keep listing");
                    None
                }
            })
            .collect();
        debug!(total, usable = alerts.len(), "Listed alerts");
        Ok(alerts)
    }
}

// =============================================================================
// Keep API types
// =============================================================================

#[derive(Debug, Serialize)]
struct EnrichRequest<'a> {
    fingerprint: &'a str,
    enrichments: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct UnenrichRequest<'a> {
    fingerprint: &'a str,
    enrichments: Vec<&'static str>,
}

/// Alert as returned by `GET /alerts` and `GET /alerts/{fingerprint}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeepAlert {
    fingerprint: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source: Vec<String>,
    #[serde(default)]
    labels: HashMap<String, Value>,
    #[serde(default)]
    firing_start_time: Option<String>,
    #[serde(default)]
    last_received: Option<String>,
    /// Keep merges enrichments into the alert body as well.
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    enrichments: Option<HashMap<String, Value>>,
}

impl KeepAlert {
    fn into_backend_alert(self) -> Result<BackendAlert, BackendError> {
        let fingerprint = Fingerprint::parse(&self.fingerprint)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        let mut wire_enrichments: HashMap<String, String> = self
            .enrichments
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, value_to_string(v)))
            .collect();
        if let Some(assignee) = self.assignee {
            wire_enrichments
                .entry(EnrichmentKey::Assignee.as_str().to_string())
                .or_insert(assignee);
        }

        // Backend data is trusted: unknown values fall back instead of failing.
        let status = self.status.parse().unwrap_or(Status::Firing);
        let severity = self.severity.parse().unwrap_or(Severity::Info);
        let firing_start = self
            .firing_start_time
            .as_deref()
            .or(self.last_received.as_deref())
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        let labels = self
            .labels
            .into_iter()
            .map(|(k, v)| (k, value_to_string(v)))
            .collect();

        let alert = Alert::restore(
            fingerprint,
            self.name,
            severity,
            status,
            self.description.unwrap_or_default(),
            self.source.join(", "),
            labels,
            firing_start,
        );

        Ok(BackendAlert {
            alert,
            enrichment: Enrichment::from_wire(&wire_enrichments),
        })
    }
}

pub(crate) fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse Keep timestamps, which may or may not carry a UTC offset.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2026-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-01T12:30:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_keep_alert_conversion() {
        let json = serde_json::json!({
            "fingerprint": "fp-1",
            "name": "CPU High",
            "status": "firing",
            "severity": "HIGH",
            "description": "cpu > 90%",
            "source": ["prometheus"],
            "labels": {"host": "db-1", "replicas": 3},
            "firingStartTime": "2026-03-01T12:30:00Z",
            "assignee": "jdoe",
            "enrichments": {"status": "acknowledged"}
        });
        let wire: KeepAlert = serde_json::from_value(json).unwrap();
        let alert = wire.into_backend_alert().unwrap();

        assert_eq!(alert.alert.severity(), Severity::High);
        assert_eq!(alert.alert.source(), "prometheus");
        assert_eq!(alert.alert.labels()["replicas"], "3");
        assert!(alert.is_acknowledged());
        assert_eq!(alert.assignee(), "jdoe");
    }

    #[test]
    fn test_unknown_status_falls_back_to_firing() {
        let json = serde_json::json!({
            "fingerprint": "fp-2",
            "name": "Disk",
            "status": "suppressed",
            "severity": "sev0"
        });
        let wire: KeepAlert = serde_json::from_value(json).unwrap();
        let alert = wire.into_backend_alert().unwrap();
        assert_eq!(alert.alert.status(), Status::Firing);
        assert_eq!(alert.alert.severity(), Severity::Info);
        assert!(alert.enrichment.is_empty());
    }

    #[test]
    fn test_invalid_fingerprint_is_rejected() {
        let json = serde_json::json!({"fingerprint": "bad fp", "name": "x"});
        let wire: KeepAlert = serde_json::from_value(json).unwrap();
        assert!(matches!(
            wire.into_backend_alert(),
            Err(BackendError::InvalidResponse(_))
        ));
    }
}

//! Tracking store: fingerprint → chat message correlation.
//!
//! Every alert we post to chat gets exactly one [`TrackedPost`], keyed by
//! `<namespace>:<fingerprint>`. Writes overwrite, never append. Each save
//! refreshes a TTL so entries clean themselves up if a resolve event is
//! ever lost.
//!
//! Two backends are provided:
//!
//! - [`MemoryStore`] keeps records in a `DashMap` (tests, single-replica runs)
//! - [`SqliteStore`] persists records in a local SQLite database

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::{Fingerprint, Severity};

/// Default record lifetime (7 days).
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default key namespace.
pub const DEFAULT_NAMESPACE: &str = "alert-sync";

/// Errors raised by tracking store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Blocking worker or lock failure
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persisted correlation between one alert and its chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedPost {
    /// Chat message id
    pub message_id: String,
    /// Chat channel id
    pub channel_id: String,
    /// Alert fingerprint
    pub fingerprint: Fingerprint,
    /// Alert name at first firing
    pub alert_name: String,
    /// Severity at first firing
    pub severity: Severity,
    /// When the alert first started firing; all displays use this value
    pub firing_start_time: DateTime<Utc>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// Last touch (re-fire, acknowledge, drift repair)
    pub last_updated_at: DateTime<Utc>,
    /// Chat-side assignee; empty means unassigned
    #[serde(default)]
    pub last_known_assignee: String,
}

impl TrackedPost {
    /// Create a record for a freshly posted message.
    #[must_use]
    pub fn new(
        message_id: String,
        channel_id: String,
        fingerprint: Fingerprint,
        alert_name: String,
        severity: Severity,
        firing_start_time: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            message_id,
            channel_id,
            fingerprint,
            alert_name,
            severity,
            firing_start_time,
            created_at: now,
            last_updated_at: now,
            last_known_assignee: String::new(),
        }
    }

    /// Mark the record as updated now.
    pub fn touch(&mut self) {
        self.last_updated_at = Utc::now();
    }

    /// Record a new assignee and touch the record.
    pub fn set_assignee(&mut self, assignee: impl Into<String>) {
        self.last_known_assignee = assignee.into();
        self.touch();
    }
}

/// Storage contract shared by the ingestion processor, the callback
/// processor and the poll reconciler.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Upsert the record for `fingerprint` and refresh its TTL.
    async fn save(&self, fingerprint: &Fingerprint, post: &TrackedPost) -> Result<(), StoreError>;

    /// Look up a record. `Ok(None)` means the alert is not tracked.
    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<TrackedPost>, StoreError>;

    /// Remove a record. Removing a missing record is not an error.
    async fn delete(&self, fingerprint: &Fingerprint) -> Result<(), StoreError>;

    /// Every live record. Malformed records are skipped and logged.
    async fn find_all_active(&self) -> Result<Vec<TrackedPost>, StoreError>;
}

/// Build the storage key for a fingerprint.
#[must_use]
pub fn store_key(namespace: &str, fingerprint: &Fingerprint) -> String {
    format!("{namespace}:{fingerprint}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_key_layout() {
        let fp = Fingerprint::parse("abc.123").unwrap();
        assert_eq!(store_key("alert-sync", &fp), "alert-sync:abc.123");
    }

    #[test]
    fn test_tracked_post_wire_format() {
        let fp = Fingerprint::parse("fp-1").unwrap();
        let post = TrackedPost::new(
            "msg-1".to_string(),
            "chan-1".to_string(),
            fp,
            "CPU High".to_string(),
            Severity::High,
            Utc::now(),
        );

        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["messageId"], "msg-1");
        assert_eq!(json["fingerprint"], "fp-1");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["lastKnownAssignee"], "");
    }

    #[test]
    fn test_set_assignee_touches() {
        let mut post = TrackedPost::new(
            "m".to_string(),
            "c".to_string(),
            Fingerprint::parse("fp").unwrap(),
            "n".to_string(),
            Severity::Info,
            Utc::now(),
        );
        let before = post.last_updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        post.set_assignee("alice");
        assert_eq!(post.last_known_assignee, "alice");
        assert!(post.last_updated_at > before);
    }
}

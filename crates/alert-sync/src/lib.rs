//! Keeps Mattermost alert messages in sync with Keep alert state.
//!
//! This crate provides:
//! - Alert domain model (fingerprint, severity, status, alert)
//! - Tracking store mapping fingerprints to chat messages (memory, SQLite)
//! - Keep and Mattermost HTTP clients behind async traits
//! - Alert ingestion, two-phase button callbacks and poll reconciliation
//! - HTTP server for webhooks, callbacks, health and metrics

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod backend;
pub mod callback;
pub mod chat;
pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod reconcile;
pub mod render;
pub mod retry;
pub mod server;
pub mod store;
pub mod users;

pub use backend::{AlertBackend, BackendAlert, BackendError, Enrichment, EnrichmentKey, KeepClient};
pub use callback::{CallbackAction, CallbackProcessor, CallbackRequest, CallbackSettings};
pub use chat::{Attachment, AttachmentSnapshot, ChatClient, ChatError, MattermostClient};
pub use config::Config;
pub use domain::{Alert, Fingerprint, Severity, Status};
pub use error::{Error, Result};
pub use ingest::{AlertEvent, AlertProcessor, Outcome};
pub use metrics::{Counter, InMemoryMetrics, MetricsRecorder, NoopMetrics};
pub use reconcile::{CycleReport, PollSettings, Poller};
pub use render::{MessageRenderer, MessageStyle};
pub use retry::{fetch_assignee, RetryPolicy};
pub use store::{MemoryStore, SqliteStore, StoreError, TrackedPost, TrackingStore};
pub use users::UserMapper;

//! Alert domain model.
//!
//! Pure value objects and the [`Alert`] aggregate. Nothing in here performs
//! I/O; alerts are built per event from inbound payloads or backend
//! responses and are never persisted directly.

pub mod alert;
pub mod fingerprint;
pub mod severity;

pub use alert::Alert;
pub use fingerprint::Fingerprint;
pub use severity::{Severity, Status};

use thiserror::Error;

/// Validation failures raised while constructing domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Fingerprint is empty, too long, or contains forbidden characters
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Severity is not one of the known levels
    #[error("invalid severity: {0:?}")]
    InvalidSeverity(String),

    /// Status is not one of the known states
    #[error("invalid status: {0:?}")]
    InvalidStatus(String),

    /// Alert name is missing
    #[error("alert name must not be empty")]
    EmptyName,
}

//! Crate-level error type.

use thiserror::Error;

use crate::backend::BackendError;
use crate::chat::{ChatError, SnapshotError};
use crate::domain::DomainError;
use crate::store::StoreError;

/// Errors surfaced by the processors.
///
/// `InvalidInput` is never retried and maps to a client error. The other
/// variants are upstream failures; the caller owns redelivery.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad fingerprint, severity, status, action or missing field
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Tracking store failed
    #[error("tracking store unavailable: {0}")]
    Store(#[from] StoreError),

    /// Alerting backend failed
    #[error("alerting backend unavailable: {0}")]
    Backend(#[from] BackendError),

    /// Chat API failed
    #[error("chat API unavailable: {0}")]
    Chat(#[from] ChatError),
}

impl Error {
    /// Build an `InvalidInput` for a missing required field.
    #[must_use]
    pub fn missing_field(name: &str) -> Self {
        Self::InvalidInput(format!("missing required field: {name}"))
    }

    /// True for caller mistakes, false for upstream failures.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

impl From<DomainError> for Error {
    fn from(e: DomainError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

impl From<SnapshotError> for Error {
    fn from(e: SnapshotError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

/// Result alias for processor operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

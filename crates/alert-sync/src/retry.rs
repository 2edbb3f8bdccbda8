//! Assignee lookup with bounded retry.
//!
//! A button press enriches the backend alert and a webhook for the same
//! alert can arrive before that write is readable. When a lookup succeeds
//! but shows no assignee we wait and look again. A failed lookup is
//! returned immediately.

use std::time::Duration;
use tracing::debug;

use crate::backend::{AlertBackend, BackendError};
use crate::domain::Fingerprint;
use crate::metrics::{Counter, MetricsRecorder};

/// Delays between assignee lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    /// Custom delay schedule. The number of retries equals `delays.len()`.
    #[must_use]
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }

    /// Maximum number of lookups, first attempt included.
    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }
}

impl Default for RetryPolicy {
    /// Three retries after 100ms, 200ms and 400ms.
    fn default() -> Self {
        Self::new(vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400),
        ])
    }
}

/// Fetch the backend assignee for `fingerprint`.
///
/// Returns the raw backend username, or an empty string if no assignee
/// became visible within the policy. Dropping the future cancels any
/// pending wait.
///
/// # Errors
///
/// Returns the first lookup error without retrying.
pub async fn fetch_assignee(
    backend: &dyn AlertBackend,
    fingerprint: &Fingerprint,
    policy: &RetryPolicy,
    metrics: &dyn MetricsRecorder,
) -> Result<String, BackendError> {
    let mut delays = policy.delays.iter();
    let mut attempt = 1;

    loop {
        let assignee = backend
            .get_alert(fingerprint)
            .await?
            .map(|alert| alert.assignee().to_string())
            .unwrap_or_default();

        if !assignee.is_empty() {
            debug!(fingerprint = %fingerprint, attempt, "Assignee visible");
            return Ok(assignee);
        }

        let Some(delay) = delays.next() else {
            debug!(fingerprint = %fingerprint, attempt, "No assignee after all attempts");
            return Ok(String::new());
        };

        metrics.increment(Counter::AssigneeRetries);
        debug!(
            fingerprint = %fingerprint,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Assignee not visible yet, retrying"
        );
        tokio::time::sleep(*delay).await;
        attempt += 1;
    }
}

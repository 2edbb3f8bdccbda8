//! Poll reconciliation.
//!
//! Assignee changes made directly in the backend UI never reach us through
//! a webhook. The poller periodically compares every tracked post against a
//! bulk snapshot of backend alerts and repairs the chat message when the
//! assignee drifted.
//!
//! The chat message is updated before the store. If the store write fails
//! the next cycle sees the same drift and applies it again.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backend::{AlertBackend, BackendAlert};
use crate::chat::ChatClient;
use crate::domain::Fingerprint;
use crate::error::Result;
use crate::metrics::{Counter, MetricsRecorder};
use crate::render::{MessageRenderer, MessageStyle};
use crate::store::{TrackedPost, TrackingStore};
use crate::users::UserMapper;

/// Shortest allowed poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of alerts requested per bulk fetch.
pub const DEFAULT_LIST_LIMIT: usize = 1000;

/// Note attached to a message whose assignee was removed.
const ASSIGNEE_REMOVED: &str = "Assignee removed";

/// Poller settings.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Time between cycles, clamped to [`MIN_POLL_INTERVAL`]
    pub interval: Duration,
    /// Alerts requested per bulk fetch
    pub list_limit: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            list_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

/// Summary of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// When the cycle started
    pub run_time: Option<DateTime<Utc>>,
    /// Tracked posts scanned
    pub tracked: usize,
    /// Posts absent from the backend snapshot or already resolved there
    pub skipped: usize,
    /// Posts whose assignee matched
    pub unchanged: usize,
    /// Posts whose drift was repaired
    pub repaired: usize,
    /// Posts that failed to repair
    pub failed: usize,
}

/// Periodic drift detector.
pub struct Poller {
    backend: Arc<dyn AlertBackend>,
    chat: Arc<dyn ChatClient>,
    store: Arc<dyn TrackingStore>,
    renderer: MessageRenderer,
    users: Arc<UserMapper>,
    metrics: Arc<dyn MetricsRecorder>,
    settings: PollSettings,
}

impl Poller {
    #[must_use]
    pub fn new(
        backend: Arc<dyn AlertBackend>,
        chat: Arc<dyn ChatClient>,
        store: Arc<dyn TrackingStore>,
        renderer: MessageRenderer,
        users: Arc<UserMapper>,
        metrics: Arc<dyn MetricsRecorder>,
        settings: PollSettings,
    ) -> Self {
        Self {
            backend,
            chat,
            store,
            renderer,
            users,
            metrics,
            settings,
        }
    }

    /// Effective interval between cycles.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.settings.interval.max(MIN_POLL_INTERVAL)
    }

    /// Run cycles until `shutdown` is cancelled.
    ///
    /// The first cycle starts immediately. A cycle in progress finishes
    /// its current post before the loop exits.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval().as_secs(), "Poll reconciler started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        self.metrics.increment(Counter::PollFailures);
                        error!(error = %e, "Poll cycle failed");
                    }
                }
            }
        }

        info!("Poll reconciler stopped");
    }

    /// Run one reconciliation cycle.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store scan or the bulk backend fetch
    /// fails. Per-post failures are counted in [`CycleReport::failed`].
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.metrics.increment(Counter::PollCycles);
        let mut report = CycleReport {
            run_time: Some(Utc::now()),
            ..CycleReport::default()
        };

        let posts = self.store.find_all_active().await?;
        report.tracked = posts.len();
        if posts.is_empty() {
            debug!("No tracked alerts");
            return Ok(report);
        }

        let snapshot: HashMap<Fingerprint, BackendAlert> = self
            .backend
            .list_alerts(self.settings.list_limit)
            .await?
            .into_iter()
            .map(|found| (found.alert.fingerprint().clone(), found))
            .collect();

        for post in posts {
            let Some(found) = snapshot.get(&post.fingerprint) else {
                debug!(fingerprint = %post.fingerprint, "Not in backend snapshot, skipping");
                report.skipped += 1;
                continue;
            };
            if found.is_resolved() {
                debug!(fingerprint = %post.fingerprint, "Resolved in backend, skipping");
                report.skipped += 1;
                continue;
            }

            let current = self.chat_assignee(found);
            if current == post.last_known_assignee {
                report.unchanged += 1;
                continue;
            }

            let fingerprint = post.fingerprint.clone();
            match self.repair(post, found, current).await {
                Ok(()) => {
                    self.metrics.increment(Counter::DriftsRepaired);
                    report.repaired += 1;
                }
                Err(e) => {
                    self.metrics.increment(Counter::PollFailures);
                    warn!(fingerprint = %fingerprint, error = %e, "Failed to repair assignee drift");
                    report.failed += 1;
                }
            }
        }

        info!(
            tracked = report.tracked,
            skipped = report.skipped,
            repaired = report.repaired,
            failed = report.failed,
            "Poll cycle complete"
        );
        Ok(report)
    }

    fn chat_assignee(&self, found: &BackendAlert) -> String {
        match found.assignee() {
            "" => String::new(),
            raw => self.users.display_for_backend(raw),
        }
    }

    async fn repair(
        &self,
        mut post: TrackedPost,
        found: &BackendAlert,
        current: String,
    ) -> Result<()> {
        info!(
            fingerprint = %post.fingerprint,
            previous = %post.last_known_assignee,
            current = %current,
            "Assignee drift detected"
        );

        let alert = found.alert.clone().with_firing_start(post.firing_start_time);
        let (style, note) = if current.is_empty() {
            (
                MessageStyle::Firing {
                    note: Some(ASSIGNEE_REMOVED.to_string()),
                },
                "Assignee removed via Keep UI".to_string(),
            )
        } else {
            (
                MessageStyle::acknowledged(&current),
                format!("Assigned to @{current} via Keep UI"),
            )
        };

        let attachment = self.renderer.render(&alert, &style);
        self.chat.update_message(&post.message_id, &attachment).await?;
        self.metrics.increment(Counter::MessagesUpdated);
        self.chat
            .reply_in_thread(&post.channel_id, &post.message_id, &note)
            .await?;

        post.set_assignee(current);
        self.store.save(&post.fingerprint, &post).await?;
        Ok(())
    }
}

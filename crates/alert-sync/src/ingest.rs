//! Alert ingestion.
//!
//! Each inbound alert event is matched against the tracking store and
//! moves the alert's chat message through its lifecycle:
//!
//! | tracked | inbound      | result                                          |
//! |---------|--------------|-------------------------------------------------|
//! | no      | firing       | post message, track it                          |
//! | no      | acknowledged | post message in acknowledged style, track it    |
//! | no      | resolved     | nothing to do                                   |
//! | yes     | firing       | update in place, keep acknowledged style if set |
//! | yes     | acknowledged | update to acknowledged style with assignee      |
//! | yes     | resolved     | update to resolved style, untrack               |
//!
//! Repeated firing events never post a second message. Displays always use
//! the firing-start time recorded when the alert was first tracked.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::backend::{AlertBackend, BackendAlert};
use crate::chat::ChatClient;
use crate::domain::{Alert, Fingerprint, Severity, Status};
use crate::error::Result;
use crate::metrics::{Counter, MetricsRecorder};
use crate::render::{MessageRenderer, MessageStyle};
use crate::retry::{fetch_assignee, RetryPolicy};
use crate::store::{TrackedPost, TrackingStore};
use crate::users::UserMapper;

/// A normalized inbound alert event. Values are validated by
/// [`AlertProcessor::process`].
#[derive(Debug, Clone, Default)]
pub struct AlertEvent {
    pub fingerprint: String,
    pub name: String,
    pub severity: String,
    pub status: String,
    pub description: String,
    /// Originating systems
    pub source: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Defaults to the time the event is processed
    pub firing_start_time: Option<DateTime<Utc>>,
}

impl AlertEvent {
    /// Validate into a domain alert.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] for a bad fingerprint,
    /// severity, status or an empty name.
    pub fn into_alert(self) -> Result<Alert> {
        let fingerprint = Fingerprint::parse(&self.fingerprint)?;
        let severity: Severity = self.severity.parse()?;
        let status: Status = self.status.parse()?;
        let alert = Alert::new(
            fingerprint,
            &self.name,
            severity,
            status,
            &self.description,
            &self.source,
            self.labels,
            self.firing_start_time.unwrap_or_else(Utc::now),
        )?;
        Ok(alert)
    }

    /// Build the alert for an already tracked message.
    ///
    /// A blank name or severity falls back to what was recorded when the
    /// message was first posted, so minimal follow-up events still apply.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] when a severity is given but
    /// not recognised.
    pub fn into_tracked_alert(
        self,
        fingerprint: Fingerprint,
        status: Status,
        post: &TrackedPost,
    ) -> Result<Alert> {
        let severity = if self.severity.trim().is_empty() {
            post.severity
        } else {
            self.severity.parse()?
        };
        let name = if self.name.trim().is_empty() {
            post.alert_name.clone()
        } else {
            self.name
        };
        Ok(Alert::restore(
            fingerprint,
            name,
            severity,
            status,
            self.description,
            self.source.join(", "),
            self.labels,
            post.firing_start_time,
        ))
    }
}

/// What processing an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// New message posted and tracked
    Created,
    /// Tracked message refreshed after a re-fire
    Refreshed,
    /// Message switched to acknowledged style
    Acknowledged,
    /// Message switched to resolved style and untracked
    Resolved,
    /// Nothing to do
    Ignored,
}

/// Drives chat messages from alert events.
pub struct AlertProcessor {
    backend: Arc<dyn AlertBackend>,
    chat: Arc<dyn ChatClient>,
    store: Arc<dyn TrackingStore>,
    renderer: MessageRenderer,
    users: Arc<UserMapper>,
    metrics: Arc<dyn MetricsRecorder>,
    channel_id: String,
    retry: RetryPolicy,
}

impl AlertProcessor {
    /// New alerts are posted to `channel_id`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn AlertBackend>,
        chat: Arc<dyn ChatClient>,
        store: Arc<dyn TrackingStore>,
        renderer: MessageRenderer,
        users: Arc<UserMapper>,
        metrics: Arc<dyn MetricsRecorder>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            chat,
            store,
            renderer,
            users,
            metrics,
            channel_id: channel_id.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Override the assignee lookup schedule.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Apply one alert event.
    ///
    /// Only the fingerprint and status are required up front. Name and
    /// severity must be present when a new message is posted; for a tracked
    /// alert they default to the recorded values.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a malformed event and a store or chat
    /// error when either fails. Failures are not retried here; the sender
    /// is expected to redeliver.
    #[instrument(skip_all, fields(fingerprint = %event.fingerprint, status = %event.status))]
    pub async fn process(&self, event: AlertEvent) -> Result<Outcome> {
        let fingerprint = Fingerprint::parse(&event.fingerprint)?;
        let status: Status = event.status.parse()?;

        match self.store.find_by_fingerprint(&fingerprint).await? {
            Some(post) => {
                let alert = event.into_tracked_alert(fingerprint, status, &post)?;
                self.metrics.increment(Counter::AlertsReceived);
                match status {
                    Status::Firing => self.refire(alert, post).await,
                    Status::Acknowledged => self.acknowledge(alert, post).await,
                    Status::Resolved => self.resolve(alert, post).await,
                }
            }
            None if status == Status::Resolved => {
                self.metrics.increment(Counter::AlertsReceived);
                self.metrics.increment(Counter::ResolvesIgnored);
                info!("Resolve for untracked alert, nothing to do");
                Ok(Outcome::Ignored)
            }
            None => {
                let alert = event.into_alert()?;
                self.metrics.increment(Counter::AlertsReceived);
                if alert.status() == Status::Acknowledged {
                    let assignee = self.current_assignee(alert.fingerprint()).await;
                    self.create(&alert, &MessageStyle::acknowledged(&assignee), assignee)
                        .await?;
                } else {
                    self.create(&alert, &MessageStyle::firing(), String::new())
                        .await?;
                }
                Ok(Outcome::Created)
            }
        }
    }

    async fn create(&self, alert: &Alert, style: &MessageStyle, assignee: String) -> Result<()> {
        let attachment = self.renderer.render(alert, style);
        let message_id = self
            .chat
            .create_message(&self.channel_id, &attachment)
            .await?;
        self.metrics.increment(Counter::MessagesCreated);

        let mut post = TrackedPost::new(
            message_id,
            self.channel_id.clone(),
            alert.fingerprint().clone(),
            alert.name().to_string(),
            alert.severity(),
            alert.firing_start_time(),
        );
        post.last_known_assignee = assignee;
        self.store.save(alert.fingerprint(), &post).await?;

        info!(message_id = %post.message_id, "Tracking new alert message");
        Ok(())
    }

    async fn refire(&self, alert: Alert, mut post: TrackedPost) -> Result<Outcome> {
        self.metrics.increment(Counter::AlertsRefired);
        let alert = alert.with_firing_start(post.firing_start_time);

        let current = self.lookup(alert.fingerprint()).await;
        let acknowledged_by = current
            .as_ref()
            .filter(|found| found.is_acknowledged())
            .map(|found| self.users.display_for_backend(found.assignee()));

        if let Some(assignee) = acknowledged_by {
            let attachment = self
                .renderer
                .render(&alert, &MessageStyle::acknowledged(&assignee));
            self.chat.update_message(&post.message_id, &attachment).await?;
            self.metrics.increment(Counter::MessagesUpdated);

            let text = if assignee.is_empty() {
                "Alert fired again while acknowledged".to_string()
            } else {
                format!("Alert fired again while acknowledged by @{assignee}")
            };
            self.chat
                .reply_in_thread(&post.channel_id, &post.message_id, &text)
                .await?;
            post.set_assignee(assignee);
        } else {
            let attachment = self.renderer.render(&alert, &MessageStyle::firing());
            self.chat.update_message(&post.message_id, &attachment).await?;
            self.metrics.increment(Counter::MessagesUpdated);

            match current {
                Some(found) => post.set_assignee(self.users.display_for_backend(found.assignee())),
                None => post.touch(),
            }
        }

        self.store.save(alert.fingerprint(), &post).await?;
        debug!(message_id = %post.message_id, "Refreshed alert message");
        Ok(Outcome::Refreshed)
    }

    async fn acknowledge(&self, alert: Alert, mut post: TrackedPost) -> Result<Outcome> {
        let alert = alert.with_firing_start(post.firing_start_time);
        let assignee = self.current_assignee(alert.fingerprint()).await;

        let attachment = self
            .renderer
            .render(&alert, &MessageStyle::acknowledged(&assignee));
        self.chat.update_message(&post.message_id, &attachment).await?;
        self.metrics.increment(Counter::MessagesUpdated);

        post.set_assignee(assignee);
        self.store.save(alert.fingerprint(), &post).await?;
        info!(message_id = %post.message_id, "Alert acknowledged");
        Ok(Outcome::Acknowledged)
    }

    async fn resolve(&self, alert: Alert, post: TrackedPost) -> Result<Outcome> {
        let alert = alert.with_firing_start(post.firing_start_time);
        let assignee = post.last_known_assignee.as_str();

        let attachment = self
            .renderer
            .render(&alert, &MessageStyle::resolved(assignee));
        self.chat.update_message(&post.message_id, &attachment).await?;
        self.metrics.increment(Counter::MessagesUpdated);

        if !assignee.is_empty() {
            let text = format!("Alert resolved (was assigned to @{assignee})");
            self.chat
                .reply_in_thread(&post.channel_id, &post.message_id, &text)
                .await?;
        }

        self.store.delete(alert.fingerprint()).await?;
        self.metrics.increment(Counter::AlertsResolved);
        info!(message_id = %post.message_id, "Alert resolved, message untracked");
        Ok(Outcome::Resolved)
    }

    /// Backend state for enrichment. Failures are logged and yield `None`.
    async fn lookup(&self, fingerprint: &Fingerprint) -> Option<BackendAlert> {
        match self.backend.get_alert(fingerprint).await {
            Ok(found) => found,
            Err(e) => {
                self.metrics.increment(Counter::EnrichmentLookupFailures);
                warn!(error = %e, "Backend lookup failed, continuing without enrichment");
                None
            }
        }
    }

    /// Chat-side assignee, retried while the enrichment is not yet visible.
    /// Empty when unknown.
    async fn current_assignee(&self, fingerprint: &Fingerprint) -> String {
        match fetch_assignee(
            self.backend.as_ref(),
            fingerprint,
            &self.retry,
            self.metrics.as_ref(),
        )
        .await
        {
            Ok(raw) if raw.is_empty() => raw,
            Ok(raw) => self.users.display_for_backend(&raw),
            Err(e) => {
                self.metrics.increment(Counter::EnrichmentLookupFailures);
                warn!(error = %e, "Assignee lookup failed, continuing without assignee");
                String::new()
            }
        }
    }
}

//! Interactive button handling.
//!
//! A button press is handled in two phases. [`CallbackProcessor::accept`]
//! validates the request and turns the embedded attachment snapshot into a
//! "processing" placeholder without touching the network, so the chat
//! server gets its answer well inside its response deadline. The real work
//! then runs as a tracked background task: backend enrichment, message
//! update, thread reply and store bookkeeping. Every background step is
//! best effort. A failed step is logged and the remaining steps still run.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::backend::{AlertBackend, BackendAlert, Enrichment, EnrichmentKey};
use crate::chat::{Attachment, AttachmentSnapshot, ChatClient};
use crate::domain::{Alert, Fingerprint, Severity, Status};
use crate::error::{Error, Result};
use crate::metrics::{Counter, MetricsRecorder};
use crate::render::{MessageRenderer, MessageStyle};
use crate::store::{TrackedPost, TrackingStore};
use crate::users::UserMapper;

/// Default ceiling for one background phase.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of background phases allowed to run at once.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

// =============================================================================
// Actions
// =============================================================================

/// What the pressed button asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackAction {
    Acknowledge,
    Resolve,
    Unacknowledge,
}

impl CallbackAction {
    /// Name carried in the button context.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Acknowledge => "acknowledge",
            Self::Resolve => "resolve",
            Self::Unacknowledge => "unacknowledge",
        }
    }

    /// Button id. Mattermost only accepts alphanumeric ids.
    #[must_use]
    pub const fn button_id(&self) -> &'static str {
        match self {
            Self::Acknowledge => "ack",
            Self::Resolve => "resolve",
            Self::Unacknowledge => "unack",
        }
    }

    const fn past_tense(self) -> &'static str {
        match self {
            Self::Acknowledge => "Acknowledged",
            Self::Resolve => "Resolved",
            Self::Unacknowledge => "Unacknowledged",
        }
    }
}

impl FromStr for CallbackAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "acknowledge" => Ok(Self::Acknowledge),
            "resolve" => Ok(Self::Resolve),
            "unacknowledge" => Ok(Self::Unacknowledge),
            other => Err(Error::InvalidInput(format!("unknown action: {other:?}"))),
        }
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Requests
// =============================================================================

/// A button press as delivered by the chat server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackRequest {
    /// Chat user id of whoever pressed the button
    pub user_id: String,
    /// Message the button belongs to
    pub message_id: String,
    pub channel_id: String,
    pub action: String,
    pub fingerprint: String,
    pub alert_name: String,
    /// Encoded [`AttachmentSnapshot`]
    pub attachment: String,
}

/// A validated button press.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedCallback {
    pub user_id: String,
    pub message_id: String,
    pub channel_id: String,
    pub action: CallbackAction,
    pub fingerprint: Fingerprint,
    pub alert_name: String,
    /// Attachment to show until the background phase finishes
    pub placeholder: Attachment,
}

impl TryFrom<CallbackRequest> for AcceptedCallback {
    type Error = Error;

    fn try_from(request: CallbackRequest) -> Result<Self> {
        let action: CallbackAction = request.action.parse()?;
        let user_id = required("user_id", request.user_id)?;
        let message_id = required("post_id", request.message_id)?;
        let channel_id = required("channel_id", request.channel_id)?;
        let fingerprint = Fingerprint::parse(&required("fingerprint", request.fingerprint)?)?;
        let snapshot = AttachmentSnapshot::from_encoded(required("attachment", request.attachment)?);
        let placeholder = snapshot.restore()?.processing_placeholder();

        Ok(Self {
            user_id,
            message_id,
            channel_id,
            action,
            fingerprint,
            alert_name: request.alert_name.trim().to_string(),
            placeholder,
        })
    }
}

fn required(name: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        Err(Error::missing_field(name))
    } else {
        Ok(value)
    }
}

// =============================================================================
// Processor
// =============================================================================

/// Limits for the background phase.
#[derive(Debug, Clone)]
pub struct CallbackSettings {
    /// Ceiling for one background phase, permit wait included
    pub timeout: Duration,
    /// Maximum concurrently running background phases
    pub max_in_flight: usize,
}

impl Default for CallbackSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CALLBACK_TIMEOUT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// Two-phase button handler.
pub struct CallbackProcessor {
    worker: Arc<Worker>,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    settings: CallbackSettings,
}

struct Worker {
    backend: Arc<dyn AlertBackend>,
    chat: Arc<dyn ChatClient>,
    store: Arc<dyn TrackingStore>,
    renderer: MessageRenderer,
    users: Arc<UserMapper>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl CallbackProcessor {
    #[must_use]
    pub fn new(
        backend: Arc<dyn AlertBackend>,
        chat: Arc<dyn ChatClient>,
        store: Arc<dyn TrackingStore>,
        renderer: MessageRenderer,
        users: Arc<UserMapper>,
        metrics: Arc<dyn MetricsRecorder>,
        settings: CallbackSettings,
    ) -> Self {
        Self {
            worker: Arc::new(Worker {
                backend,
                chat,
                store,
                renderer,
                users,
                metrics,
            }),
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(settings.max_in_flight.max(1))),
            settings,
        }
    }

    /// Immediate phase. Validates the request and builds the placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unknown action, a missing
    /// field, a bad fingerprint or an undecodable snapshot.
    pub fn accept(&self, request: CallbackRequest) -> Result<AcceptedCallback> {
        match AcceptedCallback::try_from(request) {
            Ok(accepted) => {
                self.worker.metrics.increment(Counter::CallbacksAccepted);
                Ok(accepted)
            }
            Err(e) => {
                self.worker.metrics.increment(Counter::CallbacksRejected);
                warn!(error = %e, "Rejected callback");
                Err(e)
            }
        }
    }

    /// Run the immediate phase and schedule the background phase.
    ///
    /// Returns the placeholder attachment to send back to the chat server.
    ///
    /// # Errors
    ///
    /// Same as [`Self::accept`]. Background failures are never returned.
    pub fn handle(&self, request: CallbackRequest) -> Result<Attachment> {
        let accepted = self.accept(request)?;
        let placeholder = accepted.placeholder.clone();

        info!(
            fingerprint = %accepted.fingerprint,
            action = %accepted.action,
            user_id = %accepted.user_id,
            "Callback accepted"
        );

        let worker = Arc::clone(&self.worker);
        let permits = Arc::clone(&self.permits);
        let limit = self.settings.timeout;

        self.tracker.spawn(async move {
            let fingerprint = accepted.fingerprint.clone();
            let action = accepted.action;
            let run = async {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                worker.run(accepted).await;
            };

            if tokio::time::timeout(limit, run).await.is_ok() {
                worker.metrics.increment(Counter::CallbacksCompleted);
            } else {
                worker.metrics.increment(Counter::CallbacksTimedOut);
                warn!(
                    fingerprint = %fingerprint,
                    action = %action,
                    timeout_secs = limit.as_secs(),
                    "Callback background phase timed out"
                );
            }
        });

        Ok(placeholder)
    }

    /// Number of background phases still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting background work and wait for every in-flight phase.
    ///
    /// Call during shutdown before releasing the store.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        debug!("All callback background phases finished");
    }
}

// =============================================================================
// Background phase
// =============================================================================

/// Who pressed the button, in both naming schemes.
struct Actor {
    /// Chat username, used for mentions
    chat_name: String,
    /// Mapped backend username, if a mapping exists
    backend_name: Option<String>,
}

impl Worker {
    #[instrument(skip_all, fields(fingerprint = %callback.fingerprint, action = %callback.action))]
    async fn run(&self, callback: AcceptedCallback) {
        let tracked = match self.store.find_by_fingerprint(&callback.fingerprint).await {
            Ok(post) => post,
            Err(e) => {
                self.step_failed("load tracked post", &e);
                None
            }
        };

        let current = match self.backend.get_alert(&callback.fingerprint).await {
            Ok(found) => found,
            Err(e) => {
                self.step_failed("fetch alert", &e);
                None
            }
        };

        let actor = self.resolve_actor(&callback.user_id).await;
        let alert = alert_for_display(&callback, current, tracked.as_ref());

        match callback.action {
            CallbackAction::Acknowledge => {
                self.enrich(&callback, Status::Acknowledged, &actor).await;
                let attachment = self
                    .renderer
                    .render(&alert, &MessageStyle::acknowledged(&actor.chat_name));
                self.update_and_reply(&callback, &attachment, &actor).await;
                let assignee = if actor.backend_name.is_some() {
                    actor.chat_name.as_str()
                } else {
                    ""
                };
                self.record_assignee(tracked, assignee).await;
            }
            CallbackAction::Resolve => {
                self.enrich(&callback, Status::Resolved, &actor).await;
                let attachment = self
                    .renderer
                    .render(&alert, &MessageStyle::resolved(&actor.chat_name));
                self.update_and_reply(&callback, &attachment, &actor).await;
                if let Err(e) = self.store.delete(&callback.fingerprint).await {
                    self.step_failed("delete tracked post", &e);
                }
            }
            CallbackAction::Unacknowledge => {
                if let Err(e) = self
                    .backend
                    .unenrich(
                        &callback.fingerprint,
                        &[EnrichmentKey::Status, EnrichmentKey::Assignee],
                    )
                    .await
                {
                    self.step_failed("unenrich alert", &e);
                }
                let attachment = self
                    .renderer
                    .render(&alert.with_status(Status::Firing), &MessageStyle::firing());
                self.update_and_reply(&callback, &attachment, &actor).await;
                self.record_assignee(tracked, "").await;
            }
        }

        info!("Callback processed");
    }

    async fn resolve_actor(&self, user_id: &str) -> Actor {
        let chat_name = match self.chat.resolve_user_display_name(user_id).await {
            Ok(name) if !name.trim().is_empty() => name,
            Ok(_) => user_id.to_string(),
            Err(e) => {
                self.step_failed("resolve user", &e);
                user_id.to_string()
            }
        };
        let backend_name = self.users.to_backend(&chat_name).map(str::to_string);
        if backend_name.is_none() {
            debug!(user = %chat_name, "No backend mapping for chat user");
        }
        Actor {
            chat_name,
            backend_name,
        }
    }

    async fn enrich(&self, callback: &AcceptedCallback, status: Status, actor: &Actor) {
        let enrichment = Enrichment {
            status: Some(status),
            assignee: actor.backend_name.clone(),
        };
        // Acknowledgements clear themselves when the alert fires again upstream.
        let dispose = status == Status::Acknowledged;
        if let Err(e) = self
            .backend
            .enrich(&callback.fingerprint, &enrichment, dispose)
            .await
        {
            self.step_failed("enrich alert", &e);
        }
    }

    async fn update_and_reply(
        &self,
        callback: &AcceptedCallback,
        attachment: &Attachment,
        actor: &Actor,
    ) {
        match self.chat.update_message(&callback.message_id, attachment).await {
            Ok(()) => self.metrics.increment(Counter::MessagesUpdated),
            Err(e) => self.step_failed("update message", &e),
        }

        let text = format!("{} by @{}", callback.action.past_tense(), actor.chat_name);
        if let Err(e) = self
            .chat
            .reply_in_thread(&callback.channel_id, &callback.message_id, &text)
            .await
        {
            self.step_failed("reply in thread", &e);
        }
    }

    async fn record_assignee(&self, tracked: Option<TrackedPost>, assignee: &str) {
        let Some(mut post) = tracked else {
            debug!("No tracked post to update");
            return;
        };
        post.set_assignee(assignee);
        let fingerprint = post.fingerprint.clone();
        if let Err(e) = self.store.save(&fingerprint, &post).await {
            self.step_failed("save tracked post", &e);
        }
    }

    fn step_failed(&self, step: &str, error: &dyn fmt::Display) {
        self.metrics.increment(Counter::CallbackStepFailures);
        warn!(step, error = %error, "Callback step failed, continuing");
    }
}

/// Pick the alert to render, preferring backend data and always keeping the
/// tracked firing-start time.
fn alert_for_display(
    callback: &AcceptedCallback,
    current: Option<BackendAlert>,
    tracked: Option<&TrackedPost>,
) -> Alert {
    let alert = current.map_or_else(
        || {
            Alert::restore(
                callback.fingerprint.clone(),
                tracked.map_or_else(|| callback.alert_name.clone(), |p| p.alert_name.clone()),
                tracked.map_or(Severity::Info, |p| p.severity),
                Status::Firing,
                String::new(),
                String::new(),
                std::collections::HashMap::new(),
                Utc::now(),
            )
        },
        |found| found.alert,
    );

    match tracked {
        Some(post) => alert.with_firing_start(post.firing_start_time),
        None => alert,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot() -> String {
        let attachment = Attachment {
            title: "CPU High".to_string(),
            ..Attachment::default()
        };
        AttachmentSnapshot::capture(&attachment).as_str().to_string()
    }

    fn request() -> CallbackRequest {
        CallbackRequest {
            user_id: "u1".to_string(),
            message_id: "m1".to_string(),
            channel_id: "c1".to_string(),
            action: "acknowledge".to_string(),
            fingerprint: "fp-1".to_string(),
            alert_name: "CPU High".to_string(),
            attachment: snapshot(),
        }
    }

    #[test]
    fn test_action_round_trip() {
        for action in [
            CallbackAction::Acknowledge,
            CallbackAction::Resolve,
            CallbackAction::Unacknowledge,
        ] {
            assert_eq!(action.as_str().parse::<CallbackAction>().unwrap(), action);
            assert!(action.button_id().chars().all(char::is_alphanumeric));
        }
        assert!("snooze".parse::<CallbackAction>().is_err());
    }

    #[test]
    fn test_accept_builds_placeholder() {
        let accepted = AcceptedCallback::try_from(request()).unwrap();

        assert_eq!(accepted.action, CallbackAction::Acknowledge);
        assert_eq!(accepted.placeholder.title, "CPU High");
        assert!(accepted.placeholder.actions.is_empty());
        assert_eq!(
            accepted.placeholder.footer.as_deref(),
            Some(crate::chat::attachment::PROCESSING_FOOTER)
        );
    }

    #[test]
    fn test_accept_rejects_missing_fields() {
        let cases: Vec<fn(&mut CallbackRequest)> = vec![
            |r| r.user_id.clear(),
            |r| r.message_id.clear(),
            |r| r.channel_id.clear(),
            |r| r.fingerprint.clear(),
            |r| r.attachment.clear(),
            |r| r.action = "delete".to_string(),
            |r| r.fingerprint = "bad fp!".to_string(),
            |r| r.attachment = "not json".to_string(),
        ];

        for mutate in cases {
            let mut req = request();
            mutate(&mut req);
            let err = AcceptedCallback::try_from(req).unwrap_err();
            assert!(err.is_invalid_input(), "{err}");
        }
    }

    #[test]
    fn test_display_alert_keeps_tracked_start() {
        let accepted = AcceptedCallback::try_from(request()).unwrap();
        let start = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let post = TrackedPost::new(
            "m1".to_string(),
            "c1".to_string(),
            accepted.fingerprint.clone(),
            "CPU High".to_string(),
            Severity::High,
            start,
        );

        let alert = alert_for_display(&accepted, None, Some(&post));
        assert_eq!(alert.firing_start_time(), start);
        assert_eq!(alert.severity(), Severity::High);
        assert_eq!(alert.name(), "CPU High");
    }

    #[test]
    fn test_rendered_buttons_parse_back() {
        let accepted = AcceptedCallback::try_from(request()).unwrap();
        let alert = alert_for_display(&accepted, None, None);
        let attachment = MessageRenderer::new("http://cb").render(&alert, &MessageStyle::firing());

        for button in &attachment.actions {
            let action: CallbackAction = button.integration.context.action.parse().unwrap();
            assert_eq!(button.id, action.button_id());
        }
    }
}

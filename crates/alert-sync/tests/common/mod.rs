//! Recording fakes shared by the processor tests.

#![allow(dead_code)]

use alert_sync::backend::{AlertBackend, BackendAlert, BackendError, Enrichment, EnrichmentKey};
use alert_sync::chat::{Attachment, ChatClient, ChatError};
use alert_sync::store::{MemoryStore, StoreError, TrackedPost, TrackingStore};
use alert_sync::{
    Alert, AlertEvent, AlertProcessor, CallbackProcessor, CallbackRequest, CallbackSettings,
    Fingerprint, InMemoryMetrics, MessageRenderer, MessageStyle, MetricsRecorder, PollSettings,
    Poller, RetryPolicy, Severity, Status, UserMapper,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CHANNEL: &str = "alerts-channel";
pub const CALLBACK_URL: &str = "http://alert-sync/callback/action";

pub fn fp(raw: &str) -> Fingerprint {
    Fingerprint::parse(raw).unwrap()
}

// =============================================================================
// Backend
// =============================================================================

/// Enrich call as recorded by [`FakeBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichCall {
    pub fingerprint: String,
    pub enrichment: Enrichment,
    pub dispose_on_new_alert: bool,
}

#[derive(Default)]
pub struct FakeBackend {
    alerts: Mutex<HashMap<String, BackendAlert>>,
    pub get_calls: AtomicUsize,
    pub enrich_calls: Mutex<Vec<EnrichCall>>,
    pub unenrich_calls: Mutex<Vec<(String, Vec<EnrichmentKey>)>>,
    pub list_calls: AtomicUsize,
    pub fail_get: AtomicBool,
    pub fail_enrich: AtomicBool,
    pub fail_list: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Put or replace an alert in the backend.
    pub fn put(&self, fingerprint: &str, status: Status, enrichment: Enrichment) {
        let alert = Alert::restore(
            fp(fingerprint),
            "CPU High".to_string(),
            Severity::High,
            status,
            "cpu > 90%".to_string(),
            "prometheus".to_string(),
            HashMap::new(),
            Utc::now(),
        );
        self.alerts.lock().unwrap().insert(
            fingerprint.to_string(),
            BackendAlert { alert, enrichment },
        );
    }

    /// Put a firing alert with the given assignee enrichment.
    pub fn put_assigned(&self, fingerprint: &str, assignee: Option<&str>) {
        self.put(
            fingerprint,
            Status::Firing,
            Enrichment {
                status: assignee.map(|_| Status::Acknowledged),
                assignee: assignee.map(str::to_string),
            },
        );
    }

    pub fn enrich_count(&self) -> usize {
        self.enrich_calls.lock().unwrap().len()
    }

    pub fn unenrich_count(&self) -> usize {
        self.unenrich_calls.lock().unwrap().len()
    }

    fn unavailable() -> BackendError {
        BackendError::Status {
            status: 503,
            body: "unavailable".to_string(),
        }
    }
}

#[async_trait]
impl AlertBackend for FakeBackend {
    async fn get_alert(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<BackendAlert>, BackendError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self.alerts.lock().unwrap().get(fingerprint.as_str()).cloned())
    }

    async fn enrich(
        &self,
        fingerprint: &Fingerprint,
        enrichment: &Enrichment,
        dispose_on_new_alert: bool,
    ) -> Result<(), BackendError> {
        self.enrich_calls.lock().unwrap().push(EnrichCall {
            fingerprint: fingerprint.to_string(),
            enrichment: enrichment.clone(),
            dispose_on_new_alert,
        });
        if self.fail_enrich.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(())
    }

    async fn unenrich(
        &self,
        fingerprint: &Fingerprint,
        keys: &[EnrichmentKey],
    ) -> Result<(), BackendError> {
        self.unenrich_calls
            .lock()
            .unwrap()
            .push((fingerprint.to_string(), keys.to_vec()));
        Ok(())
    }

    async fn list_alerts(&self, limit: usize) -> Result<Vec<BackendAlert>, BackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .values()
            .take(limit)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Chat
// =============================================================================

#[derive(Default)]
pub struct FakeChat {
    next_id: AtomicUsize,
    pub created: Mutex<Vec<(String, String, Attachment)>>,
    pub updates: Mutex<Vec<(String, Attachment)>>,
    pub update_attempts: AtomicUsize,
    pub replies: Mutex<Vec<(String, String, String)>>,
    pub users: Mutex<HashMap<String, String>>,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_users: AtomicBool,
    /// Delay applied to every update, for timeout tests
    pub update_delay: Mutex<Option<Duration>>,
}

impl FakeChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, id: &str, username: &str) {
        self.users
            .lock()
            .unwrap()
            .insert(id.to_string(), username.to_string());
    }

    pub fn create_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn reply_texts(&self) -> Vec<String> {
        self.replies
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, text)| text.clone())
            .collect()
    }

    pub fn last_update(&self) -> Option<(String, Attachment)> {
        self.updates.lock().unwrap().last().cloned()
    }

    pub fn first_created(&self) -> Option<(String, String, Attachment)> {
        self.created.lock().unwrap().first().cloned()
    }

    fn unavailable() -> ChatError {
        ChatError::Status {
            status: 500,
            body: "boom".to_string(),
        }
    }
}

#[async_trait]
impl ChatClient for FakeChat {
    async fn create_message(
        &self,
        channel_id: &str,
        attachment: &Attachment,
    ) -> Result<String, ChatError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let id = format!("post-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.created
            .lock()
            .unwrap()
            .push((id.clone(), channel_id.to_string(), attachment.clone()));
        Ok(id)
    }

    async fn update_message(
        &self,
        message_id: &str,
        attachment: &Attachment,
    ) -> Result<(), ChatError> {
        self.update_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.update_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.updates
            .lock()
            .unwrap()
            .push((message_id.to_string(), attachment.clone()));
        Ok(())
    }

    async fn reply_in_thread(
        &self,
        channel_id: &str,
        root_id: &str,
        text: &str,
    ) -> Result<(), ChatError> {
        self.replies.lock().unwrap().push((
            channel_id.to_string(),
            root_id.to_string(),
            text.to_string(),
        ));
        Ok(())
    }

    async fn resolve_user_display_name(&self, user_id: &str) -> Result<String, ChatError> {
        if self.fail_users.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or(ChatError::Status {
                status: 404,
                body: "user not found".to_string(),
            })
    }
}

// =============================================================================
// Store
// =============================================================================

/// In-memory store whose saves can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub fail_save: AtomicBool,
    pub saves: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl TrackingStore for FlakyStore {
    async fn save(&self, fingerprint: &Fingerprint, post: &TrackedPost) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.save(fingerprint, post).await
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<TrackedPost>, StoreError> {
        self.inner.find_by_fingerprint(fingerprint).await
    }

    async fn delete(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        self.inner.delete(fingerprint).await
    }

    async fn find_all_active(&self) -> Result<Vec<TrackedPost>, StoreError> {
        self.inner.find_all_active().await
    }
}

// =============================================================================
// Harness
// =============================================================================

/// All fakes wired together.
pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub chat: Arc<FakeChat>,
    pub store: Arc<FlakyStore>,
    pub metrics: Arc<InMemoryMetrics>,
    pub users: Arc<UserMapper>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            backend: FakeBackend::new(),
            chat: FakeChat::new(),
            store: FlakyStore::new(),
            metrics: Arc::new(InMemoryMetrics::new()),
            users: Arc::new(UserMapper::from_pairs([("jane", "jdoe"), ("bob", "bsmith")]).unwrap()),
        }
    }

    fn recorder(&self) -> Arc<dyn MetricsRecorder> {
        self.metrics.clone()
    }

    pub fn renderer(&self) -> MessageRenderer {
        MessageRenderer::new(CALLBACK_URL)
    }

    pub fn ingest(&self) -> AlertProcessor {
        AlertProcessor::new(
            self.backend.clone(),
            self.chat.clone(),
            self.store.clone(),
            self.renderer(),
            Arc::clone(&self.users),
            self.recorder(),
            CHANNEL,
        )
        .with_retry_policy(RetryPolicy::none())
    }

    pub fn callbacks(&self, settings: CallbackSettings) -> CallbackProcessor {
        CallbackProcessor::new(
            self.backend.clone(),
            self.chat.clone(),
            self.store.clone(),
            self.renderer(),
            Arc::clone(&self.users),
            self.recorder(),
            settings,
        )
    }

    pub fn poller(&self) -> Poller {
        Poller::new(
            self.backend.clone(),
            self.chat.clone(),
            self.store.clone(),
            self.renderer(),
            Arc::clone(&self.users),
            self.recorder(),
            PollSettings::default(),
        )
    }

    pub async fn tracked(&self, fingerprint: &str) -> Option<TrackedPost> {
        self.store.find_by_fingerprint(&fp(fingerprint)).await.unwrap()
    }

    /// Track `fingerprint` as if it had been posted earlier.
    pub async fn seed_post(&self, fingerprint: &str, message_id: &str, assignee: &str) -> TrackedPost {
        let mut post = TrackedPost::new(
            message_id.to_string(),
            CHANNEL.to_string(),
            fp(fingerprint),
            "CPU High".to_string(),
            Severity::High,
            Utc::now() - chrono::Duration::minutes(30),
        );
        post.last_known_assignee = assignee.to_string();
        self.store.save(&fp(fingerprint), &post).await.unwrap();
        post
    }

    /// A button press for the message of `fingerprint`.
    pub fn button_press(&self, fingerprint: &str, message_id: &str, action: &str) -> CallbackRequest {
        let alert = Alert::restore(
            fp(fingerprint),
            "CPU High".to_string(),
            Severity::High,
            Status::Firing,
            String::new(),
            String::new(),
            HashMap::new(),
            Utc::now(),
        );
        let rendered = self.renderer().render(&alert, &MessageStyle::firing());
        CallbackRequest {
            user_id: "user-1".to_string(),
            message_id: message_id.to_string(),
            channel_id: CHANNEL.to_string(),
            action: action.to_string(),
            fingerprint: fingerprint.to_string(),
            alert_name: "CPU High".to_string(),
            attachment: rendered.actions[0].integration.context.attachment.clone(),
        }
    }
}

/// Inbound event builder.
pub fn event(fingerprint: &str, status: &str) -> AlertEvent {
    AlertEvent {
        fingerprint: fingerprint.to_string(),
        name: "CPU High".to_string(),
        severity: "high".to_string(),
        status: status.to_string(),
        description: "cpu > 90%".to_string(),
        source: vec!["prometheus".to_string()],
        labels: HashMap::new(),
        firing_start_time: None,
    }
}

pub fn event_at(fingerprint: &str, status: &str, start: DateTime<Utc>) -> AlertEvent {
    AlertEvent {
        firing_start_time: Some(start),
        ..event(fingerprint, status)
    }
}

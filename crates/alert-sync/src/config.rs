//! Configuration for the alert-sync service.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::callback::{CallbackSettings, DEFAULT_CALLBACK_TIMEOUT, DEFAULT_MAX_IN_FLIGHT};
use crate::reconcile::{PollSettings, DEFAULT_LIST_LIMIT, MIN_POLL_INTERVAL};
use crate::store::{DEFAULT_NAMESPACE, DEFAULT_TTL};

/// Default request body limit (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Configuration problems found by [`Config::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid {
        name: &'static str,
        reason: String,
    },
}

/// Service configuration.
#[derive(Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,
    /// Keep API base URL.
    pub keep_url: String,
    /// Keep API key.
    pub keep_api_key: Option<String>,
    /// Mattermost server URL.
    pub mattermost_url: Option<String>,
    /// Mattermost bot token.
    pub mattermost_token: Option<String>,
    /// Channel new alerts are posted to.
    pub channel_id: Option<String>,
    /// URL Mattermost calls when a button is pressed.
    pub callback_url: String,
    /// Shared secret expected in `X-API-Key` on the webhook route.
    pub webhook_secret: Option<String>,
    /// SQLite database path; unset keeps state in memory.
    pub store_path: Option<PathBuf>,
    /// Tracking store key namespace.
    pub store_namespace: String,
    /// Tracking record lifetime.
    pub store_ttl: Duration,
    /// Whether the poll reconciler runs.
    pub poll_enabled: bool,
    /// Poll reconciler settings.
    pub poll: PollSettings,
    /// Background callback settings.
    pub callback: CallbackSettings,
    /// Username mapping YAML file.
    pub user_mapping_file: Option<PathBuf>,
    /// Request body limit in bytes.
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: env::var("ALERT_SYNC_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            keep_url: env::var("KEEP_API_URL")
                .unwrap_or_else(|_| "http://keep-backend:8080".to_string()),
            keep_api_key: non_empty("KEEP_API_KEY"),
            mattermost_url: non_empty("MATTERMOST_URL"),
            mattermost_token: non_empty("MATTERMOST_TOKEN"),
            channel_id: non_empty("MATTERMOST_CHANNEL_ID"),
            callback_url: env::var("CALLBACK_URL")
                .unwrap_or_else(|_| "http://alert-sync:8080/callback/action".to_string()),
            webhook_secret: non_empty("WEBHOOK_SECRET"),
            store_path: non_empty("STORE_PATH").map(PathBuf::from),
            store_namespace: env::var("STORE_NAMESPACE")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            store_ttl: env::var("STORE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(DEFAULT_TTL, Duration::from_secs),
            poll_enabled: env::var("POLL_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            poll: PollSettings {
                interval: Duration::from_secs(
                    env::var("POLL_INTERVAL_SECS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(60),
                ),
                list_limit: env::var("POLL_LIST_LIMIT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_LIST_LIMIT),
            },
            callback: CallbackSettings {
                timeout: env::var("CALLBACK_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .map_or(DEFAULT_CALLBACK_TIMEOUT, Duration::from_secs),
                max_in_flight: env::var("CALLBACK_MAX_IN_FLIGHT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_MAX_IN_FLIGHT),
            },
            user_mapping_file: non_empty("USER_MAPPING_FILE").map(PathBuf::from),
            max_body_bytes: env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_BODY_BYTES),
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

impl Config {
    /// Check required settings and clamp out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid setting.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.mattermost_url.is_none() {
            return Err(ConfigError::Missing("MATTERMOST_URL"));
        }
        if self.mattermost_token.is_none() {
            return Err(ConfigError::Missing("MATTERMOST_TOKEN"));
        }
        if self.channel_id.is_none() {
            return Err(ConfigError::Missing("MATTERMOST_CHANNEL_ID"));
        }
        if self.poll.list_limit == 0 {
            return Err(ConfigError::Invalid {
                name: "POLL_LIST_LIMIT",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.callback.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "CALLBACK_TIMEOUT_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }

        self.poll.interval = self.poll.interval.max(MIN_POLL_INTERVAL);
        self.callback.max_in_flight = self.callback.max_in_flight.max(1);
        Ok(self)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("keep_url", &self.keep_url)
            .field("keep_api_key", &self.keep_api_key.as_ref().map(|_| "***"))
            .field("mattermost_url", &self.mattermost_url)
            .field("mattermost_token", &self.mattermost_token.as_ref().map(|_| "***"))
            .field("channel_id", &self.channel_id)
            .field("callback_url", &self.callback_url)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "***"))
            .field("store_path", &self.store_path)
            .field("store_namespace", &self.store_namespace)
            .field("store_ttl", &self.store_ttl)
            .field("poll_enabled", &self.poll_enabled)
            .field("poll", &self.poll)
            .field("callback", &self.callback)
            .field("user_mapping_file", &self.user_mapping_file)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

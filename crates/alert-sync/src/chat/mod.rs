//! Chat platform contract and Mattermost implementation.

pub mod attachment;
pub mod mattermost;

pub use attachment::{
    Action, ActionContext, Attachment, AttachmentSnapshot, Field, Integration, SnapshotError,
};
pub use mattermost::MattermostClient;

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by chat clients.
#[derive(Debug, Error)]
pub enum ChatError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Chat API answered with a non-success status
    #[error("chat API returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// Rate limited by the chat server
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retrying
        retry_after_secs: u64,
    },

    /// Client could not be constructed
    #[error("chat client misconfigured: {0}")]
    Configuration(String),
}

/// Operations this service needs from the chat platform.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post a new message carrying `attachment`. Returns the message id.
    async fn create_message(
        &self,
        channel_id: &str,
        attachment: &Attachment,
    ) -> Result<String, ChatError>;

    /// Replace the attachment of an existing message.
    async fn update_message(
        &self,
        message_id: &str,
        attachment: &Attachment,
    ) -> Result<(), ChatError>;

    /// Post a plain-text reply under `root_id`.
    async fn reply_in_thread(
        &self,
        channel_id: &str,
        root_id: &str,
        text: &str,
    ) -> Result<(), ChatError>;

    /// Resolve a user id to the name shown in mentions.
    async fn resolve_user_display_name(&self, user_id: &str) -> Result<String, ChatError>;
}

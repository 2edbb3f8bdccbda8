//! Message attachment model and the snapshot codec.
//!
//! Every interactive button carries an [`AttachmentSnapshot`] of the message
//! it belongs to. When a button is pressed we decode that snapshot to build
//! the "processing" placeholder without any network call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Footer shown while a button press is being handled.
pub const PROCESSING_FOOTER: &str = "Processing…";

/// A Mattermost message attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Plain-text summary for notifications
    #[serde(default)]
    pub fallback: String,
    /// Hex color for the side strip
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub title: String,
    /// Markdown body
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

impl Attachment {
    /// Append a field.
    pub fn push_field(&mut self, title: impl Into<String>, value: impl Into<String>, short: bool) {
        self.fields.push(Field {
            title: title.into(),
            value: value.into(),
            short,
        });
    }

    /// Look up a field value by title.
    #[must_use]
    pub fn field(&self, title: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.title == title)
            .map(|f| f.value.as_str())
    }

    /// Copy of this attachment with buttons removed.
    #[must_use]
    pub fn without_actions(&self) -> Self {
        Self {
            actions: Vec::new(),
            ..self.clone()
        }
    }

    /// Placeholder shown while a button press is handled in the background.
    #[must_use]
    pub fn processing_placeholder(&self) -> Self {
        Self {
            actions: Vec::new(),
            footer: Some(PROCESSING_FOOTER.to_string()),
            ..self.clone()
        }
    }
}

/// A short key/value row in an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub title: String,
    pub value: String,
    #[serde(default)]
    pub short: bool,
}

/// An interactive button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Button id (alphanumeric only in Mattermost)
    pub id: String,
    /// Button label
    pub name: String,
    /// Button style (`good`, `danger`, `primary`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    pub integration: Integration,
}

/// Where a button press is delivered and with which context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    pub url: String,
    pub context: ActionContext,
}

/// Context echoed back by the chat server on a button press.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionContext {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub alert_name: String,
    /// Encoded [`AttachmentSnapshot`]
    #[serde(default)]
    pub attachment: String,
}

/// Failure to decode an attachment snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Snapshot string was empty
    #[error("attachment snapshot is empty")]
    Empty,

    /// Snapshot is not a valid encoded attachment
    #[error("attachment snapshot is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Serialized attachment carried inside button payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentSnapshot(String);

impl AttachmentSnapshot {
    /// Capture an attachment. Buttons are dropped so snapshots never nest.
    #[must_use]
    pub fn capture(attachment: &Attachment) -> Self {
        // Attachment contains only strings, bools and vectors; encoding cannot fail.
        let encoded = serde_json::to_string(&attachment.without_actions()).unwrap_or_default();
        Self(encoded)
    }

    /// Wrap a snapshot string received from the chat server.
    #[must_use]
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Decode back into an attachment.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] when the string is empty or malformed.
    pub fn restore(&self) -> Result<Attachment, SnapshotError> {
        if self.0.trim().is_empty() {
            return Err(SnapshotError::Empty);
        }
        Ok(serde_json::from_str(&self.0)?)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

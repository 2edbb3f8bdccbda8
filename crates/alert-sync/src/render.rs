//! Alert → chat attachment rendering.

use chrono::Utc;

use crate::callback::CallbackAction;
use crate::chat::{Action, ActionContext, Attachment, AttachmentSnapshot, Integration};
use crate::domain::Alert;

/// Color for acknowledged alerts.
const ACKNOWLEDGED_COLOR: &str = "#f1c40f";

/// Color for resolved alerts.
const RESOLVED_COLOR: &str = "#2ecc71";

/// Field title holding the firing-start time.
pub const STARTED_FIELD: &str = "Started";

/// How an alert message should look.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageStyle {
    /// Active alert, optionally with a note (e.g. "Assignee removed")
    Firing { note: Option<String> },
    /// Someone owns the alert
    Acknowledged { by: Option<String> },
    /// Alert cleared
    Resolved { by: Option<String> },
}

impl MessageStyle {
    /// Plain firing style.
    #[must_use]
    pub const fn firing() -> Self {
        Self::Firing { note: None }
    }

    /// Acknowledged style; an empty name means "unknown".
    #[must_use]
    pub fn acknowledged(by: &str) -> Self {
        Self::Acknowledged {
            by: non_empty(by),
        }
    }

    /// Resolved style; an empty name means "unknown".
    #[must_use]
    pub fn resolved(by: &str) -> Self {
        Self::Resolved {
            by: non_empty(by),
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Firing { .. } => "FIRING",
            Self::Acknowledged { .. } => "ACKNOWLEDGED",
            Self::Resolved { .. } => "RESOLVED",
        }
    }

    fn buttons(&self) -> &'static [(CallbackAction, &'static str, &'static str)] {
        match self {
            Self::Firing { .. } => &[
                (CallbackAction::Acknowledge, "Acknowledge", "primary"),
                (CallbackAction::Resolve, "Resolve", "good"),
            ],
            Self::Acknowledged { .. } => &[
                (CallbackAction::Unacknowledge, "Unacknowledge", "default"),
                (CallbackAction::Resolve, "Resolve", "good"),
            ],
            Self::Resolved { .. } => &[],
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Builds chat attachments for alerts.
#[derive(Debug, Clone)]
pub struct MessageRenderer {
    callback_url: String,
}

impl MessageRenderer {
    /// `callback_url` is where the chat server delivers button presses.
    #[must_use]
    pub fn new(callback_url: impl Into<String>) -> Self {
        Self {
            callback_url: callback_url.into(),
        }
    }

    /// Render `alert` in `style`.
    #[must_use]
    pub fn render(&self, alert: &Alert, style: &MessageStyle) -> Attachment {
        let severity = alert.severity();
        let title = format!("{} [{}] {}", severity.emoji(), style.label(), alert.name());
        let color = match style {
            MessageStyle::Firing { .. } => severity.color(),
            MessageStyle::Acknowledged { .. } => ACKNOWLEDGED_COLOR,
            MessageStyle::Resolved { .. } => RESOLVED_COLOR,
        };

        let mut attachment = Attachment {
            fallback: format!("[{}] {}", style.label(), alert.name()),
            color: color.to_string(),
            title,
            text: alert.description().to_string(),
            footer: Some(format!("Fingerprint: {}", alert.fingerprint())),
            ..Attachment::default()
        };

        attachment.push_field("Severity", severity.as_str(), true);
        if !alert.source().is_empty() {
            attachment.push_field("Source", alert.source(), true);
        }
        attachment.push_field(
            STARTED_FIELD,
            alert
                .firing_start_time()
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string(),
            true,
        );

        match style {
            MessageStyle::Firing { note } => {
                if let Some(note) = note {
                    attachment.push_field("Note", note.as_str(), false);
                }
            }
            MessageStyle::Acknowledged { by } => {
                if let Some(by) = by {
                    attachment.push_field("Acknowledged by", format!("@{by}"), true);
                }
            }
            MessageStyle::Resolved { by } => {
                if let Some(by) = by {
                    attachment.push_field("Resolved by", format!("@{by}"), true);
                }
                let elapsed = Utc::now() - alert.firing_start_time();
                let secs = u64::try_from(elapsed.num_seconds()).unwrap_or(0);
                attachment.push_field("Duration", format_duration(secs), true);
            }
        }

        let labels = format_labels(alert);
        if !labels.is_empty() {
            attachment.push_field("Labels", labels, false);
        }

        let snapshot = AttachmentSnapshot::capture(&attachment);
        attachment.actions = style
            .buttons()
            .iter()
            .map(|(action, name, button_style)| Action {
                id: action.button_id().to_string(),
                name: (*name).to_string(),
                style: Some((*button_style).to_string()),
                integration: Integration {
                    url: self.callback_url.clone(),
                    context: ActionContext {
                        action: action.as_str().to_string(),
                        fingerprint: alert.fingerprint().to_string(),
                        alert_name: alert.name().to_string(),
                        attachment: snapshot.as_str().to_string(),
                    },
                },
            })
            .collect();

        attachment
    }
}

fn format_labels(alert: &Alert) -> String {
    let mut labels: Vec<_> = alert
        .labels()
        .into_iter()
        .map(|(k, v)| format!("`{k}={v}`"))
        .collect();
    labels.sort();
    labels.join(" ")
}

/// Format seconds into a human-readable duration.
#[must_use]
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let mins = secs / 60;
        let remaining_secs = secs % 60;
        if remaining_secs == 0 {
            format!("{mins}m")
        } else {
            format!("{mins}m {remaining_secs}s")
        }
    } else if secs < 86_400 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins == 0 {
            format!("{hours}h")
        } else {
            format!("{hours}h {mins}m")
        }
    } else {
        let days = secs / 86_400;
        let hours = (secs % 86_400) / 3600;
        if hours == 0 {
            format!("{days}d")
        } else {
            format!("{days}d {hours}h")
        }
    }
}

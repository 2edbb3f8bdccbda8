//! HTTP server for Keep webhooks and Mattermost button callbacks.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::backend::keep::{parse_timestamp, value_to_string};
use crate::callback::{CallbackProcessor, CallbackRequest};
use crate::error::Error;
use crate::ingest::{AlertEvent, AlertProcessor};
use crate::metrics::InMemoryMetrics;

/// Header carrying the webhook shared secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Alert ingestion.
    pub alerts: Arc<AlertProcessor>,
    /// Button handling.
    pub callbacks: Arc<CallbackProcessor>,
    /// Counters exposed on `/metrics`.
    pub metrics: Arc<InMemoryMetrics>,
    /// Expected `X-API-Key` value on the webhook route.
    pub webhook_secret: Option<String>,
}

/// Build the HTTP router.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/webhook/alert", post(alert_webhook_handler))
        .route("/callback/action", post(callback_handler))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Keep webhook
// ============================================================================

/// Alert body posted by a Keep webhook workflow.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeepWebhook {
    #[serde(default)]
    fingerprint: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    description: Option<String>,
    /// Keep sends a list; some workflows send a single string
    #[serde(default)]
    source: Value,
    #[serde(default)]
    labels: HashMap<String, Value>,
    #[serde(default)]
    firing_start_time: Option<String>,
    #[serde(default)]
    last_received: Option<String>,
}

impl KeepWebhook {
    fn into_event(self) -> AlertEvent {
        let source = match self.source {
            Value::Array(items) => items
                .into_iter()
                .map(value_to_string)
                .filter(|s| !s.is_empty())
                .collect(),
            Value::String(s) if !s.is_empty() => vec![s],
            _ => Vec::new(),
        };

        AlertEvent {
            fingerprint: self.fingerprint,
            name: self.name,
            severity: self.severity,
            status: self.status,
            description: self.description.unwrap_or_default(),
            source,
            labels: self
                .labels
                .into_iter()
                .map(|(k, v)| (k, value_to_string(v)))
                .collect(),
            firing_start_time: self
                .firing_start_time
                .as_deref()
                .or(self.last_received.as_deref())
                .and_then(parse_timestamp),
        }
    }
}

fn authorized(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret else {
        return true;
    };
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|provided| bool::from(provided.as_bytes().ct_eq(secret.as_bytes())))
}

/// Map processor errors to HTTP. Upstream failures answer 502 so Keep retries.
fn error_status(e: &Error) -> StatusCode {
    if e.is_invalid_input() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::BAD_GATEWAY
    }
}

async fn alert_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&headers, state.webhook_secret.as_deref()) {
        warn!("Rejected alert webhook with bad API key");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid API key"})),
        )
            .into_response();
    }

    let payload: KeepWebhook = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Failed to parse alert webhook");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("invalid payload: {e}")})),
            )
                .into_response();
        }
    };

    let event = payload.into_event();
    debug!(fingerprint = %event.fingerprint, status = %event.status, "Received alert webhook");

    match state.alerts.process(event).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({"status": "ok", "outcome": outcome})),
        )
            .into_response(),
        Err(e) => {
            let status = error_status(&e);
            if status == StatusCode::BAD_REQUEST {
                warn!(error = %e, "Rejected alert webhook");
            } else {
                error!(error = %e, "Failed to process alert webhook");
            }
            (status, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}

// ============================================================================
// Mattermost button callback
// ============================================================================

/// Integration request posted by Mattermost when a button is pressed.
#[derive(Debug, Deserialize)]
struct MattermostAction {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    post_id: String,
    #[serde(default)]
    context: ActionContextPayload,
}

#[derive(Debug, Default, Deserialize)]
struct ActionContextPayload {
    #[serde(default)]
    action: String,
    #[serde(default)]
    fingerprint: String,
    #[serde(default)]
    alert_name: String,
    #[serde(default)]
    attachment: String,
}

impl From<MattermostAction> for CallbackRequest {
    fn from(payload: MattermostAction) -> Self {
        Self {
            user_id: payload.user_id,
            message_id: payload.post_id,
            channel_id: payload.channel_id,
            action: payload.context.action,
            fingerprint: payload.context.fingerprint,
            alert_name: payload.context.alert_name,
            attachment: payload.context.attachment,
        }
    }
}

async fn callback_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: MattermostAction = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Failed to parse button callback");
            return ephemeral(StatusCode::BAD_REQUEST, &format!("Invalid request: {e}"));
        }
    };

    match state.callbacks.handle(payload.into()) {
        Ok(placeholder) => Json(json!({
            "update": {
                "props": {
                    "attachments": [placeholder]
                }
            }
        }))
        .into_response(),
        Err(e) => ephemeral(error_status(&e), &e.to_string()),
    }
}

fn ephemeral(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({"ephemeral_text": text}))).into_response()
}

// ============================================================================
// Health and metrics
// ============================================================================

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "alert-sync",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn readiness_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ready",
        "callbacks_in_flight": state.callbacks.in_flight(),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.metrics.snapshot()))
}

/// Bind `addr` and serve until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve<F>(router: Router, addr: &str, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("alert-sync listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

//! Mattermost REST API client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{Attachment, ChatClient, ChatError};

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the Mattermost v4 API.
#[derive(Debug, Clone)]
pub struct MattermostClient {
    client: reqwest::Client,
    base_url: String,
}

impl MattermostClient {
    /// Create a client for `base_url` authenticated with a bot token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, token: &str) -> Result<Self, ChatError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ChatError::Configuration(format!("invalid token: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChatError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v4{path}", self.base_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);

            warn!(retry_after_secs = retry_after, "Rate limited by Mattermost");
            return Err(ChatError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, "Mattermost API request failed");
        Err(ChatError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ChatClient for MattermostClient {
    #[instrument(skip(self, attachment), fields(channel_id = %channel_id))]
    async fn create_message(
        &self,
        channel_id: &str,
        attachment: &Attachment,
    ) -> Result<String, ChatError> {
        let body = PostRequest {
            id: None,
            channel_id: Some(channel_id),
            root_id: None,
            message: "",
            props: Some(Props::with(attachment)),
        };

        let response = self.client.post(self.url("/posts")).json(&body).send().await?;
        let post: PostResponse = Self::check(response).await?.json().await?;
        debug!(message_id = %post.id, "Created message");
        Ok(post.id)
    }

    #[instrument(skip(self, attachment), fields(message_id = %message_id))]
    async fn update_message(
        &self,
        message_id: &str,
        attachment: &Attachment,
    ) -> Result<(), ChatError> {
        let body = PostRequest {
            id: Some(message_id),
            channel_id: None,
            root_id: None,
            message: "",
            props: Some(Props::with(attachment)),
        };

        let response = self
            .client
            .put(self.url(&format!("/posts/{message_id}")))
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        debug!("Updated message");
        Ok(())
    }

    #[instrument(skip(self, text), fields(channel_id = %channel_id, root_id = %root_id))]
    async fn reply_in_thread(
        &self,
        channel_id: &str,
        root_id: &str,
        text: &str,
    ) -> Result<(), ChatError> {
        let body = PostRequest {
            id: None,
            channel_id: Some(channel_id),
            root_id: Some(root_id),
            message: text,
            props: None,
        };

        let response = self.client.post(self.url("/posts")).json(&body).send().await?;
        Self::check(response).await?;
        debug!("Posted thread reply");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn resolve_user_display_name(&self, user_id: &str) -> Result<String, ChatError> {
        let response = self
            .client
            .get(self.url(&format!("/users/{user_id}")))
            .send()
            .await?;
        let user: UserResponse = Self::check(response).await?.json().await?;
        Ok(user.username)
    }
}

// =============================================================================
// Mattermost API types
// =============================================================================

#[derive(Debug, Serialize)]
struct PostRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    root_id: Option<&'a str>,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    props: Option<Props<'a>>,
}

#[derive(Debug, Serialize)]
struct Props<'a> {
    attachments: [&'a Attachment; 1],
}

impl<'a> Props<'a> {
    fn with(attachment: &'a Attachment) -> Self {
        Self {
            attachments: [attachment],
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    username: String,
}

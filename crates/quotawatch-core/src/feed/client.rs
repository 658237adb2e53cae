//! HTTP activity feed client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{DeliveryChannel, DeliveryError, RecipientSpec};
use crate::config::FeedConfig;
use crate::error::{Error, Result};

/// Posts notifications to the activity feed API
#[derive(Clone)]
pub struct FeedClient {
    client: Client,
    posts_url: String,
    api_token: Option<String>,
    author_id: i64,
}

impl FeedClient {
    /// Create a new feed client
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            posts_url: format!("{}/posts", config.base_url.trim_end_matches('/')),
            api_token: config.api_token.clone(),
            author_id: config.admin_user_id,
        })
    }
}

#[async_trait]
impl DeliveryChannel for FeedClient {
    async fn send(
        &self,
        recipients: &RecipientSpec,
        title: &str,
        body: &str,
    ) -> std::result::Result<String, DeliveryError> {
        let payload = FeedPost {
            title,
            body,
            rights: &recipients.rights,
            author_id: self.author_id,
        };

        let mut request = self.client.post(&self.posts_url).json(&payload);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Timeout
            } else {
                DeliveryError::Http(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status, body });
        }

        let created: FeedPostCreated = response
            .json()
            .await
            .map_err(|e| DeliveryError::InvalidResponse(e.to_string()))?;

        let message_id = match created.id {
            serde_json::Value::String(id) if !id.is_empty() => id,
            serde_json::Value::Number(id) => id.to_string(),
            other => {
                return Err(DeliveryError::InvalidResponse(format!(
                    "unusable post id: {other}"
                )))
            }
        };

        debug!(rights = ?recipients.rights, "Feed accepted post");
        info!(message_id = %message_id, "Feed notification sent");
        Ok(message_id)
    }
}

#[derive(Debug, Serialize)]
struct FeedPost<'a> {
    title: &'a str,
    body: &'a str,
    rights: &'a [String],
    author_id: i64,
}

#[derive(Debug, Deserialize)]
struct FeedPostCreated {
    id: serde_json::Value,
}

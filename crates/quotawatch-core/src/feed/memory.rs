//! Delivery channel that records messages instead of sending them

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use super::{DeliveryChannel, DeliveryError, RecipientSpec};

/// A message captured by [`RecordingChannel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Id handed back to the caller
    pub message_id: String,
    /// Recipients the message was addressed to
    pub recipients: RecipientSpec,
    /// Post title
    pub title: String,
    /// Post body
    pub body: String,
}

/// In-memory channel; can be told to fail for given recipients
#[derive(Clone, Default)]
pub struct RecordingChannel {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    failing_rights: Arc<Mutex<HashSet<String>>>,
}

impl RecordingChannel {
    /// Create an empty channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every delivery whose recipients include `right`
    pub fn fail_for(&self, right: impl Into<String>) {
        self.failing_rights.lock().insert(right.into());
    }

    /// Stop failing deliveries
    pub fn heal(&self) {
        self.failing_rights.lock().clear();
    }

    /// Messages delivered so far
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send(
        &self,
        recipients: &RecipientSpec,
        title: &str,
        body: &str,
    ) -> Result<String, DeliveryError> {
        let failing = self.failing_rights.lock();
        if recipients.rights.iter().any(|r| failing.contains(r)) {
            return Err(DeliveryError::Rejected {
                status: 503,
                body: "feed unavailable".to_string(),
            });
        }
        drop(failing);

        let mut sent = self.sent.lock();
        let message_id = format!("msg-{}", sent.len() + 1);
        sent.push(SentMessage {
            message_id: message_id.clone(),
            recipients: recipients.clone(),
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(message_id)
    }
}

//! Activity feed delivery
//!
//! Posts are addressed by rights codes: `U<id>` for a user's feed, the `SG*`
//! family for a group's feed. Without the matching rights a post is stored
//! but never shown.

mod client;
#[cfg(any(test, feature = "test-util"))]
mod memory;
mod template;

pub use client::FeedClient;
#[cfg(any(test, feature = "test-util"))]
pub use memory::{RecordingChannel, SentMessage};
pub use template::{MessageTemplate, RenderedMessage};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::EntityKind;

/// Recipients of a post, as feed rights codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientSpec {
    /// Rights codes granting visibility
    pub rights: Vec<String>,
}

impl RecipientSpec {
    /// Rights needed for a post to appear in the feed of the given entity
    pub fn for_entity(kind: EntityKind, entity_id: i64, admin_user_id: i64) -> Self {
        let rights = match kind {
            EntityKind::User => vec![format!("U{entity_id}")],
            EntityKind::Group => vec![
                format!("SG{entity_id}"),
                format!("OSG{entity_id}_L"),
                format!("SG{entity_id}_A"),
                format!("SG{entity_id}_E"),
                format!("SG{entity_id}_K"),
                "SA".to_string(),
                format!("U{admin_user_id}"),
            ],
        };
        Self { rights }
    }
}

/// Channel that delivers a titled message to a set of recipients
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Deliver a message, returning the channel's message id
    async fn send(
        &self,
        recipients: &RecipientSpec,
        title: &str,
        body: &str,
    ) -> Result<String, DeliveryError>;
}

/// Delivery errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// The per-request timeout elapsed
    #[error("request timed out")]
    Timeout,

    /// The feed answered with a non-success status
    #[error("feed rejected post with status {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// The feed accepted the post but the response was unusable
    #[error("invalid feed response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_user_recipients() {
        let spec = RecipientSpec::for_entity(EntityKind::User, 512, 1);
        assert_eq!(spec.rights, vec!["U512"]);
    }

    #[test]
    fn test_group_recipients() {
        let spec = RecipientSpec::for_entity(EntityKind::Group, 37, 1);
        assert_eq!(
            spec.rights,
            vec!["SG37", "OSG37_L", "SG37_A", "SG37_E", "SG37_K", "SA", "U1"]
        );
    }

    #[test]
    fn test_group_recipients_use_configured_admin() {
        let spec = RecipientSpec::for_entity(EntityKind::Group, 37, 900);
        assert_eq!(spec.rights.last().map(String::as_str), Some("U900"));
    }
}

//! Notification record and cycle outcome models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{EntityKind, QuotaRecord};
use crate::error::Error;

/// Composite identity of a notification: one per quota and owning entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NotificationKey {
    /// Quota (storage) record the breach belongs to
    pub quota_id: i64,
    /// Kind of the notified entity
    pub entity_kind: EntityKind,
    /// Notified entity
    pub entity_id: i64,
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.quota_id, self.entity_kind, self.entity_id)
    }
}

impl FromStr for NotificationKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::validation(format!("invalid notification key: {s}"));

        let mut parts = s.splitn(3, ':');
        let (Some(quota_id), Some(kind), Some(entity_id)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        Ok(Self {
            quota_id: quota_id.parse().map_err(|_| invalid())?,
            entity_kind: kind.parse()?,
            entity_id: entity_id.parse().map_err(|_| invalid())?,
        })
    }
}

/// Per-key notification lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationState {
    /// No live record: a breach will be notified
    NotNotified,
    /// A live record exists: further breaches are suppressed
    Notified,
}

impl NotificationState {
    /// State implied by record existence
    pub fn from_exists(exists: bool) -> Self {
        if exists {
            Self::Notified
        } else {
            Self::NotNotified
        }
    }
}

/// Durable marker that a breach notification was delivered and not yet cleared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Identity of the marker
    pub key: NotificationKey,

    /// Display name at send time
    #[serde(default)]
    pub display_name: String,

    /// Identifier returned by the delivery channel
    #[serde(default)]
    pub message_id: Option<String>,

    /// Utilization that triggered the notification
    #[serde(default)]
    pub utilization_percent: f64,

    /// When the notification was delivered
    pub sent_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Record for a delivered notification
    pub fn sent(quota: &QuotaRecord, message_id: impl Into<String>) -> Self {
        Self {
            key: quota.key(),
            display_name: quota.display_name.clone(),
            message_id: Some(message_id.into()),
            utilization_percent: quota.utilization_percent(),
            sent_at: Utc::now(),
        }
    }

    /// Record known only by its key (e.g. an unreadable stored value)
    pub fn bare(key: NotificationKey) -> Self {
        Self {
            key,
            display_name: String::new(),
            message_id: None,
            utilization_percent: 0.0,
            sent_at: DateTime::default(),
        }
    }
}

/// Result of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// Delivered; carries the channel message id
    Sent(String),
    /// Not delivered; carries the reason
    Failed(String),
}

/// What happened to one breaching entity during dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Sent and recorded
    Notified {
        /// Channel message id
        message_id: String,
    },
    /// Delivery failed; no record written, retried next cycle
    DeliveryFailed {
        /// Failure reason
        reason: String,
    },
    /// Sent, but the record write failed; a duplicate is possible next cycle
    RecordFailed {
        /// Channel message id
        message_id: String,
        /// Failure reason
        reason: String,
    },
    /// Sent, but a live record already existed for the key
    AlreadyRecorded {
        /// Channel message id
        message_id: String,
    },
}

impl DispatchStatus {
    /// Short label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Notified { .. } => "notified",
            Self::DeliveryFailed { .. } => "delivery_failed",
            Self::RecordFailed { .. } => "record_failed",
            Self::AlreadyRecorded { .. } => "already_recorded",
        }
    }

    /// Whether the entity now has a live record
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Notified { .. } | Self::AlreadyRecorded { .. })
    }
}

/// Dispatch result for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEntry {
    /// Notification key
    pub key: NotificationKey,
    /// Display name of the quota
    pub display_name: String,
    /// Utilization at dispatch time
    pub utilization_percent: f64,
    /// Outcome
    #[serde(flatten)]
    pub status: DispatchStatus,
}

/// Why a notification record was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearReason {
    /// Utilization dropped below the threshold
    Recovered,
    /// The quota no longer exists or changed owner
    Stale,
}

impl ClearReason {
    /// Short label used in logs and metrics
    pub fn label(self) -> &'static str {
        match self {
            Self::Recovered => "recovered",
            Self::Stale => "stale",
        }
    }
}

/// A record removed by reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearedKey {
    /// Removed key
    pub key: NotificationKey,
    /// Reason for removal
    pub reason: ClearReason,
    /// Current utilization, if the quota still exists
    pub utilization_percent: Option<f64>,
}

/// A per-key failure surfaced by reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFailure {
    /// Affected key
    pub key: NotificationKey,
    /// Failure reason
    pub reason: String,
}

/// Summary of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Records removed
    pub cleared: Vec<ClearedKey>,
    /// Records kept because the breach is ongoing
    pub retained: Vec<NotificationKey>,
    /// Records that should have been removed but could not be
    pub failures: Vec<KeyFailure>,
}

impl ReconcileReport {
    /// Keys removed in this pass
    pub fn cleared_keys(&self) -> Vec<NotificationKey> {
        self.cleared.iter().map(|c| c.key).collect()
    }
}

/// Summary of one full notification cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Identifier of the run, also attached to log events
    pub run_id: uuid::Uuid,
    /// When the cycle started
    pub started_at: DateTime<Utc>,
    /// Threshold in effect
    pub threshold_percent: f64,
    /// Quotas fetched from the ledger
    pub quotas_checked: usize,
    /// Quotas above the threshold, notified or not
    pub breaches: usize,
    /// Breaches suppressed by an existing record
    pub suppressed: usize,
    /// Per-entity dispatch results
    pub dispatched: Vec<DispatchEntry>,
    /// Reconciliation results
    pub reconciled: ReconcileReport,
}

impl CycleReport {
    /// Entities notified and recorded in this cycle
    pub fn notified_count(&self) -> usize {
        self.dispatched
            .iter()
            .filter(|e| matches!(e.status, DispatchStatus::Notified { .. }))
            .count()
    }

    /// Number of per-entity failures across dispatch and reconciliation
    pub fn failure_count(&self) -> usize {
        let dispatch = self
            .dispatched
            .iter()
            .filter(|e| !matches!(e.status, DispatchStatus::Notified { .. }))
            .count();
        dispatch + self.reconciled.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_key_text_form() {
        let key = NotificationKey {
            quota_id: 12,
            entity_kind: EntityKind::Group,
            entity_id: 305,
        };
        assert_eq!(key.to_string(), "12:group:305");
        assert_eq!("12:group:305".parse::<NotificationKey>().unwrap(), key);
    }

    #[test]
    fn test_key_rejects_garbage() {
        assert!("12:group".parse::<NotificationKey>().is_err());
        assert!("x:group:1".parse::<NotificationKey>().is_err());
        assert!("1:team:1".parse::<NotificationKey>().is_err());
        assert!("1:user:1:2".parse::<NotificationKey>().is_err());
    }

    #[test]
    fn test_state_from_exists() {
        assert_eq!(NotificationState::from_exists(true), NotificationState::Notified);
        assert_eq!(NotificationState::from_exists(false), NotificationState::NotNotified);
    }

    #[test]
    fn test_record_failed_is_not_recorded() {
        let status = DispatchStatus::RecordFailed {
            message_id: "m1".to_string(),
            reason: "redis down".to_string(),
        };
        assert!(!status.is_recorded());
        assert_eq!(status.label(), "record_failed");
    }
}

//! Notification delivery and record keeping

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::db::MarkerStore;
use crate::error::Error;
use crate::feed::{DeliveryChannel, MessageTemplate, RecipientSpec};
use crate::models::{
    DispatchEntry, DispatchStatus, NotificationOutcome, NotificationRecord, QuotaRecord,
};

/// Sends breach notifications and records the ones that went out
///
/// Sending and recording are not transactional. A failed record write after
/// a successful send is reported as [`DispatchStatus::RecordFailed`]; the
/// next cycle will notify that entity again.
#[derive(Clone)]
pub struct Dispatcher {
    channel: Arc<dyn DeliveryChannel>,
    store: Arc<dyn MarkerStore>,
    template: MessageTemplate,
    threshold_percent: f64,
    admin_user_id: i64,
    max_concurrency: usize,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(
        channel: Arc<dyn DeliveryChannel>,
        store: Arc<dyn MarkerStore>,
        template: MessageTemplate,
        threshold_percent: f64,
        admin_user_id: i64,
    ) -> Self {
        Self {
            channel,
            store,
            template,
            threshold_percent,
            admin_user_id,
            max_concurrency: 1,
        }
    }

    /// Allow up to `max` deliveries in flight
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Deliver one notification, without recording it
    pub async fn notify(&self, quota: &QuotaRecord) -> NotificationOutcome {
        let recipients =
            RecipientSpec::for_entity(quota.entity_kind, quota.entity_id, self.admin_user_id);
        let message = self.template.render(quota, self.threshold_percent);

        debug!(
            key = %quota.key(),
            rights = ?recipients.rights,
            title = %message.title,
            "Sending quota notification"
        );

        match self
            .channel
            .send(&recipients, &message.title, &message.body)
            .await
        {
            Ok(message_id) => NotificationOutcome::Sent(message_id),
            Err(e) => NotificationOutcome::Failed(Error::from(e).to_string()),
        }
    }

    /// Notify and record every breach; one entry per distinct key, sorted by key
    pub async fn dispatch(&self, breaches: Vec<QuotaRecord>) -> Vec<DispatchEntry> {
        let mut seen = HashSet::new();
        let unique: Vec<QuotaRecord> = breaches
            .into_iter()
            .filter(|q| seen.insert(q.key()))
            .collect();

        let mut entries: Vec<DispatchEntry> = stream::iter(unique)
            .map(|quota| async move { self.dispatch_one(quota).await })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        entries.sort_by_key(|e| e.key);
        entries
    }

    async fn dispatch_one(&self, quota: QuotaRecord) -> DispatchEntry {
        let key = quota.key();
        let utilization_percent = quota.utilization_percent();

        let status = match self.notify(&quota).await {
            NotificationOutcome::Failed(reason) => {
                warn!(key = %key, reason = %reason, "Quota notification delivery failed");
                DispatchStatus::DeliveryFailed { reason }
            }
            NotificationOutcome::Sent(message_id) => {
                let record = NotificationRecord::sent(&quota, message_id.clone());
                match self.store.put(&record).await {
                    Ok(true) => {
                        info!(
                            key = %key,
                            message_id = %message_id,
                            utilization = utilization_percent,
                            "Quota notification sent"
                        );
                        DispatchStatus::Notified { message_id }
                    }
                    Ok(false) => {
                        warn!(
                            key = %key,
                            message_id = %message_id,
                            "Notification record already present; possible concurrent run"
                        );
                        DispatchStatus::AlreadyRecorded { message_id }
                    }
                    Err(e) => {
                        error!(
                            key = %key,
                            message_id = %message_id,
                            error = %e,
                            "Notification sent but not recorded; it may be repeated next cycle"
                        );
                        DispatchStatus::RecordFailed {
                            message_id,
                            reason: e.to_string(),
                        }
                    }
                }
            }
        };

        metrics::counter!("quotawatch_notifications_total", "status" => status.label())
            .increment(1);

        DispatchEntry {
            key,
            display_name: quota.display_name,
            utilization_percent,
            status,
        }
    }
}

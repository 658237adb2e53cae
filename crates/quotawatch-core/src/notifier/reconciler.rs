//! Clearing notification records once a breach resolves

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::collector::Collector;
use crate::db::MarkerStore;
use crate::error::Result;
use crate::models::{
    ClearReason, ClearedKey, KeyFailure, NotificationRecord, QuotaRecord, ReconcileReport,
};

/// Removes records whose quota recovered or disappeared
#[derive(Clone)]
pub struct Reconciler {
    collector: Collector,
    store: Arc<dyn MarkerStore>,
}

/// Decision for one record
#[derive(Debug, Clone, Copy, PartialEq)]
enum Verdict {
    Retain,
    Clear(ClearReason, Option<f64>),
}

impl Reconciler {
    /// Create a new reconciler
    pub fn new(collector: Collector, store: Arc<dyn MarkerStore>) -> Self {
        Self { collector, store }
    }

    /// Re-check every live record against current utilization
    ///
    /// Fails only if the record list or the ledger cannot be read; a failed
    /// delete is reported per key.
    pub async fn reconcile(&self, threshold_percent: f64) -> Result<ReconcileReport> {
        let records = self.store.list_all().await?;
        if records.is_empty() {
            debug!("No notification records to reconcile");
            return Ok(ReconcileReport::default());
        }

        let mut quota_ids: Vec<i64> = records.iter().map(|r| r.key.quota_id).collect();
        quota_ids.sort_unstable();
        quota_ids.dedup();

        let current: HashMap<i64, QuotaRecord> = self
            .collector
            .fetch_by_ids(&quota_ids)
            .await?
            .into_iter()
            .map(|q| (q.quota_id, q))
            .collect();

        let mut report = ReconcileReport::default();

        for record in records {
            let key = record.key;
            match judge(&record, current.get(&key.quota_id), threshold_percent) {
                Verdict::Retain => report.retained.push(key),
                Verdict::Clear(reason, utilization_percent) => {
                    match self.store.delete(&key).await {
                        Ok(_) => {
                            info!(
                                key = %key,
                                reason = reason.label(),
                                utilization = ?utilization_percent,
                                "Notification record cleared"
                            );
                            metrics::counter!(
                                "quotawatch_markers_cleared_total",
                                "reason" => reason.label()
                            )
                            .increment(1);
                            report.cleared.push(ClearedKey {
                                key,
                                reason,
                                utilization_percent,
                            });
                        }
                        Err(e) => {
                            warn!(key = %key, error = %e, "Failed to clear notification record");
                            report.failures.push(KeyFailure {
                                key,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}

/// A record is cleared when its quota is gone, changed owner, or is strictly
/// below the threshold. A quota exactly at the threshold keeps its record.
fn judge(record: &NotificationRecord, quota: Option<&QuotaRecord>, threshold_percent: f64) -> Verdict {
    let Some(quota) = quota else {
        return Verdict::Clear(ClearReason::Stale, None);
    };

    if quota.key() != record.key {
        return Verdict::Clear(ClearReason::Stale, Some(quota.utilization_percent()));
    }

    let utilization = quota.utilization_percent();
    if utilization < threshold_percent {
        Verdict::Clear(ClearReason::Recovered, Some(utilization))
    } else {
        Verdict::Retain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryLedger, MemoryMarkerStore};
    use crate::error::Error;
    use crate::models::EntityKind;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn quota(id: i64, used: u64, limit: u64) -> QuotaRecord {
        QuotaRecord {
            quota_id: id,
            entity_id: 40 + id,
            entity_kind: EntityKind::Group,
            display_name: format!("group-{id}"),
            used_bytes: used,
            limit_bytes: limit,
        }
    }

    #[rstest]
    #[case::below(80, Verdict::Clear(ClearReason::Recovered, Some(80.0)))]
    #[case::just_below(89, Verdict::Clear(ClearReason::Recovered, Some(89.0)))]
    #[case::exactly_at(90, Verdict::Retain)]
    #[case::above(95, Verdict::Retain)]
    fn test_judge_threshold(#[case] used: u64, #[case] expected: Verdict) {
        let q = quota(1, used, 100);
        let record = NotificationRecord::sent(&q, "m");
        assert_eq!(judge(&record, Some(&q), 90.0), expected);
    }

    #[test]
    fn test_judge_missing_quota_is_stale() {
        let record = NotificationRecord::sent(&quota(1, 95, 100), "m");
        assert_eq!(judge(&record, None, 90.0), Verdict::Clear(ClearReason::Stale, None));
    }

    #[test]
    fn test_judge_new_owner_is_stale() {
        let before = quota(1, 95, 100);
        let record = NotificationRecord::sent(&before, "m");
        let mut after = before.clone();
        after.entity_id = 9;

        assert!(matches!(
            judge(&record, Some(&after), 90.0),
            Verdict::Clear(ClearReason::Stale, _)
        ));
    }

    #[test]
    fn test_judge_zero_limit_counts_as_recovered() {
        let record = NotificationRecord::sent(&quota(1, 95, 100), "m");
        assert!(matches!(
            judge(&record, Some(&quota(1, 95, 0)), 90.0),
            Verdict::Clear(ClearReason::Recovered, Some(_))
        ));
    }

    async fn setup(quotas: &[QuotaRecord]) -> (MemoryLedger, MemoryMarkerStore, Reconciler) {
        let ledger = MemoryLedger::new();
        let store = MemoryMarkerStore::new();
        for q in quotas {
            ledger.upsert(q.clone());
            store.put(&NotificationRecord::sent(q, "m")).await.unwrap();
        }
        let reconciler = Reconciler::new(
            Collector::new(Arc::new(ledger.clone())),
            Arc::new(store.clone()),
        );
        (ledger, store, reconciler)
    }

    #[tokio::test]
    async fn test_reconcile_judges_each_record_by_its_own_quota() {
        let recovered = quota(1, 50, 100);
        let ongoing = quota(2, 95, 100);
        let at_threshold = quota(3, 90, 100);
        let deleted = quota(4, 99, 100);
        let (ledger, store, reconciler) =
            setup(&[recovered.clone(), ongoing.clone(), at_threshold.clone(), deleted.clone()]).await;
        ledger.remove(deleted.quota_id);

        let report = reconciler.reconcile(90.0).await.unwrap();

        assert_eq!(report.cleared_keys(), vec![recovered.key(), deleted.key()]);
        assert_eq!(report.retained, vec![ongoing.key(), at_threshold.key()]);
        assert!(report.failures.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_surfaces_delete_failures() {
        let (_ledger, store, reconciler) = setup(&[quota(1, 10, 100)]).await;
        store.set_fail_writes(true);

        let report = reconciler.reconcile(90.0).await.unwrap();

        assert!(report.cleared.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_aborts_when_ledger_unavailable() {
        let (ledger, store, reconciler) = setup(&[quota(1, 10, 100)]).await;
        ledger.set_unavailable(true);

        let err = reconciler.reconcile(90.0).await.unwrap_err();

        assert!(matches!(err, Error::CollectorUnavailable(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_without_records_skips_ledger() {
        let ledger = MemoryLedger::new();
        ledger.set_unavailable(true);
        let reconciler = Reconciler::new(
            Collector::new(Arc::new(ledger)),
            Arc::new(MemoryMarkerStore::new()),
        );

        let report = reconciler.reconcile(90.0).await.unwrap();
        assert_eq!(report, ReconcileReport::default());
    }
}

//! Quota threshold notifications
//!
//! A cycle reconciles existing records, collects quotas, selects breaches
//! that were not notified yet and dispatches them. Cycles must not overlap:
//! whoever schedules them has to hold a run lock.

mod collector;
mod dispatcher;
mod filter;
mod reconciler;

pub use collector::Collector;
pub use dispatcher::Dispatcher;
pub use filter::select_breaches;
pub use reconciler::Reconciler;

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::db::{MarkerStore, QuotaLedger};
use crate::error::{Error, Result};
use crate::feed::{DeliveryChannel, MessageTemplate};
use crate::models::{CycleReport, DispatchEntry, EntityKind, NotificationKey, ReconcileReport};

/// Breaches found and dispatched in one notify pass
#[derive(Debug, Clone, Default)]
pub struct NotifyPass {
    /// Quotas fetched from the ledger
    pub quotas_checked: usize,
    /// Quotas above the threshold
    pub breaches: usize,
    /// Breaches skipped because they were already notified
    pub suppressed: usize,
    /// Dispatch results
    pub dispatched: Vec<DispatchEntry>,
}

/// Collector, filter, dispatcher and reconciler wired together
#[derive(Clone)]
pub struct QuotaNotifier {
    collector: Collector,
    dispatcher: Dispatcher,
    reconciler: Reconciler,
    store: Arc<dyn MarkerStore>,
    threshold_percent: f64,
    entity_kinds: Vec<EntityKind>,
}

impl QuotaNotifier {
    /// Wire a notifier from configuration and its three collaborators
    pub fn new(
        config: &Config,
        ledger: Arc<dyn QuotaLedger>,
        store: Arc<dyn MarkerStore>,
        channel: Arc<dyn DeliveryChannel>,
    ) -> Self {
        let threshold_percent = config.notifier.threshold_percent;
        let collector = Collector::new(ledger);
        let dispatcher = Dispatcher::new(
            channel,
            Arc::clone(&store),
            MessageTemplate::new(&config.template),
            threshold_percent,
            config.feed.admin_user_id,
        )
        .with_max_concurrency(config.notifier.max_concurrency);
        let reconciler = Reconciler::new(collector.clone(), Arc::clone(&store));

        Self {
            collector,
            dispatcher,
            reconciler,
            store,
            threshold_percent,
            entity_kinds: config.notifier.entity_kinds.clone(),
        }
    }

    /// Threshold in effect
    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }

    /// Notify every unnotified breach
    pub async fn notify_breaches(&self) -> Result<NotifyPass> {
        let quotas = self.collector.fetch_quotas(&self.entity_kinds).await?;

        let already_notified: HashSet<NotificationKey> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .map(|r| r.key)
            .collect();

        let breaches = quotas
            .iter()
            .filter(|q| q.is_breach(self.threshold_percent))
            .count();
        let selected = select_breaches(&quotas, self.threshold_percent, &already_notified);

        info!(
            quotas = quotas.len(),
            breaches,
            to_notify = selected.len(),
            threshold = self.threshold_percent,
            "Selected quota breaches"
        );

        let suppressed = breaches - selected.len();
        let dispatched = self.dispatcher.dispatch(selected).await;

        Ok(NotifyPass {
            quotas_checked: quotas.len(),
            breaches,
            suppressed,
            dispatched,
        })
    }

    /// Clear records whose breach is over
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        self.reconciler.reconcile(self.threshold_percent).await
    }

    /// Reconcile, then notify; aborts if the ledger or record store is unreadable
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        async {
            info!("Starting quota notification cycle");

            let reconciled = self.reconcile().await?;
            let pass = self.notify_breaches().await?;

            let report = CycleReport {
                run_id,
                started_at,
                threshold_percent: self.threshold_percent,
                quotas_checked: pass.quotas_checked,
                breaches: pass.breaches,
                suppressed: pass.suppressed,
                dispatched: pass.dispatched,
                reconciled,
            };

            info!(
                notified = report.notified_count(),
                cleared = report.reconciled.cleared.len(),
                failures = report.failure_count(),
                "Quota notification cycle finished"
            );

            Ok::<_, Error>(report)
        }
        .instrument(info_span!("cycle", run_id = %run_id))
        .await
    }

    /// Run cycles every `every` until the returned future is dropped
    ///
    /// A failed cycle is logged and retried on the next tick.
    pub async fn watch<F>(&self, every: Duration, mut on_report: F)
    where
        F: FnMut(&CycleReport),
    {
        info!(interval = ?every, "Starting quota watch");

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.run_cycle().await {
                Ok(report) => on_report(&report),
                Err(e) => error!(error = %e, "Quota notification cycle failed"),
            }
        }
    }
}

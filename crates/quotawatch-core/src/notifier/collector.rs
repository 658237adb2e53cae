//! Quota collection

use std::sync::Arc;
use tracing::{debug, error};

use crate::db::QuotaLedger;
use crate::error::{Error, Result};
use crate::models::{EntityKind, QuotaRecord};

/// Reads a consistent snapshot of quotas from the ledger
#[derive(Clone)]
pub struct Collector {
    ledger: Arc<dyn QuotaLedger>,
}

impl Collector {
    /// Create a collector over a ledger
    pub fn new(ledger: Arc<dyn QuotaLedger>) -> Self {
        Self { ledger }
    }

    /// All quotas owned by entities of the given kinds
    pub async fn fetch_quotas(&self, kinds: &[EntityKind]) -> Result<Vec<QuotaRecord>> {
        let quotas = self.ledger.fetch_quotas(kinds).await.map_err(unavailable)?;
        debug!(count = quotas.len(), kinds = ?kinds, "Collected quotas");
        Ok(quotas)
    }

    /// Current state of specific quotas; missing ids are absent from the result
    pub async fn fetch_by_ids(&self, quota_ids: &[i64]) -> Result<Vec<QuotaRecord>> {
        self.ledger.fetch_by_ids(quota_ids).await.map_err(unavailable)
    }
}

fn unavailable(err: Error) -> Error {
    let err = match err {
        Error::CollectorUnavailable(_) => err,
        other => Error::collector(other.to_string()),
    };
    error!(error = %err, "Quota ledger unavailable");
    err
}

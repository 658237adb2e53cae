//! In-memory ledger and record store for tests and dry runs

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{MarkerStore, QuotaLedger};
use crate::error::{Error, Result};
use crate::models::{EntityKind, NotificationKey, NotificationRecord, QuotaRecord};

/// Ledger holding quotas in memory, keyed by quota id
#[derive(Clone, Default)]
pub struct MemoryLedger {
    quotas: Arc<Mutex<BTreeMap<i64, QuotaRecord>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a quota
    pub fn upsert(&self, quota: QuotaRecord) {
        self.quotas.lock().insert(quota.quota_id, quota);
    }

    /// Change the used bytes of an existing quota
    pub fn set_used(&self, quota_id: i64, used_bytes: u64) -> bool {
        match self.quotas.lock().get_mut(&quota_id) {
            Some(quota) => {
                quota.used_bytes = used_bytes;
                true
            }
            None => false,
        }
    }

    /// Remove a quota
    pub fn remove(&self, quota_id: i64) -> Option<QuotaRecord> {
        self.quotas.lock().remove(&quota_id)
    }

    /// Make every read fail, as if the ledger were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::collector("in-memory ledger marked unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl QuotaLedger for MemoryLedger {
    async fn fetch_quotas(&self, kinds: &[EntityKind]) -> Result<Vec<QuotaRecord>> {
        self.check_available()?;
        Ok(self
            .quotas
            .lock()
            .values()
            .filter(|q| kinds.contains(&q.entity_kind))
            .cloned()
            .collect())
    }

    async fn fetch_by_ids(&self, quota_ids: &[i64]) -> Result<Vec<QuotaRecord>> {
        self.check_available()?;
        let quotas = self.quotas.lock();
        Ok(quota_ids.iter().filter_map(|id| quotas.get(id).cloned()).collect())
    }
}

/// Record store holding markers in memory
#[derive(Clone, Default)]
pub struct MemoryMarkerStore {
    records: Arc<Mutex<BTreeMap<NotificationKey, NotificationRecord>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryMarkerStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `put` and `delete` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::record_store("in-memory store rejecting writes"));
        }
        Ok(())
    }
}

#[async_trait]
impl MarkerStore for MemoryMarkerStore {
    async fn exists(&self, key: &NotificationKey) -> Result<bool> {
        Ok(self.records.lock().contains_key(key))
    }

    async fn put(&self, record: &NotificationRecord) -> Result<bool> {
        self.check_writable()?;
        let mut records = self.records.lock();
        if records.contains_key(&record.key) {
            return Ok(false);
        }
        records.insert(record.key, record.clone());
        Ok(true)
    }

    async fn delete(&self, key: &NotificationKey) -> Result<bool> {
        self.check_writable()?;
        Ok(self.records.lock().remove(key).is_some())
    }

    async fn list_all(&self) -> Result<Vec<NotificationRecord>> {
        Ok(self.records.lock().values().cloned().collect())
    }
}

//! Storage collaborators for QuotaWatch
//!
//! The quota ledger is read from PostgreSQL, notification records live in
//! Redis. Both sit behind traits so the notifier can run against in-memory
//! fakes (`test-util` feature).

#[cfg(any(test, feature = "test-util"))]
mod memory;
mod postgres;
mod redis;

#[cfg(any(test, feature = "test-util"))]
pub use self::memory::{MemoryLedger, MemoryMarkerStore};
pub use self::postgres::{PostgresLedger, PostgresPool};
pub use self::redis::{RedisMarkerStore, RedisPool};

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{EntityKind, NotificationKey, NotificationRecord, NotificationState, QuotaRecord};

/// Read access to per-entity storage usage and limits
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// All quotas owned by entities of the given kinds
    async fn fetch_quotas(&self, kinds: &[EntityKind]) -> Result<Vec<QuotaRecord>>;

    /// Quotas with the given ids; ids that no longer exist are simply absent
    async fn fetch_by_ids(&self, quota_ids: &[i64]) -> Result<Vec<QuotaRecord>>;
}

/// Key-existence store for "already notified" markers
#[async_trait]
pub trait MarkerStore: Send + Sync {
    /// Whether a live record exists for `key`
    async fn exists(&self, key: &NotificationKey) -> Result<bool>;

    /// Insert a record unless one is already live; returns whether it was inserted
    async fn put(&self, record: &NotificationRecord) -> Result<bool>;

    /// Remove the record for `key`; returns whether one existed
    async fn delete(&self, key: &NotificationKey) -> Result<bool>;

    /// All live records
    async fn list_all(&self) -> Result<Vec<NotificationRecord>>;

    /// Lifecycle state of `key`
    async fn state(&self, key: &NotificationKey) -> Result<NotificationState> {
        Ok(NotificationState::from_exists(self.exists(key).await?))
    }
}

/// Database connections bundle
#[derive(Clone)]
pub struct Database {
    /// PostgreSQL connection pool (quota ledger)
    pub postgres: PostgresPool,
    /// Redis connection pool (notification records)
    pub redis: RedisPool,
}

impl Database {
    /// Create a new database connection bundle
    pub async fn new(config: &Config) -> Result<Self> {
        let postgres = PostgresPool::new(&config.database).await?;
        let redis = RedisPool::new(&config.redis)?;

        Ok(Self { postgres, redis })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        self.postgres.migrate().await
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        self.postgres.health_check().await?;
        self.redis.health_check().await?;
        Ok(())
    }

    /// Ledger backed by the PostgreSQL pool
    pub fn ledger(&self) -> PostgresLedger {
        PostgresLedger::new(&self.postgres)
    }

    /// Marker store backed by the Redis pool
    pub fn markers(&self, key_prefix: &str) -> RedisMarkerStore {
        RedisMarkerStore::new(&self.redis, key_prefix)
    }
}

/// Await `fut`, failing with `on_timeout` once `limit` has elapsed
pub(crate) async fn bounded<T, F>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce() -> Error,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

//! Redis connection and notification record store

use async_trait::async_trait;
use deadpool_redis::{Config as RedisConfig, Connection, Pool, PoolConfig, Runtime, Timeouts};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::{bounded, MarkerStore};
use crate::config::RedisConfig as AppRedisConfig;
use crate::error::{Error, Result};
use crate::models::{NotificationKey, NotificationRecord};

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool,
    command_timeout: Duration,
}

impl RedisPool {
    /// Create a new Redis connection pool
    ///
    /// Connections are opened lazily; opening, waiting for and recycling a
    /// connection are all bounded by `connect_timeout`.
    pub fn new(config: &AppRedisConfig) -> Result<Self> {
        let mut cfg = RedisConfig::from_url(&config.url);
        cfg.pool = Some(PoolConfig {
            timeouts: Timeouts {
                wait: Some(config.connect_timeout),
                create: Some(config.connect_timeout),
                recycle: Some(config.connect_timeout),
            },
            ..PoolConfig::default()
        });
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::config(format!("invalid redis configuration: {e}")))?;

        Ok(Self {
            pool,
            command_timeout: config.command_timeout,
        })
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        bounded(
            self.command_timeout,
            async {
                let mut conn = self
                    .pool
                    .get()
                    .await
                    .map_err(|e| Error::record_store(e.to_string()))?;
                let _: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok(())
            },
            || Error::record_store("PING timed out"),
        )
        .await
    }
}

/// Notification records kept in one Redis hash
///
/// Field is the key's text form, value is the JSON record. `HSETNX` keeps at
/// most one live record per key.
#[derive(Clone)]
pub struct RedisMarkerStore {
    pool: Pool,
    hash_key: String,
    command_timeout: Duration,
}

impl RedisMarkerStore {
    /// Create a store under `<key_prefix>:notified`
    pub fn new(pool: &RedisPool, key_prefix: &str) -> Self {
        Self {
            pool: pool.pool.clone(),
            hash_key: format!("{key_prefix}:notified"),
            command_timeout: pool.command_timeout,
        }
    }

    async fn conn(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::record_store(e.to_string()))
    }

    /// Run one command, connection checkout included, under the command timeout
    async fn timed<T>(&self, command: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.command_timeout;
        bounded(limit, fut, || {
            warn!(command, timeout = ?limit, "Record store command timed out");
            Error::record_store(format!(
                "{command} timed out after {}",
                humantime::format_duration(limit)
            ))
        })
        .await
    }
}

#[async_trait]
impl MarkerStore for RedisMarkerStore {
    async fn exists(&self, key: &NotificationKey) -> Result<bool> {
        self.timed("HEXISTS", async {
            let mut conn = self.conn().await?;
            conn.hexists(&self.hash_key, key.to_string())
                .await
                .map_err(|e| Error::record_store(e.to_string()))
        })
        .await
    }

    async fn put(&self, record: &NotificationRecord) -> Result<bool> {
        let value = serde_json::to_string(record)?;
        self.timed("HSETNX", async {
            let mut conn = self.conn().await?;
            conn.hset_nx(&self.hash_key, record.key.to_string(), value)
                .await
                .map_err(|e| Error::record_store(e.to_string()))
        })
        .await
    }

    async fn delete(&self, key: &NotificationKey) -> Result<bool> {
        let removed: i64 = self
            .timed("HDEL", async {
                let mut conn = self.conn().await?;
                conn.hdel(&self.hash_key, key.to_string())
                    .await
                    .map_err(|e| Error::record_store(e.to_string()))
            })
            .await?;
        Ok(removed > 0)
    }

    async fn list_all(&self) -> Result<Vec<NotificationRecord>> {
        let entries: HashMap<String, String> = self
            .timed("HGETALL", async {
                let mut conn = self.conn().await?;
                conn.hgetall(&self.hash_key)
                    .await
                    .map_err(|e| Error::record_store(e.to_string()))
            })
            .await?;

        let mut records: Vec<NotificationRecord> = entries
            .into_iter()
            .filter_map(|(field, value)| decode_entry(&field, &value))
            .collect();
        records.sort_by_key(|r| r.key);
        Ok(records)
    }
}

/// Decode one hash entry; the field is authoritative for the key
fn decode_entry(field: &str, value: &str) -> Option<NotificationRecord> {
    let key = match field.parse::<NotificationKey>() {
        Ok(key) => key,
        Err(e) => {
            warn!(field = %field, error = %e, "Ignoring unreadable notification record");
            return None;
        }
    };

    match serde_json::from_str::<NotificationRecord>(value) {
        Ok(mut record) => {
            record.key = key;
            Some(record)
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Notification record body unreadable, keeping key only");
            Some(NotificationRecord::bare(key))
        }
    }
}

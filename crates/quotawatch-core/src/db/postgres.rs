//! PostgreSQL quota ledger

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::{bounded, QuotaLedger};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::models::{EntityKind, QuotaRecord};

/// PostgreSQL connection pool
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
    query_timeout: Duration,
}

impl PostgresPool {
    /// Create a new PostgreSQL connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        Ok(Self {
            pool,
            query_timeout: config.query_timeout,
        })
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        bounded(
            self.query_timeout,
            async {
                sqlx::query("SELECT 1").execute(&self.pool).await?;
                Ok(())
            },
            || Error::collector("health check query timed out"),
        )
        .await
    }
}

/// Quota ledger reading the `quota_usage` view
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
    query_timeout: Duration,
}

impl PostgresLedger {
    /// Create a new ledger over an existing pool
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool.clone(),
            query_timeout: pool.query_timeout,
        }
    }

    /// Run a ledger query, connection acquisition included, under the query timeout
    async fn timed<T>(&self, query: impl Future<Output = sqlx::Result<T>>) -> Result<T> {
        let limit = self.query_timeout;
        bounded(
            limit,
            async { query.await.map_err(|e| Error::collector(e.to_string())) },
            || {
                Error::collector(format!(
                    "ledger query timed out after {}",
                    humantime::format_duration(limit)
                ))
            },
        )
        .await
    }
}

#[async_trait]
impl QuotaLedger for PostgresLedger {
    async fn fetch_quotas(&self, kinds: &[EntityKind]) -> Result<Vec<QuotaRecord>> {
        let kinds: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();

        let rows = self
            .timed(
                sqlx::query_as::<_, QuotaRow>(
                    r#"
                    SELECT quota_id, entity_id, entity_kind, display_name, used_bytes, limit_bytes
                    FROM quota_usage
                    WHERE entity_kind = ANY($1)
                    ORDER BY quota_id
                    "#,
                )
                .bind(&kinds)
                .fetch_all(&self.pool),
            )
            .await?;

        debug!(count = rows.len(), "Fetched quotas from ledger");
        Ok(rows.into_iter().filter_map(QuotaRow::into_record).collect())
    }

    async fn fetch_by_ids(&self, quota_ids: &[i64]) -> Result<Vec<QuotaRecord>> {
        if quota_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .timed(
                sqlx::query_as::<_, QuotaRow>(
                    r#"
                    SELECT quota_id, entity_id, entity_kind, display_name, used_bytes, limit_bytes
                    FROM quota_usage
                    WHERE quota_id = ANY($1)
                    ORDER BY quota_id
                    "#,
                )
                .bind(quota_ids)
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows.into_iter().filter_map(QuotaRow::into_record).collect())
    }
}

// Database row types for mapping

#[derive(sqlx::FromRow)]
struct QuotaRow {
    quota_id: i64,
    entity_id: i64,
    entity_kind: String,
    display_name: String,
    used_bytes: i64,
    limit_bytes: i64,
}

impl QuotaRow {
    fn into_record(self) -> Option<QuotaRecord> {
        let entity_kind = match self.entity_kind.parse::<EntityKind>() {
            Ok(kind) => kind,
            Err(_) => {
                warn!(
                    quota_id = self.quota_id,
                    entity_kind = %self.entity_kind,
                    "Skipping quota with unknown entity kind"
                );
                return None;
            }
        };

        Some(QuotaRecord {
            quota_id: self.quota_id,
            entity_id: self.entity_id,
            entity_kind,
            display_name: self.display_name,
            used_bytes: u64::try_from(self.used_bytes).unwrap_or(0),
            limit_bytes: u64::try_from(self.limit_bytes).unwrap_or(0),
        })
    }
}

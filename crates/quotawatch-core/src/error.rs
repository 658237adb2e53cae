//! Error types for QuotaWatch

use thiserror::Error;

/// Result type alias using QuotaWatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for QuotaWatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// The quota ledger could not be read; the cycle is aborted
    #[error("Quota ledger unavailable: {0}")]
    CollectorUnavailable(String),

    /// The delivery channel rejected or failed a notification
    #[error("Delivery failed: {0}")]
    DeliveryFailed(#[from] crate::feed::DeliveryError),

    /// The notification-record store failed a read or write
    #[error("Notification record store failed: {0}")]
    RecordStoreFailed(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Redis error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a collector error
    pub fn collector(msg: impl Into<String>) -> Self {
        Self::CollectorUnavailable(msg.into())
    }

    /// Create a record store error
    pub fn record_store(msg: impl Into<String>) -> Self {
        Self::RecordStoreFailed(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

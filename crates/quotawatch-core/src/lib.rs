//! # QuotaWatch
//!
//! Disk-quota threshold notifications for users and groups.
//!
//! QuotaWatch reads storage usage from a quota ledger, posts a notification
//! into the owner's activity feed when utilization crosses a threshold, and
//! remembers what it sent so each breach is announced once. When usage drops
//! back below the threshold the record is cleared and a later breach is
//! announced again.
//!
//! ## Architecture
//!
//! - **Collector**: reads usage/limit snapshots from the ledger (PostgreSQL)
//! - **Filter**: selects breaches that have not been notified
//! - **Dispatcher**: posts to the activity feed (HTTP) and records the send (Redis)
//! - **Reconciler**: clears records once a breach is over
//!
//! ## Quick Start
//!
//! ```bash
//! # Run one cycle (for cron)
//! quotawatch run
//!
//! # Keep running, one cycle per hour
//! quotawatch watch --interval 1h
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod models;
pub mod notifier;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::db::{Database, MarkerStore, QuotaLedger};
    pub use crate::error::{Error, Result};
    pub use crate::feed::{DeliveryChannel, FeedClient, RecipientSpec};
    pub use crate::models::*;
    pub use crate::notifier::QuotaNotifier;
}

//! Quota data models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Kind of organizational entity owning a storage quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A single user
    User,
    /// A workgroup
    Group,
}

impl EntityKind {
    /// Stable lowercase name used in storage and keys
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            other => Err(Error::validation(format!("unknown entity kind: {other}"))),
        }
    }
}

/// Usage and limit of one storage quota, as reported by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaRecord {
    /// Identifier of the quota (storage) record
    pub quota_id: i64,

    /// Identifier of the owning user or group
    pub entity_id: i64,

    /// Kind of the owning entity
    pub entity_kind: EntityKind,

    /// Human-readable name of the storage or its owner
    pub display_name: String,

    /// Bytes currently used
    pub used_bytes: u64,

    /// Bytes allowed
    pub limit_bytes: u64,
}

impl QuotaRecord {
    /// Utilization in percent; a zero limit counts as 0%
    pub fn utilization_percent(&self) -> f64 {
        if self.limit_bytes == 0 {
            return 0.0;
        }
        // scale before dividing so whole percentages come out exact
        self.used_bytes as f64 * 100.0 / self.limit_bytes as f64
    }

    /// Whether utilization strictly exceeds `threshold_percent`
    pub fn is_breach(&self, threshold_percent: f64) -> bool {
        self.utilization_percent() > threshold_percent
    }

    /// Deduplication key for notifications about this quota
    pub fn key(&self) -> super::NotificationKey {
        super::NotificationKey {
            quota_id: self.quota_id,
            entity_kind: self.entity_kind,
            entity_id: self.entity_id,
        }
    }
}

/// Format a byte count as decimal gigabytes, e.g. `95 GB` or `1.2346 GB`
pub fn format_gigabytes(bytes: u64) -> String {
    let gb = (bytes as f64 / 1e9 * 10_000.0).round() / 10_000.0;
    format!("{gb} GB")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn quota(used: u64, limit: u64) -> QuotaRecord {
        QuotaRecord {
            quota_id: 7,
            entity_id: 42,
            entity_kind: EntityKind::Group,
            display_name: "Design".to_string(),
            used_bytes: used,
            limit_bytes: limit,
        }
    }

    #[test]
    fn test_utilization_zero_limit() {
        assert_eq!(quota(500, 0).utilization_percent(), 0.0);
        assert!(!quota(500, 0).is_breach(0.0));
    }

    #[rstest]
    #[case(95, 100, 95.0)]
    #[case(0, 100, 0.0)]
    #[case(150, 100, 150.0)]
    #[case(1, 3, 100.0 / 3.0)]
    fn test_utilization_percent(#[case] used: u64, #[case] limit: u64, #[case] expected: f64) {
        assert!((quota(used, limit).utilization_percent() - expected).abs() < 1e-9);
    }

    #[rstest]
    #[case(95_000_000_000, "95 GB")]
    #[case(0, "0 GB")]
    #[case(1_234_567_890, "1.2346 GB")]
    #[case(500_000_000, "0.5 GB")]
    fn test_format_gigabytes(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_gigabytes(bytes), expected);
    }

    #[test]
    fn test_whole_percentages_are_exact() {
        // 7 / 100 * 100 would give 7.000000000000001
        assert_eq!(quota(7, 100).utilization_percent(), 7.0);
        assert!(!quota(7, 100).is_breach(7.0));
        assert_eq!(quota(57, 100).utilization_percent(), 57.0);
    }

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!("Group".parse::<EntityKind>().unwrap(), EntityKind::Group);
        assert_eq!("user".parse::<EntityKind>().unwrap(), EntityKind::User);
        assert!("department".parse::<EntityKind>().is_err());
    }
}

//! Breach selection

use std::collections::HashSet;

use crate::models::{NotificationKey, QuotaRecord};

/// Quotas strictly above `threshold_percent` that have not been notified yet
///
/// Pure: the result depends only on the arguments and keeps input order.
pub fn select_breaches(
    records: &[QuotaRecord],
    threshold_percent: f64,
    already_notified: &HashSet<NotificationKey>,
) -> Vec<QuotaRecord> {
    records
        .iter()
        .filter(|r| r.is_breach(threshold_percent) && !already_notified.contains(&r.key()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    const GB: u64 = 1_000_000_000;

    fn quota(id: i64, used: u64, limit: u64) -> QuotaRecord {
        QuotaRecord {
            quota_id: id,
            entity_id: 100 + id,
            entity_kind: EntityKind::Group,
            display_name: format!("group-{id}"),
            used_bytes: used,
            limit_bytes: limit,
        }
    }

    #[rstest]
    #[case::below(89, false)]
    #[case::exactly_at(90, false)]
    #[case::above(91, true)]
    #[case::full(100, true)]
    #[case::over_limit(120, true)]
    fn test_threshold_boundary(#[case] used: u64, #[case] selected: bool) {
        let records = vec![quota(1, used * GB, 100 * GB)];
        let breaches = select_breaches(&records, 90.0, &HashSet::new());
        assert_eq!(breaches.len() == 1, selected);
    }

    #[test]
    fn test_epsilon_around_threshold() {
        // 90 GB + 1 byte of 100 GB is the smallest step above 90%
        let just_above = quota(1, 90 * GB + 1, 100 * GB);
        let just_below = quota(2, 90 * GB - 1, 100 * GB);
        let exact = quota(3, 90 * GB, 100 * GB);
        let records = vec![just_above.clone(), just_below, exact];

        let breaches = select_breaches(&records, 90.0, &HashSet::new());
        assert_eq!(breaches, vec![just_above]);
    }

    #[test]
    fn test_fractional_threshold() {
        let records = vec![quota(1, 905, 1000), quota(2, 904, 1000)];
        let breaches = select_breaches(&records, 90.45, &HashSet::new());
        assert_eq!(breaches.iter().map(|q| q.quota_id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_zero_limit_never_breaches() {
        let records = vec![quota(1, 50 * GB, 0)];
        assert!(select_breaches(&records, 0.0, &HashSet::new()).is_empty());
    }

    #[test]
    fn test_already_notified_is_excluded() {
        let notified = quota(1, 95 * GB, 100 * GB);
        let fresh = quota(2, 95 * GB, 100 * GB);
        let already: HashSet<_> = [notified.key()].into_iter().collect();

        let breaches = select_breaches(&[notified, fresh.clone()], 90.0, &already);
        assert_eq!(breaches, vec![fresh]);
    }

    #[test]
    fn test_key_includes_entity() {
        // same quota, different owner: not the same notification
        let mut moved = quota(1, 95 * GB, 100 * GB);
        let already: HashSet<_> = [moved.key()].into_iter().collect();
        moved.entity_id += 1;

        assert_eq!(select_breaches(&[moved.clone()], 90.0, &already), vec![moved]);
    }

    fn arb_quota() -> impl Strategy<Value = QuotaRecord> {
        (0i64..20, 0u64..2_000, 0u64..2_000, prop::bool::ANY).prop_map(|(id, used, limit, group)| {
            QuotaRecord {
                quota_id: id,
                entity_id: id,
                entity_kind: if group { EntityKind::Group } else { EntityKind::User },
                display_name: String::new(),
                used_bytes: used,
                limit_bytes: limit,
            }
        })
    }

    proptest! {
        #[test]
        fn prop_selection_matches_definition(
            records in prop::collection::vec(arb_quota(), 0..40),
            threshold in 0.0f64..=100.0,
            notified_ids in prop::collection::hash_set(0i64..20, 0..10),
        ) {
            let already: HashSet<NotificationKey> = records
                .iter()
                .filter(|r| notified_ids.contains(&r.quota_id))
                .map(QuotaRecord::key)
                .collect();

            let breaches = select_breaches(&records, threshold, &already);
            let expected: Vec<QuotaRecord> = records
                .iter()
                .filter(|r| {
                    r.limit_bytes > 0
                        && r.used_bytes as f64 * 100.0 / r.limit_bytes as f64 > threshold
                        && !already.contains(&r.key())
                })
                .cloned()
                .collect();

            prop_assert_eq!(breaches, expected);
        }

        #[test]
        fn prop_selection_is_idempotent(
            records in prop::collection::vec(arb_quota(), 0..40),
            threshold in 0.0f64..=100.0,
        ) {
            let already = HashSet::new();
            let first = select_breaches(&records, threshold, &already);
            let second = select_breaches(&records, threshold, &already);
            prop_assert_eq!(&first, &second);

            // feeding the result back in selects the same set again
            let again = select_breaches(&first, threshold, &already);
            prop_assert_eq!(first, again);
        }
    }
}

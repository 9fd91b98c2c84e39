//! Store-independent pieces of membership reconciliation.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One `contact_in_group` row, in bulk-load column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipRow {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub group_id: Uuid,
    pub contact_id: Uuid,
}

impl MembershipRow {
    /// Rows for attaching `contact_ids` to `group_id`, all stamped with the
    /// same `now` for both timestamps.
    pub fn stamped(group_id: Uuid, contact_ids: &[Uuid], now: DateTime<Utc>) -> Vec<Self> {
        contact_ids
            .iter()
            .map(|&contact_id| Self {
                created_at: now,
                updated_at: now,
                group_id,
                contact_id,
            })
            .collect()
    }
}

/// Maps every candidate to whether it is already a member.
///
/// Members found by the store are marked first, then every candidate not
/// found is back-filled as absent. IDs in `existing` that were not asked
/// about are ignored.
pub fn existence_map(candidates: &[Uuid], existing: &[Uuid]) -> HashMap<Uuid, bool> {
    let asked: HashSet<&Uuid> = candidates.iter().collect();
    let mut exists: HashMap<Uuid, bool> = existing
        .iter()
        .filter(|id| asked.contains(id))
        .map(|&id| (id, true))
        .collect();
    for &id in candidates {
        exists.entry(id).or_insert(false);
    }
    exists
}

/// Candidates that are not yet members: the set difference
/// `candidates - existing`, in first-occurrence order with repeats dropped.
pub fn missing_members(candidates: &[Uuid], exists: &HashMap<Uuid, bool>) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(candidates.len());
    candidates
        .iter()
        .copied()
        .filter(|id| !exists.get(id).copied().unwrap_or(false))
        .filter(|id| seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn existence_map_covers_every_candidate_once() {
        let candidates = ids(5);
        let existing = vec![candidates[1], candidates[3]];

        let exists = existence_map(&candidates, &existing);

        assert_eq!(exists.len(), candidates.len());
        for (i, id) in candidates.iter().enumerate() {
            assert_eq!(exists[id], i == 1 || i == 3, "candidate {i}");
        }
    }

    #[test]
    fn existence_map_ignores_unrequested_rows() {
        let candidates = ids(2);
        let stranger = Uuid::new_v4();

        let exists = existence_map(&candidates, &[stranger, candidates[0]]);

        assert_eq!(exists.len(), 2);
        assert!(!exists.contains_key(&stranger));
        assert!(exists[&candidates[0]]);
    }

    #[test]
    fn existence_map_of_nothing_is_empty() {
        assert!(existence_map(&[], &[]).is_empty());
    }

    #[test]
    fn missing_members_is_set_difference() {
        // group has {A, B}; candidates [B, C]
        let [a, b, c]: [Uuid; 3] = ids(3).try_into().unwrap();
        let candidates = vec![b, c];
        let exists = existence_map(&candidates, &[a, b]);

        assert_eq!(missing_members(&candidates, &exists), vec![c]);
    }

    #[test]
    fn missing_members_keeps_order_and_drops_repeats() {
        let [a, b, c]: [Uuid; 3] = ids(3).try_into().unwrap();
        let candidates = vec![c, a, c, b, a];
        let exists = existence_map(&candidates, &[b]);

        assert_eq!(missing_members(&candidates, &exists), vec![c, a]);
    }

    #[test]
    fn missing_members_empty_when_all_attached() {
        let candidates = ids(3);
        let exists = existence_map(&candidates, &candidates);

        assert!(missing_members(&candidates, &exists).is_empty());
    }

    #[test]
    fn stamped_rows_share_one_timestamp() {
        let group = Uuid::new_v4();
        let contacts = ids(3);
        let now = Utc::now();

        let rows = MembershipRow::stamped(group, &contacts, now);

        assert_eq!(rows.len(), 3);
        assert!(rows
            .iter()
            .all(|r| r.created_at == now && r.updated_at == now && r.group_id == group));
        let attached: Vec<Uuid> = rows.iter().map(|r| r.contact_id).collect();
        assert_eq!(attached, contacts);
    }
}

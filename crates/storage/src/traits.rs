//! Storage trait and key ranges

use std::ops::Bound;

use labcore_core::{LabError, LabResult};

use crate::record::{Family, RecordKey, VersionedRecord};

/// Range of keys inside a single family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Lower bound
    pub start: Bound<RecordKey>,
    /// Upper bound
    pub end: Bound<RecordKey>,
}

impl KeyRange {
    /// `[start, end]`
    pub fn inclusive(start: RecordKey, end: RecordKey) -> Self {
        KeyRange {
            start: Bound::Included(start),
            end: Bound::Included(end),
        }
    }

    /// Same range, resuming strictly after `key` (cursor continuation)
    pub fn after(mut self, key: RecordKey) -> Self {
        self.start = Bound::Excluded(key);
        self
    }

    /// Family both bounds belong to
    pub fn family(&self) -> LabResult<Family> {
        let family_of = |b: &Bound<RecordKey>| match b {
            Bound::Included(k) | Bound::Excluded(k) => Some(k.family()),
            Bound::Unbounded => None,
        };
        match (family_of(&self.start), family_of(&self.end)) {
            (Some(a), Some(b)) if a == b => Ok(a),
            (Some(a), None) | (None, Some(a)) => Ok(a),
            (Some(_), Some(_)) => Err(LabError::invalid_input(
                "Key range bounds belong to different families",
            )),
            (None, None) => Err(LabError::invalid_input(
                "Key range must name at least one bound",
            )),
        }
    }

    /// Whether no key can fall inside the range
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Bound::Included(s), Bound::Included(e)) => s > e,
            (Bound::Included(s), Bound::Excluded(e))
            | (Bound::Excluded(s), Bound::Included(e))
            | (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
            _ => false,
        }
    }

    /// Bounds as a tuple usable with `BTreeMap::range`
    pub fn bounds(&self) -> (Bound<&RecordKey>, Bound<&RecordKey>) {
        (self.start.as_ref(), self.end.as_ref())
    }
}

/// Versioned record storage
///
/// Implementations must be safe to share across threads. Versions are
/// assigned by the committer; a missing key reads as version 0.
pub trait Storage: Send + Sync {
    /// Latest committed record for `key`
    fn get(&self, key: &RecordKey) -> LabResult<Option<VersionedRecord>>;

    /// Up to `limit` records in key order within `range`
    fn scan(&self, range: &KeyRange, limit: usize) -> LabResult<Vec<(RecordKey, VersionedRecord)>>;

    /// Version of the last applied commit
    fn current_version(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use labcore_core::{EntityId, RelationshipId};

    #[test]
    fn test_range_family() {
        let range = KeyRange::inclusive(
            RecordKey::Entity(EntityId::min()),
            RecordKey::Entity(EntityId::max()),
        );
        assert_eq!(range.family().unwrap(), Family::Entity);
    }

    #[test]
    fn test_range_mixed_family_rejected() {
        let range = KeyRange::inclusive(
            RecordKey::Entity(EntityId::min()),
            RecordKey::Relationship(RelationshipId::max()),
        );
        assert!(range.family().is_err());
    }

    #[test]
    fn test_after_sets_exclusive_start() {
        let key = RecordKey::Entity(EntityId::new());
        let range = KeyRange::inclusive(
            RecordKey::Entity(EntityId::min()),
            RecordKey::Entity(EntityId::max()),
        )
        .after(key.clone());
        assert_eq!(range.start, Bound::Excluded(key));
    }
}

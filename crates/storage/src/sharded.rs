//! Sharded record storage
//!
//! One shard per record family, each an ordered BTreeMap so family-local
//! prefixes (adjacency of an entity, members of a tenant, versions of a
//! schema) can be range-scanned.
//!
//! # Design
//!
//! - DashMap: families never contend with each other
//! - BTreeMap: ordered keys for range scans and cursor continuation
//! - AtomicU64: global commit version for optimistic validation

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use labcore_core::LabResult;

use crate::record::{Family, Record, RecordKey, VersionedRecord};
use crate::traits::{KeyRange, Storage};

/// Per-family shard
#[derive(Debug, Default)]
pub struct Shard {
    pub(crate) data: BTreeMap<RecordKey, VersionedRecord>,
}

impl Shard {
    /// Create a new empty shard
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in this shard
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if shard is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Sharded storage - DashMap by family, BTreeMap within
///
/// # Thread Safety
///
/// All operations are thread-safe. Writes lock only the target family's
/// shard. Atomicity across families is the committer's job: it applies a
/// batch while holding the database's visibility gate.
pub struct ShardedStore {
    shards: DashMap<Family, Shard>,
    version: AtomicU64,
}

impl ShardedStore {
    /// Create new sharded store
    pub fn new() -> Self {
        Self {
            shards: DashMap::new(),
            version: AtomicU64::new(0),
        }
    }

    /// Get current version
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Set version (used during recovery and commit)
    pub fn set_version(&self, version: u64) {
        self.version.store(version, Ordering::Release);
    }

    /// Number of non-empty shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total number of records across all families
    pub fn total_entries(&self) -> usize {
        self.shards.iter().map(|entry| entry.value().len()).sum()
    }

    /// Number of records in one family
    pub fn family_len(&self, family: Family) -> usize {
        self.shards.get(&family).map(|s| s.len()).unwrap_or(0)
    }

    // ========================================================================
    // Get/Put/Delete
    // ========================================================================

    /// Get a record by key
    #[inline]
    pub fn get(&self, key: &RecordKey) -> Option<VersionedRecord> {
        self.shards
            .get(&key.family())
            .and_then(|shard| shard.data.get(key).cloned())
    }

    /// Put a record
    #[inline]
    pub fn put(&self, key: RecordKey, value: VersionedRecord) {
        self.shards
            .entry(key.family())
            .or_insert_with(Shard::new)
            .data
            .insert(key, value);
    }

    /// Delete a key, returning the removed record if it existed
    #[inline]
    pub fn delete(&self, key: &RecordKey) -> Option<VersionedRecord> {
        self.shards
            .get_mut(&key.family())
            .and_then(|mut shard| shard.data.remove(key))
    }

    /// Check if a key exists
    #[inline]
    pub fn contains(&self, key: &RecordKey) -> bool {
        self.shards
            .get(&key.family())
            .map(|shard| shard.data.contains_key(key))
            .unwrap_or(false)
    }

    /// Up to `limit` records in key order within `range`
    pub fn range(&self, range: &KeyRange, limit: usize) -> LabResult<Vec<(RecordKey, VersionedRecord)>> {
        let family = range.family()?;
        if range.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .shards
            .get(&family)
            .map(|shard| {
                shard
                    .data
                    .range(range.bounds())
                    .take(limit)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Apply a batch of writes and deletes with one version
    pub fn apply_batch(&self, writes: &[(RecordKey, Record)], deletes: &[RecordKey], version: u64) {
        for (key, record) in writes {
            self.put(
                key.clone(),
                VersionedRecord {
                    record: record.clone(),
                    version,
                },
            );
        }

        for key in deletes {
            self.delete(key);
        }
    }
}

impl Default for ShardedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for ShardedStore {
    fn get(&self, key: &RecordKey) -> LabResult<Option<VersionedRecord>> {
        Ok(ShardedStore::get(self, key))
    }

    fn scan(&self, range: &KeyRange, limit: usize) -> LabResult<Vec<(RecordKey, VersionedRecord)>> {
        self.range(range, limit)
    }

    fn current_version(&self) -> u64 {
        self.version()
    }
}

impl std::fmt::Debug for ShardedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedStore")
            .field("shard_count", &self.shard_count())
            .field("version", &self.version())
            .field("total_entries", &self.total_entries())
            .finish()
    }
}

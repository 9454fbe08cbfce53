//! Transaction context
//!
//! Buffers the reads, writes and event drafts of one logical operation.
//! Nothing reaches storage until the committer validates the read and CAS
//! sets and applies the batch.
//!
//! Reads see the transaction's own buffered writes first. Tracked reads
//! record the version they observed; untracked reads do not, which gives
//! last-writer-wins for callers that want it.

use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeBounds;

use labcore_core::{EventDraft, LabResult};
use labcore_storage::{KeyRange, Record, RecordKey, Storage};

/// Expected version of a key at commit time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasCheck {
    /// Key to check
    pub key: RecordKey,
    /// Version the caller expects (0 = must not exist)
    pub expected_version: u64,
}

/// Everything a transaction produced, ready for validation and apply
#[derive(Debug, Default)]
pub struct CommitBatch {
    /// Keys read with the version observed
    pub read_set: FxHashMap<RecordKey, u64>,
    /// Explicit version expectations
    pub cas_set: Vec<CasCheck>,
    /// Records to write, in key order
    pub writes: Vec<(RecordKey, Record)>,
    /// Keys to delete
    pub deletes: Vec<RecordKey>,
    /// Events to append in the same commit
    pub events: Vec<EventDraft>,
}

impl CommitBatch {
    /// Batch carrying only events
    pub fn events_only(events: Vec<EventDraft>) -> Self {
        CommitBatch {
            events,
            ..Default::default()
        }
    }

    /// Whether any record is written or deleted
    pub fn has_record_changes(&self) -> bool {
        !self.writes.is_empty() || !self.deletes.is_empty()
    }
}

/// Per-operation transaction state
pub struct TransactionContext<'a, S: Storage> {
    store: &'a S,
    start_version: u64,
    read_set: FxHashMap<RecordKey, u64>,
    cas_set: Vec<CasCheck>,
    writes: BTreeMap<RecordKey, Record>,
    deletes: BTreeSet<RecordKey>,
    events: Vec<EventDraft>,
}

impl<'a, S: Storage> TransactionContext<'a, S> {
    /// Start a transaction against `store`
    pub fn new(store: &'a S) -> Self {
        TransactionContext {
            store,
            start_version: store.current_version(),
            read_set: FxHashMap::default(),
            cas_set: Vec::new(),
            writes: BTreeMap::new(),
            deletes: BTreeSet::new(),
            events: Vec::new(),
        }
    }

    /// Store version when the transaction started
    pub fn start_version(&self) -> u64 {
        self.start_version
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Tracked read: a concurrent commit to `key` makes this transaction conflict
    pub fn get(&mut self, key: &RecordKey) -> LabResult<Option<Record>> {
        if let Some(buffered) = self.buffered(key) {
            return Ok(buffered);
        }
        let current = self.store.get(key)?;
        let version = current.as_ref().map(|v| v.version).unwrap_or(0);
        self.read_set.entry(key.clone()).or_insert(version);
        Ok(current.map(|v| v.record))
    }

    /// Untracked read: never causes a conflict
    pub fn get_untracked(&self, key: &RecordKey) -> LabResult<Option<Record>> {
        if let Some(buffered) = self.buffered(key) {
            return Ok(buffered);
        }
        Ok(self.store.get(key)?.map(|v| v.record))
    }

    /// Tracked read of a key's committed version (0 when absent)
    pub fn version_of(&mut self, key: &RecordKey) -> LabResult<u64> {
        let version = self.store.get(key)?.map(|v| v.version).unwrap_or(0);
        self.read_set.entry(key.clone()).or_insert(version);
        Ok(version)
    }

    /// Untracked range read, overlaid with this transaction's own writes
    pub fn scan(&self, range: &KeyRange) -> LabResult<Vec<(RecordKey, Record)>> {
        let mut merged: BTreeMap<RecordKey, Record> = self
            .store
            .scan(range, usize::MAX)?
            .into_iter()
            .map(|(k, v)| (k, v.record))
            .collect();
        for key in &self.deletes {
            merged.remove(key);
        }
        let bounds = range.bounds();
        for (key, record) in &self.writes {
            if bounds.contains(key) {
                merged.insert(key.clone(), record.clone());
            }
        }
        Ok(merged.into_iter().collect())
    }

    fn buffered(&self, key: &RecordKey) -> Option<Option<Record>> {
        if self.deletes.contains(key) {
            return Some(None);
        }
        self.writes.get(key).map(|r| Some(r.clone()))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Buffer a write
    pub fn put(&mut self, key: RecordKey, record: Record) {
        self.deletes.remove(&key);
        self.writes.insert(key, record);
    }

    /// Buffer a delete
    pub fn delete(&mut self, key: RecordKey) {
        self.writes.remove(&key);
        self.deletes.insert(key);
    }

    /// Require `key` to be at `expected_version` at commit time
    pub fn expect_version(&mut self, key: RecordKey, expected_version: u64) {
        self.cas_set.push(CasCheck {
            key,
            expected_version,
        });
    }

    /// Compare-and-swap write
    pub fn cas(&mut self, key: RecordKey, expected_version: u64, record: Record) {
        self.expect_version(key.clone(), expected_version);
        self.put(key, record);
    }

    /// Append an event in the same commit as the buffered writes
    pub fn append_event(&mut self, draft: EventDraft) {
        self.events.push(draft);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Whether the transaction would change nothing
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
            && self.deletes.is_empty()
            && self.events.is_empty()
            && self.cas_set.is_empty()
    }

    /// Keys read so far with the versions observed
    pub fn read_set(&self) -> &FxHashMap<RecordKey, u64> {
        &self.read_set
    }

    /// Number of buffered writes and deletes
    pub fn pending_changes(&self) -> usize {
        self.writes.len() + self.deletes.len()
    }

    /// Buffered event drafts
    pub fn pending_events(&self) -> &[EventDraft] {
        &self.events
    }

    /// Finish the transaction, yielding the batch to commit
    pub fn into_batch(self) -> CommitBatch {
        CommitBatch {
            read_set: self.read_set,
            cas_set: self.cas_set,
            writes: self.writes.into_iter().collect(),
            deletes: self.deletes.into_iter().collect(),
            events: self.events,
        }
    }
}

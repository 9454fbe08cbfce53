//! Time-partitioned event storage
//!
//! Events are grouped into fixed windows keyed by
//! `floor(timestamp / window)`. Each partition keeps its events ordered by
//! `(timestamp, id)`. Windows are disjoint and walked in key order, so a
//! scan across partitions is already time-ordered.
//!
//! # Concurrency
//!
//! - The partition map sits behind an RwLock; inserts into an existing
//!   partition hold the map's read lock while they take that partition's
//!   lock, so an insert and a retention drop never interleave
//! - Retention detaches whole partitions one at a time under the map's
//!   write lock; rows newer than the logged cutoff's id watermark are kept
//! - Ids come from an atomic counter and strictly increase

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use labcore_core::{Event, EventId, LabError, LabResult, TimeRange, Timestamp};

/// Partition key: window index since the epoch
pub type PartitionKey = i64;

/// Position of an event inside the log
pub type EventPosition = (Timestamp, EventId);

/// Events of one time window
#[derive(Debug, Default)]
pub struct Partition {
    events: BTreeMap<EventPosition, Event>,
    /// Upper bound on the ids held
    max_id: EventId,
}

impl Partition {
    /// Number of events in the partition
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the partition holds no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Append-only, time-partitioned event storage
pub struct PartitionedLog {
    window_micros: i64,
    partitions: RwLock<BTreeMap<PartitionKey, Arc<RwLock<Partition>>>>,
    last_id: AtomicU64,
    len: AtomicUsize,
}

impl PartitionedLog {
    /// Create a log with the given partition window
    pub fn new(window: Duration) -> LabResult<Self> {
        let window_micros = i64::try_from(window.as_micros())
            .map_err(|_| LabError::invalid_config("partition window is too large"))?;
        if window_micros <= 0 {
            return Err(LabError::invalid_config("partition window must be positive"));
        }
        Ok(PartitionedLog {
            window_micros,
            partitions: RwLock::new(BTreeMap::new()),
            last_id: AtomicU64::new(0),
            len: AtomicUsize::new(0),
        })
    }

    /// Partition a timestamp falls into
    #[inline]
    pub fn partition_key(&self, ts: Timestamp) -> PartitionKey {
        ts.as_micros().div_euclid(self.window_micros)
    }

    /// First instant of a partition
    pub fn partition_start(&self, key: PartitionKey) -> Timestamp {
        Timestamp::from_micros(key.saturating_mul(self.window_micros))
    }

    // ========================================================================
    // Ids
    // ========================================================================

    /// Allocate the next event id
    #[inline]
    pub fn allocate_id(&self) -> EventId {
        EventId::new(self.last_id.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Last allocated id (0 when none)
    pub fn last_id(&self) -> EventId {
        EventId::new(self.last_id.load(Ordering::Acquire))
    }

    /// Raise the id counter to at least `id` (recovery)
    pub fn observe_id(&self, id: EventId) {
        self.last_id.fetch_max(id.as_u64(), Ordering::AcqRel);
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert one event into its partition
    ///
    /// The map lock is held until the event is in place, so retention
    /// cannot detach the partition in between.
    pub fn insert(&self, event: Event) {
        let key = self.partition_key(event.timestamp);
        {
            let map = self.partitions.read();
            if let Some(partition) = map.get(&key) {
                self.insert_into(&mut partition.write(), event);
                return;
            }
        }
        let mut map = self.partitions.write();
        let partition = map.entry(key).or_default();
        self.insert_into(&mut partition.write(), event);
    }

    /// Insert several events
    pub fn insert_batch(&self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.insert(event);
        }
    }

    fn insert_into(&self, partition: &mut Partition, event: Event) {
        partition.max_id = partition.max_id.max(event.id);
        if partition
            .events
            .insert((event.timestamp, event.id), event)
            .is_none()
        {
            self.len.fetch_add(1, Ordering::AcqRel);
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Total events held
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Whether the log holds no events
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live partitions
    pub fn partition_count(&self) -> usize {
        self.partitions.read().len()
    }

    /// Keys of live partitions, oldest first
    pub fn partition_keys(&self) -> Vec<PartitionKey> {
        self.partitions.read().keys().copied().collect()
    }

    /// Timestamp of the oldest event held
    pub fn earliest_timestamp(&self) -> Option<Timestamp> {
        let partitions: Vec<_> = self.partitions.read().values().cloned().collect();
        partitions
            .into_iter()
            .find_map(|p| p.read().events.keys().next().map(|(ts, _)| *ts))
    }

    /// Look up an event by id
    ///
    /// Ids are not indexed; this walks partitions newest first.
    pub fn get(&self, id: EventId) -> Option<Event> {
        let partitions: Vec<_> = self.partitions.read().values().rev().cloned().collect();
        partitions.into_iter().find_map(|p| {
            p.read()
                .events
                .values()
                .find(|e| e.id == id)
                .cloned()
        })
    }

    /// Up to `limit` events in `(timestamp, id)` order
    ///
    /// Only partitions overlapping `range` are visited. `after` resumes
    /// strictly after a previously returned position. `filter` is applied
    /// before the limit.
    pub fn scan<F>(
        &self,
        range: &TimeRange,
        after: Option<EventPosition>,
        limit: usize,
        filter: F,
    ) -> Vec<Event>
    where
        F: Fn(&Event) -> bool,
    {
        let mut out = Vec::new();
        if range.is_empty() || limit == 0 {
            return out;
        }

        let lower = match after {
            Some((ts, _)) => ts.max(range.lower()),
            None => range.lower(),
        };
        let first_key = self.partition_key(lower);
        let last_key = range.end.map(|end| self.partition_key(end));

        let partitions: Vec<_> = {
            let map = self.partitions.read();
            map.range(first_key..)
                .take_while(|(k, _)| last_key.map_or(true, |last| **k <= last))
                .map(|(_, p)| Arc::clone(p))
                .collect()
        };

        for partition in partitions {
            let guard = partition.read();
            let iter = match after {
                Some(pos) => guard
                    .events
                    .range((std::ops::Bound::Excluded(pos), std::ops::Bound::Unbounded)),
                None => guard
                    .events
                    .range((std::ops::Bound::Included((lower, EventId::MIN)), std::ops::Bound::Unbounded)),
            };
            for (_, event) in iter {
                if range.end.map_or(false, |end| event.timestamp >= end) {
                    return out;
                }
                if !range.contains(event.timestamp) || !filter(event) {
                    continue;
                }
                out.push(event.clone());
                if out.len() >= limit {
                    return out;
                }
            }
        }
        out
    }

    // ========================================================================
    // Retention
    // ========================================================================

    /// Keys of live partitions lying entirely before `boundary`, oldest first
    pub fn partition_keys_before(&self, boundary: PartitionKey) -> Vec<PartitionKey> {
        self.partitions
            .read()
            .range(..boundary)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Drop the events of partition `key` whose id is at most `through`
    ///
    /// A partition holding nothing newer than `through` is detached whole.
    /// Otherwise only the older rows go and the partition stays mapped,
    /// which happens when a backfilled event lands after the cutoff was
    /// logged. One partition per call, so callers can check for
    /// cancellation between partitions.
    pub fn drop_partition(&self, key: PartitionKey, through: EventId) -> PartitionDrop {
        let mut map = self.partitions.write();
        let Some(partition) = map.get(&key).map(Arc::clone) else {
            return PartitionDrop::default();
        };
        let mut guard = partition.write();

        let dropped = if guard.max_id <= through {
            let events = guard.len();
            drop(guard);
            map.remove(&key);
            PartitionDrop {
                events,
                detached: true,
            }
        } else {
            let before = guard.len();
            guard.events.retain(|_, e| e.id > through);
            PartitionDrop {
                events: before - guard.len(),
                detached: false,
            }
        };
        self.len.fetch_sub(dropped.events, Ordering::AcqRel);
        dropped
    }

    /// Remove events older than `cutoff`, with id at most `through`, from
    /// the partition holding `cutoff`
    ///
    /// Uses an ordered split at the cutoff position, not a row scan.
    pub fn trim_partition(&self, cutoff: Timestamp, through: EventId) -> usize {
        let key = self.partition_key(cutoff);
        let partition = match self.partitions.read().get(&key) {
            Some(p) => Arc::clone(p),
            None => return 0,
        };
        let mut guard = partition.write();
        let mut keep = guard.events.split_off(&(cutoff, EventId::MIN));
        let older = std::mem::take(&mut guard.events);
        let mut removed = 0;
        for (pos, event) in older {
            if event.id > through {
                keep.insert(pos, event);
            } else {
                removed += 1;
            }
        }
        guard.events = keep;
        drop(guard);
        self.len.fetch_sub(removed, Ordering::AcqRel);
        removed
    }

    /// Drop everything older than `cutoff` in one go (recovery replay)
    ///
    /// Every event present was committed before the cutoff was logged.
    pub fn prune_before(&self, cutoff: Timestamp) -> usize {
        let through = self.last_id();
        let mut removed = 0;
        for key in self.partition_keys_before(self.partition_key(cutoff)) {
            removed += self.drop_partition(key, through).events;
        }
        removed + self.trim_partition(cutoff, through)
    }
}

/// What [`PartitionedLog::drop_partition`] removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionDrop {
    /// Events removed
    pub events: usize,
    /// Whether the whole partition was detached
    pub detached: bool,
}

impl std::fmt::Debug for PartitionedLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedLog")
            .field("window_micros", &self.window_micros)
            .field("partitions", &self.partition_count())
            .field("len", &self.len())
            .field("last_id", &self.last_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labcore_core::EventDraft;

    const HOUR: i64 = 3600;

    fn log() -> PartitionedLog {
        PartitionedLog::new(Duration::from_secs(HOUR as u64)).unwrap()
    }

    fn append(log: &PartitionedLog, secs: i64, event_type: &str) -> Event {
        let event = EventDraft::new(event_type)
            .at(Timestamp::from_secs(secs))
            .into_event(log.allocate_id(), Timestamp::now());
        log.insert(event.clone());
        event
    }

    fn all(log: &PartitionedLog) -> Vec<Event> {
        log.scan(&TimeRange::all(), None, usize::MAX, |_| true)
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(PartitionedLog::new(Duration::ZERO).is_err());
    }

    #[test]
    fn test_partition_key_floor() {
        let log = log();
        assert_eq!(log.partition_key(Timestamp::from_secs(0)), 0);
        assert_eq!(log.partition_key(Timestamp::from_secs(HOUR - 1)), 0);
        assert_eq!(log.partition_key(Timestamp::from_secs(HOUR)), 1);
        assert_eq!(log.partition_key(Timestamp::from_secs(-1)), -1);
        assert_eq!(log.partition_start(2), Timestamp::from_secs(2 * HOUR));
    }

    #[test]
    fn test_ids_strictly_increase() {
        let log = log();
        let a = log.allocate_id();
        let b = log.allocate_id();
        assert_eq!(a, EventId::new(1));
        assert!(b > a);
        log.observe_id(EventId::new(50));
        assert_eq!(log.allocate_id(), EventId::new(51));
        log.observe_id(EventId::new(10));
        assert_eq!(log.last_id(), EventId::new(51));
    }

    #[test]
    fn test_insert_groups_by_window() {
        let log = log();
        append(&log, 10, "a");
        append(&log, 20, "b");
        append(&log, HOUR + 5, "c");
        append(&log, 5 * HOUR, "d");
        assert_eq!(log.len(), 4);
        assert_eq!(log.partition_keys(), vec![0, 1, 5]);
    }

    #[test]
    fn test_scan_is_time_ordered_across_partitions() {
        let log = log();
        append(&log, 3 * HOUR, "late");
        append(&log, 10, "early");
        append(&log, HOUR + 1, "middle");
        let types: Vec<_> = all(&log).into_iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_scan_same_timestamp_orders_by_id() {
        let log = log();
        let first = append(&log, 100, "x");
        let second = append(&log, 100, "y");
        let events = all(&log);
        assert_eq!(events[0].id, first.id);
        assert_eq!(events[1].id, second.id);
    }

    #[test]
    fn test_scan_respects_half_open_range() {
        let log = log();
        for s in [10, 20, 30, 40] {
            append(&log, s, "tick");
        }
        let range = TimeRange::between(Timestamp::from_secs(20), Timestamp::from_secs(40));
        let got: Vec<_> = log
            .scan(&range, None, usize::MAX, |_| true)
            .into_iter()
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(got, vec![Timestamp::from_secs(20), Timestamp::from_secs(30)]);
    }

    #[test]
    fn test_scan_pages_with_after() {
        let log = log();
        for s in 0..10 {
            append(&log, s * 1000, "tick");
        }
        let mut after = None;
        let mut seen = Vec::new();
        loop {
            let page = log.scan(&TimeRange::all(), after, 3, |_| true);
            if page.is_empty() {
                break;
            }
            let last = page.last().unwrap();
            after = Some((last.timestamp, last.id));
            seen.extend(page.into_iter().map(|e| e.id));
        }
        assert_eq!(seen.len(), 10);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_scan_filter_before_limit() {
        let log = log();
        for i in 0..6 {
            append(&log, i, if i % 2 == 0 { "even" } else { "odd" });
        }
        let page = log.scan(&TimeRange::all(), None, 2, |e| e.event_type == "odd");
        assert_eq!(page.len(), 2);
        assert!(page.iter().all(|e| e.event_type == "odd"));
    }

    #[test]
    fn test_get_by_id() {
        let log = log();
        append(&log, 5, "a");
        let b = append(&log, 2 * HOUR, "b");
        assert_eq!(log.get(b.id).unwrap().event_type, "b");
        assert!(log.get(EventId::new(999)).is_none());
    }

    #[test]
    fn test_drop_whole_partitions() {
        let log = log();
        append(&log, 10, "p0");
        append(&log, 20, "p0");
        append(&log, HOUR + 1, "p1");
        append(&log, 3 * HOUR, "p3");

        let through = log.last_id();
        assert_eq!(log.partition_keys_before(3), vec![0, 1]);
        assert_eq!(
            log.drop_partition(0, through),
            PartitionDrop { events: 2, detached: true }
        );
        assert_eq!(
            log.drop_partition(1, through),
            PartitionDrop { events: 1, detached: true }
        );
        assert_eq!(log.drop_partition(1, through), PartitionDrop::default());
        assert!(log.partition_keys_before(3).is_empty());
        assert_eq!(log.len(), 1);
        assert_eq!(log.partition_keys(), vec![3]);
    }

    #[test]
    fn test_drop_keeps_events_newer_than_watermark() {
        let log = log();
        let old = append(&log, 10, "before-cutoff-logged");
        let through = log.last_id();
        let late = append(&log, 20, "after-cutoff-logged");

        let dropped = log.drop_partition(0, through);
        assert_eq!(dropped, PartitionDrop { events: 1, detached: false });
        assert!(log.get(old.id).is_none());
        assert!(log.get(late.id).is_some());
        assert_eq!(log.len(), 1);
        assert_eq!(log.partition_keys(), vec![0]);
    }

    #[test]
    fn test_insert_after_drop_recreates_partition() {
        let log = log();
        append(&log, 10, "p0");
        assert!(log.drop_partition(0, log.last_id()).detached);
        assert_eq!(log.partition_count(), 0);

        // Backfill into the window that was just dropped
        let late = append(&log, 20, "late");
        assert_eq!(log.partition_keys(), vec![0]);
        assert_eq!(log.len(), 1);
        assert_eq!(log.get(late.id).unwrap().event_type, "late");
    }

    #[test]
    fn test_inserts_racing_drops_lose_nothing() {
        use std::sync::atomic::AtomicBool;
        use std::thread;

        let log = Arc::new(log());
        let done = Arc::new(AtomicBool::new(false));
        let inserts = 2_000;

        let writer = {
            let log = Arc::clone(&log);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for i in 0..inserts {
                    append(&log, i % HOUR, "backfill");
                }
                done.store(true, Ordering::Release);
            })
        };
        let dropper = {
            let log = Arc::clone(&log);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut dropped = 0;
                while !done.load(Ordering::Acquire) {
                    dropped += log.drop_partition(0, log.last_id()).events;
                }
                dropped
            })
        };

        writer.join().unwrap();
        let dropped = dropper.join().unwrap();

        let held = all(&log).len();
        assert_eq!(log.len(), held);
        assert_eq!(dropped + held, inserts as usize);
    }

    #[test]
    fn test_trim_partition_splits_at_cutoff() {
        let log = log();
        append(&log, 10, "old");
        append(&log, 20, "old");
        append(&log, 30, "kept");
        let removed = log.trim_partition(Timestamp::from_secs(30), log.last_id());
        assert_eq!(removed, 2);
        let left = all(&log);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].event_type, "kept");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_trim_keeps_events_newer_than_watermark() {
        let log = log();
        append(&log, 10, "old");
        let through = log.last_id();
        append(&log, 15, "late");
        append(&log, 30, "kept");

        assert_eq!(log.trim_partition(Timestamp::from_secs(30), through), 1);
        let types: Vec<_> = all(&log).into_iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec!["late", "kept"]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_prune_before_is_idempotent() {
        let log = log();
        for s in [10, HOUR + 10, 2 * HOUR + 10, 3 * HOUR + 10] {
            append(&log, s, "tick");
        }
        let cutoff = Timestamp::from_secs(2 * HOUR + 20);
        assert_eq!(log.prune_before(cutoff), 3);
        assert_eq!(log.prune_before(cutoff), 0);
        assert_eq!(log.len(), 1);
        assert_eq!(log.earliest_timestamp(), Some(Timestamp::from_secs(3 * HOUR + 10)));
    }

    #[test]
    fn test_earliest_skips_emptied_partitions() {
        let log = log();
        assert_eq!(log.earliest_timestamp(), None);
        append(&log, 10, "a");
        append(&log, HOUR + 10, "b");
        log.trim_partition(Timestamp::from_secs(20), log.last_id());
        assert_eq!(log.partition_count(), 2);
        assert_eq!(log.earliest_timestamp(), Some(Timestamp::from_secs(HOUR + 10)));
    }

    #[test]
    fn test_concurrent_inserts_unique_ids() {
        use std::collections::HashSet;
        use std::thread;

        let log = Arc::new(log());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..100 {
                        append(&log, t * HOUR + i, "fan-in");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let events = all(&log);
        assert_eq!(events.len(), 800);
        let ids: HashSet<_> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 800);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn scan_is_sorted_for_any_arrival_order(
                secs in proptest::collection::vec(-20_000i64..20_000, 0..64)
            ) {
                let log = log();
                for s in &secs {
                    append(&log, *s, "p");
                }
                let events = all(&log);
                prop_assert_eq!(events.len(), secs.len());
                prop_assert!(events
                    .windows(2)
                    .all(|w| (w[0].timestamp, w[0].id) < (w[1].timestamp, w[1].id)));
            }

            #[test]
            fn prune_keeps_exactly_the_newer_events(
                secs in proptest::collection::vec(0i64..50_000, 0..64),
                cutoff in 0i64..50_000,
            ) {
                let log = log();
                for s in &secs {
                    append(&log, *s, "p");
                }
                log.prune_before(Timestamp::from_secs(cutoff));
                let expected = secs.iter().filter(|s| **s >= cutoff).count();
                prop_assert_eq!(log.len(), expected);
                prop_assert!(all(&log).iter().all(|e| e.timestamp >= Timestamp::from_secs(cutoff)));
            }
        }
    }
}

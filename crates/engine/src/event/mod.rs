//! Append-only event log
//!
//! Events are the audit and integration trail of every state change. The
//! entity store and the graph append theirs inside their own transactions;
//! [`EventLog::append`] is for events that accompany no record change.

pub mod retention;

use std::sync::Arc;
use std::time::Duration;

use labcore_core::{Event, EventDraft, EventId, EventQuery, LabError, LabResult, RecordKind, Timestamp};
use labcore_storage::EventPosition;

use crate::cancel::CancellationToken;
use crate::cursor::{Cursor, PageSource};
use crate::database::Database;
pub use retention::{RetentionReport, RetentionScheduler};

/// Event log over a database.
#[derive(Clone)]
pub struct EventLog {
    db: Arc<Database>,
}

impl EventLog {
    /// Create an event log backed by the given database.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append one event.
    ///
    /// The event is stamped with the current time unless the draft pins
    /// one. Fails only when the log is full or the WAL is unavailable.
    pub fn append(&self, draft: EventDraft) -> LabResult<EventId> {
        self.append_batch(vec![draft])?
            .into_iter()
            .next()
            .ok_or_else(|| LabError::serialization("commit assigned no event id"))
    }

    /// Append several events atomically, ids in draft order.
    pub fn append_batch(&self, drafts: Vec<EventDraft>) -> LabResult<Vec<EventId>> {
        let limits = &self.db.config().limits;
        for draft in &drafts {
            if draft.event_type.trim().is_empty() {
                return Err(LabError::invalid_input("Event type must not be empty"));
            }
            limits.validate_document("Event payload", &draft.payload)?;
            limits.validate_document("Event metadata", &draft.metadata)?;
        }
        self.db.append_events(drafts)
    }

    /// Events matching `query`, time-ordered, paged lazily.
    pub fn query(&self, query: EventQuery) -> Cursor<Event> {
        let source = EventSource {
            db: Arc::clone(&self.db),
            query,
            after: None,
        };
        Cursor::new(source, self.db.config().query.page_size)
    }

    /// Get an event by id.
    pub fn get(&self, id: EventId) -> LabResult<Event> {
        self.db
            .read_events(|log| log.get(id))
            .ok_or_else(|| LabError::not_found(RecordKind::Event, id))
    }

    /// Number of events held.
    pub fn len(&self) -> usize {
        self.db.read_events(|log| log.len())
    }

    /// Whether the log holds no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live partitions.
    pub fn partition_count(&self) -> usize {
        self.db.read_events(|log| log.partition_count())
    }

    /// Highest id assigned so far; pruning never lowers it.
    pub fn last_id(&self) -> EventId {
        self.db.read_events(|log| log.last_id())
    }

    // =========================================================================
    // Retention
    // =========================================================================

    /// Prune events older than `max_age`.
    pub fn apply_retention(&self, max_age: Duration) -> LabResult<RetentionReport> {
        self.apply_retention_at(max_age, Timestamp::now(), &CancellationToken::new())
    }

    /// Prune events older than `now - max_age`, checking `cancel` between
    /// partitions.
    pub fn apply_retention_at(
        &self,
        max_age: Duration,
        now: Timestamp,
        cancel: &CancellationToken,
    ) -> LabResult<RetentionReport> {
        retention::apply_retention_at(&self.db, max_age, now, cancel)
    }
}

/// Pages through the log, resuming after the last returned position
struct EventSource {
    db: Arc<Database>,
    query: EventQuery,
    after: Option<EventPosition>,
}

impl PageSource for EventSource {
    type Item = Event;

    fn fetch(&mut self, limit: usize) -> LabResult<Vec<Event>> {
        let query = &self.query;
        let page = self
            .db
            .read_events(|log| log.scan(&query.range, self.after, limit, |e| query.matches(e)));
        if let Some(last) = page.last() {
            self.after = Some((last.timestamp, last.id));
        }
        Ok(page)
    }
}

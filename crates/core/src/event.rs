//! Audit events
//!
//! Events are immutable once appended. The log assigns ids; callers build
//! an [`EventDraft`] and may pin its timestamp for backfill or import.

use serde::{Deserialize, Serialize};

use crate::json::JsonValue;
use crate::types::{EntityId, EventId, TimeRange, Timestamp, TypeTag};

/// Default origin tag for events emitted by the core itself
pub const CORE_ORIGIN: &str = "labcore";

/// Entity an event is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSubject {
    /// Subject entity
    pub entity_id: EntityId,
    /// Its type tag
    pub type_tag: TypeTag,
}

/// An appended event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic id
    pub id: EventId,
    /// When the state transition happened
    pub timestamp: Timestamp,
    /// e.g. `device.sensor.created`
    pub event_type: String,
    /// Subject entity, if any
    pub subject: Option<EventSubject>,
    /// Event body
    pub payload: JsonValue,
    /// Caller-supplied metadata
    pub metadata: JsonValue,
    /// Which component emitted it
    pub origin: String,
}

/// An event before the log assigns its id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    /// Event type
    pub event_type: String,
    /// Subject entity
    pub subject: Option<EventSubject>,
    /// Body
    pub payload: JsonValue,
    /// Metadata
    pub metadata: JsonValue,
    /// Origin tag
    pub origin: String,
    /// Explicit timestamp; the log stamps commit time when absent
    pub timestamp: Option<Timestamp>,
}

impl EventDraft {
    /// Draft with empty payload and metadata
    pub fn new(event_type: impl Into<String>) -> Self {
        EventDraft {
            event_type: event_type.into(),
            subject: None,
            payload: JsonValue::object(),
            metadata: JsonValue::object(),
            origin: CORE_ORIGIN.to_string(),
            timestamp: None,
        }
    }

    /// Set the subject entity
    pub fn subject(mut self, entity_id: EntityId, type_tag: TypeTag) -> Self {
        self.subject = Some(EventSubject { entity_id, type_tag });
        self
    }

    /// Set the payload
    pub fn payload(mut self, payload: impl Into<JsonValue>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Set the metadata
    pub fn metadata(mut self, metadata: impl Into<JsonValue>) -> Self {
        self.metadata = metadata.into();
        self
    }

    /// Set the origin tag
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Pin the timestamp
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Finalize with an assigned id
    pub fn into_event(self, id: EventId, default_timestamp: Timestamp) -> Event {
        Event {
            id,
            timestamp: self.timestamp.unwrap_or(default_timestamp),
            event_type: self.event_type,
            subject: self.subject,
            payload: self.payload,
            metadata: self.metadata,
            origin: self.origin,
        }
    }
}

/// Event query: optional entity and type filters over a time range
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    /// Only events about this entity
    pub entity: Option<EntityId>,
    /// Only this event type
    pub event_type: Option<String>,
    /// Half-open time range
    pub range: TimeRange,
}

impl EventQuery {
    /// All events
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a subject entity
    pub fn entity(mut self, entity: EntityId) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Restrict to an event type
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Restrict to a time range
    pub fn range(mut self, range: TimeRange) -> Self {
        self.range = range;
        self
    }

    /// Whether `event` passes the entity and type filters (range excluded)
    pub fn matches(&self, event: &Event) -> bool {
        self.entity.map_or(true, |id| {
            event.subject.as_ref().map(|s| s.entity_id) == Some(id)
        }) && self
            .event_type
            .as_deref()
            .map_or(true, |t| event.event_type == t)
    }
}

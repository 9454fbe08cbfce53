//! Typed, weighted, time-bounded relationships between entities

use serde::{Deserialize, Serialize};

use crate::json::JsonValue;
use crate::types::{EntityId, RelationshipId, Timestamp};

/// Edge direction relative to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    /// Entity is the `from` endpoint
    Outgoing,
    /// Entity is the `to` endpoint
    Incoming,
    /// Either endpoint (queries only, never stored)
    Both,
}

/// A relationship record
///
/// Deletion closes the validity interval; the row is kept for history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Unique id
    pub id: RelationshipId,
    /// Source entity
    pub from: EntityId,
    /// Target entity
    pub to: EntityId,
    /// Relationship type, e.g. `monitors`
    pub relationship_type: String,
    /// Free-form attributes
    pub attributes: JsonValue,
    /// Weight in [0, 1]
    pub strength: f64,
    /// Start of validity (inclusive)
    pub valid_from: Timestamp,
    /// End of validity (exclusive); `None` while open
    pub valid_to: Option<Timestamp>,
    /// Who created the link
    pub created_by: Option<String>,
    /// When the row was written
    pub created_at: Timestamp,
}

impl Relationship {
    /// Whether the interval contains `at`
    pub fn is_active_at(&self, at: Timestamp) -> bool {
        self.valid_from <= at && self.valid_to.map_or(true, |end| at < end)
    }

    /// Whether the interval has been closed
    pub fn is_closed(&self) -> bool {
        self.valid_to.is_some()
    }

    /// The endpoint opposite `entity`
    pub fn other_end(&self, entity: EntityId) -> EntityId {
        if self.from == entity {
            self.to
        } else {
            self.from
        }
    }
}

/// A neighbor reached through a relationship
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// The entity on the far side
    pub entity_id: EntityId,
    /// The relationship that connects them
    pub relationship: Relationship,
}

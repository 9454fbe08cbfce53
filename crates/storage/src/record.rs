//! Record keys and values
//!
//! All record families live in one ordered key space. The derived order
//! groups keys by family first, then by their fields, so a family-local
//! prefix (all adjacency entries of one entity, all members of one tenant,
//! all versions of one schema) is a contiguous range.

use serde::{Deserialize, Serialize};
use std::fmt;

use labcore_core::{
    Direction, Entity, EntityId, LabError, LabResult, Relationship, RelationshipId,
    SchemaDefinition, TypeTag,
};

/// Physical record family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Family {
    /// Entity rows
    Entity,
    /// Relationship rows
    Relationship,
    /// Derived: entity -> relationship per direction
    Adjacency,
    /// Derived: tenant root -> member entity
    TenantMember,
    /// Schema versions
    Schema,
}

impl Family {
    /// All families in key order
    pub const ALL: [Family; 5] = [
        Family::Entity,
        Family::Relationship,
        Family::Adjacency,
        Family::TenantMember,
        Family::Schema,
    ];
}

/// Key of a stored record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKey {
    /// Entity row
    Entity(EntityId),
    /// Relationship row
    Relationship(RelationshipId),
    /// Adjacency entry; `direction` is Outgoing or Incoming
    Adjacency {
        /// Entity the entry belongs to
        entity: EntityId,
        /// Side of the relationship the entity is on
        direction: Direction,
        /// Relationship id
        relationship: RelationshipId,
    },
    /// Tenant membership entry
    TenantMember {
        /// Tenant root
        tenant: EntityId,
        /// Member entity
        entity: EntityId,
    },
    /// Schema version
    Schema {
        /// Type tag
        type_tag: TypeTag,
        /// Version number
        version: u32,
    },
    /// Per-type pointer to the newest and the active schema version
    SchemaHead(TypeTag),
}

impl RecordKey {
    /// Family this key belongs to
    pub fn family(&self) -> Family {
        match self {
            RecordKey::Entity(_) => Family::Entity,
            RecordKey::Relationship(_) => Family::Relationship,
            RecordKey::Adjacency { .. } => Family::Adjacency,
            RecordKey::TenantMember { .. } => Family::TenantMember,
            RecordKey::Schema { .. } | RecordKey::SchemaHead(_) => Family::Schema,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Entity(id) => write!(f, "entity/{}", id),
            RecordKey::Relationship(id) => write!(f, "relationship/{}", id),
            RecordKey::Adjacency {
                entity,
                direction,
                relationship,
            } => write!(f, "adjacency/{}/{:?}/{}", entity, direction, relationship),
            RecordKey::TenantMember { tenant, entity } => {
                write!(f, "member/{}/{}", tenant, entity)
            }
            RecordKey::Schema { type_tag, version } => write!(f, "schema/{}/v{}", type_tag, version),
            RecordKey::SchemaHead(type_tag) => write!(f, "schema/{}/head", type_tag),
        }
    }
}

/// Stored record value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    /// Entity row
    Entity(Entity),
    /// Relationship row
    Relationship(Relationship),
    /// Adjacency entry, denormalized for type filtering without a join
    Adjacency {
        /// Relationship type
        relationship_type: String,
        /// Entity on the other side
        other: EntityId,
    },
    /// Tenant membership marker
    TenantMember,
    /// Schema version
    Schema(SchemaDefinition),
    /// Schema head of one type
    SchemaHead {
        /// Highest version ever registered
        latest: u32,
        /// Version currently in force, `None` once retired
        active: Option<u32>,
    },
}

impl Record {
    /// Unwrap an entity row
    pub fn into_entity(self) -> LabResult<Entity> {
        match self {
            Record::Entity(e) => Ok(e),
            other => Err(mismatch("entity", &other)),
        }
    }

    /// Unwrap a relationship row
    pub fn into_relationship(self) -> LabResult<Relationship> {
        match self {
            Record::Relationship(r) => Ok(r),
            other => Err(mismatch("relationship", &other)),
        }
    }

    /// Unwrap a schema version
    pub fn into_schema(self) -> LabResult<SchemaDefinition> {
        match self {
            Record::Schema(s) => Ok(s),
            other => Err(mismatch("schema", &other)),
        }
    }

    /// Unwrap a schema head as `(latest, active)`
    pub fn into_schema_head(self) -> LabResult<(u32, Option<u32>)> {
        match self {
            Record::SchemaHead { latest, active } => Ok((latest, active)),
            other => Err(mismatch("schema head", &other)),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Record::Entity(_) => "entity",
            Record::Relationship(_) => "relationship",
            Record::Adjacency { .. } => "adjacency",
            Record::TenantMember => "tenant member",
            Record::Schema(_) => "schema",
            Record::SchemaHead { .. } => "schema head",
        }
    }
}

fn mismatch(expected: &str, found: &Record) -> LabError {
    LabError::serialization(format!(
        "expected {} record, found {}",
        expected,
        found.kind()
    ))
}

/// Record plus the commit version that wrote it
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRecord {
    /// The record
    pub record: Record,
    /// Commit version
    pub version: u64,
}

//! Key construction for the record families, plus argument validation.
//!
//! Every family-local prefix (adjacency of one entity, members of one
//! tenant, versions of one type) maps to a contiguous inclusive range
//! between a min-key and a max-key.

use labcore_core::{
    Direction, EntityId, LabError, LabResult, RelationshipId, TypeTag,
};
use labcore_storage::{KeyRange, RecordKey};

/// Longest accepted relationship type.
pub const MAX_RELATIONSHIP_TYPE_LEN: usize = 128;

// =============================================================================
// Validation
// =============================================================================

/// Validate a relationship type.
pub fn validate_relationship_type(t: &str) -> LabResult<()> {
    if t.trim().is_empty() {
        return Err(LabError::invalid_input(
            "Relationship type must not be empty",
        ));
    }
    if t.len() > MAX_RELATIONSHIP_TYPE_LEN {
        return Err(LabError::invalid_input(format!(
            "Relationship type exceeds {} bytes",
            MAX_RELATIONSHIP_TYPE_LEN
        )));
    }
    if t.chars().any(char::is_control) {
        return Err(LabError::invalid_input(
            "Relationship type must not contain control characters",
        ));
    }
    Ok(())
}

/// Validate a schema version number.
pub fn validate_schema_version(version: u32) -> LabResult<()> {
    if version == 0 {
        return Err(LabError::invalid_input("Schema version must be at least 1"));
    }
    Ok(())
}

// =============================================================================
// Key Construction
// =============================================================================

/// Key of an entity row.
pub fn entity_key(id: EntityId) -> RecordKey {
    RecordKey::Entity(id)
}

/// Key of a relationship row.
pub fn relationship_key(id: RelationshipId) -> RecordKey {
    RecordKey::Relationship(id)
}

/// Adjacency entry of `entity` on one side of `relationship`.
pub fn adjacency_key(
    entity: EntityId,
    direction: Direction,
    relationship: RelationshipId,
) -> RecordKey {
    RecordKey::Adjacency {
        entity,
        direction,
        relationship,
    }
}

/// Membership entry of `entity` in `tenant`.
pub fn member_key(tenant: EntityId, entity: EntityId) -> RecordKey {
    RecordKey::TenantMember { tenant, entity }
}

/// Key of one schema version.
pub fn schema_key(type_tag: &TypeTag, version: u32) -> RecordKey {
    RecordKey::Schema {
        type_tag: type_tag.clone(),
        version,
    }
}

/// Head pointer of one type's schema versions.
pub fn schema_head_key(type_tag: &TypeTag) -> RecordKey {
    RecordKey::SchemaHead(type_tag.clone())
}

// =============================================================================
// Ranges
// =============================================================================

/// Every entity row.
pub fn all_entities() -> KeyRange {
    KeyRange::inclusive(entity_key(EntityId::min()), entity_key(EntityId::max()))
}

/// Adjacency entries of `entity` for one direction, or both when
/// `direction` is [`Direction::Both`] (outgoing sort first).
pub fn adjacency_range(entity: EntityId, direction: Direction) -> KeyRange {
    let (first, last) = match direction {
        Direction::Outgoing => (Direction::Outgoing, Direction::Outgoing),
        Direction::Incoming => (Direction::Incoming, Direction::Incoming),
        Direction::Both => (Direction::Outgoing, Direction::Incoming),
    };
    KeyRange::inclusive(
        adjacency_key(entity, first, RelationshipId::min()),
        adjacency_key(entity, last, RelationshipId::max()),
    )
}

/// Membership entries of one tenant, the root's own entry included.
pub fn members_range(tenant: EntityId) -> KeyRange {
    KeyRange::inclusive(
        member_key(tenant, EntityId::min()),
        member_key(tenant, EntityId::max()),
    )
}

/// Every version of one type.
pub fn schema_versions_range(type_tag: &TypeTag) -> KeyRange {
    KeyRange::inclusive(schema_key(type_tag, 0), schema_key(type_tag, u32::MAX))
}

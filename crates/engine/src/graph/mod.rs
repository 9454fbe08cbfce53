//! Relationship graph over entities.
//!
//! Relationships are typed, weighted and valid over a half-open interval.
//! Unlinking closes the interval; rows are never deleted, so history keeps
//! every edge an entity ever had. Each relationship has two adjacency
//! entries, one per endpoint, holding the type and the far endpoint so
//! type filtering needs no join.

pub mod types;

use std::sync::Arc;

use serde_json::json;

use labcore_core::{
    Direction, Endpoint, Entity, EntityId, EventDraft, LabError, LabResult, Neighbor, RecordKind,
    Relationship, RelationshipId, TenantScope, TenantViolation, Timestamp, ValidationReason,
};
use labcore_storage::{Record, RecordKey, ShardedStore};

use crate::cursor::{Cursor, RangeSource};
use crate::database::{Database, Txn};
use crate::keys;
use crate::tenant;
pub use types::{LinkData, NeighborQuery};

/// Event type appended by `link`
pub const LINKED_EVENT: &str = "relationship.linked";
/// Event type appended by `unlink`
pub const UNLINKED_EVENT: &str = "relationship.unlinked";

/// Relationship graph over a database.
///
/// All writes are transactional; reads page through cursors.
#[derive(Clone)]
pub struct RelationshipGraph {
    db: Arc<Database>,
}

impl RelationshipGraph {
    /// Create a graph backed by the given database.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    // =========================================================================
    // Link / unlink
    // =========================================================================

    /// Link `from` to `to`.
    ///
    /// Both endpoints must exist and belong to the same tenant. Parallel
    /// relationships of the same type are allowed.
    pub fn link(
        &self,
        from: EntityId,
        to: EntityId,
        relationship_type: &str,
        data: LinkData,
    ) -> LabResult<Relationship> {
        keys::validate_relationship_type(relationship_type)?;
        validate_strength(relationship_type, data.strength)?;
        self.db
            .config()
            .limits
            .validate_attributes(&data.attributes)?;

        let relationship = self.db.transaction(|txn| {
            let source = load_endpoint(txn, from, Endpoint::From)?;
            let target = load_endpoint(txn, to, Endpoint::To)?;
            if source.tenant_id() != target.tenant_id() {
                return Err(tenant::violation(
                    TenantViolation::CrossTenantLink,
                    Some(to),
                    source.tenant_id(),
                ));
            }

            let now = Timestamp::now();
            let relationship = Relationship {
                id: RelationshipId::new(),
                from,
                to,
                relationship_type: relationship_type.to_string(),
                attributes: data.attributes,
                strength: data.strength,
                valid_from: data.valid_from.unwrap_or(now),
                valid_to: None,
                created_by: data.created_by,
                created_at: now,
            };
            let id = relationship.id;

            txn.put(
                keys::relationship_key(id),
                Record::Relationship(relationship.clone()),
            );
            txn.put(
                keys::adjacency_key(from, Direction::Outgoing, id),
                Record::Adjacency {
                    relationship_type: relationship.relationship_type.clone(),
                    other: to,
                },
            );
            txn.put(
                keys::adjacency_key(to, Direction::Incoming, id),
                Record::Adjacency {
                    relationship_type: relationship.relationship_type.clone(),
                    other: from,
                },
            );
            txn.append_event(
                EventDraft::new(LINKED_EVENT)
                    .subject(from, source.type_tag.clone())
                    .at(now)
                    .payload(json!({
                        "relationship_id": id.to_string(),
                        "to": to.to_string(),
                        "relationship_type": relationship.relationship_type,
                        "strength": relationship.strength,
                        "valid_from": relationship.valid_from.as_micros(),
                    })),
            );
            Ok(relationship)
        })?;

        tracing::debug!(
            relationship = %relationship.id,
            from = %from,
            to = %to,
            relationship_type,
            "Linked entities"
        );
        Ok(relationship)
    }

    /// Close a relationship now.
    pub fn unlink(&self, id: RelationshipId) -> LabResult<Relationship> {
        self.unlink_at(id, Timestamp::now())
    }

    /// Close a relationship at `at`.
    ///
    /// Closing an already closed relationship returns it unchanged.
    pub fn unlink_at(&self, id: RelationshipId, at: Timestamp) -> LabResult<Relationship> {
        self.db.transaction(|txn| {
            let mut relationship = txn
                .get(&keys::relationship_key(id))?
                .ok_or_else(|| LabError::not_found(RecordKind::Relationship, id))?
                .into_relationship()?;
            if relationship.is_closed() {
                return Ok(relationship);
            }
            if at < relationship.valid_from {
                return Err(LabError::validation(
                    relationship.relationship_type.as_str(),
                    "valid_to",
                    ValidationReason::Malformed(format!(
                        "end {} precedes start {}",
                        at, relationship.valid_from
                    )),
                ));
            }
            relationship.valid_to = Some(at);
            txn.put(
                keys::relationship_key(id),
                Record::Relationship(relationship.clone()),
            );

            let source = txn
                .get_untracked(&keys::entity_key(relationship.from))?
                .ok_or(LabError::DanglingReference {
                    endpoint: Endpoint::From,
                    entity_id: relationship.from,
                })?
                .into_entity()?;
            txn.append_event(
                EventDraft::new(UNLINKED_EVENT)
                    .subject(relationship.from, source.type_tag)
                    .payload(json!({
                        "relationship_id": id.to_string(),
                        "to": relationship.to.to_string(),
                        "relationship_type": relationship.relationship_type,
                        "valid_to": at.as_micros(),
                    })),
            );
            Ok(relationship)
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a relationship by id, open or closed.
    pub fn get(&self, id: RelationshipId) -> LabResult<Relationship> {
        self.db
            .read(|store| {
                store
                    .get(&keys::relationship_key(id))
                    .map(|v| v.record.into_relationship())
                    .transpose()
            })?
            .ok_or_else(|| LabError::not_found(RecordKind::Relationship, id))
    }

    /// Neighbors of `id` through relationships valid at the query time.
    ///
    /// Parallel relationships each yield a neighbor. With
    /// [`Direction::Both`] a self-loop is reported once. In a tenant scope,
    /// neighbors outside the tenant are skipped.
    pub fn neighbors(
        &self,
        scope: TenantScope,
        id: EntityId,
        query: NeighborQuery,
    ) -> LabResult<Cursor<Neighbor>> {
        self.check_origin(scope, id)?;
        let at = query.at.unwrap_or_else(Timestamp::now);
        let direction = query.direction;
        let wanted_type = query.relationship_type;

        let source = RangeSource::new(
            Arc::clone(&self.db),
            vec![keys::adjacency_range(id, direction)],
            Box::new(move |store: &ShardedStore, key: RecordKey, record: Record| {
                let Some((side, rel_id, relationship_type, other)) = adjacency_row(key, record)?
                else {
                    return Ok(None);
                };
                if side == Direction::Incoming && other == id && direction == Direction::Both {
                    return Ok(None);
                }
                if wanted_type
                    .as_deref()
                    .map_or(false, |t| t != relationship_type)
                {
                    return Ok(None);
                }
                let relationship = stored_relationship(store, rel_id)?;
                if !relationship.is_active_at(at) || !visible(store, other, scope)? {
                    return Ok(None);
                }
                Ok(Some(Neighbor {
                    entity_id: other,
                    relationship,
                }))
            }),
        );
        Ok(Cursor::new(source, self.db.config().query.page_size))
    }

    /// Every relationship touching `id`, open and closed.
    ///
    /// Outgoing relationships come first, then incoming, each in
    /// relationship-id order. A self-loop is reported once.
    pub fn history(&self, scope: TenantScope, id: EntityId) -> LabResult<Cursor<Relationship>> {
        self.check_origin(scope, id)?;

        let source = RangeSource::new(
            Arc::clone(&self.db),
            vec![keys::adjacency_range(id, Direction::Both)],
            Box::new(move |store: &ShardedStore, key: RecordKey, record: Record| {
                let Some((side, rel_id, _, other)) = adjacency_row(key, record)? else {
                    return Ok(None);
                };
                if side == Direction::Incoming && other == id {
                    return Ok(None);
                }
                if !visible(store, other, scope)? {
                    return Ok(None);
                }
                stored_relationship(store, rel_id).map(Some)
            }),
        );
        Ok(Cursor::new(source, self.db.config().query.page_size))
    }

    fn check_origin(&self, scope: TenantScope, id: EntityId) -> LabResult<()> {
        self.db.read(|store| {
            tenant::check_scope(&self.db, store, scope)?;
            let origin = store
                .get(&keys::entity_key(id))
                .ok_or_else(|| LabError::not_found(RecordKind::Entity, id))?
                .record
                .into_entity()?;
            tenant::require_in_scope(&origin, scope)
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn validate_strength(relationship_type: &str, strength: f64) -> LabResult<()> {
    if (0.0..=1.0).contains(&strength) {
        Ok(())
    } else {
        Err(LabError::validation(
            relationship_type,
            "strength",
            ValidationReason::OutOfRange { min: 0.0, max: 1.0 },
        ))
    }
}

fn load_endpoint(txn: &mut Txn<'_>, id: EntityId, endpoint: Endpoint) -> LabResult<Entity> {
    txn.get(&keys::entity_key(id))?
        .ok_or(LabError::DanglingReference {
            endpoint,
            entity_id: id,
        })?
        .into_entity()
}

type AdjacencyRow = (Direction, RelationshipId, String, EntityId);

fn adjacency_row(key: RecordKey, record: Record) -> LabResult<Option<AdjacencyRow>> {
    let RecordKey::Adjacency {
        direction,
        relationship,
        ..
    } = key
    else {
        return Ok(None);
    };
    match record {
        Record::Adjacency {
            relationship_type,
            other,
        } => Ok(Some((direction, relationship, relationship_type, other))),
        _ => Err(LabError::serialization(format!(
            "adjacency entry of {} holds a different record",
            relationship
        ))),
    }
}

fn stored_relationship(store: &ShardedStore, id: RelationshipId) -> LabResult<Relationship> {
    store
        .get(&keys::relationship_key(id))
        .ok_or_else(|| {
            LabError::serialization(format!("adjacency entry names missing relationship {}", id))
        })?
        .record
        .into_relationship()
}

fn visible(store: &ShardedStore, entity: EntityId, scope: TenantScope) -> LabResult<bool> {
    if scope == TenantScope::Operator {
        return Ok(true);
    }
    match store.get(&keys::entity_key(entity)) {
        Some(v) => Ok(tenant::in_scope(&v.record.into_entity()?, scope)),
        None => Ok(false),
    }
}

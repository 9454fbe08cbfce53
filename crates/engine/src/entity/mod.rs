//! Entity store: polymorphic records with mandatory validation
//!
//! Every state-changing write validates against the active schema of the
//! entity's type, checks tenant ownership, and appends exactly one event,
//! all in one transaction. Writes that change nothing leave `updated_at`
//! alone and emit no event.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use labcore_core::{
    Entity, EntityFilter, EntityId, EntityStatus, EventDraft, JsonValue, LabError, LabResult,
    RecordKind, TenantScope, TenantViolation, Timestamp, TypeTag,
};
use labcore_storage::{Record, RecordKey, ShardedStore};

use crate::cursor::{Cursor, RangeSource};
use crate::database::{Database, Txn};
use crate::keys;
use crate::schema;
use crate::tenant;

/// Entity store over a database.
#[derive(Clone)]
pub struct EntityStore {
    db: Arc<Database>,
}

impl EntityStore {
    /// Create an entity store backed by the given database.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Create an entity owned by `owning_tenant`.
    ///
    /// Tenant roots cannot be created here; use [`create_tenant`](Self::create_tenant).
    pub fn create(
        &self,
        type_tag: &str,
        name: &str,
        attributes: impl Into<JsonValue>,
        owning_tenant: Option<EntityId>,
    ) -> LabResult<Entity> {
        let type_tag = TypeTag::new(type_tag)?;
        if type_tag.is_tenant_root() {
            return Err(LabError::invalid_input(
                "Tenant roots are created with create_tenant",
            ));
        }
        let tenant_id = owning_tenant
            .ok_or_else(|| tenant::violation(TenantViolation::MissingTenant, None, None))?;
        let attributes = attributes.into();
        self.check_limits(name, &attributes)?;

        self.db.transaction(|txn| {
            tenant::resolve_tenant(txn, tenant_id, None)?;
            schema::validate_in_txn(txn, &type_tag, &attributes)?;

            let entity = new_entity(type_tag, name, attributes, Some(tenant_id));
            txn.put(keys::entity_key(entity.id), Record::Entity(entity.clone()));
            txn.put(keys::member_key(tenant_id, entity.id), Record::TenantMember);
            tenant::touch_membership(txn, tenant_id);
            txn.append_event(created_event(&entity));
            Ok(entity)
        })
    }

    /// Create a tenant root.
    pub fn create_tenant(&self, name: &str, attributes: impl Into<JsonValue>) -> LabResult<Entity> {
        let type_tag = TypeTag::tenant_root();
        let attributes = attributes.into();
        self.check_limits(name, &attributes)?;

        self.db.transaction(|txn| {
            schema::validate_in_txn(txn, &type_tag, &attributes)?;

            let entity = new_entity(type_tag, name, attributes, None);
            txn.put(keys::entity_key(entity.id), Record::Entity(entity.clone()));
            tenant::touch_membership(txn, entity.id);
            txn.append_event(created_event(&entity));
            Ok(entity)
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get an entity by id.
    pub fn get(&self, id: EntityId) -> LabResult<Entity> {
        self.db
            .read(|store| {
                store
                    .get(&keys::entity_key(id))
                    .map(|v| v.record.into_entity())
                    .transpose()
            })?
            .ok_or_else(|| LabError::not_found(RecordKind::Entity, id))
    }

    /// Entities visible in `scope` that match `filter`.
    ///
    /// A tenant scope walks that tenant's membership index; the operator
    /// scope walks every entity unless the filter names an owning tenant.
    pub fn list(&self, scope: TenantScope, filter: EntityFilter) -> LabResult<Cursor<Entity>> {
        self.db
            .read(|store| tenant::check_scope(&self.db, store, scope))?;

        let range = match (scope, filter.owning_tenant) {
            (TenantScope::Tenant(t), Some(owner)) if owner != t => {
                return Err(tenant::violation(
                    TenantViolation::OutOfScope,
                    None,
                    Some(owner),
                ));
            }
            (TenantScope::Tenant(t), _) => keys::members_range(t),
            (TenantScope::Operator, Some(owner)) => keys::members_range(owner),
            (TenantScope::Operator, None) => keys::all_entities(),
        };

        let source = RangeSource::new(
            Arc::clone(&self.db),
            vec![range],
            Box::new(move |store: &ShardedStore, key: RecordKey, record: Record| {
                let entity = match key {
                    RecordKey::TenantMember { entity, .. } => match store.get(&keys::entity_key(entity)) {
                        Some(v) => v.record.into_entity()?,
                        None => {
                            return Err(LabError::serialization(format!(
                                "membership row names missing entity {}",
                                entity
                            )))
                        }
                    },
                    _ => record.into_entity()?,
                };
                Ok(filter.matches(&entity).then_some(entity))
            }),
        );
        Ok(Cursor::new(source, self.db.config().query.page_size))
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Merge `patch` into the attribute map.
    ///
    /// Top-level keys only; a `null` value stores `null`. The merged map is
    /// validated before it is written. The record is read tracked, so a
    /// status change, reassignment or other update committed while this
    /// call is in flight fails it with a retryable `Conflict` instead of
    /// being written over.
    pub fn update_attributes(&self, id: EntityId, patch: impl Into<JsonValue>) -> LabResult<Entity> {
        let patch = patch.into();
        self.db.transaction(|txn| {
            let entity = self.load_tracked(txn, id)?;
            self.apply_patch(txn, entity, &patch)
        })
    }

    /// Merge `patch` only if the entity still carries `expected_updated_at`.
    ///
    /// Fails with `Conflict` when the entity changed since it was read,
    /// including a change committed while this call is in flight.
    pub fn update_attributes_if_unmodified(
        &self,
        id: EntityId,
        patch: impl Into<JsonValue>,
        expected_updated_at: Timestamp,
    ) -> LabResult<Entity> {
        let patch = patch.into();
        self.db.transaction(|txn| {
            let key = keys::entity_key(id);
            let entity = txn
                .get(&key)?
                .ok_or_else(|| LabError::not_found(RecordKind::Entity, id))?
                .into_entity()?;
            if entity.updated_at != expected_updated_at {
                return Err(LabError::conflict(
                    key.to_string(),
                    format!(
                        "expected updated_at {}, found {}",
                        expected_updated_at, entity.updated_at
                    ),
                ));
            }
            self.apply_patch(txn, entity, &patch)
        })
    }

    /// Change the lifecycle status.
    ///
    /// A tenant root with active members cannot be deactivated or archived,
    /// and a member cannot be reactivated inside an inactive tenant.
    pub fn set_status(&self, id: EntityId, status: EntityStatus) -> LabResult<Entity> {
        self.db.transaction(|txn| {
            let mut entity = self.load_tracked(txn, id)?;
            if entity.status == status {
                return Ok(entity);
            }

            if entity.is_tenant_root() {
                if !status.is_active() {
                    let count = tenant::count_active_members(txn, id)?;
                    if count > 0 {
                        return Err(tenant::violation(
                            TenantViolation::ActiveMembers { count },
                            Some(id),
                            Some(id),
                        ));
                    }
                }
            } else if status.is_active() {
                let owner = entity
                    .owning_tenant
                    .ok_or_else(|| tenant::violation(TenantViolation::MissingTenant, Some(id), None))?;
                tenant::resolve_tenant(txn, owner, Some(id))?;
                tenant::touch_membership(txn, owner);
            }

            entity.set_status(status);
            touch(&mut entity);
            txn.put(keys::entity_key(id), Record::Entity(entity.clone()));
            txn.append_event(
                updated_event(&entity).payload(json!({ "status": status.as_str() })),
            );
            Ok(entity)
        })
    }

    /// Move a non-root entity to another active tenant.
    ///
    /// Existing relationships are left as they are.
    pub fn reassign_tenant(&self, id: EntityId, new_tenant: EntityId) -> LabResult<Entity> {
        self.db.transaction(|txn| {
            let mut entity = self.load_tracked(txn, id)?;
            if entity.is_tenant_root() {
                return Err(tenant::violation(
                    TenantViolation::RootCannotHaveOwner,
                    Some(id),
                    Some(new_tenant),
                ));
            }
            if entity.owning_tenant == Some(new_tenant) {
                return Ok(entity);
            }
            tenant::resolve_tenant(txn, new_tenant, Some(id))?;

            if let Some(old) = entity.owning_tenant {
                txn.delete(keys::member_key(old, id));
            }
            txn.put(keys::member_key(new_tenant, id), Record::TenantMember);
            if entity.status.is_active() {
                tenant::touch_membership(txn, new_tenant);
            }

            entity.owning_tenant = Some(new_tenant);
            touch(&mut entity);
            txn.put(keys::entity_key(id), Record::Entity(entity.clone()));
            txn.append_event(
                updated_event(&entity)
                    .payload(json!({ "owning_tenant": new_tenant.to_string() })),
            );
            Ok(entity)
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn check_limits(&self, name: &str, attributes: &JsonValue) -> LabResult<()> {
        let limits = &self.db.config().limits;
        limits.validate_name(name)?;
        limits.validate_attributes(attributes)
    }

    fn load_tracked(&self, txn: &mut Txn<'_>, id: EntityId) -> LabResult<Entity> {
        txn.get(&keys::entity_key(id))?
            .ok_or_else(|| LabError::not_found(RecordKind::Entity, id))?
            .into_entity()
    }

    fn apply_patch(&self, txn: &mut Txn<'_>, mut entity: Entity, patch: &JsonValue) -> LabResult<Entity> {
        let changed = entity.attributes.merge_top_level(patch)?;
        if changed.is_empty() {
            return Ok(entity);
        }
        self.db
            .config()
            .limits
            .validate_attributes(&entity.attributes)?;
        schema::validate_in_txn(txn, &entity.type_tag, &entity.attributes)?;

        touch(&mut entity);
        txn.put(keys::entity_key(entity.id), Record::Entity(entity.clone()));
        txn.append_event(updated_event(&entity).payload(json!({
            "attributes": entity.attributes.select(&changed).into_inner(),
        })));
        Ok(entity)
    }
}

fn new_entity(
    type_tag: TypeTag,
    name: &str,
    attributes: JsonValue,
    owning_tenant: Option<EntityId>,
) -> Entity {
    let now = Timestamp::now();
    Entity {
        id: EntityId::new(),
        type_tag,
        name: name.to_string(),
        attributes,
        status: EntityStatus::Active,
        owning_tenant,
        created_at: now,
        updated_at: now,
        active: true,
    }
}

/// Advance `updated_at`, strictly, so it works as a change stamp
fn touch(entity: &mut Entity) {
    let next = entity.updated_at.saturating_add(Duration::from_micros(1));
    entity.updated_at = Timestamp::now().max(next);
}

fn created_event(entity: &Entity) -> EventDraft {
    EventDraft::new(entity.type_tag.event_type("created"))
        .subject(entity.id, entity.type_tag.clone())
        .at(entity.created_at)
        .payload(json!({
            "name": entity.name,
            "attributes": entity.attributes.as_inner(),
            "status": entity.status.as_str(),
            "owning_tenant": entity.owning_tenant.map(|t| t.to_string()),
        }))
}

fn updated_event(entity: &Entity) -> EventDraft {
    EventDraft::new(entity.type_tag.event_type("updated"))
        .subject(entity.id, entity.type_tag.clone())
        .at(entity.updated_at)
}

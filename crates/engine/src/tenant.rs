//! Tenant isolation checks shared by the entity store and the graph
//!
//! A tenant root owns itself; every other entity names its root in
//! `owning_tenant`. Membership rows (`member/<tenant>/<entity>`) index each
//! tenant's entities, the root's own row included. Writes that add an
//! active member rewrite the root's row, and deactivating a root reads it
//! tracked, so the two conflict instead of leaving an inactive tenant with
//! active members.

use labcore_core::{
    Entity, EntityId, LabError, LabResult, TenantScope, TenantViolation,
};
use labcore_storage::{Record, RecordKey, ShardedStore};

use crate::database::{Database, Txn};
use crate::keys;

/// Build a tenant violation error, logging the rejection
pub(crate) fn violation(
    reason: TenantViolation,
    entity: Option<EntityId>,
    tenant: Option<EntityId>,
) -> LabError {
    tracing::warn!(
        reason = %reason,
        entity = ?entity,
        tenant = ?tenant,
        "Rejected tenant isolation violation"
    );
    LabError::tenant(reason, entity, tenant)
}

/// Resolve `tenant` for a write that sets `owning_tenant`
///
/// Tracked read: a concurrent deactivation of the tenant makes the write
/// conflict. The tenant must be an active root.
pub(crate) fn resolve_tenant(
    txn: &mut Txn<'_>,
    tenant: EntityId,
    entity: Option<EntityId>,
) -> LabResult<Entity> {
    let root = match txn.get(&keys::entity_key(tenant))? {
        Some(record) => record.into_entity()?,
        None => {
            return Err(violation(TenantViolation::UnknownTenant, entity, Some(tenant)));
        }
    };
    if !root.is_tenant_root() {
        return Err(violation(
            TenantViolation::NotTenantRoot {
                type_tag: root.type_tag.to_string(),
            },
            entity,
            Some(tenant),
        ));
    }
    if !root.status.is_active() {
        return Err(violation(TenantViolation::InactiveTenant, entity, Some(tenant)));
    }
    Ok(root)
}

/// Rewrite the root's own membership row
pub(crate) fn touch_membership(txn: &mut Txn<'_>, tenant: EntityId) {
    txn.put(keys::member_key(tenant, tenant), Record::TenantMember);
}

/// Active members of `tenant`, the root itself excluded
///
/// Reads the root's membership row and every member row tracked.
pub(crate) fn count_active_members(txn: &mut Txn<'_>, tenant: EntityId) -> LabResult<usize> {
    txn.get(&keys::member_key(tenant, tenant))?;
    let members = txn.scan(&keys::members_range(tenant))?;
    let mut count = 0;
    for (key, _) in members {
        let RecordKey::TenantMember { entity, .. } = key else {
            continue;
        };
        if entity == tenant {
            continue;
        }
        if let Some(record) = txn.get(&keys::entity_key(entity))? {
            if record.into_entity()?.status.is_active() {
                count += 1;
            }
        }
    }
    Ok(count)
}

/// Check that a read scope is usable on this database
///
/// `Operator` needs operator mode; `Tenant` must name an existing root.
pub(crate) fn check_scope(db: &Database, store: &ShardedStore, scope: TenantScope) -> LabResult<()> {
    match scope {
        TenantScope::Operator => {
            if db.options().operator_mode {
                Ok(())
            } else {
                Err(violation(TenantViolation::OperatorModeDisabled, None, None))
            }
        }
        TenantScope::Tenant(tenant) => {
            let record = store
                .get(&keys::entity_key(tenant))
                .ok_or_else(|| violation(TenantViolation::UnknownTenant, None, Some(tenant)))?;
            let root = record.record.into_entity()?;
            if root.is_tenant_root() {
                Ok(())
            } else {
                Err(violation(
                    TenantViolation::NotTenantRoot {
                        type_tag: root.type_tag.to_string(),
                    },
                    None,
                    Some(tenant),
                ))
            }
        }
    }
}

/// Whether `entity` is visible in `scope`
pub fn in_scope(entity: &Entity, scope: TenantScope) -> bool {
    match scope {
        TenantScope::Operator => true,
        TenantScope::Tenant(tenant) => entity.tenant_id() == Some(tenant),
    }
}

/// `Err(OutOfScope)` unless `entity` is visible in `scope`
pub(crate) fn require_in_scope(entity: &Entity, scope: TenantScope) -> LabResult<()> {
    if in_scope(entity, scope) {
        Ok(())
    } else {
        Err(violation(
            TenantViolation::OutOfScope,
            Some(entity.id),
            scope.tenant(),
        ))
    }
}

//! Polymorphic entity records
//!
//! One record shape serves every domain type; the type tag selects the
//! schema (if any) and the attribute map carries the type-specific data.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::json::JsonValue;
use crate::types::{EntityId, Timestamp, TypeTag};

/// Lifecycle status of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    /// In use
    Active,
    /// Temporarily disabled
    Inactive,
    /// Retired; entities are never physically deleted
    Archived,
}

impl EntityStatus {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Active => "active",
            EntityStatus::Inactive => "inactive",
            EntityStatus::Archived => "archived",
        }
    }

    /// Whether this status counts as active
    pub fn is_active(&self) -> bool {
        matches!(self, EntityStatus::Active)
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain object of any type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Globally unique id
    pub id: EntityId,
    /// Namespaced type tag
    pub type_tag: TypeTag,
    /// Display name
    pub name: String,
    /// Free-form attribute map (always a JSON object)
    pub attributes: JsonValue,
    /// Lifecycle status
    pub status: EntityStatus,
    /// Owning tenant root; `None` only for tenant roots
    pub owning_tenant: Option<EntityId>,
    /// Creation time
    pub created_at: Timestamp,
    /// Last state change
    pub updated_at: Timestamp,
    /// Derived from `status`, kept for consumers that read the flag directly
    pub active: bool,
}

impl Entity {
    /// Whether this entity is a tenant root
    pub fn is_tenant_root(&self) -> bool {
        self.type_tag.is_tenant_root()
    }

    /// The tenant this entity belongs to: itself for roots
    pub fn tenant_id(&self) -> Option<EntityId> {
        if self.is_tenant_root() {
            Some(self.id)
        } else {
            self.owning_tenant
        }
    }

    /// Set status and keep the `active` flag in sync
    pub fn set_status(&mut self, status: EntityStatus) {
        self.status = status;
        self.active = status.is_active();
    }
}

/// Filter for entity listings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityFilter {
    /// Only this type
    pub type_tag: Option<TypeTag>,
    /// Only entities owned by this tenant
    pub owning_tenant: Option<EntityId>,
    /// Only this status
    pub status: Option<EntityStatus>,
}

impl EntityFilter {
    /// Match everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a type
    pub fn with_type(mut self, type_tag: TypeTag) -> Self {
        self.type_tag = Some(type_tag);
        self
    }

    /// Restrict to an owning tenant
    pub fn with_owning_tenant(mut self, tenant: EntityId) -> Self {
        self.owning_tenant = Some(tenant);
        self
    }

    /// Restrict to a status
    pub fn with_status(mut self, status: EntityStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether `entity` passes the filter
    pub fn matches(&self, entity: &Entity) -> bool {
        self.type_tag.as_ref().map_or(true, |t| &entity.type_tag == t)
            && self
                .owning_tenant
                .map_or(true, |t| entity.owning_tenant == Some(t))
            && self.status.map_or(true, |s| entity.status == s)
    }
}

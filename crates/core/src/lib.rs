//! Core types for labcore
//!
//! This crate defines the data model shared by every layer:
//! - Identifiers: EntityId, RelationshipId, EventId
//! - Time: Timestamp, TimeRange
//! - Records: Entity, Relationship, SchemaDefinition, Event
//! - JsonValue: attribute maps and field-contract documents
//! - LabError / LabResult: the error taxonomy returned by every operation

#![warn(missing_docs)]

pub mod entity;
pub mod error;
pub mod event;
pub mod json;
pub mod limits;
pub mod relationship;
pub mod schema;
pub mod types;

pub use entity::{Entity, EntityFilter, EntityStatus};
pub use error::{
    Endpoint, LabError, LabResult, RecordKind, TenantViolation, ValidationIssue,
    ValidationReason,
};
pub use event::{Event, EventDraft, EventQuery, EventSubject, CORE_ORIGIN};
pub use json::{value_kind, JsonValue};
pub use limits::Limits;
pub use relationship::{Direction, Neighbor, Relationship};
pub use schema::{FieldContract, FieldKind, FieldSpec, SchemaDefinition};
pub use types::{
    EntityId, EventId, RelationshipId, TenantScope, TimeRange, Timestamp, TypeTag,
    TENANT_ROOT_TYPE,
};

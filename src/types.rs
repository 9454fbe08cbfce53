//! Public types for the labcore API
//!
//! Re-exports from the internal crates so callers depend on `labcore` only.

// ============================================================================
// Data model
// ============================================================================

pub use labcore_core::{
    Direction, Entity, EntityFilter, EntityId, EntityStatus, Event, EventDraft, EventId,
    EventQuery, EventSubject, FieldContract, FieldKind, FieldSpec, JsonValue, Neighbor,
    Relationship, RelationshipId, SchemaDefinition, TenantScope, TimeRange, Timestamp, TypeTag,
    CORE_ORIGIN, TENANT_ROOT_TYPE,
};

// ============================================================================
// Errors
// ============================================================================

pub use labcore_core::{
    Endpoint, LabError, LabResult, RecordKind, TenantViolation, ValidationIssue,
    ValidationReason,
};

// ============================================================================
// Components
// ============================================================================

pub use labcore_engine::{
    CancellationToken, Cursor, Database, EntityStore, EventLog, LinkData, NeighborQuery,
    RecoveryStats, RelationshipGraph, RetentionReport, RetentionScheduler, SchemaDraft,
    SchemaRegistry, ValidationReport,
};

// ============================================================================
// Configuration
// ============================================================================

pub use labcore_core::Limits;
pub use labcore_durability::WAL_FILE_NAME;
pub use labcore_engine::{
    DurabilityConfig, EventsConfig, LabConfig, QueryConfig, RetentionConfig, CONFIG_FILE_NAME,
};
pub use labcore_security::{AccessMode, OpenOptions};

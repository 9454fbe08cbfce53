//! Error taxonomy for labcore
//!
//! Every operation returns [`LabResult`]. All variants are recoverable and
//! carry enough structured detail (field, entity id, tenant id) for a
//! caller to build a user-facing message. The core never retries; see
//! [`LabError::is_retryable`] for the variants a caller may retry.

use std::fmt;
use thiserror::Error;

use crate::schema::FieldKind;
use crate::types::EntityId;

/// Result alias used across all labcore crates
pub type LabResult<T> = Result<T, LabError>;

// =============================================================================
// Detail types
// =============================================================================

/// Kind of record named by a `NotFound` error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// An entity
    Entity,
    /// A relationship
    Relationship,
    /// A schema definition
    Schema,
    /// An event
    Event,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordKind::Entity => "entity",
            RecordKind::Relationship => "relationship",
            RecordKind::Schema => "schema",
            RecordKind::Event => "event",
        })
    }
}

/// Which side of a relationship a dangling reference was found on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The `from` entity
    From,
    /// The `to` entity
    To,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Endpoint::From => "from",
            Endpoint::To => "to",
        })
    }
}

/// Why a payload field failed validation
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationReason {
    /// Required field absent or null
    MissingRequired,
    /// Runtime kind differs from the declared kind
    TypeMismatch {
        /// Declared kind
        expected: FieldKind,
        /// Kind actually found in the payload
        actual: String,
    },
    /// String not in the declared enum
    NotInEnum {
        /// Declared members
        allowed: Vec<String>,
    },
    /// Number below the declared minimum
    BelowMinimum {
        /// Declared minimum
        min: f64,
    },
    /// Number above the declared maximum
    AboveMaximum {
        /// Declared maximum
        max: f64,
    },
    /// String could not be parsed as a datetime
    InvalidDatetime,
    /// Value outside a fixed numeric range (relationship strength)
    OutOfRange {
        /// Inclusive lower bound
        min: f64,
        /// Inclusive upper bound
        max: f64,
    },
    /// Anything else, with a message
    Malformed(String),
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationReason::MissingRequired => f.write_str("required field is missing"),
            ValidationReason::TypeMismatch { expected, actual } => {
                write!(f, "expected {}, found {}", expected, actual)
            }
            ValidationReason::NotInEnum { allowed } => {
                write!(f, "value must be one of [{}]", allowed.join(", "))
            }
            ValidationReason::BelowMinimum { min } => write!(f, "value is below minimum {}", min),
            ValidationReason::AboveMaximum { max } => write!(f, "value is above maximum {}", max),
            ValidationReason::InvalidDatetime => f.write_str("value is not a valid datetime"),
            ValidationReason::OutOfRange { min, max } => {
                write!(f, "value must be within [{}, {}]", min, max)
            }
            ValidationReason::Malformed(msg) => f.write_str(msg),
        }
    }
}

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    /// Offending field name (`$` for the whole payload)
    pub field: String,
    /// What was wrong with it
    pub reason: ValidationReason,
}

impl ValidationIssue {
    /// Create an issue for a field
    pub fn new(field: impl Into<String>, reason: ValidationReason) -> Self {
        ValidationIssue {
            field: field.into(),
            reason,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field '{}': {}", self.field, self.reason)
    }
}

/// Why a write or read broke tenant isolation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantViolation {
    /// Non-root entity created without an owning tenant
    MissingTenant,
    /// Owning tenant id does not resolve to any entity
    UnknownTenant,
    /// Owning tenant resolves to an entity that is not a tenant root
    NotTenantRoot {
        /// Type tag of the entity that was found
        type_tag: String,
    },
    /// Owning tenant is not active
    InactiveTenant,
    /// Tenant roots cannot themselves be owned
    RootCannotHaveOwner,
    /// Tenant root still has active members
    ActiveMembers {
        /// Number of active members found
        count: usize,
    },
    /// Entity is outside the caller's scope
    OutOfScope,
    /// Relationship endpoints belong to different tenants
    CrossTenantLink,
    /// Operator scope used without operator mode
    OperatorModeDisabled,
}

impl fmt::Display for TenantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantViolation::MissingTenant => f.write_str("owning tenant is required"),
            TenantViolation::UnknownTenant => f.write_str("owning tenant does not exist"),
            TenantViolation::NotTenantRoot { type_tag } => {
                write!(f, "owning tenant has type '{}', not a tenant root", type_tag)
            }
            TenantViolation::InactiveTenant => f.write_str("owning tenant is not active"),
            TenantViolation::RootCannotHaveOwner => {
                f.write_str("tenant roots cannot have an owning tenant")
            }
            TenantViolation::ActiveMembers { count } => {
                write!(f, "tenant still has {} active members", count)
            }
            TenantViolation::OutOfScope => f.write_str("entity is outside the requested scope"),
            TenantViolation::CrossTenantLink => {
                f.write_str("relationship endpoints belong to different tenants")
            }
            TenantViolation::OperatorModeDisabled => {
                f.write_str("cross-tenant operator scope is not enabled")
            }
        }
    }
}

// =============================================================================
// LabError
// =============================================================================

/// Errors returned by labcore operations
#[derive(Debug, Clone, Error)]
pub enum LabError {
    /// Payload rejected by the active schema (or a built-in field rule)
    #[error("validation failed for '{type_tag}': {issue}")]
    ValidationFailure {
        /// Type tag (or relationship type) being written
        type_tag: String,
        /// First failing field
        issue: ValidationIssue,
    },

    /// Record does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of record
        kind: RecordKind,
        /// Identifier that was looked up
        id: String,
    },

    /// Relationship endpoint does not exist
    #[error("dangling reference: {endpoint} entity {entity_id} does not exist")]
    DanglingReference {
        /// Which endpoint
        endpoint: Endpoint,
        /// Missing entity id
        entity_id: EntityId,
    },

    /// Tenant isolation invariant would be broken
    #[error("tenant isolation violation: {reason}")]
    TenantIsolationViolation {
        /// Entity being written or read, when known
        entity_id: Option<EntityId>,
        /// Tenant involved, when known
        tenant_id: Option<EntityId>,
        /// What went wrong
        reason: TenantViolation,
    },

    /// Schema registration overlaps or contradicts an existing version
    #[error("conflicting schema version {version} for '{type_tag}': {reason}")]
    ConflictingSchemaVersion {
        /// Type tag
        type_tag: String,
        /// Version being registered
        version: u32,
        /// Why it conflicts
        reason: String,
    },

    /// Optimistic concurrency check failed
    #[error("conflict on {key}: {detail}")]
    Conflict {
        /// Record that changed underneath the transaction
        key: String,
        /// Expected vs found
        detail: String,
    },

    /// Configured capacity reached
    #[error("storage exhausted: {reason}")]
    StorageExhausted {
        /// Which limit was hit
        reason: String,
    },

    /// Durable storage could not be reached
    #[error("storage unavailable: {reason}")]
    Unavailable {
        /// Underlying cause
        reason: String,
    },

    /// Write attempted on a read-only database
    #[error("database is read-only")]
    ReadOnly,

    /// Malformed argument
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description
        message: String,
    },

    /// Record could not be encoded or decoded
    #[error("serialization error: {message}")]
    Serialization {
        /// Description
        message: String,
    },

    /// Operation stopped by its cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration rejected
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description
        message: String,
    },
}

impl LabError {
    /// Create an InvalidInput error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        LabError::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        LabError::Serialization {
            message: message.into(),
        }
    }

    /// Create a NotFound error
    pub fn not_found(kind: RecordKind, id: impl fmt::Display) -> Self {
        LabError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Create a ValidationFailure for one field
    pub fn validation(
        type_tag: impl Into<String>,
        field: impl Into<String>,
        reason: ValidationReason,
    ) -> Self {
        LabError::ValidationFailure {
            type_tag: type_tag.into(),
            issue: ValidationIssue::new(field, reason),
        }
    }

    /// Create a TenantIsolationViolation
    pub fn tenant(
        reason: TenantViolation,
        entity_id: Option<EntityId>,
        tenant_id: Option<EntityId>,
    ) -> Self {
        LabError::TenantIsolationViolation {
            entity_id,
            tenant_id,
            reason,
        }
    }

    /// Create a ConflictingSchemaVersion error
    pub fn schema_conflict(
        type_tag: impl Into<String>,
        version: u32,
        reason: impl Into<String>,
    ) -> Self {
        LabError::ConflictingSchemaVersion {
            type_tag: type_tag.into(),
            version,
            reason: reason.into(),
        }
    }

    /// Create a Conflict error
    pub fn conflict(key: impl Into<String>, detail: impl Into<String>) -> Self {
        LabError::Conflict {
            key: key.into(),
            detail: detail.into(),
        }
    }

    /// Create an Unavailable error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        LabError::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a StorageExhausted error
    pub fn storage_exhausted(reason: impl Into<String>) -> Self {
        LabError::StorageExhausted {
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfig error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        LabError::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether retrying the same call may succeed
    ///
    /// Only transient failures qualify: concurrency conflicts and
    /// unavailable storage. Retry policy stays with the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LabError::Conflict { .. } | LabError::Unavailable { .. })
    }

    /// Whether this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, LabError::NotFound { .. })
    }

    /// The failing field, for validation errors
    pub fn field(&self) -> Option<&str> {
        match self {
            LabError::ValidationFailure { issue, .. } => Some(&issue.field),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for LabError {
    fn from(e: serde_json::Error) -> Self {
        LabError::serialization(e.to_string())
    }
}

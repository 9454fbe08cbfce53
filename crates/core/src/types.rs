//! Identifier, time and scope types
//!
//! - EntityId / RelationshipId: UUID v4, unique across all record types
//! - EventId: monotonic u64 assigned by the event log
//! - Timestamp: microseconds since the Unix epoch (UTC)
//! - TypeTag: namespaced type string such as `device.sensor`
//! - TenantScope: the isolation scope every listing call carries

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{LabError, LabResult};

/// Type tag reserved for tenant-root entities.
pub const TENANT_ROOT_TYPE: &str = "tenant";

/// Maximum length of a type tag in bytes.
pub const MAX_TYPE_TAG_LEN: usize = 128;

// =============================================================================
// Identifiers
// =============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from the hyphenated string form
            pub fn parse(s: &str) -> LabResult<Self> {
                Uuid::parse_str(s).map(Self).map_err(|e| {
                    LabError::invalid_input(format!(
                        "invalid {} '{}': {}",
                        stringify!($name),
                        s,
                        e
                    ))
                })
            }

            /// Smallest possible identifier (range scans)
            pub const fn min() -> Self {
                Self(Uuid::nil())
            }

            /// Largest possible identifier (range scans)
            pub const fn max() -> Self {
                Self(Uuid::from_u128(u128::MAX))
            }

            /// Underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of an entity of any type
    EntityId
);

uuid_id!(
    /// Identifier of a relationship between two entities
    RelationshipId
);

/// Monotonic event identifier
///
/// Ids start at 1 and strictly increase in append order. `EventId::MIN`
/// (zero) is never assigned and is used as a lower bound for scans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(u64);

impl EventId {
    /// Lower bound, never assigned
    pub const MIN: EventId = EventId(0);
    /// Upper bound
    pub const MAX: EventId = EventId(u64::MAX);

    /// Wrap a raw id
    pub const fn new(id: u64) -> Self {
        EventId(id)
    }

    /// Raw id
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Time
// =============================================================================

/// Microseconds since the Unix epoch, UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Earliest representable instant
    pub const MIN: Timestamp = Timestamp(i64::MIN);
    /// Latest representable instant
    pub const MAX: Timestamp = Timestamp(i64::MAX);
    /// The Unix epoch
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Current wall-clock time
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_micros())
    }

    /// From microseconds since the epoch
    pub const fn from_micros(micros: i64) -> Self {
        Timestamp(micros)
    }

    /// From whole seconds since the epoch
    pub const fn from_secs(secs: i64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    /// From a chrono UTC datetime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Timestamp(dt.timestamp_micros())
    }

    /// Microseconds since the epoch
    pub const fn as_micros(&self) -> i64 {
        self.0
    }

    /// Convert to a chrono UTC datetime, if in range
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_micros(self.0).single()
    }

    /// Subtract a duration, saturating at `Timestamp::MIN`
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        let micros = i64::try_from(duration.as_micros()).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_sub(micros))
    }

    /// Add a duration, saturating at `Timestamp::MAX`
    pub fn saturating_add(&self, duration: Duration) -> Self {
        let micros = i64::try_from(duration.as_micros()).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_add(micros))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}us", self.0),
        }
    }
}

/// Half-open time interval `[start, end)`
///
/// A missing bound is unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive lower bound
    pub start: Option<Timestamp>,
    /// Exclusive upper bound
    pub end: Option<Timestamp>,
}

impl TimeRange {
    /// The whole timeline
    pub fn all() -> Self {
        Self::default()
    }

    /// `[start, end)`
    pub fn between(start: Timestamp, end: Timestamp) -> Self {
        TimeRange {
            start: Some(start),
            end: Some(end),
        }
    }

    /// `[start, ∞)`
    pub fn since(start: Timestamp) -> Self {
        TimeRange {
            start: Some(start),
            end: None,
        }
    }

    /// `(-∞, end)`
    pub fn until(end: Timestamp) -> Self {
        TimeRange {
            start: None,
            end: Some(end),
        }
    }

    /// Whether `ts` falls inside the range
    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts < e)
    }

    /// Whether the range can contain any instant at all
    pub fn is_empty(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if s >= e)
    }

    /// Lower bound, `Timestamp::MIN` when unbounded
    pub fn lower(&self) -> Timestamp {
        self.start.unwrap_or(Timestamp::MIN)
    }
}

// =============================================================================
// Type tags
// =============================================================================

/// Namespaced type tag, e.g. `device.sensor`
///
/// Dot-separated segments of lowercase ASCII letters, digits, `_` and `-`.
/// Construct through [`TypeTag::new`] to get validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(String);

impl TypeTag {
    /// Validate and wrap a type tag
    pub fn new(tag: impl Into<String>) -> LabResult<Self> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(LabError::invalid_input("Type tag must not be empty"));
        }
        if tag.len() > MAX_TYPE_TAG_LEN {
            return Err(LabError::invalid_input(format!(
                "Type tag exceeds {} bytes",
                MAX_TYPE_TAG_LEN
            )));
        }
        for segment in tag.split('.') {
            if segment.is_empty() {
                return Err(LabError::invalid_input(format!(
                    "Type tag '{}' has an empty segment",
                    tag
                )));
            }
            let valid = segment
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
            if !valid {
                return Err(LabError::invalid_input(format!(
                    "Type tag '{}' may only contain lowercase letters, digits, '_', '-' and '.'",
                    tag
                )));
            }
        }
        Ok(TypeTag(tag))
    }

    /// The tenant-root type tag
    pub fn tenant_root() -> Self {
        TypeTag(TENANT_ROOT_TYPE.to_string())
    }

    /// Whether this is the tenant-root type
    pub fn is_tenant_root(&self) -> bool {
        self.0 == TENANT_ROOT_TYPE
    }

    /// String form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Event type for a state change of this type, e.g. `device.sensor.created`
    pub fn event_type(&self, action: &str) -> String {
        format!("{}.{}", self.0, action)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Tenant scope
// =============================================================================

/// Isolation scope carried by listing and graph reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TenantScope {
    /// Restrict to one tenant: its root plus every entity it owns
    Tenant(EntityId),
    /// Privileged cross-tenant access; needs operator mode on the database
    Operator,
}

impl TenantScope {
    /// The tenant this scope is bound to, if any
    pub fn tenant(&self) -> Option<EntityId> {
        match self {
            TenantScope::Tenant(id) => Some(*id),
            TenantScope::Operator => None,
        }
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantScope::Tenant(id) => write!(f, "tenant:{}", id),
            TenantScope::Operator => f.write_str("operator"),
        }
    }
}

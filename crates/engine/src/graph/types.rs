//! Argument types for relationship graph operations.

use serde::{Deserialize, Serialize};

use labcore_core::{Direction, JsonValue, Timestamp};

/// Data supplied when linking two entities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkData {
    /// Weight in [0, 1] (default 1.0).
    #[serde(default = "default_strength")]
    pub strength: f64,
    /// Arbitrary attributes attached to the relationship.
    #[serde(default = "JsonValue::object")]
    pub attributes: JsonValue,
    /// Who created the link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Start of validity; link time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<Timestamp>,
}

fn default_strength() -> f64 {
    1.0
}

impl Default for LinkData {
    fn default() -> Self {
        Self {
            strength: default_strength(),
            attributes: JsonValue::object(),
            created_by: None,
            valid_from: None,
        }
    }
}

impl LinkData {
    /// Set the strength.
    pub fn strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    /// Set the attributes.
    pub fn attributes(mut self, attributes: impl Into<JsonValue>) -> Self {
        self.attributes = attributes.into();
        self
    }

    /// Record who created the link.
    pub fn created_by(mut self, who: impl Into<String>) -> Self {
        self.created_by = Some(who.into());
        self
    }

    /// Backdate or postdate the start of validity.
    pub fn valid_from(mut self, at: Timestamp) -> Self {
        self.valid_from = Some(at);
        self
    }
}

/// Options for a neighbor query.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborQuery {
    /// Only relationships of this type.
    pub relationship_type: Option<String>,
    /// Point in time the relationship must be valid at; now when absent.
    pub at: Option<Timestamp>,
    /// Which side of the relationship the origin is on.
    pub direction: Direction,
}

impl Default for NeighborQuery {
    fn default() -> Self {
        Self {
            relationship_type: None,
            at: None,
            direction: Direction::Outgoing,
        }
    }
}

impl NeighborQuery {
    /// Outgoing neighbors, any type, valid now.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one relationship type.
    pub fn of_type(mut self, relationship_type: impl Into<String>) -> Self {
        self.relationship_type = Some(relationship_type.into());
        self
    }

    /// Evaluate validity at `at` instead of now.
    pub fn at(mut self, at: Timestamp) -> Self {
        self.at = Some(at);
        self
    }

    /// Follow the given direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

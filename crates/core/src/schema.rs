//! Schema definitions and field contracts
//!
//! A field contract declares the expected shape of an attribute map:
//! `field -> {type, required, enum?, min?, max?}`. Contracts are a floor,
//! not an allow-list: undeclared fields are always accepted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{Timestamp, TypeTag};

/// Primitive kind a contract field may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// JSON string
    String,
    /// JSON number
    Number,
    /// String holding an ISO-8601-like datetime
    Datetime,
    /// JSON array
    Array,
}

impl FieldKind {
    /// Name used in contract documents
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Datetime => "datetime",
            FieldKind::Array => "array",
        }
    }

    /// Parse a contract `type` value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(FieldKind::String),
            "number" => Some(FieldKind::Number),
            "datetime" => Some(FieldKind::Datetime),
            "array" => Some(FieldKind::Array),
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constraints on one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Declared kind
    pub kind: FieldKind,
    /// Must be present and non-null
    pub required: bool,
    /// Allowed values (string fields only)
    pub enum_values: Option<Vec<String>>,
    /// Inclusive minimum (number fields only)
    pub min: Option<f64>,
    /// Inclusive maximum (number fields only)
    pub max: Option<f64>,
}

impl FieldSpec {
    /// Unconstrained optional field of `kind`
    pub fn new(kind: FieldKind) -> Self {
        FieldSpec {
            kind,
            required: false,
            enum_values: None,
            min: None,
            max: None,
        }
    }

    /// Mark as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Parsed field contract, fields in name order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldContract {
    /// Declared fields
    pub fields: BTreeMap<String, FieldSpec>,
}

impl FieldContract {
    /// Empty contract
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field
    pub fn with_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields are declared
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One version of a type's schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Type the schema applies to
    pub type_tag: TypeTag,
    /// Version, starting at 1
    pub version: u32,
    /// Field contract
    pub contract: FieldContract,
    /// Human description
    pub description: Option<String>,
    /// Start of validity
    pub valid_from: Timestamp,
    /// End of validity; `None` for the active version
    pub valid_to: Option<Timestamp>,
    /// Who registered it
    pub author: Option<String>,
    /// SHA-256 of the canonical contract document
    pub checksum: String,
}

impl SchemaDefinition {
    /// Whether this version is the active one
    pub fn is_active(&self) -> bool {
        self.valid_to.is_none()
    }

    /// Whether this version was in force at `at`
    pub fn is_active_at(&self, at: Timestamp) -> bool {
        self.valid_from <= at && self.valid_to.map_or(true, |end| at < end)
    }
}

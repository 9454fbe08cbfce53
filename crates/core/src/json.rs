//! JSON documents for attribute maps, payloads and field contracts
//!
//! JsonValue is a newtype around serde_json::Value. Entity attributes are
//! always JSON objects; event payloads and metadata may be any value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use crate::error::{LabError, LabResult};

/// JSON value wrapper
///
/// Newtype around serde_json::Value providing:
/// - Direct access to the underlying value via Deref/DerefMut
/// - Construction from common Rust types
/// - The top-level merge used by attribute patches
///
/// # Examples
///
/// ```
/// use labcore_core::JsonValue;
///
/// let mut attrs: JsonValue = r#"{"serial": "X1"}"#.parse().unwrap();
/// let patch: JsonValue = r#"{"serial": "X2", "rack": 4}"#.parse().unwrap();
/// let changed = attrs.merge_top_level(&patch).unwrap();
/// assert_eq!(changed, vec!["rack".to_string(), "serial".to_string()]);
/// assert_eq!(attrs["serial"], "X2");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonValue(serde_json::Value);

impl JsonValue {
    /// Create a null JSON value
    pub fn null() -> Self {
        JsonValue(serde_json::Value::Null)
    }

    /// Create an empty JSON object
    pub fn object() -> Self {
        JsonValue(serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Create an empty JSON array
    pub fn array() -> Self {
        JsonValue(serde_json::Value::Array(Vec::new()))
    }

    /// Create from a serde_json::Value
    pub fn from_value(value: serde_json::Value) -> Self {
        JsonValue(value)
    }

    /// Get the underlying serde_json::Value
    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }

    /// Get a reference to the underlying serde_json::Value
    pub fn as_inner(&self) -> &serde_json::Value {
        &self.0
    }

    /// Serialize to compact JSON string
    pub fn to_json_string(&self) -> String {
        self.0.to_string()
    }

    /// Approximate serialized size in bytes (for limit checking)
    pub fn size_bytes(&self) -> usize {
        self.to_json_string().len()
    }

    /// Name of the runtime kind, as reported in validation errors
    pub fn kind_name(&self) -> &'static str {
        value_kind(&self.0)
    }

    /// Nesting depth: scalars are 0, `{}` and `[]` are 1
    pub fn depth(&self) -> usize {
        depth(&self.0)
    }

    /// Top-level merge of `patch` into `self`, last key wins
    ///
    /// Both sides must be objects. Nested documents are replaced, not
    /// merged. A `null` in the patch stores `null`; keys are never
    /// removed. Returns the keys whose value actually changed, sorted,
    /// so an identical second application returns an empty list.
    pub fn merge_top_level(&mut self, patch: &JsonValue) -> LabResult<Vec<String>> {
        let patch = patch
            .as_object()
            .ok_or_else(|| LabError::invalid_input("Attribute patch must be a JSON object"))?;
        let target = self
            .0
            .as_object_mut()
            .ok_or_else(|| LabError::invalid_input("Attributes must be a JSON object"))?;

        let mut changed = Vec::new();
        for (key, value) in patch {
            if target.get(key) != Some(value) {
                target.insert(key.clone(), value.clone());
                changed.push(key.clone());
            }
        }
        changed.sort();
        Ok(changed)
    }

    /// Object holding only `keys` copied from `self`
    pub fn select(&self, keys: &[String]) -> JsonValue {
        let mut out = serde_json::Map::new();
        if let Some(obj) = self.as_object() {
            for key in keys {
                if let Some(v) = obj.get(key) {
                    out.insert(key.clone(), v.clone());
                }
            }
        }
        JsonValue(serde_json::Value::Object(out))
    }
}

/// JSON kind of a raw value: `null`, `boolean`, `number`, `string`,
/// `array` or `object`
pub fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn depth(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        serde_json::Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

impl FromStr for JsonValue {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s).map(JsonValue)
    }
}

impl Deref for JsonValue {
    type Target = serde_json::Value;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for JsonValue {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl fmt::Display for JsonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Default is null
impl Default for JsonValue {
    fn default() -> Self {
        Self::null()
    }
}

impl From<serde_json::Value> for JsonValue {
    fn from(v: serde_json::Value) -> Self {
        JsonValue(v)
    }
}

impl From<JsonValue> for serde_json::Value {
    fn from(v: JsonValue) -> Self {
        v.0
    }
}

impl From<bool> for JsonValue {
    fn from(v: bool) -> Self {
        JsonValue(serde_json::Value::Bool(v))
    }
}

impl From<i64> for JsonValue {
    fn from(v: i64) -> Self {
        JsonValue(serde_json::Value::from(v))
    }
}

impl From<f64> for JsonValue {
    fn from(v: f64) -> Self {
        JsonValue(serde_json::Value::from(v))
    }
}

impl From<&str> for JsonValue {
    fn from(v: &str) -> Self {
        JsonValue(serde_json::Value::String(v.to_string()))
    }
}

impl From<String> for JsonValue {
    fn from(v: String) -> Self {
        JsonValue(serde_json::Value::String(v))
    }
}

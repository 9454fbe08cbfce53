//! Size limits applied to every write
//!
//! Limits are configured through `[limits]` in the database config and
//! checked before a record is buffered in a transaction.

use serde::{Deserialize, Serialize};

use crate::error::{LabError, LabResult};
use crate::json::JsonValue;

/// Write-time limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum serialized size of an attribute map or payload
    #[serde(default = "default_max_attribute_bytes")]
    pub max_attribute_bytes: usize,
    /// Maximum nesting depth of an attribute map or payload
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
    /// Maximum length of an entity name
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,
}

fn default_max_attribute_bytes() -> usize {
    1024 * 1024
}

fn default_max_nesting_depth() -> usize {
    32
}

fn default_max_name_len() -> usize {
    256
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_attribute_bytes: default_max_attribute_bytes(),
            max_nesting_depth: default_max_nesting_depth(),
            max_name_len: default_max_name_len(),
        }
    }
}

impl Limits {
    /// Check a document against the size and depth limits
    pub fn validate_document(&self, what: &str, value: &JsonValue) -> LabResult<()> {
        let size = value.size_bytes();
        if size > self.max_attribute_bytes {
            return Err(LabError::invalid_input(format!(
                "{} is {} bytes, limit is {}",
                what, size, self.max_attribute_bytes
            )));
        }
        let depth = value.depth();
        if depth > self.max_nesting_depth {
            return Err(LabError::invalid_input(format!(
                "{} nests {} levels deep, limit is {}",
                what, depth, self.max_nesting_depth
            )));
        }
        Ok(())
    }

    /// Check an attribute map: must be an object within limits
    pub fn validate_attributes(&self, attributes: &JsonValue) -> LabResult<()> {
        if !attributes.is_object() {
            return Err(LabError::invalid_input(format!(
                "Attributes must be a JSON object, got {}",
                attributes.kind_name()
            )));
        }
        self.validate_document("Attribute map", attributes)
    }

    /// Check an entity name
    pub fn validate_name(&self, name: &str) -> LabResult<()> {
        if name.trim().is_empty() {
            return Err(LabError::invalid_input("Entity name must not be empty"));
        }
        if name.len() > self.max_name_len {
            return Err(LabError::invalid_input(format!(
                "Entity name exceeds {} bytes",
                self.max_name_len
            )));
        }
        Ok(())
    }
}

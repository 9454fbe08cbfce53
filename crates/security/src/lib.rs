//! Access options for opening a labcore database.
//!
//! [`AccessMode`] decides whether writes are allowed at all. The
//! `operator_mode` flag on [`OpenOptions`] decides whether queries may run
//! with the cross-tenant operator scope.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};

/// Controls whether the database allows writes or is read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessMode {
    /// Allow both reads and writes (default).
    #[default]
    ReadWrite,
    /// Every write operation fails with `ReadOnly`.
    ReadOnly,
}

/// Options for opening a database.
///
/// ```
/// use labcore_security::{AccessMode, OpenOptions};
///
/// let opts = OpenOptions::new().read_only().operator_mode(true);
/// assert!(opts.is_read_only());
/// assert!(opts.operator_mode);
/// assert_eq!(opts.access_mode, AccessMode::ReadOnly);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOptions {
    /// The access mode for the database.
    pub access_mode: AccessMode,
    /// Allow queries under the operator scope, which spans all tenants.
    pub operator_mode: bool,
}

impl OpenOptions {
    /// Default settings: read-write, operator scope disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the access mode.
    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Shorthand for `access_mode(AccessMode::ReadOnly)`.
    pub fn read_only(self) -> Self {
        self.access_mode(AccessMode::ReadOnly)
    }

    /// Enable or disable the operator scope.
    pub fn operator_mode(mut self, enabled: bool) -> Self {
        self.operator_mode = enabled;
        self
    }

    /// Whether writes are rejected.
    pub fn is_read_only(&self) -> bool {
        self.access_mode == AccessMode::ReadOnly
    }
}

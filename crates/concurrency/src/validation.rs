//! Transaction validation for OCC
//!
//! Key rules:
//! - First-committer-wins based on READ-SET, not write-set
//! - Blind writes (write without read) do NOT conflict
//! - CAS is validated separately from read-set
//! - Write skew is ALLOWED (do not try to prevent it)
//!
//! Validation runs under the commit lock, so the versions it sees cannot
//! move before the batch is applied.

use rustc_hash::FxHashMap;

use labcore_core::LabError;
use labcore_storage::{RecordKey, Storage};

use crate::transaction::{CasCheck, CommitBatch};

/// Types of conflicts that can occur during transaction validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// Key was read at one version but the committed version differs
    ReadWriteConflict {
        /// The key that has a conflict
        key: RecordKey,
        /// Version recorded in read_set when read
        read_version: u64,
        /// Current version in storage at validation time
        current_version: u64,
    },

    /// Expected version doesn't match current version
    CASConflict {
        /// The key that has a CAS conflict
        key: RecordKey,
        /// Expected version specified in CAS operation
        expected_version: u64,
        /// Current version in storage at validation time
        current_version: u64,
    },
}

impl ConflictType {
    /// Convert into the error returned to callers
    pub fn into_error(self) -> LabError {
        match self {
            ConflictType::ReadWriteConflict {
                key,
                read_version,
                current_version,
            } => LabError::conflict(
                key.to_string(),
                format!(
                    "read at version {}, committed version is now {}",
                    read_version, current_version
                ),
            ),
            ConflictType::CASConflict {
                key,
                expected_version,
                current_version,
            } => LabError::conflict(
                key.to_string(),
                format!(
                    "expected version {}, found {}",
                    expected_version, current_version
                ),
            ),
        }
    }
}

/// Result of transaction validation
///
/// Accumulates all conflicts found during validation.
/// A transaction commits only if is_valid() returns true.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Create a successful validation result (no conflicts)
    pub fn ok() -> Self {
        ValidationResult {
            conflicts: Vec::new(),
        }
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Get the number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// `Ok(())` when valid, otherwise the first conflict as an error
    pub fn into_result(self) -> Result<(), LabError> {
        match self.conflicts.into_iter().next() {
            None => Ok(()),
            Some(conflict) => Err(conflict.into_error()),
        }
    }
}

fn current_version<S: Storage>(store: &S, key: &RecordKey) -> u64 {
    match store.get(key) {
        Ok(Some(vv)) => vv.version,
        Ok(None) => 0,
        // Storage error - treat as version 0 (conservative)
        Err(_) => 0,
    }
}

/// Validate the read-set against current storage state
///
/// For each key in the read set, report a ReadWriteConflict if the
/// committed version differs from the one observed. A key that was absent
/// when read and still absent is version 0 on both sides.
pub fn validate_read_set<S: Storage>(
    read_set: &FxHashMap<RecordKey, u64>,
    store: &S,
) -> ValidationResult {
    let mut result = ValidationResult::ok();

    for (key, read_version) in read_set {
        let current_version = current_version(store, key);
        if current_version != *read_version {
            result.conflicts.push(ConflictType::ReadWriteConflict {
                key: key.clone(),
                read_version: *read_version,
                current_version,
            });
        }
    }

    result
}

/// Validate explicit version expectations
pub fn validate_cas_set<S: Storage>(cas_set: &[CasCheck], store: &S) -> ValidationResult {
    let mut result = ValidationResult::ok();

    for check in cas_set {
        let current_version = current_version(store, &check.key);
        if current_version != check.expected_version {
            result.conflicts.push(ConflictType::CASConflict {
                key: check.key.clone(),
                expected_version: check.expected_version,
                current_version,
            });
        }
    }

    result
}

/// Validate a whole batch: read set, then CAS set
pub fn validate_transaction<S: Storage>(batch: &CommitBatch, store: &S) -> ValidationResult {
    let mut result = validate_read_set(&batch.read_set, store);
    result
        .conflicts
        .extend(validate_cas_set(&batch.cas_set, store).conflicts);
    if !result.is_valid() {
        tracing::debug!(
            conflicts = result.conflict_count(),
            "transaction validation failed"
        );
    }
    result
}

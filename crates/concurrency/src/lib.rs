//! Optimistic concurrency control for labcore
//!
//! - `transaction`: per-operation read/write buffering
//! - `validation`: commit-time conflict detection
//!
//! Rules:
//! - First-committer-wins on the read set
//! - Blind writes (write without read) do not conflict
//! - CAS checks are validated separately from the read set

#![warn(missing_docs)]

pub mod transaction;
pub mod validation;

pub use transaction::{CasCheck, CommitBatch, TransactionContext};
pub use validation::{
    validate_cas_set, validate_read_set, validate_transaction, ConflictType, ValidationResult,
};

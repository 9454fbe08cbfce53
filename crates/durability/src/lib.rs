//! Durability layer for labcore
//!
//! A single append-only write-ahead log. Each committed transaction and
//! each retention run is one frame; replay on open rebuilds the record
//! store and the event log.

#![warn(missing_docs)]

pub mod wal;

pub use wal::{Wal, WalEntry, WalError, WalReadResult, WAL_FILE_NAME};

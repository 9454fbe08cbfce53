//! Engine for labcore
//!
//! Ties the storage, concurrency and durability layers into one
//! [`Database`] and exposes the component facades built on it:
//! - `schema`: versioned schema registry and payload validation
//! - `entity`: polymorphic entity store with mandatory validation
//! - `graph`: typed, time-bounded relationships
//! - `event`: partitioned event log and retention
//! - `tenant`: tenant isolation checks shared by the above

#![warn(missing_docs)]

pub mod cancel;
pub mod config;
pub mod cursor;
pub mod database;
pub mod entity;
pub mod event;
pub mod graph;
pub mod keys;
pub mod schema;
pub mod tenant;

pub use cancel::CancellationToken;
pub use config::{
    DurabilityConfig, EventsConfig, LabConfig, QueryConfig, RetentionConfig, CONFIG_FILE_NAME,
};
pub use cursor::{Cursor, PageSource};
pub use database::{Database, RecoveryStats, Txn};
pub use entity::EntityStore;
pub use event::{EventLog, RetentionReport, RetentionScheduler};
pub use graph::{LinkData, NeighborQuery, RelationshipGraph};
pub use schema::validator::ValidationReport;
pub use schema::{SchemaDraft, SchemaRegistry};
pub use tenant::in_scope;

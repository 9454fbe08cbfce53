//! labcore: persistence and integrity core for multi-tenant lab operations
//!
//! ```
//! use labcore::{EntityFilter, Lab, TenantScope};
//! use serde_json::json;
//!
//! let lab = Lab::cache().unwrap();
//! lab.schemas()
//!     .register("device.sensor", 1, json!({"serial": {"type": "string", "required": true}}))
//!     .unwrap();
//!
//! let acme = lab.entities().create_tenant("Acme Labs", json!({})).unwrap();
//! let sensor = lab
//!     .entities()
//!     .create("device.sensor", "Probe 1", json!({"serial": "X1"}), Some(acme.id))
//!     .unwrap();
//!
//! let visible: Vec<_> = lab
//!     .entities()
//!     .list(TenantScope::Tenant(acme.id), EntityFilter::new())
//!     .unwrap()
//!     .collect_all()
//!     .unwrap();
//! assert!(visible.iter().any(|e| e.id == sensor.id));
//! ```

#![warn(missing_docs)]

pub mod types;

use std::path::Path;
use std::sync::Arc;

pub use types::*;

/// Entry point bundling a database with its component facades
///
/// When `[retention] enabled` is set, a retention scheduler starts with
/// the database and stops when the `Lab` is dropped.
pub struct Lab {
    db: Arc<Database>,
    entities: EntityStore,
    graph: RelationshipGraph,
    schemas: SchemaRegistry,
    events: EventLog,
    retention: Option<RetentionScheduler>,
}

impl Lab {
    /// Open (or create) a durable lab in `path`
    pub fn open(path: impl AsRef<Path>) -> LabResult<Self> {
        Self::from_database(Database::open(path)?)
    }

    /// Open a durable lab with explicit settings
    pub fn open_with(
        path: impl AsRef<Path>,
        config: LabConfig,
        options: OpenOptions,
    ) -> LabResult<Self> {
        Self::from_database(Database::open_with(path, config, options)?)
    }

    /// In-memory lab with default settings
    pub fn cache() -> LabResult<Self> {
        Self::from_database(Database::cache()?)
    }

    /// In-memory lab with explicit settings
    pub fn cache_with(config: LabConfig, options: OpenOptions) -> LabResult<Self> {
        Self::from_database(Database::cache_with(config, options)?)
    }

    /// Wrap an opened database
    pub fn from_database(db: Arc<Database>) -> LabResult<Self> {
        let mut lab = Lab {
            entities: EntityStore::new(Arc::clone(&db)),
            graph: RelationshipGraph::new(Arc::clone(&db)),
            schemas: SchemaRegistry::new(Arc::clone(&db)),
            events: EventLog::new(Arc::clone(&db)),
            retention: None,
            db,
        };
        if lab.db.config().retention.enabled && !lab.db.options().is_read_only() {
            lab.start_retention()?;
        }
        tracing::debug!(
            durable = lab.db.is_durable(),
            retention = lab.retention.is_some(),
            "Opened lab"
        );
        Ok(lab)
    }

    /// Entity store
    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    /// Relationship graph
    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    /// Schema registry
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Event log
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Underlying database
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Start the retention scheduler from the `[retention]` settings
    ///
    /// Replaces a scheduler that is already running.
    pub fn start_retention(&mut self) -> LabResult<()> {
        if let Some(previous) = self.retention.take() {
            previous.shutdown();
        }
        self.retention = Some(RetentionScheduler::from_config(&self.db)?);
        Ok(())
    }

    /// Running retention scheduler, if any
    pub fn retention(&self) -> Option<&RetentionScheduler> {
        self.retention.as_ref()
    }

    /// Stop the retention scheduler, if running
    pub fn stop_retention(&mut self) {
        if let Some(scheduler) = self.retention.take() {
            scheduler.shutdown();
        }
    }

    /// Flush the write-ahead log
    pub fn flush(&self) -> LabResult<()> {
        self.db.flush()
    }
}

impl std::fmt::Debug for Lab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lab")
            .field("db", &self.db)
            .field("retention", &self.retention.is_some())
            .finish()
    }
}

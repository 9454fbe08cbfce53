//! Database: record store, event log and write-ahead log behind one commit path
//!
//! Every logical operation runs as a closure over a [`Txn`]. Reads inside
//! the closure see a consistent view; writes and event drafts are buffered
//! and committed together:
//!
//! 1. validate the read and CAS sets (first committer wins)
//! 2. assign event ids and the commit version
//! 3. append one WAL frame
//! 4. apply records and insert events under the visibility gate
//!
//! Readers hold the visibility gate shared, so they never observe a commit
//! half applied.

use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use labcore_concurrency::{validate_transaction, CommitBatch, TransactionContext};
use labcore_core::{EventDraft, EventId, LabError, LabResult, Timestamp};
use labcore_durability::{Wal, WalEntry, WAL_FILE_NAME};
use labcore_security::OpenOptions;
use labcore_storage::{PartitionedLog, ShardedStore};

use crate::config::{LabConfig, CONFIG_FILE_NAME};

/// Transaction handle passed to operation closures
pub type Txn<'a> = TransactionContext<'a, ShardedStore>;

/// Summary of a WAL replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Commit frames applied
    pub commits: usize,
    /// Prune frames applied
    pub prunes: usize,
    /// Events restored (before pruning)
    pub events: usize,
    /// Whether a torn tail was cut off
    pub truncated_tail: bool,
}

/// The storage engine shared by every facade
pub struct Database {
    store: ShardedStore,
    log: PartitionedLog,
    wal: Option<Wal>,
    path: Option<PathBuf>,
    config: LabConfig,
    options: OpenOptions,
    recovery: RecoveryStats,
    commit_lock: Mutex<()>,
    visibility: RwLock<()>,
}

impl Database {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Open (or create) a durable database in `path`
    ///
    /// Reads `labcore.toml` from the directory when present.
    pub fn open(path: impl AsRef<Path>) -> LabResult<Arc<Self>> {
        let config = LabConfig::load_or_default(path.as_ref().join(CONFIG_FILE_NAME))?;
        Self::open_with(path, config, OpenOptions::default())
    }

    /// Open a durable database with explicit settings
    ///
    /// A read-only database replays the log without repairing or
    /// extending it.
    pub fn open_with(
        path: impl AsRef<Path>,
        config: LabConfig,
        options: OpenOptions,
    ) -> LabResult<Arc<Self>> {
        config.validate()?;
        let dir = path.as_ref().to_path_buf();
        let wal_path = dir.join(WAL_FILE_NAME);

        let (wal, entries, truncated_tail) = if options.is_read_only() {
            let read = Wal::read(&wal_path)?;
            (None, read.entries, read.corruption.is_some())
        } else {
            std::fs::create_dir_all(&dir).map_err(|e| {
                LabError::unavailable(format!("cannot create {}: {}", dir.display(), e))
            })?;
            let before = std::fs::metadata(&wal_path).map(|m| m.len()).unwrap_or(0);
            let (wal, entries) = Wal::open(&wal_path, config.durability.sync_on_commit)?;
            let truncated = wal.size()? < before;
            (Some(wal), entries, truncated)
        };

        let mut db = Self::build(config, options, wal, Some(dir))?;
        db.recovery.truncated_tail = truncated_tail;
        for entry in entries {
            db.replay(entry);
        }

        tracing::info!(
            path = %db.path.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
            commits = db.recovery.commits,
            prunes = db.recovery.prunes,
            events = db.log.len(),
            version = db.store.version(),
            "Recovered database"
        );
        Ok(Arc::new(db))
    }

    /// In-memory database with default settings
    pub fn cache() -> LabResult<Arc<Self>> {
        Self::cache_with(LabConfig::default(), OpenOptions::default())
    }

    /// In-memory database with explicit settings
    pub fn cache_with(config: LabConfig, options: OpenOptions) -> LabResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self::build(config, options, None, None)?))
    }

    fn build(
        config: LabConfig,
        options: OpenOptions,
        wal: Option<Wal>,
        path: Option<PathBuf>,
    ) -> LabResult<Self> {
        Ok(Database {
            store: ShardedStore::new(),
            log: PartitionedLog::new(config.partition_window())?,
            wal,
            path,
            config,
            options,
            recovery: RecoveryStats::default(),
            commit_lock: Mutex::new(()),
            visibility: RwLock::new(()),
        })
    }

    fn replay(&mut self, entry: WalEntry) {
        match &entry {
            WalEntry::Commit { events, .. } => {
                self.recovery.commits += 1;
                self.recovery.events += events.len();
            }
            WalEntry::Prune { .. } => self.recovery.prunes += 1,
        }
        self.apply(entry);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Active configuration
    pub fn config(&self) -> &LabConfig {
        &self.config
    }

    /// Options the database was opened with
    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    /// Directory of a durable database
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether commits are logged to disk
    pub fn is_durable(&self) -> bool {
        self.wal.is_some()
    }

    /// What the last open replayed
    pub fn recovery_stats(&self) -> &RecoveryStats {
        &self.recovery
    }

    /// Current commit version
    pub fn version(&self) -> u64 {
        self.store.version()
    }

    pub(crate) fn log(&self) -> &PartitionedLog {
        &self.log
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &ShardedStore {
        &self.store
    }

    /// `Err(ReadOnly)` on a read-only database
    pub fn ensure_writable(&self) -> LabResult<()> {
        if self.options.is_read_only() {
            Err(LabError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Flush the write-ahead log
    pub fn flush(&self) -> LabResult<()> {
        if let Some(wal) = &self.wal {
            wal.sync()?;
        }
        Ok(())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Run `f` as one transaction and commit what it buffered
    ///
    /// Nothing is written when `f` fails. A closure that only reads
    /// commits nothing and works on read-only databases.
    pub fn transaction<T, F>(&self, f: F) -> LabResult<T>
    where
        F: FnOnce(&mut Txn<'_>) -> LabResult<T>,
    {
        let (value, batch) = {
            let _view = self.visibility.read_recursive();
            let mut txn = TransactionContext::new(&self.store);
            let value = f(&mut txn)?;
            (value, txn.into_batch())
        };
        self.commit_batch(batch)?;
        Ok(value)
    }

    /// Consistent read of the record store
    pub fn read<T>(&self, f: impl FnOnce(&ShardedStore) -> LabResult<T>) -> LabResult<T> {
        let _view = self.visibility.read_recursive();
        f(&self.store)
    }

    /// Consistent read of the event log
    pub fn read_events<T>(&self, f: impl FnOnce(&PartitionedLog) -> T) -> T {
        let _view = self.visibility.read_recursive();
        f(&self.log)
    }

    /// Append events without record changes
    pub fn append_events(&self, drafts: Vec<EventDraft>) -> LabResult<Vec<EventId>> {
        self.commit_batch(CommitBatch::events_only(drafts))
    }

    /// Validate and apply a batch, returning the ids of its events
    pub fn commit_batch(&self, batch: CommitBatch) -> LabResult<Vec<EventId>> {
        if !batch.has_record_changes() && batch.events.is_empty() && batch.cas_set.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_writable()?;

        let _commit = self.commit_lock.lock();
        validate_transaction(&batch, &self.store).into_result()?;

        if let Some(max) = self.config.events.max_events {
            if self.log.len() + batch.events.len() > max {
                return Err(LabError::storage_exhausted(format!(
                    "event log holds {} of {} events",
                    self.log.len(),
                    max
                )));
            }
        }

        let record_changes = batch.has_record_changes();
        let version = if record_changes {
            self.store.version() + 1
        } else {
            self.store.version()
        };
        let now = Timestamp::now();
        let events: Vec<_> = batch
            .events
            .into_iter()
            .map(|draft| draft.into_event(self.log.allocate_id(), now))
            .collect();
        let ids: Vec<EventId> = events.iter().map(|e| e.id).collect();

        let entry = WalEntry::Commit {
            version,
            writes: batch.writes,
            deletes: batch.deletes,
            events,
        };
        if let Some(wal) = &self.wal {
            wal.append(&entry)?;
        }
        self.apply(entry);

        tracing::debug!(
            version,
            record_changes,
            events = ids.len(),
            "Committed transaction"
        );
        Ok(ids)
    }

    /// Log a retention cutoff, returning the last event id it covers
    ///
    /// Taken under the commit lock: every event with a higher id commits
    /// after the `Prune` frame, so replay keeps it and retention must too.
    pub(crate) fn log_prune(&self, cutoff: Timestamp) -> LabResult<EventId> {
        self.ensure_writable()?;
        let _commit = self.commit_lock.lock();
        if let Some(wal) = &self.wal {
            wal.append(&WalEntry::Prune { cutoff })?;
        }
        Ok(self.log.last_id())
    }

    fn apply(&self, entry: WalEntry) {
        match entry {
            WalEntry::Commit {
                version,
                writes,
                deletes,
                events,
            } => {
                let _gate = self.visibility.write();
                if !writes.is_empty() || !deletes.is_empty() {
                    self.store.apply_batch(&writes, &deletes, version);
                    self.store.set_version(version);
                }
                for event in &events {
                    self.log.observe_id(event.id);
                }
                self.log.insert_batch(events);
            }
            WalEntry::Prune { cutoff } => {
                self.log.prune_before(cutoff);
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("version", &self.store.version())
            .field("events", &self.log.len())
            .field("options", &self.options)
            .finish()
    }
}

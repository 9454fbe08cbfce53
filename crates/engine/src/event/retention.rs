//! Event retention
//!
//! A run computes `cutoff = now - max_age`, logs the cutoff to the WAL, then
//! detaches whole partitions older than the cutoff one at a time and finally
//! splits the boundary partition. Only events committed before the cutoff
//! was logged are removed, the same set a replay of the WAL removes. Runs are idempotent: a second run with
//! the same cutoff finds nothing older and writes nothing.
//!
//! The [`RetentionScheduler`] repeats runs on a background thread. Failures
//! are logged and retried on the next tick; they never reach writers.

use std::sync::{mpsc, Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use labcore_core::{EventId, LabError, LabResult, Timestamp};

use crate::cancel::CancellationToken;
use crate::database::Database;

/// Outcome of one retention run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionReport {
    /// Events strictly older than this were pruned
    pub cutoff: Timestamp,
    /// Whole partitions detached
    pub partitions_dropped: usize,
    /// Events removed, dropped partitions and boundary split together
    pub events_pruned: usize,
}

impl RetentionReport {
    /// Whether the run removed nothing
    pub fn is_empty(&self) -> bool {
        self.events_pruned == 0 && self.partitions_dropped == 0
    }
}

/// Prune events older than `now - max_age`
///
/// The cancellation token is checked before the run and between
/// partitions. Cancelling part way leaves the log partially pruned; the
/// cutoff is already in the WAL, so the next run or a reopen completes it.
pub fn apply_retention_at(
    db: &Database,
    max_age: Duration,
    now: Timestamp,
    cancel: &CancellationToken,
) -> LabResult<RetentionReport> {
    db.ensure_writable()?;
    cancel.check()?;

    let cutoff = now.saturating_sub(max_age);
    let mut report = RetentionReport {
        cutoff,
        partitions_dropped: 0,
        events_pruned: 0,
    };

    let log = db.log();
    match log.earliest_timestamp() {
        Some(earliest) if earliest < cutoff => {}
        _ => return Ok(report),
    }

    let through = db.log_prune(cutoff)?;
    prune_logged(db, through, cancel, &mut report)?;

    tracing::info!(
        cutoff = %cutoff,
        partitions_dropped = report.partitions_dropped,
        events_pruned = report.events_pruned,
        "Applied event retention"
    );
    Ok(report)
}

/// Remove what a logged cutoff covers: events older than `report.cutoff`
/// with id at most `through`
fn prune_logged(
    db: &Database,
    through: EventId,
    cancel: &CancellationToken,
    report: &mut RetentionReport,
) -> LabResult<()> {
    let log = db.log();
    for key in log.partition_keys_before(log.partition_key(report.cutoff)) {
        let dropped = log.drop_partition(key, through);
        if dropped.detached {
            report.partitions_dropped += 1;
        }
        report.events_pruned += dropped.events;
        cancel.check()?;
    }
    report.events_pruned += log.trim_partition(report.cutoff, through);
    Ok(())
}

// =============================================================================
// Scheduler
// =============================================================================

enum RetentionCommand {
    RunNow,
    Shutdown,
}

/// Background thread running retention every `interval`
///
/// Holds only a weak reference to the database; the thread exits once the
/// database is dropped. Dropping the scheduler cancels an in-flight run and
/// joins the thread.
pub struct RetentionScheduler {
    tx: mpsc::Sender<RetentionCommand>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RetentionScheduler {
    /// Start with explicit age and interval
    pub fn start(db: &Arc<Database>, max_age: Duration, interval: Duration) -> LabResult<Self> {
        if interval.is_zero() {
            return Err(LabError::invalid_config("retention interval must be positive"));
        }
        db.ensure_writable()?;

        let weak = Arc::downgrade(db);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let (tx, rx) = mpsc::channel();

        let handle = std::thread::Builder::new()
            .name("labcore_retention".to_string())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Ok(RetentionCommand::RunNow) | Err(mpsc::RecvTimeoutError::Timeout) => {
                        if !run_once(&weak, max_age, &token) {
                            break;
                        }
                    }
                    Ok(RetentionCommand::Shutdown) => break,
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| LabError::unavailable(format!("failed to spawn retention thread: {}", e)))?;

        tracing::info!(
            max_age_secs = max_age.as_secs(),
            interval_secs = interval.as_secs(),
            "Started retention scheduler"
        );
        Ok(Self {
            tx,
            cancel,
            handle: Some(handle),
        })
    }

    /// Start with the database's `[retention]` settings
    pub fn from_config(db: &Arc<Database>) -> LabResult<Self> {
        let config = db.config();
        Self::start(db, config.retention_max_age(), config.retention_interval())
    }

    /// Run once without waiting for the next tick
    pub fn run_now(&self) {
        let _ = self.tx.send(RetentionCommand::RunNow);
    }

    /// Stop the thread and wait for it
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        let _ = self.tx.send(RetentionCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Retention thread panicked");
            }
        }
    }
}

impl Drop for RetentionScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RetentionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionScheduler")
            .field("running", &self.handle.is_some())
            .finish()
    }
}

/// One scheduled run; `false` once the thread should exit
fn run_once(db: &Weak<Database>, max_age: Duration, cancel: &CancellationToken) -> bool {
    let Some(db) = db.upgrade() else {
        return false;
    };
    match apply_retention_at(&db, max_age, Timestamp::now(), cancel) {
        Ok(report) => {
            tracing::debug!(
                events_pruned = report.events_pruned,
                "Scheduled retention run finished"
            );
            true
        }
        Err(LabError::Cancelled) => false,
        Err(e) => {
            tracing::warn!(error = %e, "Retention run failed; retrying next interval");
            true
        }
    }
}

//! Shared batch state handle.
//!
//! One `Arc<BatchState>` is handed to the executor, the monitor task and the
//! UI; there is no module-level flag mirrored elsewhere.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::executor::ExecutionMode;
use crate::cancellation::CancellationToken;
use crate::errors::UpdaterError;
use crate::ports::BatchStatusReport;
use crate::tracker::StageTracker;

/// What the poller knows about a background batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundProgress {
    /// Identifier returned by the batch service.
    pub batch_id: String,
    /// Most recent successful poll.
    pub last_report: Option<BatchStatusReport>,
    /// Consecutive failed polls.
    pub poll_failures: u32,
}

/// Mutable state of the current (or last) batch.
#[derive(Debug, Default)]
pub struct BatchState {
    tracker: StageTracker,
    running: AtomicBool,
    error_count: AtomicU32,
    stuck: AtomicBool,
    selection: RwLock<Vec<String>>,
    cancellation: CancellationToken,
    mode: RwLock<Option<ExecutionMode>>,
    background: RwLock<Option<BackgroundProgress>>,
}

impl BatchState {
    /// Creates idle state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The progress map.
    #[must_use]
    pub fn tracker(&self) -> &StageTracker {
        &self.tracker
    }

    /// The cancellation flag of the current batch.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Claims the running flag and clears per-batch counters.
    pub fn begin(&self) -> Result<(), UpdaterError> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| UpdaterError::AlreadyRunning)?;
        self.error_count.store(0, Ordering::SeqCst);
        self.stuck.store(false, Ordering::SeqCst);
        self.cancellation.reset();
        *self.mode.write() = None;
        *self.background.write() = None;
        Ok(())
    }

    /// Releases the running flag.
    pub fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Returns true while a batch is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Adds one to the batch error counter and returns the new value.
    pub fn record_error(&self) -> u32 {
        self.error_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current batch error count.
    #[must_use]
    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    /// Raises the hard stuck-state flag.
    pub fn mark_stuck(&self) {
        self.stuck.store(true, Ordering::SeqCst);
    }

    /// Returns true once the monitor escalated.
    #[must_use]
    pub fn is_stuck(&self) -> bool {
        self.stuck.load(Ordering::SeqCst)
    }

    /// Replaces the operator's selection.
    pub fn set_selection(&self, entity_ids: Vec<String>) {
        *self.selection.write() = entity_ids;
    }

    /// The operator's selection.
    #[must_use]
    pub fn selection(&self) -> Vec<String> {
        self.selection.read().clone()
    }

    /// Records the execution mode chosen for the batch.
    pub fn set_mode(&self, mode: ExecutionMode) {
        *self.mode.write() = Some(mode);
    }

    /// Execution mode of the current batch.
    #[must_use]
    pub fn mode(&self) -> Option<ExecutionMode> {
        *self.mode.read()
    }

    /// Starts tracking a submitted background batch.
    pub fn set_background_batch(&self, batch_id: impl Into<String>) {
        *self.background.write() = Some(BackgroundProgress {
            batch_id: batch_id.into(),
            last_report: None,
            poll_failures: 0,
        });
    }

    /// Stores the latest poll result.
    pub fn record_background_report(&self, report: BatchStatusReport) {
        if let Some(progress) = self.background.write().as_mut() {
            progress.last_report = Some(report);
            progress.poll_failures = 0;
        }
    }

    /// Counts a failed poll and returns the consecutive failure count.
    pub fn record_background_poll_failure(&self) -> u32 {
        self.background.write().as_mut().map_or(0, |progress| {
            progress.poll_failures += 1;
            progress.poll_failures
        })
    }

    /// Background progress, if the batch runs in background mode.
    #[must_use]
    pub fn background(&self) -> Option<BackgroundProgress> {
        self.background.read().clone()
    }

    /// Clears progress, counters and the running flag but keeps the selection.
    pub fn soft_reset(&self) {
        self.tracker.clear();
        self.error_count.store(0, Ordering::SeqCst);
        self.stuck.store(false, Ordering::SeqCst);
        *self.background.write() = None;
        self.running.store(false, Ordering::SeqCst);
    }
}

//! Recovery controller: `idle -> recovering -> idle`.
//!
//! While recovering, no entity may start. Completion performs the soft reset
//! (progress, error count, stuck flag and sweep counter cleared, running flag
//! dropped, selection kept) and notifies callbacks. Nothing here may panic its
//! caller: a failing reset or callback is logged and the controller still
//! returns to idle.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{error, info, warn};

use crate::monitor::StuckMonitor;
use crate::pipeline::BatchState;
use crate::utils::{now_utc, Timestamp};

/// Recovery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryState {
    /// Normal operation.
    #[default]
    Idle,
    /// Soft reset pending; entity starts are refused.
    Recovering,
}

/// Why recovery was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RecoveryReason {
    /// The batch error counter reached the limit.
    ErrorThreshold {
        /// Error count when recovery was triggered.
        errors: u32,
    },
    /// The stuck-state monitor escalated.
    StuckEscalation,
    /// The operator asked for it.
    Manual,
}

impl fmt::Display for RecoveryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ErrorThreshold { errors } => write!(f, "error threshold reached ({errors} errors)"),
            Self::StuckEscalation => write!(f, "stuck state confirmed"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Outcome of one recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Trigger.
    pub reason: RecoveryReason,
    /// Progress records dropped.
    pub cleared_entities: usize,
    /// Error count before the reset.
    pub errors_cleared: u32,
    /// Selection left in place for a retry.
    pub preserved_selection: Vec<String>,
    /// When the reset finished.
    pub completed_at: Timestamp,
    /// The reset itself panicked; state was forced back to idle.
    pub degraded: bool,
}

type RecoveryCallback = Box<dyn Fn(&RecoveryReport) + Send + Sync>;

/// Drives the recovery state machine.
pub struct RecoveryController {
    max_errors: u32,
    state: RwLock<RecoveryState>,
    reason: Mutex<Option<RecoveryReason>>,
    last_report: Mutex<Option<RecoveryReport>>,
    callbacks: Mutex<Vec<RecoveryCallback>>,
}

impl fmt::Debug for RecoveryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryController")
            .field("max_errors", &self.max_errors)
            .field("state", &*self.state.read())
            .field("reason", &*self.reason.lock())
            .field("callbacks", &self.callbacks.lock().len())
            .finish()
    }
}

impl RecoveryController {
    /// Creates an idle controller that triggers at `max_errors` batch errors.
    #[must_use]
    pub fn new(max_errors: u32) -> Self {
        Self {
            max_errors: max_errors.max(1),
            state: RwLock::new(RecoveryState::Idle),
            reason: Mutex::new(None),
            last_report: Mutex::new(None),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RecoveryState {
        *self.state.read()
    }

    /// Returns true while recovering.
    #[must_use]
    pub fn is_recovering(&self) -> bool {
        self.state() == RecoveryState::Recovering
    }

    /// Error count that triggers recovery.
    #[must_use]
    pub const fn max_errors(&self) -> u32 {
        self.max_errors
    }

    /// Decides whether the batch needs recovery. A stuck flag wins over the
    /// error count.
    #[must_use]
    pub fn evaluate(&self, state: &BatchState) -> Option<RecoveryReason> {
        if state.is_stuck() {
            return Some(RecoveryReason::StuckEscalation);
        }
        let errors = state.error_count();
        (errors >= self.max_errors).then_some(RecoveryReason::ErrorThreshold { errors })
    }

    /// Enters `recovering`. Returns false if already recovering.
    pub fn begin(&self, reason: RecoveryReason) -> bool {
        let mut current = self.state.write();
        if *current == RecoveryState::Recovering {
            return false;
        }
        *current = RecoveryState::Recovering;
        *self.reason.lock() = Some(reason);
        info!(reason = %reason, "Recovery started");
        true
    }

    /// Performs the soft reset, notifies callbacks and returns to idle.
    ///
    /// Called without a prior [`begin`](Self::begin) it recovers for a manual
    /// reason.
    pub fn complete(&self, state: &BatchState, monitor: &StuckMonitor) -> RecoveryReport {
        let reason = self.reason.lock().take().unwrap_or(RecoveryReason::Manual);
        let cleared_entities = state.tracker().len();
        let errors_cleared = state.error_count();

        let reset = catch_unwind(AssertUnwindSafe(|| {
            state.soft_reset();
            monitor.reset();
        }));
        let degraded = reset.is_err();
        if degraded {
            error!(reason = %reason, "Soft reset panicked; forcing idle");
            state.finish();
        }

        let report = RecoveryReport {
            reason,
            cleared_entities,
            errors_cleared,
            preserved_selection: state.selection(),
            completed_at: now_utc(),
            degraded,
        };

        *self.state.write() = RecoveryState::Idle;
        *self.last_report.lock() = Some(report.clone());
        self.notify(&report);

        info!(
            reason = %reason,
            cleared_entities,
            errors_cleared,
            "Recovery completed"
        );
        report
    }

    /// [`begin`](Self::begin) followed by [`complete`](Self::complete).
    /// Returns `None` if a recovery is already in progress.
    pub fn recover(
        &self,
        reason: RecoveryReason,
        state: &BatchState,
        monitor: &StuckMonitor,
    ) -> Option<RecoveryReport> {
        self.begin(reason).then(|| self.complete(state, monitor))
    }

    /// Registers a callback run after every completed recovery.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: Fn(&RecoveryReport) + Send + Sync + 'static,
    {
        self.callbacks.lock().push(Box::new(callback));
    }

    /// Removes and returns the last report, acknowledging it.
    pub fn take_report(&self) -> Option<RecoveryReport> {
        self.last_report.lock().take()
    }

    /// The last report, if not yet acknowledged.
    #[must_use]
    pub fn last_report(&self) -> Option<RecoveryReport> {
        self.last_report.lock().clone()
    }

    fn notify(&self, report: &RecoveryReport) {
        let callbacks = self.callbacks.lock();
        for callback in callbacks.iter() {
            if catch_unwind(AssertUnwindSafe(|| callback(report))).is_err() {
                warn!("Recovery callback panicked");
            }
        }
    }
}

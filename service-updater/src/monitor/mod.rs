//! Stuck-state detection.
//!
//! A sweep flags every `generating` stage of every `updating` entity whose
//! elapsed time exceeds the stage's limit. Escalation is debounced: it takes
//! `threshold` consecutive positive sweeps, and any clean sweep resets the
//! count. The monitor only reads progress; the effects of an escalation are
//! applied to the batch state by [`apply_sweep`].

mod task;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{error, warn};

use crate::config::{StageTimeouts, UpdaterConfig};
use crate::core::{EntityProgress, EntityStatus, StageName};
use crate::events::{EventSink, UpdaterEvent};
use crate::pipeline::BatchState;
use crate::tracker::StageTracker;
use crate::utils::{duration_ms, elapsed_between, Timestamp};

pub use task::MonitorHandle;

/// One stage observed past its limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StuckStage {
    /// Entity.
    pub entity_id: String,
    /// Display name.
    pub entity_name: String,
    /// Stage stuck in `generating`.
    pub stage: StageName,
    /// Time spent generating so far.
    pub elapsed_ms: u64,
    /// Limit for this stage.
    pub limit_ms: u64,
}

/// What a sweep concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepOutcome {
    /// Nothing stuck; the consecutive count is back to zero.
    Clear,
    /// Stuck stages seen, below the escalation threshold or already escalated.
    Notice {
        /// Consecutive positive sweeps so far.
        consecutive: u32,
    },
    /// The threshold was reached on this sweep.
    Escalated {
        /// Consecutive positive sweeps so far.
        consecutive: u32,
    },
}

/// Result of one sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Stages past their limit.
    pub stuck: Vec<StuckStage>,
    /// Debounced conclusion.
    pub outcome: SweepOutcome,
}

impl SweepReport {
    /// Number of distinct entities with at least one stuck stage.
    #[must_use]
    pub fn stuck_entity_count(&self) -> usize {
        let mut ids: Vec<&str> = self.stuck.iter().map(|s| s.entity_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

/// Periodic stuck-stage detector with a debounced escalation.
#[derive(Debug)]
pub struct StuckMonitor {
    timeouts: StageTimeouts,
    threshold: u32,
    consecutive: AtomicU32,
}

impl StuckMonitor {
    /// Creates a monitor. A threshold below one is treated as one.
    #[must_use]
    pub fn new(timeouts: StageTimeouts, threshold: u32) -> Self {
        Self {
            timeouts,
            threshold: threshold.max(1),
            consecutive: AtomicU32::new(0),
        }
    }

    /// Creates a monitor from the updater configuration.
    #[must_use]
    pub fn from_config(config: &UpdaterConfig) -> Self {
        Self::new(config.stage_timeouts.clone(), config.stuck_sweep_threshold)
    }

    /// Stages past their limit at `now`. Pure; no debounce state changes.
    #[must_use]
    pub fn detect(&self, progress: &[EntityProgress], now: Timestamp) -> Vec<StuckStage> {
        progress
            .iter()
            .filter(|entity| entity.status == EntityStatus::Updating)
            .flat_map(|entity| {
                entity.generating_stages().filter_map(move |stage| {
                    let started = entity.stage_started_at.get(&stage)?;
                    let elapsed = elapsed_between(*started, now);
                    let limit = self.timeouts.for_stage(stage);
                    (elapsed > limit).then(|| StuckStage {
                        entity_id: entity.entity_id.clone(),
                        entity_name: entity.entity_name.clone(),
                        stage,
                        elapsed_ms: duration_ms(elapsed),
                        limit_ms: duration_ms(limit),
                    })
                })
            })
            .collect()
    }

    /// Runs one sweep over the tracker and applies the debounce.
    pub fn sweep(&self, tracker: &StageTracker, now: Timestamp) -> SweepReport {
        let stuck = self.detect(&tracker.in_flight(), now);
        self.debounce(stuck)
    }

    /// Applies the debounce to a detection result.
    pub fn debounce(&self, stuck: Vec<StuckStage>) -> SweepReport {
        if stuck.is_empty() {
            self.consecutive.store(0, Ordering::SeqCst);
            return SweepReport {
                stuck,
                outcome: SweepOutcome::Clear,
            };
        }

        let consecutive = self.consecutive.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = if consecutive == self.threshold {
            SweepOutcome::Escalated { consecutive }
        } else {
            SweepOutcome::Notice { consecutive }
        };
        SweepReport { stuck, outcome }
    }

    /// Consecutive positive sweeps so far.
    #[must_use]
    pub fn consecutive_sweeps(&self) -> u32 {
        self.consecutive.load(Ordering::SeqCst)
    }

    /// Escalation threshold.
    #[must_use]
    pub const fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Zeroes the consecutive count.
    pub fn reset(&self) {
        self.consecutive.store(0, Ordering::SeqCst);
    }
}

/// Applies a sweep's effects to the batch: a notice is logged and emitted, an
/// escalation raises the stuck flag and adds exactly one to the error count.
pub fn apply_sweep(report: &SweepReport, state: &BatchState, events: &dyn EventSink) {
    match report.outcome {
        SweepOutcome::Clear => {}
        SweepOutcome::Notice { consecutive } => {
            warn!(
                stuck_entities = report.stuck_entity_count(),
                consecutive,
                "Services appear stuck"
            );
            events.emit(&UpdaterEvent::StuckNotice {
                consecutive,
                stuck: report.stuck.clone(),
            });
        }
        SweepOutcome::Escalated { consecutive } => {
            state.mark_stuck();
            let errors = state.record_error();
            error!(
                stuck_entities = report.stuck_entity_count(),
                consecutive,
                error_count = errors,
                "Stuck state confirmed"
            );
            events.emit(&UpdaterEvent::StuckEscalated {
                stuck: report.stuck.clone(),
            });
        }
    }
}

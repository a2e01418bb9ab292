//! Progress notifications for UI observers.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::{Deserialize, Serialize};

use crate::core::{EntityStatus, StageName, StageStatus};
use crate::monitor::StuckStage;
use crate::pipeline::{BatchSummary, ExecutionMode};
use crate::ports::BatchStatusReport;
use crate::recovery::{RecoveryReason, RecoveryReport};

/// Something observers may want to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdaterEvent {
    /// A batch passed filtering and is about to run.
    BatchStarted {
        /// Foreground run id.
        run_id: String,
        /// Chosen mode.
        mode: ExecutionMode,
        /// Entities that will be processed, in order.
        entity_ids: Vec<String>,
        /// Entities filtered out as already updated.
        skipped: Vec<String>,
    },
    /// An entity entered `updating`.
    EntityStarted {
        /// Entity.
        entity_id: String,
    },
    /// A stage changed status.
    StageChanged {
        /// Entity.
        entity_id: String,
        /// Stage.
        stage: StageName,
        /// New status.
        status: StageStatus,
    },
    /// An entity reached a terminal status.
    EntityFinished {
        /// Entity.
        entity_id: String,
        /// Final status.
        status: EntityStatus,
        /// Verification outcome, if it ran.
        verified: Option<bool>,
        /// Error text for failed entities.
        error: Option<String>,
    },
    /// Stuck stages seen; not yet confirmed.
    StuckNotice {
        /// Consecutive positive sweeps.
        consecutive: u32,
        /// Offending stages.
        stuck: Vec<StuckStage>,
    },
    /// Stuck state confirmed by consecutive sweeps.
    StuckEscalated {
        /// Offending stages.
        stuck: Vec<StuckStage>,
    },
    /// Recovery entered.
    RecoveryStarted {
        /// Trigger.
        reason: RecoveryReason,
    },
    /// Recovery finished and the soft reset applied.
    RecoveryCompleted {
        /// Outcome.
        report: RecoveryReport,
    },
    /// A background batch was accepted.
    BackgroundSubmitted {
        /// Identifier for polling.
        batch_id: String,
        /// Entities submitted.
        entity_count: usize,
    },
    /// A background poll returned.
    BackgroundStatus {
        /// Identifier.
        batch_id: String,
        /// Poll result.
        report: BatchStatusReport,
    },
    /// The batch ended.
    BatchFinished {
        /// Counts.
        summary: BatchSummary,
    },
}

impl UpdaterEvent {
    /// Snake-case event name, matching the serialized `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BatchStarted { .. } => "batch_started",
            Self::EntityStarted { .. } => "entity_started",
            Self::StageChanged { .. } => "stage_changed",
            Self::EntityFinished { .. } => "entity_finished",
            Self::StuckNotice { .. } => "stuck_notice",
            Self::StuckEscalated { .. } => "stuck_escalated",
            Self::RecoveryStarted { .. } => "recovery_started",
            Self::RecoveryCompleted { .. } => "recovery_completed",
            Self::BackgroundSubmitted { .. } => "background_submitted",
            Self::BackgroundStatus { .. } => "background_status",
            Self::BatchFinished { .. } => "batch_finished",
        }
    }
}

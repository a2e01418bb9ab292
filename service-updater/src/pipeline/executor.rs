//! The executor seam shared by foreground and background modes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::BatchState;
use crate::core::{EntityProgress, EntityRef, EntityStatus, StageName};
use crate::errors::UpdaterError;
use crate::events::{EventSink, UpdaterEvent};
use crate::ports::BatchStatusReport;
use crate::recovery::{RecoveryController, RecoveryReason};

/// How a batch is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Sequential, in-process, with live per-stage progress.
    Foreground,
    /// Delegated to the external batch service and polled.
    Background,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Foreground => write!(f, "foreground"),
            Self::Background => write!(f, "background"),
        }
    }
}

/// Operator options for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Process entities even if they already completed a full cycle.
    #[serde(default)]
    pub overwrite: bool,
    /// Forced mode; chosen automatically when `None`.
    #[serde(default)]
    pub mode: Option<ExecutionMode>,
    /// Per-stage prompt overrides.
    #[serde(default)]
    pub custom_prompts: HashMap<StageName, String>,
    /// Opaque parameters forwarded to the background service.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl BatchOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the overwrite flag.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Forces an execution mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Adds a prompt override for one stage.
    #[must_use]
    pub fn with_custom_prompt(mut self, stage: StageName, prompt: impl Into<String>) -> Self {
        self.custom_prompts.insert(stage, prompt.into());
        self
    }

    /// Sets the background parameters.
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// Prompt override for `stage`.
    #[must_use]
    pub fn prompt_for(&self, stage: StageName) -> Option<&str> {
        self.custom_prompts.get(&stage).map(String::as_str)
    }
}

/// One invocation after filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRun {
    /// Identifier used in logs and events.
    pub run_id: Uuid,
    /// Chosen mode.
    pub mode: ExecutionMode,
    /// Entities to process, in selection order.
    pub entities: Vec<EntityRef>,
    /// Entities filtered out as already updated.
    pub skipped: Vec<String>,
    /// Operator options.
    pub options: BatchOptions,
}

impl BatchRun {
    /// Entity ids in processing order.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<String> {
        self.entities.iter().map(|e| e.id.clone()).collect()
    }
}

/// How an executor stopped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
    /// Entity starts stopped because of cancellation.
    pub cancelled: bool,
    /// Entity starts stopped because recovery was entered.
    pub recovery: Option<RecoveryReason>,
    /// Background batch identifier.
    pub background_batch_id: Option<String>,
    /// Terminal background status.
    pub background_report: Option<BatchStatusReport>,
}

/// Counts reported at batch end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Run identifier, absent when nothing was left to process.
    pub run_id: Option<Uuid>,
    /// Mode used.
    pub mode: Option<ExecutionMode>,
    /// Entities that reached a terminal status.
    pub processed: usize,
    /// Entities that completed.
    pub completed: usize,
    /// Entities that failed.
    pub errored: usize,
    /// Entities filtered out before the batch.
    pub skipped: Vec<String>,
    /// Entities verified complete.
    pub verified: usize,
    /// Remaining entities were abandoned after cancellation.
    pub cancelled: bool,
    /// The batch ended in recovery.
    pub recovered: bool,
    /// Background batch identifier.
    pub background_batch_id: Option<String>,
}

impl BatchSummary {
    /// Summary of a batch where every entity was filtered out.
    #[must_use]
    pub fn all_skipped(skipped: Vec<String>) -> Self {
        Self {
            skipped,
            ..Self::default()
        }
    }

    /// Builds the summary from final progress and the executor outcome.
    ///
    /// Background counts come from the terminal status report when one exists,
    /// since per-entity status may be coarse.
    #[must_use]
    pub fn from_progress(run: &BatchRun, progress: &[EntityProgress], outcome: &ExecutionOutcome) -> Self {
        let count = |status: EntityStatus| progress.iter().filter(|p| p.status == status).count();
        let (completed, errored) = match &outcome.background_report {
            Some(report) => (report.completed_count, report.error_count),
            None => (count(EntityStatus::Completed), count(EntityStatus::Error)),
        };

        Self {
            run_id: Some(run.run_id),
            mode: Some(run.mode),
            processed: completed + errored,
            completed,
            errored,
            skipped: run.skipped.clone(),
            verified: progress.iter().filter(|p| p.verified == Some(true)).count(),
            cancelled: outcome.cancelled,
            recovered: outcome.recovery.is_some(),
            background_batch_id: outcome.background_batch_id.clone(),
        }
    }
}

/// Shared handles an executor works against.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Batch state, shared with the monitor and UI.
    pub state: Arc<BatchState>,
    /// Recovery machine consulted at entity boundaries.
    pub recovery: Arc<RecoveryController>,
    /// Progress notifications.
    pub events: Arc<dyn EventSink>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("state", &self.state)
            .field("recovery", &self.recovery)
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    /// Emits an event.
    pub fn emit(&self, event: UpdaterEvent) {
        self.events.emit(&event);
    }
}

/// Runs a filtered batch in one mode.
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    /// Mode this executor implements.
    fn mode(&self) -> ExecutionMode;

    /// Runs the batch. Progress records for `run.entities` are already initialized.
    async fn execute(
        &self,
        run: &BatchRun,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionOutcome, UpdaterError>;
}

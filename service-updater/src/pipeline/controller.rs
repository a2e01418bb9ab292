//! Batch controller: selection, filtering, mode choice, monitor lifecycle and
//! recovery hand-off.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use super::background::BackgroundExecutor;
use super::executor::{
    BatchExecutor, BatchOptions, BatchRun, BatchSummary, ExecutionContext, ExecutionMode,
    ExecutionOutcome,
};
use super::filter::filter_already_updated;
use super::foreground::ForegroundExecutor;
use super::state::{BackgroundProgress, BatchState};
use crate::config::UpdaterConfig;
use crate::core::{EntityProgress, EntityRef};
use crate::errors::UpdaterError;
use crate::events::{EventSink, NoOpEventSink, UpdaterEvent};
use crate::monitor::{apply_sweep, MonitorHandle, StuckMonitor, SweepReport};
use crate::observability::batch_span;
use crate::ports::{Collaborators, UpdateRecorder};
use crate::recovery::{RecoveryController, RecoveryReason, RecoveryReport, RecoveryState};
use crate::utils::{generate_run_id, now_utc};

/// Everything the UI renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSnapshot {
    /// Per-entity progress in selection order.
    pub entities: Vec<EntityProgress>,
    /// Operator selection.
    pub selection: Vec<String>,
    /// A batch is active.
    pub running: bool,
    /// Mode of the current or last batch.
    pub mode: Option<ExecutionMode>,
    /// Batch error counter.
    pub error_count: u32,
    /// Hard stuck flag.
    pub stuck: bool,
    /// Consecutive positive monitor sweeps.
    pub consecutive_stuck_sweeps: u32,
    /// Recovery state.
    pub recovery: RecoveryState,
    /// Unacknowledged recovery outcome.
    pub last_recovery: Option<RecoveryReport>,
    /// Background batch counts.
    pub background: Option<BackgroundProgress>,
}

/// Top-level orchestrator.
pub struct BatchController {
    config: Arc<UpdaterConfig>,
    recorder: Arc<dyn UpdateRecorder>,
    state: Arc<BatchState>,
    monitor: Arc<StuckMonitor>,
    recovery: Arc<RecoveryController>,
    events: Arc<dyn EventSink>,
    foreground: ForegroundExecutor,
    background: Option<BackgroundExecutor>,
}

impl std::fmt::Debug for BatchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchController")
            .field("state", &self.state)
            .field("recovery", &self.recovery)
            .field("has_background", &self.background.is_some())
            .finish_non_exhaustive()
    }
}

impl BatchController {
    /// Creates a controller with no event observers.
    #[must_use]
    pub fn new(config: UpdaterConfig, collaborators: Collaborators) -> Self {
        let config = Arc::new(config);
        Self {
            recorder: Arc::clone(&collaborators.recorder),
            state: Arc::new(BatchState::new()),
            monitor: Arc::new(StuckMonitor::from_config(&config)),
            recovery: Arc::new(RecoveryController::new(config.max_errors_before_recovery)),
            events: Arc::new(NoOpEventSink),
            foreground: ForegroundExecutor::new(&collaborators, Arc::clone(&config)),
            background: collaborators
                .background
                .as_ref()
                .map(|service| BackgroundExecutor::new(Arc::clone(service), config.polling.clone())),
            config,
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Shared batch state.
    #[must_use]
    pub fn state(&self) -> Arc<BatchState> {
        Arc::clone(&self.state)
    }

    /// Recovery machine.
    #[must_use]
    pub fn recovery(&self) -> &RecoveryController {
        &self.recovery
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Replaces the operator selection without starting anything.
    pub fn select(&self, entity_ids: Vec<String>) {
        self.state.set_selection(entity_ids);
    }

    /// Picks the mode for `count` entities. An explicit request wins; otherwise
    /// background once the selection exceeds the threshold and a batch service
    /// is wired.
    pub fn decide_mode(&self, requested: Option<ExecutionMode>, count: usize) -> Result<ExecutionMode, UpdaterError> {
        match requested {
            Some(ExecutionMode::Background) if self.background.is_none() => Err(UpdaterError::Config(
                "background mode requested but no batch service is configured".to_string(),
            )),
            Some(mode) => Ok(mode),
            None if self.background.is_some() && count > self.config.background_threshold => {
                Ok(ExecutionMode::Background)
            }
            None => Ok(ExecutionMode::Foreground),
        }
    }

    /// Runs a batch to completion and returns its summary.
    ///
    /// The selection is stored before filtering so recovery can preserve it.
    pub async fn start_batch(
        &self,
        entities: Vec<EntityRef>,
        options: BatchOptions,
    ) -> Result<BatchSummary, UpdaterError> {
        if entities.is_empty() {
            return Err(UpdaterError::EmptySelection);
        }
        if self.recovery.is_recovering() {
            return Err(UpdaterError::Recovering);
        }
        self.state.begin()?;
        self.state
            .set_selection(entities.iter().map(|e| e.id.clone()).collect());
        self.monitor.reset();

        let result = self.run_batch(entities, options).await;
        if result.is_err() {
            self.state.finish();
        }
        result
    }

    /// Runs [`start_batch`](Self::start_batch) on a spawned task.
    pub fn spawn_batch(
        self: &Arc<Self>,
        entities: Vec<EntityRef>,
        options: BatchOptions,
    ) -> JoinHandle<Result<BatchSummary, UpdaterError>> {
        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.start_batch(entities, options).await })
    }

    async fn run_batch(
        &self,
        entities: Vec<EntityRef>,
        options: BatchOptions,
    ) -> Result<BatchSummary, UpdaterError> {
        let selection = filter_already_updated(&*self.recorder, entities, options.overwrite).await;
        if selection.included.is_empty() {
            info!(skipped = selection.skipped.len(), "Every selected service is already updated");
            self.state.tracker().clear();
            self.state.finish();
            let summary = BatchSummary::all_skipped(selection.skipped);
            self.emit(UpdaterEvent::BatchFinished {
                summary: summary.clone(),
            });
            return Ok(summary);
        }

        let mode = self.decide_mode(options.mode, selection.included.len())?;
        let run = BatchRun {
            run_id: generate_run_id(),
            mode,
            entities: selection.included,
            skipped: selection.skipped,
            options,
        };

        self.state.tracker().initialize(&run.entities);
        self.state.set_mode(mode);
        self.emit(UpdaterEvent::BatchStarted {
            run_id: run.run_id.to_string(),
            mode,
            entity_ids: run.entity_ids(),
            skipped: run.skipped.clone(),
        });
        info!(
            run_id = %run.run_id,
            mode = %mode,
            entities = run.entities.len(),
            skipped = run.skipped.len(),
            "Batch started"
        );

        let ctx = ExecutionContext {
            state: Arc::clone(&self.state),
            recovery: Arc::clone(&self.recovery),
            events: Arc::clone(&self.events),
        };

        let outcome = match mode {
            ExecutionMode::Foreground => {
                let monitor = MonitorHandle::spawn(
                    Arc::clone(&self.monitor),
                    Arc::clone(&self.state),
                    Arc::clone(&self.events),
                    self.config.monitor_interval(),
                );
                let outcome = self
                    .foreground
                    .execute(&run, &ctx)
                    .instrument(batch_span(&run))
                    .await;
                monitor.stop().await;
                outcome?
            }
            ExecutionMode::Background => match &self.background {
                Some(executor) => {
                    executor
                        .execute(&run, &ctx)
                        .instrument(batch_span(&run))
                        .await?
                }
                None => {
                    return Err(UpdaterError::Config(
                        "no background batch service is configured".to_string(),
                    ))
                }
            },
        };

        Ok(self.finish_batch(&run, &outcome))
    }

    fn finish_batch(&self, run: &BatchRun, outcome: &ExecutionOutcome) -> BatchSummary {
        let summary = BatchSummary::from_progress(run, &self.state.tracker().snapshot(), outcome);

        if outcome.recovery.is_some() {
            let report = self.recovery.complete(&self.state, &self.monitor);
            self.emit(UpdaterEvent::RecoveryCompleted { report });
        } else {
            self.state.finish();
        }

        info!(
            run_id = %run.run_id,
            completed = summary.completed,
            errored = summary.errored,
            skipped = summary.skipped.len(),
            verified = summary.verified,
            cancelled = summary.cancelled,
            recovered = summary.recovered,
            "Batch finished"
        );
        self.emit(UpdaterEvent::BatchFinished {
            summary: summary.clone(),
        });
        summary
    }

    /// Requests cancellation at the next entity boundary.
    ///
    /// Returns false when nothing can be cancelled: no batch is running, the
    /// batch runs in background mode, or cancellation was already requested.
    pub fn cancel_batch(&self, reason: impl Into<String>) -> bool {
        if !self.state.is_running() {
            return false;
        }
        if self.state.mode() == Some(ExecutionMode::Background) {
            warn!("Background batches cannot be cancelled once submitted");
            return false;
        }
        let reason = reason.into();
        let accepted = self.state.cancellation().cancel(reason.clone());
        if accepted {
            info!(reason = %reason, "Batch cancellation requested");
        }
        accepted
    }

    /// Acknowledges the last recovery, or performs a manual soft reset when
    /// none is pending. Refused while a batch is running.
    pub fn acknowledge_recovery(&self) -> Result<RecoveryReport, UpdaterError> {
        if self.state.is_running() {
            return Err(UpdaterError::AlreadyRunning);
        }
        if let Some(report) = self.recovery.take_report() {
            return Ok(report);
        }
        if !self.recovery.is_recovering() {
            self.recovery.begin(RecoveryReason::Manual);
            self.emit(UpdaterEvent::RecoveryStarted {
                reason: RecoveryReason::Manual,
            });
        }
        let report = self.recovery.complete(&self.state, &self.monitor);
        self.emit(UpdaterEvent::RecoveryCompleted {
            report: report.clone(),
        });
        self.recovery.take_report();
        Ok(report)
    }

    /// Runs one monitor sweep immediately and applies its effects.
    pub fn sweep_now(&self) -> SweepReport {
        let report = self.monitor.sweep(self.state.tracker(), now_utc());
        apply_sweep(&report, &self.state, &*self.events);
        report
    }

    /// Current state for the UI.
    #[must_use]
    pub fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            entities: self.state.tracker().snapshot(),
            selection: self.state.selection(),
            running: self.state.is_running(),
            mode: self.state.mode(),
            error_count: self.state.error_count(),
            stuck: self.state.is_stuck(),
            consecutive_stuck_sweeps: self.monitor.consecutive_sweeps(),
            recovery: self.recovery.state(),
            last_recovery: self.recovery.last_report(),
            background: self.state.background(),
        }
    }

    fn emit(&self, event: UpdaterEvent) {
        self.events.emit(&event);
    }
}

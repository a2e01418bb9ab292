//! Background executor: submit once, then poll until a terminal status.
//!
//! The batch service reports aggregate counts only, so per-stage progress is
//! not visible: entities show as `updating` with their stages left `pending`
//! until the terminal poll. Transport failures are retried on the longer
//! retry interval, up to `max_consecutive_failures` in a row. An unknown batch
//! id, or too many failures, abandons the batch and marks every entity
//! `error`. Cancellation is not supported once a batch is submitted.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::executor::{BatchExecutor, BatchRun, ExecutionContext, ExecutionMode, ExecutionOutcome};
use crate::config::PollingConfig;
use crate::core::EntityStatus;
use crate::errors::{BatchServiceError, UpdaterError};
use crate::events::UpdaterEvent;
use crate::ports::{BackgroundBatchService, BackgroundStatus, BatchStatusReport, BatchSubmission};
use crate::utils::duration_ms;

/// Submit-and-poll executor.
pub struct BackgroundExecutor {
    service: Arc<dyn BackgroundBatchService>,
    polling: PollingConfig,
}

impl std::fmt::Debug for BackgroundExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundExecutor")
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

impl BackgroundExecutor {
    /// Creates an executor over a batch service.
    #[must_use]
    pub fn new(service: Arc<dyn BackgroundBatchService>, polling: PollingConfig) -> Self {
        Self { service, polling }
    }

    async fn poll_until_terminal(
        &self,
        batch_id: &str,
        ctx: &ExecutionContext,
    ) -> Result<BatchStatusReport, BatchServiceError> {
        let mut wait = self.polling.interval();
        loop {
            tokio::time::sleep(wait).await;

            match self.service.poll_status(batch_id).await {
                Ok(report) => {
                    debug!(
                        batch_id = %batch_id,
                        status = %report.status,
                        completed = report.completed_count,
                        total = report.total_count,
                        errors = report.error_count,
                        "Background batch status"
                    );
                    ctx.state.record_background_report(report.clone());
                    ctx.emit(UpdaterEvent::BackgroundStatus {
                        batch_id: batch_id.to_string(),
                        report: report.clone(),
                    });
                    if report.status.is_terminal() {
                        return Ok(report);
                    }
                    wait = self.polling.interval();
                }
                Err(e @ BatchServiceError::Transport(_)) => {
                    let failures = ctx.state.record_background_poll_failure();
                    if failures >= self.polling.max_consecutive_failures {
                        warn!(
                            batch_id = %batch_id,
                            error = %e,
                            consecutive_failures = failures,
                            "Status polling exhausted; abandoning batch"
                        );
                        return Err(e);
                    }
                    wait = self.polling.retry_interval();
                    warn!(
                        batch_id = %batch_id,
                        error = %e,
                        consecutive_failures = failures,
                        retry_in_ms = duration_ms(wait),
                        "Status poll failed; retrying"
                    );
                }
                Err(e) => {
                    warn!(batch_id = %batch_id, error = %e, "Status poll failed permanently");
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl BatchExecutor for BackgroundExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Background
    }

    async fn execute(
        &self,
        run: &BatchRun,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionOutcome, UpdaterError> {
        let submission = BatchSubmission {
            entity_ids: run.entity_ids(),
            overwrite: run.options.overwrite,
            custom_prompts: run.options.custom_prompts.clone(),
            params: run.options.params.clone(),
        };

        let batch_id = match self.service.submit_batch(&submission).await {
            Ok(id) => id,
            Err(e) => {
                fail_entities(run, ctx, &format!("background submission failed: {e}"));
                return Err(e.into());
            }
        };

        ctx.state.set_background_batch(batch_id.clone());
        for entity in &run.entities {
            ctx.state
                .tracker()
                .set_entity_status(&entity.id, EntityStatus::Updating, None);
        }
        ctx.emit(UpdaterEvent::BackgroundSubmitted {
            batch_id: batch_id.clone(),
            entity_count: run.entities.len(),
        });
        info!(
            run_id = %run.run_id,
            batch_id = %batch_id,
            entities = run.entities.len(),
            "Background batch submitted"
        );

        let report = match self.poll_until_terminal(&batch_id, ctx).await {
            Ok(report) => report,
            Err(e) => {
                fail_entities(run, ctx, &format!("background status unavailable: {e}"));
                return Err(e.into());
            }
        };
        apply_terminal_report(run, &report, ctx);
        info!(
            batch_id = %batch_id,
            status = %report.status,
            completed = report.completed_count,
            errors = report.error_count,
            "Background batch finished"
        );

        Ok(ExecutionOutcome {
            background_batch_id: Some(batch_id),
            background_report: Some(report),
            ..ExecutionOutcome::default()
        })
    }
}

fn fail_entities(run: &BatchRun, ctx: &ExecutionContext, message: &str) {
    for entity in &run.entities {
        ctx.state
            .tracker()
            .set_entity_status(&entity.id, EntityStatus::Error, Some(message.to_string()));
    }
}

/// Marks entities from the terminal report. Listed failures become `error`;
/// the rest become `completed` since no finer detail is available.
fn apply_terminal_report(run: &BatchRun, report: &BatchStatusReport, ctx: &ExecutionContext) {
    let failed: HashSet<&str> = report.failed_entity_ids.iter().map(String::as_str).collect();
    let tracker = ctx.state.tracker();

    for entity in &run.entities {
        if failed.contains(entity.id.as_str()) {
            tracker.set_entity_status(
                &entity.id,
                EntityStatus::Error,
                Some("failed in background batch".to_string()),
            );
            ctx.state.record_error();
        } else {
            tracker.set_entity_status(&entity.id, EntityStatus::Completed, None);
        }
    }

    if report.status == BackgroundStatus::CompletedWithErrors && failed.is_empty() {
        warn!(
            errors = report.error_count,
            "Background batch reported errors without naming entities"
        );
    }
}

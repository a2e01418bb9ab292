//! Foreground executor: one entity at a time, one stage at a time.
//!
//! Stage tolerance per entity:
//! - `research` and `funnel` are best effort; the funnel call is also raced
//!   against a hard timeout.
//! - `details`, `disclaimer` and `faqs` are required; a failure aborts the
//!   remaining generation for that entity.
//! - `verification` always runs last and reads the persisted record.
//!
//! Cancellation and recovery are only honoured between entities.

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::executor::{BatchExecutor, BatchOptions, BatchRun, ExecutionContext, ExecutionMode, ExecutionOutcome};
use super::verification::verify_entity;
use crate::config::UpdaterConfig;
use crate::core::{EntityRef, EntityStatus, ServiceRecord, StageName, StageStatus};
use crate::errors::{GenerationError, UpdaterError};
use crate::events::UpdaterEvent;
use crate::generation::GenerationClient;
use crate::merge::{plan_merge, MergeLimits, StageOutputs};
use crate::ports::{ChildRecords, Collaborators, PersistenceService, UpdateOptions, UpdateRecorder};

/// How one entity ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityOutcome {
    /// Entity.
    pub entity_id: String,
    /// Terminal status.
    pub status: EntityStatus,
    /// Verification result, `None` if verification could not run.
    pub verified: Option<bool>,
    /// Why the entity failed.
    pub error: Option<String>,
}

/// Sequential in-process executor.
pub struct ForegroundExecutor {
    generation: GenerationClient,
    persistence: Arc<dyn PersistenceService>,
    recorder: Arc<dyn UpdateRecorder>,
    config: Arc<UpdaterConfig>,
}

impl std::fmt::Debug for ForegroundExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForegroundExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ForegroundExecutor {
    /// Creates an executor over the given collaborators.
    #[must_use]
    pub fn new(collaborators: &Collaborators, config: Arc<UpdaterConfig>) -> Self {
        Self {
            generation: GenerationClient::new(Arc::clone(&collaborators.generation)),
            persistence: Arc::clone(&collaborators.persistence),
            recorder: Arc::clone(&collaborators.recorder),
            config,
        }
    }

    fn update_options(&self) -> UpdateOptions {
        UpdateOptions {
            retry_attempts: self.config.update_retry_attempts,
        }
    }

    /// Runs the full stage sequence for one entity and records its terminal status.
    pub async fn process_service(
        &self,
        entity: &EntityRef,
        options: &BatchOptions,
        ctx: &ExecutionContext,
    ) -> EntityOutcome {
        let tracker = ctx.state.tracker();
        tracker.set_entity_status(&entity.id, EntityStatus::Updating, None);
        ctx.emit(UpdaterEvent::EntityStarted {
            entity_id: entity.id.clone(),
        });
        info!(entity_id = %entity.id, entity_name = %entity.name, "Updating service");

        let generated = self.generate_and_persist(entity, options, ctx).await;
        let verified = self.verify(entity, ctx).await;

        let outcome = match generated {
            Ok(()) => {
                tracker.set_entity_status(&entity.id, EntityStatus::Completed, None);
                info!(entity_id = %entity.id, verified = ?verified, "Service updated");
                EntityOutcome {
                    entity_id: entity.id.clone(),
                    status: EntityStatus::Completed,
                    verified,
                    error: None,
                }
            }
            Err(message) => {
                tracker.set_entity_status(&entity.id, EntityStatus::Error, Some(message.clone()));
                let errors = ctx.state.record_error();
                error!(
                    entity_id = %entity.id,
                    error = %message,
                    error_count = errors,
                    "Service update failed"
                );
                EntityOutcome {
                    entity_id: entity.id.clone(),
                    status: EntityStatus::Error,
                    verified,
                    error: Some(message),
                }
            }
        };

        ctx.emit(UpdaterEvent::EntityFinished {
            entity_id: outcome.entity_id.clone(),
            status: outcome.status,
            verified: outcome.verified,
            error: outcome.error.clone(),
        });
        outcome
    }

    async fn generate_and_persist(
        &self,
        entity: &EntityRef,
        options: &BatchOptions,
        ctx: &ExecutionContext,
    ) -> Result<(), String> {
        let service = self
            .persistence
            .fetch_entity(&entity.id)
            .await
            .map_err(|e| format!("failed to load service: {e}"))?;
        let mut completed = Vec::new();

        let research = match self.run_stage(StageName::Research, &service, None, options, ctx).await {
            Ok(data) => {
                completed.push(StageName::Research);
                Some(data)
            }
            Err(e) => {
                warn!(entity_id = %entity.id, error = %e, "Research failed; continuing without context");
                None
            }
        };

        let details = self
            .run_required(StageName::Details, &service, research.as_ref(), options, ctx)
            .await?;
        completed.push(StageName::Details);

        let disclaimer = self
            .run_required(StageName::Disclaimer, &service, research.as_ref(), options, ctx)
            .await?;
        completed.push(StageName::Disclaimer);

        let funnel = match self.run_stage(StageName::Funnel, &service, research.as_ref(), options, ctx).await {
            Ok(data) => {
                completed.push(StageName::Funnel);
                Some(data)
            }
            Err(e) if e.is_timeout() => {
                warn!(entity_id = %entity.id, error = %e, "Funnel generation timed out; continuing");
                None
            }
            Err(e) => {
                warn!(entity_id = %entity.id, error = %e, "Funnel generation failed; continuing");
                None
            }
        };

        let faqs = self
            .run_required(StageName::Faqs, &service, research.as_ref(), options, ctx)
            .await?;
        completed.push(StageName::Faqs);

        let outputs = StageOutputs {
            details: Some(details),
            disclaimer: Some(disclaimer),
            funnel,
            faqs: Some(faqs),
        };
        self.persist(&service, &outputs).await?;

        for stage in completed {
            if let Err(e) = self
                .recorder
                .record_stage_update(&entity.id, stage, "content generated")
                .await
            {
                warn!(entity_id = %entity.id, stage = %stage, error = %e, "Failed to record stage update");
            }
        }
        Ok(())
    }

    async fn persist(&self, service: &ServiceRecord, outputs: &StageOutputs) -> Result<(), String> {
        let plan = plan_merge(service, outputs, MergeLimits::from(&*self.config));

        if !plan.update.is_empty() {
            self.persistence
                .update_entity(&service.id, &plan.update, self.update_options())
                .await
                .map_err(|e| format!("failed to save generated content: {e}"))?;
        }
        if let Some(faqs) = plan.faqs {
            self.persistence
                .replace_child_records(&service.id, &ChildRecords::Faqs(faqs))
                .await
                .map_err(|e| format!("failed to save FAQs: {e}"))?;
        }
        Ok(())
    }

    async fn run_required(
        &self,
        stage: StageName,
        service: &ServiceRecord,
        research: Option<&serde_json::Value>,
        options: &BatchOptions,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, String> {
        self.run_stage(stage, service, research, options, ctx)
            .await
            .map_err(|e| e.to_string())
    }

    async fn run_stage(
        &self,
        stage: StageName,
        service: &ServiceRecord,
        research: Option<&serde_json::Value>,
        options: &BatchOptions,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, GenerationError> {
        transition(ctx, &service.id, stage, StageStatus::Generating);

        let prompt = options.prompt_for(stage);
        let result = if stage == StageName::Funnel {
            self.generation
                .generate_with_timeout(stage, service, research, prompt, self.config.funnel_timeout())
                .await
        } else {
            self.generation.generate(stage, service, research, prompt).await
        };

        match result {
            Ok(content) => {
                transition(ctx, &service.id, stage, StageStatus::Completed);
                Ok(content.data)
            }
            Err(e) => {
                transition(ctx, &service.id, stage, StageStatus::Error);
                Err(e)
            }
        }
    }

    async fn verify(&self, entity: &EntityRef, ctx: &ExecutionContext) -> Option<bool> {
        let stage = StageName::Verification;
        transition(ctx, &entity.id, stage, StageStatus::Generating);

        match verify_entity(&*self.persistence, &entity.id, self.update_options()).await {
            Ok(report) => {
                transition(ctx, &entity.id, stage, StageStatus::Completed);
                ctx.state.tracker().set_verified(&entity.id, report.verified);
                let notes = if report.verified {
                    "verified".to_string()
                } else {
                    let missing: Vec<_> = report.missing.iter().map(|f| f.as_str()).collect();
                    format!("incomplete: {}", missing.join(", "))
                };
                if let Err(e) = self.recorder.record_stage_update(&entity.id, stage, &notes).await {
                    warn!(entity_id = %entity.id, error = %e, "Failed to record verification");
                }
                Some(report.verified)
            }
            Err(e) => {
                transition(ctx, &entity.id, stage, StageStatus::Error);
                warn!(entity_id = %entity.id, error = %e, "Verification could not run");
                None
            }
        }
    }
}

/// Writes a stage transition and notifies observers.
fn transition(ctx: &ExecutionContext, entity_id: &str, stage: StageName, status: StageStatus) {
    match ctx.state.tracker().set_stage(entity_id, stage, status) {
        Ok(()) => ctx.emit(UpdaterEvent::StageChanged {
            entity_id: entity_id.to_string(),
            stage,
            status,
        }),
        Err(e) => warn!(entity_id = %entity_id, stage = %stage, error = %e, "Rejected stage transition"),
    }
}

#[async_trait]
impl BatchExecutor for ForegroundExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Foreground
    }

    async fn execute(
        &self,
        run: &BatchRun,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionOutcome, UpdaterError> {
        let mut outcome = ExecutionOutcome::default();
        let delay = self.config.inter_entity_delay();

        for (index, entity) in run.entities.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if let Err(e) = ctx.state.cancellation().check() {
                info!(
                    run_id = %run.run_id,
                    remaining = run.entities.len() - index,
                    reason = %e,
                    "Batch cancelled"
                );
                outcome.cancelled = true;
                break;
            }

            if let Some(reason) = ctx.recovery.evaluate(&ctx.state) {
                if ctx.recovery.begin(reason) {
                    ctx.emit(UpdaterEvent::RecoveryStarted { reason });
                }
                warn!(
                    run_id = %run.run_id,
                    remaining = run.entities.len() - index,
                    reason = %reason,
                    "Stopping batch for recovery"
                );
                outcome.recovery = Some(reason);
                break;
            }

            let processed = AssertUnwindSafe(self.process_service(entity, &run.options, ctx))
                .catch_unwind()
                .await;
            if processed.is_err() {
                let message = "internal error while processing service".to_string();
                ctx.state
                    .tracker()
                    .set_entity_status(&entity.id, EntityStatus::Error, Some(message.clone()));
                let errors = ctx.state.record_error();
                error!(entity_id = %entity.id, error_count = errors, "Service processing panicked");
                ctx.emit(UpdaterEvent::EntityFinished {
                    entity_id: entity.id.clone(),
                    status: EntityStatus::Error,
                    verified: None,
                    error: Some(message),
                });
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::pipeline::BatchState;
    use crate::recorder::InMemoryUpdateRecorder;
    use crate::recovery::RecoveryController;
    use crate::testing::{bare_service, entity_refs, InMemoryPersistence, ScriptedGenerationService};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use uuid::Uuid;

    struct Harness {
        executor: ForegroundExecutor,
        ctx: ExecutionContext,
        generation: Arc<ScriptedGenerationService>,
        persistence: Arc<InMemoryPersistence>,
        recorder: Arc<InMemoryUpdateRecorder>,
        events: Arc<CollectingEventSink>,
    }

    fn harness(generation: ScriptedGenerationService, ids: &[&str]) -> Harness {
        let generation = Arc::new(generation);
        let persistence = Arc::new(InMemoryPersistence::new().with_services(
            ids.iter().map(|id| bare_service(id)),
        ));
        let recorder = Arc::new(InMemoryUpdateRecorder::new());
        let events = Arc::new(CollectingEventSink::new());
        let collaborators = Collaborators::new(
            generation.clone(),
            persistence.clone(),
            recorder.clone(),
        );
        let config = UpdaterConfig::default()
            .with_inter_entity_delay(Duration::ZERO)
            .with_funnel_timeout(Duration::from_millis(50));

        let state = Arc::new(BatchState::new());
        state.begin().unwrap();
        state.tracker().initialize(&entity_refs(ids));

        Harness {
            executor: ForegroundExecutor::new(&collaborators, Arc::new(config)),
            ctx: ExecutionContext {
                state,
                recovery: Arc::new(RecoveryController::new(5)),
                events: events.clone(),
            },
            generation,
            persistence,
            recorder,
            events,
        }
    }

    fn run_of(ids: &[&str], options: BatchOptions) -> BatchRun {
        BatchRun {
            run_id: Uuid::now_v7(),
            mode: ExecutionMode::Foreground,
            entities: entity_refs(ids),
            skipped: Vec::new(),
            options,
        }
    }

    #[tokio::test]
    async fn test_happy_path_completes_and_verifies() {
        let h = harness(ScriptedGenerationService::new(), &["svc-1"]);
        let outcome = h
            .executor
            .process_service(&entity_refs(&["svc-1"])[0], &BatchOptions::new(), &h.ctx)
            .await;

        assert_eq!(outcome.status, EntityStatus::Completed);
        assert_eq!(outcome.verified, Some(true));

        let progress = h.ctx.state.tracker().get("svc-1").unwrap();
        assert!(progress.stages.values().all(|s| *s == StageStatus::Completed));
        assert!(progress.current_stage.is_none());
        assert!(h.persistence.get("svc-1").unwrap().ai_verified);
        assert_eq!(h.persistence.faqs("svc-1").len(), 3);
        assert!(h.recorder.has_full_cycle("svc-1"));
        assert_eq!(h.events.of_kind("entity_finished").len(), 1);
    }

    #[tokio::test]
    async fn test_research_failure_is_tolerated() {
        let h = harness(
            ScriptedGenerationService::new().with_failure(StageName::Research),
            &["svc-1"],
        );
        let outcome = h
            .executor
            .process_service(&entity_refs(&["svc-1"])[0], &BatchOptions::new(), &h.ctx)
            .await;

        assert_eq!(outcome.status, EntityStatus::Completed);
        let progress = h.ctx.state.tracker().get("svc-1").unwrap();
        assert_eq!(progress.stage(StageName::Research), StageStatus::Error);
        assert_eq!(progress.stage(StageName::Details), StageStatus::Completed);
        assert!(h
            .generation
            .requests()
            .iter()
            .all(|r| r.prior_research.is_none()));
    }

    #[tokio::test]
    async fn test_required_failure_aborts_but_verification_runs() {
        let h = harness(
            ScriptedGenerationService::new().with_failure(StageName::Details),
            &["svc-1"],
        );
        let outcome = h
            .executor
            .process_service(&entity_refs(&["svc-1"])[0], &BatchOptions::new(), &h.ctx)
            .await;

        assert_eq!(outcome.status, EntityStatus::Error);
        assert_eq!(outcome.verified, Some(false));
        assert_eq!(h.ctx.state.error_count(), 1);

        let progress = h.ctx.state.tracker().get("svc-1").unwrap();
        assert_eq!(progress.stage(StageName::Details), StageStatus::Error);
        assert_eq!(progress.stage(StageName::Disclaimer), StageStatus::Pending);
        assert_eq!(progress.stage(StageName::Faqs), StageStatus::Pending);
        assert_eq!(progress.stage(StageName::Verification), StageStatus::Completed);
        assert!(progress.error.is_some());
        assert_eq!(h.persistence.update_count(), 0);
    }

    #[tokio::test]
    async fn test_funnel_failure_is_tolerated() {
        let h = harness(
            ScriptedGenerationService::new().with_failure(StageName::Funnel),
            &["svc-1"],
        );
        let outcome = h
            .executor
            .process_service(&entity_refs(&["svc-1"])[0], &BatchOptions::new(), &h.ctx)
            .await;

        assert_eq!(outcome.status, EntityStatus::Completed);
        assert_eq!(outcome.verified, Some(false));
        let progress = h.ctx.state.tracker().get("svc-1").unwrap();
        assert_eq!(progress.stage(StageName::Funnel), StageStatus::Error);
        assert_eq!(progress.stage(StageName::Faqs), StageStatus::Completed);
    }

    #[tokio::test]
    async fn test_persistence_failure_fails_entity() {
        let h = harness(ScriptedGenerationService::new(), &["svc-1"]);
        h.persistence.fail_updates_for("svc-1");

        let outcome = h
            .executor
            .process_service(&entity_refs(&["svc-1"])[0], &BatchOptions::new(), &h.ctx)
            .await;

        assert_eq!(outcome.status, EntityStatus::Error);
        assert!(outcome.error.unwrap().contains("failed to save"));
        assert!(!h.recorder.has_full_cycle("svc-1"));
    }

    #[tokio::test]
    async fn test_custom_prompt_forwarded() {
        let h = harness(ScriptedGenerationService::new(), &["svc-1"]);
        let options = BatchOptions::new().with_custom_prompt(StageName::Faqs, "Answer briefly");
        h.executor
            .process_service(&entity_refs(&["svc-1"])[0], &options, &h.ctx)
            .await;

        let requests = h.generation.requests();
        let faqs = requests.iter().find(|r| r.stage == StageName::Faqs).unwrap();
        assert_eq!(faqs.custom_prompt.as_deref(), Some("Answer briefly"));
        let details = requests.iter().find(|r| r.stage == StageName::Details).unwrap();
        assert_eq!(details.custom_prompt, None);
        assert!(details.prior_research.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_batch_starts_nothing() {
        let h = harness(ScriptedGenerationService::new(), &["svc-1", "svc-2"]);
        h.ctx.state.cancellation().cancel("operator stop");

        let outcome = h
            .executor
            .execute(&run_of(&["svc-1", "svc-2"], BatchOptions::new()), &h.ctx)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(h.generation.call_count(), 0);
    }

    #[tokio::test]
    async fn test_entities_processed_in_selection_order() {
        let h = harness(ScriptedGenerationService::new(), &["svc-2", "svc-1"]);
        h.executor
            .execute(&run_of(&["svc-2", "svc-1"], BatchOptions::new()), &h.ctx)
            .await
            .unwrap();

        let order: Vec<_> = h
            .events
            .of_kind("entity_started")
            .into_iter()
            .filter_map(|event| match event {
                UpdaterEvent::EntityStarted { entity_id } => Some(entity_id),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec!["svc-2".to_string(), "svc-1".to_string()]);
    }
}

//! End-to-end batch scenarios.

#[cfg(test)]
mod tests {
    use crate::config::{PollingConfig, StageTimeouts, UpdaterConfig};
    use crate::core::{EntityStatus, StageName, StageStatus};
    use crate::errors::{BatchServiceError, UpdaterError};
    use crate::events::{CollectingEventSink, UpdaterEvent};
    use crate::monitor::SweepOutcome;
    use crate::pipeline::{
        verify_entity, BatchController, BatchOptions, ExecutionMode, RequiredField,
    };
    use crate::ports::{BackgroundStatus, BatchStatusReport, Collaborators, UpdateOptions};
    use crate::recorder::InMemoryUpdateRecorder;
    use crate::recovery::{RecoveryReason, RecoveryState};
    use crate::testing::{
        bare_service, complete_service_record, entity_refs, InMemoryPersistence,
        ScriptedBatchService, ScriptedGenerationService,
    };
    use crate::utils::now_utc;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    struct World {
        controller: Arc<BatchController>,
        generation: Arc<ScriptedGenerationService>,
        persistence: Arc<InMemoryPersistence>,
        recorder: Arc<InMemoryUpdateRecorder>,
        events: Arc<CollectingEventSink>,
    }

    fn fast_config() -> UpdaterConfig {
        UpdaterConfig::default()
            .with_inter_entity_delay(Duration::ZERO)
            .with_funnel_timeout(Duration::from_millis(50))
    }

    fn world(
        config: UpdaterConfig,
        generation: ScriptedGenerationService,
        ids: &[&str],
        background: Option<Arc<ScriptedBatchService>>,
    ) -> World {
        let generation = Arc::new(generation);
        let persistence = Arc::new(
            InMemoryPersistence::new().with_services(ids.iter().map(|id| bare_service(id))),
        );
        let recorder = Arc::new(InMemoryUpdateRecorder::new());
        let events = Arc::new(CollectingEventSink::new());

        let mut collaborators =
            Collaborators::new(generation.clone(), persistence.clone(), recorder.clone());
        if let Some(background) = background {
            collaborators = collaborators.with_background(background);
        }
        let controller = BatchController::new(config, collaborators).with_event_sink(events.clone());

        World {
            controller: Arc::new(controller),
            generation,
            persistence,
            recorder,
            events,
        }
    }

    #[tokio::test]
    async fn test_already_updated_entities_are_filtered() {
        let w = world(fast_config(), ScriptedGenerationService::new(), &["a", "b", "c"], None);
        w.recorder.seed_full_cycle("a");

        let summary = w
            .controller
            .start_batch(entity_refs(&["a", "b", "c"]), BatchOptions::new())
            .await
            .unwrap();

        assert_eq!(w.generation.entities_seen(), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(summary.skipped, vec!["a".to_string()]);
        assert_eq!(summary.completed, 2);
        let tracked: Vec<_> = w
            .controller
            .snapshot()
            .entities
            .into_iter()
            .map(|p| p.entity_id)
            .collect();
        assert_eq!(tracked, vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn test_overwrite_processes_everything() {
        let w = world(fast_config(), ScriptedGenerationService::new(), &["a", "b"], None);
        w.recorder.seed_full_cycle("a");

        let summary = w
            .controller
            .start_batch(entity_refs(&["a", "b"]), BatchOptions::new().with_overwrite(true))
            .await
            .unwrap();

        assert_eq!(summary.completed, 2);
        assert!(summary.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_all_filtered_returns_empty_summary() {
        let w = world(fast_config(), ScriptedGenerationService::new(), &["a"], None);
        w.recorder.seed_full_cycle("a");

        let summary = w
            .controller
            .start_batch(entity_refs(&["a"]), BatchOptions::new())
            .await
            .unwrap();

        assert_eq!(summary.processed, 0);
        assert_eq!(summary.skipped, vec!["a".to_string()]);
        assert_eq!(w.generation.call_count(), 0);
        assert!(!w.controller.state().is_running());
    }

    #[tokio::test]
    async fn test_funnel_timeout_is_tolerated_end_to_end() {
        let generation = ScriptedGenerationService::new().with_delay_for(
            "svc-1",
            StageName::Funnel,
            Duration::from_millis(500),
        );
        let w = world(fast_config(), generation, &["svc-1", "svc-2"], None);

        let summary = w
            .controller
            .start_batch(entity_refs(&["svc-1", "svc-2"]), BatchOptions::new())
            .await
            .unwrap();

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.errored, 0);

        let first = w.controller.state().tracker().get("svc-1").unwrap();
        assert_eq!(first.status, EntityStatus::Completed);
        assert_eq!(first.stage(StageName::Funnel), StageStatus::Error);
        assert_eq!(first.stage(StageName::Details), StageStatus::Completed);
        assert_eq!(first.verified, Some(false));

        let second = w.controller.state().tracker().get("svc-2").unwrap();
        assert_eq!(second.status, EntityStatus::Completed);
        assert!(second.stages.values().all(|s| *s == StageStatus::Completed));
        assert_eq!(second.verified, Some(true));
        assert!(w.persistence.get("svc-2").unwrap().ai_verified);
        assert_eq!(
            w.persistence.last_update_options().map(|o| o.retry_attempts),
            Some(2)
        );
    }

    #[tokio::test]
    async fn test_stuck_detection_is_debounced() {
        let config = fast_config().with_stage_timeouts(StageTimeouts::new(
            Duration::from_secs(120),
            Duration::from_secs(180),
            Duration::from_secs(300),
        ));
        let w = world(config, ScriptedGenerationService::new(), &["a"], None);
        let state = w.controller.state();
        let long_ago = now_utc() - chrono::Duration::minutes(5);

        state.begin().unwrap();
        state.tracker().initialize(&entity_refs(&["a"]));
        state.tracker().set_entity_status("a", EntityStatus::Updating, None);
        state
            .tracker()
            .set_stage_at("a", StageName::Funnel, StageStatus::Generating, long_ago)
            .unwrap();

        let first = w.controller.sweep_now();
        assert_eq!(first.outcome, SweepOutcome::Notice { consecutive: 1 });
        assert_eq!(state.error_count(), 0);
        assert!(!state.is_stuck());

        let second = w.controller.sweep_now();
        assert_eq!(second.outcome, SweepOutcome::Escalated { consecutive: 2 });
        assert_eq!(state.error_count(), 1);
        assert!(state.is_stuck());

        w.controller.sweep_now();
        assert_eq!(state.error_count(), 1);
        assert_eq!(w.events.of_kind("stuck_escalated").len(), 1);

        // A clean sweep resets the count; one more stuck sweep is only a notice.
        state
            .tracker()
            .set_stage("a", StageName::Funnel, StageStatus::Error)
            .unwrap();
        assert_eq!(w.controller.sweep_now().outcome, SweepOutcome::Clear);
        assert_eq!(w.controller.snapshot().consecutive_stuck_sweeps, 0);

        state
            .tracker()
            .set_stage("a", StageName::Funnel, StageStatus::Pending)
            .unwrap();
        state
            .tracker()
            .set_stage_at("a", StageName::Funnel, StageStatus::Generating, long_ago)
            .unwrap();
        assert_eq!(
            w.controller.sweep_now().outcome,
            SweepOutcome::Notice { consecutive: 1 }
        );
        state.finish();
    }

    #[tokio::test]
    async fn test_recovery_stops_batch_and_preserves_selection() {
        let generation = ScriptedGenerationService::new()
            .with_failure_for("a", StageName::Details)
            .with_failure_for("b", StageName::Disclaimer);
        let w = world(
            fast_config().with_max_errors_before_recovery(2),
            generation,
            &["a", "b", "c", "d"],
            None,
        );

        let summary = w
            .controller
            .start_batch(entity_refs(&["a", "b", "c", "d"]), BatchOptions::new())
            .await
            .unwrap();

        assert!(summary.recovered);
        assert_eq!(summary.errored, 2);
        assert_eq!(w.generation.entities_seen(), vec!["a".to_string(), "b".to_string()]);

        let started = w.events.of_kind("recovery_started");
        assert_eq!(
            started,
            vec![UpdaterEvent::RecoveryStarted {
                reason: RecoveryReason::ErrorThreshold { errors: 2 }
            }]
        );
        assert_eq!(w.events.of_kind("recovery_completed").len(), 1);

        let snapshot = w.controller.snapshot();
        assert!(snapshot.entities.is_empty());
        assert_eq!(
            snapshot.selection,
            vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()]
        );
        assert_eq!(snapshot.error_count, 0);
        assert!(!snapshot.running);
        assert_eq!(snapshot.recovery, RecoveryState::Idle);
        assert_eq!(snapshot.last_recovery.unwrap().cleared_entities, 4);

        let report = w.controller.acknowledge_recovery().unwrap();
        assert_eq!(report.reason, RecoveryReason::ErrorThreshold { errors: 2 });
        assert!(w.controller.snapshot().last_recovery.is_none());
    }

    #[tokio::test]
    async fn test_verification_outcomes() {
        let w = world(fast_config(), ScriptedGenerationService::new(), &[], None);
        let mut missing_tiers = complete_service_record("x");
        missing_tiers.pricing_tiers.clear();
        w.persistence.insert(missing_tiers);
        w.persistence.insert(complete_service_record("y"));
        let options = UpdateOptions { retry_attempts: 2 };

        let x = verify_entity(&*w.persistence, "x", options).await.unwrap();
        assert!(!x.verified);
        assert_eq!(x.missing, vec![RequiredField::PricingTiers]);
        assert!(!w.persistence.get("x").unwrap().ai_verified);

        let y = verify_entity(&*w.persistence, "y", options).await.unwrap();
        assert!(y.verified);
        assert!(w.persistence.get("y").unwrap().ai_verified);
    }

    #[tokio::test]
    async fn test_cancellation_takes_effect_at_entity_boundary() {
        let generation = ScriptedGenerationService::new().with_delay_for(
            "a",
            StageName::Research,
            Duration::from_millis(150),
        );
        let w = world(fast_config(), generation, &["a", "b", "c"], None);

        let handle = w
            .controller
            .spawn_batch(entity_refs(&["a", "b", "c"]), BatchOptions::new());
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(matches!(
            w.controller
                .start_batch(entity_refs(&["b"]), BatchOptions::new())
                .await,
            Err(UpdaterError::AlreadyRunning)
        ));
        assert!(w.controller.cancel_batch("operator stop"));

        let summary = handle.await.unwrap().unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.completed, 1);

        let state = w.controller.state();
        let tracker = state.tracker();
        assert_eq!(tracker.get("a").unwrap().status, EntityStatus::Completed);
        assert_eq!(tracker.get("b").unwrap().status, EntityStatus::Pending);
        assert_eq!(w.generation.entities_seen(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_background_batch_polls_through_transport_errors() {
        let batch = Arc::new(ScriptedBatchService::new(vec![
            Err(BatchServiceError::Transport("connection reset".to_string())),
            Ok(BatchStatusReport {
                status: BackgroundStatus::Processing,
                completed_count: 1,
                total_count: 3,
                error_count: 0,
                failed_entity_ids: Vec::new(),
            }),
            Ok(BatchStatusReport {
                status: BackgroundStatus::CompletedWithErrors,
                completed_count: 2,
                total_count: 3,
                error_count: 1,
                failed_entity_ids: vec!["c".to_string()],
            }),
        ]));
        let config = fast_config()
            .with_polling(PollingConfig::new(Duration::from_millis(5), Duration::from_millis(10)));
        let w = world(
            config,
            ScriptedGenerationService::new(),
            &["a", "b", "c"],
            Some(batch.clone()),
        );

        let summary = w
            .controller
            .start_batch(
                entity_refs(&["a", "b", "c"]),
                BatchOptions::new().with_mode(ExecutionMode::Background),
            )
            .await
            .unwrap();

        assert_eq!(summary.mode, Some(ExecutionMode::Background));
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.background_batch_id.as_deref(), Some("batch-1"));
        assert_eq!(batch.poll_count(), 3);
        assert_eq!(batch.submissions()[0].entity_ids.len(), 3);
        assert_eq!(w.generation.call_count(), 0);

        let snapshot = w.controller.snapshot();
        assert!(!snapshot.running);
        assert_eq!(
            snapshot.background.unwrap().last_report.unwrap().status,
            BackgroundStatus::CompletedWithErrors
        );
        let statuses: Vec<_> = snapshot.entities.iter().map(|p| p.status).collect();
        assert_eq!(
            statuses,
            vec![EntityStatus::Completed, EntityStatus::Completed, EntityStatus::Error]
        );
        assert!(!w.controller.cancel_batch("too late"));
    }

    #[tokio::test]
    async fn test_large_selection_goes_to_background_automatically() {
        let ids = ["a", "b", "c", "d"];
        let batch = Arc::new(ScriptedBatchService::new(Vec::new()));
        let config = fast_config()
            .with_background_threshold(3)
            .with_polling(PollingConfig::new(Duration::from_millis(1), Duration::from_millis(1)));
        let w = world(config, ScriptedGenerationService::new(), &ids, Some(batch.clone()));

        let summary = w
            .controller
            .start_batch(entity_refs(&ids), BatchOptions::new().with_overwrite(true))
            .await
            .unwrap();

        assert_eq!(summary.mode, Some(ExecutionMode::Background));
        assert_eq!(summary.completed, 4);
        assert!(batch.submissions()[0].overwrite);
    }

    #[tokio::test]
    async fn test_lost_background_batch_releases_controller() {
        let batch = Arc::new(ScriptedBatchService::new(vec![Err(
            BatchServiceError::UnknownBatch("batch-1".to_string()),
        )]));
        let config = fast_config()
            .with_polling(PollingConfig::new(Duration::from_millis(1), Duration::from_millis(1)));
        let w = world(config, ScriptedGenerationService::new(), &["a", "b"], Some(batch.clone()));

        let handle = w.controller.spawn_batch(
            entity_refs(&["a", "b"]),
            BatchOptions::new().with_mode(ExecutionMode::Background),
        );
        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("background batch should not hang")
            .unwrap();

        assert!(matches!(
            result,
            Err(UpdaterError::BatchService(BatchServiceError::UnknownBatch(_)))
        ));
        assert_eq!(batch.poll_count(), 1);
        let snapshot = w.controller.snapshot();
        assert!(!snapshot.running);
        assert_eq!(snapshot.entities.len(), 2);
        assert!(snapshot
            .entities
            .iter()
            .all(|p| p.status == EntityStatus::Error));

        let summary = w
            .controller
            .start_batch(
                entity_refs(&["a"]),
                BatchOptions::new()
                    .with_overwrite(true)
                    .with_mode(ExecutionMode::Foreground),
            )
            .await
            .unwrap();
        assert_eq!(summary.completed, 1);
    }

    #[tokio::test]
    async fn test_stuck_escalation_stops_batch_for_recovery() {
        let generation = ScriptedGenerationService::new().with_delay_for(
            "a",
            StageName::Research,
            Duration::from_millis(300),
        );
        let config = fast_config()
            .with_monitor_interval(Duration::from_millis(10))
            .with_stage_timeouts(StageTimeouts::new(
                Duration::from_millis(5),
                Duration::from_millis(10),
                Duration::from_millis(20),
            ));
        let w = world(config, generation, &["a", "b", "c"], None);

        let summary = w
            .controller
            .start_batch(entity_refs(&["a", "b", "c"]), BatchOptions::new())
            .await
            .unwrap();

        assert!(summary.recovered);
        assert_eq!(w.generation.entities_seen(), vec!["a".to_string()]);
        assert!(!w.events.of_kind("stuck_escalated").is_empty());
        assert_eq!(
            w.events.of_kind("recovery_started"),
            vec![UpdaterEvent::RecoveryStarted {
                reason: RecoveryReason::StuckEscalation
            }]
        );

        let snapshot = w.controller.snapshot();
        assert!(!snapshot.running);
        assert!(!w.controller.state().is_stuck());
        assert_eq!(snapshot.error_count, 0);
        assert_eq!(
            snapshot.last_recovery.unwrap().reason,
            RecoveryReason::StuckEscalation
        );
    }

    #[tokio::test]
    async fn test_inter_entity_delay_spaces_services() {
        let delay = Duration::from_millis(60);
        let w = world(
            fast_config().with_inter_entity_delay(delay),
            ScriptedGenerationService::new(),
            &["a", "b", "c"],
            None,
        );

        let started = Instant::now();
        let summary = w
            .controller
            .start_batch(entity_refs(&["a", "b", "c"]), BatchOptions::new())
            .await
            .unwrap();

        assert_eq!(summary.completed, 3);
        assert!(started.elapsed() >= delay * 2);
    }
}

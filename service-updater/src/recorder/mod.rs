//! In-process update recorder.
//!
//! Entries are kept per entity in insertion order. An entity has completed a
//! full cycle once every required stage and verification were recorded.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::core::StageName;
use crate::errors::RecorderError;
use crate::ports::{StageUpdate, UpdateRecorder};
use crate::utils::now_utc;

/// Audit log held in memory.
#[derive(Debug, Default)]
pub struct InMemoryUpdateRecorder {
    entries: DashMap<String, Vec<StageUpdate>>,
}

impl InMemoryUpdateRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a whole cycle for `entity_id`, as if a batch had just processed it.
    pub fn seed_full_cycle(&self, entity_id: &str) {
        let now = now_utc();
        let mut entries = self.entries.entry(entity_id.to_string()).or_default();
        for stage in StageName::REQUIRED
            .into_iter()
            .chain(std::iter::once(StageName::Verification))
        {
            entries.push(StageUpdate {
                entity_id: entity_id.to_string(),
                stage,
                notes: "seeded".to_string(),
                recorded_at: now,
            });
        }
    }

    /// Stages recorded for `entity_id`, oldest first.
    #[must_use]
    pub fn stages_for(&self, entity_id: &str) -> Vec<StageName> {
        self.entries
            .get(entity_id)
            .map(|entries| entries.iter().map(|e| e.stage).collect())
            .unwrap_or_default()
    }

    /// Synchronous form of [`UpdateRecorder::has_completed_full_cycle`].
    #[must_use]
    pub fn has_full_cycle(&self, entity_id: &str) -> bool {
        let recorded: HashSet<StageName> = self.stages_for(entity_id).into_iter().collect();
        StageName::REQUIRED
            .iter()
            .all(|stage| recorded.contains(stage))
            && recorded.contains(&StageName::Verification)
    }
}

#[async_trait]
impl UpdateRecorder for InMemoryUpdateRecorder {
    async fn record_stage_update(
        &self,
        entity_id: &str,
        stage: StageName,
        notes: &str,
    ) -> Result<(), RecorderError> {
        self.entries
            .entry(entity_id.to_string())
            .or_default()
            .push(StageUpdate {
                entity_id: entity_id.to_string(),
                stage,
                notes: notes.to_string(),
                recorded_at: now_utc(),
            });
        debug!(entity_id = %entity_id, stage = %stage, "Recorded stage update");
        Ok(())
    }

    async fn get_updates_for_entities(
        &self,
        entity_ids: &[String],
    ) -> Result<HashMap<String, Vec<StageUpdate>>, RecorderError> {
        Ok(entity_ids
            .iter()
            .map(|id| {
                let entries = self
                    .entries
                    .get(id)
                    .map(|entries| entries.clone())
                    .unwrap_or_default();
                (id.clone(), entries)
            })
            .collect())
    }

    async fn has_completed_full_cycle(&self, entity_id: &str) -> Result<bool, RecorderError> {
        Ok(self.has_full_cycle(entity_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_cycle_needs_required_stages_and_verification() {
        let recorder = InMemoryUpdateRecorder::new();
        for stage in StageName::REQUIRED {
            recorder.record_stage_update("a", stage, "ok").await.unwrap();
        }
        assert!(!recorder.has_completed_full_cycle("a").await.unwrap());

        recorder
            .record_stage_update("a", StageName::Verification, "verified")
            .await
            .unwrap();
        assert!(recorder.has_completed_full_cycle("a").await.unwrap());
        assert!(!recorder.has_completed_full_cycle("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_updates_in_order() {
        let recorder = InMemoryUpdateRecorder::new();
        recorder
            .record_stage_update("a", StageName::Research, "first")
            .await
            .unwrap();
        recorder
            .record_stage_update("a", StageName::Details, "second")
            .await
            .unwrap();

        let updates = recorder
            .get_updates_for_entities(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let notes: Vec<_> = updates["a"].iter().map(|u| u.notes.as_str()).collect();
        assert_eq!(notes, vec!["first", "second"]);
        assert!(updates["b"].is_empty());
    }

    #[test]
    fn test_seed_full_cycle() {
        let recorder = InMemoryUpdateRecorder::new();
        recorder.seed_full_cycle("a");
        assert!(recorder.has_full_cycle("a"));

        let done = tokio_test::block_on(recorder.has_completed_full_cycle("a"));
        assert!(tokio_test::assert_ok!(done));
    }
}

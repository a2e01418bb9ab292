//! Stage tracker: the shared per-entity progress map.
//!
//! Single-writer discipline: only the executor processing an entity calls the
//! mutating methods. The stuck-state monitor and UI readers take snapshots and
//! must tolerate the map changing between reads; no lock spans more than one
//! entry.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

use crate::core::{EntityProgress, EntityRef, EntityStatus, StageName, StageStatus};
use crate::errors::TrackerError;
use crate::utils::{now_utc, Timestamp};

/// Per-entity, per-stage progress for the current batch.
#[derive(Debug, Default)]
pub struct StageTracker {
    entries: DashMap<String, EntityProgress>,
    order: RwLock<Vec<String>>,
    self_heals: AtomicUsize,
}

impl StageTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all records with fresh `pending` ones for `entities`.
    ///
    /// Runs to completion before any stage of the batch starts, so the lazy
    /// path in [`set_stage`](Self::set_stage) is never taken in normal operation.
    pub fn initialize(&self, entities: &[EntityRef]) {
        let now = now_utc();
        let mut order = self.order.write();
        self.entries.clear();
        order.clear();
        for entity in entities {
            self.entries.insert(
                entity.id.clone(),
                EntityProgress::new(entity.id.clone(), entity.name.clone(), now),
            );
            order.push(entity.id.clone());
        }
    }

    /// Transitions one stage of one entity at the current time.
    pub fn set_stage(
        &self,
        entity_id: &str,
        stage: StageName,
        status: StageStatus,
    ) -> Result<(), TrackerError> {
        self.set_stage_at(entity_id, stage, status, now_utc())
    }

    /// Transitions one stage of one entity at `now`.
    ///
    /// A missing record is created on the fly. That only happens when a write
    /// races batch initialization, so it is logged and counted.
    pub fn set_stage_at(
        &self,
        entity_id: &str,
        stage: StageName,
        status: StageStatus,
        now: Timestamp,
    ) -> Result<(), TrackerError> {
        let mut healed = false;
        let result = {
            let mut entry = self
                .entries
                .entry(entity_id.to_string())
                .or_insert_with(|| {
                    healed = true;
                    EntityProgress::new(entity_id, entity_id, now)
                });
            entry.set_stage(stage, status, now)
        };

        // Shard lock is released here; the order lock is never taken under it.
        if healed {
            self.self_heals.fetch_add(1, Ordering::SeqCst);
            warn!(
                entity_id = %entity_id,
                stage = %stage,
                "Progress record missing at stage write; initialization race"
            );
            self.order.write().push(entity_id.to_string());
        }

        result?;
        debug!(entity_id = %entity_id, stage = %stage, status = %status, "Stage transition");
        Ok(())
    }

    /// Sets the overall status of an entity, with an optional error message.
    pub fn set_entity_status(&self, entity_id: &str, status: EntityStatus, error: Option<String>) {
        if let Some(mut entry) = self.entries.get_mut(entity_id) {
            entry.set_status(status, now_utc());
            if error.is_some() {
                entry.error = error;
            }
        } else {
            warn!(entity_id = %entity_id, status = %status, "Status write for unknown entity");
        }
    }

    /// Records the verification outcome.
    pub fn set_verified(&self, entity_id: &str, verified: bool) {
        if let Some(mut entry) = self.entries.get_mut(entity_id) {
            entry.verified = Some(verified);
            entry.last_activity = now_utc();
        }
    }

    /// Copy of one entity's progress.
    #[must_use]
    pub fn get(&self, entity_id: &str) -> Option<EntityProgress> {
        self.entries.get(entity_id).map(|entry| entry.clone())
    }

    /// Copies of every record in selection order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EntityProgress> {
        let order = self.order.read().clone();
        order
            .iter()
            .filter_map(|id| self.entries.get(id).map(|entry| entry.clone()))
            .collect()
    }

    /// Copies of records whose entity is `updating`.
    #[must_use]
    pub fn in_flight(&self) -> Vec<EntityProgress> {
        self.entries
            .iter()
            .filter(|entry| entry.status == EntityStatus::Updating)
            .map(|entry| entry.clone())
            .collect()
    }

    /// Drops every record.
    pub fn clear(&self) {
        let mut order = self.order.write();
        self.entries.clear();
        order.clear();
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many times a missing record had to be created by a stage write.
    #[must_use]
    pub fn self_heal_count(&self) -> usize {
        self.self_heals.load(Ordering::SeqCst)
    }
}

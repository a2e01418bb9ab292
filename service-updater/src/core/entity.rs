//! Per-entity progress records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::stage::{StageName, StageStatus};
use crate::errors::TrackerError;
use crate::utils::Timestamp;

/// Overall status of one entity within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    /// Selected but not started.
    #[default]
    Pending,
    /// Stage sequence in progress.
    Updating,
    /// Sequence finished without a fatal failure.
    Completed,
    /// A required stage or the persistence merge failed.
    Error,
}

impl EntityStatus {
    /// Returns true for `completed` and `error`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Updating => write!(f, "updating"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Read reference to an entity held for the duration of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl EntityRef {
    /// Creates a reference.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Progress of one entity through the stage sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProgress {
    /// Entity identifier.
    pub entity_id: String,
    /// Display name.
    pub entity_name: String,
    /// Overall status.
    pub status: EntityStatus,
    /// Status of every stage.
    pub stages: BTreeMap<StageName, StageStatus>,
    /// When each stage last entered `generating`.
    pub stage_started_at: BTreeMap<StageName, Timestamp>,
    /// The stage currently generating, if any.
    pub current_stage: Option<StageName>,
    /// Last error message.
    pub error: Option<String>,
    /// Last time anything about this entity changed.
    pub last_activity: Timestamp,
    /// Outcome of verification, once it has run.
    pub verified: Option<bool>,
}

impl EntityProgress {
    /// Creates a record with every stage `pending`.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, entity_name: impl Into<String>, now: Timestamp) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_name: entity_name.into(),
            status: EntityStatus::Pending,
            stages: StageName::ALL
                .into_iter()
                .map(|stage| (stage, StageStatus::Pending))
                .collect(),
            stage_started_at: BTreeMap::new(),
            current_stage: None,
            error: None,
            last_activity: now,
            verified: None,
        }
    }

    /// Returns the status of a stage.
    #[must_use]
    pub fn stage(&self, stage: StageName) -> StageStatus {
        self.stages.get(&stage).copied().unwrap_or_default()
    }

    /// Applies a stage transition.
    ///
    /// Entering `generating` stamps the start time and sets the current-stage
    /// pointer; leaving it clears the pointer if it named this stage. The
    /// last-activity timestamp is refreshed on every successful call.
    pub fn set_stage(
        &mut self,
        stage: StageName,
        status: StageStatus,
        now: Timestamp,
    ) -> Result<(), TrackerError> {
        let current = self.stage(stage);
        if !current.can_transition_to(status) {
            return Err(TrackerError::InvalidTransition {
                entity_id: self.entity_id.clone(),
                stage,
                from: current,
                to: status,
            });
        }

        if status == StageStatus::Generating {
            if let Some(other) = self.current_stage.filter(|other| *other != stage) {
                return Err(TrackerError::StageAlreadyGenerating {
                    entity_id: self.entity_id.clone(),
                    active: other,
                    requested: stage,
                });
            }
            self.stage_started_at.insert(stage, now);
            self.current_stage = Some(stage);
        } else if self.current_stage == Some(stage) {
            self.current_stage = None;
        }

        self.stages.insert(stage, status);
        self.last_activity = now;
        Ok(())
    }

    /// Sets the overall status.
    pub fn set_status(&mut self, status: EntityStatus, now: Timestamp) {
        self.status = status;
        self.last_activity = now;
    }

    /// Stages currently in `generating`.
    pub fn generating_stages(&self) -> impl Iterator<Item = StageName> + '_ {
        self.stages
            .iter()
            .filter(|(_, status)| **status == StageStatus::Generating)
            .map(|(stage, _)| *stage)
    }

    /// Number of stages that finished successfully.
    #[must_use]
    pub fn completed_stage_count(&self) -> usize {
        self.stages
            .values()
            .filter(|status| **status == StageStatus::Completed)
            .count()
    }
}

//! Collaborator ports consumed by the pipeline.
//!
//! Generation, persistence, auditing and background execution are owned by
//! external services. The pipeline sees them only through these traits,
//! bundled into [`Collaborators`] so the controller receives every port it
//! needs in one value.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::{FaqRecord, ServiceRecord, ServiceUpdate, StageName};
use crate::errors::{BatchServiceError, GenerationError, PersistenceError, RecorderError};
use crate::utils::Timestamp;

/// One generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Content type to generate.
    pub stage: StageName,
    /// Current persisted state of the service.
    pub service: ServiceRecord,
    /// Output of the research stage, when it succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_research: Option<serde_json::Value>,
    /// Operator-supplied prompt override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
}

/// External content-generation service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generates content for one stage of one service.
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<serde_json::Value, GenerationError>;
}

/// Options for a persistence write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOptions {
    /// Attempts the collaborator may make before giving up.
    pub retry_attempts: u32,
}

/// Child records replaced wholesale under an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum ChildRecords {
    /// Frequently asked questions.
    Faqs(Vec<FaqRecord>),
}

impl ChildRecords {
    /// Kind name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Faqs(_) => "faqs",
        }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Faqs(records) => records.len(),
        }
    }

    /// Returns true if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// External store of services and their child records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistenceService: Send + Sync {
    /// Loads the current state of a service.
    async fn fetch_entity(&self, entity_id: &str) -> Result<ServiceRecord, PersistenceError>;

    /// Applies a partial update.
    async fn update_entity(
        &self,
        entity_id: &str,
        update: &ServiceUpdate,
        options: UpdateOptions,
    ) -> Result<(), PersistenceError>;

    /// Deletes every child record of this kind and inserts the given ones in order.
    async fn replace_child_records(
        &self,
        entity_id: &str,
        records: &ChildRecords,
    ) -> Result<(), PersistenceError>;
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageUpdate {
    /// Entity.
    pub entity_id: String,
    /// Stage that completed.
    pub stage: StageName,
    /// Free-form notes.
    pub notes: String,
    /// When it was recorded.
    pub recorded_at: Timestamp,
}

/// Audit log of completed stages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpdateRecorder: Send + Sync {
    /// Records that a stage completed for an entity.
    async fn record_stage_update(
        &self,
        entity_id: &str,
        stage: StageName,
        notes: &str,
    ) -> Result<(), RecorderError>;

    /// Returns the audit entries of each requested entity, oldest first.
    async fn get_updates_for_entities(
        &self,
        entity_ids: &[String],
    ) -> Result<HashMap<String, Vec<StageUpdate>>, RecorderError>;

    /// Returns true once every required stage and verification were recorded.
    async fn has_completed_full_cycle(&self, entity_id: &str) -> Result<bool, RecorderError>;
}

/// Work handed to the background batch service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSubmission {
    /// Entities in selection order.
    pub entity_ids: Vec<String>,
    /// Regenerate even if already updated.
    pub overwrite: bool,
    /// Per-stage prompt overrides.
    #[serde(default)]
    pub custom_prompts: HashMap<StageName, String>,
    /// Opaque operator parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Aggregate state of a background batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundStatus {
    /// Still running.
    Processing,
    /// Every entity succeeded.
    Completed,
    /// Finished, some entities failed.
    CompletedWithErrors,
}

impl BackgroundStatus {
    /// Returns true for either completed state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithErrors)
    }
}

impl fmt::Display for BackgroundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithErrors => write!(f, "completed_with_errors"),
        }
    }
}

/// One poll result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatusReport {
    /// Aggregate state.
    pub status: BackgroundStatus,
    /// Entities finished successfully.
    pub completed_count: usize,
    /// Entities in the batch.
    pub total_count: usize,
    /// Entities that failed.
    pub error_count: usize,
    /// Failed entities, when the service reports them.
    #[serde(default)]
    pub failed_entity_ids: Vec<String>,
}

/// External batch-processing service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackgroundBatchService: Send + Sync {
    /// Submits a batch and returns its identifier.
    async fn submit_batch(&self, submission: &BatchSubmission) -> Result<String, BatchServiceError>;

    /// Reads the current status of a batch.
    async fn poll_status(&self, batch_id: &str) -> Result<BatchStatusReport, BatchServiceError>;
}

/// Every collaborator the controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Content generation.
    pub generation: Arc<dyn GenerationService>,
    /// Service store.
    pub persistence: Arc<dyn PersistenceService>,
    /// Audit log.
    pub recorder: Arc<dyn UpdateRecorder>,
    /// Background batch service, if one is deployed.
    pub background: Option<Arc<dyn BackgroundBatchService>>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("has_background", &self.background.is_some())
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Bundles the required collaborators.
    #[must_use]
    pub fn new(
        generation: Arc<dyn GenerationService>,
        persistence: Arc<dyn PersistenceService>,
        recorder: Arc<dyn UpdateRecorder>,
    ) -> Self {
        Self {
            generation,
            persistence,
            recorder,
            background: None,
        }
    }

    /// Adds a background batch service.
    #[must_use]
    pub fn with_background(mut self, background: Arc<dyn BackgroundBatchService>) -> Self {
        self.background = Some(background);
        self
    }
}

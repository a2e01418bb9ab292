//! Error types for the service updater.
//!
//! One enum per collaborator boundary. Stage, persistence and recorder
//! failures are absorbed into per-entity status; only batch-level failures
//! surface as [`UpdaterError`].

use std::time::Duration;
use thiserror::Error;

use crate::core::{StageName, StageStatus};

/// The main error type for batch operations.
#[derive(Debug, Error)]
pub enum UpdaterError {
    /// The background batch service failed.
    #[error("{0}")]
    BatchService(#[from] BatchServiceError),

    /// A batch is already running.
    #[error("A batch is already running")]
    AlreadyRunning,

    /// Recovery is in progress; no new work may start.
    #[error("Recovery in progress")]
    Recovering,

    /// The selection was empty after filtering.
    #[error("No services selected")]
    EmptySelection,

    /// The batch was cancelled.
    #[error("Batch cancelled: {0}")]
    Cancelled(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of one generation call.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// The service could not be reached or returned a non-success status.
    #[error("Generation transport error for {stage}: {message}")]
    Transport {
        /// Stage being generated.
        stage: StageName,
        /// Underlying error text.
        message: String,
    },

    /// The service answered with content the pipeline cannot use.
    #[error("Generation validation error for {stage}: {message}")]
    Validation {
        /// Stage being generated.
        stage: StageName,
        /// What was wrong with the content.
        message: String,
    },

    /// The call did not finish in time.
    #[error("Generation of {stage} timed out after {}ms", .after.as_millis())]
    Timeout {
        /// Stage being generated.
        stage: StageName,
        /// Time allowed.
        after: Duration,
    },
}

impl GenerationError {
    /// Stage the failure belongs to.
    #[must_use]
    pub const fn stage(&self) -> StageName {
        match self {
            Self::Transport { stage, .. }
            | Self::Validation { stage, .. }
            | Self::Timeout { stage, .. } => *stage,
        }
    }

    /// Returns true for the explicit timeout race.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Failure of the persistence collaborator.
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    /// No entity with this id.
    #[error("Service not found: {0}")]
    NotFound(String),

    /// The write was rejected or failed after all retries.
    #[error("Update of {entity_id} failed after {attempts} attempt(s): {message}")]
    UpdateFailed {
        /// Target entity.
        entity_id: String,
        /// Attempts made.
        attempts: u32,
        /// Underlying error text.
        message: String,
    },

    /// Transport-level failure.
    #[error("Persistence transport error: {0}")]
    Transport(String),
}

/// Failure of the audit recorder.
#[derive(Debug, Clone, Error)]
#[error("Update recorder error: {0}")]
pub struct RecorderError(pub String);

/// Failure of the background batch service.
#[derive(Debug, Clone, Error)]
pub enum BatchServiceError {
    /// Submission was rejected.
    #[error("Batch submission rejected: {0}")]
    Rejected(String),

    /// Transport-level failure.
    #[error("Batch service transport error: {0}")]
    Transport(String),

    /// Unknown batch identifier.
    #[error("Unknown batch: {0}")]
    UnknownBatch(String),
}

/// A progress update that violates the stage state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// The edge is not part of the stage state machine.
    #[error("Invalid transition for {entity_id}/{stage}: {from} -> {to}")]
    InvalidTransition {
        /// Entity.
        entity_id: String,
        /// Stage.
        stage: StageName,
        /// Current status.
        from: StageStatus,
        /// Requested status.
        to: StageStatus,
    },

    /// Another stage of the same entity is still generating.
    #[error("{entity_id}: cannot start {requested} while {active} is generating")]
    StageAlreadyGenerating {
        /// Entity.
        entity_id: String,
        /// Stage currently generating.
        active: StageName,
        /// Stage that was asked to start.
        requested: StageName,
    },

    /// A stage name outside the closed set.
    #[error("Unknown stage: {0}")]
    UnknownStage(String),
}

//! Stage names, stage statuses and the transitions between them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::TrackerError;

/// One step of the fixed generation sequence.
///
/// Variants are declared in execution order and the derived `Ord` follows
/// that order, so `BTreeMap<StageName, _>` iterates the pipeline in sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Market research used as context by `details` and `disclaimer`.
    Research,
    /// Description, pricing and other catalog fields.
    Details,
    /// Legal disclaimer reference.
    Disclaimer,
    /// Sales funnel content.
    Funnel,
    /// Frequently asked questions.
    Faqs,
    /// Completeness check over the persisted service.
    Verification,
}

/// How a stage failure affects the rest of the entity's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure on the stage and keep going.
    BestEffort,
    /// Abort the entity; only verification still runs.
    Required,
}

impl StageName {
    /// Every stage in execution order.
    pub const ALL: [Self; 6] = [
        Self::Research,
        Self::Details,
        Self::Disclaimer,
        Self::Funnel,
        Self::Faqs,
        Self::Verification,
    ];

    /// Stages whose failure aborts the entity.
    pub const REQUIRED: [Self; 3] = [Self::Details, Self::Disclaimer, Self::Faqs];

    /// Wire name used by the generation service and the audit log.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Details => "details",
            Self::Disclaimer => "disclaimer",
            Self::Funnel => "funnel",
            Self::Faqs => "faqs",
            Self::Verification => "verification",
        }
    }

    /// Failure handling for this stage.
    #[must_use]
    pub const fn failure_policy(&self) -> FailurePolicy {
        match self {
            Self::Details | Self::Disclaimer | Self::Faqs => FailurePolicy::Required,
            Self::Research | Self::Funnel | Self::Verification => FailurePolicy::BestEffort,
        }
    }

    /// Returns true if a failure of this stage aborts the entity.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        matches!(self.failure_policy(), FailurePolicy::Required)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| TrackerError::UnknownStage(s.to_string()))
    }
}

/// Status of one stage of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not started in the current invocation.
    #[default]
    Pending,
    /// Generation call in flight.
    Generating,
    /// Finished successfully.
    Completed,
    /// Finished with a failure or timeout.
    Error,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Generating => write!(f, "generating"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl StageStatus {
    /// Returns true for `completed` and `error`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Valid edges: `pending -> generating -> {completed | error}`.
    ///
    /// A terminal status may only go back to `pending`, which opens a fresh
    /// invocation of the same stage.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Generating)
                | (Self::Generating, Self::Completed | Self::Error)
                | (Self::Completed | Self::Error, Self::Pending)
        )
    }
}

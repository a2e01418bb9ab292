//! Batch orchestration.
//!
//! This module provides:
//! - The shared [`BatchState`] handle
//! - The [`BatchExecutor`] seam with foreground and background executors
//! - Overwrite filtering and verification
//! - The top-level [`BatchController`]

mod background;
mod controller;
mod executor;
mod filter;
mod foreground;
mod state;
mod verification;

#[cfg(test)]
mod integration_tests;

pub use background::BackgroundExecutor;
pub use controller::{BatchController, BatchSnapshot};
pub use executor::{
    BatchExecutor, BatchOptions, BatchRun, BatchSummary, ExecutionContext, ExecutionMode,
    ExecutionOutcome,
};
pub use filter::{filter_already_updated, FilteredSelection};
pub use foreground::{EntityOutcome, ForegroundExecutor};
pub use state::{BackgroundProgress, BatchState};
pub use verification::{check_completeness, verify_entity, RequiredField, VerificationReport};

//! # Service Updater
//!
//! Batch orchestrator that regenerates catalog content for a selection of
//! services by driving an external generation service stage by stage.
//!
//! For each selected service the updater runs:
//!
//! - **research** (best effort), then **details**, **disclaimer**, **funnel**
//!   (best effort, with its own timeout) and **faqs**
//! - a **merge** of the generated documents into one persisted update
//! - a **verification** pass that sets the service's verified flag
//!
//! Progress is tracked per entity and per stage. A background monitor flags
//! stages stuck in `generating`, and a recovery controller soft-resets the
//! batch after repeated errors or escalated stuck notices. Large selections
//! can be handed to a background batch service and polled to completion.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use service_updater::prelude::*;
//!
//! let controller = BatchController::new(UpdaterConfig::default(), collaborators);
//! let summary = controller
//!     .start_batch(entities, BatchOptions::default().with_overwrite(false))
//!     .await?;
//! println!("{} completed, {} errored", summary.completed, summary.errored);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod adapters;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod generation;
pub mod merge;
pub mod monitor;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod recorder;
pub mod recovery;
pub mod testing;
pub mod tracker;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{PollingConfig, StageTimeouts, UpdaterConfig};
    pub use crate::core::{
        EntityProgress, EntityRef, EntityStatus, ServiceRecord, ServiceUpdate, StageName,
        StageStatus,
    };
    pub use crate::errors::{
        BatchServiceError, GenerationError, PersistenceError, RecorderError, UpdaterError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, UpdaterEvent};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        BatchController, BatchOptions, BatchSnapshot, BatchSummary, ExecutionMode,
    };
    pub use crate::ports::{
        BackgroundBatchService, Collaborators, GenerationService, PersistenceService,
        UpdateRecorder,
    };
    pub use crate::recorder::InMemoryUpdateRecorder;
    pub use crate::recovery::{RecoveryReason, RecoveryReport};
    pub use crate::utils::{iso_timestamp, Timestamp};
}

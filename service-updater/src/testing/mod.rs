//! In-memory collaborators and fixtures for exercising the pipeline without
//! external services.

mod fixtures;
mod mocks;

pub use fixtures::{bare_service, complete_service_record, default_stage_content, entity_refs};
pub use mocks::{InMemoryPersistence, ScriptedBatchService, ScriptedGenerationService};

//! Core domain model for the service updater.
//!
//! - Stage names, stage statuses and their transition rules
//! - Per-entity progress records
//! - Catalog service records and partial updates

mod entity;
mod service;
mod stage;

pub use entity::{EntityProgress, EntityRef, EntityStatus};
pub use service::{
    FaqRecord, PricingMode, PricingTier, ServiceRecord, ServiceUpdate, TierDuration,
};
pub use stage::{FailurePolicy, StageName, StageStatus};

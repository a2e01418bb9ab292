//! Identifier generation.

use uuid::Uuid;

/// Generates a time-ordered identifier for a foreground batch run.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::now_v7()
}

//! Timestamp and identifier helpers.

pub mod timestamps;
mod uuid_utils;

pub use timestamps::{duration_ms, elapsed_between, iso_timestamp, now_utc, Timestamp};
pub use uuid_utils::generate_run_id;

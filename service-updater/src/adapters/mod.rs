//! Collaborator implementations over real transports.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{HttpBatchService, HttpEndpoint, HttpGenerationService};

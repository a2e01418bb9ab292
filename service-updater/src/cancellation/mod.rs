//! Cooperative batch cancellation.

mod token;

pub use token::CancellationToken;

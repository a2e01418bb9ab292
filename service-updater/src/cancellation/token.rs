//! Cooperative cancellation checked at entity boundaries.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::UpdaterError;

/// Cancellation flag for the running batch.
///
/// A stage already in flight always runs to completion; the flag is only
/// consulted before the next entity starts. The first reason wins.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Returns false if it was already requested.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.write() = Some(reason.into());
            true
        } else {
            false
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Fails with [`UpdaterError::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<(), UpdaterError> {
        if self.is_cancelled() {
            Err(UpdaterError::Cancelled(
                self.reason().unwrap_or_else(|| "cancelled".to_string()),
            ))
        } else {
            Ok(())
        }
    }

    /// Re-arms the token for the next batch.
    pub fn reset(&self) {
        *self.reason.write() = None;
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

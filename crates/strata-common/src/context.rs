//! Ambient operation context carrying cancellation.
//!
//! A cancelled context never prevents an in-flight filesystem step from
//! finishing. It only stops the metadata transaction from committing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, SnapshotError};

/// Cloneable handle shared by every step of an operation.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// Returns a context that is not cancelled.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns whether the context has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with `SnapshotError::Cancelled` if the context was cancelled.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Cancelled` after [`Context::cancel`].
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(SnapshotError::Cancelled);
        }
        Ok(())
    }
}

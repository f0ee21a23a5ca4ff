//! Cooperative cancellation of a running batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::connection::Interrupter;

/// Cancels the batch of one [`execute`](super::execute) call.
///
/// Clones share state, so a signal handler can hold one clone while the
/// consumer drains results with another. Cancelling sets a flag the engine
/// checks before each statement and before handing over each row, and fires
/// the connection's interrupt if a statement is running.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    // Set only while a statement of this token's batch runs.
    interrupter: Mutex<Option<Interrupter>>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the batch. Calling it again has no further effect.
    pub fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        // Interrupt under the lock so that a disarmed token never reaches a
        // statement of a later batch on the same connection.
        if let Some(interrupter) = self.slot().as_ref() {
            interrupter.interrupt();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn arm(&self, interrupter: Interrupter) {
        *self.slot() = Some(interrupter);
    }

    pub(crate) fn disarm(&self) {
        *self.slot() = None;
    }

    fn slot(&self) -> MutexGuard<'_, Option<Interrupter>> {
        self.state
            .interrupter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

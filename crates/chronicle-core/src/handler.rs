//! Event handler fan-out interface.

use crate::error::HandlerError;

/// A consumer of committed or replayed events.
///
/// Handlers are registered at configuration time and receive events in
/// emission order. They run after persistence: a failing handler never
/// rolls back the write that triggered it.
pub trait EventHandler<E>: Send + Sync {
    /// Processes a single event.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the handler cannot process the
    /// event; the error surfaces to the committer or replayer.
    fn handle_message(&self, event: &E) -> Result<(), HandlerError>;
}

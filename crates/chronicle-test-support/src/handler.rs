//! Test handlers — `EventHandler` implementations that record or fail.

use std::sync::Mutex;

use chronicle_core::error::HandlerError;
use chronicle_core::handler::EventHandler;

/// A handler that records every event it receives, in delivery order.
#[derive(Debug)]
pub struct RecordingHandler<E> {
    received: Mutex<Vec<E>>,
}

impl<E> Default for RecordingHandler<E> {
    fn default() -> Self {
        Self {
            received: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone> RecordingHandler<E> {
    /// Creates an empty recording handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the received events.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn received(&self) -> Vec<E> {
        self.received.lock().unwrap().clone()
    }
}

impl<E: Clone + Send + Sync> EventHandler<E> for RecordingHandler<E> {
    fn handle_message(&self, event: &E) -> Result<(), HandlerError> {
        self.received.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A handler that fails on every event, for fan-out error-path tests.
#[derive(Debug, Default)]
pub struct FailingHandler;

impl<E> EventHandler<E> for FailingHandler {
    fn handle_message(&self, _event: &E) -> Result<(), HandlerError> {
        Err(HandlerError::new("FailingHandler", "projection unavailable"))
    }
}

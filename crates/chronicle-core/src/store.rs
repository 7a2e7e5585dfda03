//! Event store seam consumed by the aggregate repository.

use async_trait::async_trait;

use crate::aggregate::AggregateId;
use crate::command::Command;
use crate::error::EventStoreError;
use crate::event::DomainEvent;

/// Durable append-only log of domain events.
///
/// Implementations persist a command together with the events it
/// produced, and load an aggregate's stream in sequence-number order.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// The application event type this store persists.
    type Event: DomainEvent;

    /// Persists one command row and one event row per event atomically,
    /// then fans each event out to the registered handlers in order.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::SequenceConflict`] when the unique
    /// index on `(aggregate_id, sequence_number)` rejects the append, and
    /// [`EventStoreError::Handler`] when a handler fails after the write
    /// is already durable.
    async fn commit_events(
        &self,
        command: &dyn Command,
        events: Vec<Self::Event>,
    ) -> Result<(), EventStoreError>;

    /// Loads all events for the aggregate, ordered by ascending sequence
    /// number.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Serialization`] when a persisted row
    /// cannot be decoded.
    async fn load_events(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<Self::Event>, EventStoreError>;
}

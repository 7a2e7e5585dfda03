//! Error types for the event-sourcing core.

use thiserror::Error;

use crate::aggregate::AggregateId;

/// Errors raised while applying or replaying events on an aggregate.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// `load_from_history` was called with no events.
    #[error("cannot load an aggregate from an empty event history")]
    EmptyHistory,

    /// The aggregate received an event variant its `handle` does not cover.
    #[error("aggregate {aggregate_id} has no handler for event {event_type}")]
    UnhandledEvent {
        /// The aggregate that received the event.
        aggregate_id: AggregateId,
        /// The event type that had no handler.
        event_type: &'static str,
    },
}

/// Errors raised by the serializer and the event type registry.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// No decoder is registered for the serialized `event_type`.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// A field failed coercion to its declared type.
    #[error("field {field}: expected {expected}, found {found}")]
    InvalidField {
        /// The attribute name, suffixed with an index for list elements.
        field: String,
        /// The declared type the field failed to coerce to.
        expected: &'static str,
        /// The offending serialized value.
        found: String,
    },

    /// A mandatory field is absent from the serialized form.
    #[error("serialized event is missing the {0} field")]
    MissingField(String),

    /// The serialized event is not a JSON object.
    #[error("serialized event is not a JSON object")]
    NotAnObject,
}

/// Errors raised by a registered event handler during fan-out.
#[derive(Debug, Error)]
#[error("event handler {handler} failed: {message}")]
pub struct HandlerError {
    /// Name of the failing handler.
    pub handler: &'static str,
    /// What went wrong.
    pub message: String,
}

impl HandlerError {
    /// Creates a handler error from any displayable cause.
    #[must_use]
    pub fn new(handler: &'static str, cause: impl std::fmt::Display) -> Self {
        Self {
            handler,
            message: cause.to_string(),
        }
    }
}

/// Errors raised by the durable event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The unique index on `(aggregate_id, sequence_number)` rejected an
    /// append; the in-memory aggregate was stale or raced another writer.
    #[error("event {sequence_number} for aggregate {aggregate_id} conflicts with the persisted stream")]
    SequenceConflict {
        /// The aggregate whose stream rejected the append.
        aggregate_id: AggregateId,
        /// The conflicting sequence number.
        sequence_number: i64,
    },

    /// An event row could not be decoded.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// A handler failed during post-commit fan-out. The write is already
    /// durable when this is raised.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// An infrastructure/persistence error.
    #[error("event store database error: {0}")]
    Database(String),
}

/// Errors raised by the aggregate repository unit of work.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No events exist for the requested aggregate.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(AggregateId),

    /// A second aggregate object was registered under an id already
    /// present in the identity map.
    #[error("aggregate {0} is already registered in this unit of work")]
    NonUniqueAggregateId(AggregateId),

    /// The identity map holds this id under a different aggregate type.
    #[error("aggregate {aggregate_id} is registered as a different aggregate type")]
    TypeMismatch {
        /// The contested aggregate id.
        aggregate_id: AggregateId,
    },

    /// Rehydration failed.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// The event store rejected a load or commit.
    #[error(transparent)]
    EventStore(#[from] EventStoreError),
}

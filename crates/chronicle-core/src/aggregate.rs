//! Aggregate root abstraction.
//!
//! Aggregates embed a [`Root`], which tracks the identity, the next
//! sequence number, and the events produced since the last commit. State
//! changes flow through [`AggregateRoot::apply`]: the event is dispatched
//! to the aggregate's `handle` and then recorded as uncommitted, so the
//! same dispatch path serves both live mutation and rehydration.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AggregateError;
use crate::event::{DomainEvent, EventMetadata};

/// Opaque identifier of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(String);

impl AggregateId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AggregateId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for AggregateId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// The bookkeeping every aggregate embeds: identity, the next sequence
/// number to assign, and the uncommitted event buffer.
#[derive(Debug)]
pub struct Root<E> {
    id: AggregateId,
    sequence_number: i64,
    uncommitted_events: Vec<E>,
}

impl<E> Root<E> {
    /// Creates the root for a fresh aggregate. The next sequence number
    /// starts at 1.
    #[must_use]
    pub fn new(id: AggregateId) -> Self {
        Self {
            id,
            sequence_number: 1,
            uncommitted_events: Vec::new(),
        }
    }

    /// Returns the aggregate identifier.
    pub fn id(&self) -> &AggregateId {
        &self.id
    }

    /// Returns the next sequence number to assign.
    pub fn sequence_number(&self) -> i64 {
        self.sequence_number
    }

    /// Returns the events produced since the last commit.
    pub fn uncommitted_events(&self) -> &[E] {
        &self.uncommitted_events
    }

    /// Empties the uncommitted event buffer.
    pub fn clear_events(&mut self) {
        self.uncommitted_events.clear();
    }

    /// Stamps metadata for the next event this aggregate will emit.
    pub fn next_metadata(&self, clock: &dyn Clock) -> EventMetadata {
        EventMetadata {
            aggregate_id: self.id.clone(),
            sequence_number: self.sequence_number,
            created_at: clock.now(),
        }
    }

    /// Appends an event to the uncommitted buffer and advances the
    /// sequence number.
    pub fn record(&mut self, event: E) {
        self.uncommitted_events.push(event);
        self.sequence_number += 1;
    }

    /// Finishes a rehydration pass: the next sequence number becomes
    /// `history_len + 1` and the uncommitted buffer is emptied.
    ///
    /// Called by [`Reconstitute::load_from_history`]; not intended for
    /// application code.
    pub fn finish_rehydration(&mut self, history_len: usize) {
        #[allow(clippy::cast_possible_wrap)]
        let next = history_len as i64 + 1;
        self.sequence_number = next;
        self.uncommitted_events.clear();
    }
}

/// Trait for aggregate roots.
///
/// Implementations embed a [`Root`] and route every received event
/// through `handle`, a variant-exact dispatch that mutates internal
/// state. Command methods build an event (stamping metadata via
/// [`Root::next_metadata`]) and pass it to [`apply`](Self::apply).
pub trait AggregateRoot: Send {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the embedded root.
    fn root(&self) -> &Root<Self::Event>;

    /// Returns the embedded root mutably.
    fn root_mut(&mut self) -> &mut Root<Self::Event>;

    /// Dispatches an event to the handler for its variant, mutating
    /// internal state.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::UnhandledEvent`] when no handler covers
    /// the received variant.
    fn handle(&mut self, event: &Self::Event) -> Result<(), AggregateError>;

    /// Upcast for identity-map storage.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for identity-map retrieval.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> &AggregateId {
        self.root().id()
    }

    /// Returns the next sequence number to assign.
    fn sequence_number(&self) -> i64 {
        self.root().sequence_number()
    }

    /// Returns uncommitted events produced since the last commit.
    fn uncommitted_events(&self) -> &[Self::Event] {
        self.root().uncommitted_events()
    }

    /// Clears uncommitted events after persistence.
    fn clear_events(&mut self) {
        self.root_mut().clear_events();
    }

    /// Dispatches the event through `handle`, then records it as
    /// uncommitted and advances the sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::UnhandledEvent`] when the variant has no
    /// handler; the event is not recorded in that case.
    fn apply(&mut self, event: Self::Event) -> Result<(), AggregateError> {
        self.handle(&event)?;
        self.root_mut().record(event);
        Ok(())
    }
}

/// Constructor seam for rebuilding an aggregate from its event stream.
///
/// `blank` allocates an instance without running any command-handling
/// construction logic. Construction may emit creation events; rehydration
/// must not re-emit them, so the two paths stay separate.
pub trait Reconstitute: AggregateRoot + Sized {
    /// Allocates a blank instance with the given identity and default
    /// internal state.
    fn blank(id: AggregateId) -> Self;

    /// Rebuilds an aggregate by folding its history through `handle`.
    ///
    /// After a successful load the aggregate's next sequence number is
    /// `events.len() + 1` and its uncommitted buffer is empty.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::EmptyHistory`] when `events` is empty,
    /// or [`AggregateError::UnhandledEvent`] when a persisted variant has
    /// no handler.
    fn load_from_history(events: Vec<Self::Event>) -> Result<Self, AggregateError> {
        let first = events.first().ok_or(AggregateError::EmptyHistory)?;
        let mut aggregate = Self::blank(first.metadata().aggregate_id.clone());
        for event in &events {
            aggregate.handle(event)?;
        }
        aggregate.root_mut().finish_rehydration(events.len());
        Ok(aggregate)
    }
}

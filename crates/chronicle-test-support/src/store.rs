//! Test event stores — in-memory `EventStore` implementations.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chronicle_core::aggregate::AggregateId;
use chronicle_core::command::Command;
use chronicle_core::error::EventStoreError;
use chronicle_core::event::DomainEvent;
use chronicle_core::store::EventStore;

/// An in-memory event store that appends per-aggregate streams and
/// records every committed `(command, events)` batch for inspection.
#[derive(Debug)]
pub struct InMemoryEventStore<E> {
    streams: Mutex<HashMap<AggregateId, Vec<E>>>,
    committed: Mutex<Vec<(String, serde_json::Value, Vec<E>)>>,
}

impl<E> Default for InMemoryEventStore<E> {
    fn default() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            committed: Mutex::new(Vec::new()),
        }
    }
}

impl<E: DomainEvent> InMemoryEventStore<E> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every committed batch, in commit order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn committed(&self) -> Vec<(String, serde_json::Value, Vec<E>)> {
        self.committed.lock().unwrap().clone()
    }

    /// Seeds a stream directly, bypassing the commit path.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed(&self, aggregate_id: AggregateId, events: Vec<E>) {
        self.streams.lock().unwrap().insert(aggregate_id, events);
    }
}

#[async_trait]
impl<E: DomainEvent> EventStore for InMemoryEventStore<E> {
    type Event = E;

    async fn commit_events(
        &self,
        command: &dyn Command,
        events: Vec<E>,
    ) -> Result<(), EventStoreError> {
        let mut streams = self.streams.lock().unwrap();
        for event in &events {
            streams
                .entry(event.metadata().aggregate_id.clone())
                .or_default()
                .push(event.clone());
        }
        self.committed.lock().unwrap().push((
            command.command_type().to_owned(),
            command.payload(),
            events,
        ));
        Ok(())
    }

    async fn load_events(&self, aggregate_id: &AggregateId) -> Result<Vec<E>, EventStoreError> {
        Ok(self
            .streams
            .lock()
            .unwrap()
            .get(aggregate_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// An event store that always fails with an infrastructure error, for
/// error-path tests.
#[derive(Debug)]
pub struct FailingEventStore<E> {
    _event: std::marker::PhantomData<fn() -> E>,
}

impl<E> Default for FailingEventStore<E> {
    fn default() -> Self {
        Self {
            _event: std::marker::PhantomData,
        }
    }
}

impl<E: DomainEvent> FailingEventStore<E> {
    /// Creates a store whose every operation fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<E: DomainEvent> EventStore for FailingEventStore<E> {
    type Event = E;

    async fn commit_events(
        &self,
        _command: &dyn Command,
        _events: Vec<E>,
    ) -> Result<(), EventStoreError> {
        Err(EventStoreError::Database("connection refused".to_owned()))
    }

    async fn load_events(&self, _aggregate_id: &AggregateId) -> Result<Vec<E>, EventStoreError> {
        Err(EventStoreError::Database("connection refused".to_owned()))
    }
}

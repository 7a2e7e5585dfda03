//! `PostgreSQL` implementation of the `EventStore` trait.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use chronicle_core::aggregate::AggregateId;
use chronicle_core::clock::{Clock, SystemClock};
use chronicle_core::command::Command;
use chronicle_core::error::EventStoreError;
use chronicle_core::event::{DomainEvent, EventMetadata};
use chronicle_core::handler::EventHandler;
use chronicle_core::serializer::{serialize_event, EventRegistry};
use chronicle_core::store::EventStore;

use crate::stream::StoredEventRow;

const INSERT_COMMAND: &str = "
INSERT INTO commands (id, command_type, payload_json, created_at)
VALUES ($1, $2, $3, $4)
";

const INSERT_EVENT: &str = "
INSERT INTO events (id, aggregate_id, sequence_number, command_id, event_type, event_json, created_at)
VALUES ($1, $2, $3, $4, $5, $6, $7)
";

const SELECT_STREAM: &str = "
SELECT event_json
FROM events
WHERE aggregate_id = $1
ORDER BY sequence_number ASC
";

const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed event store.
///
/// A store instance is immutable once built; reconfiguration (a new
/// handler set, a new registry) allocates a fresh instance which the
/// configuration context publishes atomically.
pub struct PgEventStore<E: DomainEvent> {
    pool: PgPool,
    registry: Arc<EventRegistry<E>>,
    handlers: Vec<Arc<dyn EventHandler<E>>>,
    clock: Arc<dyn Clock>,
}

impl<E: DomainEvent> PgEventStore<E> {
    /// Creates a store with no handlers and the system clock.
    #[must_use]
    pub fn new(pool: PgPool, registry: EventRegistry<E>) -> Self {
        Self {
            pool,
            registry: Arc::new(registry),
            handlers: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the registered handler set.
    #[must_use]
    pub fn with_handlers(mut self, handlers: Vec<Arc<dyn EventHandler<E>>>) -> Self {
        self.handlers = handlers;
        self
    }

    /// Replaces the clock used to stamp command rows.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Decodes and dispatches a supplier's stream of raw event rows to
    /// every registered handler, returning the number of events replayed.
    ///
    /// The stream's cross-aggregate ordering is the supplier's contract;
    /// see [`crate::stream::ReplayOrdering`].
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Serialization`] on an undecodable row,
    /// [`EventStoreError::Handler`] when a handler fails, and
    /// [`EventStoreError::Database`] on stream errors.
    pub async fn replay_events<S>(&self, rows: S) -> Result<u64, EventStoreError>
    where
        S: Stream<Item = Result<StoredEventRow, sqlx::Error>> + Unpin + Send,
    {
        let mut rows = rows;
        let mut replayed = 0u64;
        while let Some(row) = rows.try_next().await.map_err(db_error)? {
            let event = self.registry.decode(&row.event_json)?;
            self.dispatch(std::slice::from_ref(&event))?;
            replayed += 1;
        }
        tracing::info!(events = replayed, "replay complete");
        Ok(replayed)
    }

    fn dispatch(&self, events: &[E]) -> Result<(), EventStoreError> {
        for event in events {
            for handler in &self.handlers {
                handler.handle_message(event)?;
            }
        }
        Ok(())
    }
}

fn db_error(error: sqlx::Error) -> EventStoreError {
    EventStoreError::Database(error.to_string())
}

fn append_error(error: sqlx::Error, metadata: &EventMetadata) -> EventStoreError {
    let unique_violation = error
        .as_database_error()
        .and_then(|database_error| database_error.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION);
    if unique_violation {
        EventStoreError::SequenceConflict {
            aggregate_id: metadata.aggregate_id.clone(),
            sequence_number: metadata.sequence_number,
        }
    } else {
        db_error(error)
    }
}

#[async_trait]
impl<E: DomainEvent> EventStore for PgEventStore<E> {
    type Event = E;

    async fn commit_events(
        &self,
        command: &dyn Command,
        events: Vec<E>,
    ) -> Result<(), EventStoreError> {
        let command_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query(INSERT_COMMAND)
            .bind(command_id)
            .bind(command.command_type())
            .bind(Json(command.payload()))
            .bind(self.clock.now())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        for event in &events {
            let metadata = event.metadata();
            sqlx::query(INSERT_EVENT)
                .bind(Uuid::new_v4())
                .bind(metadata.aggregate_id.as_str())
                .bind(metadata.sequence_number)
                .bind(command_id)
                .bind(event.event_type())
                .bind(Json(serialize_event(event)))
                .bind(metadata.created_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| append_error(e, metadata))?;
        }

        tx.commit().await.map_err(db_error)?;
        tracing::debug!(
            command_type = command.command_type(),
            event_count = events.len(),
            "command and events persisted"
        );

        // The write is durable from here on; a handler failure surfaces
        // to the caller but cannot roll it back.
        self.dispatch(&events)
    }

    async fn load_events(&self, aggregate_id: &AggregateId) -> Result<Vec<E>, EventStoreError> {
        let rows: Vec<(Json<serde_json::Value>,)> = sqlx::query_as(SELECT_STREAM)
            .bind(aggregate_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter()
            .map(|(Json(tree),)| self.registry.decode(tree).map_err(EventStoreError::from))
            .collect()
    }
}

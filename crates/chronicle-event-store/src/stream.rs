//! Replay supplier — streams raw event rows out of the log.

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use sqlx::PgPool;

/// A raw persisted event row, not yet decoded.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredEventRow {
    /// Aggregate the event belongs to.
    pub aggregate_id: String,
    /// Position within the aggregate stream.
    pub sequence_number: i64,
    /// Event type name for decoder routing.
    pub event_type: String,
    /// The full serialized event.
    pub event_json: serde_json::Value,
    /// Timestamp of event creation.
    pub created_at: DateTime<Utc>,
}

/// The ordering a replay consumer observes across aggregates.
///
/// The store only ever guarantees order *within* one aggregate. Whether
/// a handler additionally needs one global timeline is a property of the
/// handler, so the choice is made here, on the supplier, instead of
/// being implied by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOrdering {
    /// Aggregates streamed one after another, each in sequence order.
    AggregateOrder,
    /// All events interleaved on `created_at`, ties broken by sequence
    /// number.
    GlobalChronological,
}

const SELECT_BY_AGGREGATE: &str = "
SELECT aggregate_id, sequence_number, event_type, event_json, created_at
FROM events
ORDER BY aggregate_id ASC, sequence_number ASC
";

const SELECT_CHRONOLOGICAL: &str = "
SELECT aggregate_id, sequence_number, event_type, event_json, created_at
FROM events
ORDER BY created_at ASC, sequence_number ASC
";

/// Supplier of raw event rows for a full replay.
#[derive(Debug, Clone)]
pub struct EventStream {
    pool: PgPool,
    ordering: ReplayOrdering,
}

impl EventStream {
    /// Creates a supplier over the given pool with an explicit ordering.
    #[must_use]
    pub fn new(pool: PgPool, ordering: ReplayOrdering) -> Self {
        Self { pool, ordering }
    }

    /// Returns the ordering this supplier produces.
    #[must_use]
    pub fn ordering(&self) -> ReplayOrdering {
        self.ordering
    }

    /// Streams every persisted event row in the configured order.
    #[must_use]
    pub fn rows(&self) -> BoxStream<'_, Result<StoredEventRow, sqlx::Error>> {
        let query = match self.ordering {
            ReplayOrdering::AggregateOrder => SELECT_BY_AGGREGATE,
            ReplayOrdering::GlobalChronological => SELECT_CHRONOLOGICAL,
        };
        sqlx::query_as::<_, StoredEventRow>(query).fetch(&self.pool)
    }
}

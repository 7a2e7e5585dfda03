//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::aggregate::AggregateId;

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMetadata {
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: AggregateId,
    /// Monotonically increasing, 1-based position within the aggregate stream.
    pub sequence_number: i64,
    /// Timestamp of event creation.
    pub created_at: DateTime<Utc>,
}

/// Trait that all domain events implement.
///
/// An application typically implements this on one enum per bounded
/// context, with one payload struct per variant. Equality is structural:
/// two deserialized events with identical serialized form compare equal.
pub trait DomainEvent: Send + Sync + Clone + PartialEq + std::fmt::Debug + 'static {
    /// Returns the event type name (used for serialization routing).
    fn event_type(&self) -> &'static str;

    /// Returns the metadata for this event.
    fn metadata(&self) -> &EventMetadata;

    /// Serializes the declared payload attributes to a JSON object.
    ///
    /// Declared-but-unset fields appear with a `null` value so the
    /// serialized form is self-describing. Metadata fields are not part
    /// of the attribute map; the serializer adds them at the top level.
    fn attributes(&self) -> Map<String, Value>;

    /// Attribute names excluded from [`payload`](Self::payload), for
    /// tenant-scoping fields that ride along in the serialized form but
    /// are not part of the event's observable content.
    fn non_payload_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    /// The projection of this event used for content comparison: the
    /// declared attributes minus tenant-scoping fields, plus `event_type`.
    fn payload(&self) -> Map<String, Value> {
        let mut payload = self.attributes();
        for field in self.non_payload_attributes() {
            payload.remove(*field);
        }
        payload.insert(
            "event_type".to_owned(),
            Value::String(self.event_type().to_owned()),
        );
        payload
    }
}

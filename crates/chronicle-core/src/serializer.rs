//! Symmetric conversion between domain events and JSON trees.
//!
//! The serialized form of an event is a single flat JSON object: the
//! event's declared attributes plus `event_type` and the metadata fields
//! at the top level. Deserialization routes through an [`EventRegistry`]
//! keyed by `event_type`, then coerces each declared field with the
//! helpers in [`coerce`]. Serialization uses the helpers in [`emit`];
//! the two modules are symmetric, so every serialized event round-trips
//! to an equal value.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::SerializationError;
use crate::event::{DomainEvent, EventMetadata};

/// Produces the flat serialized form of an event.
#[must_use]
pub fn serialize_event<E: DomainEvent>(event: &E) -> Value {
    let metadata = event.metadata();
    let mut tree = event.attributes();
    tree.insert(
        "event_type".to_owned(),
        Value::String(event.event_type().to_owned()),
    );
    tree.insert(
        "aggregate_id".to_owned(),
        Value::String(metadata.aggregate_id.to_string()),
    );
    tree.insert(
        "sequence_number".to_owned(),
        Value::from(metadata.sequence_number),
    );
    tree.insert(
        "created_at".to_owned(),
        Value::String(emit::date_time_string(&metadata.created_at)),
    );
    Value::Object(tree)
}

/// A decoder rebuilds one event variant from its metadata and attributes.
pub type EventDecoder<E> =
    fn(EventMetadata, &Map<String, Value>) -> Result<E, SerializationError>;

/// Registry mapping `event_type` to the decoder for that variant.
///
/// This is the versioning seam: a renamed variant keeps its old wire name
/// by registering the same decoder under both strings.
#[derive(Debug, Clone)]
pub struct EventRegistry<E> {
    decoders: HashMap<&'static str, EventDecoder<E>>,
}

impl<E> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventRegistry<E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registers a decoder for an event type, replacing any previous one.
    pub fn register(&mut self, event_type: &'static str, decoder: EventDecoder<E>) {
        self.decoders.insert(event_type, decoder);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, event_type: &'static str, decoder: EventDecoder<E>) -> Self {
        self.register(event_type, decoder);
        self
    }

    /// Decodes a serialized event tree.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::UnknownEventType`] when no decoder is
    /// registered for the tree's `event_type`, and coercion errors from
    /// the variant decoder.
    pub fn decode(&self, tree: &Value) -> Result<E, SerializationError> {
        let attributes = tree.as_object().ok_or(SerializationError::NotAnObject)?;
        let event_type = attributes
            .get("event_type")
            .and_then(Value::as_str)
            .ok_or_else(|| SerializationError::MissingField("event_type".to_owned()))?;
        let decoder = self
            .decoders
            .get(event_type)
            .ok_or_else(|| SerializationError::UnknownEventType(event_type.to_owned()))?;
        let metadata = EventMetadata {
            aggregate_id: coerce::required_string(attributes, "aggregate_id")?.into(),
            sequence_number: coerce::required_integer(attributes, "sequence_number")?,
            created_at: coerce::required_date_time(attributes, "created_at")?,
        };
        decoder(metadata, attributes)
    }
}

/// Field coercion from JSON trees, per declared type.
///
/// Every accessor treats an absent key, an explicit `null`, and (for
/// scalars parsed from strings) a blank string as `None`. Malformed
/// values fail with [`SerializationError::InvalidField`].
pub mod coerce {
    use chrono::{DateTime, NaiveDate, Utc};
    use serde_json::{Map, Value};

    use crate::error::SerializationError;
    use crate::value_object::{Symbol, ValueObject};

    fn blank(s: &str) -> bool {
        s.trim().is_empty()
    }

    fn invalid(expected: &'static str, found: &Value) -> SerializationError {
        SerializationError::InvalidField {
            field: String::new(),
            expected,
            found: found.to_string(),
        }
    }

    fn at_field(field: impl Into<String>, error: SerializationError) -> SerializationError {
        match error {
            SerializationError::InvalidField {
                expected, found, ..
            } => SerializationError::InvalidField {
                field: field.into(),
                expected,
                found,
            },
            other => other,
        }
    }

    fn lookup<T>(
        attributes: &Map<String, Value>,
        field: &str,
        element: impl Fn(&Value) -> Result<Option<T>, SerializationError>,
    ) -> Result<Option<T>, SerializationError> {
        match attributes.get(field) {
            None => Ok(None),
            Some(value) => element(value).map_err(|e| at_field(field, e)),
        }
    }

    /// Coerces a single JSON value to a string.
    pub fn string_element(value: &Value) -> Result<Option<String>, SerializationError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if blank(s) => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            other => Err(invalid("string", other)),
        }
    }

    /// Coerces a single JSON value to an integer. Strings parse base-10.
    pub fn integer_element(value: &Value) -> Result<Option<i64>, SerializationError> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => n.as_i64().map(Some).ok_or_else(|| invalid("integer", value)),
            Value::String(s) if blank(s) => Ok(None),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| invalid("integer", value)),
            other => Err(invalid("integer", other)),
        }
    }

    /// Coerces a single JSON value to a boolean. Accepts `true`/`false`
    /// and their string forms.
    pub fn boolean_element(value: &Value) -> Result<Option<bool>, SerializationError> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            Value::String(s) if blank(s) => Ok(None),
            Value::String(s) => match s.as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(invalid("boolean", value)),
            },
            other => Err(invalid("boolean", other)),
        }
    }

    /// Coerces a single JSON value to a [`Symbol`].
    pub fn symbol_element(value: &Value) -> Result<Option<Symbol>, SerializationError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if blank(s) => Ok(None),
            Value::String(s) => Ok(Some(Symbol::new(s.clone()))),
            other => Err(invalid("symbol", other)),
        }
    }

    /// Coerces a single JSON value to a date. Only strict `DD-MM-YYYY`
    /// strings are accepted.
    pub fn date_element(value: &Value) -> Result<Option<NaiveDate>, SerializationError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if blank(s) => Ok(None),
            Value::String(s) => NaiveDate::parse_from_str(s, "%d-%m-%Y")
                .map(Some)
                .map_err(|_| invalid("DD-MM-YYYY date", value)),
            other => Err(invalid("DD-MM-YYYY date", other)),
        }
    }

    /// Coerces a single JSON value to a timestamp. Only strict ISO-8601
    /// strings are accepted.
    pub fn date_time_element(value: &Value) -> Result<Option<DateTime<Utc>>, SerializationError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if blank(s) => Ok(None),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(|_| invalid("ISO-8601 datetime", value)),
            other => Err(invalid("ISO-8601 datetime", other)),
        }
    }

    /// Coerces a single JSON value to a nested value object.
    pub fn value_object_element<T: ValueObject>(
        value: &Value,
    ) -> Result<Option<T>, SerializationError> {
        match value {
            Value::Null => Ok(None),
            Value::Object(map) => T::from_attributes(map).map(Some),
            other => Err(invalid("object", other)),
        }
    }

    /// Coerces a declared string field.
    pub fn string(
        attributes: &Map<String, Value>,
        field: &str,
    ) -> Result<Option<String>, SerializationError> {
        lookup(attributes, field, string_element)
    }

    /// Coerces a declared integer field.
    pub fn integer(
        attributes: &Map<String, Value>,
        field: &str,
    ) -> Result<Option<i64>, SerializationError> {
        lookup(attributes, field, integer_element)
    }

    /// Coerces a declared boolean field.
    pub fn boolean(
        attributes: &Map<String, Value>,
        field: &str,
    ) -> Result<Option<bool>, SerializationError> {
        lookup(attributes, field, boolean_element)
    }

    /// Coerces a declared symbol field.
    pub fn symbol(
        attributes: &Map<String, Value>,
        field: &str,
    ) -> Result<Option<Symbol>, SerializationError> {
        lookup(attributes, field, symbol_element)
    }

    /// Coerces a declared date field.
    pub fn date(
        attributes: &Map<String, Value>,
        field: &str,
    ) -> Result<Option<NaiveDate>, SerializationError> {
        lookup(attributes, field, date_element)
    }

    /// Coerces a declared datetime field.
    pub fn date_time(
        attributes: &Map<String, Value>,
        field: &str,
    ) -> Result<Option<DateTime<Utc>>, SerializationError> {
        lookup(attributes, field, date_time_element)
    }

    /// Coerces a declared nested value object field.
    pub fn value_object<T: ValueObject>(
        attributes: &Map<String, Value>,
        field: &str,
    ) -> Result<Option<T>, SerializationError> {
        lookup(attributes, field, value_object_element)
    }

    /// Coerces a declared list field element-wise. `null` elements are
    /// preserved as `None`.
    pub fn list<T>(
        attributes: &Map<String, Value>,
        field: &str,
        element: impl Fn(&Value) -> Result<Option<T>, SerializationError>,
    ) -> Result<Option<Vec<Option<T>>>, SerializationError> {
        match attributes.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| element(item).map_err(|e| at_field(format!("{field}[{i}]"), e)))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(at_field(field, invalid("array", other))),
        }
    }

    /// Coerces a mandatory string field.
    pub fn required_string(
        attributes: &Map<String, Value>,
        field: &str,
    ) -> Result<String, SerializationError> {
        string(attributes, field)?
            .ok_or_else(|| SerializationError::MissingField(field.to_owned()))
    }

    /// Coerces a mandatory integer field.
    pub fn required_integer(
        attributes: &Map<String, Value>,
        field: &str,
    ) -> Result<i64, SerializationError> {
        integer(attributes, field)?
            .ok_or_else(|| SerializationError::MissingField(field.to_owned()))
    }

    /// Coerces a mandatory datetime field.
    pub fn required_date_time(
        attributes: &Map<String, Value>,
        field: &str,
    ) -> Result<chrono::DateTime<chrono::Utc>, SerializationError> {
        date_time(attributes, field)?
            .ok_or_else(|| SerializationError::MissingField(field.to_owned()))
    }
}

/// Field serialization to JSON trees, symmetric with [`coerce`].
pub mod emit {
    use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
    use serde_json::Value;

    use crate::value_object::{Symbol, ValueObject};

    /// Renders a timestamp in its canonical ISO-8601 UTC string form.
    #[must_use]
    pub fn date_time_string(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    /// Renders a date in its canonical `DD-MM-YYYY` string form.
    #[must_use]
    pub fn date_string(value: &NaiveDate) -> String {
        value.format("%d-%m-%Y").to_string()
    }

    /// Serializes an optional string field.
    #[must_use]
    pub fn string(value: &Option<String>) -> Value {
        value.as_ref().map_or(Value::Null, |s| Value::String(s.clone()))
    }

    /// Serializes an optional integer field.
    #[must_use]
    pub fn integer(value: &Option<i64>) -> Value {
        value.map_or(Value::Null, Value::from)
    }

    /// Serializes an optional boolean field.
    #[must_use]
    pub fn boolean(value: &Option<bool>) -> Value {
        value.map_or(Value::Null, Value::Bool)
    }

    /// Serializes an optional symbol field as its plain string form.
    #[must_use]
    pub fn symbol(value: &Option<Symbol>) -> Value {
        value
            .as_ref()
            .map_or(Value::Null, |s| Value::String(s.as_str().to_owned()))
    }

    /// Serializes an optional date field.
    #[must_use]
    pub fn date(value: &Option<NaiveDate>) -> Value {
        value
            .as_ref()
            .map_or(Value::Null, |d| Value::String(date_string(d)))
    }

    /// Serializes an optional datetime field.
    #[must_use]
    pub fn date_time(value: &Option<DateTime<Utc>>) -> Value {
        value
            .as_ref()
            .map_or(Value::Null, |dt| Value::String(date_time_string(dt)))
    }

    /// Serializes an optional nested value object field.
    #[must_use]
    pub fn value_object<T: ValueObject>(value: &Option<T>) -> Value {
        value
            .as_ref()
            .map_or(Value::Null, |v| Value::Object(v.to_attributes()))
    }

    /// Serializes an optional list field element-wise, preserving `null`
    /// elements.
    #[must_use]
    pub fn list<T>(value: &Option<Vec<Option<T>>>, element: impl Fn(&T) -> Value) -> Value {
        value.as_ref().map_or(Value::Null, |items| {
            Value::Array(
                items
                    .iter()
                    .map(|item| item.as_ref().map_or(Value::Null, &element))
                    .collect(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::{json, Map, Value};

    use crate::aggregate::AggregateId;
    use crate::error::SerializationError;
    use crate::event::{DomainEvent, EventMetadata};
    use crate::value_object::{Symbol, ValueObject};

    use super::{coerce, emit, serialize_event, EventRegistry};

    #[derive(Debug, Clone, PartialEq)]
    struct PostalAddress {
        street: Option<String>,
        country: Option<Symbol>,
    }

    impl ValueObject for PostalAddress {
        fn to_attributes(&self) -> Map<String, Value> {
            let mut attributes = Map::new();
            attributes.insert("street".to_owned(), emit::string(&self.street));
            attributes.insert("country".to_owned(), emit::symbol(&self.country));
            attributes
        }

        fn from_attributes(attributes: &Map<String, Value>) -> Result<Self, SerializationError> {
            Ok(Self {
                street: coerce::string(attributes, "street")?,
                country: coerce::symbol(attributes, "country")?,
            })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct WorkspaceRenamed {
        metadata: EventMetadata,
        organization_id: String,
        name: Option<String>,
        renamed_on: Option<NaiveDate>,
        owner: Option<Symbol>,
        address: Option<PostalAddress>,
        labels: Option<Vec<Option<Symbol>>>,
    }

    impl DomainEvent for WorkspaceRenamed {
        fn event_type(&self) -> &'static str {
            "tenancy.workspace_renamed"
        }

        fn metadata(&self) -> &EventMetadata {
            &self.metadata
        }

        fn attributes(&self) -> Map<String, Value> {
            let mut attributes = Map::new();
            attributes.insert(
                "organization_id".to_owned(),
                Value::String(self.organization_id.clone()),
            );
            attributes.insert("name".to_owned(), emit::string(&self.name));
            attributes.insert("renamed_on".to_owned(), emit::date(&self.renamed_on));
            attributes.insert("owner".to_owned(), emit::symbol(&self.owner));
            attributes.insert("address".to_owned(), emit::value_object(&self.address));
            attributes.insert(
                "labels".to_owned(),
                emit::list(&self.labels, |label| {
                    Value::String(label.as_str().to_owned())
                }),
            );
            attributes
        }

        fn non_payload_attributes(&self) -> &'static [&'static str] {
            &["organization_id"]
        }
    }

    fn decode_workspace_renamed(
        metadata: EventMetadata,
        attributes: &Map<String, Value>,
    ) -> Result<WorkspaceRenamed, SerializationError> {
        Ok(WorkspaceRenamed {
            metadata,
            organization_id: coerce::required_string(attributes, "organization_id")?,
            name: coerce::string(attributes, "name")?,
            renamed_on: coerce::date(attributes, "renamed_on")?,
            owner: coerce::symbol(attributes, "owner")?,
            address: coerce::value_object(attributes, "address")?,
            labels: coerce::list(attributes, "labels", coerce::symbol_element)?,
        })
    }

    fn registry() -> EventRegistry<WorkspaceRenamed> {
        EventRegistry::new().with("tenancy.workspace_renamed", decode_workspace_renamed)
    }

    fn sample_event() -> WorkspaceRenamed {
        WorkspaceRenamed {
            metadata: EventMetadata {
                aggregate_id: AggregateId::from("ws-1"),
                sequence_number: 7,
                created_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            },
            organization_id: "org-9".to_owned(),
            name: Some("foo".to_owned()),
            renamed_on: NaiveDate::from_ymd_opt(2015, 1, 1),
            owner: None,
            address: Some(PostalAddress {
                street: Some("1 Main St".to_owned()),
                country: Some(Symbol::from("nl")),
            }),
            labels: Some(vec![Some(Symbol::from("beta")), None, Some(Symbol::from("internal"))]),
        }
    }

    // --- round trip ---

    #[test]
    fn test_serialized_event_round_trips_to_an_equal_value() {
        let event = sample_event();

        let tree = serialize_event(&event);
        let decoded = registry().decode(&tree).unwrap();

        assert_eq!(decoded, event);
    }

    #[test]
    fn test_serialized_form_is_flat_with_metadata_at_top_level() {
        let event = sample_event();

        let tree = serialize_event(&event);

        assert_eq!(tree["event_type"], json!("tenancy.workspace_renamed"));
        assert_eq!(tree["aggregate_id"], json!("ws-1"));
        assert_eq!(tree["sequence_number"], json!(7));
        assert_eq!(tree["organization_id"], json!("org-9"));
        assert_eq!(tree["renamed_on"], json!("01-01-2015"));
        assert_eq!(tree["owner"], Value::Null);
        assert_eq!(tree["labels"], json!(["beta", null, "internal"]));
        assert_eq!(tree["address"]["country"], json!("nl"));
    }

    #[test]
    fn test_unknown_event_type_fails_to_decode() {
        let mut tree = serialize_event(&sample_event());
        tree["event_type"] = json!("tenancy.workspace_archived");

        let result = registry().decode(&tree);

        assert!(matches!(
            result,
            Err(SerializationError::UnknownEventType(t)) if t == "tenancy.workspace_archived"
        ));
    }

    // --- payload projection ---

    #[test]
    fn test_payload_excludes_metadata_and_tenant_fields() {
        let event = WorkspaceRenamed {
            name: Some("foo".to_owned()),
            renamed_on: None,
            owner: None,
            address: None,
            labels: None,
            ..sample_event()
        };

        let payload = event.payload();

        let expected = json!({
            "event_type": "tenancy.workspace_renamed",
            "name": "foo",
            "renamed_on": null,
            "owner": null,
            "address": null,
            "labels": null,
        });
        assert_eq!(Value::Object(payload), expected);
    }

    #[test]
    fn test_equal_serialized_payloads_mean_equal_events() {
        let event = sample_event();

        let tree = serialize_event(&event);
        let first = registry().decode(&tree).unwrap();
        let second = registry().decode(&tree).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.payload(), second.payload());
    }

    // --- scalar coercion ---

    fn attrs(value: Value) -> Map<String, Value> {
        let mut attributes = Map::new();
        attributes.insert("field".to_owned(), value);
        attributes
    }

    #[test]
    fn test_date_coercion_accepts_strict_day_month_year_only() {
        let parsed = coerce::date(&attrs(json!("01-01-2015")), "field").unwrap();
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2015, 1, 1));

        assert!(coerce::date(&attrs(json!("2015-01-01")), "field").is_err());
        assert!(coerce::date(&attrs(json!("31-31-2015")), "field").is_err());
        assert_eq!(coerce::date(&attrs(json!(" ")), "field").unwrap(), None);
    }

    #[test]
    fn test_integer_coercion_parses_base_ten_strings() {
        assert_eq!(
            coerce::integer(&attrs(json!("42")), "field").unwrap(),
            Some(42)
        );
        assert_eq!(coerce::integer(&attrs(json!(42)), "field").unwrap(), Some(42));
        assert_eq!(coerce::integer(&attrs(json!("")), "field").unwrap(), None);
        assert!(coerce::integer(&attrs(json!("4x2")), "field").is_err());
        assert!(coerce::integer(&attrs(json!(1.5)), "field").is_err());
    }

    #[test]
    fn test_boolean_coercion_accepts_string_forms() {
        assert_eq!(
            coerce::boolean(&attrs(json!("true")), "field").unwrap(),
            Some(true)
        );
        assert_eq!(
            coerce::boolean(&attrs(json!(false)), "field").unwrap(),
            Some(false)
        );
        assert_eq!(coerce::boolean(&attrs(json!(" ")), "field").unwrap(), None);
        assert!(coerce::boolean(&attrs(json!("yes")), "field").is_err());
    }

    #[test]
    fn test_blank_strings_coerce_to_none() {
        assert_eq!(coerce::string(&attrs(json!("  ")), "field").unwrap(), None);
        assert_eq!(coerce::symbol(&attrs(json!("")), "field").unwrap(), None);
        assert_eq!(
            coerce::string(&attrs(json!("kept")), "field").unwrap(),
            Some("kept".to_owned())
        );
    }

    #[test]
    fn test_symbol_round_trips_through_its_string_form() {
        let symbol = Some(Symbol::from("pending"));

        let value = emit::symbol(&symbol);
        assert_eq!(value, json!("pending"));

        let back = coerce::symbol(&attrs(value), "field").unwrap();
        assert_eq!(back, symbol);
    }

    #[test]
    fn test_malformed_datetime_fails() {
        assert!(coerce::date_time(&attrs(json!("2026-01-15")), "field").is_err());
        assert!(coerce::date_time(&attrs(json!("not a time")), "field").is_err());
        assert!(
            coerce::date_time(&attrs(json!("2026-01-15T10:00:00Z")), "field")
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_list_coercion_preserves_null_elements() {
        let parsed = coerce::list(
            &attrs(json!(["a", null, "b"])),
            "field",
            coerce::string_element,
        )
        .unwrap();

        assert_eq!(
            parsed,
            Some(vec![Some("a".to_owned()), None, Some("b".to_owned())])
        );
    }

    #[test]
    fn test_list_coercion_reports_the_failing_element() {
        let result = coerce::list(
            &attrs(json!([1, "oops"])),
            "field",
            coerce::integer_element,
        );

        match result {
            Err(SerializationError::InvalidField { field, .. }) => {
                assert_eq!(field, "field[1]");
            }
            other => panic!("expected InvalidField, got {other:?}"),
        }
    }
}

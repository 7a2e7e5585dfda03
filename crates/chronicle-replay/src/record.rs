//! Staged read-model records.
//!
//! Record shapes are runtime descriptors ([`RecordClass`]) rather than
//! compiled structs, so one session can stage any table the replay
//! touches. Values are dynamic ([`ColumnValue`]) and records are shared
//! handles whose equality and hash are by address: a record mutated in
//! place never changes its hash bucket, which is what lets mutable
//! records live inside hash-based sets.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use chronicle_core::value_object::Symbol;

/// The declared kind of a record column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Text column.
    Text,
    /// 64-bit integer column.
    Integer,
    /// Boolean column.
    Boolean,
    /// Date column.
    Date,
    /// Timestamp-with-timezone column.
    Timestamp,
}

impl ColumnKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
        }
    }
}

/// One declared column of a record class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name, as it appears in the target table.
    pub name: &'static str,
    /// Declared kind.
    pub kind: ColumnKind,
}

impl Column {
    /// Declares a column.
    #[must_use]
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind }
    }
}

/// Runtime descriptor of a record shape and its target table.
#[derive(Debug)]
pub struct RecordClass {
    /// Class name, used in errors and index keys.
    pub name: &'static str,
    /// Target table for the flush.
    pub table: &'static str,
    /// Declared columns. An `id` column, when present, is skipped by the
    /// flush so the database assigns it.
    pub columns: &'static [Column],
}

/// Shorthand for the `&'static` references record classes are passed by.
pub type ClassRef = &'static RecordClass;

impl RecordClass {
    /// Looks up a declared column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// True when the class declares the named column.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

impl PartialEq for RecordClass {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for RecordClass {}

impl Hash for RecordClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A dynamic column value.
#[derive(Debug, Clone)]
pub enum ColumnValue {
    /// SQL NULL / an unset column.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Text value.
    Text(String),
    /// Symbol value; compares equal to text with the same string form.
    Symbol(Symbol),
    /// Date value.
    Date(NaiveDate),
    /// Timestamp value.
    Timestamp(DateTime<Utc>),
}

impl ColumnValue {
    /// True for [`ColumnValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The canonical, type-tagged key form used by the session indexes.
    /// Symbols and text share a tag so they index identically.
    #[must_use]
    pub fn key_form(&self) -> String {
        match self {
            Self::Null => "n:".to_owned(),
            Self::Bool(b) => format!("b:{b}"),
            Self::Int(i) => format!("i:{i}"),
            Self::Text(s) => format!("s:{s}"),
            Self::Symbol(s) => format!("s:{s}"),
            Self::Date(d) => format!("d:{d}"),
            Self::Timestamp(t) => format!("t:{}", t.to_rfc3339_opts(SecondsFormat::Micros, true)),
        }
    }
}

impl PartialEq for ColumnValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            // Symbols and strings compare by string form.
            (Self::Text(a), Self::Symbol(b)) | (Self::Symbol(b), Self::Text(a)) => {
                a == b.as_str()
            }
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Symbol> for ColumnValue {
    fn from(value: Symbol) -> Self {
        Self::Symbol(value)
    }
}

impl From<NaiveDate> for ColumnValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<DateTime<Utc>> for ColumnValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One criterion of a where clause.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereValue {
    /// The column must equal the value.
    Eq(ColumnValue),
    /// The column must equal one of the values.
    In(Vec<ColumnValue>),
}

impl WhereValue {
    /// Equality criterion.
    #[must_use]
    pub fn eq(value: impl Into<ColumnValue>) -> Self {
        Self::Eq(value.into())
    }

    /// Membership criterion; array values in a where clause mean "in".
    #[must_use]
    pub fn one_of(values: impl IntoIterator<Item = impl Into<ColumnValue>>) -> Self {
        Self::In(values.into_iter().map(Into::into).collect())
    }

    /// True when the candidate value satisfies this criterion.
    #[must_use]
    pub fn matches(&self, candidate: &ColumnValue) -> bool {
        match self {
            Self::Eq(value) => value == candidate,
            Self::In(values) => values.iter().any(|value| value == candidate),
        }
    }
}

/// A where clause: column names with their criteria.
pub type WhereClause<'a> = &'a [(&'a str, WhereValue)];

pub(crate) fn describe_where(where_clause: WhereClause<'_>) -> String {
    let criteria: Vec<String> = where_clause
        .iter()
        .map(|(column, value)| format!("{column}={value:?}"))
        .collect();
    criteria.join(", ")
}

struct RecordInner {
    class: ClassRef,
    values: Mutex<HashMap<String, ColumnValue>>,
}

/// A shared handle to one staged record.
///
/// Equality and hash are by address, not by content, so records stay
/// findable in the session's sets while handlers mutate them in place.
#[derive(Clone)]
pub struct RecordHandle(Arc<RecordInner>);

impl RecordHandle {
    pub(crate) fn new(class: ClassRef, values: &[(&str, ColumnValue)]) -> Self {
        let values = values
            .iter()
            .map(|(column, value)| ((*column).to_owned(), value.clone()))
            .collect();
        Self(Arc::new(RecordInner {
            class,
            values: Mutex::new(values),
        }))
    }

    /// The record's class.
    #[must_use]
    pub fn class(&self) -> ClassRef {
        self.0.class
    }

    /// Returns the value of a column, [`ColumnValue::Null`] when unset.
    #[must_use]
    pub fn get(&self, column: &str) -> ColumnValue {
        self.0
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(column)
            .cloned()
            .unwrap_or(ColumnValue::Null)
    }

    /// Sets the value of a column in place.
    pub fn set(&self, column: impl Into<String>, value: impl Into<ColumnValue>) {
        self.0
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(column.into(), value.into());
    }
}

impl PartialEq for RecordHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for RecordHandle {}

impl Hash for RecordHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self
            .0
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("RecordHandle")
            .field("class", &self.0.class.name)
            .field("values", &*values)
            .finish()
    }
}

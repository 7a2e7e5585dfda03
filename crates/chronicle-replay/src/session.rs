//! The in-memory working set used by read-model handlers during replay.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use chronicle_core::event::EventMetadata;

use crate::error::ReplayError;
use crate::record::{
    describe_where, ClassRef, ColumnValue, RecordHandle, WhereClause, WhereValue,
};

/// Default record-set size above which the flush switches from per-row
/// inserts to the COPY protocol.
pub const DEFAULT_INSERT_WITH_CSV_SIZE: usize = 50;

type IndexKey = (ClassRef, Vec<String>);

#[derive(Debug)]
pub(crate) enum IndexEntry {
    /// The `aggregate_id` shortcut: at most one record per aggregate.
    Single(RecordHandle),
    /// A declared composite index: all records sharing the key tuple.
    Many(Vec<RecordHandle>),
}

/// Staged record set with composite indexes and a bulk flush.
///
/// The session exclusively owns its records until [`commit`] flushes
/// them to the database and [`clear`] releases them.
///
/// [`commit`]: crate::session::ReplaySession::commit
/// [`clear`]: crate::session::ReplaySession::clear
#[derive(Debug)]
pub struct ReplaySession {
    pub(crate) record_store: HashMap<ClassRef, HashSet<RecordHandle>>,
    pub(crate) record_index: HashMap<IndexKey, IndexEntry>,
    pub(crate) indices: HashMap<ClassRef, Vec<Vec<&'static str>>>,
    pub(crate) insert_with_csv_size: usize,
}

/// Options for [`ReplaySession::update_record`].
#[derive(Debug, Clone, Copy)]
pub struct UpdateOpts {
    /// When true (the default), the updated record's `sequence_number`
    /// column tracks the event that updated it.
    pub update_sequence_number: bool,
}

impl Default for UpdateOpts {
    fn default() -> Self {
        Self {
            update_sequence_number: true,
        }
    }
}

impl Default for ReplaySession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplaySession {
    /// Creates an empty session with no declared indexes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            record_store: HashMap::new(),
            record_index: HashMap::new(),
            indices: HashMap::new(),
            insert_with_csv_size: DEFAULT_INSERT_WITH_CSV_SIZE,
        }
    }

    /// Declares a composite index on a record class. Lookups whose where
    /// clause keys exactly match the column tuple hit the index instead
    /// of scanning.
    #[must_use]
    pub fn with_index(mut self, class: ClassRef, columns: Vec<&'static str>) -> Self {
        self.indices.entry(class).or_default().push(columns);
        self
    }

    /// Overrides the record-set size above which the flush uses COPY.
    #[must_use]
    pub fn with_insert_with_csv_size(mut self, size: usize) -> Self {
        self.insert_with_csv_size = size;
        self
    }

    /// Builds a record, stages it, and indexes it.
    pub fn create_record(
        &mut self,
        class: ClassRef,
        values: &[(&str, ColumnValue)],
    ) -> RecordHandle {
        self.create_record_with(class, values, |_| {})
    }

    /// Builds a record, runs the customization closure, then stages and
    /// indexes it. When the class declares an `updated_at` column and the
    /// values leave it unset, it defaults to `created_at`.
    pub fn create_record_with(
        &mut self,
        class: ClassRef,
        values: &[(&str, ColumnValue)],
        customize: impl FnOnce(&RecordHandle),
    ) -> RecordHandle {
        let record = RecordHandle::new(class, values);
        if class.has_column("updated_at") && record.get("updated_at").is_null() {
            let created_at = record.get("created_at");
            if !created_at.is_null() {
                record.set("updated_at", created_at);
            }
        }
        customize(&record);
        self.record_store
            .entry(class)
            .or_default()
            .insert(record.clone());
        self.index_record(&record);
        record
    }

    /// Locates exactly one record, applies the update closure, and stamps
    /// the bookkeeping columns: `sequence_number` from the event (unless
    /// opted out) and `updated_at` from the event's creation time, each
    /// when the class declares the column.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::RecordNotFound`] when nothing matches.
    pub fn update_record(
        &mut self,
        class: ClassRef,
        event: &EventMetadata,
        where_clause: WhereClause<'_>,
        opts: UpdateOpts,
        update: impl FnOnce(&RecordHandle),
    ) -> Result<RecordHandle, ReplayError> {
        let Some(record) = self.find_records(class, where_clause).into_iter().next() else {
            return Err(ReplayError::RecordNotFound {
                class: class.name,
                criteria: describe_where(where_clause),
            });
        };
        update(&record);
        if opts.update_sequence_number && class.has_column("sequence_number") {
            record.set("sequence_number", event.sequence_number);
        }
        if class.has_column("updated_at") {
            record.set("updated_at", event.created_at);
        }
        Ok(record)
    }

    /// Upserts by the where clause drawn from `values`: updates the
    /// matching record, or creates one (stamped with `created_at`) when
    /// none exists. The closure runs in both cases.
    pub fn create_or_update_record(
        &mut self,
        class: ClassRef,
        values: &[(&str, ColumnValue)],
        created_at: DateTime<Utc>,
        customize: impl FnOnce(&RecordHandle),
    ) -> RecordHandle {
        let where_clause: Vec<(&str, WhereValue)> = values
            .iter()
            .map(|(column, value)| (*column, WhereValue::Eq(value.clone())))
            .collect();
        let record = match self.last_record(class, &where_clause) {
            Some(existing) => existing,
            None => {
                let mut with_created_at = values.to_vec();
                with_created_at.push(("created_at", ColumnValue::Timestamp(created_at)));
                self.create_record(class, &with_created_at)
            }
        };
        customize(&record);
        record
    }

    /// Removes a record from the store and from every index entry.
    pub fn delete_record(&mut self, class: ClassRef, record: &RecordHandle) {
        if let Some(records) = self.record_store.get_mut(class) {
            records.remove(record);
        }
        self.deindex_record(record);
    }

    /// Deletes every record matching the where clause.
    pub fn delete_all_records(&mut self, class: ClassRef, where_clause: WhereClause<'_>) {
        for record in self.find_records(class, where_clause) {
            self.delete_record(class, &record);
        }
    }

    /// Mutates every matching record in place with the given updates.
    pub fn update_all_records(
        &mut self,
        class: ClassRef,
        where_clause: WhereClause<'_>,
        updates: &[(&str, ColumnValue)],
    ) {
        for record in self.find_records(class, where_clause) {
            for (column, value) in updates {
                record.set(*column, value.clone());
            }
        }
    }

    /// Finds records matching the where clause. Three paths, in order:
    /// the `aggregate_id` shortcut index, a declared composite index
    /// whose key tuple exactly matches the where-clause keys, and a
    /// linear scan. Always returns a fresh list.
    #[must_use]
    pub fn find_records(
        &self,
        class: ClassRef,
        where_clause: WhereClause<'_>,
    ) -> Vec<RecordHandle> {
        if let [(column @ "aggregate_id", WhereValue::Eq(value))] = where_clause {
            let key = (class, vec![format!("{column}={}", value.key_form())]);
            return match self.record_index.get(&key) {
                Some(IndexEntry::Single(record)) => vec![record.clone()],
                Some(IndexEntry::Many(records)) => records.clone(),
                None => Vec::new(),
            };
        }

        // Membership criteria cannot hit an index built on scalar keys.
        let all_equality = where_clause
            .iter()
            .all(|(_, value)| matches!(value, WhereValue::Eq(_)));
        if all_equality {
            if let Some(columns) = self.matching_index(class, where_clause) {
                let key = (class, Self::index_key(columns, where_clause));
                return match self.record_index.get(&key) {
                    Some(IndexEntry::Many(records)) => records.clone(),
                    Some(IndexEntry::Single(record)) => vec![record.clone()],
                    None => Vec::new(),
                };
            }
        }

        self.record_store.get(class).map_or_else(Vec::new, |records| {
            records
                .iter()
                .filter(|record| {
                    where_clause
                        .iter()
                        .all(|(column, criterion)| criterion.matches(&record.get(column)))
                })
                .cloned()
                .collect()
        })
    }

    /// Last of [`find_records`](Self::find_records).
    #[must_use]
    pub fn last_record(
        &self,
        class: ClassRef,
        where_clause: WhereClause<'_>,
    ) -> Option<RecordHandle> {
        self.find_records(class, where_clause).pop()
    }

    /// Locates exactly one record and yields it, without touching the
    /// bookkeeping columns.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::RecordNotFound`] when nothing matches.
    pub fn do_with_record(
        &self,
        class: ClassRef,
        where_clause: WhereClause<'_>,
        f: impl FnOnce(&RecordHandle),
    ) -> Result<(), ReplayError> {
        let Some(record) = self.find_records(class, where_clause).into_iter().next() else {
            return Err(ReplayError::RecordNotFound {
                class: class.name,
                criteria: describe_where(where_clause),
            });
        };
        f(&record);
        Ok(())
    }

    /// Iterates every matching record, yielding each.
    pub fn do_with_records(
        &self,
        class: ClassRef,
        where_clause: WhereClause<'_>,
        mut f: impl FnMut(&RecordHandle),
    ) {
        for record in self.find_records(class, where_clause) {
            f(&record);
        }
    }

    /// Number of staged records for a class.
    #[must_use]
    pub fn record_count(&self, class: ClassRef) -> usize {
        self.record_store.get(class).map_or(0, HashSet::len)
    }

    /// True when no records are staged for any class.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.record_store.values().all(HashSet::is_empty)
    }

    /// Drops the store and every index.
    pub fn clear(&mut self) {
        self.record_store.clear();
        self.record_index.clear();
    }

    fn matching_index(
        &self,
        class: ClassRef,
        where_clause: WhereClause<'_>,
    ) -> Option<&Vec<&'static str>> {
        self.indices.get(&class)?.iter().find(|columns| {
            columns.len() == where_clause.len()
                && columns
                    .iter()
                    .all(|column| where_clause.iter().any(|(key, _)| key == column))
        })
    }

    /// Builds an index key with values in the index's declared column
    /// order, regardless of where-clause key order.
    fn index_key(columns: &[&'static str], where_clause: WhereClause<'_>) -> Vec<String> {
        columns
            .iter()
            .map(|column| {
                let value = where_clause
                    .iter()
                    .find(|(key, _)| key == column)
                    .map_or(ColumnValue::Null, |(_, criterion)| match criterion {
                        WhereValue::Eq(value) => value.clone(),
                        WhereValue::In(_) => ColumnValue::Null,
                    });
                format!("{column}={}", value.key_form())
            })
            .collect()
    }

    fn record_index_key(columns: &[&'static str], record: &RecordHandle) -> Vec<String> {
        columns
            .iter()
            .map(|column| format!("{column}={}", record.get(column).key_form()))
            .collect()
    }

    fn index_record(&mut self, record: &RecordHandle) {
        let class = record.class();
        let aggregate_id = record.get("aggregate_id");
        if !aggregate_id.is_null() {
            let key = (class, vec![format!("aggregate_id={}", aggregate_id.key_form())]);
            self.record_index.insert(key, IndexEntry::Single(record.clone()));
        }
        for columns in self.indices.get(&class).cloned().unwrap_or_default() {
            let key = (class, Self::record_index_key(&columns, record));
            match self.record_index.entry(key).or_insert_with(|| IndexEntry::Many(Vec::new())) {
                IndexEntry::Many(records) => records.push(record.clone()),
                IndexEntry::Single(_) => {}
            }
        }
    }

    fn deindex_record(&mut self, record: &RecordHandle) {
        let class = record.class();
        let aggregate_id = record.get("aggregate_id");
        if !aggregate_id.is_null() {
            let key = (class, vec![format!("aggregate_id={}", aggregate_id.key_form())]);
            if matches!(self.record_index.get(&key), Some(IndexEntry::Single(indexed)) if indexed == record)
            {
                self.record_index.remove(&key);
            }
        }
        for columns in self.indices.get(&class).cloned().unwrap_or_default() {
            let key = (class, Self::record_index_key(&columns, record));
            if let Some(IndexEntry::Many(records)) = self.record_index.get_mut(&key) {
                records.retain(|indexed| indexed != record);
                if records.is_empty() {
                    self.record_index.remove(&key);
                }
            }
        }
    }
}

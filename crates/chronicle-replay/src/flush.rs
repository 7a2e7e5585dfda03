//! Flushing staged records to Postgres.
//!
//! Large record sets stream through the COPY protocol in CSV form;
//! small ones go through one prepared insert executed per record. Both
//! paths run inside a single transaction and skip the `id` column so the
//! database assigns it.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::ReplayError;
use crate::record::{ClassRef, Column, ColumnKind, ColumnValue, RecordHandle};
use crate::session::ReplaySession;

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>;

impl ReplaySession {
    /// Flushes every staged record to the database, then clears the
    /// session. For each record class the flush streams via COPY when
    /// the set exceeds `insert_with_csv_size`, and inserts per row
    /// otherwise. The session is cleared on every exit path, success or
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::ColumnType`] when a staged value does not
    /// fit its column, [`ReplayError::BulkCopy`] when the COPY stream
    /// fails, and [`ReplayError::Database`] on other persistence errors.
    pub async fn commit(&mut self, pool: &PgPool) -> Result<(), ReplayError> {
        let outcome = self.flush(pool).await;
        self.clear();
        outcome
    }

    async fn flush(&self, pool: &PgPool) -> Result<(), ReplayError> {
        let mut tx = pool.begin().await?;
        for (class, records) in &self.record_store {
            if records.is_empty() {
                continue;
            }
            let class: ClassRef = *class;
            let columns: Vec<&Column> = class
                .columns
                .iter()
                .filter(|column| column.name != "id")
                .collect();
            let records: Vec<&RecordHandle> = records.iter().collect();
            if records.len() > self.insert_with_csv_size {
                copy_records(&mut tx, class, &columns, &records).await?;
            } else {
                insert_records(&mut tx, class, &columns, &records).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn copy_records(
    tx: &mut Transaction<'_, Postgres>,
    class: ClassRef,
    columns: &[&Column],
    records: &[&RecordHandle],
) -> Result<(), ReplayError> {
    let column_list = columns
        .iter()
        .map(|column| column.name)
        .collect::<Vec<_>>()
        .join(", ");
    let statement = format!(
        "COPY {} ({column_list}) FROM STDIN WITH (FORMAT csv)",
        class.table
    );
    let mut sink = tx.copy_in_raw(&statement).await?;

    let mut failed: Option<ReplayError> = None;
    for record in records {
        match encode_record(columns, record) {
            Ok(row) => {
                if let Err(error) = sink.send(row).await {
                    failed = Some(ReplayError::BulkCopy(error.to_string()));
                    break;
                }
            }
            Err(error) => {
                failed = Some(error);
                break;
            }
        }
    }

    if let Some(error) = failed {
        // End the stream with an error message so the server drops the
        // partial copy, then surface the original failure.
        if let Err(abort_error) = sink.abort(error.to_string()).await {
            tracing::warn!(table = class.table, %abort_error, "copy abort failed");
        }
        return Err(error);
    }

    let rows = sink
        .finish()
        .await
        .map_err(|error| ReplayError::BulkCopy(error.to_string()))?;
    tracing::debug!(table = class.table, rows, "bulk copy complete");
    Ok(())
}

async fn insert_records(
    tx: &mut Transaction<'_, Postgres>,
    class: ClassRef,
    columns: &[&Column],
    records: &[&RecordHandle],
) -> Result<(), ReplayError> {
    let column_list = columns
        .iter()
        .map(|column| column.name)
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let statement = format!(
        "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
        class.table
    );

    for record in records {
        let mut query = sqlx::query(&statement);
        for column in columns {
            query = bind_value(query, column, record.get(column.name))?;
        }
        query.execute(&mut **tx).await?;
    }
    tracing::debug!(table = class.table, rows = records.len(), "rows inserted");
    Ok(())
}

fn encode_record(columns: &[&Column], record: &RecordHandle) -> Result<Vec<u8>, ReplayError> {
    let mut fields = Vec::with_capacity(columns.len());
    for column in columns {
        fields.push(render_field(column, &record.get(column.name))?);
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(&fields)
        .map_err(|error| ReplayError::BulkCopy(error.to_string()))?;
    writer
        .into_inner()
        .map_err(|error| ReplayError::BulkCopy(error.to_string()))
}

// An unquoted empty field is the CSV form of NULL.
fn render_field(column: &Column, value: &ColumnValue) -> Result<String, ReplayError> {
    match (column.kind, value) {
        (_, ColumnValue::Null) => Ok(String::new()),
        (ColumnKind::Text, ColumnValue::Text(s)) => Ok(s.clone()),
        (ColumnKind::Text, ColumnValue::Symbol(s)) => Ok(s.as_str().to_owned()),
        (ColumnKind::Integer, ColumnValue::Int(i)) => Ok(i.to_string()),
        (ColumnKind::Boolean, ColumnValue::Bool(b)) => Ok(b.to_string()),
        (ColumnKind::Date, ColumnValue::Date(d)) => Ok(d.format("%Y-%m-%d").to_string()),
        (ColumnKind::Timestamp, ColumnValue::Timestamp(t)) => {
            Ok(t.to_rfc3339_opts(SecondsFormat::Micros, true))
        }
        (kind, other) => Err(column_type_error(column, kind, other)),
    }
}

fn bind_value<'q>(
    query: PgQuery<'q>,
    column: &Column,
    value: ColumnValue,
) -> Result<PgQuery<'q>, ReplayError> {
    Ok(match (column.kind, value) {
        (ColumnKind::Text, ColumnValue::Null) => query.bind(None::<String>),
        (ColumnKind::Text, ColumnValue::Text(s)) => query.bind(s),
        (ColumnKind::Text, ColumnValue::Symbol(s)) => query.bind(s.as_str().to_owned()),
        (ColumnKind::Integer, ColumnValue::Null) => query.bind(None::<i64>),
        (ColumnKind::Integer, ColumnValue::Int(i)) => query.bind(i),
        (ColumnKind::Boolean, ColumnValue::Null) => query.bind(None::<bool>),
        (ColumnKind::Boolean, ColumnValue::Bool(b)) => query.bind(b),
        (ColumnKind::Date, ColumnValue::Null) => query.bind(None::<NaiveDate>),
        (ColumnKind::Date, ColumnValue::Date(d)) => query.bind(d),
        (ColumnKind::Timestamp, ColumnValue::Null) => query.bind(None::<DateTime<Utc>>),
        (ColumnKind::Timestamp, ColumnValue::Timestamp(t)) => query.bind(t),
        (kind, other) => return Err(column_type_error(column, kind, &other)),
    })
}

fn column_type_error(column: &Column, kind: ColumnKind, value: &ColumnValue) -> ReplayError {
    ReplayError::ColumnType {
        column: column.name,
        expected: kind.name(),
        found: format!("{value:?}"),
    }
}

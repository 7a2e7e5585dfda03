//! Error types for the replay session.

use thiserror::Error;

/// Errors raised while staging or flushing read-model records.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// An update targeted a record that is not in the working set.
    #[error("no {class} record matches {criteria}")]
    RecordNotFound {
        /// Record class name.
        class: &'static str,
        /// The where clause that found nothing.
        criteria: String,
    },

    /// A staged value does not fit its column's declared kind.
    #[error("column {column} expects {expected}, got {found}")]
    ColumnType {
        /// The column being flushed.
        column: &'static str,
        /// The column's declared kind.
        expected: &'static str,
        /// The offending value.
        found: String,
    },

    /// The COPY stream failed or finished with a non-OK status.
    #[error("bulk copy failed: {0}")]
    BulkCopy(String),

    /// An infrastructure/persistence error.
    #[error("replay database error: {0}")]
    Database(#[from] sqlx::Error),
}

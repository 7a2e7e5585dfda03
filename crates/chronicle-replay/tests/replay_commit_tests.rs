//! Integration tests for the replay session flush paths.

use chrono::{NaiveDate, TimeZone, Utc};
use sqlx::PgPool;

use chronicle_replay::error::ReplayError;
use chronicle_replay::record::{Column, ColumnKind, ColumnValue, RecordClass};
use chronicle_replay::session::ReplaySession;

static INVOICE_RECORDS: RecordClass = RecordClass {
    name: "InvoiceRecord",
    table: "invoice_records",
    columns: &[
        Column::new("id", ColumnKind::Integer),
        Column::new("aggregate_id", ColumnKind::Text),
        Column::new("recipient_id", ColumnKind::Text),
        Column::new("amount_cents", ColumnKind::Integer),
        Column::new("status", ColumnKind::Text),
        Column::new("due_on", ColumnKind::Date),
        Column::new("sequence_number", ColumnKind::Integer),
        Column::new("created_at", ColumnKind::Timestamp),
        Column::new("updated_at", ColumnKind::Timestamp),
    ],
};

fn stage_invoices(session: &mut ReplaySession, count: usize) {
    let created_at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
    for i in 0..count {
        session.create_record(
            &INVOICE_RECORDS,
            &[
                ("aggregate_id", ColumnValue::from(format!("inv-{i}"))),
                ("recipient_id", ColumnValue::from("recipient, \"quoted\"")),
                ("amount_cents", ColumnValue::from(i64::try_from(i).unwrap() * 100)),
                ("status", ColumnValue::from("open")),
                ("due_on", ColumnValue::from(NaiveDate::from_ymd_opt(2026, 2, 1))),
                ("sequence_number", ColumnValue::from(1i64)),
                ("created_at", ColumnValue::from(created_at)),
            ],
        );
    }
}

async fn row_count(pool: &PgPool) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM invoice_records")
        .fetch_one(pool)
        .await
        .unwrap();
    count
}

// --- flush paths ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_large_sets_flush_through_bulk_copy(pool: PgPool) {
    let mut session = ReplaySession::new().with_insert_with_csv_size(2);
    stage_invoices(&mut session, 10);

    session.commit(&pool).await.unwrap();

    assert_eq!(row_count(&pool).await, 10);
    assert!(session.is_empty());

    let (recipient_id, amount_cents, due_on): (String, i64, NaiveDate) = sqlx::query_as(
        "SELECT recipient_id, amount_cents, due_on FROM invoice_records WHERE aggregate_id = 'inv-3'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(recipient_id, "recipient, \"quoted\"");
    assert_eq!(amount_cents, 300);
    assert_eq!(due_on, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_small_sets_flush_through_per_row_inserts(pool: PgPool) {
    let mut session = ReplaySession::new().with_insert_with_csv_size(2);
    stage_invoices(&mut session, 1);

    session.commit(&pool).await.unwrap();

    assert_eq!(row_count(&pool).await, 1);
    assert!(session.is_empty());

    let (recipient_id, amount_cents): (String, i64) =
        sqlx::query_as("SELECT recipient_id, amount_cents FROM invoice_records")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(recipient_id, "recipient, \"quoted\"");
    assert_eq!(amount_cents, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_the_database_assigns_the_id_column(pool: PgPool) {
    let mut session = ReplaySession::new().with_insert_with_csv_size(2);
    stage_invoices(&mut session, 4);

    session.commit(&pool).await.unwrap();

    let ids: Vec<(i64,)> = sqlx::query_as("SELECT id FROM invoice_records ORDER BY id")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(ids.len(), 4);
    assert!(ids.iter().all(|(id,)| *id >= 1));
}

// --- null handling ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_null_columns_survive_both_paths(pool: PgPool) {
    for (threshold, staged) in [(0usize, 3usize), (10, 3)] {
        sqlx::query("TRUNCATE invoice_records")
            .execute(&pool)
            .await
            .unwrap();
        let mut session = ReplaySession::new().with_insert_with_csv_size(threshold);
        for i in 0..staged {
            session.create_record(
                &INVOICE_RECORDS,
                &[
                    ("aggregate_id", ColumnValue::from(format!("inv-{i}"))),
                    ("recipient_id", ColumnValue::from("r-1")),
                    ("amount_cents", ColumnValue::Null),
                    ("due_on", ColumnValue::Null),
                ],
            );
        }

        session.commit(&pool).await.unwrap();

        let rows: Vec<(Option<i64>, Option<NaiveDate>)> =
            sqlx::query_as("SELECT amount_cents, due_on FROM invoice_records")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(rows.len(), staged);
        assert!(rows.iter().all(|(amount, due)| amount.is_none() && due.is_none()));
    }
}

// --- failure handling ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_failed_bulk_copy_aborts_and_still_clears(pool: PgPool) {
    let mut session = ReplaySession::new().with_insert_with_csv_size(2);
    stage_invoices(&mut session, 9);
    // A status that cannot be rendered into a text column.
    session.create_record(
        &INVOICE_RECORDS,
        &[
            ("aggregate_id", ColumnValue::from("inv-bad")),
            ("status", ColumnValue::from(42i64)),
        ],
    );

    let result = session.commit(&pool).await;

    assert!(matches!(result, Err(ReplayError::ColumnType { column, .. }) if column == "status"));
    assert!(session.is_empty());
    // The aborted copy left nothing behind.
    assert_eq!(row_count(&pool).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_failed_insert_path_still_clears(pool: PgPool) {
    let mut session = ReplaySession::new().with_insert_with_csv_size(50);
    session.create_record(
        &INVOICE_RECORDS,
        &[
            ("aggregate_id", ColumnValue::from("inv-bad")),
            ("amount_cents", ColumnValue::from("not a number")),
        ],
    );

    let result = session.commit(&pool).await;

    assert!(matches!(result, Err(ReplayError::ColumnType { column, .. }) if column == "amount_cents"));
    assert!(session.is_empty());
    assert_eq!(row_count(&pool).await, 0);
}

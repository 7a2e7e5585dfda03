//! Event store database schema.

/// SQL to create the commands table.
pub const CREATE_COMMANDS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS commands (
    id           UUID PRIMARY KEY,
    command_type VARCHAR(255) NOT NULL,
    payload_json JSONB NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
";

/// SQL to create the events table.
///
/// The unique constraint on `(aggregate_id, sequence_number)` is the
/// gapless-stream guarantee: a stale aggregate or a racing writer hits
/// it instead of silently forking the stream.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS events (
    id              UUID PRIMARY KEY,
    aggregate_id    TEXT NOT NULL,
    sequence_number BIGINT NOT NULL,
    command_id      UUID NOT NULL REFERENCES commands (id),
    event_type      VARCHAR(255) NOT NULL,
    event_json      JSONB NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL,
    UNIQUE (aggregate_id, sequence_number)
);

CREATE INDEX IF NOT EXISTS idx_events_created_at
    ON events (created_at, sequence_number);
";

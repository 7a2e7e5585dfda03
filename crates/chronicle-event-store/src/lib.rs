//! Chronicle event store — Postgres-backed durable log.
//!
//! Persists commands together with the events they produced, loads
//! per-aggregate streams in sequence order, and fans committed or
//! replayed events out to the registered handlers.

pub mod pg_event_store;
pub mod schema;
pub mod stream;

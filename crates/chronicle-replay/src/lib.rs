//! Chronicle replay — in-memory staging for read-model rebuilds.
//!
//! During a replay, handlers stage read-model rows in a [`session::ReplaySession`]
//! instead of writing to the database row by row. The session keeps the
//! working set in identity-hashed sets with composite indexes for the hot
//! lookups, then flushes everything at once: the Postgres COPY protocol
//! for large record sets, parameterized inserts for small ones.

pub mod error;
mod flush;
pub mod record;
pub mod session;

//! Purpose: Lazy, streaming access to user records stored in SQLite.
//! Exports: `api` (streams, batches, pages, aggregates, seeding) and `notice`.
//! Role: Library backing the `userstream` CLI and integration tests.
//! Invariants: No sequence materializes a whole table in memory.
//! Invariants: Connection settings are passed explicitly, never held globally.
pub mod api;
mod core;
pub mod notice;

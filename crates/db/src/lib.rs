//! SQLite storage layer for the ledger gateway.
//!
//! This crate owns everything the gateway persists: the connection pool,
//! the schema and its migrations, the persisted record types, and the
//! query traits the rest of the system uses to read and write them.
//!
//! # Layout
//!
//! - [`pool`]: the [`Database`] handle wrapping an r2d2 SQLite pool,
//!   with `transaction` / `with_connection` closures.
//! - [`schema`] and [`migrations`]: table definitions and sequential
//!   schema upgrades tracked by a version row.
//! - [`model`]: persisted record types (substates, resources, history
//!   entries, mempool transactions) and the [`model::BatchChanges`]
//!   change set produced by the actions planner.
//! - [`queries`]: traits implemented on [`rusqlite::Connection`] that
//!   expose batched point lookups and the writes each subsystem needs.
//!
//! # Batched reads
//!
//! The write path loads all dependencies of a transaction batch up front,
//! one `IN (...)` query per dependency group, instead of issuing a point
//! read per operation. The query traits therefore take identifier slices
//! rather than single keys.

pub mod error;
pub mod migrations;
pub mod model;
pub mod pool;
pub mod queries;
pub mod schema;

pub use error::{DbError, Result};
pub use pool::Database;

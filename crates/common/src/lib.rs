//! Shared building blocks for the ledger gateway.
//!
//! This crate holds the small pieces that every other gateway crate leans
//! on:
//!
//! - [`ids`]: opaque byte identifiers ([`TransactionId`], [`SubstateId`])
//!   with canonical equality and hashing, usable as map and set keys.
//! - [`time`]: wall-clock helpers and the [`Clock`] trait used wherever
//!   "now" must be injectable for tests.
//! - [`cache`]: [`BoundedCache`], a fixed-capacity concurrent cache with
//!   insert-if-absent semantics.

pub mod cache;
pub mod ids;
pub mod time;

pub use cache::BoundedCache;
pub use ids::{SubstateId, TransactionId};
pub use time::{current_timestamp_ms, Clock, ManualClock, SystemClock};

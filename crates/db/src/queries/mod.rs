//! Query traits implemented on [`rusqlite::Connection`].
//!
//! Each subsystem gets a trait bundling the statements it needs:
//!
//! - [`ResourceQueries`]: resource normalization lookups.
//! - [`SubstateQueries`]: batched substate loads and lifecycle writes.
//! - [`HistoryQueries`]: current-entry loads and interval maintenance
//!   for the three history flavors.
//! - [`MempoolQueries`]: the reads and writes of the mempool
//!   reconciliation passes.
//! - [`write_batch`]: atomic persistence of a planner change set.
//!
//! Reads that serve the dependency-load phase take identifier slices and
//! issue a single `IN (...)` query, so a batch of thousands of operations
//! costs one round trip per dependency group.

mod batch;
mod history;
mod mempool;
mod resources;
mod substates;

pub use batch::write_batch;
pub use history::HistoryQueries;
pub use mempool::MempoolQueries;
pub use resources::ResourceQueries;
pub use substates::SubstateQueries;

/// Builds a `?,?,...,?` placeholder list for dynamic `IN` clauses.
pub(crate) fn repeat_vars(count: usize) -> String {
    debug_assert!(count > 0);
    let mut s = "?,".repeat(count);
    s.pop();
    s
}

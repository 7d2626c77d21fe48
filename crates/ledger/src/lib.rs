//! Substate and history batch processing for the ledger gateway.
//!
//! This crate is the heart of the write path: for each batch of committed
//! transactions, a higher-level transaction content processor walks the
//! transaction contents and declares the substate up/down operations and
//! history entries the batch requires on an [`ActionsPlanner`]. The
//! planner then runs a two-phase cycle:
//!
//! 1. **Load dependencies**: every declared resource reference, substate
//!    identifier (grouped by kind) and history key (grouped by flavor) is
//!    fetched from storage in one batched read per group, populating
//!    in-memory lookup tables. Resources never seen before are created in
//!    memory, stamped with the state version that first referenced them.
//! 2. **Execute**: the declared actions replay in declaration order
//!    against the loaded tables, enforcing the ledger-consistency rules
//!    (no double-up, no down of a missing non-virtual substate, no
//!    double-down, contents must match at down time) and maintaining the
//!    contiguous history intervals.
//!
//! Batching the reads up front avoids an N+1 query storm across the
//! thousands of operations a ledger batch can carry, while the per-action
//! logic still reads as if every dependency were already resident.
//!
//! The planner owns its working set exclusively for the lifetime of one
//! batch; the resulting [`gateway_db::model::BatchChanges`] is persisted
//! atomically by the caller via [`gateway_db::queries::write_batch`].

pub mod error;
pub mod history;
mod loader;
pub mod planner;
mod working_set;

pub use error::{InconsistencyRule, LedgerError, Result};
pub use history::{HistoryEntry, HistoryTable};
pub use planner::{
    ActionsPlanner, HistoryFactory, PlannerReport, SubstateFactory, SubstateVerifier,
};
pub use working_set::ResourceRef;

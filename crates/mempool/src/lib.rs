//! Mempool tracking for the ledger gateway.
//!
//! Every node the gateway talks to reports its own view of the pending
//! transaction set, and those views diverge: nodes lag, drop
//! transactions, or go quiet entirely. This crate reconciles them:
//!
//! - [`combiner`] unions the fresh per-node snapshots into one canonical
//!   transaction-id to last-seen-instant view, refusing to run when no
//!   node has reported recently.
//! - [`tracker`] holds the per-node snapshot registry and the fetched
//!   content cache, and runs the periodic reconciliation cycle: mark
//!   reappeared transactions, mark disappeared ones (honoring the
//!   post-submission grace period), and insert newly discovered ones.
//!
//! The reconciliation passes run concurrently, each committing its own
//! storage transaction, so one failing pass does not undo the others.

pub mod combiner;
pub mod config;
pub mod error;
pub mod tracker;
pub mod types;

pub use combiner::combine_node_mempools;
pub use config::MempoolTrackerConfig;
pub use error::{MempoolError, Result};
pub use tracker::MempoolTrackerService;
pub use types::{
    CombinedMempool, FetchedTransactionContents, NodeMempoolSnapshot, TransactionContentDecoder,
};

//! Mempool tracker configuration.

use std::time::Duration;

use serde::Deserialize;

/// Tunables of the mempool tracker and its reconciliation cycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MempoolTrackerConfig {
    /// Capacity of the recently fetched unknown-transaction content
    /// cache shared by the fetch workers.
    pub recent_fetched_unknown_transactions_cache_size: usize,

    /// Node snapshots older than this are left out of the combined
    /// mempool view.
    pub exclude_node_mempools_from_union_if_stale_for: Duration,

    /// Whether the discovery pass tracks transactions that did not enter
    /// the network through this gateway.
    pub track_transactions_not_submitted_by_this_gateway: bool,

    /// How long after a gateway submission a transaction's absence from
    /// node mempools is not yet treated as evidence of a drop.
    pub post_submission_grace_period_before_can_be_marked_missing: Duration,
}

impl Default for MempoolTrackerConfig {
    fn default() -> Self {
        Self {
            recent_fetched_unknown_transactions_cache_size: 10_000,
            exclude_node_mempools_from_union_if_stale_for: Duration::from_secs(10),
            track_transactions_not_submitted_by_this_gateway: true,
            post_submission_grace_period_before_can_be_marked_missing: Duration::from_secs(10),
        }
    }
}

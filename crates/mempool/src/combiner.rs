//! Combining per-node mempool snapshots.

use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use crate::error::{MempoolError, Result};
use crate::types::{CombinedMempool, NodeMempoolSnapshot};

/// Unions all node snapshots reported within `staleness` of `now_ms`
/// into one transaction-id to most-recent-seen-instant map.
///
/// A transaction reported by several nodes keeps the maximum instant.
/// Fails if no snapshot is fresh: reconciling against an empty or
/// unrepresentative view would wrongly mark every tracked transaction
/// missing.
pub fn combine_node_mempools(
    snapshots: &DashMap<String, NodeMempoolSnapshot>,
    staleness: Duration,
    now_ms: u64,
) -> Result<CombinedMempool> {
    let threshold_ms = staleness.as_millis() as u64;
    let cutoff_ms = now_ms.saturating_sub(threshold_ms);

    let mut combined = CombinedMempool::new();
    let mut fresh_nodes = 0usize;
    let mut stale_nodes = 0usize;

    for entry in snapshots.iter() {
        let snapshot = entry.value();
        if snapshot.reported_at_ms < cutoff_ms {
            stale_nodes += 1;
            continue;
        }
        fresh_nodes += 1;
        for id in &snapshot.transaction_ids {
            let seen = combined.entry(id.clone()).or_insert(0);
            *seen = (*seen).max(snapshot.reported_at_ms);
        }
    }

    if fresh_nodes == 0 {
        return Err(MempoolError::NoRecentNodeSnapshots { threshold_ms });
    }

    debug!(
        fresh_nodes,
        stale_nodes,
        transactions = combined.len(),
        "combined node mempool views"
    );
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_common::TransactionId;
    use std::collections::HashSet;

    fn tx_id(tag: u8) -> TransactionId {
        TransactionId::new(vec![tag; 32])
    }

    fn snapshot(tags: &[u8], reported_at_ms: u64) -> NodeMempoolSnapshot {
        NodeMempoolSnapshot::new(tags.iter().map(|&t| tx_id(t)).collect(), reported_at_ms)
    }

    #[test]
    fn union_keeps_the_most_recent_instant_per_transaction() {
        let snapshots = DashMap::new();
        snapshots.insert("node-a".to_string(), snapshot(&[1, 2], 10));
        snapshots.insert("node-b".to_string(), snapshot(&[2, 3], 12));

        let combined =
            combine_node_mempools(&snapshots, Duration::from_millis(100), 50).unwrap();
        assert_eq!(combined.len(), 3);
        assert_eq!(combined[&tx_id(1)], 10);
        assert_eq!(combined[&tx_id(2)], 12);
        assert_eq!(combined[&tx_id(3)], 12);
    }

    #[test]
    fn stale_snapshots_are_left_out() {
        let snapshots = DashMap::new();
        snapshots.insert("node-a".to_string(), snapshot(&[1], 1_000));
        snapshots.insert("node-b".to_string(), snapshot(&[2], 9_900));

        let combined =
            combine_node_mempools(&snapshots, Duration::from_millis(500), 10_000).unwrap();
        assert_eq!(combined.len(), 1);
        assert!(combined.contains_key(&tx_id(2)));
    }

    #[test]
    fn all_snapshots_stale_is_a_hard_error() {
        let snapshots = DashMap::new();
        snapshots.insert("node-a".to_string(), snapshot(&[1], 1_000));

        let result = combine_node_mempools(&snapshots, Duration::from_millis(500), 10_000);
        assert!(matches!(
            result,
            Err(MempoolError::NoRecentNodeSnapshots { threshold_ms: 500 })
        ));
    }

    #[test]
    fn no_registered_nodes_is_a_hard_error() {
        let snapshots: DashMap<String, NodeMempoolSnapshot> = DashMap::new();
        assert!(combine_node_mempools(&snapshots, Duration::from_secs(1), 0).is_err());
    }
}

//! Mempool view types.

use std::collections::{HashMap, HashSet};

use gateway_common::TransactionId;

/// One node's reported pending-transaction view, replaced wholesale on
/// every poll of that node.
#[derive(Debug, Clone)]
pub struct NodeMempoolSnapshot {
    /// The transaction identifiers the node reported pending.
    pub transaction_ids: HashSet<TransactionId>,
    /// When the node reported this view, Unix milliseconds.
    pub reported_at_ms: u64,
}

impl NodeMempoolSnapshot {
    pub fn new(transaction_ids: HashSet<TransactionId>, reported_at_ms: u64) -> Self {
        Self {
            transaction_ids,
            reported_at_ms,
        }
    }
}

/// The reconciled union of all fresh node views: transaction id to the
/// most recent instant any node reported it.
pub type CombinedMempool = HashMap<TransactionId, u64>;

/// A raw transaction payload fetched from a node by a content-fetch
/// worker, keyed for the first-writer-wins cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedTransactionContents {
    pub transaction_id: TransactionId,
    pub payload: Vec<u8>,
}

/// Maps a raw fetched payload to gateway-level transaction contents.
///
/// Only the discovery pass decodes; a decode failure fails the cycle so
/// the payload is retried rather than silently dropped.
pub trait TransactionContentDecoder: Send + Sync {
    /// Decodes `payload` to serialized gateway transaction contents.
    fn decode(
        &self,
        id: &TransactionId,
        payload: &[u8],
    ) -> std::result::Result<String, String>;
}

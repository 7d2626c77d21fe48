//! The mempool tracker service.
//!
//! Independent node-polling producers push each node's latest pending
//! view into a process-wide registry; a periodic reconciliation cycle
//! combines the fresh views and reconciles the result against persisted
//! state in three passes. Each pass opens and commits its own storage
//! transaction, so a failure in one does not roll back the others.
//!
//! The service also coordinates the content-fetch workers: a bounded
//! first-writer-wins cache of recently fetched payloads keeps several
//! workers from fetching the same unknown transaction from different
//! nodes, and feeds the discovery pass.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use gateway_common::{BoundedCache, Clock, TransactionId};
use gateway_db::model::{MempoolTransaction, MempoolTransactionStatus};
use gateway_db::queries::MempoolQueries;
use gateway_db::{Database, DbError};

use crate::combiner::combine_node_mempools;
use crate::config::MempoolTrackerConfig;
use crate::error::{MempoolError, Result};
use crate::types::{
    CombinedMempool, FetchedTransactionContents, NodeMempoolSnapshot, TransactionContentDecoder,
};

/// Tracks node mempools and reconciles them against persisted state.
pub struct MempoolTrackerService {
    db: Database,
    config: MempoolTrackerConfig,
    clock: Arc<dyn Clock>,
    decoder: Arc<dyn TransactionContentDecoder>,
    node_mempools: DashMap<String, NodeMempoolSnapshot>,
    recent_fetched_contents: BoundedCache<TransactionId, FetchedTransactionContents>,
}

impl MempoolTrackerService {
    pub fn new(
        db: Database,
        config: MempoolTrackerConfig,
        clock: Arc<dyn Clock>,
        decoder: Arc<dyn TransactionContentDecoder>,
    ) -> Self {
        let cache_size = config.recent_fetched_unknown_transactions_cache_size;
        Self {
            db,
            config,
            clock,
            decoder,
            node_mempools: DashMap::new(),
            recent_fetched_contents: BoundedCache::new(cache_size),
        }
    }

    /// Replaces `node`'s registered snapshot wholesale.
    ///
    /// Called by the per-node polling producers; readers never observe a
    /// partially updated snapshot.
    pub fn register_node_mempool(&self, node: &str, snapshot: NodeMempoolSnapshot) {
        self.node_mempools.insert(node.to_owned(), snapshot);
    }

    /// Runs one reconciliation cycle: combine the fresh node views, then
    /// run the reappearance, disappearance and discovery passes
    /// concurrently, each in its own storage transaction.
    pub async fn handle_mempool_changes(&self, cancel: &CancellationToken) -> Result<()> {
        let now_ms = self.clock.now_ms();
        let combined = combine_node_mempools(
            &self.node_mempools,
            self.config.exclude_node_mempools_from_union_if_stale_for,
            now_ms,
        )?;

        let (reappeared, marked_missing, discovered) = tokio::join!(
            self.mark_reappeared_transactions(&combined, cancel),
            self.mark_disappeared_transactions(&combined, now_ms, cancel),
            self.discover_new_transactions(&combined, cancel),
        );
        let (reappeared, marked_missing, discovered) =
            (reappeared?, marked_missing?, discovered?);

        info!(
            combined_size = combined.len(),
            reappeared, marked_missing, discovered, "reconciled mempool state"
        );
        Ok(())
    }

    /// Reappearance pass: `Missing` transactions present in the combined
    /// view become `SubmittedOrKnownInNodeMempool` again.
    async fn mark_reappeared_transactions(
        &self,
        combined: &CombinedMempool,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        check_cancelled(cancel)?;
        let ids: Vec<TransactionId> = combined.keys().cloned().collect();
        let db = self.db.clone();
        let reappeared = run_blocking(move || {
            db.transaction(|tx| {
                let missing = tx.load_missing_transactions_in(&ids)?;
                for transaction in &missing {
                    tx.update_mempool_transaction_status(
                        &transaction.transaction_id,
                        MempoolTransactionStatus::SubmittedOrKnownInNodeMempool,
                    )?;
                }
                Ok(missing.len())
            })
        })
        .await?;

        if reappeared > 0 {
            debug!(count = reappeared, "transactions reappeared in node mempools");
        }
        Ok(reappeared)
    }

    /// Disappearance pass: tracked transactions absent from the combined
    /// view become `Missing`, unless a gateway submission is still inside
    /// its grace period.
    async fn mark_disappeared_transactions(
        &self,
        combined: &CombinedMempool,
        now_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        check_cancelled(cancel)?;
        let grace_ms = self
            .config
            .post_submission_grace_period_before_can_be_marked_missing
            .as_millis() as u64;
        let grace_cutoff_ms = now_ms.saturating_sub(grace_ms);
        let combined_ids: HashSet<TransactionId> = combined.keys().cloned().collect();

        let db = self.db.clone();
        let marked = run_blocking(move || {
            db.transaction(|tx| {
                let candidates = tx.load_candidate_missing_transactions(grace_cutoff_ms)?;
                let mut marked = 0usize;
                for transaction in candidates {
                    if combined_ids.contains(&transaction.transaction_id) {
                        continue;
                    }
                    tx.update_mempool_transaction_status(
                        &transaction.transaction_id,
                        MempoolTransactionStatus::Missing,
                    )?;
                    marked += 1;
                }
                Ok(marked)
            })
        })
        .await?;

        if marked > 0 {
            debug!(count = marked, "transactions went missing from node mempools");
        }
        Ok(marked)
    }

    /// Discovery pass: combined-view transactions with fetched contents
    /// that are neither tracked nor already committed become new
    /// `MempoolTransaction` rows.
    async fn discover_new_transactions(
        &self,
        combined: &CombinedMempool,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        if !self.config.track_transactions_not_submitted_by_this_gateway {
            return Ok(0);
        }
        check_cancelled(cancel)?;

        // Only ids whose contents a fetch worker has already cached are
        // eligible; the rest stay on the fetch worklist.
        let mut candidates: Vec<(FetchedTransactionContents, u64)> = Vec::new();
        for (id, &seen_at_ms) in combined {
            if let Some(contents) = self.recent_fetched_contents.get(id) {
                candidates.push((contents, seen_at_ms));
            }
        }
        if candidates.is_empty() {
            return Ok(0);
        }

        // A lagging node can still report an already-tracked or
        // already-finalized transaction. Those are excluded before any
        // payload is decoded; a stale cached payload must not be able to
        // fail the pass.
        let candidate_ids: Vec<TransactionId> = candidates
            .iter()
            .map(|(contents, _)| contents.transaction_id.clone())
            .collect();
        let db = self.db.clone();
        let (tracked, committed) = run_blocking(move || {
            db.with_connection(|conn| {
                Ok((
                    conn.mempool_transaction_ids_in(&candidate_ids)?,
                    conn.committed_transaction_ids_in(&candidate_ids)?,
                ))
            })
        })
        .await?;

        let mut new_transactions: Vec<MempoolTransaction> = Vec::new();
        for (contents, seen_at_ms) in candidates {
            let id = contents.transaction_id.clone();
            if tracked.contains(&id) || committed.contains(&id) {
                continue;
            }
            let text = self
                .decoder
                .decode(&id, &contents.payload)
                .map_err(|reason| MempoolError::Decode {
                    id: id.clone(),
                    reason,
                })?;
            new_transactions.push(MempoolTransaction::new_first_seen_in_mempool(
                id,
                contents.payload,
                text,
                seen_at_ms,
            ));
        }
        if new_transactions.is_empty() {
            return Ok(0);
        }

        check_cancelled(cancel)?;
        let db = self.db.clone();
        let discovered = run_blocking(move || {
            db.transaction(|tx| {
                for transaction in &new_transactions {
                    tx.insert_mempool_transaction(transaction)?;
                }
                Ok(new_transactions.len())
            })
        })
        .await?;

        if discovered > 0 {
            debug!(count = discovered, "discovered new mempool transactions");
        }
        Ok(discovered)
    }

    /// Of `ids`, returns those still needing a content fetch: not in the
    /// fetched-content cache and not already tracked.
    pub async fn which_transactions_need_content_fetching(
        &self,
        ids: Vec<TransactionId>,
    ) -> Result<HashSet<TransactionId>> {
        let uncached: Vec<TransactionId> = ids
            .into_iter()
            .filter(|id| !self.recent_fetched_contents.contains(id))
            .collect();
        if uncached.is_empty() {
            return Ok(HashSet::new());
        }

        let db = self.db.clone();
        let probe = uncached.clone();
        let tracked =
            run_blocking(move || db.with_connection(|conn| conn.mempool_transaction_ids_in(&probe)))
                .await?;

        Ok(uncached
            .into_iter()
            .filter(|id| !tracked.contains(id))
            .collect())
    }

    /// Whether `id` still lacks cached contents. Fetch workers consult
    /// this to skip transactions another worker already handled.
    pub fn transaction_contents_still_need_fetching(&self, id: &TransactionId) -> bool {
        !self.recent_fetched_contents.contains(id)
    }

    /// Caches fetched contents unless another worker already did.
    ///
    /// Returns whether this call was the first to store them.
    pub fn submit_transaction_contents(&self, contents: FetchedTransactionContents) -> bool {
        self.recent_fetched_contents
            .insert_if_absent(contents.transaction_id.clone(), contents)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(MempoolError::Cancelled);
    }
    Ok(())
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, DbError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MempoolError::StorageTask(e.to_string()))?
        .map_err(MempoolError::from)
}

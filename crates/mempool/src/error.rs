//! Mempool tracking error types.

use thiserror::Error;

use gateway_common::TransactionId;
use gateway_db::DbError;

/// A type alias for `Result<T, MempoolError>`.
pub type Result<T> = std::result::Result<T, MempoolError>;

/// Errors from the mempool reconciliation cycle.
#[derive(Error, Debug)]
pub enum MempoolError {
    /// Every registered node snapshot is older than the staleness
    /// threshold (or no node has reported at all). Reconciling against
    /// such a view would wrongly mark everything missing, so the cycle
    /// fails instead and is retried at the next tick.
    #[error("no node mempool snapshot within the last {threshold_ms}ms; refusing to reconcile")]
    NoRecentNodeSnapshots { threshold_ms: u64 },

    /// A fetched transaction payload could not be decoded to gateway
    /// transaction contents.
    #[error("failed to decode transaction {id}: {reason}")]
    Decode { id: TransactionId, reason: String },

    /// Underlying storage failure; retried at the next cycle.
    #[error("database error: {0}")]
    Db(#[from] DbError),

    /// A storage task failed to complete.
    #[error("storage task failed: {0}")]
    StorageTask(String),

    /// The reconciliation cycle was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

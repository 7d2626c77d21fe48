//! Ledger processing error types.
//!
//! Ledger-inconsistency errors are fatal to the current batch and carry
//! the offending operation's location plus the specific rule violated,
//! enough context to debug a protocol-level bug. They are not recoverable
//! by retrying the same batch unmodified; transient storage errors are,
//! at the next scheduled cycle.

use thiserror::Error;

use gateway_common::SubstateId;
use gateway_db::model::{OpLocation, SubstateKind};
use gateway_db::DbError;

/// A type alias for `Result<T, LedgerError>`.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors from the batch processing write path.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The declared operations contradict ledger state. The batch must
    /// be aborted; nothing may be committed.
    #[error("ledger inconsistency at {location}: {rule}")]
    Inconsistency {
        /// Where on the ledger the offending operation sits.
        location: OpLocation,
        /// The consistency rule that was violated.
        rule: InconsistencyRule,
    },

    /// A deferred resource accessor was dereferenced before the
    /// dependency load phase completed. This is a programming error in
    /// the calling processor, not a ledger problem.
    #[error("resource {rri} accessed before the dependency load phase completed")]
    ResourceNotLoaded { rri: String },

    /// The batch change set was requested before the planner processed
    /// its actions.
    #[error("batch changes requested before process_all_changes completed")]
    NotProcessed,

    /// Underlying storage failure; retried by the scheduler at the next
    /// cycle.
    #[error("database error: {0}")]
    Db(#[from] DbError),

    /// A storage task failed to complete.
    #[error("storage task failed: {0}")]
    StorageTask(String),

    /// The batch was cancelled mid-flight. The in-memory working set may
    /// be partially mutated but nothing has been persisted.
    #[error("operation cancelled")]
    Cancelled,
}

/// The specific ledger-consistency rule an operation violated.
#[derive(Error, Debug)]
pub enum InconsistencyRule {
    /// A given identifier may be up at most once system-wide at any time.
    #[error("substate {id} of kind {kind} cannot be upped: a substate with that identifier already exists")]
    DoubleUp { kind: SubstateKind, id: SubstateId },

    /// Only virtual-eligible substates may be downed without a prior up.
    #[error("non-virtual substate {id} of kind {kind} cannot be downed: no such substate exists")]
    DownOfMissingSubstate { kind: SubstateKind, id: SubstateId },

    /// The down operation named a different kind than the stored substate.
    #[error("substate {id} cannot be downed as kind {expected}: a substate of kind {actual} holds that identifier")]
    KindMismatchOnDown {
        expected: SubstateKind,
        actual: SubstateKind,
        id: SubstateId,
    },

    /// A substate already down cannot be downed again.
    #[error("substate {id} of kind {kind} cannot be downed: it is already down")]
    DoubleDown { kind: SubstateKind, id: SubstateId },

    /// The stored contents diverged from what the down operation
    /// expected, indicating a logic bug upstream.
    #[error("substate {id} of kind {kind} was downed but its contents do not match at downing time")]
    ContentMismatchOnDown { kind: SubstateKind, id: SubstateId },
}

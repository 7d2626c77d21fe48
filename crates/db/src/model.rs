//! Persisted record types.
//!
//! These structs mirror the schema in [`crate::schema`] one to one and are
//! what the query traits read and write. The actions planner builds and
//! mutates them in memory during a batch; nothing here touches storage.
//!
//! Token amounts are `u128` in memory and decimal strings in SQLite
//! (SQLite integers are i64, too small for ledger amounts).

use serde::{Deserialize, Serialize};

use gateway_common::{SubstateId, TransactionId};

use crate::error::DbError;

/// The kind of a substate, determining its payload shape and which
/// dependency-load group it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubstateKind {
    /// A single account's balance in a single resource.
    AccountResourceBalance,
    /// An account's ownership units in a validator's stake pool.
    AccountStakeOwnership,
    /// An account's XRD staked to (or unstaking from) a validator.
    AccountXrdStake,
    /// A validator's total stake balance.
    ValidatorStakeBalance,
    /// A resource definition.
    ResourceData,
    /// A validator definition.
    ValidatorData,
}

impl SubstateKind {
    /// All kinds, in dependency-load order.
    pub const ALL: [SubstateKind; 6] = [
        SubstateKind::AccountResourceBalance,
        SubstateKind::AccountStakeOwnership,
        SubstateKind::AccountXrdStake,
        SubstateKind::ValidatorStakeBalance,
        SubstateKind::ResourceData,
        SubstateKind::ValidatorData,
    ];

    /// The stable code stored in the `substates.kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubstateKind::AccountResourceBalance => "account_resource_balance",
            SubstateKind::AccountStakeOwnership => "account_stake_ownership",
            SubstateKind::AccountXrdStake => "account_xrd_stake",
            SubstateKind::ValidatorStakeBalance => "validator_stake_balance",
            SubstateKind::ResourceData => "resource_data",
            SubstateKind::ValidatorData => "validator_data",
        }
    }

    /// Parses a stored kind code.
    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "account_resource_balance" => Ok(SubstateKind::AccountResourceBalance),
            "account_stake_ownership" => Ok(SubstateKind::AccountStakeOwnership),
            "account_xrd_stake" => Ok(SubstateKind::AccountXrdStake),
            "validator_stake_balance" => Ok(SubstateKind::ValidatorStakeBalance),
            "resource_data" => Ok(SubstateKind::ResourceData),
            "validator_data" => Ok(SubstateKind::ValidatorData),
            other => Err(DbError::Integrity(format!("unknown substate kind: {other}"))),
        }
    }
}

impl std::fmt::Display for SubstateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific substate contents, stored serialized in the `payload`
/// column.
///
/// Externally tagged on purpose: serde's internally tagged representation
/// routes fields through a buffering deserializer that cannot carry
/// `u128` amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubstatePayload {
    AccountResourceBalance {
        account: String,
        rri: String,
        amount: u128,
    },
    AccountStakeOwnership {
        account: String,
        validator: String,
        amount: u128,
    },
    AccountXrdStake {
        account: String,
        validator: String,
        amount: u128,
    },
    ValidatorStakeBalance {
        validator: String,
        amount: u128,
    },
    ResourceData {
        rri: String,
        owner: Option<String>,
    },
    ValidatorData {
        validator: String,
        registered: bool,
    },
}

impl SubstatePayload {
    /// The kind this payload belongs to.
    pub fn kind(&self) -> SubstateKind {
        match self {
            SubstatePayload::AccountResourceBalance { .. } => SubstateKind::AccountResourceBalance,
            SubstatePayload::AccountStakeOwnership { .. } => SubstateKind::AccountStakeOwnership,
            SubstatePayload::AccountXrdStake { .. } => SubstateKind::AccountXrdStake,
            SubstatePayload::ValidatorStakeBalance { .. } => SubstateKind::ValidatorStakeBalance,
            SubstatePayload::ResourceData { .. } => SubstateKind::ResourceData,
            SubstatePayload::ValidatorData { .. } => SubstateKind::ValidatorData,
        }
    }
}

/// The position of an operation on the ledger: which committed state
/// version, which operation group within that transaction, and which
/// operation within the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpLocation {
    /// State version of the committing transaction.
    pub state_version: u64,
    /// Index of the operation group within the transaction.
    pub operation_group: u32,
    /// Index of the operation within its group.
    pub operation_index: u32,
}

impl std::fmt::Display for OpLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "state version {}, operation group {}, operation {}",
            self.state_version, self.operation_group, self.operation_index
        )
    }
}

/// A versioned unit of ledger state.
///
/// Created "up" by exactly one operation and later "down" by at most one;
/// a substate currently up has `down == None`. Virtual substates are born
/// and downed by the same operation, so their up and down locations are
/// equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substate {
    pub id: SubstateId,
    pub kind: SubstateKind,
    pub payload: SubstatePayload,
    pub up: OpLocation,
    pub down: Option<OpLocation>,
}

impl Substate {
    /// Whether this substate has been downed.
    pub fn is_down(&self) -> bool {
        self.down.is_some()
    }
}

/// A resource definition, normalized to a surrogate id.
///
/// `id` stays `None` until the row is persisted; during a batch, actions
/// reference resources through the planner's deferred accessor rather
/// than the surrogate id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: Option<i64>,
    pub rri: String,
    /// State version at which this resource was first referenced.
    pub from_state_version: u64,
}

/// History entry for one (account, resource) balance.
///
/// For a given key, entries partition the state-version axis into
/// contiguous, non-overlapping intervals; the currently valid entry has
/// `to_state_version == None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountResourceBalanceHistory {
    pub account: String,
    pub rri: String,
    pub balance: u128,
    pub from_state_version: u64,
    pub to_state_version: Option<u64>,
}

/// History entry for one resource's total supply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSupplyHistory {
    pub rri: String,
    pub total_supply: u128,
    pub total_minted: u128,
    pub total_burnt: u128,
    pub from_state_version: u64,
    pub to_state_version: Option<u64>,
}

/// History entry for one validator's stake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorStakeHistory {
    pub validator: String,
    pub total_stake: u128,
    pub total_ownership: u128,
    pub from_state_version: u64,
    pub to_state_version: Option<u64>,
}

/// Presence lifecycle of a tracked mempool transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MempoolTransactionStatus {
    /// Submitted through this gateway or currently visible in at least
    /// one node mempool.
    SubmittedOrKnownInNodeMempool,
    /// Absent from the combined mempool view past the grace period.
    Missing,
}

impl MempoolTransactionStatus {
    /// The stable code stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            MempoolTransactionStatus::SubmittedOrKnownInNodeMempool => {
                "submitted_or_known_in_node_mempool"
            }
            MempoolTransactionStatus::Missing => "missing",
        }
    }

    /// Parses a stored status code.
    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "submitted_or_known_in_node_mempool" => {
                Ok(MempoolTransactionStatus::SubmittedOrKnownInNodeMempool)
            }
            "missing" => Ok(MempoolTransactionStatus::Missing),
            other => Err(DbError::Integrity(format!(
                "unknown mempool transaction status: {other}"
            ))),
        }
    }
}

/// A tracked pending transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MempoolTransaction {
    pub transaction_id: TransactionId,
    pub payload: Vec<u8>,
    pub status: MempoolTransactionStatus,
    pub submitted_by_this_gateway: bool,
    /// When this gateway last submitted the transaction to a node, if it
    /// did at all.
    pub last_submitted_to_node_ms: Option<u64>,
    /// When the transaction was first seen in any node mempool.
    pub first_seen_in_mempool_ms: u64,
    /// Gateway-level transaction contents, serialized JSON.
    pub contents: String,
}

impl MempoolTransaction {
    /// Creates a record for a transaction first discovered in a node
    /// mempool (not submitted through this gateway).
    pub fn new_first_seen_in_mempool(
        transaction_id: TransactionId,
        payload: Vec<u8>,
        contents: String,
        first_seen_in_mempool_ms: u64,
    ) -> Self {
        Self {
            transaction_id,
            payload,
            status: MempoolTransactionStatus::SubmittedOrKnownInNodeMempool,
            submitted_by_this_gateway: false,
            last_submitted_to_node_ms: None,
            first_seen_in_mempool_ms,
            contents,
        }
    }

    /// Marks the transaction as visible in a node mempool again.
    pub fn mark_as_seen_in_a_mempool(&mut self) {
        self.status = MempoolTransactionStatus::SubmittedOrKnownInNodeMempool;
    }

    /// Marks the transaction as missing from all node mempools.
    pub fn mark_as_missing(&mut self) {
        self.status = MempoolTransactionStatus::Missing;
    }
}

/// The accumulated change set of one transaction batch, persisted
/// atomically by [`crate::queries::write_batch`].
///
/// "Closed" entries are pre-existing current history rows whose interval
/// ends at the recorded state version; new entries created and superseded
/// within the same batch carry their closing version directly.
#[derive(Debug, Default)]
pub struct BatchChanges {
    pub new_resources: Vec<Resource>,
    pub new_substates: Vec<Substate>,
    /// Pre-existing substates downed by this batch.
    pub downed_substates: Vec<(SubstateId, OpLocation)>,
    pub new_account_resource_history: Vec<AccountResourceBalanceHistory>,
    /// (account, rri, to_state_version)
    pub closed_account_resource_history: Vec<(String, String, u64)>,
    pub new_resource_supply_history: Vec<ResourceSupplyHistory>,
    /// (rri, to_state_version)
    pub closed_resource_supply_history: Vec<(String, u64)>,
    pub new_validator_stake_history: Vec<ValidatorStakeHistory>,
    /// (validator, to_state_version)
    pub closed_validator_stake_history: Vec<(String, u64)>,
}

impl BatchChanges {
    /// Whether the batch recorded no changes at all.
    pub fn is_empty(&self) -> bool {
        self.new_resources.is_empty()
            && self.new_substates.is_empty()
            && self.downed_substates.is_empty()
            && self.new_account_resource_history.is_empty()
            && self.closed_account_resource_history.is_empty()
            && self.new_resource_supply_history.is_empty()
            && self.closed_resource_supply_history.is_empty()
            && self.new_validator_stake_history.is_empty()
            && self.closed_validator_stake_history.is_empty()
    }
}

/// Parses a decimal amount column.
pub(crate) fn parse_amount(s: &str) -> Result<u128, DbError> {
    s.parse::<u128>()
        .map_err(|_| DbError::Integrity(format!("invalid amount: {s}")))
}

//! Database schema definitions.
//!
//! The gateway keeps a time-versioned relational picture of ledger state.
//! Substate payloads are stored as serialized JSON blobs alongside the
//! indexed columns the write path actually queries on, mirroring how the
//! rest of the schema separates lookup keys from record bodies.
//!
//! # Tables
//!
//! - **State management**: `storestate` - key-value store holding the
//!   schema version.
//! - **Normalization**: `resources` - surrogate ids for resource
//!   identifiers (RRIs), stamped with the state version at first sight.
//! - **Ledger state**: `substates` - up/down lifecycle of each substate.
//! - **History**: `account_resource_balance_history`,
//!   `resource_supply_history`, `validator_stake_history` - contiguous
//!   `[from_state_version, to_state_version]` intervals per key; the
//!   currently valid entry has `to_state_version IS NULL`, served by
//!   partial indexes.
//! - **Mempool**: `mempool_transactions` - pending-transaction presence
//!   lifecycle; `ledger_transactions` - committed transactions, consulted
//!   to keep lagging node mempools from resurrecting finalized
//!   transactions.

/// Complete SQL schema for initializing a fresh database.
///
/// For existing databases, use the migration system instead of re-running
/// this.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS storestate (
    statename TEXT PRIMARY KEY,
    state TEXT NOT NULL
);

-- Resource normalization: surrogate ids for resource identifiers
CREATE TABLE IF NOT EXISTS resources (
    id INTEGER PRIMARY KEY,
    rri TEXT UNIQUE NOT NULL,
    from_state_version INTEGER NOT NULL
);

-- Substates: up/down lifecycle of each unit of ledger state
CREATE TABLE IF NOT EXISTS substates (
    substate_id BLOB PRIMARY KEY,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    up_state_version INTEGER NOT NULL,
    up_operation_group INTEGER NOT NULL,
    up_operation_index INTEGER NOT NULL,
    down_state_version INTEGER,
    down_operation_group INTEGER,
    down_operation_index INTEGER
);
CREATE INDEX IF NOT EXISTS substates_kind ON substates(kind);

-- Per-(account, resource) balance history
CREATE TABLE IF NOT EXISTS account_resource_balance_history (
    account TEXT NOT NULL,
    resource_id INTEGER NOT NULL REFERENCES resources(id),
    balance TEXT NOT NULL,
    from_state_version INTEGER NOT NULL,
    to_state_version INTEGER,
    PRIMARY KEY (account, resource_id, from_state_version)
);
CREATE UNIQUE INDEX IF NOT EXISTS account_resource_balance_history_current
    ON account_resource_balance_history(account, resource_id)
    WHERE to_state_version IS NULL;

-- Per-resource supply history
CREATE TABLE IF NOT EXISTS resource_supply_history (
    resource_id INTEGER NOT NULL REFERENCES resources(id),
    total_supply TEXT NOT NULL,
    total_minted TEXT NOT NULL,
    total_burnt TEXT NOT NULL,
    from_state_version INTEGER NOT NULL,
    to_state_version INTEGER,
    PRIMARY KEY (resource_id, from_state_version)
);
CREATE UNIQUE INDEX IF NOT EXISTS resource_supply_history_current
    ON resource_supply_history(resource_id)
    WHERE to_state_version IS NULL;

-- Per-validator stake history
CREATE TABLE IF NOT EXISTS validator_stake_history (
    validator TEXT NOT NULL,
    total_stake TEXT NOT NULL,
    total_ownership TEXT NOT NULL,
    from_state_version INTEGER NOT NULL,
    to_state_version INTEGER,
    PRIMARY KEY (validator, from_state_version)
);
CREATE UNIQUE INDEX IF NOT EXISTS validator_stake_history_current
    ON validator_stake_history(validator)
    WHERE to_state_version IS NULL;

-- Pending-transaction presence lifecycle
CREATE TABLE IF NOT EXISTS mempool_transactions (
    transaction_id BLOB PRIMARY KEY,
    payload BLOB NOT NULL,
    status TEXT NOT NULL,
    submitted_by_this_gateway INTEGER NOT NULL,
    last_submitted_to_node_ms INTEGER,
    first_seen_in_mempool_ms INTEGER NOT NULL,
    contents TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS mempool_transactions_status
    ON mempool_transactions(status);

-- Committed ledger transactions
CREATE TABLE IF NOT EXISTS ledger_transactions (
    transaction_id BLOB PRIMARY KEY,
    state_version INTEGER UNIQUE NOT NULL
);
"#;

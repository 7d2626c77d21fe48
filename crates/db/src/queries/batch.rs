//! Atomic persistence of a planner change set.

use rusqlite::Transaction;
use tracing::debug;

use crate::error::Result;
use crate::model::BatchChanges;
use crate::queries::{HistoryQueries, ResourceQueries, SubstateQueries};

/// Writes every change recorded by one transaction batch in a single
/// storage transaction.
///
/// Ordering matters:
///
/// 1. New resources first, so history inserts can resolve RRIs to
///    freshly assigned surrogate ids.
/// 2. Closing superseded history intervals before inserting their
///    replacements, to satisfy the partial unique index on current
///    entries.
pub fn write_batch(tx: &Transaction<'_>, changes: &BatchChanges) -> Result<()> {
    for resource in &changes.new_resources {
        tx.insert_resource(resource)?;
    }

    for (account, rri, to_state_version) in &changes.closed_account_resource_history {
        tx.close_account_resource_history(account, rri, *to_state_version)?;
    }
    for (rri, to_state_version) in &changes.closed_resource_supply_history {
        tx.close_resource_supply_history(rri, *to_state_version)?;
    }
    for (validator, to_state_version) in &changes.closed_validator_stake_history {
        tx.close_validator_stake_history(validator, *to_state_version)?;
    }

    for entry in &changes.new_account_resource_history {
        tx.insert_account_resource_history(entry)?;
    }
    for entry in &changes.new_resource_supply_history {
        tx.insert_resource_supply_history(entry)?;
    }
    for entry in &changes.new_validator_stake_history {
        tx.insert_validator_stake_history(entry)?;
    }

    for substate in &changes.new_substates {
        tx.insert_substate(substate)?;
    }
    for (id, down) in &changes.downed_substates {
        tx.apply_substate_down(id, down)?;
    }

    debug!(
        new_resources = changes.new_resources.len(),
        new_substates = changes.new_substates.len(),
        downed_substates = changes.downed_substates.len(),
        new_history_entries = changes.new_account_resource_history.len()
            + changes.new_resource_supply_history.len()
            + changes.new_validator_stake_history.len(),
        "wrote batch changes"
    );
    Ok(())
}

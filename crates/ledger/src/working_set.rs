//! In-memory working set for one batch.
//!
//! The dependency loader populates these tables; the planner's execute
//! phase mutates them; [`LoadedTables::into_changes`] flattens the result
//! into the change set the storage layer persists atomically.

use std::collections::HashMap;

use gateway_common::SubstateId;
use gateway_db::model::{
    AccountResourceBalanceHistory, BatchChanges, Resource, ResourceSupplyHistory, Substate,
    ValidatorStakeHistory,
};

use crate::error::{LedgerError, Result};
use crate::history::HistoryTable;

/// A deferred handle to a resource declared as a dependency.
///
/// Handed out at declaration time, before anything is loaded; dereferenced
/// through [`crate::ActionsPlanner::resource`] once the load phase has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub(crate) rri: String,
}

impl ResourceRef {
    /// The resource identifier this handle refers to.
    pub fn rri(&self) -> &str {
        &self.rri
    }
}

/// A substate resident in the working set, with enough provenance to tell
/// an insert from an update at flush time.
pub(crate) struct TrackedSubstate {
    pub substate: Substate,
    /// Created by this batch (as opposed to loaded from storage).
    pub newly_created: bool,
    /// Downed by this batch.
    pub downed_in_batch: bool,
}

/// The loaded (and batch-mutated) lookup tables.
#[derive(Default)]
pub(crate) struct LoadedTables {
    /// All substates visible to this batch, keyed by identifier. One map
    /// across kinds: an identifier is up at most once system-wide.
    pub substates: HashMap<SubstateId, TrackedSubstate>,
    /// Resources by rri. Resources not found in storage are created here,
    /// stamped with the version that first referenced them.
    pub resources: HashMap<String, Resource>,
    /// Which resources were created by this batch (absent from storage).
    pub new_resource_rris: Vec<String>,
    pub account_resource_history: HistoryTable<(String, String), AccountResourceBalanceHistory>,
    pub resource_supply_history: HistoryTable<String, ResourceSupplyHistory>,
    pub validator_stake_history: HistoryTable<String, ValidatorStakeHistory>,
}

impl LoadedTables {
    /// Looks up a loaded resource through its deferred handle.
    pub fn resource(&self, reference: &ResourceRef) -> Result<&Resource> {
        self.resources
            .get(&reference.rri)
            .ok_or_else(|| LedgerError::ResourceNotLoaded {
                rri: reference.rri.clone(),
            })
    }

    /// Flattens the working set into the batch's persistable change set.
    pub fn into_changes(self) -> BatchChanges {
        let mut changes = BatchChanges::default();

        for rri in self.new_resource_rris {
            if let Some(resource) = self.resources.get(&rri) {
                changes.new_resources.push(resource.clone());
            }
        }

        for tracked in self.substates.into_values() {
            if tracked.newly_created {
                // Covers virtual substates born and downed in one batch.
                changes.new_substates.push(tracked.substate);
            } else if tracked.downed_in_batch {
                if let Some(down) = tracked.substate.down {
                    changes.downed_substates.push((tracked.substate.id, down));
                }
            }
        }

        let (new_entries, closed) = self.account_resource_history.into_parts();
        changes.new_account_resource_history = new_entries;
        changes.closed_account_resource_history = closed
            .into_iter()
            .map(|((account, rri), version)| (account, rri, version))
            .collect();

        let (new_entries, closed) = self.resource_supply_history.into_parts();
        changes.new_resource_supply_history = new_entries;
        changes.closed_resource_supply_history = closed;

        let (new_entries, closed) = self.validator_stake_history.into_parts();
        changes.new_validator_stake_history = new_entries;
        changes.closed_validator_stake_history = closed;

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_db::model::{OpLocation, SubstateKind, SubstatePayload};

    fn loc(state_version: u64) -> OpLocation {
        OpLocation {
            state_version,
            operation_group: 0,
            operation_index: 0,
        }
    }

    fn substate(id: u8, up: OpLocation, down: Option<OpLocation>) -> Substate {
        Substate {
            id: SubstateId::new(vec![id; 36]),
            kind: SubstateKind::ValidatorData,
            payload: SubstatePayload::ValidatorData {
                validator: "vb_1".into(),
                registered: true,
            },
            up,
            down,
        }
    }

    #[test]
    fn into_changes_separates_inserts_from_down_updates() {
        let mut tables = LoadedTables::default();

        let fresh = substate(1, loc(10), None);
        tables.substates.insert(
            fresh.id.clone(),
            TrackedSubstate {
                substate: fresh,
                newly_created: true,
                downed_in_batch: false,
            },
        );

        let preexisting = substate(2, loc(4), Some(loc(11)));
        tables.substates.insert(
            preexisting.id.clone(),
            TrackedSubstate {
                substate: preexisting.clone(),
                newly_created: false,
                downed_in_batch: true,
            },
        );

        let untouched = substate(3, loc(2), None);
        tables.substates.insert(
            untouched.id.clone(),
            TrackedSubstate {
                substate: untouched,
                newly_created: false,
                downed_in_batch: false,
            },
        );

        let changes = tables.into_changes();
        assert_eq!(changes.new_substates.len(), 1);
        assert_eq!(changes.downed_substates, vec![(preexisting.id, loc(11))]);
    }

    #[test]
    fn born_and_downed_substate_is_a_single_insert() {
        let mut tables = LoadedTables::default();
        let virtual_down = substate(7, loc(9), Some(loc(9)));
        tables.substates.insert(
            virtual_down.id.clone(),
            TrackedSubstate {
                substate: virtual_down,
                newly_created: true,
                downed_in_batch: true,
            },
        );

        let changes = tables.into_changes();
        assert_eq!(changes.new_substates.len(), 1);
        assert!(changes.downed_substates.is_empty());
        assert_eq!(changes.new_substates[0].down, Some(loc(9)));
    }

    #[test]
    fn unresolved_resource_ref_errors() {
        let tables = LoadedTables::default();
        let reference = ResourceRef { rri: "xrd_rr".into() };
        assert!(matches!(
            tables.resource(&reference),
            Err(LedgerError::ResourceNotLoaded { .. })
        ));
    }
}

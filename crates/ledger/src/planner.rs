//! The two-phase actions planner.
//!
//! A transaction content processor walks a batch of committed
//! transactions and declares, per operation, what the batch does to the
//! ledger: substates upped and downed, history entries opened, resources
//! referenced. Declaration records an [`Action`] plus the dependency keys
//! it needs; nothing touches storage yet.
//!
//! [`ActionsPlanner::process_all_changes`] then runs the cycle:
//! dependencies load in one batched read per group, and the actions
//! replay in declaration order against the in-memory working set,
//! enforcing the ledger-consistency rules as they go. The caller finally
//! takes the accumulated change set via [`ActionsPlanner::into_changes`]
//! and persists it in a single transaction.
//!
//! Factories passed at declaration time run during the execute phase, so
//! they may capture [`ResourceRef`]s and other data resolved by the load.

use std::mem;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use gateway_common::SubstateId;
use gateway_db::model::{
    AccountResourceBalanceHistory, BatchChanges, OpLocation, Resource, ResourceSupplyHistory,
    Substate, SubstateKind, SubstatePayload, ValidatorStakeHistory,
};
use gateway_db::Database;

use crate::error::{InconsistencyRule, LedgerError, Result};
use crate::loader::PendingDependencies;
use crate::working_set::{LoadedTables, ResourceRef, TrackedSubstate};

/// Deferred payload constructor, run during the execute phase.
pub type SubstateFactory = Box<dyn FnOnce() -> SubstatePayload + Send>;

/// Deferred content check for a down operation; `false` aborts the batch.
pub type SubstateVerifier = Box<dyn FnOnce(&SubstatePayload) -> bool + Send>;

/// Deferred history-entry constructor; receives the previous current
/// entry, or `None` for a first-ever entry.
pub type HistoryFactory<R> = Box<dyn FnOnce(Option<&R>) -> R + Send>;

/// Timings and counts for one planner cycle.
#[derive(Debug, Clone, Copy)]
pub struct PlannerReport {
    /// Wall time of the batched dependency load phase.
    pub dependencies_load_ms: u64,
    /// Number of declared actions executed.
    pub action_count: usize,
    /// Wall time of the execute phase.
    pub execute_ms: u64,
}

enum Action {
    UpSubstate {
        location: OpLocation,
        kind: SubstateKind,
        id: SubstateId,
        create: SubstateFactory,
    },
    DownSubstate {
        location: OpLocation,
        kind: SubstateKind,
        id: SubstateId,
        verify: SubstateVerifier,
        /// Materializes the substate when a virtual identifier is downed
        /// without a stored row.
        create_virtual: Option<SubstateFactory>,
    },
    AddAccountResourceHistory {
        state_version: u64,
        account: String,
        rri: String,
        create: HistoryFactory<AccountResourceBalanceHistory>,
    },
    AddResourceSupplyHistory {
        state_version: u64,
        rri: String,
        create: HistoryFactory<ResourceSupplyHistory>,
    },
    AddValidatorStakeHistory {
        state_version: u64,
        validator: String,
        create: HistoryFactory<ValidatorStakeHistory>,
    },
}

/// Collects declared actions and dependencies for one batch, then runs
/// the load and execute phases. One planner serves exactly one batch.
pub struct ActionsPlanner {
    db: Database,
    actions: Vec<Action>,
    pending: PendingDependencies,
    tables: Option<LoadedTables>,
}

impl ActionsPlanner {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            actions: Vec::new(),
            pending: PendingDependencies::default(),
            tables: None,
        }
    }

    /// Declares that `location` brings a new substate up.
    ///
    /// Fails at execute time if any substate with that identifier already
    /// exists, up or down.
    pub fn up_substate(
        &mut self,
        location: OpLocation,
        kind: SubstateKind,
        id: SubstateId,
        create: SubstateFactory,
    ) {
        self.pending.ensure_substate(kind, id.clone());
        self.actions.push(Action::UpSubstate {
            location,
            kind,
            id,
            create,
        });
    }

    /// Declares that `location` downs the substate `id`.
    ///
    /// `verify` receives the stored contents; a mismatch aborts the
    /// batch. When a virtual identifier has no stored row,
    /// `create_virtual` materializes it, born and downed by the same
    /// operation; a missing non-virtual substate is an inconsistency.
    pub fn down_substate(
        &mut self,
        location: OpLocation,
        kind: SubstateKind,
        id: SubstateId,
        verify: SubstateVerifier,
        create_virtual: Option<SubstateFactory>,
    ) {
        self.pending.ensure_substate(kind, id.clone());
        self.actions.push(Action::DownSubstate {
            location,
            kind,
            id,
            verify,
            create_virtual,
        });
    }

    /// Declares a new account/resource balance history entry opening at
    /// `state_version`.
    pub fn add_account_resource_history_entry(
        &mut self,
        state_version: u64,
        account: &str,
        rri: &str,
        create: HistoryFactory<AccountResourceBalanceHistory>,
    ) {
        // History rows reference resources by surrogate id in storage.
        self.pending.ensure_resource(rri, state_version);
        self.pending.ensure_account_resource_history(account, rri);
        self.actions.push(Action::AddAccountResourceHistory {
            state_version,
            account: account.to_owned(),
            rri: rri.to_owned(),
            create,
        });
    }

    /// Declares a new resource supply history entry opening at
    /// `state_version`.
    pub fn add_resource_supply_history_entry(
        &mut self,
        state_version: u64,
        rri: &str,
        create: HistoryFactory<ResourceSupplyHistory>,
    ) {
        self.pending.ensure_resource(rri, state_version);
        self.pending.ensure_resource_supply_history(rri);
        self.actions.push(Action::AddResourceSupplyHistory {
            state_version,
            rri: rri.to_owned(),
            create,
        });
    }

    /// Declares a new validator stake history entry opening at
    /// `state_version`.
    pub fn add_validator_stake_history_entry(
        &mut self,
        state_version: u64,
        validator: &str,
        create: HistoryFactory<ValidatorStakeHistory>,
    ) {
        self.pending.ensure_validator_stake_history(validator);
        self.actions.push(Action::AddValidatorStakeHistory {
            state_version,
            validator: validator.to_owned(),
            create,
        });
    }

    /// Declares a resource dependency and returns a deferred handle to
    /// it. The resource is loaded (or created in memory, stamped with
    /// `seen_at_state_version`) during the load phase.
    pub fn resolve_resource(&mut self, rri: &str, seen_at_state_version: u64) -> ResourceRef {
        self.pending.ensure_resource(rri, seen_at_state_version);
        ResourceRef {
            rri: rri.to_owned(),
        }
    }

    /// Dereferences a resource handle.
    ///
    /// Errors with [`LedgerError::ResourceNotLoaded`] if called before
    /// [`Self::process_all_changes`] has run.
    pub fn resource(&self, reference: &ResourceRef) -> Result<&Resource> {
        let tables = self
            .tables
            .as_ref()
            .ok_or_else(|| LedgerError::ResourceNotLoaded {
                rri: reference.rri().to_owned(),
            })?;
        tables.resource(reference)
    }

    /// Runs the load and execute phases over everything declared so far.
    pub async fn process_all_changes(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<PlannerReport> {
        let load_started = Instant::now();
        let pending = mem::take(&mut self.pending);
        let mut tables = pending.load(&self.db, cancel).await?;
        let dependencies_load_ms = load_started.elapsed().as_millis() as u64;

        let execute_started = Instant::now();
        let actions = mem::take(&mut self.actions);
        let action_count = actions.len();
        for action in actions {
            if cancel.is_cancelled() {
                return Err(LedgerError::Cancelled);
            }
            execute_action(&mut tables, action)?;
        }
        let execute_ms = execute_started.elapsed().as_millis() as u64;

        self.tables = Some(tables);

        let report = PlannerReport {
            dependencies_load_ms,
            action_count,
            execute_ms,
        };
        debug!(
            load_ms = report.dependencies_load_ms,
            actions = report.action_count,
            execute_ms = report.execute_ms,
            "processed batch actions"
        );
        Ok(report)
    }

    /// Consumes the planner, yielding the accumulated change set.
    ///
    /// Errors with [`LedgerError::NotProcessed`] if
    /// [`Self::process_all_changes`] has not completed.
    pub fn into_changes(self) -> Result<BatchChanges> {
        let tables = self.tables.ok_or(LedgerError::NotProcessed)?;
        Ok(tables.into_changes())
    }
}

fn execute_action(tables: &mut LoadedTables, action: Action) -> Result<()> {
    match action {
        Action::UpSubstate {
            location,
            kind,
            id,
            create,
        } => {
            if tables.substates.contains_key(&id) {
                return Err(inconsistency(
                    location,
                    InconsistencyRule::DoubleUp { kind, id },
                ));
            }
            tables.substates.insert(
                id.clone(),
                TrackedSubstate {
                    substate: Substate {
                        id,
                        kind,
                        payload: create(),
                        up: location,
                        down: None,
                    },
                    newly_created: true,
                    downed_in_batch: false,
                },
            );
        }

        Action::DownSubstate {
            location,
            kind,
            id,
            verify,
            create_virtual,
        } => match tables.substates.get_mut(&id) {
            None => {
                let create = match create_virtual {
                    Some(create) if id.is_virtual() => create,
                    _ => {
                        return Err(inconsistency(
                            location,
                            InconsistencyRule::DownOfMissingSubstate { kind, id },
                        ));
                    }
                };
                // Virtual substates are born and downed in one stroke.
                tables.substates.insert(
                    id.clone(),
                    TrackedSubstate {
                        substate: Substate {
                            id,
                            kind,
                            payload: create(),
                            up: location,
                            down: Some(location),
                        },
                        newly_created: true,
                        downed_in_batch: true,
                    },
                );
            }
            Some(tracked) => {
                if tracked.substate.kind != kind {
                    return Err(inconsistency(
                        location,
                        InconsistencyRule::KindMismatchOnDown {
                            expected: kind,
                            actual: tracked.substate.kind,
                            id,
                        },
                    ));
                }
                if tracked.substate.is_down() {
                    return Err(inconsistency(
                        location,
                        InconsistencyRule::DoubleDown { kind, id },
                    ));
                }
                if !verify(&tracked.substate.payload) {
                    return Err(inconsistency(
                        location,
                        InconsistencyRule::ContentMismatchOnDown { kind, id },
                    ));
                }
                tracked.substate.down = Some(location);
                tracked.downed_in_batch = true;
            }
        },

        Action::AddAccountResourceHistory {
            state_version,
            account,
            rri,
            create,
        } => {
            tables
                .account_resource_history
                .add_entry((account, rri), create, state_version);
        }

        Action::AddResourceSupplyHistory {
            state_version,
            rri,
            create,
        } => {
            tables
                .resource_supply_history
                .add_entry(rri, create, state_version);
        }

        Action::AddValidatorStakeHistory {
            state_version,
            validator,
            create,
        } => {
            tables
                .validator_stake_history
                .add_entry(validator, create, state_version);
        }
    }
    Ok(())
}

fn inconsistency(location: OpLocation, rule: InconsistencyRule) -> LedgerError {
    LedgerError::Inconsistency { location, rule }
}

//! Batched dependency loading.
//!
//! Declaration collects the full key set a batch needs up front; the
//! loader then issues one read per dependency group instead of one per
//! operation. Each group runs on the blocking pool so the async write
//! path never parks a runtime worker on SQLite.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use gateway_common::SubstateId;
use gateway_db::model::{Resource, SubstateKind};
use gateway_db::queries::{HistoryQueries, ResourceQueries, SubstateQueries};
use gateway_db::{Database, DbError};

use crate::error::{LedgerError, Result};
use crate::working_set::{LoadedTables, TrackedSubstate};

/// The dependency key sets accumulated while actions are declared.
#[derive(Default)]
pub(crate) struct PendingDependencies {
    /// Resources to load or create, with the state version that first
    /// referenced each.
    resources: HashMap<String, u64>,
    /// Substate identifiers to load, grouped by kind.
    substates: HashMap<SubstateKind, HashSet<SubstateId>>,
    account_resource_history: HashSet<(String, String)>,
    resource_supply_history: HashSet<String>,
    validator_stake_history: HashSet<String>,
}

impl PendingDependencies {
    /// Requests a resource; the first-seen state version sticks.
    pub fn ensure_resource(&mut self, rri: &str, state_version: u64) {
        self.resources
            .entry(rri.to_owned())
            .or_insert(state_version);
    }

    pub fn ensure_substate(&mut self, kind: SubstateKind, id: SubstateId) {
        self.substates.entry(kind).or_default().insert(id);
    }

    pub fn ensure_account_resource_history(&mut self, account: &str, rri: &str) {
        self.account_resource_history
            .insert((account.to_owned(), rri.to_owned()));
    }

    pub fn ensure_resource_supply_history(&mut self, rri: &str) {
        self.resource_supply_history.insert(rri.to_owned());
    }

    pub fn ensure_validator_stake_history(&mut self, validator: &str) {
        self.validator_stake_history.insert(validator.to_owned());
    }

    /// Fetches every declared dependency group from storage, one batched
    /// read per group, and assembles the working set.
    ///
    /// Cancellation is observed between groups; nothing is written.
    pub async fn load(
        self,
        db: &Database,
        cancel: &CancellationToken,
    ) -> Result<LoadedTables> {
        let started = Instant::now();
        let mut tables = LoadedTables::default();

        // Resources: absent RRIs are created in memory, stamped with the
        // version that first referenced them, and persisted with the batch.
        check_cancelled(cancel)?;
        let rris: Vec<String> = self.resources.keys().cloned().collect();
        let resource_count = rris.len();
        let loaded = {
            let db = db.clone();
            run_blocking(move || db.with_connection(|conn| conn.load_resources_by_rri(&rris)))
                .await?
        };
        for resource in loaded {
            tables.resources.insert(resource.rri.clone(), resource);
        }
        for (rri, first_seen) in self.resources {
            if !tables.resources.contains_key(&rri) {
                tables.resources.insert(
                    rri.clone(),
                    Resource {
                        id: None,
                        rri: rri.clone(),
                        from_state_version: first_seen,
                    },
                );
                tables.new_resource_rris.push(rri);
            }
        }

        // Substates, one read per kind that has declared identifiers.
        let mut substate_count = 0;
        for kind in SubstateKind::ALL {
            let Some(ids) = self.substates.get(&kind) else {
                continue;
            };
            check_cancelled(cancel)?;
            substate_count += ids.len();
            let ids: Vec<SubstateId> = ids.iter().cloned().collect();
            let loaded = {
                let db = db.clone();
                run_blocking(move || db.with_connection(|conn| conn.load_substates(kind, &ids)))
                    .await?
            };
            for substate in loaded {
                tables.substates.insert(
                    substate.id.clone(),
                    TrackedSubstate {
                        substate,
                        newly_created: false,
                        downed_in_batch: false,
                    },
                );
            }
        }

        check_cancelled(cancel)?;
        let keys: Vec<(String, String)> = self.account_resource_history.into_iter().collect();
        let account_history_count = keys.len();
        let loaded = {
            let db = db.clone();
            run_blocking(move || {
                db.with_connection(|conn| conn.load_current_account_resource_history(&keys))
            })
            .await?
        };
        for entry in loaded {
            tables
                .account_resource_history
                .register_loaded((entry.account.clone(), entry.rri.clone()), entry);
        }

        check_cancelled(cancel)?;
        let rris: Vec<String> = self.resource_supply_history.into_iter().collect();
        let supply_history_count = rris.len();
        let loaded = {
            let db = db.clone();
            run_blocking(move || {
                db.with_connection(|conn| conn.load_current_resource_supply_history(&rris))
            })
            .await?
        };
        for entry in loaded {
            tables
                .resource_supply_history
                .register_loaded(entry.rri.clone(), entry);
        }

        check_cancelled(cancel)?;
        let validators: Vec<String> = self.validator_stake_history.into_iter().collect();
        let stake_history_count = validators.len();
        let loaded = {
            let db = db.clone();
            run_blocking(move || {
                db.with_connection(|conn| conn.load_current_validator_stake_history(&validators))
            })
            .await?
        };
        for entry in loaded {
            tables
                .validator_stake_history
                .register_loaded(entry.validator.clone(), entry);
        }

        debug!(
            resources = resource_count,
            substates = substate_count,
            account_history_keys = account_history_count,
            supply_history_keys = supply_history_count,
            stake_history_keys = stake_history_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded batch dependencies"
        );

        Ok(tables)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(LedgerError::Cancelled);
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
        .map_err(|e| LedgerError::StorageTask(e.to_string()))?
        .map_err(LedgerError::from)
}

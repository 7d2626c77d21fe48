//! History interval maintenance.
//!
//! Each history flavor keeps, per key, a sequence of entries partitioning
//! the state-version axis into contiguous, non-overlapping intervals:
//! opening a new entry at version `v` closes the previous one at `v - 1`,
//! and exactly one entry per key is ever open (`to_state_version: None`).
//!
//! [`HistoryTable`] enforces that bookkeeping generically for the three
//! flavors. It distinguishes entries loaded from storage (closing one
//! records a deferred `UPDATE`) from entries created earlier in the same
//! batch (closing one just mutates the pending row before it is ever
//! inserted), and always repoints the lookup at the freshest entry so a
//! later action in the same batch sees the new value, not the stale one.

use std::collections::HashMap;
use std::hash::Hash;

use gateway_db::model::{
    AccountResourceBalanceHistory, ResourceSupplyHistory, ValidatorStakeHistory,
};

/// A history row whose interval bounds the table manages.
///
/// Entry factories supplied by callers do not need to care about state
/// versions; the table stamps both bounds.
pub trait HistoryEntry {
    /// Sets the opening bound of the entry's validity interval.
    fn set_from_state_version(&mut self, version: u64);
    /// Sets (or clears) the closing bound of the entry's validity interval.
    fn set_to_state_version(&mut self, version: Option<u64>);
}

impl HistoryEntry for AccountResourceBalanceHistory {
    fn set_from_state_version(&mut self, version: u64) {
        self.from_state_version = version;
    }
    fn set_to_state_version(&mut self, version: Option<u64>) {
        self.to_state_version = version;
    }
}

impl HistoryEntry for ResourceSupplyHistory {
    fn set_from_state_version(&mut self, version: u64) {
        self.from_state_version = version;
    }
    fn set_to_state_version(&mut self, version: Option<u64>) {
        self.to_state_version = version;
    }
}

impl HistoryEntry for ValidatorStakeHistory {
    fn set_from_state_version(&mut self, version: u64) {
        self.from_state_version = version;
    }
    fn set_to_state_version(&mut self, version: Option<u64>) {
        self.to_state_version = version;
    }
}

/// Where the current entry for a key lives.
enum CurrentEntry<R> {
    /// Loaded from storage; closing it records a deferred update.
    FromStore(R),
    /// Created by this batch; index into the pending-insert list.
    New(usize),
}

/// Per-key current-history lookup plus the pending inserts and closes
/// accumulated by one batch.
pub struct HistoryTable<K, R> {
    current: HashMap<K, CurrentEntry<R>>,
    new_entries: Vec<R>,
    closed: Vec<(K, u64)>,
}

impl<K, R> Default for HistoryTable<K, R> {
    fn default() -> Self {
        Self {
            current: HashMap::new(),
            new_entries: Vec::new(),
            closed: Vec::new(),
        }
    }
}

impl<K, R> HistoryTable<K, R>
where
    K: Eq + Hash + Clone,
    R: HistoryEntry,
{
    /// Registers the currently valid entry for `key` as loaded from
    /// storage. Called by the dependency loader.
    pub fn register_loaded(&mut self, key: K, entry: R) {
        self.current.insert(key, CurrentEntry::FromStore(entry));
    }

    /// Opens a new entry for `key` at `at_state_version`, closing the
    /// previous one (if any) at `at_state_version - 1`.
    ///
    /// `create` receives the previous entry, or `None` for a first-ever
    /// entry, and need not set either interval bound.
    pub fn add_entry<F>(&mut self, key: K, create: F, at_state_version: u64)
    where
        F: FnOnce(Option<&R>) -> R,
    {
        let mut new_entry = match self.current.get_mut(&key) {
            None => create(None),
            Some(CurrentEntry::FromStore(previous)) => {
                let entry = create(Some(previous));
                self.closed.push((key.clone(), at_state_version - 1));
                entry
            }
            Some(CurrentEntry::New(index)) => {
                let previous = &mut self.new_entries[*index];
                let entry = create(Some(previous));
                previous.set_to_state_version(Some(at_state_version - 1));
                entry
            }
        };
        new_entry.set_from_state_version(at_state_version);
        new_entry.set_to_state_version(None);

        let index = self.new_entries.len();
        self.new_entries.push(new_entry);
        self.current.insert(key, CurrentEntry::New(index));
    }

    /// The currently valid entry for `key`, if any.
    pub fn current(&self, key: &K) -> Option<&R> {
        match self.current.get(key)? {
            CurrentEntry::FromStore(entry) => Some(entry),
            CurrentEntry::New(index) => self.new_entries.get(*index),
        }
    }

    /// Consumes the table, yielding the pending inserts and the
    /// `(key, to_state_version)` closes of store-loaded entries.
    pub fn into_parts(self) -> (Vec<R>, Vec<(K, u64)>) {
        (self.new_entries, self.closed)
    }
}

//! History interval queries.
//!
//! Each history table holds contiguous `[from_state_version,
//! to_state_version]` intervals per key; the currently valid entry has
//! `to_state_version IS NULL` and is served by a partial unique index.
//! The loads here fetch only current entries, batched per key group, for
//! the planner's dependency-load phase.
//!
//! History rows reference resources by surrogate id in storage but by RRI
//! in memory; the statements below join through (or subselect from) the
//! `resources` table so callers never handle surrogate ids.

use rusqlite::types::ToSql;
use rusqlite::{params, Connection, Row};

use crate::error::Result;
use crate::model::{
    parse_amount, AccountResourceBalanceHistory, ResourceSupplyHistory, ValidatorStakeHistory,
};
use crate::queries::repeat_vars;

/// Query trait for the three history tables.
pub trait HistoryQueries {
    /// Loads the current entry for each `(account, rri)` pair that has
    /// one, in a single query.
    fn load_current_account_resource_history(
        &self,
        keys: &[(String, String)],
    ) -> Result<Vec<AccountResourceBalanceHistory>>;

    /// Loads the current supply entry for each RRI that has one.
    fn load_current_resource_supply_history(
        &self,
        rris: &[String],
    ) -> Result<Vec<ResourceSupplyHistory>>;

    /// Loads the current stake entry for each validator that has one.
    fn load_current_validator_stake_history(
        &self,
        validators: &[String],
    ) -> Result<Vec<ValidatorStakeHistory>>;

    /// Inserts a new account-resource balance history entry.
    fn insert_account_resource_history(
        &self,
        entry: &AccountResourceBalanceHistory,
    ) -> Result<()>;

    /// Closes the current account-resource entry at `to_state_version`.
    fn close_account_resource_history(
        &self,
        account: &str,
        rri: &str,
        to_state_version: u64,
    ) -> Result<()>;

    /// Inserts a new resource supply history entry.
    fn insert_resource_supply_history(&self, entry: &ResourceSupplyHistory) -> Result<()>;

    /// Closes the current resource supply entry at `to_state_version`.
    fn close_resource_supply_history(&self, rri: &str, to_state_version: u64) -> Result<()>;

    /// Inserts a new validator stake history entry.
    fn insert_validator_stake_history(&self, entry: &ValidatorStakeHistory) -> Result<()>;

    /// Closes the current validator stake entry at `to_state_version`.
    fn close_validator_stake_history(&self, validator: &str, to_state_version: u64)
        -> Result<()>;
}

impl HistoryQueries for Connection {
    fn load_current_account_resource_history(
        &self,
        keys: &[(String, String)],
    ) -> Result<Vec<AccountResourceBalanceHistory>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        // One (account = ? AND rri = ?) disjunct per requested key.
        let predicate = vec!["(h.account = ? AND r.rri = ?)"; keys.len()].join(" OR ");
        let sql = format!(
            "SELECT h.account, r.rri, h.balance, h.from_state_version, h.to_state_version
             FROM account_resource_balance_history h
             JOIN resources r ON r.id = h.resource_id
             WHERE h.to_state_version IS NULL AND ({predicate})"
        );
        let mut stmt = self.prepare(&sql)?;

        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(keys.len() * 2);
        for (account, rri) in keys {
            params.push(account);
            params.push(rri);
        }

        let mut rows = stmt.query(params.as_slice())?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(account_resource_history_from_row(row)?);
        }
        Ok(entries)
    }

    fn load_current_resource_supply_history(
        &self,
        rris: &[String],
    ) -> Result<Vec<ResourceSupplyHistory>> {
        if rris.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT r.rri, h.total_supply, h.total_minted, h.total_burnt,
                    h.from_state_version, h.to_state_version
             FROM resource_supply_history h
             JOIN resources r ON r.id = h.resource_id
             WHERE h.to_state_version IS NULL AND r.rri IN ({})",
            repeat_vars(rris.len())
        );
        let mut stmt = self.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(rris.iter()))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(resource_supply_history_from_row(row)?);
        }
        Ok(entries)
    }

    fn load_current_validator_stake_history(
        &self,
        validators: &[String],
    ) -> Result<Vec<ValidatorStakeHistory>> {
        if validators.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT validator, total_stake, total_ownership,
                    from_state_version, to_state_version
             FROM validator_stake_history
             WHERE to_state_version IS NULL AND validator IN ({})",
            repeat_vars(validators.len())
        );
        let mut stmt = self.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(validators.iter()))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(validator_stake_history_from_row(row)?);
        }
        Ok(entries)
    }

    fn insert_account_resource_history(
        &self,
        entry: &AccountResourceBalanceHistory,
    ) -> Result<()> {
        self.execute(
            "INSERT INTO account_resource_balance_history
             (account, resource_id, balance, from_state_version, to_state_version)
             VALUES (?1, (SELECT id FROM resources WHERE rri = ?2), ?3, ?4, ?5)",
            params![
                entry.account,
                entry.rri,
                entry.balance.to_string(),
                entry.from_state_version as i64,
                entry.to_state_version.map(|v| v as i64),
            ],
        )?;
        Ok(())
    }

    fn close_account_resource_history(
        &self,
        account: &str,
        rri: &str,
        to_state_version: u64,
    ) -> Result<()> {
        self.execute(
            "UPDATE account_resource_balance_history
             SET to_state_version = ?3
             WHERE account = ?1
               AND resource_id = (SELECT id FROM resources WHERE rri = ?2)
               AND to_state_version IS NULL",
            params![account, rri, to_state_version as i64],
        )?;
        Ok(())
    }

    fn insert_resource_supply_history(&self, entry: &ResourceSupplyHistory) -> Result<()> {
        self.execute(
            "INSERT INTO resource_supply_history
             (resource_id, total_supply, total_minted, total_burnt,
              from_state_version, to_state_version)
             VALUES ((SELECT id FROM resources WHERE rri = ?1), ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.rri,
                entry.total_supply.to_string(),
                entry.total_minted.to_string(),
                entry.total_burnt.to_string(),
                entry.from_state_version as i64,
                entry.to_state_version.map(|v| v as i64),
            ],
        )?;
        Ok(())
    }

    fn close_resource_supply_history(&self, rri: &str, to_state_version: u64) -> Result<()> {
        self.execute(
            "UPDATE resource_supply_history
             SET to_state_version = ?2
             WHERE resource_id = (SELECT id FROM resources WHERE rri = ?1)
               AND to_state_version IS NULL",
            params![rri, to_state_version as i64],
        )?;
        Ok(())
    }

    fn insert_validator_stake_history(&self, entry: &ValidatorStakeHistory) -> Result<()> {
        self.execute(
            "INSERT INTO validator_stake_history
             (validator, total_stake, total_ownership, from_state_version, to_state_version)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.validator,
                entry.total_stake.to_string(),
                entry.total_ownership.to_string(),
                entry.from_state_version as i64,
                entry.to_state_version.map(|v| v as i64),
            ],
        )?;
        Ok(())
    }

    fn close_validator_stake_history(
        &self,
        validator: &str,
        to_state_version: u64,
    ) -> Result<()> {
        self.execute(
            "UPDATE validator_stake_history
             SET to_state_version = ?2
             WHERE validator = ?1 AND to_state_version IS NULL",
            params![validator, to_state_version as i64],
        )?;
        Ok(())
    }
}

fn account_resource_history_from_row(row: &Row<'_>) -> Result<AccountResourceBalanceHistory> {
    let balance: String = row.get(2)?;
    Ok(AccountResourceBalanceHistory {
        account: row.get(0)?,
        rri: row.get(1)?,
        balance: parse_amount(&balance)?,
        from_state_version: row.get::<_, i64>(3)? as u64,
        to_state_version: row.get::<_, Option<i64>>(4)?.map(|v| v as u64),
    })
}

fn resource_supply_history_from_row(row: &Row<'_>) -> Result<ResourceSupplyHistory> {
    let supply: String = row.get(1)?;
    let minted: String = row.get(2)?;
    let burnt: String = row.get(3)?;
    Ok(ResourceSupplyHistory {
        rri: row.get(0)?,
        total_supply: parse_amount(&supply)?,
        total_minted: parse_amount(&minted)?,
        total_burnt: parse_amount(&burnt)?,
        from_state_version: row.get::<_, i64>(4)? as u64,
        to_state_version: row.get::<_, Option<i64>>(5)?.map(|v| v as u64),
    })
}

fn validator_stake_history_from_row(row: &Row<'_>) -> Result<ValidatorStakeHistory> {
    let stake: String = row.get(1)?;
    let ownership: String = row.get(2)?;
    Ok(ValidatorStakeHistory {
        validator: row.get(0)?,
        total_stake: parse_amount(&stake)?,
        total_ownership: parse_amount(&ownership)?,
        from_state_version: row.get::<_, i64>(3)? as u64,
        to_state_version: row.get::<_, Option<i64>>(4)?.map(|v| v as u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations;
    use crate::model::Resource;
    use crate::queries::ResourceQueries;

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        migrations::initialize(&mut conn).unwrap();
        conn.insert_resource(&Resource {
            id: None,
            rri: "xrd_rr1".into(),
            from_state_version: 1,
        })
        .unwrap();
        conn
    }

    #[test]
    fn current_entry_lookup_ignores_closed_intervals() {
        let conn = test_conn();
        conn.insert_account_resource_history(&AccountResourceBalanceHistory {
            account: "acc_1".into(),
            rri: "xrd_rr1".into(),
            balance: 100,
            from_state_version: 1,
            to_state_version: Some(4),
        })
        .unwrap();
        conn.insert_account_resource_history(&AccountResourceBalanceHistory {
            account: "acc_1".into(),
            rri: "xrd_rr1".into(),
            balance: 250,
            from_state_version: 5,
            to_state_version: None,
        })
        .unwrap();

        let current = conn
            .load_current_account_resource_history(&[("acc_1".into(), "xrd_rr1".into())])
            .unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].balance, 250);
        assert_eq!(current[0].from_state_version, 5);
    }

    #[test]
    fn closing_makes_way_for_the_next_interval() {
        let conn = test_conn();
        conn.insert_validator_stake_history(&ValidatorStakeHistory {
            validator: "vb_1".into(),
            total_stake: 1_000,
            total_ownership: 1_000,
            from_state_version: 2,
            to_state_version: None,
        })
        .unwrap();

        conn.close_validator_stake_history("vb_1", 9).unwrap();
        conn.insert_validator_stake_history(&ValidatorStakeHistory {
            validator: "vb_1".into(),
            total_stake: 1_500,
            total_ownership: 1_200,
            from_state_version: 10,
            to_state_version: None,
        })
        .unwrap();

        let current = conn
            .load_current_validator_stake_history(&["vb_1".into()])
            .unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].total_stake, 1_500);
    }

    #[test]
    fn supply_history_round_trips_large_amounts() {
        let conn = test_conn();
        let supply = u128::MAX - 7;
        conn.insert_resource_supply_history(&ResourceSupplyHistory {
            rri: "xrd_rr1".into(),
            total_supply: supply,
            total_minted: supply,
            total_burnt: 0,
            from_state_version: 3,
            to_state_version: None,
        })
        .unwrap();

        let current = conn
            .load_current_resource_supply_history(&["xrd_rr1".into()])
            .unwrap();
        assert_eq!(current[0].total_supply, supply);
    }
}

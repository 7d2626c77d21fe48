//! Mempool reconciliation queries.

use std::collections::HashSet;

use rusqlite::types::ToSql;
use rusqlite::{params, Connection, Row};

use gateway_common::TransactionId;

use crate::error::Result;
use crate::model::{MempoolTransaction, MempoolTransactionStatus};
use crate::queries::repeat_vars;

/// Query trait for the `mempool_transactions` and `ledger_transactions`
/// tables, shaped around the three reconciliation passes.
pub trait MempoolQueries {
    /// Loads `Missing` transactions whose identifier appears in `ids`
    /// (the reappearance pass candidates).
    fn load_missing_transactions_in(
        &self,
        ids: &[TransactionId],
    ) -> Result<Vec<MempoolTransaction>>;

    /// Loads `SubmittedOrKnownInNodeMempool` transactions that are
    /// eligible to be marked missing: not submitted by this gateway, or
    /// submitted with no recorded submission time, or last submitted
    /// before `grace_cutoff_ms`.
    ///
    /// The caller still has to subtract the combined mempool view; that
    /// set is in memory, not in the database.
    fn load_candidate_missing_transactions(
        &self,
        grace_cutoff_ms: u64,
    ) -> Result<Vec<MempoolTransaction>>;

    /// Of `ids`, returns those already present as mempool transactions.
    fn mempool_transaction_ids_in(
        &self,
        ids: &[TransactionId],
    ) -> Result<HashSet<TransactionId>>;

    /// Of `ids`, returns those already committed to the ledger.
    fn committed_transaction_ids_in(
        &self,
        ids: &[TransactionId],
    ) -> Result<HashSet<TransactionId>>;

    /// Inserts a newly discovered mempool transaction.
    fn insert_mempool_transaction(&self, transaction: &MempoolTransaction) -> Result<()>;

    /// Updates the status of a tracked mempool transaction.
    fn update_mempool_transaction_status(
        &self,
        id: &TransactionId,
        status: MempoolTransactionStatus,
    ) -> Result<()>;

    /// Records a committed ledger transaction.
    fn insert_ledger_transaction(&self, id: &TransactionId, state_version: u64) -> Result<()>;
}

impl MempoolQueries for Connection {
    fn load_missing_transactions_in(
        &self,
        ids: &[TransactionId],
    ) -> Result<Vec<MempoolTransaction>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT transaction_id, payload, status, submitted_by_this_gateway,
                    last_submitted_to_node_ms, first_seen_in_mempool_ms, contents
             FROM mempool_transactions
             WHERE status = ?1 AND transaction_id IN ({})",
            repeat_vars(ids.len())
        );
        let mut stmt = self.prepare(&sql)?;

        let status = MempoolTransactionStatus::Missing.as_str();
        let id_slices: Vec<&[u8]> = ids.iter().map(|id| id.as_slice()).collect();
        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(id_slices.len() + 1);
        params.push(&status);
        for slice in &id_slices {
            params.push(slice);
        }

        let mut rows = stmt.query(params.as_slice())?;
        let mut transactions = Vec::new();
        while let Some(row) = rows.next()? {
            transactions.push(mempool_transaction_from_row(row)?);
        }
        Ok(transactions)
    }

    fn load_candidate_missing_transactions(
        &self,
        grace_cutoff_ms: u64,
    ) -> Result<Vec<MempoolTransaction>> {
        let mut stmt = self.prepare(
            "SELECT transaction_id, payload, status, submitted_by_this_gateway,
                    last_submitted_to_node_ms, first_seen_in_mempool_ms, contents
             FROM mempool_transactions
             WHERE status = ?1
               AND (submitted_by_this_gateway = 0
                    OR last_submitted_to_node_ms IS NULL
                    OR last_submitted_to_node_ms < ?2)",
        )?;
        let mut rows = stmt.query(params![
            MempoolTransactionStatus::SubmittedOrKnownInNodeMempool.as_str(),
            grace_cutoff_ms as i64,
        ])?;
        let mut transactions = Vec::new();
        while let Some(row) = rows.next()? {
            transactions.push(mempool_transaction_from_row(row)?);
        }
        Ok(transactions)
    }

    fn mempool_transaction_ids_in(
        &self,
        ids: &[TransactionId],
    ) -> Result<HashSet<TransactionId>> {
        ids_in(self, "mempool_transactions", ids)
    }

    fn committed_transaction_ids_in(
        &self,
        ids: &[TransactionId],
    ) -> Result<HashSet<TransactionId>> {
        ids_in(self, "ledger_transactions", ids)
    }

    fn insert_mempool_transaction(&self, transaction: &MempoolTransaction) -> Result<()> {
        self.execute(
            "INSERT INTO mempool_transactions
             (transaction_id, payload, status, submitted_by_this_gateway,
              last_submitted_to_node_ms, first_seen_in_mempool_ms, contents)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                transaction.transaction_id.as_slice(),
                transaction.payload,
                transaction.status.as_str(),
                transaction.submitted_by_this_gateway,
                transaction.last_submitted_to_node_ms.map(|v| v as i64),
                transaction.first_seen_in_mempool_ms as i64,
                transaction.contents,
            ],
        )?;
        Ok(())
    }

    fn update_mempool_transaction_status(
        &self,
        id: &TransactionId,
        status: MempoolTransactionStatus,
    ) -> Result<()> {
        self.execute(
            "UPDATE mempool_transactions SET status = ?2 WHERE transaction_id = ?1",
            params![id.as_slice(), status.as_str()],
        )?;
        Ok(())
    }

    fn insert_ledger_transaction(&self, id: &TransactionId, state_version: u64) -> Result<()> {
        self.execute(
            "INSERT INTO ledger_transactions (transaction_id, state_version) VALUES (?1, ?2)",
            params![id.as_slice(), state_version as i64],
        )?;
        Ok(())
    }
}

/// Batched membership probe against a table's `transaction_id` column.
fn ids_in(
    conn: &Connection,
    table: &str,
    ids: &[TransactionId],
) -> Result<HashSet<TransactionId>> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }

    let sql = format!(
        "SELECT transaction_id FROM {table} WHERE transaction_id IN ({})",
        repeat_vars(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;

    let id_slices: Vec<&[u8]> = ids.iter().map(|id| id.as_slice()).collect();
    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(id_slices.len());
    for slice in &id_slices {
        params.push(slice);
    }

    let mut rows = stmt.query(params.as_slice())?;
    let mut found = HashSet::new();
    while let Some(row) = rows.next()? {
        let bytes: Vec<u8> = row.get(0)?;
        found.insert(TransactionId::new(bytes));
    }
    Ok(found)
}

fn mempool_transaction_from_row(row: &Row<'_>) -> Result<MempoolTransaction> {
    let id: Vec<u8> = row.get(0)?;
    let status: String = row.get(2)?;
    Ok(MempoolTransaction {
        transaction_id: TransactionId::new(id),
        payload: row.get(1)?,
        status: MempoolTransactionStatus::parse(&status)?,
        submitted_by_this_gateway: row.get(3)?,
        last_submitted_to_node_ms: row.get::<_, Option<i64>>(4)?.map(|v| v as u64),
        first_seen_in_mempool_ms: row.get::<_, i64>(5)? as u64,
        contents: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations;

    fn test_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        migrations::initialize(&mut conn).unwrap();
        conn
    }

    fn tx_id(tag: u8) -> TransactionId {
        TransactionId::new(vec![tag; 32])
    }

    fn seen_transaction(tag: u8) -> MempoolTransaction {
        MempoolTransaction::new_first_seen_in_mempool(tx_id(tag), vec![tag], "{}".into(), 1_000)
    }

    #[test]
    fn missing_lookup_is_restricted_to_requested_ids() {
        let conn = test_conn();
        let mut a = seen_transaction(1);
        a.mark_as_missing();
        conn.insert_mempool_transaction(&a).unwrap();
        let mut b = seen_transaction(2);
        b.mark_as_missing();
        conn.insert_mempool_transaction(&b).unwrap();

        let loaded = conn.load_missing_transactions_in(&[tx_id(1)]).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].transaction_id, tx_id(1));
    }

    #[test]
    fn grace_period_filter_spares_recent_gateway_submissions() {
        let conn = test_conn();
        let mut recent = seen_transaction(1);
        recent.submitted_by_this_gateway = true;
        recent.last_submitted_to_node_ms = Some(9_500);
        conn.insert_mempool_transaction(&recent).unwrap();

        let mut old = seen_transaction(2);
        old.submitted_by_this_gateway = true;
        old.last_submitted_to_node_ms = Some(1_000);
        conn.insert_mempool_transaction(&old).unwrap();

        let mut untimed = seen_transaction(3);
        untimed.submitted_by_this_gateway = true;
        untimed.last_submitted_to_node_ms = None;
        conn.insert_mempool_transaction(&untimed).unwrap();

        let candidates = conn.load_candidate_missing_transactions(9_000).unwrap();
        let ids: HashSet<_> = candidates
            .into_iter()
            .map(|t| t.transaction_id)
            .collect();
        assert!(!ids.contains(&tx_id(1)));
        assert!(ids.contains(&tx_id(2)));
        assert!(ids.contains(&tx_id(3)));
    }

    #[test]
    fn membership_probes_hit_the_right_tables() {
        let conn = test_conn();
        conn.insert_mempool_transaction(&seen_transaction(1)).unwrap();
        conn.insert_ledger_transaction(&tx_id(2), 77).unwrap();

        let ids = vec![tx_id(1), tx_id(2), tx_id(3)];
        let in_mempool = conn.mempool_transaction_ids_in(&ids).unwrap();
        let committed = conn.committed_transaction_ids_in(&ids).unwrap();

        assert_eq!(in_mempool, HashSet::from([tx_id(1)]));
        assert_eq!(committed, HashSet::from([tx_id(2)]));
    }

    #[test]
    fn status_updates_round_trip() {
        let conn = test_conn();
        conn.insert_mempool_transaction(&seen_transaction(1)).unwrap();
        conn.update_mempool_transaction_status(&tx_id(1), MempoolTransactionStatus::Missing)
            .unwrap();

        let loaded = conn.load_missing_transactions_in(&[tx_id(1)]).unwrap();
        assert_eq!(loaded[0].status, MempoolTransactionStatus::Missing);
    }
}

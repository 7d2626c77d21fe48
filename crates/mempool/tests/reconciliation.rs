//! Reconciliation cycle behavior against real storage, driven by a
//! manual clock: reappearance, grace-period handling, discovery
//! idempotence, and the stability of statuses across repeated cycles.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use gateway_common::{Clock, ManualClock, TransactionId};
use gateway_db::model::{MempoolTransaction, MempoolTransactionStatus};
use gateway_db::queries::MempoolQueries;
use gateway_db::Database;
use gateway_mempool::{
    FetchedTransactionContents, MempoolError, MempoolTrackerConfig, MempoolTrackerService,
    NodeMempoolSnapshot, TransactionContentDecoder,
};

struct Utf8Decoder;

impl TransactionContentDecoder for Utf8Decoder {
    fn decode(&self, _id: &TransactionId, payload: &[u8]) -> Result<String, String> {
        Ok(String::from_utf8_lossy(payload).into_owned())
    }
}

struct StrictUtf8Decoder;

impl TransactionContentDecoder for StrictUtf8Decoder {
    fn decode(&self, _id: &TransactionId, payload: &[u8]) -> Result<String, String> {
        std::str::from_utf8(payload)
            .map(str::to_owned)
            .map_err(|e| e.to_string())
    }
}

const NOW_MS: u64 = 1_000_000;
const GRACE: Duration = Duration::from_secs(10);

fn tx_id(tag: u8) -> TransactionId {
    TransactionId::new(vec![tag; 32])
}

struct Harness {
    db: Database,
    clock: Arc<ManualClock>,
    tracker: MempoolTrackerService,
}

fn harness() -> Harness {
    harness_with_decoder(Arc::new(Utf8Decoder))
}

fn harness_with_decoder(decoder: Arc<dyn TransactionContentDecoder>) -> Harness {
    let db = Database::open_in_memory().unwrap();
    let clock = Arc::new(ManualClock::new(NOW_MS));
    let config = MempoolTrackerConfig {
        post_submission_grace_period_before_can_be_marked_missing: GRACE,
        ..MempoolTrackerConfig::default()
    };
    let tracker = MempoolTrackerService::new(db.clone(), config, clock.clone(), decoder);
    Harness { db, clock, tracker }
}

impl Harness {
    fn register_view(&self, tags: &[u8]) {
        self.tracker.register_node_mempool(
            "node-a",
            NodeMempoolSnapshot::new(
                tags.iter().map(|&t| tx_id(t)).collect(),
                self.clock.now_ms(),
            ),
        );
    }

    async fn run_cycle(&self) {
        self.tracker
            .handle_mempool_changes(&CancellationToken::new())
            .await
            .unwrap();
    }

    fn insert(&self, transaction: &MempoolTransaction) {
        self.db
            .with_connection(|conn| conn.insert_mempool_transaction(transaction))
            .unwrap();
    }

    fn status_of(&self, id: &TransactionId) -> MempoolTransactionStatus {
        let code: String = self
            .db
            .with_connection(|conn| {
                conn.query_row(
                    "SELECT status FROM mempool_transactions WHERE transaction_id = ?1",
                    rusqlite::params![id.as_slice()],
                    |row| row.get(0),
                )
                .map_err(Into::into)
            })
            .unwrap();
        MempoolTransactionStatus::parse(&code).unwrap()
    }
}

fn seen_transaction(tag: u8) -> MempoolTransaction {
    MempoolTransaction::new_first_seen_in_mempool(tx_id(tag), vec![tag], "{}".into(), NOW_MS - 500)
}

#[tokio::test]
async fn missing_transaction_reappearing_in_a_node_mempool_is_marked_seen() {
    let h = harness();
    let mut transaction = seen_transaction(1);
    transaction.mark_as_missing();
    h.insert(&transaction);

    h.register_view(&[1]);
    h.run_cycle().await;

    assert_eq!(
        h.status_of(&tx_id(1)),
        MempoolTransactionStatus::SubmittedOrKnownInNodeMempool
    );
}

#[tokio::test]
async fn gateway_submission_inside_grace_period_is_spared() {
    let h = harness();
    let mut transaction = seen_transaction(1);
    transaction.submitted_by_this_gateway = true;
    transaction.last_submitted_to_node_ms = Some(NOW_MS - 1_000);
    h.insert(&transaction);

    // Absent from the node view, but submitted one second ago.
    h.register_view(&[]);
    h.run_cycle().await;
    assert_eq!(
        h.status_of(&tx_id(1)),
        MempoolTransactionStatus::SubmittedOrKnownInNodeMempool
    );

    // Past the grace period the same absence counts as a drop.
    h.clock.advance(GRACE + Duration::from_secs(1));
    h.register_view(&[]);
    h.run_cycle().await;
    assert_eq!(h.status_of(&tx_id(1)), MempoolTransactionStatus::Missing);
}

#[tokio::test]
async fn externally_submitted_transaction_is_marked_missing_without_grace() {
    let h = harness();
    h.insert(&seen_transaction(1));

    h.register_view(&[]);
    h.run_cycle().await;

    assert_eq!(h.status_of(&tx_id(1)), MempoolTransactionStatus::Missing);
}

#[tokio::test]
async fn discovery_inserts_fetched_transactions_but_never_committed_ones() {
    let h = harness();

    // Both ids are in the node view with cached contents; one is already
    // committed to the ledger.
    h.db
        .with_connection(|conn| conn.insert_ledger_transaction(&tx_id(2), 77))
        .unwrap();
    for tag in [1u8, 2] {
        assert!(h.tracker.submit_transaction_contents(FetchedTransactionContents {
            transaction_id: tx_id(tag),
            payload: format!("{{\"tag\":{tag}}}").into_bytes(),
        }));
    }

    h.register_view(&[1, 2]);
    h.run_cycle().await;

    assert_eq!(
        h.status_of(&tx_id(1)),
        MempoolTransactionStatus::SubmittedOrKnownInNodeMempool
    );
    let tracked = h
        .db
        .with_connection(|conn| conn.mempool_transaction_ids_in(&[tx_id(1), tx_id(2)]))
        .unwrap();
    assert_eq!(tracked, HashSet::from([tx_id(1)]));

    // Re-running the cycle with the same view discovers nothing new.
    h.run_cycle().await;
    let count: i64 = h
        .db
        .with_connection(|conn| {
            conn.query_row("SELECT COUNT(*) FROM mempool_transactions", [], |row| {
                row.get(0)
            })
            .map_err(Into::into)
        })
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn undecodable_payload_of_a_committed_transaction_does_not_block_discovery() {
    let h = harness_with_decoder(Arc::new(StrictUtf8Decoder));
    h.db.with_connection(|conn| conn.insert_ledger_transaction(&tx_id(2), 77))
        .unwrap();

    // The committed transaction's cached payload is not valid UTF-8; it
    // must be excluded before decoding, not fail the whole pass.
    h.tracker
        .submit_transaction_contents(FetchedTransactionContents {
            transaction_id: tx_id(2),
            payload: vec![0xff, 0xfe],
        });
    h.tracker
        .submit_transaction_contents(FetchedTransactionContents {
            transaction_id: tx_id(1),
            payload: b"{}".to_vec(),
        });

    h.register_view(&[1, 2]);
    h.run_cycle().await;

    let tracked = h
        .db
        .with_connection(|conn| conn.mempool_transaction_ids_in(&[tx_id(1), tx_id(2)]))
        .unwrap();
    assert_eq!(tracked, HashSet::from([tx_id(1)]));
}

#[tokio::test]
async fn cancelled_cycle_leaves_storage_untouched() {
    let h = harness();
    let mut transaction = seen_transaction(1);
    transaction.mark_as_missing();
    h.insert(&transaction);
    h.register_view(&[1]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = h.tracker.handle_mempool_changes(&cancel).await;

    assert!(matches!(result, Err(MempoolError::Cancelled)));
    assert_eq!(h.status_of(&tx_id(1)), MempoolTransactionStatus::Missing);
}

#[tokio::test]
async fn discovery_stamps_first_seen_at_the_node_report_time() {
    let h = harness();
    h.tracker.submit_transaction_contents(FetchedTransactionContents {
        transaction_id: tx_id(1),
        payload: b"{}".to_vec(),
    });
    h.register_view(&[1]);
    h.run_cycle().await;

    let first_seen: i64 = h
        .db
        .with_connection(|conn| {
            conn.query_row(
                "SELECT first_seen_in_mempool_ms FROM mempool_transactions
                 WHERE transaction_id = ?1",
                rusqlite::params![tx_id(1).as_slice()],
                |row| row.get(0),
            )
            .map_err(Into::into)
        })
        .unwrap();
    assert_eq!(first_seen as u64, NOW_MS);
}

#[tokio::test]
async fn statuses_are_stable_across_repeated_cycles() {
    let h = harness();

    // One transaction stays visible, one stays gone.
    h.insert(&seen_transaction(1));
    let mut gone = seen_transaction(2);
    gone.mark_as_missing();
    h.insert(&gone);

    h.register_view(&[1]);
    for _ in 0..3 {
        h.run_cycle().await;
        assert_eq!(
            h.status_of(&tx_id(1)),
            MempoolTransactionStatus::SubmittedOrKnownInNodeMempool
        );
        assert_eq!(h.status_of(&tx_id(2)), MempoolTransactionStatus::Missing);
    }
}

#[tokio::test]
async fn transaction_present_in_view_is_never_marked_missing_in_the_same_cycle() {
    let h = harness();
    let mut transaction = seen_transaction(1);
    transaction.mark_as_missing();
    h.insert(&transaction);

    // Present in the view: the reappearance pass flips it back, and the
    // disappearance pass must not flip it again within the same cycle or
    // any later one while it stays visible.
    h.register_view(&[1]);
    h.run_cycle().await;
    h.run_cycle().await;

    assert_eq!(
        h.status_of(&tx_id(1)),
        MempoolTransactionStatus::SubmittedOrKnownInNodeMempool
    );
}

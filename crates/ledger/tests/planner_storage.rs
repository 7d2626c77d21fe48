//! End-to-end write path: declare actions on a planner, process, and
//! persist the change set, then read everything back through the query
//! traits. Exercises two consecutive batches so cross-batch state
//! (existing substates, current history intervals, known resources)
//! flows through storage rather than planner memory.

use tokio_util::sync::CancellationToken;

use gateway_common::SubstateId;
use gateway_db::model::{
    AccountResourceBalanceHistory, OpLocation, SubstateKind, SubstatePayload,
};
use gateway_db::queries::{write_batch, HistoryQueries, ResourceQueries, SubstateQueries};
use gateway_db::Database;
use gateway_ledger::{ActionsPlanner, InconsistencyRule, LedgerError};

fn loc(state_version: u64, group: u32, index: u32) -> OpLocation {
    OpLocation {
        state_version,
        operation_group: group,
        operation_index: index,
    }
}

fn physical_id(tag: u8) -> SubstateId {
    SubstateId::new(vec![tag; 36])
}

fn balance_payload(account: &str, amount: u128) -> SubstatePayload {
    SubstatePayload::AccountResourceBalance {
        account: account.into(),
        rri: "xrd_rr1".into(),
        amount,
    }
}

async fn run_batch(
    db: &Database,
    declare: impl FnOnce(&mut ActionsPlanner),
) -> Result<(), LedgerError> {
    let mut planner = ActionsPlanner::new(db.clone());
    declare(&mut planner);
    planner
        .process_all_changes(&CancellationToken::new())
        .await?;
    let changes = planner.into_changes()?;
    db.transaction(|tx| write_batch(tx, &changes))?;
    Ok(())
}

#[tokio::test]
async fn substate_upped_in_one_batch_can_be_downed_in_the_next() {
    let db = Database::open_in_memory().unwrap();

    run_batch(&db, |planner| {
        planner.up_substate(
            loc(5, 0, 0),
            SubstateKind::AccountResourceBalance,
            physical_id(1),
            Box::new(|| balance_payload("acc_1", 100)),
        );
    })
    .await
    .unwrap();

    run_batch(&db, |planner| {
        planner.down_substate(
            loc(8, 0, 0),
            SubstateKind::AccountResourceBalance,
            physical_id(1),
            Box::new(|p| *p == balance_payload("acc_1", 100)),
            None,
        );
    })
    .await
    .unwrap();

    let conn = db.connection().unwrap();
    let stored = conn
        .load_substates(SubstateKind::AccountResourceBalance, &[physical_id(1)])
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].up, loc(5, 0, 0));
    assert_eq!(stored[0].down, Some(loc(8, 0, 0)));
}

#[tokio::test]
async fn upping_an_identifier_already_stored_fails() {
    let db = Database::open_in_memory().unwrap();

    run_batch(&db, |planner| {
        planner.up_substate(
            loc(5, 0, 0),
            SubstateKind::AccountResourceBalance,
            physical_id(1),
            Box::new(|| balance_payload("acc_1", 100)),
        );
    })
    .await
    .unwrap();

    let result = run_batch(&db, |planner| {
        planner.up_substate(
            loc(9, 0, 0),
            SubstateKind::AccountResourceBalance,
            physical_id(1),
            Box::new(|| balance_payload("acc_1", 200)),
        );
    })
    .await;

    assert!(matches!(
        result,
        Err(LedgerError::Inconsistency {
            rule: InconsistencyRule::DoubleUp { .. },
            ..
        })
    ));
}

#[tokio::test]
async fn history_intervals_stay_contiguous_across_batches() {
    let db = Database::open_in_memory().unwrap();

    // First batch opens two entries for the same key; the first closes
    // in memory before it is ever stored.
    run_batch(&db, |planner| {
        for (version, balance) in [(5u64, 100u128), (6, 250)] {
            planner.add_account_resource_history_entry(
                version,
                "acc_1",
                "xrd_rr1",
                Box::new(move |_| AccountResourceBalanceHistory {
                    account: "acc_1".into(),
                    rri: "xrd_rr1".into(),
                    balance,
                    from_state_version: 0,
                    to_state_version: None,
                }),
            );
        }
    })
    .await
    .unwrap();

    // Second batch closes the stored current entry.
    run_batch(&db, |planner| {
        planner.add_account_resource_history_entry(
            11,
            "acc_1",
            "xrd_rr1",
            Box::new(|previous| {
                let previous = previous.expect("current entry should have loaded");
                AccountResourceBalanceHistory {
                    balance: previous.balance + 50,
                    ..previous.clone()
                }
            }),
        );
    })
    .await
    .unwrap();

    let conn = db.connection().unwrap();
    let current = conn
        .load_current_account_resource_history(&[("acc_1".into(), "xrd_rr1".into())])
        .unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].balance, 300);
    assert_eq!(current[0].from_state_version, 11);

    // All stored intervals for the key, in order, must tile the axis.
    let mut stmt = conn
        .prepare(
            "SELECT from_state_version, to_state_version
             FROM account_resource_balance_history
             ORDER BY from_state_version",
        )
        .unwrap();
    let intervals: Vec<(i64, Option<i64>)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(intervals, vec![(5, Some(5)), (6, Some(10)), (11, None)]);
}

#[tokio::test]
async fn resources_created_by_one_batch_are_reused_by_the_next() {
    let db = Database::open_in_memory().unwrap();

    run_batch(&db, |planner| {
        planner.resolve_resource("gok_rr1", 3);
    })
    .await
    .unwrap();

    let conn = db.connection().unwrap();
    let first = conn.load_resources_by_rri(&["gok_rr1".into()]).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].from_state_version, 3);
    let first_id = first[0].id;
    drop(conn);

    // Referencing the same RRI later must not mint a second row or move
    // the first-seen version.
    run_batch(&db, |planner| {
        planner.resolve_resource("gok_rr1", 9);
    })
    .await
    .unwrap();

    let conn = db.connection().unwrap();
    let second = conn.load_resources_by_rri(&["gok_rr1".into()]).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, first_id);
    assert_eq!(second[0].from_state_version, 3);
}

#[tokio::test]
async fn inconsistent_batch_persists_nothing() {
    let db = Database::open_in_memory().unwrap();

    let result = run_batch(&db, |planner| {
        planner.up_substate(
            loc(5, 0, 0),
            SubstateKind::AccountResourceBalance,
            physical_id(1),
            Box::new(|| balance_payload("acc_1", 100)),
        );
        planner.down_substate(
            loc(5, 1, 0),
            SubstateKind::AccountResourceBalance,
            physical_id(2),
            Box::new(|_| true),
            None,
        );
    })
    .await;
    assert!(result.is_err());

    let conn = db.connection().unwrap();
    let stored = conn
        .load_substates(SubstateKind::AccountResourceBalance, &[physical_id(1)])
        .unwrap();
    assert!(stored.is_empty());
}

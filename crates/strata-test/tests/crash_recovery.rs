//! Crash recovery: committed work survives, unfinished work disappears.

use std::collections::BTreeMap;

use strata_common::StoreConfig;
use strata_test::chaos::{abandon, crash};
use strata_test::utils::{key, value};
use strata_test::workload::{dump, Workload};
use strata_test::TestDir;

fn overwriting() -> TestDir {
    TestDir::with_config(StoreConfig::for_testing().with_allow_overwrite(true))
}

#[test]
fn test_committed_transactions_survive_crash() {
    let dir = TestDir::new();
    let mut model = BTreeMap::new();
    {
        let store = dir.open().unwrap();
        for batch in 0..10u64 {
            let mut txn = store.begin_transaction().unwrap();
            for i in batch * 10..batch * 10 + 10 {
                txn.insert(&key(i), &value(i)).unwrap();
                model.insert(key(i), value(i));
            }
            txn.commit().unwrap();
        }
        crash(store);
    }

    let store = dir.open().unwrap();
    assert!(store.recovery_report().redo_applied > 0);
    assert!(store.recovery_report().rolled_back.is_empty());
    assert_eq!(dump(&store).unwrap(), model);
    assert_eq!(store.verify().unwrap().key_count, 100);
}

#[test]
fn test_unfinished_transaction_is_rolled_back() {
    let dir = TestDir::new();
    let expected = {
        let store = dir.open().unwrap();
        for i in 0..40 {
            store.insert(&key(i), &value(i)).unwrap();
        }
        let expected = dump(&store).unwrap();

        let mut txn = store.begin_transaction().unwrap();
        for i in 0..20 {
            txn.delete(&key(i)).unwrap();
        }
        for i in 100..160 {
            txn.insert(&key(i), &value(i)).unwrap();
        }
        abandon(txn);
        crash(store);
        expected
    };

    let store = dir.open().unwrap();
    let report = store.recovery_report();
    assert_eq!(report.rolled_back.len(), 1);
    assert!(report.undo_applied > 0);
    assert_eq!(dump(&store).unwrap(), expected);
    store.verify().unwrap();

    // Pages the lost transaction allocated are reusable.
    for i in 100..160 {
        store.insert(&key(i), &value(i)).unwrap();
    }
    assert_eq!(store.verify().unwrap().key_count, 100);
}

#[test]
fn test_aborted_transaction_equals_never_began() {
    let dir = TestDir::new();
    let expected = {
        let store = dir.open().unwrap();
        store.insert(b"stay", b"1").unwrap();
        let expected = dump(&store).unwrap();

        let mut txn = store.begin_transaction().unwrap();
        for i in 0..30 {
            txn.insert(&key(i), &value(i)).unwrap();
        }
        txn.abort().unwrap();
        crash(store);
        expected
    };

    let store = dir.open().unwrap();
    assert!(store.recovery_report().rolled_back.is_empty());
    assert_eq!(store.recovery_report().aborted, 1);
    assert_eq!(dump(&store).unwrap(), expected);
}

#[test]
fn test_repeated_crashes_match_model() {
    let dir = overwriting();
    let mut workload = Workload::new(7, 150);
    let mut model = BTreeMap::new();

    for round in 0..12 {
        let store = dir.open().unwrap();
        assert_eq!(dump(&store).unwrap(), model, "round {round}");

        for _ in 0..3 {
            let ops = workload.ops(15);
            Workload::commit_batch(&store, &ops, &mut model).unwrap();
        }

        if round % 2 == 0 {
            let mut txn = store.begin_transaction().unwrap();
            for op in workload.ops(10) {
                op.apply(&mut txn).unwrap();
            }
            abandon(txn);
        }
        tracing::debug!(round, keys = model.len(), "crashing");
        crash(store);
    }

    let store = dir.open().unwrap();
    assert_eq!(dump(&store).unwrap(), model);
    assert_eq!(store.verify().unwrap().key_count, model.len());
}

#[test]
fn test_second_recovery_has_nothing_to_do() {
    let dir = TestDir::new();
    {
        let store = dir.open().unwrap();
        for i in 0..25 {
            store.insert(&key(i), &value(i)).unwrap();
        }
        crash(store);
    }

    let first = {
        let store = dir.open().unwrap();
        let contents = dump(&store).unwrap();
        crash(store);
        contents
    };

    let store = dir.open().unwrap();
    assert_eq!(store.recovery_report().redo_applied, 0);
    assert_eq!(store.recovery_report().undo_applied, 0);
    assert_eq!(dump(&store).unwrap(), first);
}

#[test]
fn test_close_makes_deferred_commits_durable() {
    let dir = TestDir::with_config(StoreConfig::for_testing().with_sync_on_commit(false));
    {
        let store = dir.open().unwrap();
        for i in 0..30 {
            store.insert(&key(i), &value(i)).unwrap();
        }
        store.close().unwrap();
    }

    let store = dir.open().unwrap();
    assert_eq!(store.verify().unwrap().key_count, 30);
    assert_eq!(&store.search(&key(29)).unwrap()[..], &value(29)[..]);
}

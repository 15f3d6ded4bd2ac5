//! Tree behaviour through the store, including across reopen.

use std::collections::BTreeMap;

use proptest::prelude::*;

use strata_common::{StoreConfig, StrataError};
use strata_engine::KeyRange;
use strata_test::workload::dump;
use strata_test::TestDir;

fn num(n: u32) -> [u8; 4] {
    n.to_be_bytes()
}

#[test]
fn test_order_four_example() {
    let dir = TestDir::new();
    let store = dir.open().unwrap();

    for (inserted, n) in [10, 20, 5, 6, 12, 30, 7, 17].into_iter().enumerate() {
        store.insert(&num(n), b"v").unwrap();
        let height = store.verify().unwrap().height;
        // Leaves hold four entries; the fifth splits the root.
        if inserted < 4 {
            assert_eq!(height, 1, "after {} inserts", inserted + 1);
        } else {
            assert_eq!(height, 2, "after {} inserts", inserted + 1);
        }
    }

    assert!(store.search(&num(6)).is_ok());
    assert!(matches!(store.search(&num(99)), Err(StrataError::KeyNotFound)));

    let keys: Vec<Vec<u8>> = store
        .scan(&KeyRange::all())
        .unwrap()
        .into_iter()
        .map(|(k, _)| k.to_vec())
        .collect();
    let mut expected: Vec<Vec<u8>> = [5, 6, 7, 10, 12, 17, 20, 30]
        .into_iter()
        .map(|n| num(n).to_vec())
        .collect();
    expected.sort();
    assert_eq!(keys, expected);
}

#[test]
fn test_delete_everything_then_reuse() {
    let dir = TestDir::new();
    let store = dir.open().unwrap();
    for n in 0..300 {
        store.insert(&num(n), b"v").unwrap();
    }
    let grown = store.stats().pages.page_count;

    let mut txn = store.begin_transaction().unwrap();
    for n in 0..300 {
        txn.delete(&num(n)).unwrap();
    }
    txn.commit().unwrap();
    assert_eq!(store.verify().unwrap().key_count, 0);
    assert!(store.scan(&KeyRange::all()).unwrap().is_empty());

    for n in 0..300 {
        store.insert(&num(n), b"v").unwrap();
    }
    assert_eq!(store.stats().pages.page_count, grown);
}

#[derive(Debug, Clone)]
enum Step {
    Insert(u16),
    Delete(u16),
    Reopen,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => (0u16..200).prop_map(Step::Insert),
        3 => (0u16..200).prop_map(Step::Delete),
        1 => Just(Step::Reopen),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_store_matches_model(steps in prop::collection::vec(step(), 1..150)) {
        let dir = TestDir::with_config(StoreConfig::for_testing().with_allow_overwrite(true));
        let mut store = dir.open().unwrap();
        let mut model = BTreeMap::new();

        for step in steps {
            match step {
                Step::Insert(k) => {
                    let k = k.to_be_bytes().to_vec();
                    store.insert(&k, &k).unwrap();
                    model.insert(k.clone(), k);
                }
                Step::Delete(k) => {
                    let k = k.to_be_bytes().to_vec();
                    let result = store.delete(&k);
                    if model.remove(&k).is_some() {
                        prop_assert_eq!(result.unwrap().to_vec(), k);
                    } else {
                        prop_assert!(matches!(result, Err(StrataError::KeyNotFound)));
                    }
                }
                Step::Reopen => {
                    store.close().unwrap();
                    store = dir.open().unwrap();
                }
            }
        }

        let stats = store.verify().unwrap();
        prop_assert_eq!(stats.key_count, model.len());
        prop_assert_eq!(dump(&store).unwrap(), model);
    }
}

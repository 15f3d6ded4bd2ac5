//! Damaged logs and checkpoint markers.

use strata_common::constants::min_wal_file_size;
use strata_common::{Lsn, PageId, StoreConfig, TxnId};
use strata_test::chaos::{append_garbage, chop, corrupt_checkpoint_marker, crash, flip_bit};
use strata_test::utils::{key, value};
use strata_test::TestDir;
use strata_wal::{Wal, WalConfig, WalPayload, WalRecord};

/// Finds the LSN of a transaction's commit record.
fn commit_lsn(dir: &TestDir, txn: TxnId) -> Lsn {
    let wal = Wal::open(WalConfig::new(dir.wal_dir())).unwrap();
    let lsn = wal
        .read_from(Lsn::ZERO)
        .unwrap()
        .map(|entry| entry.unwrap())
        .find(|(_, record)| record.txn_id == txn && record.payload == WalPayload::Commit)
        .map(|(lsn, _)| lsn)
        .unwrap();
    wal.close().unwrap();
    lsn
}

#[test]
fn test_bit_flip_cuts_log_at_damaged_record() {
    let dir = TestDir::new();
    let middle = {
        let store = dir.open().unwrap();
        let mut ids = Vec::new();
        for name in [&b"a"[..], b"b", b"c"] {
            let mut txn = store.begin_transaction().unwrap();
            ids.push(txn.id());
            txn.insert(name, b"1").unwrap();
            txn.commit().unwrap();
        }
        crash(store);
        ids[1]
    };

    let lsn = commit_lsn(&dir, middle);
    let segment = WalConfig::new(dir.wal_dir()).segment_path(lsn.segment());
    flip_bit(&segment, lsn.offset() as u64 + 2, 5).unwrap();

    let store = dir.open().unwrap();
    assert_eq!(store.recovery_report().torn_at, Some(lsn));
    assert_eq!(store.recovery_report().rolled_back, vec![middle]);
    assert_eq!(&store.search(b"a").unwrap()[..], b"1");
    assert!(store.search(b"b").unwrap_err().is_not_found());
    assert!(store.search(b"c").unwrap_err().is_not_found());
    store.verify().unwrap();
}

#[test]
fn test_torn_tail_loses_only_last_commit() {
    let dir = TestDir::new();
    {
        let store = dir.open().unwrap();
        store.insert(b"first", b"1").unwrap();
        store.insert(b"second", b"2").unwrap();
        crash(store);
    }
    let last = dir.segment_files().pop().unwrap();
    chop(&last, 3).unwrap();

    {
        let store = dir.open().unwrap();
        assert!(store.recovery_report().torn_at.is_some());
        assert_eq!(&store.search(b"first").unwrap()[..], b"1");
        assert!(store.search(b"second").is_err());

        // The repaired log takes new records.
        store.insert(b"third", b"3").unwrap();
        store.close().unwrap();
    }

    let store = dir.open().unwrap();
    assert!(store.recovery_report().torn_at.is_none());
    assert_eq!(&store.search(b"third").unwrap()[..], b"3");
}

#[test]
fn test_garbage_after_last_record_is_dropped() {
    let dir = TestDir::new();
    {
        let store = dir.open().unwrap();
        for i in 0..10 {
            store.insert(&key(i), &value(i)).unwrap();
        }
        crash(store);
    }
    let last = dir.segment_files().pop().unwrap();
    append_garbage(&last, &[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]).unwrap();

    let store = dir.open().unwrap();
    assert!(store.recovery_report().torn_at.is_some());
    assert_eq!(store.verify().unwrap().key_count, 10);
}

#[test]
fn test_one_page_record_per_segment() {
    let dir = TestDir::new();
    let limit = min_wal_file_size(512);
    let wal = Wal::open(WalConfig::new(dir.wal_dir()).with_segment_size_limit(limit)).unwrap();

    let record = WalRecord::update(TxnId::new(1), PageId::new(3), 0, vec![0xAA; 512], vec![0xBB; 512]);
    let first = wal.append(&record).unwrap();
    let second = wal.append(&record).unwrap();
    assert_eq!(second.segment(), first.segment() + 1);
    assert_eq!(wal.segments().unwrap(), vec![first.segment(), second.segment()]);
}

#[test]
fn test_checkpoint_reclaims_segments() {
    let config = StoreConfig::for_testing().with_wal_file_size_limit(4096);
    let dir = TestDir::with_config(config);
    let store = dir.open().unwrap();
    for i in 0..200 {
        store.insert(&key(i), &value(i)).unwrap();
    }
    let before = dir.segment_files();
    assert!(before.len() > 2, "only {} segments", before.len());

    let info = store.checkpoint().unwrap();
    let after = dir.segment_files();
    assert!(after.len() <= 2);
    assert!(!after.contains(&before[0]));
    assert!(info.floor.segment() > 0);
    assert!(store.stats().wal.segments_removed >= (before.len() - after.len()) as u64);

    crash(store);
    let store = dir.open().unwrap();
    assert_eq!(store.verify().unwrap().key_count, 200);
}

#[test]
fn test_corrupt_marker_triggers_full_scan() {
    let dir = TestDir::new();
    {
        let store = dir.open().unwrap();
        for i in 0..40 {
            store.insert(&key(i), &value(i)).unwrap();
        }
        store.close().unwrap();
    }
    corrupt_checkpoint_marker(&dir.page_file()).unwrap();

    let store = dir.open().unwrap();
    assert!(store.recovery_report().fell_back);
    assert_eq!(store.recovery_report().floor, Lsn::ZERO);
    assert_eq!(store.verify().unwrap().key_count, 40);
    store.close().unwrap();

    let store = dir.open().unwrap();
    assert!(!store.recovery_report().fell_back);
}

//! The write-ahead log.

use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use strata_common::types::{Lsn, TxnId};

use crate::config::{SyncPolicy, WalConfig};
use crate::error::{WalError, WalResult};
use crate::reader::WalIter;
use crate::record::WalRecord;
use crate::segment::{list_segments, remove_segment, scan_segment, sync_dir, WalSegment};
use crate::writer::{WalStats, WalWriter};

/// Append-only, segmented, checksummed log.
///
/// Appends are serialized by a single lock, so LSNs are handed out in
/// strictly increasing order and the file order matches LSN order.
#[derive(Debug)]
pub struct Wal {
    config: WalConfig,
    writer: Mutex<WalWriter>,
    durable_lsn: AtomicU64,
    truncated_at: Option<Lsn>,
    stats: WalStats,
}

impl Wal {
    /// Opens the log in `config.dir`, creating it if needed.
    ///
    /// The log is cut back to its longest intact prefix: a torn or
    /// mis-checksummed record ends the log, the segment holding it is
    /// truncated there and every later segment is deleted.
    pub fn open(config: WalConfig) -> WalResult<Self> {
        config.validate().map_err(WalError::config)?;
        fs::create_dir_all(&config.dir)?;

        let segments = list_segments(&config.dir)?;
        let mut truncated_at = None;
        let mut last_intact = None;
        let mut discard_from = segments.len();

        for (i, &segment) in segments.iter().enumerate() {
            if i > 0 && segments[i - 1].checked_add(1) != Some(segment) {
                warn!(
                    missing_after = segments[i - 1],
                    found = segment,
                    "Gap in WAL segment numbers, ignoring later segments"
                );
                truncated_at = Some(Lsn::new(segment, 0));
                discard_from = i;
                break;
            }

            let scan = scan_segment(&config.dir, segment)?;
            if !scan.header_valid {
                if let Some((lsn, reason)) = &scan.torn {
                    warn!(%lsn, reason = %reason, "Unreadable WAL segment header");
                }
                truncated_at = Some(Lsn::new(segment, 0));
                discard_from = i;
                break;
            }

            if let Some((lsn, reason)) = &scan.torn {
                warn!(%lsn, reason = %reason, "Truncating WAL at damaged record");
                truncated_at = Some(*lsn);
                discard_from = i + 1;
                last_intact = Some(scan);
                break;
            }
            last_intact = Some(scan);
        }

        for &segment in &segments[discard_from..] {
            warn!(segment, "Removing WAL segment past the end of the log");
            remove_segment(&config.dir, segment)?;
        }
        if discard_from < segments.len() {
            sync_dir(&config.dir);
        }

        let active = match last_intact {
            Some(scan) => WalSegment::open(&config.dir, scan.segment, scan.valid_end, scan.records)?,
            // A fresh log, or one whose first segment was unreadable.
            None => WalSegment::create(&config.dir, segments.first().copied().unwrap_or(0))?,
        };

        let next_lsn = active.next_lsn();
        info!(
            dir = %config.dir.display(),
            segment = active.segment(),
            next_lsn = %next_lsn,
            "Opened WAL"
        );

        Ok(Self {
            writer: Mutex::new(WalWriter::new(&config, active)),
            durable_lsn: AtomicU64::new(next_lsn.as_u64()),
            truncated_at,
            stats: WalStats::default(),
            config,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &WalConfig {
        &self.config
    }

    /// Where open found the log damaged and cut it, if it did.
    pub fn truncated_at(&self) -> Option<Lsn> {
        self.truncated_at
    }

    /// Appends a record and returns its LSN.
    ///
    /// Under [`SyncPolicy::EveryWrite`] the record is on stable storage when
    /// this returns.
    pub fn append(&self, record: &WalRecord) -> WalResult<Lsn> {
        let frame = record.encode();

        let mut writer = self.writer.lock();
        if writer.is_closed() {
            return Err(WalError::Closed);
        }

        let appended = writer.append(&frame)?;
        self.stats.records_written.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_written
            .fetch_add(frame.len() as u64, Ordering::Relaxed);
        if appended.rotated {
            self.stats.segment_rotations.fetch_add(1, Ordering::Relaxed);
            self.advance_durable(appended.lsn);
        }

        if self.config.sync_policy == SyncPolicy::EveryWrite {
            let durable = writer.sync()?;
            self.stats.syncs.fetch_add(1, Ordering::Relaxed);
            self.advance_durable(durable);
        }

        Ok(appended.lsn)
    }

    /// Forces every appended record to stable storage.
    pub fn sync(&self) -> WalResult<Lsn> {
        let mut writer = self.writer.lock();
        if writer.is_closed() {
            return Err(WalError::Closed);
        }
        let durable = writer.sync()?;
        self.stats.syncs.fetch_add(1, Ordering::Relaxed);
        self.advance_durable(durable);
        Ok(durable)
    }

    /// Every record with an LSN below this one is on stable storage.
    pub fn durable_lsn(&self) -> Lsn {
        Lsn::from_raw(self.durable_lsn.load(Ordering::Acquire))
    }

    /// LSN the next appended record would get if it fits the active segment.
    pub fn next_lsn(&self) -> Lsn {
        self.writer.lock().next_lsn()
    }

    /// Reads records in LSN order starting at `lsn`.
    pub fn read_from(&self, lsn: Lsn) -> WalResult<WalIter> {
        WalIter::new(self.config.dir.clone(), lsn)
    }

    /// Segment numbers currently on disk.
    pub fn segments(&self) -> WalResult<Vec<u32>> {
        list_segments(&self.config.dir)
    }

    /// Logs a checkpoint and deletes segments wholly below `floor`.
    ///
    /// Returns the LSN of the checkpoint record.
    pub fn checkpoint(&self, floor: Lsn, next_txn_id: TxnId) -> WalResult<Lsn> {
        let lsn = self.append(&WalRecord::checkpoint(floor, next_txn_id))?;
        self.sync()?;
        self.stats.checkpoints.fetch_add(1, Ordering::Relaxed);

        let removed = self.remove_segments_below(floor.segment())?;
        debug!(%floor, %lsn, removed, "Logged checkpoint");
        Ok(lsn)
    }

    fn remove_segments_below(&self, floor_segment: u32) -> WalResult<usize> {
        let writer = self.writer.lock();
        let keep_from = floor_segment.min(writer.active_segment());

        let mut removed = 0;
        for segment in list_segments(&self.config.dir)? {
            if segment >= keep_from {
                break;
            }
            remove_segment(&self.config.dir, segment)?;
            removed += 1;
        }
        if removed > 0 {
            sync_dir(&self.config.dir);
            self.stats
                .segments_removed
                .fetch_add(removed as u64, Ordering::Relaxed);
            info!(removed, keep_from, "Reclaimed WAL segments");
        }
        Ok(removed)
    }

    /// Syncs and stops accepting appends.
    pub fn close(&self) -> WalResult<()> {
        let mut writer = self.writer.lock();
        if writer.is_closed() {
            return Ok(());
        }
        let durable = writer.sync()?;
        self.advance_durable(durable);
        writer.close();
        debug!(durable_lsn = %durable, "Closed WAL");
        Ok(())
    }

    /// Returns the WAL counters.
    pub fn stats(&self) -> &WalStats {
        &self.stats
    }

    fn advance_durable(&self, lsn: Lsn) {
        self.durable_lsn.fetch_max(lsn.as_u64(), Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordType, WalPayload};
    use std::fs::OpenOptions;
    use std::sync::Arc;
    use std::thread;
    use strata_common::constants::{min_wal_file_size, WAL_SEGMENT_HEADER_SIZE};
    use strata_common::types::PageId;
    use tempfile::TempDir;

    fn page_update(txn: u64, page_size: usize) -> WalRecord {
        WalRecord::update(
            TxnId::new(txn),
            PageId::new(1),
            0,
            vec![0u8; page_size],
            vec![txn as u8; page_size],
        )
    }

    fn read_all(wal: &Wal) -> Vec<(Lsn, WalRecord)> {
        wal.read_from(Lsn::ZERO)
            .unwrap()
            .collect::<WalResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_append_and_read() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(WalConfig::new(dir.path())).unwrap();
        assert_eq!(wal.next_lsn(), Lsn::new(0, WAL_SEGMENT_HEADER_SIZE as u32));

        let txn = TxnId::new(1);
        let records = vec![
            WalRecord::begin(txn),
            WalRecord::update(txn, PageId::new(3), 8, vec![0xAA; 4], vec![0xBB; 4]),
            WalRecord::commit(txn),
        ];
        let lsns: Vec<Lsn> = records.iter().map(|r| wal.append(r).unwrap()).collect();
        assert!(lsns.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(wal.durable_lsn(), wal.next_lsn());

        let read = read_all(&wal);
        assert_eq!(read.len(), 3);
        for ((lsn, record), (expected_lsn, expected)) in read.iter().zip(lsns.iter().zip(&records)) {
            assert_eq!(lsn, expected_lsn);
            assert_eq!(record, expected);
        }

        let tail: Vec<_> = wal.read_from(lsns[1]).unwrap().map(|e| e.unwrap().0).collect();
        assert_eq!(tail, &lsns[1..]);
    }

    #[test]
    fn test_rotation_and_reopen() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path()).with_segment_size_limit(min_wal_file_size(512));

        let (first, second) = {
            let wal = Wal::open(config.clone()).unwrap();
            let first = wal.append(&page_update(1, 512)).unwrap();
            let second = wal.append(&page_update(2, 512)).unwrap();
            assert_eq!(first.segment(), 0);
            assert_eq!(second.segment(), 1);
            assert_eq!(wal.segments().unwrap(), vec![0, 1]);
            assert_eq!(wal.stats().snapshot().segment_rotations, 1);
            (first, second)
        };

        let wal = Wal::open(config).unwrap();
        assert!(wal.truncated_at().is_none());
        let lsns: Vec<Lsn> = read_all(&wal).into_iter().map(|(lsn, _)| lsn).collect();
        assert_eq!(lsns, vec![first, second]);

        let third = wal.append(&WalRecord::commit(TxnId::new(2))).unwrap();
        assert_eq!(third.segment(), 2);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path());

        let torn = {
            let wal = Wal::open(config.clone()).unwrap();
            wal.append(&WalRecord::begin(TxnId::new(1))).unwrap();
            wal.append(&page_update(1, 64)).unwrap();
            wal.append(&WalRecord::commit(TxnId::new(1))).unwrap()
        };

        let path = config.segment_path(0);
        let len = fs::metadata(&path).unwrap().len();
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(len - 3)
            .unwrap();

        let wal = Wal::open(config).unwrap();
        assert_eq!(wal.truncated_at(), Some(torn));
        assert_eq!(read_all(&wal).len(), 2);
        assert_eq!(fs::metadata(&path).unwrap().len(), u64::from(torn.offset()));

        // The next record takes the place of the torn one.
        assert_eq!(wal.append(&WalRecord::abort(TxnId::new(1))).unwrap(), torn);
    }

    #[test]
    fn test_bit_flip_cuts_log_and_later_segments() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path()).with_segment_size_limit(min_wal_file_size(512));

        let damaged = {
            let wal = Wal::open(config.clone()).unwrap();
            wal.append(&WalRecord::begin(TxnId::new(1))).unwrap();
            let damaged = wal.append(&WalRecord::begin(TxnId::new(2))).unwrap();
            wal.append(&page_update(3, 512)).unwrap();
            wal.append(&page_update(4, 512)).unwrap();
            assert_eq!(wal.segments().unwrap(), vec![0, 1, 2]);
            damaged
        };

        let path = config.segment_path(0);
        let mut data = fs::read(&path).unwrap();
        data[damaged.offset() as usize + 5] ^= 0x01;
        fs::write(&path, &data).unwrap();

        let wal = Wal::open(config).unwrap();
        assert_eq!(wal.truncated_at(), Some(damaged));
        assert_eq!(wal.segments().unwrap(), vec![0]);

        let records = read_all(&wal);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1, WalRecord::begin(TxnId::new(1)));
    }

    #[test]
    fn test_reader_reports_torn_record() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(WalConfig::new(dir.path())).unwrap();
        wal.append(&WalRecord::begin(TxnId::new(1))).unwrap();
        let second = wal.append(&WalRecord::commit(TxnId::new(1))).unwrap();

        let path = wal.config().segment_path(0);
        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        fs::write(&path, &data).unwrap();

        let mut iter = wal.read_from(Lsn::ZERO).unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().is_none());
        assert_eq!(iter.torn_at(), Some(second));
    }

    #[test]
    fn test_checkpoint_reclaims_segments() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path()).with_segment_size_limit(min_wal_file_size(512));
        let wal = Wal::open(config).unwrap();

        let mut lsns = Vec::new();
        for txn in 1..=4 {
            lsns.push(wal.append(&page_update(txn, 512)).unwrap());
        }
        assert_eq!(wal.segments().unwrap(), vec![0, 1, 2, 3]);

        let checkpoint = wal.checkpoint(lsns[2], TxnId::new(5)).unwrap();
        assert_eq!(wal.segments().unwrap(), vec![2, 3, 4]);
        assert_eq!(wal.stats().snapshot().segments_removed, 2);

        let records = read_all(&wal);
        assert_eq!(records.first().map(|(lsn, _)| *lsn), Some(lsns[2]));
        let (lsn, record) = records.last().unwrap();
        assert_eq!(*lsn, checkpoint);
        match &record.payload {
            WalPayload::Checkpoint(p) => {
                assert_eq!(p.floor, lsns[2]);
                assert_eq!(p.next_txn_id, TxnId::new(5));
            }
            other => panic!("expected checkpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_deferred_sync() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path()).with_sync_policy(SyncPolicy::Deferred);
        let wal = Wal::open(config).unwrap();

        let start = wal.durable_lsn();
        let lsn = wal.append(&WalRecord::begin(TxnId::new(1))).unwrap();
        assert_eq!(wal.durable_lsn(), start);
        assert!(wal.durable_lsn() <= lsn);

        let durable = wal.sync().unwrap();
        assert!(durable > lsn);
        assert_eq!(wal.durable_lsn(), durable);
    }

    #[test]
    fn test_concurrent_appends_get_distinct_increasing_lsns() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path())
            .with_segment_size_limit(4096)
            .with_sync_policy(SyncPolicy::Deferred);
        let wal = Arc::new(Wal::open(config).unwrap());

        let handles: Vec<_> = (1..=4u64)
            .map(|t| {
                let wal = Arc::clone(&wal);
                thread::spawn(move || {
                    let mut lsns = Vec::new();
                    for i in 0..50u64 {
                        let record = WalRecord::update(
                            TxnId::new(t),
                            PageId::new(i),
                            0,
                            vec![0u8; 16],
                            vec![t as u8; 16],
                        );
                        lsns.push(wal.append(&record).unwrap());
                    }
                    lsns
                })
            })
            .collect();

        let mut per_thread = Vec::new();
        for handle in handles {
            let lsns = handle.join().unwrap();
            assert!(lsns.windows(2).all(|w| w[0] < w[1]));
            per_thread.extend(lsns);
        }
        wal.sync().unwrap();

        let read: Vec<Lsn> = read_all(&wal).into_iter().map(|(lsn, _)| lsn).collect();
        assert_eq!(read.len(), 200);
        assert!(read.windows(2).all(|w| w[0] < w[1]));
        per_thread.sort();
        assert_eq!(per_thread, read);
    }

    #[test]
    fn test_closed_wal_rejects_appends() {
        let dir = TempDir::new().unwrap();
        let wal = Wal::open(WalConfig::new(dir.path())).unwrap();
        wal.close().unwrap();
        assert!(matches!(
            wal.append(&WalRecord::begin(TxnId::new(1))),
            Err(WalError::Closed)
        ));
        assert_eq!(
            read_all(&wal).iter().filter(|(_, r)| r.record_type() == RecordType::Begin).count(),
            0
        );
    }

    #[test]
    fn test_invalid_config() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig::new(dir.path()).with_segment_size_limit(8);
        assert!(matches!(Wal::open(config), Err(WalError::Config { .. })));
    }
}

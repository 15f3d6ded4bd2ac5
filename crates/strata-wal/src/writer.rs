//! WAL writer: appends frames to the active segment and rotates it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use strata_common::types::Lsn;

use crate::config::WalConfig;
use crate::error::{WalError, WalResult};
use crate::segment::WalSegment;

/// Counters kept by the WAL.
#[derive(Debug, Default)]
pub struct WalStats {
    /// Total bytes written.
    pub bytes_written: AtomicU64,
    /// Total records written.
    pub records_written: AtomicU64,
    /// Number of segment rotations.
    pub segment_rotations: AtomicU64,
    /// Number of syncs performed.
    pub syncs: AtomicU64,
    /// Number of checkpoint records written.
    pub checkpoints: AtomicU64,
    /// Number of segment files deleted by checkpoints.
    pub segments_removed: AtomicU64,
}

/// Point-in-time copy of [`WalStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalStatsSnapshot {
    /// Total bytes written.
    pub bytes_written: u64,
    /// Total records written.
    pub records_written: u64,
    /// Number of segment rotations.
    pub segment_rotations: u64,
    /// Number of syncs performed.
    pub syncs: u64,
    /// Number of checkpoint records written.
    pub checkpoints: u64,
    /// Number of segment files deleted by checkpoints.
    pub segments_removed: u64,
}

impl WalStats {
    /// Takes a snapshot of the counters.
    pub fn snapshot(&self) -> WalStatsSnapshot {
        WalStatsSnapshot {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            segment_rotations: self.segment_rotations.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
            segments_removed: self.segments_removed.load(Ordering::Relaxed),
        }
    }
}

/// Where an appended frame landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Appended {
    /// LSN of the frame.
    pub lsn: Lsn,
    /// Whether a new segment was started for it.
    pub rotated: bool,
}

/// Owns the active segment. Always used under the WAL's append lock.
#[derive(Debug)]
pub(crate) struct WalWriter {
    dir: PathBuf,
    segment_size_limit: u64,
    max_record_size: usize,
    active: WalSegment,
    closed: bool,
}

impl WalWriter {
    pub(crate) fn new(config: &WalConfig, active: WalSegment) -> Self {
        Self {
            dir: config.dir.clone(),
            segment_size_limit: config.segment_size_limit,
            max_record_size: config.max_record_size(),
            active,
            closed: false,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    /// Segment currently appended to.
    pub(crate) fn active_segment(&self) -> u32 {
        self.active.segment()
    }

    /// LSN the next frame will get if no rotation is needed.
    pub(crate) fn next_lsn(&self) -> Lsn {
        self.active.next_lsn()
    }

    /// Appends one frame, starting a new segment first if it would not fit.
    pub(crate) fn append(&mut self, frame: &[u8]) -> WalResult<Appended> {
        if frame.len() > self.max_record_size {
            return Err(WalError::record_too_large(frame.len(), self.max_record_size));
        }

        let mut rotated = false;
        if self.active.has_records() && !self.active.fits(frame.len(), self.segment_size_limit) {
            self.rotate()?;
            rotated = true;
        }

        let lsn = self.active.append(frame)?;
        Ok(Appended { lsn, rotated })
    }

    /// Syncs the active segment. Returns the LSN everything before which is
    /// now durable.
    pub(crate) fn sync(&mut self) -> WalResult<Lsn> {
        self.active.sync()?;
        Ok(self.active.next_lsn())
    }

    fn rotate(&mut self) -> WalResult<()> {
        let next = self
            .active
            .segment()
            .checked_add(1)
            .ok_or_else(|| WalError::config("WAL segment numbers exhausted"))?;

        // Records of a sealed segment must be durable before any later one.
        self.active.sync()?;
        let sealed = self.active.next_lsn();

        self.active = WalSegment::create(&self.dir, next)?;

        info!(segment = next, sealed_at = %sealed, "Rotated WAL segment");
        debug!(records = self.active.record_count(), "New segment active");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::WalRecord;
    use strata_common::constants::{min_wal_file_size, WAL_SEGMENT_HEADER_SIZE};
    use strata_common::types::{PageId, TxnId};
    use tempfile::TempDir;

    fn writer(dir: &TempDir, limit: u64) -> WalWriter {
        let config = WalConfig::new(dir.path()).with_segment_size_limit(limit);
        let active = WalSegment::create(dir.path(), 0).unwrap();
        WalWriter::new(&config, active)
    }

    fn full_page_update(page_size: usize) -> Vec<u8> {
        WalRecord::update(
            TxnId::new(1),
            PageId::new(1),
            0,
            vec![0u8; page_size],
            vec![1u8; page_size],
        )
        .encode()
        .to_vec()
    }

    #[test]
    fn test_rotation_at_limit() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&dir, min_wal_file_size(512));
        let frame = full_page_update(512);

        let first = writer.append(&frame).unwrap();
        assert_eq!(first.lsn, Lsn::new(0, WAL_SEGMENT_HEADER_SIZE as u32));
        assert!(!first.rotated);

        let second = writer.append(&frame).unwrap();
        assert!(second.rotated);
        assert_eq!(second.lsn, Lsn::new(1, WAL_SEGMENT_HEADER_SIZE as u32));
        assert_eq!(writer.active_segment(), 1);
    }

    #[test]
    fn test_record_too_large() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&dir, min_wal_file_size(512));
        let frame = full_page_update(1024);

        let err = writer.append(&frame).unwrap_err();
        assert!(matches!(err, WalError::RecordTooLarge { .. }));
        assert_eq!(writer.active_segment(), 0);
        assert_eq!(writer.next_lsn(), Lsn::new(0, WAL_SEGMENT_HEADER_SIZE as u32));
    }
}

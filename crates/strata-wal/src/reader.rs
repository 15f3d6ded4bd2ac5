//! Sequential reads of the log.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::debug;

use strata_common::constants::WAL_SEGMENT_HEADER_SIZE;
use strata_common::types::Lsn;

use crate::config::segment_path;
use crate::error::WalResult;
use crate::record::WalRecord;
use crate::segment::{list_segments, SegmentHeader};

/// Iterator over log records in LSN order, starting at a given LSN.
///
/// Iteration ends at the end of the log or at the first record that fails
/// to decode; in the latter case [`WalIter::torn_at`] reports where.
#[derive(Debug)]
pub struct WalIter {
    dir: PathBuf,
    pending: VecDeque<u32>,
    start: Lsn,
    current: Option<LoadedSegment>,
    torn_at: Option<Lsn>,
    done: bool,
}

#[derive(Debug)]
struct LoadedSegment {
    segment: u32,
    data: Vec<u8>,
    pos: usize,
}

impl WalIter {
    pub(crate) fn new(dir: PathBuf, start: Lsn) -> WalResult<Self> {
        let pending = list_segments(&dir)?
            .into_iter()
            .filter(|segment| *segment >= start.segment())
            .collect();
        Ok(Self {
            dir,
            pending,
            start,
            current: None,
            torn_at: None,
            done: false,
        })
    }

    /// Position of the first damaged record, if iteration stopped at one.
    pub fn torn_at(&self) -> Option<Lsn> {
        self.torn_at
    }

    fn load_next(&mut self) -> WalResult<bool> {
        let Some(segment) = self.pending.pop_front() else {
            return Ok(false);
        };

        let data = match fs::read(segment_path(&self.dir, segment)) {
            Ok(data) => data,
            // Reclaimed since the listing was taken.
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        if SegmentHeader::decode(&data, segment).is_err() {
            self.stop_torn(Lsn::new(segment, 0));
            return Ok(false);
        }

        let pos = if segment == self.start.segment() {
            (self.start.offset() as usize).max(WAL_SEGMENT_HEADER_SIZE)
        } else {
            WAL_SEGMENT_HEADER_SIZE
        };
        self.current = Some(LoadedSegment { segment, data, pos });
        Ok(true)
    }

    fn stop_torn(&mut self, lsn: Lsn) {
        debug!(%lsn, "WAL read stopped at damaged record");
        self.torn_at = Some(lsn);
        self.done = true;
        self.current = None;
    }
}

impl Iterator for WalIter {
    type Item = WalResult<(Lsn, WalRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if self.current.is_none() {
                match self.load_next() {
                    Ok(true) => {}
                    Ok(false) => {
                        self.done = true;
                        return None;
                    }
                    Err(err) => {
                        self.done = true;
                        return Some(Err(err));
                    }
                }
            }
            let Some(current) = self.current.as_mut() else {
                continue;
            };

            if current.pos >= current.data.len() {
                self.current = None;
                continue;
            }

            let lsn = Lsn::new(current.segment, current.pos as u32);
            match WalRecord::decode(&current.data[current.pos..], lsn) {
                Ok((record, len)) => {
                    current.pos += len;
                    return Some(Ok((lsn, record)));
                }
                Err(_) => {
                    self.stop_torn(lsn);
                    return None;
                }
            }
        }
    }
}

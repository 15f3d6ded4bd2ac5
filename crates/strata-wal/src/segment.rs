//! WAL segment files.
//!
//! A segment starts with a 16-byte header followed by framed records:
//!
//! ```text
//! +-----------+-------------+--------------+-------------+---------+
//! | magic u32 | version u16 | reserved u16 | segment u32 | crc u32 |
//! +-----------+-------------+--------------+-------------+---------+
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut};
use tracing::{debug, warn};

use strata_common::constants::{WAL_FORMAT_VERSION, WAL_MAGIC, WAL_SEGMENT_HEADER_SIZE};
use strata_common::types::Lsn;

use crate::config::{parse_segment_path, segment_path};
use crate::error::{WalError, WalResult};
use crate::record::WalRecord;

/// Header at the start of every segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Segment number, also the high half of every LSN inside it.
    pub segment: u32,
}

impl SegmentHeader {
    /// Encodes the header.
    pub fn encode(&self) -> [u8; WAL_SEGMENT_HEADER_SIZE] {
        let mut out = [0u8; WAL_SEGMENT_HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_u32(WAL_MAGIC);
        buf.put_u16(WAL_FORMAT_VERSION);
        buf.put_u16(0);
        buf.put_u32(self.segment);
        let crc = crc32fast::hash(&out[..12]);
        out[12..].copy_from_slice(&crc.to_be_bytes());
        out
    }

    /// Decodes and validates the header of segment `segment`.
    pub fn decode(bytes: &[u8], segment: u32) -> WalResult<Self> {
        let at = Lsn::new(segment, 0);
        if bytes.len() < WAL_SEGMENT_HEADER_SIZE {
            return Err(WalError::segment_corrupted(at, "segment header truncated"));
        }

        let mut buf = &bytes[..WAL_SEGMENT_HEADER_SIZE];
        let magic = buf.get_u32();
        if magic != WAL_MAGIC {
            return Err(WalError::InvalidMagic {
                expected: WAL_MAGIC,
                found: magic,
            });
        }
        let version = buf.get_u16();
        let _reserved = buf.get_u16();
        let stored_segment = buf.get_u32();
        let expected = buf.get_u32();
        let computed = crc32fast::hash(&bytes[..12]);
        if expected != computed {
            return Err(WalError::checksum_mismatch(at, expected, computed));
        }
        if version != WAL_FORMAT_VERSION {
            return Err(WalError::segment_corrupted(
                at,
                format!("unsupported segment version {}", version),
            ));
        }
        if stored_segment != segment {
            return Err(WalError::segment_corrupted(
                at,
                format!("header names segment {}", stored_segment),
            ));
        }

        Ok(Self { segment })
    }
}

/// The segment currently being appended to.
#[derive(Debug)]
pub struct WalSegment {
    segment: u32,
    path: PathBuf,
    file: File,
    write_pos: u64,
    records: u64,
}

impl WalSegment {
    /// Creates a new, empty segment file.
    pub fn create(dir: &Path, segment: u32) -> WalResult<Self> {
        let path = segment_path(dir, segment);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        file.write_all(&SegmentHeader { segment }.encode())?;
        file.sync_all()?;
        sync_dir(dir);

        debug!(segment, path = %path.display(), "Created WAL segment");

        Ok(Self {
            segment,
            path,
            file,
            write_pos: WAL_SEGMENT_HEADER_SIZE as u64,
            records: 0,
        })
    }

    /// Reopens an existing segment for appending after its last valid record.
    ///
    /// Anything past `valid_end` is cut off.
    pub fn open(dir: &Path, segment: u32, valid_end: u64, records: u64) -> WalResult<Self> {
        let path = segment_path(dir, segment);
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        if file.metadata()?.len() != valid_end {
            file.set_len(valid_end)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(valid_end))?;

        Ok(Self {
            segment,
            path,
            file,
            write_pos: valid_end,
            records,
        })
    }

    /// Returns the segment number.
    pub fn segment(&self) -> u32 {
        self.segment
    }

    /// Returns the segment file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of records in the segment.
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Returns true if the segment holds at least one record.
    pub fn has_records(&self) -> bool {
        self.records > 0
    }

    /// Position the next record will be written at.
    pub fn next_lsn(&self) -> Lsn {
        Lsn::new(self.segment, self.write_pos as u32)
    }

    /// Returns true if a frame of `len` bytes fits under `limit`.
    pub fn fits(&self, len: usize, limit: u64) -> bool {
        self.write_pos + len as u64 <= limit
    }

    /// Appends a framed record and returns its LSN.
    pub fn append(&mut self, frame: &[u8]) -> WalResult<Lsn> {
        let lsn = self.next_lsn();
        if let Err(err) = self.file.write_all(frame) {
            // Drop whatever part of the frame made it out.
            let _ = self.file.set_len(self.write_pos);
            let _ = self.file.seek(SeekFrom::Start(self.write_pos));
            return Err(err.into());
        }
        self.write_pos += frame.len() as u64;
        self.records += 1;
        Ok(lsn)
    }

    /// Forces appended records to stable storage.
    pub fn sync(&self) -> WalResult<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

/// Outcome of validating a segment file on open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentScan {
    /// Segment number.
    pub segment: u32,
    /// Whether the header is intact.
    pub header_valid: bool,
    /// End of the last intact record.
    pub valid_end: u64,
    /// Number of intact records.
    pub records: u64,
    /// First damaged position and what was wrong there.
    pub torn: Option<(Lsn, String)>,
}

/// Reads a segment and finds the end of its intact prefix.
pub fn scan_segment(dir: &Path, segment: u32) -> WalResult<SegmentScan> {
    let data = fs::read(segment_path(dir, segment))?;

    if let Err(err) = SegmentHeader::decode(&data, segment) {
        return Ok(SegmentScan {
            segment,
            header_valid: false,
            valid_end: 0,
            records: 0,
            torn: Some((Lsn::new(segment, 0), err.to_string())),
        });
    }

    let mut pos = WAL_SEGMENT_HEADER_SIZE;
    let mut records = 0;
    let mut torn = None;
    while pos < data.len() {
        let lsn = Lsn::new(segment, pos as u32);
        match WalRecord::decode(&data[pos..], lsn) {
            Ok((_, len)) => {
                pos += len;
                records += 1;
            }
            Err(err) => {
                torn = Some((lsn, err.to_string()));
                break;
            }
        }
    }

    Ok(SegmentScan {
        segment,
        header_valid: true,
        valid_end: pos as u64,
        records,
        torn,
    })
}

/// Lists the segment numbers present in `dir`, ascending.
pub fn list_segments(dir: &Path) -> WalResult<Vec<u32>> {
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        match parse_segment_path(&path) {
            Some(segment) => segments.push(segment),
            None => {
                if path.is_file() {
                    warn!(path = %path.display(), "Ignoring unexpected file in WAL directory");
                }
            }
        }
    }
    segments.sort_unstable();
    Ok(segments)
}

/// Removes a segment file.
pub fn remove_segment(dir: &Path, segment: u32) -> WalResult<()> {
    fs::remove_file(segment_path(dir, segment))?;
    Ok(())
}

/// Makes directory entry changes durable.
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) {}

//! WAL record types and framing.
//!
//! Every record is framed as:
//!
//! ```text
//! +--------+------+---------+---------+-----------+-------+
//! | txn u64| type | page u64| len u32 | payload   | crc32 |
//! +--------+------+---------+---------+-----------+-------+
//! ```
//!
//! All integers are big-endian. The CRC covers every byte before it.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use strata_common::constants::WAL_RECORD_OVERHEAD;
use strata_common::types::{Lsn, PageId, TxnId};

use super::payload::{CheckpointPayload, Payload, UpdatePayload};
use crate::error::{WalError, WalResult};

/// Bytes before the payload.
const FRAME_HEADER_SIZE: usize = 8 + 1 + 8 + 4;

/// Record type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    /// First write of a transaction.
    Begin = 1,
    /// Physical page change.
    Update = 2,
    /// Transaction commit.
    Commit = 3,
    /// Transaction abort.
    Abort = 4,
    /// Checkpoint taken.
    Checkpoint = 5,
}

impl RecordType {
    /// Converts the record type to a u8.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Creates a record type from a u8.
    pub fn from_u8(value: u8) -> WalResult<Self> {
        match value {
            1 => Ok(Self::Begin),
            2 => Ok(Self::Update),
            3 => Ok(Self::Commit),
            4 => Ok(Self::Abort),
            5 => Ok(Self::Checkpoint),
            _ => Err(WalError::deserialization(format!(
                "unknown record type: {}",
                value
            ))),
        }
    }
}

/// Typed record payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalPayload {
    /// Transaction began.
    Begin,
    /// Page bytes changed.
    Update(UpdatePayload),
    /// Transaction committed.
    Commit,
    /// Transaction aborted.
    Abort,
    /// Checkpoint completed.
    Checkpoint(CheckpointPayload),
}

impl WalPayload {
    /// Returns the record type.
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Begin => RecordType::Begin,
            Self::Update(_) => RecordType::Update,
            Self::Commit => RecordType::Commit,
            Self::Abort => RecordType::Abort,
            Self::Checkpoint(_) => RecordType::Checkpoint,
        }
    }

    fn serialize(&self) -> Bytes {
        match self {
            Self::Begin | Self::Commit | Self::Abort => Bytes::new(),
            Self::Update(p) => p.serialize(),
            Self::Checkpoint(p) => p.serialize(),
        }
    }

    fn encoded_size(&self) -> usize {
        match self {
            Self::Begin | Self::Commit | Self::Abort => 0,
            Self::Update(p) => p.encoded_size(),
            Self::Checkpoint(_) => CheckpointPayload::SIZE,
        }
    }

    fn deserialize(record_type: RecordType, bytes: &[u8]) -> WalResult<Self> {
        match record_type {
            RecordType::Update => Ok(Self::Update(UpdatePayload::deserialize(bytes)?)),
            RecordType::Checkpoint => Ok(Self::Checkpoint(CheckpointPayload::deserialize(bytes)?)),
            RecordType::Begin | RecordType::Commit | RecordType::Abort => {
                if !bytes.is_empty() {
                    return Err(WalError::deserialization(format!(
                        "{:?} record carries {} payload bytes",
                        record_type,
                        bytes.len()
                    )));
                }
                Ok(match record_type {
                    RecordType::Begin => Self::Begin,
                    RecordType::Commit => Self::Commit,
                    _ => Self::Abort,
                })
            }
        }
    }
}

/// A log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// Owning transaction, `TxnId::INVALID` for checkpoints.
    pub txn_id: TxnId,
    /// Changed page, `PageId::INVALID` unless this is an update.
    pub page_id: PageId,
    /// The payload.
    pub payload: WalPayload,
}

impl WalRecord {
    /// Creates a begin record.
    pub fn begin(txn_id: TxnId) -> Self {
        Self {
            txn_id,
            page_id: PageId::INVALID,
            payload: WalPayload::Begin,
        }
    }

    /// Creates an update record.
    pub fn update(
        txn_id: TxnId,
        page_id: PageId,
        offset: u32,
        before: impl Into<Bytes>,
        after: impl Into<Bytes>,
    ) -> Self {
        Self {
            txn_id,
            page_id,
            payload: WalPayload::Update(UpdatePayload::new(offset, before, after)),
        }
    }

    /// Creates a commit record.
    pub fn commit(txn_id: TxnId) -> Self {
        Self {
            txn_id,
            page_id: PageId::INVALID,
            payload: WalPayload::Commit,
        }
    }

    /// Creates an abort record.
    pub fn abort(txn_id: TxnId) -> Self {
        Self {
            txn_id,
            page_id: PageId::INVALID,
            payload: WalPayload::Abort,
        }
    }

    /// Creates a checkpoint record.
    pub fn checkpoint(floor: Lsn, next_txn_id: TxnId) -> Self {
        Self {
            txn_id: TxnId::INVALID,
            page_id: PageId::INVALID,
            payload: WalPayload::Checkpoint(CheckpointPayload { floor, next_txn_id }),
        }
    }

    /// Returns the record type.
    pub fn record_type(&self) -> RecordType {
        self.payload.record_type()
    }

    /// Size of the framed record.
    pub fn encoded_size(&self) -> usize {
        WAL_RECORD_OVERHEAD + self.payload.encoded_size()
    }

    /// Frames the record for appending.
    pub fn encode(&self) -> Bytes {
        let payload = self.payload.serialize();
        let mut buf = BytesMut::with_capacity(WAL_RECORD_OVERHEAD + payload.len());
        buf.put_u64(self.txn_id.as_u64());
        buf.put_u8(self.record_type().as_u8());
        buf.put_u64(self.page_id.as_u64());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(&payload);
        let crc = crc32fast::hash(&buf);
        buf.put_u32(crc);
        buf.freeze()
    }

    /// Decodes the record framed at the start of `buf`, which sits at `lsn`.
    ///
    /// Returns the record and its framed length. Any error means the bytes
    /// at `lsn` are not a complete, intact record.
    pub fn decode(buf: &[u8], lsn: Lsn) -> WalResult<(Self, usize)> {
        if buf.len() < WAL_RECORD_OVERHEAD {
            return Err(WalError::segment_corrupted(
                lsn,
                format!("truncated record: {} bytes left", buf.len()),
            ));
        }

        let mut header = &buf[..FRAME_HEADER_SIZE];
        let txn_id = TxnId::new(header.get_u64());
        let type_byte = header.get_u8();
        let page_id = PageId::new(header.get_u64());
        let payload_len = header.get_u32() as usize;

        let total = WAL_RECORD_OVERHEAD
            .checked_add(payload_len)
            .filter(|total| *total <= buf.len())
            .ok_or_else(|| {
                WalError::segment_corrupted(
                    lsn,
                    format!(
                        "record payload of {} bytes runs past the end of the segment",
                        payload_len
                    ),
                )
            })?;

        let body_end = total - 4;
        let expected = (&buf[body_end..total]).get_u32();
        let computed = crc32fast::hash(&buf[..body_end]);
        if expected != computed {
            return Err(WalError::checksum_mismatch(lsn, expected, computed));
        }

        let record_type = RecordType::from_u8(type_byte)?;
        let payload = WalPayload::deserialize(record_type, &buf[FRAME_HEADER_SIZE..body_end])?;

        Ok((
            Self {
                txn_id,
                page_id,
                payload,
            },
            total,
        ))
    }
}

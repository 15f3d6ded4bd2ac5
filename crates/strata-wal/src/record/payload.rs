//! WAL record payloads.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use strata_common::constants::WAL_UPDATE_PAYLOAD_OVERHEAD;
use strata_common::types::{Lsn, TxnId};

use crate::error::{WalError, WalResult};

/// Trait for serializable payloads.
pub trait Payload: Sized {
    /// Serializes the payload to bytes.
    fn serialize(&self) -> Bytes;
    /// Deserializes the payload from bytes.
    fn deserialize(bytes: &[u8]) -> WalResult<Self>;
}

/// Physical page change: the bytes at `offset` before and after the write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePayload {
    /// Byte offset within the page.
    pub offset: u32,
    /// Image before the change.
    pub before: Bytes,
    /// Image after the change.
    pub after: Bytes,
}

impl UpdatePayload {
    /// Creates an update payload. Both images cover the same byte range.
    pub fn new(offset: u32, before: impl Into<Bytes>, after: impl Into<Bytes>) -> Self {
        let before = before.into();
        let after = after.into();
        debug_assert_eq!(before.len(), after.len());
        Self {
            offset,
            before,
            after,
        }
    }

    /// Length of the changed range.
    pub fn len(&self) -> usize {
        self.after.len()
    }

    /// Returns true if the change covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.after.is_empty()
    }

    /// Serialized size.
    pub fn encoded_size(&self) -> usize {
        WAL_UPDATE_PAYLOAD_OVERHEAD + self.before.len() + self.after.len()
    }
}

impl Payload for UpdatePayload {
    fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        buf.put_u32(self.offset);
        buf.put_u32(self.before.len() as u32);
        buf.extend_from_slice(&self.before);
        buf.put_u32(self.after.len() as u32);
        buf.extend_from_slice(&self.after);
        buf.freeze()
    }

    fn deserialize(bytes: &[u8]) -> WalResult<Self> {
        let mut buf = bytes;

        if buf.remaining() < 8 {
            return Err(WalError::deserialization("UpdatePayload too short"));
        }
        let offset = buf.get_u32();

        let before_len = buf.get_u32() as usize;
        if buf.remaining() < before_len + 4 {
            return Err(WalError::deserialization("UpdatePayload before image truncated"));
        }
        let before = Bytes::copy_from_slice(&buf[..before_len]);
        buf.advance(before_len);

        let after_len = buf.get_u32() as usize;
        if buf.remaining() != after_len {
            return Err(WalError::deserialization(format!(
                "UpdatePayload after image is {} bytes, header says {}",
                buf.remaining(),
                after_len
            )));
        }
        if after_len != before_len {
            return Err(WalError::deserialization(format!(
                "UpdatePayload images differ in length: {} vs {}",
                before_len, after_len
            )));
        }
        let after = Bytes::copy_from_slice(buf);

        Ok(Self {
            offset,
            before,
            after,
        })
    }
}

/// Checkpoint payload: the redo floor and the next transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointPayload {
    /// Every record below this LSN is reflected in the page file.
    pub floor: Lsn,
    /// First transaction id not yet handed out.
    pub next_txn_id: TxnId,
}

impl CheckpointPayload {
    /// Serialized size.
    pub const SIZE: usize = 16;
}

impl Payload for CheckpointPayload {
    fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u64(self.floor.as_u64());
        buf.put_u64(self.next_txn_id.as_u64());
        buf.freeze()
    }

    fn deserialize(bytes: &[u8]) -> WalResult<Self> {
        if bytes.len() != Self::SIZE {
            return Err(WalError::deserialization(format!(
                "CheckpointPayload must be {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }
        let mut buf = bytes;
        Ok(Self {
            floor: Lsn::from_raw(buf.get_u64()),
            next_txn_id: TxnId::new(buf.get_u64()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_payload_roundtrip() {
        let payload = UpdatePayload::new(100, vec![0xAA, 0xAA], vec![0xBB, 0xBB]);
        assert_eq!(payload.encoded_size(), WAL_UPDATE_PAYLOAD_OVERHEAD + 4);

        let bytes = payload.serialize();
        assert_eq!(bytes.len(), payload.encoded_size());
        assert_eq!(UpdatePayload::deserialize(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_update_payload_rejects_truncation() {
        let bytes = UpdatePayload::new(0, vec![1, 2, 3], vec![4, 5, 6]).serialize();
        for len in 0..bytes.len() {
            assert!(UpdatePayload::deserialize(&bytes[..len]).is_err());
        }
    }

    #[test]
    fn test_update_payload_rejects_mismatched_images() {
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        buf.put_u32(1);
        buf.put_u8(7);
        buf.put_u32(2);
        buf.put_slice(&[8, 9]);
        assert!(UpdatePayload::deserialize(&buf).is_err());
    }

    #[test]
    fn test_checkpoint_payload_roundtrip() {
        let payload = CheckpointPayload {
            floor: Lsn::new(3, 512),
            next_txn_id: TxnId::new(42),
        };
        let bytes = payload.serialize();
        assert_eq!(bytes.len(), CheckpointPayload::SIZE);
        assert_eq!(CheckpointPayload::deserialize(&bytes).unwrap(), payload);
        assert!(CheckpointPayload::deserialize(&bytes[..8]).is_err());
    }
}

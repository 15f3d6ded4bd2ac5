//! WAL error types.

use std::io;
use thiserror::Error;

use strata_common::error::StrataError;
use strata_common::types::Lsn;

/// Result alias for log operations.
pub type WalResult<T> = Result<T, WalError>;

/// Failures of the write-ahead log.
#[derive(Debug, Error)]
pub enum WalError {
    /// Reading, writing or syncing a segment failed.
    #[error("log I/O failed: {source}")]
    Io {
        /// The underlying error.
        #[from]
        source: io::Error,
    },

    /// Bytes at `lsn` do not form a whole record.
    #[error("torn log record at {lsn}: {reason}")]
    SegmentCorrupted {
        /// Where the problem starts.
        lsn: Lsn,
        /// What is wrong.
        reason: String,
    },

    /// A segment header carries the wrong magic.
    #[error("not a log segment (magic {found:#010x}, want {expected:#010x})")]
    InvalidMagic {
        /// The expected magic.
        expected: u32,
        /// The magic found.
        found: u32,
    },

    /// A record's CRC does not match its bytes.
    #[error("log record at {lsn} fails its CRC: stored {expected:#010x}, recomputed {computed:#010x}")]
    ChecksumMismatch {
        /// Position of the record.
        lsn: Lsn,
        /// Stored checksum.
        expected: u32,
        /// Recomputed checksum.
        computed: u32,
    },

    /// The record would not fit even an empty segment.
    #[error("{size}-byte log record cannot fit a segment (at most {max} bytes)")]
    RecordTooLarge {
        /// Encoded record size.
        size: usize,
        /// Largest record an empty segment holds.
        max: usize,
    },

    /// A record passed its CRC but its payload is malformed.
    #[error("malformed log payload: {reason}")]
    Deserialization {
        /// What was wrong.
        reason: String,
    },

    /// Unusable log settings.
    #[error("bad log configuration: {reason}")]
    Config {
        /// What was wrong.
        reason: String,
    },

    /// The log was closed.
    #[error("log is closed")]
    Closed,
}

impl WalError {
    /// Reports a torn record.
    pub fn segment_corrupted(lsn: Lsn, reason: impl Into<String>) -> Self {
        Self::SegmentCorrupted {
            lsn,
            reason: reason.into(),
        }
    }

    pub fn checksum_mismatch(lsn: Lsn, expected: u32, computed: u32) -> Self {
        Self::ChecksumMismatch {
            lsn,
            expected,
            computed,
        }
    }

    pub fn record_too_large(size: usize, max: usize) -> Self {
        Self::RecordTooLarge { size, max }
    }

    /// Reports a malformed payload.
    pub fn deserialization(reason: impl Into<String>) -> Self {
        Self::Deserialization {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// True when the bytes on disk are damaged, as opposed to I/O or misuse.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::SegmentCorrupted { .. }
                | Self::ChecksumMismatch { .. }
                | Self::InvalidMagic { .. }
                | Self::Deserialization { .. }
        )
    }
}

impl From<WalError> for StrataError {
    fn from(err: WalError) -> Self {
        match err {
            WalError::Io { source } => StrataError::Io { source },
            WalError::ChecksumMismatch {
                lsn,
                expected,
                computed,
            } => StrataError::ChecksumMismatch {
                lsn,
                expected,
                computed,
            },
            WalError::SegmentCorrupted { lsn, reason } => StrataError::WalCorrupted { lsn, reason },
            WalError::Config { reason } => StrataError::Config { reason },
            WalError::Closed => StrataError::Closed,
            err @ (WalError::InvalidMagic { .. } | WalError::Deserialization { .. }) => {
                StrataError::WalCorrupted {
                    lsn: Lsn::ZERO,
                    reason: err.to_string(),
                }
            }
            err @ WalError::RecordTooLarge { .. } => StrataError::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::error::ErrorCode;

    #[test]
    fn test_damage_is_corruption() {
        assert!(WalError::segment_corrupted(Lsn::new(0, 100), "short frame").is_corruption());
        assert!(WalError::checksum_mismatch(Lsn::new(0, 100), 0x1234, 0x5678).is_corruption());
        assert!(WalError::deserialization("image lengths differ").is_corruption());
        assert!(!WalError::Closed.is_corruption());
        assert!(!WalError::record_too_large(5000, 4080).is_corruption());
    }

    #[test]
    fn test_messages_name_the_position() {
        let msg = WalError::checksum_mismatch(Lsn::new(3, 16), 0xdead, 0xbeef).to_string();
        assert!(msg.contains("0x0000dead"));
        assert!(msg.contains("0x0000beef"));

        let msg = WalError::record_too_large(5000, 4080).to_string();
        assert!(msg.contains("5000") && msg.contains("4080"));
    }

    #[test]
    fn test_into_strata_error() {
        let err: WalError = io::Error::new(io::ErrorKind::PermissionDenied, "read-only").into();
        assert_eq!(StrataError::from(err).code(), ErrorCode::Io);

        let err: StrataError = WalError::checksum_mismatch(Lsn::new(1, 16), 1, 2).into();
        assert_eq!(err.code(), ErrorCode::ChecksumMismatch);

        let err: StrataError = WalError::Closed.into();
        assert!(matches!(err, StrataError::Closed));
    }
}

//! WAL record types and serialization.
//!
//! Records are framed with a fixed-size header, a variable-length payload
//! and a trailing CRC32.

pub mod payload;
pub mod types;

pub use payload::{CheckpointPayload, Payload, UpdatePayload};
pub use types::{RecordType, WalPayload, WalRecord};

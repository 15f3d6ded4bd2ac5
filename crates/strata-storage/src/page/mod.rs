//! Page formats.
//!
//! Every page starts with a one-byte [`PageType`] tag. Page 0 holds the
//! store metadata laid out by [`meta`]; all other pages are either free or
//! B+tree nodes.

mod checksum;
pub mod meta;
mod types;

pub use checksum::{compute_checksum, verify_checksum};
pub use meta::{CheckpointMarker, MetaPage};
pub use types::PageType;

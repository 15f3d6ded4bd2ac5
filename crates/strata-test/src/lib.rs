//! # strata-test
//!
//! Integration tests for Strata.
//!
//! This crate contains:
//! - Store fixtures on temporary directories
//! - Crash and corruption helpers
//! - Workload generators with an in-memory model to check against

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Chaos helpers: crashes and on-disk damage.
pub mod chaos;

/// Test utilities and fixtures.
pub mod utils;

/// Workload generators.
pub mod workload;

pub use utils::{init_tracing, TestDir};
pub use workload::{Op, Workload};

//! Error handling for Strata.
//!
//! This module provides the unified error type returned by every public
//! engine operation.

mod store;

pub use store::{ErrorCode, StrataError, StrataResult};

//! Configuration for Strata.

mod store;

pub use store::StoreConfig;

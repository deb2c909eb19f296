//! Infrastructure layer for murmur.
//!
//! Contains the implementations of the store trait defined in `murmur-core`
//! (SQLite with WAL and split pools), configuration loading, and data
//! directory resolution.

pub mod config;
pub mod paths;
pub mod sqlite;
pub mod store;

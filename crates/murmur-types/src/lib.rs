//! Shared domain types for murmur.
//!
//! Chat messages, connection sessions, the client/server wire protocol,
//! relay configuration, and their error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;

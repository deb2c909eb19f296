//! Session tracking, broadcast ordering, and storage ports for murmur.
//!
//! This crate defines the "ports" (the message store trait) that the
//! infrastructure layer implements, plus the in-memory session registry and
//! the broadcast engine. It depends only on `murmur-types` -- never on
//! `murmur-infra` or any database/IO crate.

pub mod broadcast;
pub mod repository;
pub mod session;
